use axum::{
    Json,
    extract::{
        State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::{DbErr, SqlErr};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("invalid email or password")]
    Authentication,

    #[error("access denied: bearer token required")]
    MissingCredential,

    #[error("invalid or expired token")]
    InvalidCredential,

    #[error("{0}")]
    Authorization(String),

    #[error("{0}")]
    NotFound(String),

    #[error("movie catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Conflict(_) => StatusCode::BAD_REQUEST,
            AppError::Authentication | AppError::MissingCredential => StatusCode::UNAUTHORIZED,
            AppError::InvalidCredential | AppError::Authorization(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::CatalogUnavailable(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        }
    }
}

impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        if let Some(SqlErr::UniqueConstraintViolation(detail)) = err.sql_err() {
            return Self::Conflict(conflict_message(&detail).to_string());
        }
        Self::Internal(anyhow::Error::new(err))
    }
}

impl From<wreq::Error> for AppError {
    fn from(err: wreq::Error) -> Self {
        Self::CatalogUnavailable(err.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

fn conflict_message(detail: &str) -> &'static str {
    if detail.contains("email") {
        "email is already in use"
    } else if detail.contains("username") {
        "username is already taken"
    } else {
        "resource already exists"
    }
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
}

/// Underlying message of a 500-class error, attached to the response so that
/// [`reveal_error_detail`] can surface it outside production.
#[derive(Clone, Debug)]
pub struct ErrorDetail(pub String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, detail) = match &self {
            AppError::Internal(err) => {
                let detail = format!("{err:#}");
                tracing::error!(error = %detail, "request failed");
                ("internal server error".to_string(), Some(detail))
            },
            AppError::CatalogUnavailable(detail) => {
                tracing::warn!(error = %detail, "catalog call failed");
                ("movie catalog unavailable".to_string(), Some(self.to_string()))
            },
            other => (other.to_string(), None),
        };

        let mut response = (status, Json(ErrorBody { success: false, message })).into_response();
        if let Some(detail) = detail {
            response.extensions_mut().insert(ErrorDetail(detail));
        }
        response
    }
}

/// Response mapper: rewrites generic 500 bodies with their [`ErrorDetail`]
/// when `expose` is set.
pub async fn reveal_error_detail(State(expose): State<bool>, mut response: Response) -> Response {
    let Some(ErrorDetail(message)) = response.extensions_mut().remove::<ErrorDetail>() else {
        return response;
    };
    if !expose {
        return response;
    }
    (response.status(), Json(ErrorBody { success: false, message })).into_response()
}

pub type AppResult<T> = Result<T, AppError>;
