use std::sync::Arc;

use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, State},
};
use serde::{Deserialize, Serialize};

use crate::{
    AppState,
    auth::{self, AuthUser, MaybeUser},
    error::{AppError, AppResult},
    interactions::{self, MovieDetail},
    models::{
        ListRequest, ListType, ListedMovie, LoginRequest, MostReviewedMovie, MovieReview, Profile,
        RateRequest, RegisterRequest, ReviewRequest, ReviewUpdateRequest, StatusView, UserProfile,
        UserReview, UsernameRequest,
    },
    tmdb::{self, CatalogPage, Genre, MovieCard, TimeWindow},
};

/// JSON body whose rejections render through [`AppError`].
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

impl<T> ApiResponse<T> {
    fn data(data: T) -> Json<Self> {
        Json(Self { success: true, message: None, data: Some(data) })
    }

    fn with_message(message: impl Into<String>, data: T) -> Json<Self> {
        Json(Self { success: true, message: Some(message.into()), data: Some(data) })
    }
}

fn done(message: impl Into<String>) -> Json<ApiResponse<()>> {
    Json(ApiResponse { success: true, message: Some(message.into()), data: None })
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    success: bool,
    message: &'static str,
    token: String,
    user: UserProfile,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
    user: UserProfile,
}

#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    success: bool,
    message: &'static str,
    review: MovieReview,
}

fn first_page() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "first_page")]
    page: u32,
}

impl PageQuery {
    fn page(&self) -> AppResult<u32> {
        match self.page {
            0 => Err(AppError::validation("page must be at least 1")),
            p if p > tmdb::MAX_PAGE => {
                Err(AppError::validation(format!("page must be at most {}", tmdb::MAX_PAGE)))
            },
            p => Ok(p),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    #[serde(default)]
    limit: u64,
}

#[derive(Debug, Deserialize)]
pub struct TrendingQuery {
    #[serde(default)]
    time_window: TimeWindow,
}

pub async fn index() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "success": true,
        "message": "Cinelog API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn health(State(state): State<Arc<AppState>>) -> AppResult<Json<serde_json::Value>> {
    state.store.db().ping().await?;
    Ok(Json(serde_json::json!({ "success": true, "status": "ok" })))
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> AppResult<Json<AuthResponse>> {
    let (user, token) = auth::register(&state.store, &state.auth, req).await?;
    Ok(Json(AuthResponse { success: true, message: "registration successful", token, user }))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let (user, token) = auth::login(&state.store, &state.auth, req).await?;
    Ok(Json(AuthResponse { success: true, message: "login successful", token, user }))
}

pub async fn me(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<UserResponse>> {
    let user = state
        .store
        .find_user_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("user not found".to_string()))?;
    Ok(Json(UserResponse { success: true, message: None, user: user.into() }))
}

pub async fn genres(State(state): State<Arc<AppState>>) -> Json<ApiResponse<Vec<Genre>>> {
    ApiResponse::data(state.tmdb.genres().await)
}

pub async fn movie_detail(
    State(state): State<Arc<AppState>>,
    MaybeUser(caller): MaybeUser,
    ApiPath(movie_id): ApiPath<i32>,
) -> AppResult<Json<ApiResponse<MovieDetail>>> {
    let detail = interactions::movie_detail(&state.store, &state.tmdb, movie_id, caller).await?;
    Ok(ApiResponse::data(detail))
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    ApiPath(query): ApiPath<String>,
    ApiQuery(q): ApiQuery<PageQuery>,
) -> AppResult<Json<ApiResponse<CatalogPage<MovieCard>>>> {
    let query = query.trim();
    if query.is_empty() {
        return Err(AppError::validation("search query must not be empty"));
    }
    let results = state.tmdb.search(query, q.page()?).await?;
    Ok(ApiResponse::data(results.map(MovieCard::from)))
}

pub async fn by_genre(
    State(state): State<Arc<AppState>>,
    ApiPath(genre_id): ApiPath<i32>,
    ApiQuery(q): ApiQuery<PageQuery>,
) -> AppResult<Json<ApiResponse<CatalogPage<MovieCard>>>> {
    let page = interactions::browse_genre(&state.store, &state.tmdb, genre_id, q.page()?).await;
    Ok(ApiResponse::data(page))
}

pub async fn trending(
    State(state): State<Arc<AppState>>,
    ApiQuery(q): ApiQuery<TrendingQuery>,
) -> Json<ApiResponse<CatalogPage<MovieCard>>> {
    ApiResponse::data(state.tmdb.trending(q.time_window).await.map(MovieCard::from))
}

pub async fn now_playing(
    State(state): State<Arc<AppState>>,
    ApiQuery(q): ApiQuery<PageQuery>,
) -> AppResult<Json<ApiResponse<CatalogPage<MovieCard>>>> {
    let page = interactions::now_playing(&state.store, &state.tmdb, q.page()?).await;
    Ok(ApiResponse::data(page))
}

pub async fn top_rated(
    State(state): State<Arc<AppState>>,
    ApiQuery(q): ApiQuery<PageQuery>,
) -> AppResult<Json<ApiResponse<CatalogPage<MovieCard>>>> {
    let page = state.tmdb.top_rated(q.page()?).await;
    Ok(ApiResponse::data(page.map(MovieCard::from)))
}

pub async fn popular(
    State(state): State<Arc<AppState>>,
    ApiQuery(q): ApiQuery<PageQuery>,
) -> AppResult<Json<ApiResponse<CatalogPage<MovieCard>>>> {
    let page = state.tmdb.popular(q.page()?).await;
    Ok(ApiResponse::data(page.map(MovieCard::from)))
}

pub async fn most_reviewed(
    State(state): State<Arc<AppState>>,
    ApiQuery(q): ApiQuery<LimitQuery>,
) -> Json<ApiResponse<Vec<MostReviewedMovie>>> {
    ApiResponse::data(interactions::most_reviewed(&state.store, q.limit).await)
}

pub async fn add_to_list(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    ApiJson(req): ApiJson<ListRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    let added = interactions::add_to_list(
        &state.store,
        &state.tmdb,
        user_id,
        req.movie_id,
        req.list_type,
    )
    .await?;

    let message = if added {
        format!("movie added to {}", req.list_type)
    } else {
        format!("movie already in {}", req.list_type)
    };
    Ok(done(message))
}

pub async fn remove_from_list(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    ApiJson(req): ApiJson<ListRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    interactions::remove_from_list(&state.store, user_id, req.movie_id, req.list_type).await?;
    Ok(done(format!("movie removed from {}", req.list_type)))
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    ApiPath(list_type): ApiPath<ListType>,
) -> AppResult<Json<ApiResponse<Vec<ListedMovie>>>> {
    let movies = interactions::list(&state.store, user_id, list_type).await?;
    Ok(ApiResponse::data(movies))
}

pub async fn rate(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    ApiJson(req): ApiJson<RateRequest>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let rating =
        interactions::rate(&state.store, &state.tmdb, user_id, req.movie_id, req.rating).await?;
    Ok(ApiResponse::with_message(
        "rating saved",
        serde_json::json!({ "movieId": req.movie_id, "rating": rating }),
    ))
}

pub async fn submit_review(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    ApiJson(req): ApiJson<ReviewRequest>,
) -> AppResult<Json<ReviewResponse>> {
    let review = interactions::submit_review(
        &state.store,
        &state.tmdb,
        user_id,
        req.movie_id,
        &req.review_text,
    )
    .await?;
    Ok(Json(ReviewResponse { success: true, message: "review saved", review }))
}

pub async fn update_review(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    ApiPath(review_id): ApiPath<i32>,
    ApiJson(req): ApiJson<ReviewUpdateRequest>,
) -> AppResult<Json<ReviewResponse>> {
    let review =
        interactions::update_review(&state.store, user_id, review_id, &req.review_text).await?;
    Ok(Json(ReviewResponse { success: true, message: "review updated", review }))
}

pub async fn delete_review(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    ApiPath(review_id): ApiPath<i32>,
) -> AppResult<Json<ApiResponse<()>>> {
    interactions::delete_review(&state.store, user_id, review_id).await?;
    Ok(done("review deleted"))
}

pub async fn movie_status(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    ApiPath(movie_id): ApiPath<i32>,
) -> AppResult<Json<ApiResponse<StatusView>>> {
    let status = interactions::status(&state.store, user_id, movie_id).await?;
    Ok(ApiResponse::data(status.into()))
}

pub async fn profile(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<ApiResponse<Profile>>> {
    Ok(ApiResponse::data(interactions::profile(&state.store, user_id).await?))
}

pub async fn user_reviews(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<ApiResponse<Vec<UserReview>>>> {
    Ok(ApiResponse::data(interactions::user_reviews(&state.store, user_id).await?))
}

pub async fn update_username(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    ApiJson(req): ApiJson<UsernameRequest>,
) -> AppResult<Json<UserResponse>> {
    let user = interactions::update_username(&state.store, user_id, &req.new_username).await?;
    Ok(Json(UserResponse { success: true, message: Some("username updated"), user }))
}

#[cfg(test)]
mod tests {
    use axum::{
        Router,
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode, header},
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crate::{app, test_state};

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };

        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json =
            if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, json)
    }

    async fn register_alice(app: &Router) -> String {
        let (status, body) = send(
            app,
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({"username": "alice", "email": "a@x.com", "password": "secret1"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn missing_token_is_401_and_bad_token_is_403() {
        let app = app(test_state().await, &[]);

        let (status, body) = send(&app, Method::GET, "/api/user/profile", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);

        let (status, _) =
            send(&app, Method::GET, "/api/user/profile", Some("not-a-jwt"), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn malformed_bodies_are_rejected_as_validation_errors() {
        let app = app(test_state().await, &[]);
        let token = register_alice(&app).await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/user/add-to-list",
            Some(&token),
            Some(json!({"movieId": 42, "listType": "favourites"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/user/rate",
            Some(&token),
            Some(json!({"movieId": 42, "rating": 5, "extra": true})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        for uri in ["/api/movies/now-playing?page=0", "/api/movies/popular?page=300000000"] {
            let (status, _) = send(&app, Method::GET, uri, None, None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        }
    }

    #[tokio::test]
    async fn duplicate_registration_is_a_conflict() {
        let app = app(test_state().await, &[]);
        register_alice(&app).await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({"username": "alice2", "email": "a@x.com", "password": "secret1"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "email is already in use");
    }

    #[tokio::test]
    async fn login_failures_share_one_message() {
        let app = app(test_state().await, &[]);
        register_alice(&app).await;

        let (wrong_pw, a) = send(
            &app,
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({"email": "a@x.com", "password": "wrong-password"})),
        )
        .await;
        let (no_user, b) = send(
            &app,
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({"email": "nobody@x.com", "password": "secret1"})),
        )
        .await;
        assert_eq!(wrong_pw, StatusCode::UNAUTHORIZED);
        assert_eq!(no_user, StatusCode::UNAUTHORIZED);
        assert_eq!(a["message"], b["message"]);
    }

    #[tokio::test]
    async fn watchlist_round_trip_over_http() {
        let app = app(test_state().await, &[]);
        let token = register_alice(&app).await;
        let entry = json!({"movieId": 42, "listType": "watchlist"});

        let (status, _) =
            send(&app, Method::POST, "/api/user/add-to-list", Some(&token), Some(entry.clone()))
                .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) =
            send(&app, Method::GET, "/api/user/movie-status/42", Some(&token), None).await;
        assert_eq!(body["data"]["lists"], json!(["watchlist"]));
        assert_eq!(body["data"]["in_watchlist"], true);
        assert_eq!(body["data"]["in_watched"], false);

        let (_, body) = send(&app, Method::GET, "/api/movies/42", Some(&token), None).await;
        assert_eq!(body["data"]["user_data"]["in_watchlist"], true);
        assert_eq!(body["data"]["user_data"]["in_watched"], false);
        assert_eq!(body["data"]["user_data"]["lists"], json!(["watchlist"]));

        let (_, body) =
            send(&app, Method::GET, "/api/user/lists/watchlist", Some(&token), None).await;
        assert_eq!(body["data"][0]["id"], 42);

        let (status, _) =
            send(&app, Method::DELETE, "/api/user/remove-from-list", Some(&token), Some(entry))
                .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) =
            send(&app, Method::GET, "/api/user/movie-status/42", Some(&token), None).await;
        assert_eq!(body["data"], json!({
            "lists": [], "rating": null, "review": null,
            "in_watchlist": false, "in_watched": false,
        }));
    }

    #[tokio::test]
    async fn review_lifecycle_over_http() {
        let app = app(test_state().await, &[]);
        let token = register_alice(&app).await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/user/review",
            Some(&token),
            Some(json!({"movieId": 7, "reviewText": "solid"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["review"]["username"], "alice");
        let review_id = body["review"]["id"].as_i64().unwrap();

        let (status, body) = send(
            &app,
            Method::PUT,
            &format!("/api/user/review/{review_id}"),
            Some(&token),
            Some(json!({"reviewText": "   "})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

        let (_, body) = send(&app, Method::GET, "/api/movies/7", None, None).await;
        assert_eq!(body["data"]["reviews"][0]["review_text"], "solid");
        assert!(body["data"]["user_data"].is_null());

        let (_, body) = send(&app, Method::GET, "/api/movies/most-reviewed", None, None).await;
        assert_eq!(body["data"][0]["id"], 7);
        assert_eq!(body["data"][0]["review_count"], 1);

        let (status, _) = send(
            &app,
            Method::DELETE,
            &format!("/api/user/review/{review_id}"),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(&app, Method::GET, "/api/user/reviews", Some(&token), None).await;
        assert_eq!(body["data"], json!([]));
    }

    #[tokio::test]
    async fn public_catalog_routes_answer_in_mock_mode() {
        let app = app(test_state().await, &[]);

        for uri in [
            "/",
            "/api/health",
            "/api/genres",
            "/api/movies/popular",
            "/api/movies/trending?time_window=day",
            "/api/movies/top-rated?page=2",
            "/api/movies/genre/35",
            "/api/movies/search/matrix",
        ] {
            let (status, body) = send(&app, Method::GET, uri, None, None).await;
            assert_eq!(status, StatusCode::OK, "{uri}");
            assert_eq!(body["success"], true, "{uri}");
        }
    }
}
