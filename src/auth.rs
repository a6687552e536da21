use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    AppState,
    error::{AppError, AppResult},
    models::{LoginRequest, RegisterRequest, UserProfile},
    store::Store,
};

const MIN_PASSWORD_LEN: usize = 6;
// bcrypt only looks at the first 72 bytes.
const MAX_PASSWORD_BYTES: usize = 72;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    #[serde(rename = "userId")]
    user_id: i32,
    iat: i64,
    exp: i64,
}

/// Password hashing and bearer-token issuance/verification.
pub struct Authenticator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl_seconds: i64,
    bcrypt_cost: u32,
}

impl Authenticator {
    pub fn new(secret: &str, ttl_seconds: i64, bcrypt_cost: u32) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
            ttl_seconds,
            bcrypt_cost,
        }
    }

    pub fn issue_token(&self, user_id: i32) -> AppResult<String> {
        let now = jiff::Timestamp::now().as_second();
        let claims = Claims { user_id, iat: now, exp: now + self.ttl_seconds };
        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .context("sign token")?;
        Ok(token)
    }

    /// Yields the user id bound to `token`, or `InvalidCredential` on any failure.
    pub fn verify_token(&self, token: &str) -> AppResult<i32> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims.user_id)
            .map_err(|err| {
                debug!(error = %err, "token rejected");
                AppError::InvalidCredential
            })
    }

    pub async fn hash_password(&self, password: &str) -> AppResult<String> {
        let password = password.to_owned();
        let cost = self.bcrypt_cost;
        let hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .context("password hashing task")?
            .context("hash password")?;
        Ok(hash)
    }

    pub async fn verify_password(&self, password: &str, hash: &str) -> AppResult<bool> {
        let password = password.to_owned();
        let hash = hash.to_owned();
        let ok = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .context("password verification task")?
            .context("verify password")?;
        Ok(ok)
    }
}

pub fn validate_username(username: &str) -> AppResult<()> {
    let len = username.chars().count();
    if len < 3 {
        return Err(AppError::validation("username must be at least 3 characters"));
    }
    if len > 20 {
        return Err(AppError::validation("username must be at most 20 characters"));
    }
    if !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(AppError::validation(
            "username may only contain letters, digits and underscores",
        ));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> AppResult<()> {
    let invalid = || AppError::validation("invalid email address");

    if email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    let dotted = domain.char_indices().any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len());
    if !dotted {
        return Err(invalid());
    }
    Ok(())
}

pub fn validate_password(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation("password must be at least 6 characters"));
    }
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(AppError::validation("password must be at most 72 bytes"));
    }
    Ok(())
}

/// Creates an account and returns it with a fresh bearer token.
pub async fn register(
    store: &Store,
    auth: &Authenticator,
    req: RegisterRequest,
) -> AppResult<(UserProfile, String)> {
    let email = req.email.trim();
    validate_username(&req.username)?;
    validate_email(email)?;
    validate_password(&req.password)?;

    if store.find_user_by_email(email).await?.is_some() {
        return Err(AppError::Conflict("email is already in use".to_string()));
    }
    if store.find_user_by_username(&req.username).await?.is_some() {
        return Err(AppError::Conflict("username is already taken".to_string()));
    }

    let hash = auth.hash_password(&req.password).await?;
    let user = store.create_user(&req.username, email, &hash).await?;
    let token = auth.issue_token(user.id)?;

    info!(user_id = user.id, "user registered");
    Ok((user.into(), token))
}

/// Checks credentials. Unknown email and wrong password fail identically.
pub async fn login(
    store: &Store,
    auth: &Authenticator,
    req: LoginRequest,
) -> AppResult<(UserProfile, String)> {
    let Some(user) = store.find_user_by_email(req.email.trim()).await? else {
        return Err(AppError::Authentication);
    };
    if !auth.verify_password(&req.password, &user.password_hash).await? {
        return Err(AppError::Authentication);
    }

    let token = auth.issue_token(user.id)?;
    debug!(user_id = user.id, "user logged in");
    Ok((user.into(), token))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Identity of a caller that must be authenticated: 401 without a token,
/// 403 with a bad one.
#[derive(Clone, Copy, Debug)]
pub struct AuthUser(pub i32);

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or(AppError::MissingCredential)?;
        state.auth.verify_token(token).map(AuthUser)
    }
}

/// Identity of a caller that may be anonymous. Bad tokens count as anonymous.
#[derive(Clone, Copy, Debug)]
pub struct MaybeUser(pub Option<i32>);

impl FromRequestParts<Arc<AppState>> for MaybeUser {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user_id = bearer_token(&parts.headers).and_then(|t| state.auth.verify_token(t).ok());
        Ok(MaybeUser(user_id))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;
    use crate::db;

    fn authenticator() -> Authenticator {
        Authenticator::new("test-secret", 7 * 86_400, 4)
    }

    fn register_req(username: &str, email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[test]
    fn username_rules() {
        assert!(validate_username("alice_01").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("a".repeat(21).as_str()).is_err());
        assert!(validate_username("bad name").is_err());
        assert!(validate_username("çağrı").is_err());
    }

    #[test]
    fn email_rules() {
        assert!(validate_email("a@x.com").is_ok());
        assert!(validate_email("first.last@sub.example.org").is_ok());
        assert!(validate_email("no-at-sign.com").is_err());
        assert!(validate_email("a@nodot").is_err());
        assert!(validate_email("a@.com").is_err());
        assert!(validate_email("a@x.").is_err());
        assert!(validate_email("a b@x.com").is_err());
        assert!(validate_email("a@b@x.com").is_err());
    }

    #[test]
    fn password_rules() {
        assert!(validate_password("secret1").is_ok());
        assert!(validate_password("short").is_err());
        assert!(validate_password(&"x".repeat(73)).is_err());
    }

    #[test]
    fn token_round_trip() {
        let auth = authenticator();
        let token = auth.issue_token(42).unwrap();
        assert_eq!(auth.verify_token(&token).unwrap(), 42);
    }

    #[test]
    fn expired_token_is_rejected() {
        let auth = Authenticator::new("test-secret", -3_600, 4);
        let token = auth.issue_token(42).unwrap();
        assert!(matches!(auth.verify_token(&token), Err(AppError::InvalidCredential)));
    }

    #[test]
    fn foreign_signature_is_rejected() {
        let token = Authenticator::new("other-secret", 3_600, 4).issue_token(42).unwrap();
        assert!(matches!(authenticator().verify_token(&token), Err(AppError::InvalidCredential)));
        assert!(matches!(
            authenticator().verify_token("garbage"),
            Err(AppError::InvalidCredential)
        ));
    }

    #[test]
    fn bearer_header_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }

    #[tokio::test]
    async fn password_hash_is_salted_and_verifiable() {
        let auth = authenticator();
        let a = auth.hash_password("secret1").await.unwrap();
        let b = auth.hash_password("secret1").await.unwrap();
        assert_ne!(a, b);
        assert_ne!(a, "secret1");
        assert!(auth.verify_password("secret1", &a).await.unwrap());
        assert!(!auth.verify_password("secret2", &a).await.unwrap());
    }

    #[tokio::test]
    async fn register_rejects_duplicate_email_and_username() {
        let store = Store::new(db::connect_in_memory().await);
        let auth = authenticator();

        let (user, token) =
            register(&store, &auth, register_req("alice", "a@x.com", "secret1")).await.unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(auth.verify_token(&token).unwrap(), user.id);

        let stored = store.find_user_by_id(user.id).await.unwrap().unwrap();
        assert_ne!(stored.password_hash, "secret1");

        let dup_email = register(&store, &auth, register_req("bob", "a@x.com", "secret1")).await;
        assert!(matches!(dup_email, Err(AppError::Conflict(_))));

        let dup_name = register(&store, &auth, register_req("alice", "b@x.com", "secret1")).await;
        assert!(matches!(dup_name, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn register_validates_before_touching_the_store() {
        let store = Store::new(db::connect_in_memory().await);
        let auth = authenticator();

        let bad = register(&store, &auth, register_req("al", "a@x.com", "secret1")).await;
        assert!(matches!(bad, Err(AppError::Validation(_))));
        let bad = register(&store, &auth, register_req("alice", "not-an-email", "secret1")).await;
        assert!(matches!(bad, Err(AppError::Validation(_))));
        let bad = register(&store, &auth, register_req("alice", "a@x.com", "123")).await;
        assert!(matches!(bad, Err(AppError::Validation(_))));

        assert!(store.find_user_by_email("a@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn login_failures_are_indistinguishable() {
        let store = Store::new(db::connect_in_memory().await);
        let auth = authenticator();
        register(&store, &auth, register_req("alice", "a@x.com", "secret1")).await.unwrap();

        let wrong_password = login(
            &store,
            &auth,
            LoginRequest { email: "a@x.com".into(), password: "wrong-pass".into() },
        )
        .await
        .unwrap_err();
        let unknown_email = login(
            &store,
            &auth,
            LoginRequest { email: "nobody@x.com".into(), password: "secret1".into() },
        )
        .await
        .unwrap_err();

        assert!(matches!(wrong_password, AppError::Authentication));
        assert!(matches!(unknown_email, AppError::Authentication));
        assert_eq!(wrong_password.to_string(), unknown_email.to_string());

        let (user, token) = login(
            &store,
            &auth,
            LoginRequest { email: "a@x.com".into(), password: "secret1".into() },
        )
        .await
        .unwrap();
        assert_eq!(auth.verify_token(&token).unwrap(), user.id);
    }
}
