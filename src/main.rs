mod auth;
mod config;
mod db;
mod entities;
mod error;
mod interactions;
mod models;
mod routes;
mod store;
mod tmdb;

use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{delete, get, post, put},
};
use tokio::signal;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::{auth::Authenticator, config::Config, store::Store, tmdb::TmdbClient};

pub struct AppState {
    pub store: Store,
    pub tmdb: Arc<TmdbClient>,
    pub auth: Authenticator,
    /// Hides the detail of 500-class errors from clients.
    pub production: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,cinelog=debug,sqlx=warn".to_string()),
        )
        .init();

    let config = Config::from_env()?;

    let http = wreq::Client::builder()
        .timeout(Duration::from_secs(config.tmdb_timeout_secs))
        .build()?;

    let db = db::connect_and_migrate(&config.database_url, config.db_max_connections).await?;

    let tmdb = TmdbClient::new(
        http,
        config.tmdb_api_key.clone(),
        config.tmdb_access_token.clone(),
        config.tmdb_base_url.clone(),
        config.tmdb_language.clone(),
        config.tmdb_rps,
    );
    let auth = Authenticator::new(
        &config.jwt_secret,
        config.token_ttl_days * 86_400,
        config.bcrypt_cost,
    );

    let state = Arc::new(AppState {
        store: Store::new(db.clone()),
        tmdb: Arc::new(tmdb),
        auth,
        production: config.production,
    });
    let app = app(state, &config.cors_origins);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    info!(addr = %config.addr, production = config.production, "listening");
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    db.close().await?;
    info!("database pool closed");
    Ok(())
}

pub fn app(state: Arc<AppState>, cors_origins: &[String]) -> Router {
    let api = Router::new()
        .route("/health", get(routes::health))
        .route("/genres", get(routes::genres))
        .route("/auth/register", post(routes::register))
        .route("/auth/login", post(routes::login))
        .route("/auth/me", get(routes::me))
        .route("/movies/search/{query}", get(routes::search))
        .route("/movies/genre/{genre_id}", get(routes::by_genre))
        .route("/movies/trending", get(routes::trending))
        .route("/movies/now-playing", get(routes::now_playing))
        .route("/movies/top-rated", get(routes::top_rated))
        .route("/movies/popular", get(routes::popular))
        .route("/movies/most-reviewed", get(routes::most_reviewed))
        .route("/movies/{movie_id}", get(routes::movie_detail))
        .route("/user/add-to-list", post(routes::add_to_list))
        .route("/user/remove-from-list", delete(routes::remove_from_list))
        .route("/user/lists/{list_type}", get(routes::list))
        .route("/user/rate", post(routes::rate))
        .route("/user/review", post(routes::submit_review))
        .route(
            "/user/review/{review_id}",
            put(routes::update_review).delete(routes::delete_review),
        )
        .route("/user/movie-status/{movie_id}", get(routes::movie_status))
        .route("/user/profile", get(routes::profile))
        .route("/user/reviews", get(routes::user_reviews))
        .route("/user/username", put(routes::update_username));

    let origins =
        cors_origins.iter().filter_map(|o| o.parse::<HeaderValue>().ok()).collect::<Vec<_>>();
    let expose_errors = !state.production;
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(routes::index))
        .nest("/api", api)
        .with_state(state)
        .layer(middleware::map_response_with_state(expose_errors, error::reveal_error_detail))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("received Ctrl+C, shutting down"),
            Err(err) => {
                warn!(error = %err, "failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("received SIGTERM, shutting down");
            },
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Fresh in-memory database and a mock-mode catalog client.
#[cfg(test)]
pub async fn test_state() -> Arc<AppState> {
    let store = Store::new(db::connect_in_memory().await);
    let tmdb = TmdbClient::new(
        wreq::Client::new(),
        String::new(),
        String::new(),
        "http://127.0.0.1:9".to_string(),
        "en-US".to_string(),
        100,
    );
    Arc::new(AppState {
        store,
        tmdb: Arc::new(tmdb),
        auth: Authenticator::new("test-secret", 7 * 86_400, 4),
        production: false,
    })
}
