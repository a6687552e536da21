use std::{num::NonZeroU32, sync::Arc, time::Instant};

use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::{
    error::{AppError, AppResult},
    models::MovieRecord,
};

const IMAGE_BASE_URL: &str = "https://image.tmdb.org/t/p";
const POSTER_SIZE: &str = "w500";
const BACKDROP_SIZE: &str = "w1280";
/// Highest page the catalog serves for any listing.
pub const MAX_PAGE: u32 = 500;

fn image_url(size: &str, path: Option<&str>) -> Option<String> {
    path.filter(|p| !p.is_empty()).map(|p| format!("{IMAGE_BASE_URL}/{size}{p}"))
}

pub fn poster_url(path: Option<&str>) -> Option<String> {
    image_url(POSTER_SIZE, path)
}

pub fn backdrop_url(path: Option<&str>) -> Option<String> {
    image_url(BACKDROP_SIZE, path)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Genre {
    pub id: i32,
    pub name: String,
}

/// A movie as it appears in catalog listings. Unmodelled fields pass through untouched.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CatalogMovie {
    pub id: i32,
    #[serde(default)]
    pub title: String,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub release_date: Option<String>,
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub genre_ids: Vec<i32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CatalogMovie {
    pub fn to_record(&self) -> MovieRecord {
        MovieRecord {
            id: self.id,
            title: self.title.clone(),
            overview: self.overview.clone(),
            poster_path: self.poster_path.clone(),
            backdrop_path: self.backdrop_path.clone(),
            release_date: self.release_date.clone(),
            vote_average: self.vote_average,
            genre_ids: self.genre_ids.clone(),
        }
    }
}

/// Full catalog detail for one movie.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MovieDetails {
    pub id: i32,
    #[serde(default)]
    pub title: String,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub release_date: Option<String>,
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub genres: Vec<Genre>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MovieDetails {
    pub fn to_record(&self) -> MovieRecord {
        MovieRecord {
            id: self.id,
            title: self.title.clone(),
            overview: self.overview.clone(),
            poster_path: self.poster_path.clone(),
            backdrop_path: self.backdrop_path.clone(),
            release_date: self.release_date.clone(),
            vote_average: self.vote_average,
            genre_ids: self.genres.iter().map(|g| g.id).collect(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CatalogPage<T> {
    pub page: u32,
    pub results: Vec<T>,
    pub total_pages: u32,
    pub total_results: u32,
}

impl<T> CatalogPage<T> {
    pub fn empty() -> Self {
        Self { page: 1, results: Vec::new(), total_pages: 0, total_results: 0 }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> CatalogPage<U> {
        CatalogPage {
            page: self.page,
            results: self.results.into_iter().map(f).collect(),
            total_pages: self.total_pages,
            total_results: self.total_results,
        }
    }
}

/// A listing entry decorated with absolute image URLs.
#[derive(Clone, Debug, Serialize)]
pub struct MovieCard {
    #[serde(flatten)]
    pub movie: CatalogMovie,
    pub poster_url: Option<String>,
    pub backdrop_url: Option<String>,
}

impl From<CatalogMovie> for MovieCard {
    fn from(movie: CatalogMovie) -> Self {
        let poster_url = poster_url(movie.poster_path.as_deref());
        let backdrop_url = backdrop_url(movie.backdrop_path.as_deref());
        Self { movie, poster_url, backdrop_url }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeWindow {
    Day,
    #[default]
    Week,
}

impl TimeWindow {
    fn as_str(self) -> &'static str {
        match self {
            TimeWindow::Day => "day",
            TimeWindow::Week => "week",
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenreList {
    genres: Vec<Genre>,
}

enum Credential {
    Mock,
    ApiKey(String),
    Bearer(String),
}

pub struct TmdbClient {
    client: wreq::Client,
    credential: Credential,
    base_url: String,
    language: String,
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl TmdbClient {
    pub fn new(
        client: wreq::Client,
        api_key: String,
        access_token: String,
        base_url: String,
        language: String,
        rps: u32,
    ) -> Self {
        let credential = if !access_token.trim().is_empty() {
            Credential::Bearer(access_token)
        } else if !api_key.trim().is_empty() {
            Credential::ApiKey(api_key)
        } else {
            warn!("Using mock TMDB data - neither TMDB_ACCESS_TOKEN nor TMDB_API_KEY provided");
            Credential::Mock
        };

        let quota = Quota::per_second(NonZeroU32::new(rps).unwrap_or(NonZeroU32::MIN));
        let limiter = Arc::new(RateLimiter::direct(quota));
        Self { client, credential, base_url, language, limiter }
    }

    fn is_mock(&self) -> bool {
        matches!(self.credential, Credential::Mock)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> AppResult<T> {
        self.limiter.until_ready().await;

        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        let mut req =
            self.client.get(url).query(&[("language", self.language.as_str())]).query(params);
        req = match &self.credential {
            Credential::Bearer(token) => req.bearer_auth(token),
            Credential::ApiKey(key) => req.query(&[("api_key", key.as_str())]),
            Credential::Mock => req,
        };

        let started = Instant::now();
        let resp = req.send().await?;
        let status = resp.status();
        debug!(
            endpoint = path,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "catalog response"
        );

        if status.as_u16() == 404 {
            return Err(AppError::NotFound(format!("{path} not found in catalog")));
        }

        Ok(resp.error_for_status()?.json::<T>().await?)
    }

    /// Listing call that degrades to an empty page instead of failing.
    async fn browse(&self, path: &str, params: &[(&str, String)]) -> CatalogPage<CatalogMovie> {
        match self.get(path, params).await {
            Ok(page) => page,
            Err(err) => {
                warn!(
                    endpoint = path,
                    error = %err,
                    "catalog listing unavailable, serving empty page"
                );
                CatalogPage::empty()
            },
        }
    }

    pub async fn movie_details(&self, movie_id: i32) -> AppResult<MovieDetails> {
        if self.is_mock() {
            return Ok(mock::details(movie_id));
        }
        self.get(&format!("/movie/{movie_id}"), &[]).await
    }

    pub async fn movie_credits(&self, movie_id: i32) -> AppResult<Value> {
        if self.is_mock() {
            return Ok(mock::credits(movie_id));
        }
        self.get(&format!("/movie/{movie_id}/credits"), &[]).await
    }

    pub async fn search(&self, query: &str, page: u32) -> AppResult<CatalogPage<CatalogMovie>> {
        if self.is_mock() {
            return Ok(mock::search(query, page));
        }
        self.get("/search/movie", &[("query", query.to_string()), ("page", page.to_string())])
            .await
    }

    pub async fn now_playing(&self, page: u32) -> CatalogPage<CatalogMovie> {
        if self.is_mock() {
            return mock::page(page, None);
        }
        self.browse("/movie/now_playing", &[("page", page.to_string())]).await
    }

    pub async fn top_rated(&self, page: u32) -> CatalogPage<CatalogMovie> {
        if self.is_mock() {
            return mock::page(page, None);
        }
        self.browse("/movie/top_rated", &[("page", page.to_string())]).await
    }

    pub async fn popular(&self, page: u32) -> CatalogPage<CatalogMovie> {
        if self.is_mock() {
            return mock::page(page, None);
        }
        self.browse("/movie/popular", &[("page", page.to_string())]).await
    }

    pub async fn trending(&self, window: TimeWindow) -> CatalogPage<CatalogMovie> {
        if self.is_mock() {
            return mock::page(1, None);
        }
        self.browse(&format!("/trending/movie/{}", window.as_str()), &[]).await
    }

    pub async fn by_genre(&self, genre_id: i32, page: u32) -> CatalogPage<CatalogMovie> {
        if self.is_mock() {
            return mock::page(page, Some(genre_id));
        }
        self.browse(
            "/discover/movie",
            &[
                ("with_genres", genre_id.to_string()),
                ("page", page.to_string()),
                ("sort_by", "popularity.desc".to_string()),
            ],
        )
        .await
    }

    pub async fn genres(&self) -> Vec<Genre> {
        if self.is_mock() {
            return mock::genres();
        }
        match self.get::<GenreList>("/genre/movie/list", &[]).await {
            Ok(list) => list.genres,
            Err(err) => {
                warn!(error = %err, "genre list unavailable");
                Vec::new()
            },
        }
    }
}

/// Deterministic stand-ins served when no catalog credentials are configured.
mod mock {
    use serde_json::{Map, Value, json};

    use super::{CatalogMovie, CatalogPage, Genre, MovieDetails};

    const PAGE_SIZE: i32 = 3;

    pub fn details(movie_id: i32) -> MovieDetails {
        MovieDetails {
            id: movie_id,
            title: format!("Mock Movie {movie_id}"),
            overview: Some("Mock overview".to_string()),
            poster_path: Some(format!("/mock-{movie_id}.jpg")),
            backdrop_path: None,
            release_date: Some("2024-01-01".to_string()),
            vote_average: Some(7.5),
            genres: vec![Genre { id: 28, name: "Action".to_string() }],
            extra: Map::new(),
        }
    }

    pub fn credits(movie_id: i32) -> Value {
        json!({ "id": movie_id, "cast": [], "crew": [] })
    }

    fn movie(id: i32, title: String, genre_id: Option<i32>) -> CatalogMovie {
        CatalogMovie {
            id,
            title,
            overview: Some("Mock overview".to_string()),
            poster_path: Some(format!("/mock-{id}.jpg")),
            backdrop_path: Some(format!("/mock-backdrop-{id}.jpg")),
            release_date: Some("2024-01-01".to_string()),
            vote_average: Some(7.5),
            genre_ids: genre_id.into_iter().collect(),
            extra: Map::new(),
        }
    }

    pub fn page(page: u32, genre_id: Option<i32>) -> CatalogPage<CatalogMovie> {
        let base = 1000 + page.min(MAX_PAGE) as i32 * 10;
        CatalogPage {
            page,
            results: (1..=PAGE_SIZE)
                .map(|i| movie(base + i, format!("Mock Movie {}", base + i), genre_id))
                .collect(),
            total_pages: 5,
            total_results: 5 * PAGE_SIZE as u32,
        }
    }

    pub fn search(query: &str, page: u32) -> CatalogPage<CatalogMovie> {
        CatalogPage {
            page,
            results: vec![movie(900, query.to_string(), None)],
            total_pages: 1,
            total_results: 1,
        }
    }

    pub fn genres() -> Vec<Genre> {
        vec![
            Genre { id: 28, name: "Action".to_string() },
            Genre { id: 35, name: "Comedy".to_string() },
            Genre { id: 18, name: "Drama".to_string() },
        ]
    }
}
