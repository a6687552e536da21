use jiff::Timestamp;
use sea_orm::Set;
use serde::{Deserialize, Serialize};

use crate::entities::{movie, user};
pub use crate::entities::user_movie::ListType;

/// Converts a stored Unix-seconds column into a timestamp for JSON output.
pub fn timestamp(seconds: i64) -> Timestamp {
    Timestamp::from_second(seconds).unwrap_or(Timestamp::UNIX_EPOCH)
}

/// Cache-entry shape of a catalog movie, ready to be upserted.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MovieRecord {
    pub id: i32,
    pub title: String,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub release_date: Option<String>,
    pub vote_average: Option<f64>,
    pub genre_ids: Vec<i32>,
}

impl MovieRecord {
    pub fn into_active_model(self) -> movie::ActiveModel {
        movie::ActiveModel {
            id: Set(self.id),
            title: Set(self.title),
            overview: Set(self.overview),
            poster_path: Set(self.poster_path),
            backdrop_path: Set(self.backdrop_path),
            release_date: Set(self.release_date),
            vote_average: Set(self.vote_average),
            genre_ids: Set(serde_json::Value::from(self.genre_ids)),
        }
    }
}

/// Public view of an account. The password hash never leaves the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub created_at: Timestamp,
}

impl From<user::Model> for UserProfile {
    fn from(u: user::Model) -> Self {
        Self { id: u.id, username: u.username, email: u.email, created_at: timestamp(u.created_at) }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReviewSummary {
    pub id: i32,
    pub review_text: String,
    pub created_at: Timestamp,
}

/// A user's combined interaction with one movie.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MovieStatus {
    pub lists: Vec<ListType>,
    pub rating: Option<i32>,
    pub review: Option<ReviewSummary>,
}

impl MovieStatus {
    pub fn empty() -> Self {
        Self { lists: Vec::new(), rating: None, review: None }
    }

    pub fn contains(&self, list_type: ListType) -> bool {
        self.lists.contains(&list_type)
    }
}

/// Status as served to clients, with per-list flags alongside the list set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StatusView {
    #[serde(flatten)]
    pub status: MovieStatus,
    pub in_watchlist: bool,
    pub in_watched: bool,
}

impl From<MovieStatus> for StatusView {
    fn from(status: MovieStatus) -> Self {
        Self {
            in_watchlist: status.contains(ListType::Watchlist),
            in_watched: status.contains(ListType::Watched),
            status,
        }
    }
}

/// A movie on one of the user's lists, with the user's own rating and review text.
#[derive(Clone, Debug, Serialize)]
pub struct ListedMovie {
    pub id: i32,
    pub title: String,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub release_date: Option<String>,
    pub vote_average: Option<f64>,
    pub added_at: Timestamp,
    pub rating: Option<i32>,
    pub review_text: Option<String>,
    pub poster_url: Option<String>,
    pub backdrop_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProfileStats {
    pub watchlist_count: usize,
    pub watched_count: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct Profile {
    pub user: UserProfile,
    pub watchlist: Vec<ListedMovie>,
    pub watched: Vec<ListedMovie>,
    pub stats: ProfileStats,
}

/// A review as shown on a movie page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MovieReview {
    pub id: i32,
    pub user_id: i32,
    pub username: String,
    pub review_text: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub rating: Option<i32>,
}

/// A review as shown on its author's review list.
#[derive(Clone, Debug, Serialize)]
pub struct UserReview {
    pub id: i32,
    pub review_text: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub movie_id: i32,
    pub movie_title: String,
    pub poster_path: Option<String>,
    pub release_date: Option<String>,
    pub rating: Option<i32>,
    pub poster_url: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct MostReviewedMovie {
    pub id: i32,
    pub title: String,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub release_date: Option<String>,
    pub vote_average: Option<f64>,
    pub review_count: i64,
    pub avg_user_rating: f64,
    pub poster_url: Option<String>,
    pub backdrop_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ListRequest {
    pub movie_id: i32,
    pub list_type: ListType,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RateRequest {
    pub movie_id: i32,
    pub rating: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReviewRequest {
    pub movie_id: i32,
    pub review_text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReviewUpdateRequest {
    pub review_text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UsernameRequest {
    pub new_username: String,
}
