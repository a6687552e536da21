use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    auth,
    entities::user_review,
    error::{AppError, AppResult},
    models::{
        ListType, ListedMovie, MostReviewedMovie, MovieReview, MovieStatus, Profile, ProfileStats,
        ReviewSummary, StatusView, UserProfile, UserReview, timestamp,
    },
    store::{ListedMovieRow, MostReviewedRow, MovieReviewRow, Store, UserReviewRow},
    tmdb::{self, CatalogMovie, CatalogPage, MovieCard, MovieDetails, TmdbClient},
};

pub const DEFAULT_MOST_REVIEWED: u64 = 8;
const MAX_MOST_REVIEWED: u64 = 100;

/// Movie page payload: catalog detail, credits, reviews, and the caller's status.
#[derive(Debug, Serialize)]
pub struct MovieDetail {
    #[serde(flatten)]
    pub details: MovieDetails,
    pub poster_url: Option<String>,
    pub backdrop_url: Option<String>,
    pub credits: Value,
    pub reviews: Vec<MovieReview>,
    pub user_data: Option<StatusView>,
}

pub async fn status(store: &Store, user_id: i32, movie_id: i32) -> AppResult<MovieStatus> {
    let lists = store.list_memberships(user_id, movie_id).await?;
    let rating = store.get_rating(user_id, movie_id).await?.map(|r| r.rating);
    let review = store.get_review_for(user_id, movie_id).await?.map(|r| ReviewSummary {
        id: r.id,
        review_text: r.review_text,
        created_at: timestamp(r.created_at),
    });

    if lists.is_empty() && rating.is_none() && review.is_none() {
        return Ok(MovieStatus::empty());
    }
    Ok(MovieStatus { lists, rating, review })
}

pub async fn list(store: &Store, user_id: i32, list_type: ListType) -> AppResult<Vec<ListedMovie>> {
    let rows = store.list_movies(user_id, list_type).await?;
    Ok(rows.into_iter().map(listed_movie).collect())
}

/// Counts are the lengths of the returned lists, never a separate query.
pub async fn profile(store: &Store, user_id: i32) -> AppResult<Profile> {
    let user = store
        .find_user_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("user not found".to_string()))?;

    let watchlist = list(store, user_id, ListType::Watchlist).await?;
    let watched = list(store, user_id, ListType::Watched).await?;
    let stats = ProfileStats { watchlist_count: watchlist.len(), watched_count: watched.len() };

    Ok(Profile { user: user.into(), watchlist, watched, stats })
}

/// Leaderboard of reviewed movies. A failing query yields an empty board.
pub async fn most_reviewed(store: &Store, limit: u64) -> Vec<MostReviewedMovie> {
    let limit = match limit {
        0 => DEFAULT_MOST_REVIEWED,
        n => n.min(MAX_MOST_REVIEWED),
    };

    match store.most_reviewed(limit).await {
        Ok(rows) => rows.into_iter().map(most_reviewed_movie).collect(),
        Err(err) => {
            warn!(error = %err, "most reviewed query failed, serving empty list");
            Vec::new()
        },
    }
}

/// Fetches current catalog detail and caches it so relation rows can reference it.
async fn cache_movie(store: &Store, tmdb: &TmdbClient, movie_id: i32) -> AppResult<MovieDetails> {
    let details = tmdb.movie_details(movie_id).await?;
    store.upsert_movie(details.to_record()).await?;
    Ok(details)
}

pub async fn add_to_list(
    store: &Store,
    tmdb: &TmdbClient,
    user_id: i32,
    movie_id: i32,
    list_type: ListType,
) -> AppResult<bool> {
    cache_movie(store, tmdb, movie_id).await?;
    store.add_to_list(user_id, movie_id, list_type).await
}

pub async fn remove_from_list(
    store: &Store,
    user_id: i32,
    movie_id: i32,
    list_type: ListType,
) -> AppResult<bool> {
    store.remove_from_list(user_id, movie_id, list_type).await
}

pub async fn rate(
    store: &Store,
    tmdb: &TmdbClient,
    user_id: i32,
    movie_id: i32,
    rating: i32,
) -> AppResult<i32> {
    if !(1..=10).contains(&rating) {
        return Err(AppError::validation("rating must be between 1 and 10"));
    }

    cache_movie(store, tmdb, movie_id).await?;
    let saved = store.rate_movie(user_id, movie_id, rating).await?;
    Ok(saved.rating)
}

fn review_text(text: &str) -> AppResult<&str> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AppError::validation("review text must not be empty"));
    }
    Ok(text)
}

/// Creates the caller's review of a movie, or replaces its text if one exists.
pub async fn submit_review(
    store: &Store,
    tmdb: &TmdbClient,
    user_id: i32,
    movie_id: i32,
    text: &str,
) -> AppResult<MovieReview> {
    let text = review_text(text)?;

    cache_movie(store, tmdb, movie_id).await?;
    let review = store.upsert_review(user_id, movie_id, text).await?;
    review_view(store, review).await
}

/// Loads a review and checks that `user_id` wrote it. Nothing is written on failure.
async fn owned_review(
    store: &Store,
    user_id: i32,
    review_id: i32,
) -> AppResult<user_review::Model> {
    match store.get_review(review_id).await? {
        Some(review) if review.user_id == user_id => Ok(review),
        Some(review) => {
            warn!(user_id, review_id, owner = review.user_id, "review ownership mismatch");
            Err(AppError::Authorization("you can only modify your own reviews".to_string()))
        },
        None => Err(AppError::Authorization("review not found or not yours".to_string())),
    }
}

pub async fn update_review(
    store: &Store,
    user_id: i32,
    review_id: i32,
    text: &str,
) -> AppResult<MovieReview> {
    let text = review_text(text)?;
    owned_review(store, user_id, review_id).await?;

    let review = store
        .update_review(review_id, text)
        .await?
        .ok_or_else(|| AppError::NotFound("review not found".to_string()))?;
    review_view(store, review).await
}

pub async fn delete_review(store: &Store, user_id: i32, review_id: i32) -> AppResult<()> {
    owned_review(store, user_id, review_id).await?;
    store.delete_review(review_id).await?;
    info!(user_id, review_id, "review deleted");
    Ok(())
}

async fn review_view(store: &Store, review: user_review::Model) -> AppResult<MovieReview> {
    let author = store
        .find_user_by_id(review.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("review author not found".to_string()))?;
    let rating = store.get_rating(review.user_id, review.movie_id).await?.map(|r| r.rating);

    Ok(MovieReview {
        id: review.id,
        user_id: review.user_id,
        username: author.username,
        review_text: review.review_text,
        created_at: timestamp(review.created_at),
        updated_at: timestamp(review.updated_at),
        rating,
    })
}

pub async fn user_reviews(store: &Store, user_id: i32) -> AppResult<Vec<UserReview>> {
    let rows = store.user_reviews(user_id).await?;
    Ok(rows.into_iter().map(authored_review).collect())
}

pub async fn update_username(
    store: &Store,
    user_id: i32,
    new_username: &str,
) -> AppResult<UserProfile> {
    let new_username = new_username.trim();
    auth::validate_username(new_username)?;

    if store.find_user_by_username(new_username).await?.is_some_and(|u| u.id != user_id) {
        return Err(AppError::Conflict("username is already taken".to_string()));
    }

    let user = store
        .update_username(user_id, new_username)
        .await?
        .ok_or_else(|| AppError::NotFound("user not found".to_string()))?;
    Ok(user.into())
}

/// Detail and credits are fetched concurrently; the cache write is best effort.
pub async fn movie_detail(
    store: &Store,
    tmdb: &TmdbClient,
    movie_id: i32,
    caller: Option<i32>,
) -> AppResult<MovieDetail> {
    let (details, credits) =
        futures::try_join!(tmdb.movie_details(movie_id), tmdb.movie_credits(movie_id))?;

    if let Err(err) = store.upsert_movie(details.to_record()).await {
        warn!(movie_id, error = %err, "failed to cache viewed movie");
    }

    let reviews = store.movie_reviews(movie_id).await?.into_iter().map(movie_review).collect();
    let user_data = match caller {
        Some(user_id) => Some(status(store, user_id, movie_id).await?.into()),
        None => None,
    };

    Ok(MovieDetail {
        poster_url: tmdb::poster_url(details.poster_path.as_deref()),
        backdrop_url: tmdb::backdrop_url(details.backdrop_path.as_deref()),
        details,
        credits,
        reviews,
        user_data,
    })
}

pub async fn browse_genre(
    store: &Store,
    tmdb: &TmdbClient,
    genre_id: i32,
    page: u32,
) -> CatalogPage<MovieCard> {
    let listing = tmdb.by_genre(genre_id, page).await;
    cache_page(store, &listing).await;
    listing.map(MovieCard::from)
}

pub async fn now_playing(store: &Store, tmdb: &TmdbClient, page: u32) -> CatalogPage<MovieCard> {
    let listing = tmdb.now_playing(page).await;
    cache_page(store, &listing).await;
    listing.map(MovieCard::from)
}

async fn cache_page(store: &Store, listing: &CatalogPage<CatalogMovie>) {
    let records = listing.results.iter().map(CatalogMovie::to_record).collect::<Vec<_>>();
    let count = records.len();
    match store.upsert_movies(records).await {
        Ok(()) => debug!(rows = count, "listing cached"),
        Err(err) => warn!(rows = count, error = %err, "failed to cache listing"),
    }
}

fn listed_movie(row: ListedMovieRow) -> ListedMovie {
    ListedMovie {
        poster_url: tmdb::poster_url(row.poster_path.as_deref()),
        backdrop_url: tmdb::backdrop_url(row.backdrop_path.as_deref()),
        id: row.id,
        title: row.title,
        overview: row.overview,
        poster_path: row.poster_path,
        backdrop_path: row.backdrop_path,
        release_date: row.release_date,
        vote_average: row.vote_average,
        added_at: timestamp(row.added_at),
        rating: row.rating,
        review_text: row.review_text,
    }
}

fn movie_review(row: MovieReviewRow) -> MovieReview {
    MovieReview {
        id: row.id,
        user_id: row.user_id,
        username: row.username,
        review_text: row.review_text,
        created_at: timestamp(row.created_at),
        updated_at: timestamp(row.updated_at),
        rating: row.rating,
    }
}

fn authored_review(row: UserReviewRow) -> UserReview {
    UserReview {
        poster_url: tmdb::poster_url(row.poster_path.as_deref()),
        id: row.id,
        review_text: row.review_text,
        created_at: timestamp(row.created_at),
        updated_at: timestamp(row.updated_at),
        movie_id: row.movie_id,
        movie_title: row.movie_title,
        poster_path: row.poster_path,
        release_date: row.release_date,
        rating: row.rating,
    }
}

fn most_reviewed_movie(row: MostReviewedRow) -> MostReviewedMovie {
    MostReviewedMovie {
        poster_url: tmdb::poster_url(row.poster_path.as_deref()),
        backdrop_url: tmdb::backdrop_url(row.backdrop_path.as_deref()),
        id: row.id,
        title: row.title,
        overview: row.overview,
        poster_path: row.poster_path,
        backdrop_path: row.backdrop_path,
        release_date: row.release_date,
        vote_average: row.vote_average,
        review_count: row.review_count,
        avg_user_rating: (row.avg_user_rating * 10.0).round() / 10.0,
    }
}
