use anyhow::anyhow;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, FromQueryResult,
    IntoActiveModel, JoinType, QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set,
    sea_query::{Expr, OnConflict},
};
use tracing::debug;

use crate::{
    entities::{
        movie, user,
        user_movie::{self, ListType},
        user_rating, user_review,
    },
    error::AppResult,
    models::MovieRecord,
};

#[derive(Debug, FromQueryResult)]
pub struct ListedMovieRow {
    pub id: i32,
    pub title: String,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub release_date: Option<String>,
    pub vote_average: Option<f64>,
    pub added_at: i64,
    pub rating: Option<i32>,
    pub review_text: Option<String>,
}

#[derive(Debug, FromQueryResult)]
pub struct MovieReviewRow {
    pub id: i32,
    pub user_id: i32,
    pub username: String,
    pub review_text: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub rating: Option<i32>,
}

#[derive(Debug, FromQueryResult)]
pub struct UserReviewRow {
    pub id: i32,
    pub review_text: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub movie_id: i32,
    pub movie_title: String,
    pub poster_path: Option<String>,
    pub release_date: Option<String>,
    pub rating: Option<i32>,
}

#[derive(Debug, FromQueryResult)]
pub struct MostReviewedRow {
    pub id: i32,
    pub title: String,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub release_date: Option<String>,
    pub vote_average: Option<f64>,
    pub review_count: i64,
    pub avg_user_rating: f64,
}

/// Typed accessors over the relational schema. Every method is one round trip
/// except the read-back after an upsert.
#[derive(Clone)]
pub struct Store {
    db: DatabaseConnection,
}

impl Store {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub async fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> AppResult<user::Model> {
        let model = user::ActiveModel {
            id: Default::default(),
            username: Set(username.to_string()),
            email: Set(email.to_string()),
            password_hash: Set(password_hash.to_string()),
            created_at: Set(now_sec()),
        };
        let user = model.insert(&self.db).await?;
        debug!(user_id = user.id, "user created");
        Ok(user)
    }

    pub async fn find_user_by_id(&self, user_id: i32) -> AppResult<Option<user::Model>> {
        Ok(user::Entity::find_by_id(user_id).one(&self.db).await?)
    }

    pub async fn find_user_by_email(&self, email: &str) -> AppResult<Option<user::Model>> {
        Ok(user::Entity::find().filter(user::Column::Email.eq(email)).one(&self.db).await?)
    }

    pub async fn find_user_by_username(&self, username: &str) -> AppResult<Option<user::Model>> {
        Ok(user::Entity::find().filter(user::Column::Username.eq(username)).one(&self.db).await?)
    }

    pub async fn update_username(
        &self,
        user_id: i32,
        username: &str,
    ) -> AppResult<Option<user::Model>> {
        let Some(existing) = self.find_user_by_id(user_id).await? else {
            return Ok(None);
        };
        let mut active = existing.into_active_model();
        active.username = Set(username.to_string());
        let updated = active.update(&self.db).await?;
        debug!(user_id, "username updated");
        Ok(Some(updated))
    }

    /// Insert-or-replace: every cached column takes the incoming value.
    pub async fn upsert_movie(&self, record: MovieRecord) -> AppResult<()> {
        let movie_id = record.id;
        movie::Entity::insert(record.into_active_model())
            .on_conflict(movie_upsert())
            .exec_without_returning(&self.db)
            .await?;
        debug!(movie_id, "movie cached");
        Ok(())
    }

    /// Same overwrite semantics as [`Store::upsert_movie`], one statement for the batch.
    pub async fn upsert_movies(&self, records: Vec<MovieRecord>) -> AppResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut records = records;
        // a duplicated id inside one multi-row upsert is rejected by Postgres
        records.sort_by_key(|r| r.id);
        records.dedup_by_key(|r| r.id);

        let count = records.len();
        movie::Entity::insert_many(records.into_iter().map(MovieRecord::into_active_model))
            .on_conflict(movie_upsert())
            .exec_without_returning(&self.db)
            .await?;
        debug!(rows = count, "movies cached");
        Ok(())
    }

    /// Returns `false` when the membership already existed.
    pub async fn add_to_list(
        &self,
        user_id: i32,
        movie_id: i32,
        list_type: ListType,
    ) -> AppResult<bool> {
        let model = user_movie::ActiveModel {
            id: Default::default(),
            user_id: Set(user_id),
            movie_id: Set(movie_id),
            list_type: Set(list_type),
            added_at: Set(now_sec()),
        };
        let rows = user_movie::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([
                    user_movie::Column::UserId,
                    user_movie::Column::MovieId,
                    user_movie::Column::ListType,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        debug!(user_id, movie_id, %list_type, inserted = rows > 0, "list add");
        Ok(rows > 0)
    }

    /// Returns `false` when there was nothing to remove.
    pub async fn remove_from_list(
        &self,
        user_id: i32,
        movie_id: i32,
        list_type: ListType,
    ) -> AppResult<bool> {
        let res = user_movie::Entity::delete_many()
            .filter(user_movie::Column::UserId.eq(user_id))
            .filter(user_movie::Column::MovieId.eq(movie_id))
            .filter(user_movie::Column::ListType.eq(list_type))
            .exec(&self.db)
            .await?;
        debug!(user_id, movie_id, %list_type, removed = res.rows_affected, "list remove");
        Ok(res.rows_affected > 0)
    }

    pub async fn list_memberships(&self, user_id: i32, movie_id: i32) -> AppResult<Vec<ListType>> {
        let rows = user_movie::Entity::find()
            .filter(user_movie::Column::UserId.eq(user_id))
            .filter(user_movie::Column::MovieId.eq(movie_id))
            .all(&self.db)
            .await?;
        let mut lists: Vec<ListType> = rows.into_iter().map(|r| r.list_type).collect();
        lists.sort();
        lists.dedup();
        Ok(lists)
    }

    /// One list of a user, newest first, with the user's own rating and review text.
    pub async fn list_movies(
        &self,
        user_id: i32,
        list_type: ListType,
    ) -> AppResult<Vec<ListedMovieRow>> {
        let rows = user_movie::Entity::find()
            .select_only()
            .column(movie::Column::Id)
            .column(movie::Column::Title)
            .column(movie::Column::Overview)
            .column(movie::Column::PosterPath)
            .column(movie::Column::BackdropPath)
            .column(movie::Column::ReleaseDate)
            .column(movie::Column::VoteAverage)
            .column(user_movie::Column::AddedAt)
            .column(user_rating::Column::Rating)
            .column(user_review::Column::ReviewText)
            .join(JoinType::InnerJoin, user_movie::Relation::Movie.def())
            .join(JoinType::LeftJoin, user_movie::Relation::OwnRating.def())
            .join(JoinType::LeftJoin, user_movie::Relation::OwnReview.def())
            .filter(user_movie::Column::UserId.eq(user_id))
            .filter(user_movie::Column::ListType.eq(list_type))
            .order_by_desc(user_movie::Column::AddedAt)
            .order_by_desc(user_movie::Column::Id)
            .into_model::<ListedMovieRow>()
            .all(&self.db)
            .await?;
        Ok(rows)
    }

    /// Overwrites any previous rating of the pair and refreshes `updated_at`.
    pub async fn rate_movie(
        &self,
        user_id: i32,
        movie_id: i32,
        rating: i32,
    ) -> AppResult<user_rating::Model> {
        let model = user_rating::ActiveModel {
            id: Default::default(),
            user_id: Set(user_id),
            movie_id: Set(movie_id),
            rating: Set(rating),
            updated_at: Set(now_sec()),
        };
        user_rating::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([user_rating::Column::UserId, user_rating::Column::MovieId])
                    .update_columns([user_rating::Column::Rating, user_rating::Column::UpdatedAt])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        debug!(user_id, movie_id, rating, "movie rated");

        self.get_rating(user_id, movie_id)
            .await?
            .ok_or_else(|| anyhow!("rating for movie {movie_id} missing after upsert").into())
    }

    pub async fn get_rating(
        &self,
        user_id: i32,
        movie_id: i32,
    ) -> AppResult<Option<user_rating::Model>> {
        Ok(user_rating::Entity::find()
            .filter(user_rating::Column::UserId.eq(user_id))
            .filter(user_rating::Column::MovieId.eq(movie_id))
            .one(&self.db)
            .await?)
    }

    /// Replaces the text of the pair's review if one exists; `created_at` and
    /// the review id survive.
    pub async fn upsert_review(
        &self,
        user_id: i32,
        movie_id: i32,
        review_text: &str,
    ) -> AppResult<user_review::Model> {
        let now = now_sec();
        let model = user_review::ActiveModel {
            id: Default::default(),
            user_id: Set(user_id),
            movie_id: Set(movie_id),
            review_text: Set(review_text.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        };
        user_review::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([user_review::Column::UserId, user_review::Column::MovieId])
                    .update_columns([
                        user_review::Column::ReviewText,
                        user_review::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        debug!(user_id, movie_id, "review saved");

        self.get_review_for(user_id, movie_id)
            .await?
            .ok_or_else(|| anyhow!("review for movie {movie_id} missing after upsert").into())
    }

    pub async fn get_review(&self, review_id: i32) -> AppResult<Option<user_review::Model>> {
        Ok(user_review::Entity::find_by_id(review_id).one(&self.db).await?)
    }

    pub async fn get_review_for(
        &self,
        user_id: i32,
        movie_id: i32,
    ) -> AppResult<Option<user_review::Model>> {
        Ok(user_review::Entity::find()
            .filter(user_review::Column::UserId.eq(user_id))
            .filter(user_review::Column::MovieId.eq(movie_id))
            .one(&self.db)
            .await?)
    }

    pub async fn update_review(
        &self,
        review_id: i32,
        review_text: &str,
    ) -> AppResult<Option<user_review::Model>> {
        let Some(existing) = self.get_review(review_id).await? else {
            return Ok(None);
        };
        let mut active = existing.into_active_model();
        active.review_text = Set(review_text.to_string());
        active.updated_at = Set(now_sec());
        let updated = active.update(&self.db).await?;
        debug!(review_id, "review updated");
        Ok(Some(updated))
    }

    pub async fn delete_review(&self, review_id: i32) -> AppResult<bool> {
        let res = user_review::Entity::delete_by_id(review_id).exec(&self.db).await?;
        debug!(review_id, removed = res.rows_affected, "review deleted");
        Ok(res.rows_affected > 0)
    }

    /// Reviews of one movie with author name and author rating, newest first.
    pub async fn movie_reviews(&self, movie_id: i32) -> AppResult<Vec<MovieReviewRow>> {
        let rows = user_review::Entity::find()
            .select_only()
            .column(user_review::Column::Id)
            .column(user_review::Column::UserId)
            .column(user::Column::Username)
            .column(user_review::Column::ReviewText)
            .column(user_review::Column::CreatedAt)
            .column(user_review::Column::UpdatedAt)
            .column(user_rating::Column::Rating)
            .join(JoinType::InnerJoin, user_review::Relation::User.def())
            .join(JoinType::LeftJoin, user_review::Relation::AuthorRating.def())
            .filter(user_review::Column::MovieId.eq(movie_id))
            .order_by_desc(user_review::Column::CreatedAt)
            .order_by_desc(user_review::Column::Id)
            .into_model::<MovieReviewRow>()
            .all(&self.db)
            .await?;
        Ok(rows)
    }

    /// Reviews written by one user with movie details and their rating, newest first.
    pub async fn user_reviews(&self, user_id: i32) -> AppResult<Vec<UserReviewRow>> {
        let rows = user_review::Entity::find()
            .select_only()
            .column(user_review::Column::Id)
            .column(user_review::Column::ReviewText)
            .column(user_review::Column::CreatedAt)
            .column(user_review::Column::UpdatedAt)
            .column_as(movie::Column::Id, "movie_id")
            .column_as(movie::Column::Title, "movie_title")
            .column(movie::Column::PosterPath)
            .column(movie::Column::ReleaseDate)
            .column(user_rating::Column::Rating)
            .join(JoinType::InnerJoin, user_review::Relation::Movie.def())
            .join(JoinType::LeftJoin, user_review::Relation::AuthorRating.def())
            .filter(user_review::Column::UserId.eq(user_id))
            .order_by_desc(user_review::Column::CreatedAt)
            .order_by_desc(user_review::Column::Id)
            .into_model::<UserReviewRow>()
            .all(&self.db)
            .await?;
        Ok(rows)
    }

    /// Movies with at least one review, ranked by review count then average rating.
    pub async fn most_reviewed(&self, limit: u64) -> AppResult<Vec<MostReviewedRow>> {
        let rows = movie::Entity::find()
            .select_only()
            .columns([
                movie::Column::Id,
                movie::Column::Title,
                movie::Column::Overview,
                movie::Column::PosterPath,
                movie::Column::BackdropPath,
                movie::Column::ReleaseDate,
                movie::Column::VoteAverage,
            ])
            .expr_as(Expr::cust("COUNT(DISTINCT user_reviews.id)"), "review_count")
            .expr_as(
                Expr::cust(
                    "CAST(COALESCE(ROUND(AVG(user_ratings.rating), 1), 0) AS DOUBLE PRECISION)",
                ),
                "avg_user_rating",
            )
            .join(JoinType::InnerJoin, movie::Relation::Reviews.def())
            .join(JoinType::LeftJoin, movie::Relation::Ratings.def())
            .group_by(movie::Column::Id)
            .order_by_desc(Expr::cust("review_count"))
            .order_by_desc(Expr::cust("avg_user_rating"))
            .order_by_asc(movie::Column::Id)
            .limit(limit)
            .into_model::<MostReviewedRow>()
            .all(&self.db)
            .await?;
        debug!(limit, rows = rows.len(), "most reviewed");
        Ok(rows)
    }
}

fn movie_upsert() -> OnConflict {
    OnConflict::column(movie::Column::Id)
        .update_columns([
            movie::Column::Title,
            movie::Column::Overview,
            movie::Column::PosterPath,
            movie::Column::BackdropPath,
            movie::Column::ReleaseDate,
            movie::Column::VoteAverage,
            movie::Column::GenreIds,
        ])
        .to_owned()
}

pub fn now_sec() -> i64 {
    jiff::Timestamp::now().as_second()
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::db;

    impl From<movie::Model> for MovieRecord {
        fn from(m: movie::Model) -> Self {
            Self {
                id: m.id,
                title: m.title,
                overview: m.overview,
                poster_path: m.poster_path,
                backdrop_path: m.backdrop_path,
                release_date: m.release_date,
                vote_average: m.vote_average,
                genre_ids: serde_json::from_value(m.genre_ids).unwrap(),
            }
        }
    }

    impl Store {
        pub async fn get_movie(&self, movie_id: i32) -> AppResult<Option<movie::Model>> {
            Ok(movie::Entity::find_by_id(movie_id).one(&self.db).await?)
        }
    }

    pub fn record(id: i32, title: &str) -> MovieRecord {
        MovieRecord {
            id,
            title: title.to_string(),
            overview: Some(format!("{title} overview")),
            poster_path: Some(format!("/{id}.jpg")),
            backdrop_path: Some(format!("/{id}-bg.jpg")),
            release_date: Some("2020-02-02".to_string()),
            vote_average: Some(7.0),
            genre_ids: vec![18],
        }
    }

    pub async fn seeded() -> (Store, i32) {
        let store = Store::new(db::connect_in_memory().await);
        let user = store.create_user("alice", "a@x.com", "hash").await.unwrap();
        (store, user.id)
    }

    #[tokio::test]
    async fn movie_upsert_replaces_every_field() {
        let (store, _) = seeded().await;
        store.upsert_movie(record(7, "First")).await.unwrap();

        let replacement = MovieRecord {
            overview: None,
            poster_path: None,
            genre_ids: vec![],
            vote_average: Some(3.5),
            ..record(7, "Second")
        };
        store.upsert_movie(replacement.clone()).await.unwrap();

        let cached = store.get_movie(7).await.unwrap().unwrap();
        assert_eq!(MovieRecord::from(cached), replacement);
    }

    #[tokio::test]
    async fn batch_upsert_inserts_and_overwrites() {
        let (store, _) = seeded().await;
        store.upsert_movie(record(1, "Old")).await.unwrap();
        store
            .upsert_movies(vec![record(1, "New"), record(2, "Two"), record(2, "Two again")])
            .await
            .unwrap();
        store.upsert_movies(Vec::new()).await.unwrap();

        assert_eq!(store.get_movie(1).await.unwrap().unwrap().title, "New");
        assert!(store.get_movie(2).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn list_add_is_idempotent_and_remove_is_a_no_op_when_absent() {
        let (store, user_id) = seeded().await;
        store.upsert_movie(record(42, "Answer")).await.unwrap();

        assert!(store.add_to_list(user_id, 42, ListType::Watchlist).await.unwrap());
        assert!(!store.add_to_list(user_id, 42, ListType::Watchlist).await.unwrap());
        assert_eq!(store.list_movies(user_id, ListType::Watchlist).await.unwrap().len(), 1);

        assert!(store.add_to_list(user_id, 42, ListType::Watched).await.unwrap());
        assert_eq!(
            store.list_memberships(user_id, 42).await.unwrap(),
            vec![ListType::Watchlist, ListType::Watched]
        );

        assert!(store.remove_from_list(user_id, 42, ListType::Watchlist).await.unwrap());
        assert!(!store.remove_from_list(user_id, 42, ListType::Watchlist).await.unwrap());
        assert_eq!(store.list_memberships(user_id, 42).await.unwrap(), vec![ListType::Watched]);
    }

    #[tokio::test]
    async fn relation_rows_require_a_cached_movie() {
        let (store, user_id) = seeded().await;
        assert!(store.add_to_list(user_id, 999, ListType::Watchlist).await.is_err());
    }

    #[tokio::test]
    async fn list_rows_carry_own_rating_and_review_newest_first() {
        let (store, user_id) = seeded().await;
        let other = store.create_user("bob", "b@x.com", "hash").await.unwrap().id;
        store.upsert_movies(vec![record(1, "One"), record(2, "Two")]).await.unwrap();

        store.add_to_list(user_id, 1, ListType::Watched).await.unwrap();
        store.add_to_list(user_id, 2, ListType::Watched).await.unwrap();
        store.rate_movie(user_id, 1, 9).await.unwrap();
        store.rate_movie(other, 1, 2).await.unwrap();
        store.upsert_review(user_id, 1, "great").await.unwrap();

        let rows = store.list_movies(user_id, ListType::Watched).await.unwrap();
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![2, 1]);
        assert_eq!(rows[1].rating, Some(9));
        assert_eq!(rows[1].review_text.as_deref(), Some("great"));
        assert_eq!(rows[0].rating, None);
    }

    #[tokio::test]
    async fn rating_overwrites_instead_of_accumulating() {
        let (store, user_id) = seeded().await;
        store.upsert_movie(record(5, "Five")).await.unwrap();

        let first = store.rate_movie(user_id, 5, 7).await.unwrap();
        let second = store.rate_movie(user_id, 5, 3).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.get_rating(user_id, 5).await.unwrap().unwrap().rating, 3);
    }

    #[tokio::test]
    async fn review_upsert_keeps_identity_and_created_at() {
        let (store, user_id) = seeded().await;
        store.upsert_movie(record(5, "Five")).await.unwrap();

        let first = store.upsert_review(user_id, 5, "first take").await.unwrap();
        let second = store.upsert_review(user_id, 5, "second take").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(second.review_text, "second take");
        assert!(second.updated_at >= first.updated_at);
    }

    #[tokio::test]
    async fn review_update_and_delete_by_id() {
        let (store, user_id) = seeded().await;
        store.upsert_movie(record(5, "Five")).await.unwrap();
        let review = store.upsert_review(user_id, 5, "draft").await.unwrap();

        let updated = store.update_review(review.id, "final").await.unwrap().unwrap();
        assert_eq!(updated.review_text, "final");
        assert_eq!(updated.created_at, review.created_at);

        assert!(store.delete_review(review.id).await.unwrap());
        assert!(!store.delete_review(review.id).await.unwrap());
        assert!(store.update_review(review.id, "again").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn review_listings_join_authors_movies_and_ratings() {
        let (store, alice) = seeded().await;
        let bob = store.create_user("bob", "b@x.com", "hash").await.unwrap().id;
        store.upsert_movies(vec![record(1, "One"), record(2, "Two")]).await.unwrap();

        store.upsert_review(alice, 1, "alice on one").await.unwrap();
        store.upsert_review(bob, 1, "bob on one").await.unwrap();
        store.upsert_review(alice, 2, "alice on two").await.unwrap();
        store.rate_movie(bob, 1, 4).await.unwrap();

        let on_one = store.movie_reviews(1).await.unwrap();
        assert_eq!(on_one.len(), 2);
        assert_eq!(on_one[0].username, "bob");
        assert_eq!(on_one[0].rating, Some(4));
        assert_eq!(on_one[1].username, "alice");
        assert_eq!(on_one[1].rating, None);

        let by_alice = store.user_reviews(alice).await.unwrap();
        assert_eq!(by_alice.iter().map(|r| r.movie_id).collect::<Vec<_>>(), vec![2, 1]);
        assert_eq!(by_alice[0].movie_title, "Two");
    }

    #[tokio::test]
    async fn username_update_persists() {
        let (store, user_id) = seeded().await;
        let updated = store.update_username(user_id, "alice_2").await.unwrap().unwrap();
        assert_eq!(updated.username, "alice_2");
        assert!(store.find_user_by_username("alice").await.unwrap().is_none());
        assert!(store.update_username(9_999, "ghost").await.unwrap().is_none());
    }
}
