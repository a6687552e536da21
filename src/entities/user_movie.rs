use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum ListType {
    #[sea_orm(string_value = "watchlist")]
    Watchlist,
    #[sea_orm(string_value = "watched")]
    Watched,
}

impl ListType {
    pub fn as_str(self) -> &'static str {
        match self {
            ListType::Watchlist => "watchlist",
            ListType::Watched => "watched",
        }
    }
}

impl std::fmt::Display for ListType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "user_movies")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: i32,
    pub movie_id: i32,
    pub list_type: ListType,
    pub added_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {
    User,
    Movie,
    /// The owner's rating of the same movie, if any.
    OwnRating,
    /// The owner's review of the same movie, if any.
    OwnReview,
}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        match self {
            Self::User => Entity::belongs_to(super::user::Entity)
                .from(Column::UserId)
                .to(super::user::Column::Id)
                .into(),
            Self::Movie => Entity::belongs_to(super::movie::Entity)
                .from(Column::MovieId)
                .to(super::movie::Column::Id)
                .into(),
            Self::OwnRating => Entity::belongs_to(super::user_rating::Entity)
                .from((Column::UserId, Column::MovieId))
                .to((super::user_rating::Column::UserId, super::user_rating::Column::MovieId))
                .into(),
            Self::OwnReview => Entity::belongs_to(super::user_review::Entity)
                .from((Column::UserId, Column::MovieId))
                .to((super::user_review::Column::UserId, super::user_review::Column::MovieId))
                .into(),
        }
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::movie::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Movie.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
