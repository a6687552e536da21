use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "user_reviews")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: i32,
    pub movie_id: i32,
    #[sea_orm(column_type = "Text")]
    pub review_text: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {
    User,
    Movie,
    /// The author's rating of the reviewed movie, if any.
    AuthorRating,
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
            Self::AuthorRating => Entity::belongs_to(super::user_rating::Entity)
                .from((Column::UserId, Column::MovieId))
                .to((super::user_rating::Column::UserId, super::user_rating::Column::MovieId))
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
