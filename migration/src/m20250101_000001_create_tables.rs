use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(pk_auto(Users::Id))
                    .col(string_len_uniq(Users::Username, 20))
                    .col(string_uniq(Users::Email))
                    .col(string(Users::PasswordHash))
                    .col(big_integer(Users::CreatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Movies::Table)
                    .if_not_exists()
                    .col(integer(Movies::Id).primary_key())
                    .col(string(Movies::Title))
                    .col(text_null(Movies::Overview))
                    .col(string_null(Movies::PosterPath))
                    .col(string_null(Movies::BackdropPath))
                    .col(string_null(Movies::ReleaseDate))
                    .col(double_null(Movies::VoteAverage))
                    .col(json(Movies::GenreIds))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(UserMovies::Table)
                    .if_not_exists()
                    .col(pk_auto(UserMovies::Id))
                    .col(integer(UserMovies::UserId))
                    .col(integer(UserMovies::MovieId))
                    .col(string_len(UserMovies::ListType, 16))
                    .col(big_integer(UserMovies::AddedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_user_movies_user")
                            .from(UserMovies::Table, UserMovies::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_user_movies_movie")
                            .from(UserMovies::Table, UserMovies::MovieId)
                            .to(Movies::Table, Movies::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_user_movies_unique")
                    .table(UserMovies::Table)
                    .col(UserMovies::UserId)
                    .col(UserMovies::MovieId)
                    .col(UserMovies::ListType)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(UserRatings::Table)
                    .if_not_exists()
                    .col(pk_auto(UserRatings::Id))
                    .col(integer(UserRatings::UserId))
                    .col(integer(UserRatings::MovieId))
                    .col(integer(UserRatings::Rating).check(
                        Expr::col(UserRatings::Rating).between(1, 10),
                    ))
                    .col(big_integer(UserRatings::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_user_ratings_user")
                            .from(UserRatings::Table, UserRatings::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_user_ratings_movie")
                            .from(UserRatings::Table, UserRatings::MovieId)
                            .to(Movies::Table, Movies::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_user_ratings_unique")
                    .table(UserRatings::Table)
                    .col(UserRatings::UserId)
                    .col(UserRatings::MovieId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(UserReviews::Table)
                    .if_not_exists()
                    .col(pk_auto(UserReviews::Id))
                    .col(integer(UserReviews::UserId))
                    .col(integer(UserReviews::MovieId))
                    .col(text(UserReviews::ReviewText))
                    .col(big_integer(UserReviews::CreatedAt))
                    .col(big_integer(UserReviews::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_user_reviews_user")
                            .from(UserReviews::Table, UserReviews::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_user_reviews_movie")
                            .from(UserReviews::Table, UserReviews::MovieId)
                            .to(Movies::Table, Movies::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_user_reviews_unique")
                    .table(UserReviews::Table)
                    .col(UserReviews::UserId)
                    .col(UserReviews::MovieId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_user_reviews_movie")
                    .table(UserReviews::Table)
                    .col(UserReviews::MovieId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(UserReviews::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(UserRatings::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(UserMovies::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Movies::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Users::Table).to_owned()).await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    Username,
    Email,
    PasswordHash,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Movies {
    Table,
    Id,
    Title,
    Overview,
    PosterPath,
    BackdropPath,
    ReleaseDate,
    VoteAverage,
    GenreIds,
}

#[derive(DeriveIden)]
enum UserMovies {
    Table,
    Id,
    UserId,
    MovieId,
    ListType,
    AddedAt,
}

#[derive(DeriveIden)]
enum UserRatings {
    Table,
    Id,
    UserId,
    MovieId,
    Rating,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum UserReviews {
    Table,
    Id,
    UserId,
    MovieId,
    ReviewText,
    CreatedAt,
    UpdatedAt,
}
