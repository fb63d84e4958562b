use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Movies::Table)
                    .if_not_exists()
                    .col(integer(Movies::Position).primary_key())
                    .col(integer(Movies::MovieId))
                    .col(string(Movies::Title))
                    .col(string(Movies::Year))
                    .col(string(Movies::Runtime))
                    .col(text(Movies::Genres))
                    .col(string(Movies::Director))
                    .col(text(Movies::Actors))
                    .col(text(Movies::Plot))
                    .col(string(Movies::PosterUrl))
                    .col(boolean(Movies::IsWishlisted).default(false))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_movies_movie_id")
                    .table(Movies::Table)
                    .col(Movies::MovieId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_movies_is_wishlisted")
                    .table(Movies::Table)
                    .col(Movies::IsWishlisted)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(Movies::Table).to_owned()).await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Movies {
    Table,
    Position,
    MovieId,
    Title,
    Year,
    Runtime,
    Genres,
    Director,
    Actors,
    Plot,
    PosterUrl,
    IsWishlisted,
}
