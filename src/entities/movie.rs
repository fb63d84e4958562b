use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "movies")]
pub struct Model {
    /// Index of the row in the catalog as of the last replace.
    #[sea_orm(primary_key, auto_increment = false)]
    pub position: i32,
    #[sea_orm(unique)]
    pub movie_id: i32,
    pub title: String,
    pub year: String,
    pub runtime: String,
    /// JSON array of genre names.
    pub genres: String,
    pub director: String,
    pub actors: String,
    pub plot: String,
    pub poster_url: String,
    pub is_wishlisted: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
