use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    catalog::{CatalogClient, CatalogResponse},
    error::AppResult,
    models::Movie,
};

#[async_trait]
pub trait MovieRemoteDataSource: Send + Sync {
    /// The full catalog, in the order the remote lists it.
    async fn retrieve_movie_data(&self) -> AppResult<Vec<Movie>>;
}

pub struct CatalogRemoteDataSource {
    client: Arc<CatalogClient>,
}

impl CatalogRemoteDataSource {
    pub fn new(client: Arc<CatalogClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MovieRemoteDataSource for CatalogRemoteDataSource {
    async fn retrieve_movie_data(&self) -> AppResult<Vec<Movie>> {
        let catalog = self.client.fetch_catalog().await?;
        Ok(map_movies(catalog))
    }
}

/// The remote knows nothing about the wishlist, so every movie starts out
/// unlisted.
pub fn map_movies(catalog: CatalogResponse) -> Vec<Movie> {
    catalog
        .movies
        .into_iter()
        .map(|m| Movie {
            id: m.id,
            title: m.title,
            year: m.year,
            runtime: m.runtime,
            genres: m.genres,
            director: m.director,
            actors: m.actors,
            plot: m.plot,
            poster_url: m.poster_url,
            is_wishlisted: false,
        })
        .collect()
}
