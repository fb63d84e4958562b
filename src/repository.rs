use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tracing::{info, warn};

use crate::{
    error::AppResult,
    local::{MovieLocalDataSource, MoviePager},
    models::Movie,
    paging::PagingConfig,
    remote::MovieRemoteDataSource,
};

/// What the presentation layer sees: reads are always served from local
/// storage, refresh is the only path that talks to the remote catalog.
#[async_trait]
pub trait MovieRepository: Send + Sync {
    /// Fetches the catalog and replaces local storage with it. Every failure,
    /// remote or local, comes back as `Err` carrying the original cause.
    async fn refresh_from_remote(&self) -> AppResult<Vec<Movie>>;

    fn paging_config(&self) -> PagingConfig;

    fn paged_movies_with(&self, config: PagingConfig) -> AppResult<MoviePager>;

    fn wishlisted_paged_movies_with(&self, config: PagingConfig) -> AppResult<MoviePager>;

    fn paged_movies(&self) -> AppResult<MoviePager> {
        self.paged_movies_with(self.paging_config())
    }

    fn wishlisted_paged_movies(&self) -> AppResult<MoviePager> {
        self.wishlisted_paged_movies_with(self.paging_config())
    }

    async fn set_wishlisted(&self, movie_id: i32, wishlisted: bool) -> AppResult<()>;

    async fn movie(&self, movie_id: i32) -> AppResult<Option<Movie>>;

    fn observe_movie(&self, movie_id: i32) -> BoxStream<'static, AppResult<Option<Movie>>>;
}

pub struct MovieDataRepository {
    remote: Arc<dyn MovieRemoteDataSource>,
    local: Arc<dyn MovieLocalDataSource>,
    paging: PagingConfig,
}

impl MovieDataRepository {
    pub fn new(
        remote: Arc<dyn MovieRemoteDataSource>,
        local: Arc<dyn MovieLocalDataSource>,
        paging: PagingConfig,
    ) -> Self {
        Self { remote, local, paging }
    }
}

#[async_trait]
impl MovieRepository for MovieDataRepository {
    async fn refresh_from_remote(&self) -> AppResult<Vec<Movie>> {
        let result = async {
            let movies = self.remote.retrieve_movie_data().await?;
            self.local.insert_movies(&movies).await?;
            Ok(movies)
        }
        .await;

        match &result {
            Ok(movies) => info!(movies = movies.len(), "refreshed movie catalog"),
            Err(err) => warn!(error = %err, "movie catalog refresh failed"),
        }
        result
    }

    fn paging_config(&self) -> PagingConfig {
        self.paging
    }

    fn paged_movies_with(&self, config: PagingConfig) -> AppResult<MoviePager> {
        self.local.paged_movies(config)
    }

    fn wishlisted_paged_movies_with(&self, config: PagingConfig) -> AppResult<MoviePager> {
        self.local.wishlisted_paged_movies(config)
    }

    async fn set_wishlisted(&self, movie_id: i32, wishlisted: bool) -> AppResult<()> {
        self.local.set_wishlisted(movie_id, wishlisted).await
    }

    async fn movie(&self, movie_id: i32) -> AppResult<Option<Movie>> {
        self.local.movie(movie_id).await
    }

    fn observe_movie(&self, movie_id: i32) -> BoxStream<'static, AppResult<Option<Movie>>> {
        self.local.observe_movie(movie_id)
    }
}
