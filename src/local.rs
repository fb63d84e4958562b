use std::sync::Arc;

use async_trait::async_trait;
use futures::{StreamExt, stream::{self, BoxStream}};
use tokio::sync::watch;

use crate::{
    error::AppResult,
    models::Movie,
    paging::{Pager, PagingConfig, PagingSource, PagingSourceExt},
    store::{MovieQuery, MovieStore},
};

pub type MovieSource = dyn PagingSource<Item = Movie>;
pub type MoviePager = Pager<MovieSource>;

#[async_trait]
pub trait MovieLocalDataSource: Send + Sync {
    fn paged_movies(&self, config: PagingConfig) -> AppResult<MoviePager>;

    fn wishlisted_paged_movies(&self, config: PagingConfig) -> AppResult<MoviePager>;

    /// Replaces the stored catalog with `movies`, list order becoming the
    /// stored position.
    async fn insert_movies(&self, movies: &[Movie]) -> AppResult<()>;

    async fn set_wishlisted(&self, movie_id: i32, wishlisted: bool) -> AppResult<()>;

    async fn movie(&self, movie_id: i32) -> AppResult<Option<Movie>>;

    /// Current value of one movie, re-read whenever the table changes.
    fn observe_movie(&self, movie_id: i32) -> BoxStream<'static, AppResult<Option<Movie>>>;
}

#[derive(Clone)]
pub struct StoreMovieLocalDataSource {
    store: MovieStore,
}

impl StoreMovieLocalDataSource {
    pub fn new(store: MovieStore) -> Self {
        Self { store }
    }

    fn pager(&self, query: MovieQuery, config: PagingConfig) -> AppResult<MoviePager> {
        let source: Arc<MovieSource> = Arc::new(query.map_items(Movie::try_from));
        Pager::new(source, config, self.store.subscribe())
    }
}

struct Observation {
    store: MovieStore,
    invalidations: watch::Receiver<u64>,
    last: Option<Option<Movie>>,
    first: bool,
}

#[async_trait]
impl MovieLocalDataSource for StoreMovieLocalDataSource {
    fn paged_movies(&self, config: PagingConfig) -> AppResult<MoviePager> {
        self.pager(self.store.query_all(), config)
    }

    fn wishlisted_paged_movies(&self, config: PagingConfig) -> AppResult<MoviePager> {
        self.pager(self.store.query_wishlisted(), config)
    }

    async fn insert_movies(&self, movies: &[Movie]) -> AppResult<()> {
        let rows = movies
            .iter()
            .enumerate()
            .map(|(position, movie)| movie.to_row(position as i32))
            .collect::<AppResult<Vec<_>>>()?;
        self.store.replace_all(rows).await
    }

    async fn set_wishlisted(&self, movie_id: i32, wishlisted: bool) -> AppResult<()> {
        self.store.set_wishlisted(movie_id, wishlisted).await?;
        Ok(())
    }

    async fn movie(&self, movie_id: i32) -> AppResult<Option<Movie>> {
        self.store.find_by_movie_id(movie_id).await?.map(Movie::try_from).transpose()
    }

    fn observe_movie(&self, movie_id: i32) -> BoxStream<'static, AppResult<Option<Movie>>> {
        let state = Observation {
            store: self.store.clone(),
            invalidations: self.store.subscribe(),
            last: None,
            first: true,
        };

        stream::unfold(state, move |mut state| async move {
            loop {
                if state.first {
                    state.first = false;
                    state.invalidations.borrow_and_update();
                } else if state.invalidations.changed().await.is_err() {
                    return None;
                }

                let current = match state.store.find_by_movie_id(movie_id).await {
                    Ok(row) => match row.map(Movie::try_from).transpose() {
                        Ok(movie) => movie,
                        Err(err) => return Some((Err(err), state)),
                    },
                    Err(err) => return Some((Err(err), state)),
                };

                if state.last.as_ref() == Some(&current) {
                    continue;
                }
                state.last = Some(current.clone());
                return Some((Ok(current), state));
            }
        })
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::connect_in_memory, models::sample_movie};

    async fn source() -> StoreMovieLocalDataSource {
        StoreMovieLocalDataSource::new(MovieStore::new(connect_in_memory().await.unwrap()))
    }

    async fn read_all(pager: &MoviePager) -> Vec<Movie> {
        let mut list = pager.load().await.unwrap();
        list.access(list.total()).await.unwrap();
        list.to_vec()
    }

    fn ids(movies: &[Movie]) -> Vec<i32> {
        movies.iter().map(|m| m.id).collect()
    }

    #[tokio::test]
    async fn newer_movies_come_first() {
        let local = source().await;
        local.insert_movies(&[sample_movie(1, 2020), sample_movie(2, 1999)]).await.unwrap();

        let pager = local.paged_movies(PagingConfig::default()).unwrap();
        assert_eq!(ids(&read_all(&pager).await), vec![1, 2]);
    }

    #[tokio::test]
    async fn same_year_keeps_catalog_order() {
        let local = source().await;
        local.insert_movies(&[sample_movie(20, 2020), sample_movie(10, 2020)]).await.unwrap();

        let pager = local.paged_movies(PagingConfig::default()).unwrap();
        assert_eq!(ids(&read_all(&pager).await), vec![20, 10]);
    }

    #[tokio::test]
    async fn paged_read_returns_exactly_the_inserted_catalog() {
        let local = source().await;
        let catalog: Vec<Movie> = (0..37).map(|i| sample_movie(i, 1980 + (i % 5))).collect();
        local.insert_movies(&catalog).await.unwrap();

        let pager = local.paged_movies(PagingConfig::new(5, 1, false)).unwrap();
        let read = read_all(&pager).await;

        let mut expected = catalog.clone();
        expected.sort_by_key(|m| std::cmp::Reverse(m.year));
        assert_eq!(read, expected);
    }

    #[tokio::test]
    async fn inserting_twice_is_idempotent() {
        let local = source().await;
        let catalog = vec![sample_movie(1, 2001), sample_movie(2, 2002), sample_movie(3, 2002)];
        let pager = local.paged_movies(PagingConfig::default()).unwrap();

        local.insert_movies(&catalog).await.unwrap();
        let once = read_all(&pager).await;
        local.insert_movies(&catalog).await.unwrap();
        let twice = read_all(&pager).await;

        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn wishlist_toggle_moves_movie_in_and_out_of_the_wishlist() {
        let local = source().await;
        local
            .insert_movies(&[sample_movie(1, 2001), sample_movie(2, 2002), sample_movie(3, 2002)])
            .await
            .unwrap();
        let all = local.paged_movies(PagingConfig::default()).unwrap();
        let wishlist = local.wishlisted_paged_movies(PagingConfig::default()).unwrap();

        local.set_wishlisted(2, true).await.unwrap();
        let listed = read_all(&wishlist).await;
        assert_eq!(ids(&listed), vec![2]);
        assert!(listed[0].is_wishlisted);

        local.set_wishlisted(2, false).await.unwrap();
        assert!(read_all(&wishlist).await.is_empty());
        assert_eq!(ids(&read_all(&all).await), vec![2, 3, 1]);
    }

    #[tokio::test]
    async fn wishlisting_a_missing_movie_is_harmless() {
        let local = source().await;
        local.insert_movies(&[sample_movie(1, 2001)]).await.unwrap();

        local.set_wishlisted(99, true).await.unwrap();

        let wishlist = local.wishlisted_paged_movies(PagingConfig::default()).unwrap();
        assert!(read_all(&wishlist).await.is_empty());
        assert!(!local.movie(1).await.unwrap().unwrap().is_wishlisted);
    }

    #[tokio::test]
    async fn wishlist_flow_restarts_on_toggle() {
        let local = source().await;
        local.insert_movies(&[sample_movie(1, 2001), sample_movie(2, 2002)]).await.unwrap();
        let pager = local.wishlisted_paged_movies(PagingConfig::default()).unwrap();
        let mut flow = Box::pin(pager.flow());

        assert!(flow.next().await.unwrap().unwrap().is_empty());

        local.set_wishlisted(1, true).await.unwrap();
        let list = flow.next().await.unwrap().unwrap();
        assert_eq!(ids(&list.to_vec()), vec![1]);
    }

    #[tokio::test]
    async fn observed_movie_follows_writes() {
        let local = source().await;
        let mut movie = local.observe_movie(5);

        assert_eq!(movie.next().await.unwrap().unwrap(), None);

        local.insert_movies(&[sample_movie(5, 2005), sample_movie(6, 2006)]).await.unwrap();
        assert_eq!(movie.next().await.unwrap().unwrap().map(|m| m.is_wishlisted), Some(false));

        // A write to another row leaves movie 5 unchanged and emits nothing.
        local.set_wishlisted(6, true).await.unwrap();
        local.set_wishlisted(5, true).await.unwrap();
        assert_eq!(movie.next().await.unwrap().unwrap().map(|m| m.is_wishlisted), Some(true));
    }
}
