use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        IntoResponse, Sse,
        sse::{Event, KeepAlive},
    },
    routing::{get, put},
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::{
    AppState,
    error::{AppError, AppResult},
    local::MoviePager,
    models::{Movie, MovieFilter},
    paging::PagingConfig,
    refresh::RefreshStatus,
};

const MAX_LIMIT: usize = 100;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/movies", get(list_movies))
        .route("/movies/{id}", get(get_movie))
        .route("/movies/{id}/wishlist", put(set_wishlist))
        .route("/movies/{id}/events", get(watch_movie))
        .route("/wishlist", get(list_wishlist))
        .route("/refresh", get(refresh_status).post(start_refresh))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    offset: usize,
    limit: Option<usize>,
    q: Option<String>,
    genre: Option<String>,
}

impl PageQuery {
    fn paging(&self, defaults: PagingConfig) -> AppResult<PagingConfig> {
        let limit = self.limit.unwrap_or(defaults.page_size);
        if limit == 0 || limit > MAX_LIMIT {
            return Err(AppError::InvalidPaging(format!("limit must be between 1 and {MAX_LIMIT}")));
        }
        Ok(PagingConfig::new(limit, defaults.prefetch_distance, false))
    }

    fn filter(&self) -> MovieFilter {
        MovieFilter { query: self.q.clone(), genre: self.genre.clone() }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MoviePage {
    pub offset: usize,
    pub total: usize,
    pub items: Vec<Movie>,
    pub next_offset: Option<usize>,
}

/// Reads `limit` positions from `offset` and applies the filter to them.
/// `total` and `next_offset` describe the unfiltered query.
async fn read_page(pager: MoviePager, query: &PageQuery) -> AppResult<MoviePage> {
    let limit = pager.config().page_size;
    let mut list = pager.load_at(query.offset).await?;
    let end = query.offset.saturating_add(limit).min(list.total());
    if end > query.offset {
        list.access(end - 1).await?;
    }

    let filter = query.filter();
    let items = (query.offset..end)
        .filter_map(|position| list.get(position))
        .filter(|movie| filter.matches(movie))
        .cloned()
        .collect();

    Ok(MoviePage {
        offset: query.offset,
        total: list.total(),
        items,
        next_offset: (end < list.total()).then_some(end),
    })
}

pub async fn list_movies(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<MoviePage>> {
    let config = query.paging(state.repository.paging_config())?;
    let pager = state.repository.paged_movies_with(config)?;
    Ok(Json(read_page(pager, &query).await?))
}

pub async fn list_wishlist(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<MoviePage>> {
    let config = query.paging(state.repository.paging_config())?;
    let pager = state.repository.wishlisted_paged_movies_with(config)?;
    Ok(Json(read_page(pager, &query).await?))
}

pub async fn get_movie(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> AppResult<Json<Movie>> {
    state.repository.movie(id).await?.map(Json).ok_or(AppError::NotFound)
}

/// Server-sent `movie` events: the current value on connect, then again
/// whenever it changes. A missing movie is sent as `null`.
pub async fn watch_movie(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = state.repository.observe_movie(id).map(|update| {
        let event = match update {
            Ok(movie) => Event::default()
                .event("movie")
                .json_data(&movie)
                .unwrap_or_else(|err| Event::default().event("error").data(err.to_string())),
            Err(err) => Event::default().event("error").data(err.user_message()),
        };
        Ok(event)
    });

    Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("keep-alive"))
}

#[derive(Debug, Deserialize)]
pub struct WishlistUpdate {
    wishlisted: bool,
}

/// Unknown ids are accepted and change nothing.
pub async fn set_wishlist(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(update): Json<WishlistUpdate>,
) -> AppResult<StatusCode> {
    state.repository.set_wishlisted(id, update.wishlisted).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn start_refresh(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = if state.refresh.start() { StatusCode::ACCEPTED } else { StatusCode::OK };
    (status, Json(RefreshStatus::from(&state.refresh.state())))
}

pub async fn refresh_status(State(state): State<Arc<AppState>>) -> Json<RefreshStatus> {
    Json(RefreshStatus::from(&state.refresh.state()))
}
