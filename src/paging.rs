//! Windowed, restartable reads over a sorted query.
//!
//! A [`PagingSource`] answers `offset`/`limit` windows and reports the total
//! row count from the same read. A [`Pager`] opens [`PagedList`] windows over a
//! source and, through [`Pager::flow`], re-opens them every time the
//! underlying table is invalidated, so a consumer never mixes rows from two
//! generations of the query.

use std::{collections::VecDeque, ops::Range, sync::Arc};

use async_trait::async_trait;
use futures::{Stream, stream};
use tokio::sync::watch;
use tracing::debug;

use crate::error::{AppError, AppResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PagingConfig {
    pub page_size: usize,
    /// How close to either edge of the loaded window an access must land
    /// before the neighbouring page is fetched.
    pub prefetch_distance: usize,
    pub enable_placeholders: bool,
    pub initial_load_size: usize,
    /// Soft upper bound on loaded items. Pages on the far side of the last
    /// access are dropped once that access no longer needs them.
    pub max_size: Option<usize>,
    /// Accesses further than this outside the window reload around the
    /// position instead of paging towards it.
    pub jump_threshold: Option<usize>,
}

impl PagingConfig {
    pub fn new(page_size: usize, prefetch_distance: usize, enable_placeholders: bool) -> Self {
        Self {
            page_size,
            prefetch_distance,
            enable_placeholders,
            initial_load_size: page_size.saturating_mul(3),
            max_size: None,
            jump_threshold: None,
        }
    }

    pub fn with_initial_load_size(mut self, initial_load_size: usize) -> Self {
        self.initial_load_size = initial_load_size;
        self
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = Some(max_size);
        self
    }

    pub fn with_jump_threshold(mut self, jump_threshold: usize) -> Self {
        self.jump_threshold = Some(jump_threshold);
        self
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.page_size == 0 {
            return Err(AppError::InvalidPaging("page_size must be positive".to_string()));
        }
        if self.initial_load_size == 0 {
            return Err(AppError::InvalidPaging("initial_load_size must be positive".to_string()));
        }
        if let Some(max_size) = self.max_size {
            let min = self.page_size + 2 * self.prefetch_distance;
            if max_size < min {
                return Err(AppError::InvalidPaging(format!(
                    "max_size {max_size} must be at least page_size + 2 * prefetch_distance ({min})"
                )));
            }
        }
        Ok(())
    }
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self::new(10, 2, false)
    }
}

/// One window of rows together with the row count observed by the same read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadResult<T> {
    pub items: Vec<T>,
    pub offset: usize,
    pub total: usize,
}

#[async_trait]
pub trait PagingSource: Send + Sync {
    type Item: Clone + Send + Sync + 'static;

    /// Loads up to `limit` rows starting at `offset`. Offsets at or past the
    /// end are clamped with [`clamp_offset`]; the returned `offset` is the one
    /// actually served.
    async fn load(&self, offset: usize, limit: usize) -> AppResult<LoadResult<Self::Item>>;
}

/// Moves an offset that starts past the last row back onto the last full
/// window.
pub fn clamp_offset(offset: usize, limit: usize, total: usize) -> usize {
    if offset >= total { total.saturating_sub(limit) } else { offset }
}

pub struct MapSource<S, F> {
    inner: S,
    f: F,
}

#[async_trait]
impl<S, F, T> PagingSource for MapSource<S, F>
where
    S: PagingSource,
    F: Fn(S::Item) -> AppResult<T> + Send + Sync,
    T: Clone + Send + Sync + 'static,
{
    type Item = T;

    async fn load(&self, offset: usize, limit: usize) -> AppResult<LoadResult<T>> {
        let page = self.inner.load(offset, limit).await?;
        let items = page.items.into_iter().map(&self.f).collect::<AppResult<Vec<_>>>()?;
        Ok(LoadResult { items, offset: page.offset, total: page.total })
    }
}

pub trait PagingSourceExt: PagingSource + Sized {
    fn map_items<F, T>(self, f: F) -> MapSource<Self, F>
    where
        F: Fn(Self::Item) -> AppResult<T> + Send + Sync,
    {
        MapSource { inner: self, f }
    }
}

impl<S: PagingSource> PagingSourceExt for S {}

pub struct Pager<S: PagingSource + ?Sized> {
    source: Arc<S>,
    config: PagingConfig,
    invalidations: watch::Receiver<u64>,
}

impl<S: PagingSource + ?Sized> Clone for Pager<S> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            config: self.config,
            invalidations: self.invalidations.clone(),
        }
    }
}

impl<S: PagingSource + ?Sized + 'static> Pager<S> {
    pub fn new(
        source: Arc<S>,
        config: PagingConfig,
        invalidations: watch::Receiver<u64>,
    ) -> AppResult<Self> {
        config.validate()?;
        Ok(Self { source, config, invalidations })
    }

    pub fn config(&self) -> &PagingConfig {
        &self.config
    }

    pub async fn load(&self) -> AppResult<PagedList<S>> {
        self.load_at(0).await
    }

    /// Opens a window centred on `position`.
    pub async fn load_at(&self, position: usize) -> AppResult<PagedList<S>> {
        let mut list = PagedList {
            source: self.source.clone(),
            config: self.config,
            invalidations: self.invalidations.clone(),
            generation: 0,
            pages: VecDeque::new(),
            total: 0,
            last_position: position,
        };
        list.reload(position).await?;
        Ok(list)
    }

    /// Emits a freshly loaded list now and after every invalidation. The
    /// stream ends once the owner of the invalidation channel is gone.
    pub fn flow(&self) -> impl Stream<Item = AppResult<PagedList<S>>> + Send + 'static {
        stream::unfold((self.clone(), true), |(mut pager, first)| async move {
            if first {
                pager.invalidations.borrow_and_update();
            } else if pager.invalidations.changed().await.is_err() {
                return None;
            }
            let list = pager.load().await;
            Some((list, (pager, false)))
        })
    }
}

struct Page<T> {
    offset: usize,
    items: Vec<T>,
}

impl<T> Page<T> {
    fn end(&self) -> usize {
        self.offset + self.items.len()
    }
}

/// A loaded window over one generation of a paged query. Positions are
/// absolute offsets into the full query result.
pub struct PagedList<S: PagingSource + ?Sized> {
    source: Arc<S>,
    config: PagingConfig,
    invalidations: watch::Receiver<u64>,
    generation: u64,
    pages: VecDeque<Page<S::Item>>,
    total: usize,
    last_position: usize,
}

impl<S: PagingSource + ?Sized> PagedList<S> {
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn loaded_range(&self) -> Range<usize> {
        let start = self.pages.front().map(|p| p.offset).unwrap_or(0);
        let end = self.pages.back().map(Page::end).unwrap_or(start);
        start..end
    }

    pub fn loaded_len(&self) -> usize {
        self.pages.iter().map(|p| p.items.len()).sum()
    }

    /// Number of positions a consumer should render.
    pub fn len(&self) -> usize {
        if self.config.enable_placeholders { self.total } else { self.loaded_len() }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, position: usize) -> Option<&S::Item> {
        self.pages
            .iter()
            .find(|p| p.offset <= position && position < p.end())
            .map(|p| &p.items[position - p.offset])
    }

    pub fn items(&self) -> impl Iterator<Item = &S::Item> {
        self.pages.iter().flat_map(|p| p.items.iter())
    }

    pub fn to_vec(&self) -> Vec<S::Item> {
        self.items().cloned().collect()
    }

    /// With placeholders the snapshot spans every position, `None` marking
    /// rows outside the window; without them it holds only loaded rows.
    pub fn snapshot(&self) -> Vec<Option<S::Item>> {
        let loaded = self.items().cloned().map(Some);
        if !self.config.enable_placeholders {
            return loaded.collect();
        }
        let range = self.loaded_range();
        std::iter::repeat_n(None, range.start)
            .chain(loaded)
            .chain(std::iter::repeat_n(None, self.total.saturating_sub(range.end)))
            .collect()
    }

    /// True once the table behind this list changed after it was loaded.
    pub fn is_stale(&self) -> bool {
        self.invalidations.has_changed().unwrap_or(false)
    }

    /// Scroll hint. Loads whatever the access at `position` requires and
    /// returns whether the window changed.
    pub async fn access(&mut self, position: usize) -> AppResult<bool> {
        self.last_position = position;

        if self.is_stale() {
            self.reload(position).await?;
            return Ok(true);
        }

        let range = self.loaded_range();
        if let Some(threshold) = self.config.jump_threshold {
            let distance = if position < range.start {
                range.start - position
            } else {
                (position + 1).saturating_sub(range.end)
            };
            if distance > threshold {
                debug!(position, distance, "jumping to position");
                self.reload(position).await?;
                return Ok(true);
            }
        }

        let mut changed = false;

        while position + self.config.prefetch_distance >= self.loaded_range().end
            && self.loaded_range().end < self.total
        {
            if !self.append().await? {
                self.reload(position).await?;
                return Ok(true);
            }
            changed = true;
        }

        while position < self.loaded_range().start + self.config.prefetch_distance
            && self.loaded_range().start > 0
        {
            if !self.prepend().await? {
                self.reload(position).await?;
                return Ok(true);
            }
            changed = true;
        }

        Ok(changed)
    }

    /// Reloads around the most recently accessed position.
    pub async fn refresh(&mut self) -> AppResult<()> {
        self.reload(self.last_position).await
    }

    async fn reload(&mut self, anchor: usize) -> AppResult<()> {
        self.generation = *self.invalidations.borrow_and_update();
        let offset = anchor.saturating_sub(self.config.initial_load_size / 2);
        let page = self.source.load(offset, self.config.initial_load_size).await?;

        debug!(
            offset = page.offset,
            loaded = page.items.len(),
            total = page.total,
            generation = self.generation,
            "loaded initial window"
        );

        self.total = page.total;
        self.pages.clear();
        self.pages.push_back(Page { offset: page.offset, items: page.items });
        Ok(())
    }

    async fn append(&mut self) -> AppResult<bool> {
        let end = self.loaded_range().end;
        let page = self.source.load(end, self.config.page_size).await?;
        if page.offset != end || page.total != self.total || page.items.is_empty() || self.is_stale()
        {
            return Ok(false);
        }

        debug!(offset = end, loaded = page.items.len(), "appended page");
        self.pages.push_back(Page { offset: end, items: page.items });
        self.trim_front();
        Ok(true)
    }

    async fn prepend(&mut self) -> AppResult<bool> {
        let start = self.loaded_range().start;
        let offset = start.saturating_sub(self.config.page_size);
        let page = self.source.load(offset, start - offset).await?;
        if page.offset != offset
            || page.total != self.total
            || page.items.len() != start - offset
            || self.is_stale()
        {
            return Ok(false);
        }

        debug!(offset, loaded = page.items.len(), "prepended page");
        self.pages.push_front(Page { offset, items: page.items });
        self.trim_back();
        Ok(true)
    }

    /// Drops leading pages over `max_size`, but only while the last access
    /// stays at least `prefetch_distance` inside what remains. Otherwise the
    /// list is left over size until the position moves on.
    fn trim_front(&mut self) {
        let Some(max_size) = self.config.max_size else { return };
        while self.loaded_len() > max_size && self.pages.len() > 1 {
            let new_start = self.pages[1].offset;
            if self.last_position < new_start + self.config.prefetch_distance {
                break;
            }
            let dropped = self.pages.pop_front().map(|p| p.offset);
            debug!(?dropped, "dropped leading page");
        }
    }

    fn trim_back(&mut self) {
        let Some(max_size) = self.config.max_size else { return };
        while self.loaded_len() > max_size && self.pages.len() > 1 {
            let new_end = self.pages[self.pages.len() - 2].end();
            if self.last_position + self.config.prefetch_distance >= new_end {
                break;
            }
            let dropped = self.pages.pop_back().map(|p| p.offset);
            debug!(?dropped, "dropped trailing page");
        }
    }
}
