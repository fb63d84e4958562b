use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, Order, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Select, Set, TransactionTrait,
    sea_query::Expr,
};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::{
    entities::movie,
    error::AppResult,
    paging::{LoadResult, PagingSource, clamp_offset},
};

/// Rows per INSERT statement, well under SQLite's bound-variable limit.
const INSERT_CHUNK: usize = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MovieQueryKind {
    /// Year descending, then catalog position.
    All,
    /// Wishlisted rows only; year descending, then movie id.
    Wishlisted,
}

/// The `movies` table plus the generation counter bumped after every write
/// that changed rows.
#[derive(Clone)]
pub struct MovieStore {
    db: DatabaseConnection,
    invalidations: Arc<watch::Sender<u64>>,
}

impl MovieStore {
    pub fn new(db: DatabaseConnection) -> Self {
        let (tx, _) = watch::channel(0);
        Self { db, invalidations: Arc::new(tx) }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.invalidations.subscribe()
    }

    pub fn generation(&self) -> u64 {
        *self.invalidations.borrow()
    }

    fn invalidate(&self) {
        self.invalidations.send_modify(|generation| *generation += 1);
    }

    /// Deletes every row and inserts `rows` in one transaction. A failure
    /// anywhere leaves the previous catalog untouched.
    pub async fn replace_all(&self, rows: Vec<movie::Model>) -> AppResult<()> {
        let txn = self.db.begin().await?;

        let wishlisted = movie::Entity::find()
            .filter(movie::Column::IsWishlisted.eq(true))
            .count(&txn)
            .await?;
        let deleted = movie::Entity::delete_many().exec(&txn).await?.rows_affected;

        let inserted = rows.len();
        for chunk in rows.chunks(INSERT_CHUNK) {
            movie::Entity::insert_many(chunk.iter().cloned().map(active_model))
                .exec(&txn)
                .await?;
        }

        txn.commit().await?;
        self.invalidate();

        if wishlisted > 0 {
            info!(discarded = wishlisted, "replace dropped wishlist flags");
        }
        debug!(deleted, inserted, generation = self.generation(), "replaced movie catalog");
        Ok(())
    }

    /// Sets the wishlist flag of the row with `movie_id`. Returns whether a
    /// row matched; an unknown id is not an error.
    pub async fn set_wishlisted(&self, movie_id: i32, wishlisted: bool) -> AppResult<bool> {
        let affected = movie::Entity::update_many()
            .col_expr(movie::Column::IsWishlisted, Expr::value(wishlisted))
            .filter(movie::Column::MovieId.eq(movie_id))
            .exec(&self.db)
            .await?
            .rows_affected;

        debug!(movie_id, wishlisted, affected, "updated wishlist flag");
        if affected > 0 {
            self.invalidate();
        }
        Ok(affected > 0)
    }

    pub async fn find_by_movie_id(&self, movie_id: i32) -> AppResult<Option<movie::Model>> {
        Ok(movie::Entity::find().filter(movie::Column::MovieId.eq(movie_id)).one(&self.db).await?)
    }

    pub async fn count(&self) -> AppResult<u64> {
        Ok(movie::Entity::find().count(&self.db).await?)
    }

    pub fn query_all(&self) -> MovieQuery {
        MovieQuery { db: self.db.clone(), kind: MovieQueryKind::All }
    }

    pub fn query_wishlisted(&self) -> MovieQuery {
        MovieQuery { db: self.db.clone(), kind: MovieQueryKind::Wishlisted }
    }
}

fn active_model(row: movie::Model) -> movie::ActiveModel {
    movie::ActiveModel {
        position: Set(row.position),
        movie_id: Set(row.movie_id),
        title: Set(row.title),
        year: Set(row.year),
        runtime: Set(row.runtime),
        genres: Set(row.genres),
        director: Set(row.director),
        actors: Set(row.actors),
        plot: Set(row.plot),
        poster_url: Set(row.poster_url),
        is_wishlisted: Set(row.is_wishlisted),
    }
}

/// A sorted query over `movies` served in `offset`/`limit` windows. Every
/// window re-issues the query.
#[derive(Clone)]
pub struct MovieQuery {
    db: DatabaseConnection,
    kind: MovieQueryKind,
}

impl MovieQuery {
    pub fn kind(&self) -> MovieQueryKind {
        self.kind
    }

    fn select(&self) -> Select<movie::Entity> {
        // Non-numeric years cast to 0 and sort last.
        let year = Expr::cust("CAST(\"year\" AS INTEGER)");
        match self.kind {
            MovieQueryKind::All => movie::Entity::find()
                .order_by(year, Order::Desc)
                .order_by_asc(movie::Column::Position),
            MovieQueryKind::Wishlisted => movie::Entity::find()
                .filter(movie::Column::IsWishlisted.eq(true))
                .order_by(year, Order::Desc)
                .order_by_asc(movie::Column::MovieId),
        }
    }
}

#[async_trait]
impl PagingSource for MovieQuery {
    type Item = movie::Model;

    async fn load(&self, offset: usize, limit: usize) -> AppResult<LoadResult<movie::Model>> {
        let txn = self.db.begin().await?;
        let total = self.select().count(&txn).await? as usize;
        let offset = clamp_offset(offset, limit, total);
        let items = self.select().offset(offset as u64).limit(limit as u64).all(&txn).await?;
        txn.commit().await?;

        debug!(kind = ?self.kind, offset, limit, rows = items.len(), total, "loaded movie window");
        Ok(LoadResult { items, offset, total })
    }
}
