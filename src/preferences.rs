use sea_orm::{DatabaseConnection, EntityTrait, Set, sea_query::OnConflict};
use tracing::{debug, warn};

use crate::{entities::preference, error::AppResult};

const CATALOG_STORED_KEY: &str = "IS_MOVIE_DATA_STORED";

/// Small persisted key/value flags that outlive a single run.
#[derive(Clone)]
pub struct AppPreferences {
    db: DatabaseConnection,
}

impl AppPreferences {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Whether a catalog refresh has ever completed. Read failures count as
    /// "not stored yet" so startup falls back to refreshing.
    pub async fn is_catalog_stored(&self) -> bool {
        match preference::Entity::find_by_id(CATALOG_STORED_KEY.to_string()).one(&self.db).await {
            Ok(row) => row.is_some_and(|r| r.value == "true"),
            Err(err) => {
                warn!(error = %err, "failed to read catalog stored flag");
                false
            }
        }
    }

    pub async fn set_catalog_stored(&self) -> AppResult<()> {
        self.put(CATALOG_STORED_KEY, "true").await
    }

    async fn put(&self, key: &str, value: &str) -> AppResult<()> {
        preference::Entity::insert(preference::ActiveModel {
            key: Set(key.to_string()),
            value: Set(value.to_string()),
        })
        .on_conflict(
            OnConflict::column(preference::Column::Key)
                .update_column(preference::Column::Value)
                .to_owned(),
        )
        .exec(&self.db)
        .await?;

        debug!(key, value, "stored preference");
        Ok(())
    }
}
