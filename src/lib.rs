pub mod catalog;
pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod local;
pub mod models;
pub mod paging;
pub mod preferences;
pub mod refresh;
pub mod remote;
pub mod repository;
pub mod routes;
pub mod store;

use std::sync::Arc;

use crate::{refresh::RefreshController, repository::MovieRepository};

pub struct AppState {
    pub repository: Arc<dyn MovieRepository>,
    pub refresh: Arc<RefreshController>,
}
