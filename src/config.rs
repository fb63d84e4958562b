use std::{net::SocketAddr, time::Duration};

use anyhow::Context;

use crate::paging::PagingConfig;

pub const DEFAULT_CATALOG_URL: &str =
    "https://raw.githubusercontent.com/erik-sytnyk/movies-list/master/db.json";

#[derive(Clone, Debug)]
pub struct Config {
    pub addr: SocketAddr,
    pub database_url: String,
    pub catalog_url: String,
    pub catalog_rps: u32,
    pub rate_limit_cooldown: Duration,
    pub http_timeout: Duration,
    pub paging: PagingConfig,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port: u16 =
            std::env::var("PORT").unwrap_or_else(|_| "3000".to_string()).parse().context("PORT")?;

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://moviedeck.db?mode=rwc".to_string());

        let catalog_url =
            std::env::var("CATALOG_URL").unwrap_or_else(|_| DEFAULT_CATALOG_URL.to_string());

        let catalog_rps: u32 =
            std::env::var("CATALOG_RPS").ok().and_then(|s| s.parse().ok()).unwrap_or(2);

        let cooldown_secs: u64 = std::env::var("RATE_LIMIT_COOLDOWN_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(60);

        let timeout_secs: u64 =
            std::env::var("HTTP_TIMEOUT_SECS").ok().and_then(|s| s.parse().ok()).unwrap_or(30);

        let defaults = PagingConfig::default();
        let page_size: usize = std::env::var("PAGE_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.page_size);
        let prefetch_distance: usize = std::env::var("PREFETCH_DISTANCE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.prefetch_distance);
        let enable_placeholders = std::env::var("ENABLE_PLACEHOLDERS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.enable_placeholders);

        let paging = PagingConfig::new(page_size, prefetch_distance, enable_placeholders);
        paging.validate().context("PAGE_SIZE/PREFETCH_DISTANCE")?;

        Ok(Self {
            addr: format!("{host}:{port}").parse().context("HOST/PORT")?,
            database_url,
            catalog_url,
            catalog_rps,
            rate_limit_cooldown: Duration::from_secs(cooldown_secs),
            http_timeout: Duration::from_secs(timeout_secs),
            paging,
        })
    }
}
