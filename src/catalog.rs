use std::{num::NonZeroU32, sync::{Arc, Mutex}, time::Duration};

use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use jiff::{SignedDuration, Timestamp};
use serde::{Deserialize, Deserializer};
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};

pub const SERVICE_NAME: &str = "movie catalog";

/// Remembers when the catalog last answered 429 or 503 and refuses requests until
/// the cooldown has passed. Owned by one client and injected into it.
#[derive(Debug)]
pub struct RateLimitGate {
    limited_at: Mutex<Option<Timestamp>>,
    cooldown: SignedDuration,
}

impl RateLimitGate {
    pub fn new(cooldown: Duration) -> Self {
        let cooldown = SignedDuration::try_from(cooldown).unwrap_or(SignedDuration::MAX);
        Self { limited_at: Mutex::new(None), cooldown }
    }

    pub fn trip(&self) {
        self.trip_at(Timestamp::now());
    }

    pub fn trip_at(&self, at: Timestamp) {
        *self.lock() = Some(at);
    }

    pub fn reset(&self) {
        *self.lock() = None;
    }

    pub fn is_tripped(&self) -> bool {
        self.lock().is_some()
    }

    pub fn check(&self) -> AppResult<()> {
        self.check_at(Timestamp::now())
    }

    /// Fails while the cooldown started at the last trip is still running;
    /// once it has elapsed the gate resets itself.
    pub fn check_at(&self, now: Timestamp) -> AppResult<()> {
        let mut limited_at = self.lock();
        let Some(at) = *limited_at else {
            return Ok(());
        };
        if now.duration_since(at) >= self.cooldown {
            *limited_at = None;
            return Ok(());
        }
        Err(AppError::ServiceUnavailable { service: SERVICE_NAME, status: None })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Timestamp>> {
        self.limited_at.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct CatalogClient {
    client: reqwest::Client,
    url: String,
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    gate: Arc<RateLimitGate>,
}

impl CatalogClient {
    pub fn new(client: reqwest::Client, url: String, rps: u32, gate: Arc<RateLimitGate>) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(rps.max(1)).unwrap_or(NonZeroU32::MIN));
        let limiter = Arc::new(RateLimiter::direct(quota));
        Self { client, url, limiter, gate }
    }

    pub fn gate(&self) -> &RateLimitGate {
        &self.gate
    }

    /// Fetches the whole catalog in one request.
    pub async fn fetch_catalog(&self) -> AppResult<CatalogResponse> {
        self.gate.check()?;
        self.limiter.until_ready().await;

        debug!(url = %self.url, "fetching movie catalog");
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| AppError::from_http(SERVICE_NAME, e))?;

        let status = resp.status();
        if matches!(
            status,
            reqwest::StatusCode::TOO_MANY_REQUESTS | reqwest::StatusCode::SERVICE_UNAVAILABLE
        ) {
            warn!(status = status.as_u16(), "movie catalog is throttling, backing off");
            self.gate.trip();
        }
        if !status.is_success() {
            return Err(AppError::from_status(SERVICE_NAME, status.as_u16()));
        }

        let body = resp.bytes().await.map_err(|e| AppError::from_http(SERVICE_NAME, e))?;
        let catalog: CatalogResponse = serde_json::from_slice(&body)?;

        debug!(movies = catalog.movies.len(), genres = catalog.genres.len(), "fetched movie catalog");
        Ok(catalog)
    }
}

#[derive(Debug, Deserialize)]
pub struct CatalogResponse {
    #[serde(default)]
    pub genres: Vec<String>,
    pub movies: Vec<CatalogMovie>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogMovie {
    #[serde(deserialize_with = "lenient_i32")]
    pub id: i32,
    pub title: String,
    #[serde(deserialize_with = "lenient_i32")]
    pub year: i32,
    #[serde(default)]
    pub runtime: String,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub director: String,
    #[serde(default)]
    pub actors: String,
    #[serde(default)]
    pub plot: String,
    #[serde(default)]
    pub poster_url: String,
}

/// The published catalog writes some numbers as strings ("1988").
fn lenient_i32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i32, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(i32),
        String(String),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
