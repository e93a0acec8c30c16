//! Menu and nutrition lookups over the tiered cache
//!
//! `MenuService` is what the front end calls. Every lookup goes through
//! `ReadThrough::get_or_fetch` with one TTL, and every upstream call runs under
//! a per-fetch timeout. Fan-out lookups turn per-item failures into `None`.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::cache::{CacheKey, CacheManager, ReadThrough, DEFAULT_TTL};
use crate::data::{AllMenus, DailyMenu, FetchError, Fetcher, Nutrition, DINING_COURTS};

/// Default limit for a single upstream fetch
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors caused by malformed caller input
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestError {
    #[error("{0}")]
    BadRequest(String),
}

impl RequestError {
    /// HTTP status a route layer should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            RequestError::BadRequest(_) => 400,
        }
    }
}

/// Status for failures that are not the caller's fault
pub const INTERNAL_ERROR_STATUS: u16 = 500;

/// JSON error body returned at the boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub status: u16,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>, status: u16) -> Self {
        Self {
            error: message.into(),
            status,
        }
    }
}

/// Body of a nutrition batch request: `{"itemIds": [...]}`
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequest {
    pub item_ids: Vec<String>,
}

impl BatchRequest {
    /// Parses a request body. `itemIds` must be an array; numeric ids are accepted.
    pub fn parse(body: &str) -> Result<Self, RequestError> {
        let bad = || RequestError::BadRequest("itemIds must be an array".to_string());

        let json: Value = serde_json::from_str(body)
            .map_err(|e| RequestError::BadRequest(format!("invalid JSON body: {}", e)))?;
        let ids = json.get("itemIds").and_then(Value::as_array).ok_or_else(bad)?;

        let item_ids = ids
            .iter()
            .map(|id| match id {
                Value::String(s) => Ok(s.clone()),
                Value::Number(n) => Ok(n.to_string()),
                _ => Err(RequestError::BadRequest(
                    "itemIds must contain strings".to_string(),
                )),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { item_ids })
    }
}

/// Runs `fut`, failing with `FetchError::Timeout` once `limit` passes
async fn with_timeout<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T, FetchError>>,
) -> Result<T, FetchError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout(limit)),
    }
}

/// Cached access to menus and nutrition
#[derive(Clone)]
pub struct MenuService {
    fetcher: Arc<dyn Fetcher>,
    reader: ReadThrough,
    ttl: Duration,
    fetch_timeout: Duration,
    courts: Vec<String>,
}

impl MenuService {
    pub fn new(fetcher: Arc<dyn Fetcher>, cache: Arc<CacheManager>) -> Self {
        Self {
            fetcher,
            reader: ReadThrough::new(cache),
            ttl: DEFAULT_TTL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            courts: DINING_COURTS.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_fetch_timeout(mut self, limit: Duration) -> Self {
        self.fetch_timeout = limit;
        self
    }

    pub fn with_courts(mut self, courts: Vec<String>) -> Self {
        self.courts = courts;
        self
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        self.reader.cache()
    }

    pub fn courts(&self) -> &[String] {
        &self.courts
    }

    /// Menu for one court on one date
    pub async fn menu(&self, court: &str, date: NaiveDate) -> Result<Option<DailyMenu>, FetchError> {
        let fetcher = Arc::clone(&self.fetcher);
        let limit = self.fetch_timeout;
        let court_name = court.to_string();

        self.reader
            .get_or_fetch(&CacheKey::menu(court, date), self.ttl, move || async move {
                with_timeout(limit, fetcher.fetch_menu(&court_name, date)).await
            })
            .await
    }

    /// Every configured court's menu for a date, fetched concurrently
    ///
    /// A court whose fetch fails maps to `None`; the others are unaffected.
    pub async fn all_menus(&self, date: NaiveDate) -> AllMenus {
        let lookups = self.courts.iter().map(|court| async move {
            let menu = match self.menu(court, date).await {
                Ok(menu) => menu,
                Err(e) => {
                    warn!(court = %court, date = %date, error = %e, "Failed to fetch menu");
                    None
                }
            };
            (court.clone(), menu)
        });

        futures::future::join_all(lookups).await.into_iter().collect()
    }

    /// Nutrition document for one item
    pub async fn nutrition(&self, item_id: &str) -> Result<Option<Nutrition>, FetchError> {
        let fetcher = Arc::clone(&self.fetcher);
        let limit = self.fetch_timeout;
        let id = item_id.to_string();

        self.reader
            .get_or_fetch(&CacheKey::nutrition(item_id), self.ttl, move || async move {
                with_timeout(limit, fetcher.fetch_nutrition(&id)).await
            })
            .await
    }

    /// Nutrition for many items, fetched concurrently
    ///
    /// The result has one entry per distinct id; failed lookups map to `None`.
    pub async fn nutrition_batch(&self, item_ids: &[String]) -> BTreeMap<String, Option<Nutrition>> {
        let lookups = item_ids.iter().map(|id| async move {
            let nutrition = match self.nutrition(id).await {
                Ok(nutrition) => nutrition,
                Err(e) => {
                    warn!(item_id = %id, error = %e, "Failed to fetch nutrition");
                    None
                }
            };
            (id.clone(), nutrition)
        });

        futures::future::join_all(lookups).await.into_iter().collect()
    }
}
