//! Client-side menu loading
//!
//! Fronts `MenuService` with a `DayCache` so repeated runs on the same day
//! never go back to the network for menus or nutrition they already have.

use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate};
use tracing::{debug, info};

use crate::cache::{has_any_menu, CacheKey, DayCache, DayRead};
use crate::data::{AllMenus, FetchError, Nutrition};
use crate::ranking::{item_ids, FoodEntry, NutritionMap};
use crate::service::MenuService;

pub struct DailyMenus {
    cache: DayCache,
    service: Arc<MenuService>,
}

impl DailyMenus {
    pub fn new(cache: DayCache, service: Arc<MenuService>) -> Self {
        Self { cache, service }
    }

    pub fn today(&self) -> NaiveDate {
        self.cache.today()
    }

    /// Sweeps old records, then returns today's menus
    pub async fn load(&self) -> AllMenus {
        let removed = self.cache.sweep();
        if removed > 0 {
            info!(removed, "Removed old client cache records");
        }
        self.menus_for(self.today()).await
    }

    /// Menus for every court on `date`, from today's cache when possible
    ///
    /// Results with no menus at all are returned but never cached.
    pub async fn menus_for(&self, date: NaiveDate) -> AllMenus {
        match self.cache.menus(date) {
            DayRead::Hit(menus) => return menus,
            DayRead::WrongDay => debug!(%date, "Cached menus are from another day"),
            _ => debug!(%date, "No cached menus"),
        }

        let menus = self.service.all_menus(date).await;
        if has_any_menu(&menus) {
            self.cache.write(&CacheKey::all_menus(date), &menus);
        } else {
            debug!(%date, "No court returned a menu, not caching");
        }
        menus
    }

    /// Nutrition for one item, cached for the rest of the day once found
    pub async fn nutrition(&self, item_id: &str) -> Result<Option<Nutrition>, FetchError> {
        let key = CacheKey::nutrition(item_id);
        if let DayRead::Hit(doc) = self.cache.read::<Nutrition>(&key, |_| true) {
            return Ok(Some(doc));
        }

        let doc = self.service.nutrition(item_id).await?;
        if let Some(doc) = &doc {
            self.cache.write(&key, doc);
        }
        Ok(doc)
    }

    /// Nutrition for every distinct item among `foods`
    ///
    /// Items already cached today are served locally; the rest go out as one
    /// batch. Items whose lookup failed map to `None`.
    pub async fn nutrition_for(&self, foods: &[FoodEntry]) -> NutritionMap {
        let mut found = NutritionMap::new();
        let mut missing = Vec::new();

        for id in item_ids(foods) {
            match self.cache.read::<Nutrition>(&CacheKey::nutrition(&id), |_| true) {
                DayRead::Hit(doc) => {
                    found.insert(id, Some(doc));
                }
                _ => missing.push(id),
            }
        }

        if !missing.is_empty() {
            debug!(cached = found.len(), missing = missing.len(), "Fetching nutrition");
            for (id, doc) in self.service.nutrition_batch(&missing).await {
                if let Some(doc) = &doc {
                    self.cache.write(&CacheKey::nutrition(&id), doc);
                }
                found.insert(id, doc);
            }
        }
        found
    }

    /// When today's menus were cached, if they are
    pub fn cached_at(&self) -> Option<DateTime<Local>> {
        self.cache.cached_at(&CacheKey::all_menus(self.today()))
    }

    /// Drops today's cached menus so the next load refetches them
    pub fn forget_today(&self) {
        self.cache.remove(&CacheKey::all_menus(self.today()));
    }
}
