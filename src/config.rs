//! Runtime configuration handed in by the host application.

use serde::{Deserialize, Serialize};

use crate::app_response::AppResponse;

pub const DEFAULT_DB_NAME: &str = "agri_offline_core";
pub const DEFAULT_MARKET_CACHE_TTL_MS: i64 = 3_600_000;
pub const DEFAULT_UPCOMING_HARVEST_WINDOW_DAYS: i64 = 14;
pub const DEFAULT_NEWS_PAGE_SIZE: usize = 10;

/// What happens to harvests that point at a planting being deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlantingDeletePolicy {
    /// Harvests keep their `plantingId`, which then dangles.
    #[default]
    Retain,
    /// Linked harvests have their `plantingId` cleared.
    Detach,
    /// Linked harvests are deleted with the planting.
    Cascade,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoreConfig {
    /// Database name; the LMDB environment lives in `<dbName>.lmdb`.
    pub db_name: String,
    pub map_size_mb: usize,
    pub market_cache_ttl_ms: i64,
    pub upcoming_harvest_window_days: i64,
    pub planting_delete_policy: PlantingDeletePolicy,
    pub news_page_size: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            db_name: DEFAULT_DB_NAME.to_string(),
            map_size_mb: 16,
            market_cache_ttl_ms: DEFAULT_MARKET_CACHE_TTL_MS,
            upcoming_harvest_window_days: DEFAULT_UPCOMING_HARVEST_WINDOW_DAYS,
            planting_delete_policy: PlantingDeletePolicy::default(),
            news_page_size: DEFAULT_NEWS_PAGE_SIZE,
        }
    }
}

impl CoreConfig {
    /// Parses a JSON config. Missing fields take their defaults; a blank
    /// string yields the default config.
    pub fn from_json_str(raw: &str) -> Result<Self, AppResponse> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: CoreConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppResponse> {
        if self.db_name.trim().is_empty() {
            return Err(AppResponse::ValidationError("dbName cannot be empty".to_string()));
        }
        if self.map_size_mb == 0 {
            return Err(AppResponse::ValidationError("mapSizeMb must be positive".to_string()));
        }
        if self.market_cache_ttl_ms <= 0 {
            return Err(AppResponse::ValidationError(
                "marketCacheTtlMs must be positive".to_string(),
            ));
        }
        if self.upcoming_harvest_window_days < 0 {
            return Err(AppResponse::ValidationError(
                "upcomingHarvestWindowDays cannot be negative".to_string(),
            ));
        }
        if self.news_page_size == 0 {
            return Err(AppResponse::ValidationError("newsPageSize must be positive".to_string()));
        }
        Ok(())
    }

    pub fn map_size_bytes(&self) -> usize {
        self.map_size_mb.saturating_mul(1024 * 1024)
    }

    pub fn upcoming_window_ms(&self) -> i64 {
        self.upcoming_harvest_window_days.saturating_mul(24 * 60 * 60 * 1000)
    }
}
