//! The context object a host creates once and hands to its screens.

use std::sync::Arc;

use log::info;

use crate::app_response::AppResponse;
use crate::clock::{Clock, SystemClock};
use crate::config::CoreConfig;
use crate::farm_store::FarmStore;
use crate::local_db_state::AppDbState;
use crate::market_store::MarketStore;
use crate::scan_store::ScanStore;
use crate::storage::KeyValueStore;

/// Owns the three stores over one durable store. The stores never call
/// each other; each writes only its own key.
pub struct AgriCore {
    config: CoreConfig,
    storage: Arc<dyn KeyValueStore>,
    pub farm: FarmStore,
    pub scan: ScanStore,
    pub market: MarketStore,
}

impl AgriCore {
    /// Opens the LMDB environment named in `config` and loads persisted state.
    pub fn open(config: CoreConfig) -> Result<Self, AppResponse> {
        config.validate()?;
        let db = AppDbState::init_with_map_size(config.db_name.clone(), config.map_size_bytes())?;
        let mut core = Self::with_storage(config, Arc::new(db), Arc::new(SystemClock));
        core.hydrate();
        Ok(core)
    }

    /// Builds the stores without touching storage.
    pub fn with_storage(config: CoreConfig, storage: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            farm: FarmStore::new(Arc::clone(&storage), Arc::clone(&clock), &config),
            scan: ScanStore::new(Arc::clone(&storage), Arc::clone(&clock)),
            market: MarketStore::new(Arc::clone(&storage), clock, &config),
            config,
            storage,
        }
    }

    /// Startup load of every store's persisted slice.
    pub fn hydrate(&mut self) {
        self.farm.load_farm_data();
        self.scan.load_pending_uploads();
        self.market.load_cached_data();
        info!(
            "Core ready: {} plantings, {} pending uploads, market cache {}",
            self.farm.plantings().len(),
            self.scan.pending_uploads().len(),
            if self.market.is_cache_valid() { "fresh" } else { "stale" }
        );
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn close(&self) -> Result<(), AppResponse> {
        self.storage.flush()
    }
}
