//! Durable planting and harvest records.
//!
//! Every mutation updates memory first and then rewrites the whole
//! `farm_data` blob. A failed write is logged and reported through
//! [`FarmState::error`] and [`FarmState::dirty`]; the in-memory change is
//! kept, so memory may run ahead of disk until the next successful write.

use std::sync::Arc;

use log::{error, info, warn};
use serde::Serialize;

use crate::clock::{Clock, MonotonicMillis};
use crate::config::{CoreConfig, PlantingDeletePolicy};
use crate::farm_model::{
    FarmData, FarmSummary, Harvest, HarvestPatch, NewHarvest, NewPlanting, Planting,
    PlantingPatch, PlantingStatus,
};
use crate::observer::{SubscriptionId, Subscribers};
use crate::storage::{read_json, write_json, KeyValueStore};

pub const FARM_DATA_KEY: &str = "farm_data";

const LOAD_FAILED: &str = "Failed to load data";
const SAVE_FAILED: &str = "Failed to save data";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FarmState {
    pub plantings: Vec<Planting>,
    pub harvests: Vec<Harvest>,
    pub loading: bool,
    pub error: Option<String>,
    /// Set when the last write failed and disk lags memory.
    pub dirty: bool,
}

#[derive(Serialize)]
struct FarmDataRef<'a> {
    plantings: &'a [Planting],
    harvests: &'a [Harvest],
}

pub struct FarmStore {
    storage: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    delete_policy: PlantingDeletePolicy,
    upcoming_window_ms: i64,
    ids: MonotonicMillis,
    state: FarmState,
    subscribers: Subscribers<FarmState>,
}

impl FarmStore {
    pub fn new(storage: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, config: &CoreConfig) -> Self {
        Self {
            storage,
            clock,
            delete_policy: config.planting_delete_policy,
            upcoming_window_ms: config.upcoming_window_ms(),
            ids: MonotonicMillis::default(),
            state: FarmState::default(),
            subscribers: Subscribers::new(),
        }
    }

    pub fn state(&self) -> &FarmState {
        &self.state
    }

    pub fn plantings(&self) -> &[Planting] {
        &self.state.plantings
    }

    pub fn harvests(&self) -> &[Harvest] {
        &self.state.harvests
    }

    pub fn is_loading(&self) -> bool {
        self.state.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.state.error.as_deref()
    }

    pub fn is_dirty(&self) -> bool {
        self.state.dirty
    }

    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: Fn(&FarmState) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.state.loading = loading;
        self.notify();
    }

    pub fn set_error(&mut self, message: Option<String>) {
        self.state.error = message;
        self.notify();
    }

    /// Replaces both collections with the persisted copy. Never fails:
    /// a missing blob leaves memory untouched, an unreadable one sets the
    /// error field.
    pub fn load_farm_data(&mut self) {
        self.set_loading(true);

        match read_json::<FarmData>(self.storage.as_ref(), FARM_DATA_KEY) {
            Ok(Some(data)) => {
                info!(
                    "Loaded {} plantings and {} harvests",
                    data.plantings.len(),
                    data.harvests.len()
                );
                self.ids.reset();
                for id in data.plantings.iter().map(|p| &p.id).chain(data.harvests.iter().map(|h| &h.id)) {
                    if let Ok(stamp) = id.parse::<i64>() {
                        self.ids.observe(stamp);
                    }
                }
                self.state.plantings = data.plantings;
                self.state.harvests = data.harvests;
                self.state.dirty = false;
            }
            Ok(None) => info!("No farm data stored yet"),
            Err(e) => {
                error!("Failed to load farm data: {e}");
                self.state.error = Some(LOAD_FAILED.to_string());
            }
        }

        self.state.loading = false;
        self.notify();
    }

    pub fn add_planting(&mut self, input: NewPlanting) -> Planting {
        let id = self.next_id();
        let planting = Planting::from_new(id, input, self.clock.now_iso());
        self.state.plantings.push(planting.clone());
        self.persist();
        self.notify();
        planting
    }

    /// Merges `patch` into the planting with `id`. Returns `false` (and
    /// writes nothing) when no such planting exists.
    pub fn update_planting(&mut self, id: &str, patch: PlantingPatch) -> bool {
        let Some(planting) = self.state.plantings.iter_mut().find(|p| p.id == id) else {
            warn!("update_planting: no planting with id {id}");
            return false;
        };
        patch.apply(planting);
        self.persist();
        self.notify();
        true
    }

    pub fn delete_planting(&mut self, id: &str) -> bool {
        let before = self.state.plantings.len();
        self.state.plantings.retain(|p| p.id != id);
        if self.state.plantings.len() == before {
            return false;
        }

        let linked = self.linked_harvest_count(id);
        if linked > 0 {
            match self.delete_policy {
                PlantingDeletePolicy::Retain => {
                    warn!("Planting {id} deleted; {linked} harvest(s) still reference it");
                }
                PlantingDeletePolicy::Detach => {
                    for harvest in self
                        .state
                        .harvests
                        .iter_mut()
                        .filter(|h| h.planting_id.as_deref() == Some(id))
                    {
                        harvest.planting_id = None;
                    }
                    info!("Detached {linked} harvest(s) from deleted planting {id}");
                }
                PlantingDeletePolicy::Cascade => {
                    self.state.harvests.retain(|h| h.planting_id.as_deref() != Some(id));
                    info!("Deleted {linked} harvest(s) with planting {id}");
                }
            }
        }

        self.persist();
        self.notify();
        true
    }

    /// Records a harvest. A linked planting is marked harvested before the
    /// harvest itself is written.
    pub fn add_harvest(&mut self, input: NewHarvest) -> Harvest {
        let id = self.next_id();
        let harvest = Harvest::from_new(id, input, self.clock.now_iso());
        self.state.harvests.push(harvest.clone());

        if let Some(planting_id) = harvest.planting_id.as_deref() {
            match self.state.plantings.iter_mut().find(|p| p.id == planting_id) {
                Some(planting) => planting.status = PlantingStatus::Harvested,
                None => warn!("Harvest {} links unknown planting {planting_id}", harvest.id),
            }
        }

        self.persist();
        self.notify();
        harvest
    }

    pub fn update_harvest(&mut self, id: &str, patch: HarvestPatch) -> bool {
        let Some(harvest) = self.state.harvests.iter_mut().find(|h| h.id == id) else {
            warn!("update_harvest: no harvest with id {id}");
            return false;
        };
        patch.apply(harvest);
        self.persist();
        self.notify();
        true
    }

    pub fn delete_harvest(&mut self, id: &str) -> bool {
        let before = self.state.harvests.len();
        self.state.harvests.retain(|h| h.id != id);
        if self.state.harvests.len() == before {
            return false;
        }
        self.persist();
        self.notify();
        true
    }

    pub fn planting(&self, id: &str) -> Option<&Planting> {
        self.state.plantings.iter().find(|p| p.id == id)
    }

    pub fn harvest(&self, id: &str) -> Option<&Harvest> {
        self.state.harvests.iter().find(|h| h.id == id)
    }

    /// Plantings not yet harvested, in insertion order.
    pub fn active_plantings(&self) -> Vec<&Planting> {
        self.state.plantings.iter().filter(|p| !p.is_harvested()).collect()
    }

    /// Unharvested plantings expected between now and the end of the
    /// configured window (both ends inclusive), in insertion order.
    pub fn upcoming_harvests(&self) -> Vec<&Planting> {
        let now = self.clock.now_ms();
        let horizon = now.saturating_add(self.upcoming_window_ms);
        self.state
            .plantings
            .iter()
            .filter(|p| !p.is_harvested())
            .filter(|p| {
                p.expected_harvest_at()
                    .map(|at| at.timestamp_millis())
                    .is_some_and(|at| now <= at && at <= horizon)
            })
            .collect()
    }

    pub fn harvests_for_planting(&self, planting_id: &str) -> Vec<&Harvest> {
        self.state
            .harvests
            .iter()
            .filter(|h| h.planting_id.as_deref() == Some(planting_id))
            .collect()
    }

    pub fn summary(&self) -> FarmSummary {
        FarmSummary {
            planting_count: self.state.plantings.len(),
            active_count: self.active_plantings().len(),
            harvest_count: self.state.harvests.len(),
            total_yield: self.state.harvests.iter().map(|h| h.yield_amount).sum(),
        }
    }

    fn linked_harvest_count(&self, planting_id: &str) -> usize {
        self.harvests_for_planting(planting_id).len()
    }

    fn next_id(&mut self) -> String {
        self.ids.next(self.clock.now_ms()).to_string()
    }

    fn persist(&mut self) {
        let data = FarmDataRef {
            plantings: &self.state.plantings,
            harvests: &self.state.harvests,
        };
        match write_json(self.storage.as_ref(), FARM_DATA_KEY, &data) {
            Ok(()) => self.state.dirty = false,
            Err(e) => {
                error!("Failed to save farm data: {e}");
                self.state.error = Some(SAVE_FAILED.to_string());
                self.state.dirty = true;
            }
        }
    }

    fn notify(&self) {
        self.subscribers.notify(&self.state);
    }
}
