//! Planting and harvest records.
//!
//! Records serialize as camelCase JSON so the host UI and the persisted
//! `farm_data` blob share one shape:
//!
//! ```rust
//! use agri_offline_core::farm_model::{NewPlanting, PlantingStatus, Planting};
//!
//! let planting = Planting::from_new(
//!     "1704096000000".to_string(),
//!     NewPlanting::new("Tomato", "2024-01-01"),
//!     "2024-01-01T08:00:00.000Z".to_string(),
//! );
//! assert_eq!(planting.status, PlantingStatus::Planned);
//!
//! let json = serde_json::to_value(&planting)?;
//! assert_eq!(json["cropName"], "Tomato");
//! # Ok::<(), serde_json::Error>(())
//! ```

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlantingStatus {
    #[default]
    Planned,
    Planted,
    Growing,
    Ready,
    Harvested,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HarvestQuality {
    Excellent,
    Good,
    #[default]
    Average,
    Poor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Planting {
    pub id: String,
    pub crop_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variety: Option<String>,
    pub planting_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_harvest_date: Option<String>,
    /// Area as typed by the user (a numeric string, unit chosen by the UI).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub status: PlantingStatus,
    #[serde(default)]
    pub created_at: String,
}

impl Planting {
    pub fn from_new(id: String, input: NewPlanting, created_at: String) -> Self {
        Self {
            id,
            crop_name: input.crop_name,
            variety: input.variety,
            planting_date: input.planting_date,
            expected_harvest_date: input.expected_harvest_date,
            area: input.area,
            notes: input.notes,
            status: PlantingStatus::Planned,
            created_at,
        }
    }

    pub fn is_harvested(&self) -> bool {
        self.status == PlantingStatus::Harvested
    }

    /// Expected harvest as an instant. Bare dates are read as UTC midnight;
    /// blank or unparseable values yield `None`.
    pub fn expected_harvest_at(&self) -> Option<DateTime<Utc>> {
        self.expected_harvest_date.as_deref().and_then(parse_calendar_date)
    }
}

/// Input for [`crate::farm_store::FarmStore::add_planting`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPlanting {
    pub crop_name: String,
    #[serde(default)]
    pub variety: Option<String>,
    pub planting_date: String,
    #[serde(default)]
    pub expected_harvest_date: Option<String>,
    #[serde(default)]
    pub area: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewPlanting {
    pub fn new(crop_name: impl Into<String>, planting_date: impl Into<String>) -> Self {
        Self {
            crop_name: crop_name.into(),
            planting_date: planting_date.into(),
            ..Self::default()
        }
    }

    pub fn expected_harvest(mut self, date: impl Into<String>) -> Self {
        self.expected_harvest_date = Some(date.into());
        self
    }
}

/// Partial update; only fields present in the input are written. For the
/// optional fields an explicit `null` clears the stored value, so they are
/// `Option<Option<_>>`: outer `None` means absent, `Some(None)` means clear.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlantingPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop_name: Option<String>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub variety: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planting_date: Option<String>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub expected_harvest_date: Option<Option<String>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub area: Option<Option<String>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub notes: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<PlantingStatus>,
}

impl PlantingPatch {
    pub fn status(status: PlantingStatus) -> Self {
        Self { status: Some(status), ..Self::default() }
    }

    pub fn apply(self, planting: &mut Planting) {
        if let Some(crop_name) = self.crop_name {
            planting.crop_name = crop_name;
        }
        if let Some(variety) = self.variety {
            planting.variety = variety;
        }
        if let Some(planting_date) = self.planting_date {
            planting.planting_date = planting_date;
        }
        if let Some(expected_harvest_date) = self.expected_harvest_date {
            planting.expected_harvest_date = expected_harvest_date;
        }
        if let Some(area) = self.area {
            planting.area = area;
        }
        if let Some(notes) = self.notes {
            planting.notes = notes;
        }
        if let Some(status) = self.status {
            planting.status = status;
        }
    }
}

/// Deserializes a field that is present in the input, keeping `null` as
/// `Some(None)`. Absent fields fall back to `Default` (`None`).
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn default_unit() -> String {
    "kg".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Harvest {
    pub id: String,
    pub crop_name: String,
    pub harvest_date: String,
    #[serde(rename = "yield")]
    pub yield_amount: f64,
    #[serde(default = "default_unit")]
    pub unit: String,
    #[serde(default)]
    pub quality: HarvestQuality,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Weak link to the planting this harvest came from.
    #[serde(default)]
    pub planting_id: Option<String>,
    #[serde(default)]
    pub created_at: String,
}

impl Harvest {
    pub fn from_new(id: String, input: NewHarvest, created_at: String) -> Self {
        Self {
            id,
            crop_name: input.crop_name,
            harvest_date: input.harvest_date,
            yield_amount: input.yield_amount,
            unit: input.unit,
            quality: input.quality,
            notes: input.notes,
            planting_id: input.planting_id,
            created_at,
        }
    }
}

/// Input for [`crate::farm_store::FarmStore::add_harvest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewHarvest {
    pub crop_name: String,
    pub harvest_date: String,
    #[serde(rename = "yield")]
    pub yield_amount: f64,
    #[serde(default = "default_unit")]
    pub unit: String,
    #[serde(default)]
    pub quality: HarvestQuality,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub planting_id: Option<String>,
}

impl NewHarvest {
    pub fn new(crop_name: impl Into<String>, harvest_date: impl Into<String>, yield_amount: f64) -> Self {
        Self {
            crop_name: crop_name.into(),
            harvest_date: harvest_date.into(),
            yield_amount,
            unit: default_unit(),
            quality: HarvestQuality::default(),
            notes: None,
            planting_id: None,
        }
    }

    pub fn linked_to(mut self, planting_id: impl Into<String>) -> Self {
        self.planting_id = Some(planting_id.into());
        self
    }
}

/// Partial harvest update; `notes` and `plantingId` accept `null` to clear.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HarvestPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub harvest_date: Option<String>,
    #[serde(rename = "yield", skip_serializing_if = "Option::is_none")]
    pub yield_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<HarvestQuality>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub notes: Option<Option<String>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub planting_id: Option<Option<String>>,
}

impl HarvestPatch {
    pub fn apply(self, harvest: &mut Harvest) {
        if let Some(crop_name) = self.crop_name {
            harvest.crop_name = crop_name;
        }
        if let Some(harvest_date) = self.harvest_date {
            harvest.harvest_date = harvest_date;
        }
        if let Some(yield_amount) = self.yield_amount {
            harvest.yield_amount = yield_amount;
        }
        if let Some(unit) = self.unit {
            harvest.unit = unit;
        }
        if let Some(quality) = self.quality {
            harvest.quality = quality;
        }
        if let Some(notes) = self.notes {
            harvest.notes = notes;
        }
        if let Some(planting_id) = self.planting_id {
            harvest.planting_id = planting_id;
        }
    }
}

/// Persisted shape of the `farm_data` blob.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FarmData {
    #[serde(default)]
    pub plantings: Vec<Planting>,
    #[serde(default)]
    pub harvests: Vec<Harvest>,
}

/// Dashboard counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FarmSummary {
    pub planting_count: usize,
    pub active_count: usize,
    pub harvest_count: usize,
    pub total_yield: f64,
}

/// Accepts `YYYY-MM-DD` (UTC midnight) or a full RFC 3339 timestamp.
pub fn parse_calendar_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(stamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(stamp.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    let midnight = date.and_hms_opt(0, 0, 0)?;
    Some(Utc.from_utc_datetime(&midnight))
}
