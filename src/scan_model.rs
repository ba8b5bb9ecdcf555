//! Scan workflow types: analysis kinds, result payloads, the session state
//! machine and offline upload queue entries.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::app_response::AppResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisType {
    Crop,
    Soil,
    Pest,
}

impl AnalysisType {
    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisType::Crop => "crop",
            AnalysisType::Soil => "soil",
            AnalysisType::Pest => "pest",
        }
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisType {
    type Err = AppResponse;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "crop" => Ok(AnalysisType::Crop),
            "soil" => Ok(AnalysisType::Soil),
            "pest" => Ok(AnalysisType::Pest),
            other => Err(AppResponse::ValidationError(format!("Unknown analysis type: {other}"))),
        }
    }
}

/// Optional capture location forwarded to analysis services.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropHealthReport {
    pub crop_name: String,
    pub health_status: String,
    #[serde(default)]
    pub disease: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    /// Percentage of the plant showing symptoms.
    #[serde(default)]
    pub affected_area: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NutrientLevels {
    #[serde(default)]
    pub nitrogen: String,
    #[serde(default)]
    pub phosphorus: String,
    #[serde(default)]
    pub potassium: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoilReport {
    pub soil_type: String,
    #[serde(rename = "pH", default)]
    pub ph: Option<f64>,
    #[serde(default)]
    pub moisture: Option<String>,
    #[serde(default)]
    pub nutrients: NutrientLevels,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub fertilizer_needed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PestReport {
    pub pest_name: String,
    #[serde(default)]
    pub scientific_name: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub lifecycle: Option<String>,
    #[serde(default)]
    pub treatment_methods: Vec<String>,
    #[serde(default)]
    pub organic_options: Vec<String>,
    #[serde(default)]
    pub prevention_tips: Vec<String>,
}

/// Whatever an analysis service returned, kept exactly as received.
///
/// The payload is never validated; [`AnalysisResult::crop_health`],
/// [`AnalysisResult::soil`] and [`AnalysisResult::pest`] decode typed views
/// on demand and return `None` when the shape does not match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalysisResult(JsonValue);

impl AnalysisResult {
    pub fn new(value: JsonValue) -> Self {
        Self(value)
    }

    pub fn as_json(&self) -> &JsonValue {
        &self.0
    }

    pub fn into_json(self) -> JsonValue {
        self.0
    }

    pub fn crop_health(&self) -> Option<CropHealthReport> {
        self.view()
    }

    pub fn soil(&self) -> Option<SoilReport> {
        self.view()
    }

    pub fn pest(&self) -> Option<PestReport> {
        self.view()
    }

    fn view<T: DeserializeOwned>(&self) -> Option<T> {
        T::deserialize(&self.0).ok()
    }
}

impl From<JsonValue> for AnalysisResult {
    fn from(value: JsonValue) -> Self {
        Self(value)
    }
}

/// Scan session state. Result and error are separate variants, so a session
/// can never hold both.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum ScanState {
    #[default]
    Idle,
    Selected {
        image: String,
    },
    Loading {
        image: String,
        generation: u64,
    },
    Result {
        image: Option<String>,
        result: AnalysisResult,
    },
    Error {
        image: Option<String>,
        message: String,
    },
}

impl ScanState {
    pub fn image(&self) -> Option<&str> {
        match self {
            ScanState::Idle => None,
            ScanState::Selected { image } | ScanState::Loading { image, .. } => Some(image.as_str()),
            ScanState::Result { image, .. } | ScanState::Error { image, .. } => image.as_deref(),
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, ScanState::Loading { .. })
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        match self {
            ScanState::Result { result, .. } => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ScanState::Error { message, .. } => Some(message.as_str()),
            _ => None,
        }
    }
}

/// Handle for one in-flight analysis. Completing with a ticket whose
/// generation has been superseded is a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisTicket {
    pub generation: u64,
    pub image: String,
    pub analysis_type: Option<AnalysisType>,
}

/// How an analysis request ended.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    Success(AnalysisResult),
    Failed(String),
    /// The service could not be reached; the image belongs in the upload queue.
    Offline,
}

/// FFI payload for finishing an analysis: exactly one of `result`, `error`
/// or `"offline": true`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnalysisCompletion {
    pub ticket: AnalysisTicket,
    #[serde(default)]
    pub result: Option<AnalysisResult>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub offline: bool,
}

impl AnalysisCompletion {
    pub fn into_outcome(self) -> Result<(AnalysisTicket, AnalysisOutcome), AppResponse> {
        let outcome = match (self.result, self.error, self.offline) {
            (Some(result), None, false) => AnalysisOutcome::Success(result),
            (None, Some(message), false) => AnalysisOutcome::Failed(message),
            (None, None, true) => AnalysisOutcome::Offline,
            _ => {
                return Err(AppResponse::BadRequest(
                    "Completion needs exactly one of result, error or offline".to_string(),
                ))
            }
        };
        Ok((self.ticket, outcome))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingUpload {
    pub image: String,
    #[serde(rename = "type")]
    pub analysis_type: AnalysisType,
    /// Enqueue time in ms; also the removal key.
    pub timestamp: i64,
}
