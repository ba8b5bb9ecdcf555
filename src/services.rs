//! Collaborator contracts for the remote analysis and market services.
//!
//! The core never talks to the network itself; the host implements these
//! traits (HTTP client, mock data, ...) and passes them into the stores.

use thiserror::Error;

use crate::market_model::{NewsPage, NewsQuery, PriceQuery, PriceQuote};
use crate::scan_model::{AnalysisResult, AnalysisType, GeoPoint};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// No connectivity; scans failing this way are queued for later upload.
    #[error("No network connection. The image was saved and will be analyzed when you are back online.")]
    Offline,
    #[error("{0}")]
    Failed(String),
}

pub trait AnalysisService {
    fn analyze_crop(&self, image_uri: &str, location: Option<GeoPoint>) -> Result<AnalysisResult, ServiceError>;

    fn analyze_soil(&self, image_uri: &str, location: Option<GeoPoint>) -> Result<AnalysisResult, ServiceError>;

    fn detect_pest(&self, image_uri: &str, location: Option<GeoPoint>) -> Result<AnalysisResult, ServiceError>;

    /// Dispatches on `analysis_type`.
    fn analyze(
        &self,
        analysis_type: AnalysisType,
        image_uri: &str,
        location: Option<GeoPoint>,
    ) -> Result<AnalysisResult, ServiceError> {
        match analysis_type {
            AnalysisType::Crop => self.analyze_crop(image_uri, location),
            AnalysisType::Soil => self.analyze_soil(image_uri, location),
            AnalysisType::Pest => self.detect_pest(image_uri, location),
        }
    }
}

pub trait MarketService {
    fn fetch_prices(&self, query: &PriceQuery) -> Result<Vec<PriceQuote>, ServiceError>;

    fn fetch_news(&self, query: &NewsQuery) -> Result<NewsPage, ServiceError>;
}
