//! Market prices and news as returned by the market services and kept in
//! the `market_cache` blob.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    #[default]
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: String,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    /// Unique within a price list.
    pub crop_name: String,
    pub current_price: f64,
    pub unit: String,
    /// Signed percentage change.
    pub change: f64,
    #[serde(default)]
    pub trend: Trend,
    pub last_updated: String,
    #[serde(default)]
    pub history: Vec<PricePoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NewsCategory {
    Tips,
    Weather,
    Market,
    Technology,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub content: String,
    pub category: NewsCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub published_at: String,
    pub source: String,
}

/// Persisted shape of the `market_cache` blob. Both lists share one
/// `lastUpdated` stamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketCache {
    #[serde(default)]
    pub prices: Vec<PriceQuote>,
    #[serde(default)]
    pub news: Vec<Article>,
    #[serde(default)]
    pub last_updated: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceQuery {
    pub region: Option<String>,
    pub crop: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsQuery {
    /// `None` means every category.
    pub category: Option<NewsCategory>,
    pub limit: usize,
}

impl NewsQuery {
    pub fn latest(limit: usize) -> Self {
        Self { category: None, limit }
    }
}

impl Default for NewsQuery {
    fn default() -> Self {
        Self::latest(crate::config::DEFAULT_NEWS_PAGE_SIZE)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewsPage {
    pub articles: Vec<Article>,
    /// Matches before the limit was applied.
    pub total: usize,
}
