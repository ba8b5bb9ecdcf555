//! Time-limited cache of market prices and news.
//!
//! The cache is valid while `now - lastUpdated < ttl`. Validity only decides
//! whether to refetch; stale lists stay visible until replaced. Prices and
//! news share one timestamp, so writing either list restarts the clock for
//! both.

use std::sync::Arc;

use log::{debug, error, info};
use serde::Serialize;

use crate::clock::Clock;
use crate::config::CoreConfig;
use crate::market_model::{Article, MarketCache, NewsCategory, NewsQuery, PriceQuery, PriceQuote};
use crate::observer::{SubscriptionId, Subscribers};
use crate::services::MarketService;
use crate::storage::{read_json, write_json, KeyValueStore};

pub const MARKET_CACHE_KEY: &str = "market_cache";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketState {
    pub prices: Vec<PriceQuote>,
    pub news: Vec<Article>,
    pub last_updated: Option<i64>,
    pub loading: bool,
    pub error: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MarketCacheRef<'a> {
    prices: &'a [PriceQuote],
    news: &'a [Article],
    last_updated: Option<i64>,
}

pub struct MarketStore {
    storage: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    ttl_ms: i64,
    news_page_size: usize,
    cache_loaded: bool,
    state: MarketState,
    subscribers: Subscribers<MarketState>,
}

impl MarketStore {
    pub fn new(storage: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, config: &CoreConfig) -> Self {
        Self {
            storage,
            clock,
            ttl_ms: config.market_cache_ttl_ms,
            news_page_size: config.news_page_size,
            cache_loaded: false,
            state: MarketState::default(),
            subscribers: Subscribers::new(),
        }
    }

    pub fn state(&self) -> &MarketState {
        &self.state
    }

    pub fn prices(&self) -> &[PriceQuote] {
        &self.state.prices
    }

    pub fn news(&self) -> &[Article] {
        &self.state.news
    }

    pub fn last_updated(&self) -> Option<i64> {
        self.state.last_updated
    }

    pub fn is_loading(&self) -> bool {
        self.state.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.state.error.as_deref()
    }

    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: Fn(&MarketState) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    pub fn is_cache_valid(&self) -> bool {
        match self.state.last_updated {
            Some(stamp) => self.clock.now_ms() - stamp < self.ttl_ms,
            None => false,
        }
    }

    /// Replaces prices, news and the timestamp with the persisted copy.
    /// Does not look at validity.
    pub fn load_cached_data(&mut self) {
        self.cache_loaded = true;
        match read_json::<MarketCache>(self.storage.as_ref(), MARKET_CACHE_KEY) {
            Ok(Some(cache)) => {
                debug!(
                    "Loaded market cache: {} prices, {} articles",
                    cache.prices.len(),
                    cache.news.len()
                );
                self.state.prices = cache.prices;
                self.state.news = cache.news;
                self.state.last_updated = cache.last_updated;
                self.notify();
            }
            Ok(None) => {}
            Err(e) => error!("Failed to load cached market data: {e}"),
        }
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.state.loading = loading;
        self.notify();
    }

    /// Records a fetch failure; cached lists stay as they are.
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.state.error = Some(message.into());
        self.state.loading = false;
        self.notify();
    }

    pub fn set_prices(&mut self, prices: Vec<PriceQuote>) {
        self.state.prices = prices;
        self.stamp_and_persist();
    }

    pub fn set_news(&mut self, news: Vec<Article>) {
        self.state.news = news;
        self.stamp_and_persist();
    }

    /// Drops the persisted cache and empties memory. If the durable delete
    /// fails, memory is left as it was.
    pub fn clear_cache(&mut self) {
        match self.storage.remove(MARKET_CACHE_KEY) {
            Ok(_) => {
                self.state.prices.clear();
                self.state.news.clear();
                self.state.last_updated = None;
                info!("Market cache cleared");
                self.notify();
            }
            Err(e) => error!("Failed to clear cache: {e}"),
        }
    }

    pub fn price_for(&self, crop_name: &str) -> Option<&PriceQuote> {
        self.state
            .prices
            .iter()
            .find(|quote| quote.crop_name.eq_ignore_ascii_case(crop_name))
    }

    pub fn news_in(&self, category: NewsCategory) -> Vec<&Article> {
        self.state.news.iter().filter(|a| a.category == category).collect()
    }

    /// Loads the cache on first use and refetches both lists when it has
    /// expired. Returns whether a fetch was attempted.
    ///
    /// Both lists are fetched before anything is applied. The cache is only
    /// restamped when both fetches succeed; after a partial failure the
    /// list that did arrive replaces its stale copy, `lastUpdated` keeps
    /// its old value and the first failure is left in the error field.
    pub fn ensure_fresh(&mut self, service: &dyn MarketService) -> bool {
        if !self.cache_loaded {
            self.load_cached_data();
        }
        if self.is_cache_valid() {
            return false;
        }

        self.set_loading(true);
        let prices = service.fetch_prices(&PriceQuery::default());
        let news = service.fetch_news(&NewsQuery::latest(self.news_page_size));

        match (prices, news) {
            (Ok(prices), Ok(page)) => {
                debug!("Fetched {} prices and {} of {} articles", prices.len(), page.articles.len(), page.total);
                self.state.prices = prices;
                self.state.news = page.articles;
                self.stamp_and_persist();
            }
            (prices, news) => {
                let mut first_failure = None;
                match prices {
                    Ok(prices) => self.state.prices = prices,
                    Err(e) => {
                        error!("Failed to fetch market prices: {e}");
                        first_failure.get_or_insert(e.to_string());
                    }
                }
                match news {
                    Ok(page) => self.state.news = page.articles,
                    Err(e) => {
                        error!("Failed to fetch news: {e}");
                        first_failure.get_or_insert(e.to_string());
                    }
                }
                self.persist_cache();
                self.set_error(first_failure.unwrap_or_default());
            }
        }
        true
    }

    /// Forced price refetch.
    pub fn refresh_prices(&mut self, service: &dyn MarketService, query: &PriceQuery) -> bool {
        self.set_loading(true);
        match service.fetch_prices(query) {
            Ok(prices) => {
                self.set_prices(prices);
                true
            }
            Err(e) => {
                error!("Failed to fetch market prices: {e}");
                self.set_error(e.to_string());
                false
            }
        }
    }

    /// Forced news refetch.
    pub fn refresh_news(&mut self, service: &dyn MarketService, query: &NewsQuery) -> bool {
        self.set_loading(true);
        match service.fetch_news(query) {
            Ok(page) => {
                debug!("Fetched {} of {} articles", page.articles.len(), page.total);
                self.set_news(page.articles);
                true
            }
            Err(e) => {
                error!("Failed to fetch news: {e}");
                self.set_error(e.to_string());
                false
            }
        }
    }

    fn stamp_and_persist(&mut self) {
        self.state.last_updated = Some(self.clock.now_ms());
        self.state.loading = false;
        self.state.error = None;
        self.persist_cache();
        self.notify();
    }

    fn persist_cache(&self) {
        let cache = MarketCacheRef {
            prices: &self.state.prices,
            news: &self.state.news,
            last_updated: self.state.last_updated,
        };
        if let Err(e) = write_json(self.storage.as_ref(), MARKET_CACHE_KEY, &cache) {
            error!("Failed to save market cache: {e}");
        }
    }

    fn notify(&self) {
        self.subscribers.notify(&self.state);
    }
}
