//! In-memory price and volatility feed

use super::{OracleError, PriceOracle, PriceReading, VolatilityFeed, VolatilityReading};
use crate::clock::Clock;
use crate::fixed::Price;
use crate::ids::FeedId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Feed whose readings are set by hand, stamped with the injected clock
pub struct MockPriceFeed {
    clock: Arc<dyn Clock>,
    prices: RwLock<HashMap<FeedId, PriceReading>>,
    volatilities: RwLock<HashMap<FeedId, VolatilityReading>>,
}

impl MockPriceFeed {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            prices: RwLock::new(HashMap::new()),
            volatilities: RwLock::new(HashMap::new()),
        }
    }

    /// Report `price` as of now
    pub async fn set_price(&self, feed: &FeedId, price: Price) {
        let now = self.clock.now();
        self.set_price_at(feed, price, now).await;
    }

    pub async fn set_price_at(&self, feed: &FeedId, price: Price, timestamp: DateTime<Utc>) {
        tracing::debug!(feed = %feed, price = %price, "Mock price set");
        self.prices
            .write()
            .await
            .insert(feed.clone(), PriceReading { price, timestamp });
    }

    pub async fn set_volatility(&self, feed: &FeedId, volatility: Decimal) {
        let reading = VolatilityReading {
            volatility,
            timestamp: self.clock.now(),
        };
        self.volatilities.write().await.insert(feed.clone(), reading);
    }

    /// Drop the feed so reads fail
    pub async fn remove(&self, feed: &FeedId) {
        self.prices.write().await.remove(feed);
        self.volatilities.write().await.remove(feed);
    }
}

#[async_trait]
impl PriceOracle for MockPriceFeed {
    async fn latest_price(&self, feed: &FeedId) -> Result<PriceReading, OracleError> {
        self.prices
            .read()
            .await
            .get(feed)
            .copied()
            .ok_or_else(|| OracleError::FeedUnavailable(feed.clone()))
    }
}

#[async_trait]
impl VolatilityFeed for MockPriceFeed {
    async fn latest_volatility(&self, feed: &FeedId) -> Result<VolatilityReading, OracleError> {
        self.volatilities
            .read()
            .await
            .get(feed)
            .copied()
            .ok_or_else(|| OracleError::FeedUnavailable(feed.clone()))
    }
}
