//! Oracle module
//!
//! Price and volatility collaborators plus the freshness rules applied to their readings

mod mock;
mod realized;
mod types;

pub use mock::MockPriceFeed;
pub use realized::RealizedVolatility;
pub use types::{OracleError, PriceReading, VolatilityReading};

use crate::fixed::Price;
use crate::ids::FeedId;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

/// Source of spot prices
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Latest price and update time for `feed`
    async fn latest_price(&self, feed: &FeedId) -> Result<PriceReading, OracleError>;
}

/// Source of annualized volatility
#[async_trait]
pub trait VolatilityFeed: Send + Sync {
    async fn latest_volatility(&self, feed: &FeedId) -> Result<VolatilityReading, OracleError>;
}

/// Accept `reading` only if it is non-zero, not from the future and at most `max_age` old
pub fn ensure_fresh(
    feed: &FeedId,
    reading: &PriceReading,
    now: DateTime<Utc>,
    max_age: Duration,
) -> Result<Price, OracleError> {
    if reading.price.is_zero() {
        return Err(OracleError::ZeroPrice(feed.clone()));
    }
    if reading.timestamp > now {
        return Err(OracleError::FutureTimestamp {
            feed: feed.clone(),
            timestamp: reading.timestamp,
        });
    }
    let age = now - reading.timestamp;
    if age > max_age {
        return Err(OracleError::StalePrice {
            feed: feed.clone(),
            age_secs: age.num_seconds(),
            max_secs: max_age.num_seconds(),
        });
    }
    Ok(reading.price)
}
