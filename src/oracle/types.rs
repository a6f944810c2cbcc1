//! Oracle types

use crate::fixed::Price;
use crate::ids::FeedId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Latest price reported by a feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceReading {
    pub price: Price,
    /// When the feed last updated
    pub timestamp: DateTime<Utc>,
}

/// Latest annualized volatility reported by a feed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolatilityReading {
    pub volatility: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Oracle errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OracleError {
    /// Feed has never reported or is unknown
    #[error("Feed unavailable: {0}")]
    FeedUnavailable(FeedId),
    /// Reported price is zero
    #[error("Zero price from feed {0}")]
    ZeroPrice(FeedId),
    /// Last update older than the staleness bound
    #[error("Stale price from feed {feed}: {age_secs}s old, max {max_secs}s")]
    StalePrice {
        feed: FeedId,
        age_secs: i64,
        max_secs: i64,
    },
    /// Update timestamp ahead of the local clock
    #[error("Feed {feed} timestamp {timestamp} is in the future")]
    FutureTimestamp {
        feed: FeedId,
        timestamp: DateTime<Utc>,
    },
    /// Volatility negative or not computable
    #[error("Invalid volatility from feed {feed}: {reason}")]
    InvalidVolatility { feed: FeedId, reason: String },
}
