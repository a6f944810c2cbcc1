//! Realized volatility feed
//!
//! Rolling window of price observations per feed; volatility is the annualized standard
//! deviation of log returns inside the window.

use super::{OracleError, VolatilityFeed, VolatilityReading};
use crate::allocation::SECONDS_PER_YEAR;
use crate::fixed::Price;
use crate::ids::FeedId;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

/// Estimator over price history, one window per feed
pub struct RealizedVolatility {
    window: Duration,
    series: RwLock<HashMap<FeedId, VecDeque<(DateTime<Utc>, Price)>>>,
}

impl RealizedVolatility {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            series: RwLock::new(HashMap::new()),
        }
    }

    /// Add an observation and evict those older than the window
    pub async fn record(&self, feed: &FeedId, timestamp: DateTime<Utc>, price: Price) {
        let mut series = self.series.write().await;
        let prices = series.entry(feed.clone()).or_default();
        prices.push_back((timestamp, price));

        let cutoff = timestamp - self.window;
        while let Some((ts, _)) = prices.front() {
            if *ts < cutoff {
                prices.pop_front();
            } else {
                break;
            }
        }
    }

    /// Annualized realized volatility, `None` until two usable observations exist
    pub async fn estimate(&self, feed: &FeedId) -> Option<Decimal> {
        let series = self.series.read().await;
        estimate(series.get(feed)?)
    }
}

fn estimate(prices: &VecDeque<(DateTime<Utc>, Price)>) -> Option<Decimal> {
    let returns: Vec<f64> = prices
        .iter()
        .zip(prices.iter().skip(1))
        .filter_map(|((_, prev), (_, curr))| {
            let prev = to_f64(*prev)?;
            let curr = to_f64(*curr)?;
            (prev > 0.0 && curr > 0.0).then(|| (curr / prev).ln())
        })
        .collect();
    if returns.is_empty() {
        return None;
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;

    // Annualize by the observed sampling interval
    let (first, _) = prices.front()?;
    let (last, _) = prices.back()?;
    let span = (*last - *first).num_milliseconds() as f64 / 1000.0;
    if span <= 0.0 {
        return None;
    }
    let intervals_per_year = SECONDS_PER_YEAR as f64 / (span / n);
    Decimal::try_from(variance.sqrt() * intervals_per_year.sqrt()).ok()
}

fn to_f64(price: Price) -> Option<f64> {
    f64::try_from(price.to_decimal().ok()?).ok()
}

#[async_trait]
impl VolatilityFeed for RealizedVolatility {
    async fn latest_volatility(&self, feed: &FeedId) -> Result<VolatilityReading, OracleError> {
        let series = self.series.read().await;
        let prices = series
            .get(feed)
            .ok_or_else(|| OracleError::FeedUnavailable(feed.clone()))?;
        let timestamp = prices
            .back()
            .map(|(ts, _)| *ts)
            .ok_or_else(|| OracleError::FeedUnavailable(feed.clone()))?;
        let volatility = estimate(prices).ok_or_else(|| OracleError::InvalidVolatility {
            feed: feed.clone(),
            reason: format!("{} observations in window", prices.len()),
        })?;
        Ok(VolatilityReading {
            volatility,
            timestamp,
        })
    }
}
