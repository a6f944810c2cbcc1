//! In-memory deployment
//!
//! Wires the protocol to mock feeds and in-memory token balances seeded from config. Used
//! by the CLI and the integration tests. Nothing here persists: every command starts from
//! the configured seed, and prices stay fresh only while something republishes them.

use crate::clock::Clock;
use crate::config::Config;
use crate::fixed::{Bps, Price, StableAmount, TokenAmount};
use crate::ids::{AccountId, AssetId, FeedId};
use crate::oracle::{
    MockPriceFeed, OracleError, PriceOracle, RealizedVolatility, VolatilityFeed,
    VolatilityReading,
};
use crate::protocol::{AssetListing, Protocol};
use crate::token::InMemoryTokens;
use anyhow::Context;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

/// Volatility for the sandbox: realized history for opted-in feeds, fixed mock readings
/// for the rest
pub struct SandboxVolatility {
    fixed: Arc<MockPriceFeed>,
    realized: Arc<RealizedVolatility>,
    realized_feeds: HashSet<FeedId>,
}

#[async_trait]
impl VolatilityFeed for SandboxVolatility {
    async fn latest_volatility(&self, feed: &FeedId) -> Result<VolatilityReading, OracleError> {
        if self.realized_feeds.contains(feed) {
            self.realized.latest_volatility(feed).await
        } else {
            self.fixed.latest_volatility(feed).await
        }
    }
}

#[derive(Clone)]
pub struct Sandbox {
    pub protocol: Arc<Protocol>,
    pub feed: Arc<MockPriceFeed>,
    pub realized: Arc<RealizedVolatility>,
    pub tokens: Arc<InMemoryTokens>,
    pub borrower: AccountId,
    clock: Arc<dyn Clock>,
    feeds: Vec<FeedId>,
}

impl Sandbox {
    pub async fn from_config(config: &Config, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        config.validate()?;
        let settings = config.protocol_settings();
        let owner = settings.owner.clone();
        let treasury = settings.treasury.clone();
        let stablecoin = settings.stablecoin.clone();

        let feed = Arc::new(MockPriceFeed::new(clock.clone()));
        let window_days = i64::try_from(config.sandbox.volatility_window_days)?;
        let realized = Arc::new(RealizedVolatility::new(chrono::Duration::days(window_days)));
        let volatility = Arc::new(SandboxVolatility {
            fixed: feed.clone(),
            realized: realized.clone(),
            realized_feeds: config
                .assets
                .iter()
                .filter(|asset| asset.realized_volatility)
                .map(|asset| asset.feed())
                .collect(),
        });
        let tokens = Arc::new(InMemoryTokens::new());
        let protocol = Arc::new(Protocol::new(
            settings,
            feed.clone(),
            volatility,
            tokens.clone(),
            clock.clone(),
        ));

        let mut sandbox = Self {
            protocol: protocol.clone(),
            feed: feed.clone(),
            realized,
            tokens: tokens.clone(),
            borrower: AccountId::new(config.sandbox.borrower.clone()),
            clock,
            feeds: Vec::with_capacity(config.assets.len()),
        };

        for asset in &config.assets {
            let token = AssetId::new(asset.token.clone());
            let price_feed = asset.feed();
            let price = Price::from_decimal(asset.price)
                .with_context(|| format!("Invalid price for {}", asset.token))?;
            sandbox.publish_price(&price_feed, price).await;
            if let Some(volatility) = asset.volatility {
                feed.set_volatility(&price_feed, volatility).await;
            }
            let uses_feed = asset.volatility.is_some() || asset.realized_volatility;

            protocol
                .add_asset(
                    &owner,
                    AssetListing {
                        token: token.clone(),
                        price_feed: price_feed.clone(),
                        volatility_feed: uses_feed.then(|| price_feed.clone()),
                        ltv: Bps::new(asset.ltv_bps),
                        use_real_volatility: uses_feed,
                    },
                )
                .await?;
            sandbox.feeds.push(price_feed);

            let collateral = TokenAmount::from_units(config.sandbox.borrower_collateral)?;
            tokens.mint(&token, &sandbox.borrower, collateral.raw()).await?;
        }

        let liquidity = StableAmount::from_units(config.sandbox.treasury_liquidity)?;
        tokens.mint(&stablecoin, &treasury, liquidity.raw()).await?;
        let borrower_stable = StableAmount::from_units(config.sandbox.borrower_stable)?;
        tokens
            .mint(&stablecoin, &sandbox.borrower, borrower_stable.raw())
            .await?;

        let fund = StableAmount::from_units(config.sandbox.protection_fund)?;
        if !fund.is_zero() {
            tokens.mint(&stablecoin, &owner, fund.raw()).await?;
            protocol.deposit_protection_fund(&owner, fund).await?;
        }

        tracing::info!(
            assets = config.assets.len(),
            protection_fund = %fund,
            "Sandbox deployment ready"
        );
        Ok(sandbox)
    }

    /// Report `price` on `feed` as of now and add it to the realized volatility history
    pub async fn publish_price(&self, feed: &FeedId, price: Price) {
        self.feed.set_price(feed, price).await;
        self.realized.record(feed, self.clock.now(), price).await;
    }

    /// Republish the last price of every configured feed so it does not go stale.
    /// Returns the number of feeds refreshed.
    pub async fn refresh_prices(&self) -> usize {
        let mut refreshed = 0;
        for feed in &self.feeds {
            match self.feed.latest_price(feed).await {
                Ok(reading) => {
                    self.publish_price(feed, reading.price).await;
                    refreshed += 1;
                }
                Err(e) => tracing::warn!(feed = %feed, error = %e, "No price to refresh"),
            }
        }
        refreshed
    }
}
