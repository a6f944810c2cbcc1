//! Configuration types for stock-lend

use crate::allocation::YieldPolicy;
use crate::fixed::Bps;
use crate::ids::{AccountId, AssetId, FeedId};
use crate::protocol::ProtocolSettings;
use crate::telemetry::LogFormat;
use rust_decimal::Decimal;
use serde::Deserialize;

const SECONDS_PER_DAY: u64 = 86_400;

/// Longest duration accepted anywhere, in days
pub const MAX_DURATION_DAYS: u64 = 36_500;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub keeper: KeeperConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub assets: Vec<AssetConfig>,
}

/// Protocol accounts and product constants
#[derive(Debug, Clone, Deserialize)]
pub struct ProtocolConfig {
    #[serde(default = "default_owner")]
    pub owner: String,
    #[serde(default = "default_treasury")]
    pub treasury: String,
    #[serde(default = "default_vault")]
    pub vault: String,
    #[serde(default = "default_stablecoin")]
    pub stablecoin: String,

    /// Base lender APR
    #[serde(default = "default_base_yield_rate")]
    pub base_yield_rate: Decimal,
    /// Share of the loan available to finance the hedge
    #[serde(default = "default_prime_budget_fraction")]
    pub prime_budget_fraction: Decimal,
    /// Premium yield as a share of base yield
    #[serde(default = "default_enhancement_fraction")]
    pub enhancement_fraction: Decimal,
    #[serde(default = "default_fee_fraction")]
    pub fee_fraction: Decimal,
    /// Put notional as a share of the loan amount
    #[serde(default = "default_hedge_coverage")]
    pub hedge_coverage: Decimal,
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: Decimal,
    #[serde(default = "default_volatility")]
    pub default_volatility: Decimal,

    /// Upper bound on any asset's LTV, in basis points
    #[serde(default = "default_max_ltv_bps")]
    pub max_ltv_bps: u32,
    #[serde(default = "default_min_duration_days")]
    pub min_duration_days: u64,
    #[serde(default = "default_max_duration_days")]
    pub max_duration_days: u64,

    /// Closest the strike may sit below spot
    #[serde(default = "default_min_strike_discount")]
    pub min_strike_discount: Decimal,
    /// Furthest the strike may sit below spot
    #[serde(default = "default_max_strike_discount")]
    pub max_strike_discount: Decimal,
    #[serde(default = "default_optimizer_max_iterations")]
    pub optimizer_max_iterations: u32,
    /// Relative to the premium target
    #[serde(default = "default_optimizer_tolerance")]
    pub optimizer_tolerance: Decimal,

    /// Oracle prices older than this are rejected
    #[serde(default = "default_max_price_age_secs")]
    pub max_price_age_secs: u64,
}

fn default_owner() -> String {
    "owner".to_string()
}
fn default_treasury() -> String {
    "treasury".to_string()
}
fn default_vault() -> String {
    "vault".to_string()
}
fn default_stablecoin() -> String {
    "USDC".to_string()
}
fn default_base_yield_rate() -> Decimal {
    Decimal::new(375, 4) // 3.75%
}
fn default_prime_budget_fraction() -> Decimal {
    Decimal::new(85, 2)
}
fn default_enhancement_fraction() -> Decimal {
    Decimal::new(677, 3)
}
fn default_fee_fraction() -> Decimal {
    Decimal::new(25, 4) // 0.25%
}
fn default_hedge_coverage() -> Decimal {
    Decimal::new(25, 2)
}
fn default_risk_free_rate() -> Decimal {
    Decimal::new(5, 2)
}
fn default_volatility() -> Decimal {
    Decimal::new(30, 2)
}
fn default_max_ltv_bps() -> u32 {
    8000
}
fn default_min_duration_days() -> u64 {
    7
}
fn default_max_duration_days() -> u64 {
    365
}
fn default_min_strike_discount() -> Decimal {
    Decimal::new(1, 2)
}
fn default_max_strike_discount() -> Decimal {
    Decimal::new(30, 2)
}
fn default_optimizer_max_iterations() -> u32 {
    40
}
fn default_optimizer_tolerance() -> Decimal {
    Decimal::new(1, 3) // 0.1%
}
fn default_max_price_age_secs() -> u64 {
    3600
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            owner: default_owner(),
            treasury: default_treasury(),
            vault: default_vault(),
            stablecoin: default_stablecoin(),
            base_yield_rate: default_base_yield_rate(),
            prime_budget_fraction: default_prime_budget_fraction(),
            enhancement_fraction: default_enhancement_fraction(),
            fee_fraction: default_fee_fraction(),
            hedge_coverage: default_hedge_coverage(),
            risk_free_rate: default_risk_free_rate(),
            default_volatility: default_volatility(),
            max_ltv_bps: default_max_ltv_bps(),
            min_duration_days: default_min_duration_days(),
            max_duration_days: default_max_duration_days(),
            min_strike_discount: default_min_strike_discount(),
            max_strike_discount: default_max_strike_discount(),
            optimizer_max_iterations: default_optimizer_max_iterations(),
            optimizer_tolerance: default_optimizer_tolerance(),
            max_price_age_secs: default_max_price_age_secs(),
        }
    }
}

impl ProtocolConfig {
    pub fn yield_policy(&self) -> YieldPolicy {
        YieldPolicy {
            base_yield_rate: self.base_yield_rate,
            prime_budget_fraction: self.prime_budget_fraction,
            enhancement_fraction: self.enhancement_fraction,
            fee_fraction: self.fee_fraction,
            hedge_coverage: self.hedge_coverage,
            risk_free_rate: self.risk_free_rate,
            min_duration_secs: self.min_duration_days.saturating_mul(SECONDS_PER_DAY),
            max_duration_secs: self.max_duration_days.saturating_mul(SECONDS_PER_DAY),
            min_strike_discount: self.min_strike_discount,
            max_strike_discount: self.max_strike_discount,
            max_iterations: self.optimizer_max_iterations,
            tolerance: self.optimizer_tolerance,
        }
    }
}

/// Exercise keeper configuration
#[derive(Debug, Clone, Deserialize)]
pub struct KeeperConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Most loans reported by one check
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_poll_interval_secs() -> u64 {
    30
}
fn default_batch_size() -> usize {
    50
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            batch_size: default_batch_size(),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Prometheus scrape port; no exporter when unset
    pub metrics_port: Option<u16>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            metrics_port: None,
            log_level: default_log_level(),
            log_format: LogFormat::Pretty,
        }
    }
}

/// Balances seeded into the in-memory deployment
#[derive(Debug, Clone, Deserialize)]
pub struct SandboxConfig {
    #[serde(default = "default_borrower")]
    pub borrower: String,
    /// Stablecoin the treasury can lend
    #[serde(default = "default_treasury_liquidity")]
    pub treasury_liquidity: u64,
    /// Initial protection fund deposit
    #[serde(default = "default_protection_fund")]
    pub protection_fund: u64,
    /// Stablecoin held by the borrower for repayments
    #[serde(default = "default_borrower_stable")]
    pub borrower_stable: u64,
    /// Units of each listed stock held by the borrower
    #[serde(default = "default_borrower_collateral")]
    pub borrower_collateral: u64,
    /// Lookback of the realized volatility estimator
    #[serde(default = "default_volatility_window_days")]
    pub volatility_window_days: u64,
}

fn default_borrower() -> String {
    "borrower".to_string()
}
fn default_treasury_liquidity() -> u64 {
    1_000_000
}
fn default_protection_fund() -> u64 {
    50_000
}
fn default_borrower_stable() -> u64 {
    100_000
}
fn default_borrower_collateral() -> u64 {
    1_000
}
fn default_volatility_window_days() -> u64 {
    30
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            borrower: default_borrower(),
            treasury_liquidity: default_treasury_liquidity(),
            protection_fund: default_protection_fund(),
            borrower_stable: default_borrower_stable(),
            borrower_collateral: default_borrower_collateral(),
            volatility_window_days: default_volatility_window_days(),
        }
    }
}

/// Collateral asset listed at startup
#[derive(Debug, Clone, Deserialize)]
pub struct AssetConfig {
    pub token: String,
    /// Defaults to "<token>/USD"
    pub price_feed: Option<String>,
    /// Initial spot in USD
    pub price: Decimal,
    pub ltv_bps: u32,
    /// When set, the asset prices with this feed volatility instead of the default
    pub volatility: Option<Decimal>,
    /// Price with volatility realized over the published price history
    #[serde(default)]
    pub realized_volatility: bool,
}

impl AssetConfig {
    pub fn feed(&self) -> FeedId {
        match &self.price_feed {
            Some(feed) => FeedId::new(feed.clone()),
            None => FeedId::new(format!("{}/USD", self.token)),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the protocol cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        let p = &self.protocol;
        anyhow::ensure!(
            p.max_ltv_bps > 0 && p.max_ltv_bps <= Bps::MAX.get(),
            "max_ltv_bps must be in 1..=10000"
        );
        anyhow::ensure!(
            p.min_duration_days <= p.max_duration_days,
            "min_duration_days exceeds max_duration_days"
        );
        anyhow::ensure!(
            p.max_duration_days <= MAX_DURATION_DAYS,
            "max_duration_days must be at most {}",
            MAX_DURATION_DAYS
        );
        anyhow::ensure!(
            p.min_strike_discount >= Decimal::ZERO
                && p.min_strike_discount <= p.max_strike_discount
                && p.max_strike_discount < Decimal::ONE,
            "strike discounts must satisfy 0 <= min <= max < 1"
        );
        anyhow::ensure!(
            p.default_volatility > Decimal::ZERO,
            "default_volatility must be positive"
        );
        anyhow::ensure!(
            p.hedge_coverage > Decimal::ZERO,
            "hedge_coverage must be positive"
        );
        anyhow::ensure!(self.keeper.batch_size > 0, "keeper batch_size must be positive");
        anyhow::ensure!(
            (1..=MAX_DURATION_DAYS).contains(&self.sandbox.volatility_window_days),
            "sandbox volatility_window_days must be in 1..={}",
            MAX_DURATION_DAYS
        );
        for asset in &self.assets {
            anyhow::ensure!(
                !(asset.realized_volatility && asset.volatility.is_some()),
                "asset {} sets both volatility and realized_volatility",
                asset.token
            );
            anyhow::ensure!(
                asset.ltv_bps > 0 && asset.ltv_bps <= p.max_ltv_bps,
                "asset {} ltv_bps {} outside 1..={}",
                asset.token,
                asset.ltv_bps,
                p.max_ltv_bps
            );
        }
        Ok(())
    }

    pub fn protocol_settings(&self) -> ProtocolSettings {
        let p = &self.protocol;
        ProtocolSettings {
            owner: AccountId::new(p.owner.clone()),
            treasury: AccountId::new(p.treasury.clone()),
            vault: AccountId::new(p.vault.clone()),
            stablecoin: AssetId::new(p.stablecoin.clone()),
            default_volatility: p.default_volatility,
            max_ltv: Bps::new(p.max_ltv_bps),
            max_price_age: chrono::Duration::seconds(
                i64::try_from(p.max_price_age_secs)
                    .unwrap_or(i64::MAX)
                    .min(i64::MAX / 1000),
            ),
            exercise_batch_size: self.keeper.batch_size,
            policy: p.yield_policy(),
        }
    }
}
