//! stock-lend: Stock-collateralized stablecoin lending with embedded put protection
//!
//! This library provides the core components for:
//! - Black-Scholes put pricing and premium-matched strike search
//! - Yield allocation between lender yield, hedge premium and protocol fee
//! - Loan ledger and protection fund accounting
//! - Collateral and stablecoin settlement with rollback
//! - Check/perform put exercise driven by a keeper
//! - Price and volatility oracles with staleness checks
//! - Full observability stack

pub mod allocation;
pub mod cli;
pub mod clock;
pub mod config;
pub mod fixed;
pub mod fund;
pub mod ids;
pub mod keeper;
pub mod ledger;
pub mod oracle;
pub mod pricing;
pub mod protocol;
pub mod sandbox;
pub mod store;
pub mod telemetry;
pub mod token;
