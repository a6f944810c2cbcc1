//! CLI interface for stock-lend
//!
//! Provides subcommands for:
//! - `premium`: Price one unit of the embedded put
//! - `quote`: Preview a loan's economics against the sandbox deployment
//! - `demo`: Run a full loan lifecycle in the sandbox
//! - `keeper`: Run the exercise keeper against the sandbox until Ctrl-C
//! - `status`: Show protocol totals of a freshly seeded sandbox
//!
//! The sandbox is in memory and rebuilt from config on every command.
//! - `config`: Show configuration

mod demo;
mod keeper;
mod premium;
mod quote;

pub use demo::DemoArgs;
pub use keeper::KeeperArgs;
pub use premium::PremiumArgs;
pub use quote::QuoteArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "stock-lend")]
#[command(about = "Stock-collateralized stablecoin lending with put protection")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Price one unit of the embedded put
    Premium(PremiumArgs),
    /// Preview a loan without opening it
    Quote(QuoteArgs),
    /// Run a loan lifecycle in the sandbox
    Demo(DemoArgs),
    /// Run the exercise keeper
    Keeper(KeeperArgs),
    /// Show protocol totals of the seeded sandbox
    Status,
    /// Show configuration
    Config,
}
