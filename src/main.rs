use clap::Parser;
use std::sync::Arc;
use stock_lend::cli::{Cli, Commands};
use stock_lend::clock::SystemClock;
use stock_lend::config::Config;
use stock_lend::sandbox::Sandbox;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Could not load config from {}: {}", cli.config, e);
            eprintln!("Using default configuration");
            toml::from_str(include_str!("../config.toml.example"))?
        }
    };

    // Initialize telemetry
    stock_lend::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Premium(args) => {
            args.execute(&config)?;
        }
        Commands::Quote(args) => {
            args.execute(&config).await?;
        }
        Commands::Demo(args) => {
            tracing::info!("Starting sandbox demo");
            args.execute(&config).await?;
        }
        Commands::Keeper(args) => {
            tracing::info!("Starting exercise keeper");
            args.execute(&config).await?;
        }
        Commands::Status => {
            let sandbox = Sandbox::from_config(&config, Arc::new(SystemClock)).await?;
            let stats = sandbox.protocol.protocol_stats().await;
            println!("stock-lend status (sandbox seed)");
            println!("  Assets: {}", config.assets.len());
            println!("  Protection fund: {}", stats.total_protection_fund);
            println!("  Protocol fees: {}", stats.total_protocol_fees);
            println!("  Active loans: {}", stats.active_loans);
            println!("  Base yield rate: {}", stats.base_yield_rate);
        }
        Commands::Config => {
            println!("Current configuration:");
            println!(
                "  Yield: base={}, enhancement={}, fee={}",
                config.protocol.base_yield_rate,
                config.protocol.enhancement_fraction,
                config.protocol.fee_fraction
            );
            println!(
                "  Hedge: coverage={}, budget={}, rate={}",
                config.protocol.hedge_coverage,
                config.protocol.prime_budget_fraction,
                config.protocol.risk_free_rate
            );
            println!(
                "  Duration: {}-{} days, MaxLTV={}bps",
                config.protocol.min_duration_days,
                config.protocol.max_duration_days,
                config.protocol.max_ltv_bps
            );
            println!(
                "  Keeper: every {}s, batch {}",
                config.keeper.poll_interval_secs, config.keeper.batch_size
            );
            for asset in &config.assets {
                println!(
                    "  Asset: {} @ {} via {}, LTV={}bps",
                    asset.token,
                    asset.price,
                    asset.feed(),
                    asset.ltv_bps
                );
            }
        }
    }

    Ok(())
}
