//! Keeper command implementation
//!
//! Runs against a freshly seeded sandbox. The deployment starts with no loans, so ticks
//! report nothing to exercise unless loans are opened with `--open`. Configured prices are
//! republished every interval to keep them inside the staleness window.

use crate::clock::SystemClock;
use crate::config::Config;
use crate::fixed::{StableAmount, TokenAmount};
use crate::ids::AssetId;
use crate::keeper::Keeper;
use crate::protocol::LoanRequest;
use crate::sandbox::Sandbox;
use anyhow::Context;
use clap::Args;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Args, Debug)]
pub struct KeeperArgs {
    /// Poll interval in seconds, overrides the configured value
    #[arg(long)]
    pub interval: Option<u64>,

    /// Loans to open on the first configured asset before the keeper starts
    #[arg(long, default_value = "0")]
    pub open: u32,
}

impl KeeperArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let sandbox = Sandbox::from_config(config, Arc::new(SystemClock)).await?;
        if self.open > 0 {
            self.open_loans(config, &sandbox).await?;
        }

        let interval = self.interval.unwrap_or(config.keeper.poll_interval_secs).max(1);
        let keeper = Keeper::new(sandbox.protocol.clone(), Duration::from_secs(interval));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let refresher = tokio::spawn(refresh_prices(
            sandbox.clone(),
            Duration::from_secs(interval),
            shutdown_rx.clone(),
        ));
        let handle = tokio::spawn(async move { keeper.run(shutdown_rx).await });

        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutdown requested");
        shutdown_tx.send(true)?;
        handle.await?;
        refresher.await?;
        Ok(())
    }

    /// Half-LTV loans of 100 tokens each, 90 days
    async fn open_loans(&self, config: &Config, sandbox: &Sandbox) -> anyhow::Result<()> {
        let asset = config.assets.first().context("No asset configured")?;
        let collateral = Decimal::ONE_HUNDRED;
        let ltv = Decimal::from(asset.ltv_bps) / Decimal::from(10_000u32);
        let amount = (asset.price * collateral * ltv / Decimal::TWO).floor();
        let request = LoanRequest {
            stock_token: AssetId::new(asset.token.clone()),
            collateral_amount: TokenAmount::from_decimal(collateral)?,
            loan_amount: StableAmount::from_decimal(amount)?,
            duration_secs: 90 * 86_400,
        };
        for _ in 0..self.open {
            let loan_id = sandbox
                .protocol
                .create_loan(&sandbox.borrower, request.clone())
                .await?;
            tracing::info!(loan_id, token = %request.stock_token, amount = %amount, "Loan opened");
        }
        Ok(())
    }
}

async fn refresh_prices(sandbox: Sandbox, every: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let refreshed = sandbox.refresh_prices().await;
                tracing::debug!(refreshed, "Sandbox prices republished");
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}
