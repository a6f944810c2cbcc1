//! Demo command implementation

use super::quote::print_quote;
use crate::clock::ManualClock;
use crate::config::{Config, MAX_DURATION_DAYS};
use crate::fixed::{Price, StableAmount, TokenAmount};
use crate::ids::AssetId;
use crate::keeper::Keeper;
use crate::protocol::LoanRequest;
use crate::sandbox::Sandbox;
use anyhow::Context;
use chrono::{Duration, Utc};
use clap::Args;
use rust_decimal::Decimal;
use std::sync::Arc;

#[derive(Args, Debug)]
pub struct DemoArgs {
    /// Collateral token, defaults to the first configured asset
    #[arg(long)]
    pub token: Option<String>,

    /// Collateral per loan in whole tokens
    #[arg(long, default_value = "100")]
    pub collateral: Decimal,

    /// Loan amount in stablecoin
    #[arg(long, default_value = "12000")]
    pub amount: Decimal,

    /// Loan duration in days
    #[arg(
        long,
        default_value = "90",
        value_parser = clap::value_parser!(u64).range(1..=MAX_DURATION_DAYS)
    )]
    pub days: u64,

    /// Price drop applied before the keeper pass, in percent
    #[arg(long, default_value = "20")]
    pub crash_pct: Decimal,

    /// Print the event log as JSON
    #[arg(long)]
    pub events: bool,
}

impl DemoArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let asset = match &self.token {
            Some(token) => config.assets.iter().find(|a| &a.token == token),
            None => config.assets.first(),
        }
        .context("No matching asset configured")?;

        let clock = Arc::new(ManualClock::new(Utc::now()));
        let sandbox = Sandbox::from_config(config, clock.clone()).await?;
        let protocol = sandbox.protocol.clone();

        let request = LoanRequest {
            stock_token: AssetId::new(asset.token.clone()),
            collateral_amount: TokenAmount::from_decimal(self.collateral)?,
            loan_amount: StableAmount::from_decimal(self.amount)?,
            duration_secs: self.days * 86_400,
        };
        print_quote(&request, &protocol.preview_loan(&request).await?);

        let repaid = protocol.create_loan(&sandbox.borrower, request.clone()).await?;
        let hedged = protocol.create_loan(&sandbox.borrower, request).await?;
        println!();
        println!("Opened loans {} and {}", repaid, hedged);

        clock.advance(Duration::days(30));
        let total = protocol.repay_loan(&sandbox.borrower, repaid).await?;
        println!("Repaid loan {} for {}", repaid, total);

        let shocked = asset.price * (Decimal::ONE - self.crash_pct / Decimal::ONE_HUNDRED);
        let price = Price::from_decimal(shocked.max(Decimal::ZERO))?;
        sandbox.publish_price(&asset.feed(), price).await;
        println!("{} drops {}% to {}", asset.token, self.crash_pct, price);

        let keeper = Keeper::new(protocol.clone(), std::time::Duration::from_secs(1));
        let report = keeper.tick().await;
        if report.settled.is_empty() {
            println!("Keeper found nothing to exercise");
        }
        for settlement in &report.settled {
            println!(
                "Exercised loan {}: strike {}, price {}, paid {} of {}",
                settlement.loan_id,
                settlement.put_strike,
                settlement.current_price,
                settlement.payout.paid,
                settlement.payout.requested
            );
        }

        let stats = protocol.protocol_stats().await;
        println!();
        println!("Protocol totals");
        println!("  Protection fund:  {}", stats.total_protection_fund);
        println!("  Protection paid:  {}", stats.total_protection_paid);
        println!("  Protocol fees:    {}", stats.total_protocol_fees);
        println!("  Active loans:     {}", stats.active_loans);
        println!("  Total loans:      {}", stats.total_loans);

        if self.events {
            println!();
            println!("{}", serde_json::to_string_pretty(&protocol.events().await)?);
        }
        Ok(())
    }
}
