//! Quote command implementation

use crate::clock::SystemClock;
use crate::config::{Config, MAX_DURATION_DAYS};
use crate::fixed::{StableAmount, TokenAmount};
use crate::ids::AssetId;
use crate::protocol::{LoanQuote, LoanRequest};
use crate::sandbox::Sandbox;
use clap::Args;
use rust_decimal::Decimal;
use std::sync::Arc;

#[derive(Args, Debug)]
pub struct QuoteArgs {
    /// Collateral token symbol
    #[arg(long)]
    pub token: String,

    /// Collateral in whole tokens
    #[arg(long)]
    pub collateral: Decimal,

    /// Loan amount in stablecoin
    #[arg(long)]
    pub amount: Decimal,

    /// Loan duration in days
    #[arg(
        long,
        default_value = "90",
        value_parser = clap::value_parser!(u64).range(1..=MAX_DURATION_DAYS)
    )]
    pub days: u64,

    /// Output format: json or table
    #[arg(long, default_value = "table")]
    pub format: String,
}

impl QuoteArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let sandbox = Sandbox::from_config(config, Arc::new(SystemClock)).await?;
        let request = LoanRequest {
            stock_token: AssetId::new(self.token.clone()),
            collateral_amount: TokenAmount::from_decimal(self.collateral)?,
            loan_amount: StableAmount::from_decimal(self.amount)?,
            duration_secs: self.days * 86_400,
        };
        let quote = sandbox.protocol.preview_loan(&request).await?;

        if self.format == "json" {
            println!("{}", serde_json::to_string_pretty(&quote)?);
        } else {
            print_quote(&request, &quote);
        }
        Ok(())
    }
}

pub(super) fn print_quote(request: &LoanRequest, quote: &LoanQuote) {
    let allocation = &quote.allocation;
    let apy = allocation
        .effective_apy(request.loan_amount, request.duration_secs)
        .map(|apy| format!("{}%", (apy * Decimal::ONE_HUNDRED).round_dp(3)))
        .unwrap_or_else(|| "n/a".to_string());

    println!("Loan quote: {} {}", request.collateral_amount, request.stock_token);
    println!("  Spot:             {}", quote.spot);
    println!("  Volatility:       {}", quote.volatility);
    println!("  Collateral value: {}", quote.collateral_value);
    println!("  Max borrow:       {}", quote.max_borrow);
    println!("  Loan:             {}", request.loan_amount);
    println!("  Base yield:       {}", allocation.base_yield);
    println!("  Premium yield:    {}", allocation.premium_yield);
    println!("  Protocol fee:     {}", allocation.protocol_fee);
    println!("  Target yield:     {}", allocation.target_yield);
    println!("  Put strike:       {}", allocation.optimal_strike);
    println!("  Put premium:      {}", allocation.actual_premium);
    println!("  Effective APY:    {}", apy);
    println!("  Repayment due:    {}", quote.repayment_due);
    println!("  Expires:          {}", quote.expiration);
}
