//! Premium command implementation

use crate::allocation::year_fraction;
use crate::config::{Config, MAX_DURATION_DAYS};
use crate::pricing::{BlackScholes, PutParams, PutPricer};
use clap::Args;
use rust_decimal::Decimal;

#[derive(Args, Debug)]
pub struct PremiumArgs {
    /// Spot price
    #[arg(long)]
    pub spot: Decimal,

    /// Strike price
    #[arg(long)]
    pub strike: Decimal,

    /// Time to expiry in days
    #[arg(
        long,
        default_value = "90",
        value_parser = clap::value_parser!(u64).range(0..=MAX_DURATION_DAYS)
    )]
    pub days: u64,

    /// Annualized volatility, defaults to the configured fallback
    #[arg(long)]
    pub volatility: Option<Decimal>,
}

impl PremiumArgs {
    pub fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let params = PutParams {
            spot: self.spot,
            strike: self.strike,
            time_to_expiry: year_fraction(self.days * 86_400),
            volatility: self
                .volatility
                .unwrap_or(config.protocol.default_volatility),
            risk_free_rate: config.protocol.risk_free_rate,
        };
        let premium = BlackScholes::new().put_premium(&params)?;

        println!("Put premium (per unit)");
        println!("  Spot:       {}", params.spot);
        println!("  Strike:     {}", params.strike);
        println!("  Days:       {}", self.days);
        println!("  Volatility: {}", params.volatility);
        println!("  Rate:       {}", params.risk_free_rate);
        println!("  Premium:    {}", premium.round_dp(6));
        Ok(())
    }
}
