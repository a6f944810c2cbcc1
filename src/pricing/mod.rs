//! Put option pricing module
//!
//! Prices the embedded European put with Black-Scholes and searches for the strike whose
//! premium matches a budget

mod black_scholes;
mod optimizer;
mod types;

pub use black_scholes::BlackScholes;
pub use optimizer::{StrikeBounds, StrikeOptimizer, StrikeQuery, StrikeSearch};
pub use types::PricingError;

use rust_decimal::Decimal;

/// Parameters for pricing one unit of a European put
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PutParams {
    /// Current spot price
    pub spot: Decimal,
    /// Strike price
    pub strike: Decimal,
    /// Time to expiry in years
    pub time_to_expiry: Decimal,
    /// Annualized volatility
    pub volatility: Decimal,
    /// Continuously compounded risk-free rate
    pub risk_free_rate: Decimal,
}

/// Trait for put pricing model implementations
pub trait PutPricer: Send + Sync {
    /// Premium of one unit of underlying, in the currency of spot and strike
    fn put_premium(&self, params: &PutParams) -> Result<Decimal, PricingError>;
}
