//! Pricing types

use rust_decimal::Decimal;
use thiserror::Error;

/// Pricing errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PricingError {
    /// Spot or strike not positive, negative time or volatility
    #[error("Invalid pricing input: {0}")]
    InvalidPricingInput(&'static str),
    /// Strike search range is empty or not below spot
    #[error("Invalid strike bounds [{min}, {max}] for spot {spot}")]
    InvalidBounds {
        min: Decimal,
        max: Decimal,
        spot: Decimal,
    },
    /// Model produced a value outside the decimal range
    #[error("Premium not representable: {0}")]
    NonFinite(f64),
}
