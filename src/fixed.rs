//! Fixed-point amounts
//!
//! Price feeds report at 1e8, collateral tokens carry 18 decimals and the stablecoin 6.
//! Each scale is its own type; moving between them goes through an explicit conversion.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Decimals of oracle prices
pub const PRICE_DECIMALS: u32 = 8;
/// Decimals of collateral token amounts
pub const TOKEN_DECIMALS: u32 = 18;
/// Decimals of stablecoin amounts
pub const STABLE_DECIMALS: u32 = 6;

/// Fixed-point conversion and arithmetic errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FixedError {
    /// Result does not fit in the raw representation
    #[error("Arithmetic overflow")]
    Overflow,
    /// Subtraction below zero
    #[error("Arithmetic underflow")]
    Underflow,
    /// Decimal value cannot be stored at the target scale
    #[error("Value {value} is not representable with {decimals} decimals")]
    Unrepresentable { value: Decimal, decimals: u32 },
}

/// floor(a * b / denom) without overflowing on the intermediate product
pub fn mul_div(a: u128, b: u128, denom: u128) -> Option<u128> {
    if denom == 0 {
        return None;
    }
    let whole = a.checked_mul(b / denom)?;
    let frac = a.checked_mul(b % denom)? / denom;
    whole.checked_add(frac)
}

macro_rules! fixed_amount {
    ($(#[$meta:meta])* $name:ident, $decimals:expr) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(u128);

        impl $name {
            /// Number of decimals in the raw representation
            pub const DECIMALS: u32 = $decimals;
            /// Raw value of one whole unit
            pub const SCALE: u128 = 10u128.pow($decimals);
            pub const ZERO: Self = Self(0);

            pub const fn from_raw(raw: u128) -> Self {
                Self(raw)
            }

            pub const fn raw(self) -> u128 {
                self.0
            }

            /// Whole units, e.g. `from_units(200)` is 200.0
            pub fn from_units(units: u64) -> Result<Self, FixedError> {
                (units as u128)
                    .checked_mul(Self::SCALE)
                    .map(Self)
                    .ok_or(FixedError::Overflow)
            }

            /// Floors `value` to this scale; negative values are rejected
            pub fn from_decimal(value: Decimal) -> Result<Self, FixedError> {
                let unrepresentable = || FixedError::Unrepresentable {
                    value,
                    decimals: Self::DECIMALS,
                };
                if value.is_sign_negative() && !value.is_zero() {
                    return Err(unrepresentable());
                }
                let scaled = value
                    .checked_mul(Decimal::from(10u64.pow($decimals)))
                    .ok_or_else(unrepresentable)?
                    .floor();
                scaled.to_u128().map(Self).ok_or_else(unrepresentable)
            }

            pub fn to_decimal(self) -> Result<Decimal, FixedError> {
                let raw = i128::try_from(self.0).map_err(|_| FixedError::Overflow)?;
                Decimal::try_from_i128_with_scale(raw, Self::DECIMALS)
                    .map(|d| d.normalize())
                    .map_err(|_| FixedError::Overflow)
            }

            pub fn is_zero(self) -> bool {
                self.0 == 0
            }

            pub fn checked_add(self, other: Self) -> Result<Self, FixedError> {
                self.0
                    .checked_add(other.0)
                    .map(Self)
                    .ok_or(FixedError::Overflow)
            }

            pub fn checked_sub(self, other: Self) -> Result<Self, FixedError> {
                self.0
                    .checked_sub(other.0)
                    .map(Self)
                    .ok_or(FixedError::Underflow)
            }

            pub fn saturating_sub(self, other: Self) -> Self {
                Self(self.0.saturating_sub(other.0))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self.to_decimal() {
                    Ok(d) => write!(f, "{}", d),
                    Err(_) => write!(f, "{}e-{}", self.0, Self::DECIMALS),
                }
            }
        }
    };
}

fixed_amount!(
    /// Oracle price in USD, 8 decimals
    Price,
    PRICE_DECIMALS
);

fixed_amount!(
    /// Collateral token quantity, 18 decimals
    TokenAmount,
    TOKEN_DECIMALS
);

fixed_amount!(
    /// Stablecoin amount, 6 decimals
    StableAmount,
    STABLE_DECIMALS
);

impl Price {
    /// Stablecoin value of `quantity` tokens at this price, floored
    pub fn value_of(self, quantity: TokenAmount) -> Result<StableAmount, FixedError> {
        let denom = 10u128.pow(PRICE_DECIMALS + TOKEN_DECIMALS - STABLE_DECIMALS);
        mul_div(self.0, quantity.0, denom)
            .map(StableAmount)
            .ok_or(FixedError::Overflow)
    }
}

/// Basis points, 10_000 = 100%
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bps(u32);

impl Bps {
    pub const MAX: Bps = Bps(10_000);

    pub const fn new(bps: u32) -> Self {
        Self(bps)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    /// `amount * bps / 10_000`, floored
    pub fn of(self, amount: StableAmount) -> Result<StableAmount, FixedError> {
        mul_div(amount.raw(), self.0 as u128, Self::MAX.0 as u128)
            .map(StableAmount::from_raw)
            .ok_or(FixedError::Overflow)
    }

    pub fn to_fraction(self) -> Decimal {
        Decimal::from(self.0) / Decimal::from(Self::MAX.0)
    }
}

impl fmt::Display for Bps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}bps", self.0)
    }
}
