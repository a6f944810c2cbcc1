//! Allocation types

use crate::fixed::{Bps, FixedError, Price, StableAmount};
use crate::pricing::{PricingError, StrikeSearch};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

/// Allocation errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AllocationError {
    /// Loan duration outside the allowed range
    #[error("Duration {duration_secs}s outside [{min_secs}s, {max_secs}s]")]
    DurationOutOfRange {
        duration_secs: u64,
        min_secs: u64,
        max_secs: u64,
    },
    /// Loan is larger than the asset's LTV allows against collateral value
    #[error("Loan {loan_amount} exceeds {ltv} of collateral value {collateral_value}")]
    LtvExceeded {
        loan_amount: StableAmount,
        collateral_value: StableAmount,
        ltv: Bps,
    },
    /// Loan amount or spot is zero
    #[error("Zero amount")]
    ZeroAmount,
    #[error(transparent)]
    Pricing(#[from] PricingError),
    #[error(transparent)]
    Fixed(#[from] FixedError),
}

/// Inputs for one loan's economics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoanTerms {
    pub loan_amount: StableAmount,
    pub duration_secs: u64,
    /// Spot at creation
    pub spot: Price,
    /// Annualized volatility used for pricing
    pub volatility: Decimal,
    /// Stablecoin value of the posted collateral at spot
    pub collateral_value: StableAmount,
    /// Maximum loan-to-value of the collateral asset
    pub ltv: Bps,
}

/// Split of one loan's yield budget
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Allocation {
    /// Capital available to finance the hedge
    pub budget_prime: StableAmount,
    /// Base lender yield over the loan duration
    pub base_yield: StableAmount,
    /// Enhancement financing the put premium
    pub premium_yield: StableAmount,
    /// base_yield + premium_yield, owed at maturity
    pub target_yield: StableAmount,
    pub protocol_fee: StableAmount,
    pub optimal_strike: Price,
    /// Units of collateral the put covers
    pub protected_units: Decimal,
    /// Premium per protected unit at `optimal_strike`
    pub unit_premium: Decimal,
    /// Premium of the whole put, unit_premium * protected_units
    pub actual_premium: StableAmount,
    /// Relative difference between actual and target premium
    pub premium_residual: Decimal,
    pub search_iterations: u32,
    pub converged: bool,
}

impl Allocation {
    /// Lender yield annualized over `duration_secs`
    pub fn effective_apy(&self, loan_amount: StableAmount, duration_secs: u64) -> Option<Decimal> {
        let loan = loan_amount.to_decimal().ok()?;
        let target = self.target_yield.to_decimal().ok()?;
        if loan.is_zero() || duration_secs == 0 {
            return None;
        }
        Some(target / loan / super::year_fraction(duration_secs))
    }

    pub(super) fn from_search(
        parts: YieldParts,
        search: StrikeSearch,
        protected_units: Decimal,
        actual_premium: StableAmount,
        target_premium: Decimal,
    ) -> Self {
        let residual = if target_premium.is_zero() {
            Decimal::ZERO
        } else {
            search.residual / target_premium
        };
        Self {
            budget_prime: parts.budget_prime,
            base_yield: parts.base_yield,
            premium_yield: parts.premium_yield,
            target_yield: parts.target_yield,
            protocol_fee: parts.protocol_fee,
            optimal_strike: search.strike,
            protected_units,
            unit_premium: search.premium,
            actual_premium,
            premium_residual: residual,
            search_iterations: search.iterations,
            converged: search.converged,
        }
    }
}

/// Yield amounts before the strike search
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) struct YieldParts {
    pub budget_prime: StableAmount,
    pub base_yield: StableAmount,
    pub premium_yield: StableAmount,
    pub target_yield: StableAmount,
    pub protocol_fee: StableAmount,
}
