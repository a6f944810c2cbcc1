//! Yield allocation module
//!
//! Splits a loan's yield budget into base lender yield, the premium enhancement that
//! finances the embedded put, and the protocol fee, then sizes the put strike to the
//! premium budget.

mod types;

pub use types::{Allocation, AllocationError, LoanTerms};

use crate::fixed::{Bps, StableAmount};
use crate::pricing::{BlackScholes, PutPricer, StrikeBounds, StrikeOptimizer, StrikeQuery};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use types::YieldParts;

/// 365-day year used for all annualization
pub const SECONDS_PER_YEAR: u64 = 31_536_000;

const SECONDS_PER_DAY: u64 = 86_400;

/// Product constants driving the allocation
#[derive(Debug, Clone, PartialEq)]
pub struct YieldPolicy {
    /// Base lender APR
    pub base_yield_rate: Decimal,
    /// Share of the loan available to finance the hedge
    pub prime_budget_fraction: Decimal,
    /// Premium yield as a share of base yield
    pub enhancement_fraction: Decimal,
    /// Protocol fee as a share of the loan
    pub fee_fraction: Decimal,
    /// Notional covered by the put as a share of the loan
    pub hedge_coverage: Decimal,
    pub risk_free_rate: Decimal,
    pub min_duration_secs: u64,
    pub max_duration_secs: u64,
    /// Closest the strike may sit below spot
    pub min_strike_discount: Decimal,
    /// Furthest the strike may sit below spot
    pub max_strike_discount: Decimal,
    pub max_iterations: u32,
    /// Search tolerance relative to the premium target
    pub tolerance: Decimal,
}

impl Default for YieldPolicy {
    fn default() -> Self {
        Self {
            base_yield_rate: dec!(0.0375),
            prime_budget_fraction: dec!(0.85),
            enhancement_fraction: dec!(0.677),
            fee_fraction: dec!(0.0025),
            hedge_coverage: dec!(0.25),
            risk_free_rate: dec!(0.05),
            min_duration_secs: 7 * SECONDS_PER_DAY,
            max_duration_secs: 365 * SECONDS_PER_DAY,
            min_strike_discount: dec!(0.01),
            max_strike_discount: dec!(0.30),
            max_iterations: 40,
            tolerance: dec!(0.001),
        }
    }
}

/// Loan economics calculator
#[derive(Debug, Clone)]
pub struct YieldAllocator<P = BlackScholes> {
    policy: YieldPolicy,
    optimizer: StrikeOptimizer<P>,
}

impl YieldAllocator<BlackScholes> {
    pub fn new(policy: YieldPolicy) -> Self {
        Self::with_pricer(policy, BlackScholes::new())
    }
}

impl<P: PutPricer> YieldAllocator<P> {
    pub fn with_pricer(policy: YieldPolicy, pricer: P) -> Self {
        let optimizer = StrikeOptimizer::new(pricer, policy.max_iterations, policy.tolerance);
        Self { policy, optimizer }
    }

    pub fn policy(&self) -> &YieldPolicy {
        &self.policy
    }

    pub fn pricer(&self) -> &P {
        self.optimizer.pricer()
    }

    /// Full allocation for one loan, including the strike search
    pub fn allocate(&self, terms: &LoanTerms) -> Result<Allocation, AllocationError> {
        self.check_duration(terms.duration_secs)?;
        if terms.loan_amount.is_zero() || terms.spot.is_zero() {
            return Err(AllocationError::ZeroAmount);
        }
        check_ltv(terms.loan_amount, terms.collateral_value, terms.ltv)?;

        let loan = terms.loan_amount.to_decimal()?;
        let fraction = year_fraction(terms.duration_secs);
        let base = loan * self.policy.base_yield_rate * fraction;
        let premium = base * self.policy.enhancement_fraction;
        let parts = self.yield_parts(loan, base, premium)?;

        let spot = terms.spot.to_decimal()?;
        let protected_units = loan * self.policy.hedge_coverage / spot;
        if protected_units.is_zero() {
            return Err(AllocationError::ZeroAmount);
        }

        let query = StrikeQuery {
            spot: terms.spot,
            time_to_expiry: fraction,
            volatility: terms.volatility,
            risk_free_rate: self.policy.risk_free_rate,
            target_premium: premium / protected_units,
        };
        let bounds = StrikeBounds::below_spot(
            terms.spot,
            self.policy.min_strike_discount,
            self.policy.max_strike_discount,
        )?;
        let search = self.optimizer.find_strike(&query, bounds)?;
        let actual_premium = StableAmount::from_decimal(search.premium * protected_units)?;

        let allocation = Allocation::from_search(
            parts,
            search,
            protected_units,
            actual_premium,
            query.target_premium,
        );

        tracing::debug!(
            loan_amount = %terms.loan_amount,
            base_yield = %allocation.base_yield,
            premium_yield = %allocation.premium_yield,
            strike = %allocation.optimal_strike,
            actual_premium = %allocation.actual_premium,
            converged = allocation.converged,
            "Yield allocated"
        );
        Ok(allocation)
    }

    fn check_duration(&self, duration_secs: u64) -> Result<(), AllocationError> {
        if duration_secs < self.policy.min_duration_secs
            || duration_secs > self.policy.max_duration_secs
        {
            return Err(AllocationError::DurationOutOfRange {
                duration_secs,
                min_secs: self.policy.min_duration_secs,
                max_secs: self.policy.max_duration_secs,
            });
        }
        Ok(())
    }

    fn yield_parts(
        &self,
        loan: Decimal,
        base: Decimal,
        premium: Decimal,
    ) -> Result<YieldParts, AllocationError> {
        let base_yield = StableAmount::from_decimal(base)?;
        let premium_yield = StableAmount::from_decimal(premium)?;
        Ok(YieldParts {
            budget_prime: StableAmount::from_decimal(loan * self.policy.prime_budget_fraction)?,
            base_yield,
            premium_yield,
            target_yield: base_yield.checked_add(premium_yield)?,
            protocol_fee: StableAmount::from_decimal(loan * self.policy.fee_fraction)?,
        })
    }
}

/// Duration as a fraction of a 365-day year
pub fn year_fraction(duration_secs: u64) -> Decimal {
    Decimal::from(duration_secs) / Decimal::from(SECONDS_PER_YEAR)
}

/// Fails when `loan_amount` exceeds `ltv` of `collateral_value`
pub fn check_ltv(
    loan_amount: StableAmount,
    collateral_value: StableAmount,
    ltv: Bps,
) -> Result<(), AllocationError> {
    let max_borrow = ltv.of(collateral_value)?;
    if loan_amount > max_borrow {
        return Err(AllocationError::LtvExceeded {
            loan_amount,
            collateral_value,
            ltv,
        });
    }
    Ok(())
}

/// Largest loan `ltv` allows against `collateral_value`
pub fn max_borrow(collateral_value: StableAmount, ltv: Bps) -> Result<StableAmount, AllocationError> {
    Ok(ltv.of(collateral_value)?)
}
