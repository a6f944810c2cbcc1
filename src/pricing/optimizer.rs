//! Strike search
//!
//! Finds the put strike whose premium matches a budget. Put premium rises with strike,
//! so a bisection over the raw 1e8 strike grid converges; the iteration cap bounds the
//! work and the best candidate is returned when the cap is hit.

use super::{BlackScholes, PricingError, PutParams, PutPricer};
use crate::fixed::Price;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Absolute tolerance floor, applied when the budget itself is ~zero
const MIN_ABS_TOLERANCE: Decimal = dec!(0.000001);

/// Inclusive strike range searched, strictly below spot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrikeBounds {
    pub min_strike: Price,
    pub max_strike: Price,
}

impl StrikeBounds {
    /// Band from `max_discount` to `min_discount` below spot
    pub fn below_spot(
        spot: Price,
        min_discount: Decimal,
        max_discount: Decimal,
    ) -> Result<Self, PricingError> {
        let spot_dec = spot
            .to_decimal()
            .map_err(|_| PricingError::InvalidPricingInput("spot out of range"))?;
        let at = |discount: Decimal| {
            Price::from_decimal(spot_dec * (Decimal::ONE - discount))
                .map_err(|_| PricingError::InvalidPricingInput("strike discount out of range"))
        };
        let min_strike = at(max_discount)?;
        let mut max_strike = at(min_discount)?;
        if max_strike >= spot {
            max_strike = Price::from_raw(spot.raw().saturating_sub(1));
        }
        let bounds = Self {
            min_strike,
            max_strike,
        };
        bounds.validate(spot)?;
        Ok(bounds)
    }

    fn validate(&self, spot: Price) -> Result<(), PricingError> {
        if self.min_strike.is_zero()
            || self.min_strike > self.max_strike
            || self.max_strike >= spot
        {
            return Err(PricingError::InvalidBounds {
                min: self.min_strike.to_decimal().unwrap_or_default(),
                max: self.max_strike.to_decimal().unwrap_or_default(),
                spot: spot.to_decimal().unwrap_or_default(),
            });
        }
        Ok(())
    }
}

/// Market inputs and the premium to hit, per unit of underlying
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrikeQuery {
    pub spot: Price,
    /// Time to expiry in years
    pub time_to_expiry: Decimal,
    pub volatility: Decimal,
    pub risk_free_rate: Decimal,
    pub target_premium: Decimal,
}

/// Outcome of a strike search
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrikeSearch {
    pub strike: Price,
    /// Premium per unit at `strike`
    pub premium: Decimal,
    /// premium - target
    pub residual: Decimal,
    /// Bisection steps taken
    pub iterations: u32,
    /// Whether |residual| is within tolerance
    pub converged: bool,
}

/// Bisection over strikes against a put pricer
#[derive(Debug, Clone)]
pub struct StrikeOptimizer<P = BlackScholes> {
    pricer: P,
    max_iterations: u32,
    tolerance: Decimal,
}

impl<P: PutPricer> StrikeOptimizer<P> {
    /// `tolerance` is relative to the target premium
    pub fn new(pricer: P, max_iterations: u32, tolerance: Decimal) -> Self {
        Self {
            pricer,
            max_iterations,
            tolerance,
        }
    }

    pub fn pricer(&self) -> &P {
        &self.pricer
    }

    /// Search `bounds` for the strike whose premium matches `query.target_premium`
    pub fn find_strike(
        &self,
        query: &StrikeQuery,
        bounds: StrikeBounds,
    ) -> Result<StrikeSearch, PricingError> {
        bounds.validate(query.spot)?;
        if query.target_premium < Decimal::ZERO {
            return Err(PricingError::InvalidPricingInput(
                "target premium must not be negative",
            ));
        }

        let tolerance = (query.target_premium * self.tolerance).max(MIN_ABS_TOLERANCE);
        let within = |c: &StrikeSearch| c.residual.abs() <= tolerance;

        let low = self.evaluate(query, bounds.min_strike)?;
        if low.residual >= Decimal::ZERO {
            // Even the lowest strike costs at least the budget
            return Ok(StrikeSearch {
                converged: within(&low),
                ..low
            });
        }
        let high = self.evaluate(query, bounds.max_strike)?;
        if high.residual <= Decimal::ZERO {
            // Budget buys more than the highest allowed strike
            return Ok(StrikeSearch {
                converged: within(&high),
                ..high
            });
        }

        let mut best = if low.residual.abs() <= high.residual.abs() {
            low
        } else {
            high
        };
        let mut lo = bounds.min_strike.raw();
        let mut hi = bounds.max_strike.raw();
        let mut iterations = 0;

        while iterations < self.max_iterations && hi - lo > 1 {
            iterations += 1;
            let mid = lo + (hi - lo) / 2;
            let candidate = self.evaluate(query, Price::from_raw(mid))?;

            if within(&candidate) {
                return Ok(StrikeSearch {
                    iterations,
                    converged: true,
                    ..candidate
                });
            }
            if candidate.residual.abs() < best.residual.abs() {
                best = candidate;
            }
            if candidate.residual < Decimal::ZERO {
                lo = mid;
            } else {
                hi = mid;
            }
        }

        tracing::debug!(
            iterations,
            strike = %best.strike,
            residual = %best.residual,
            "Strike search stopped without converging"
        );
        Ok(StrikeSearch {
            iterations,
            converged: false,
            ..best
        })
    }

    fn evaluate(&self, query: &StrikeQuery, strike: Price) -> Result<StrikeSearch, PricingError> {
        let params = PutParams {
            spot: to_decimal(query.spot)?,
            strike: to_decimal(strike)?,
            time_to_expiry: query.time_to_expiry,
            volatility: query.volatility,
            risk_free_rate: query.risk_free_rate,
        };
        let premium = self.pricer.put_premium(&params)?;
        Ok(StrikeSearch {
            strike,
            premium,
            residual: premium - query.target_premium,
            iterations: 0,
            converged: false,
        })
    }
}

fn to_decimal(price: Price) -> Result<Decimal, PricingError> {
    price
        .to_decimal()
        .map_err(|_| PricingError::InvalidPricingInput("price out of range"))
}
