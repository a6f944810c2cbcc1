//! Black-Scholes European put
//!
//! P = K·e^(-rT)·N(-d2) - S·N(-d1)
//! d1 = (ln(S/K) + (r + σ²/2)·T) / (σ·√T), d2 = d1 - σ·√T

use super::{PricingError, PutParams, PutPricer};
use rust_decimal::Decimal;

/// Below this σ·√T the closed form is replaced by its limit
const MIN_SIGMA_SQRT_T: f64 = 1e-12;

/// Black-Scholes put pricer
#[derive(Debug, Default, Clone, Copy)]
pub struct BlackScholes;

impl BlackScholes {
    /// Create a new Black-Scholes pricer
    pub fn new() -> Self {
        Self
    }

    /// Put premium on plain floats. Inputs must already satisfy the domain checks.
    ///
    /// When T or σ collapse to zero the premium is the discounted intrinsic value
    /// max(K·e^(-rT) - S, 0), which is max(K - S, 0) at expiry.
    pub fn put(spot: f64, strike: f64, time: f64, volatility: f64, rate: f64) -> f64 {
        let discounted_strike = strike * (-rate * time).exp();
        let floor = (discounted_strike - spot).max(0.0);

        let sigma_sqrt_t = volatility * time.sqrt();
        if time <= 0.0 || sigma_sqrt_t < MIN_SIGMA_SQRT_T {
            return floor;
        }

        let d1 = ((spot / strike).ln() + (rate + 0.5 * volatility * volatility) * time)
            / sigma_sqrt_t;
        let d2 = d1 - sigma_sqrt_t;

        let premium = discounted_strike * normal_cdf(-d2) - spot * normal_cdf(-d1);
        // CDF approximation error can leave a deep OTM put marginally negative
        premium.max(floor)
    }
}

impl PutPricer for BlackScholes {
    fn put_premium(&self, params: &PutParams) -> Result<Decimal, PricingError> {
        if params.spot <= Decimal::ZERO {
            return Err(PricingError::InvalidPricingInput("spot must be positive"));
        }
        if params.strike <= Decimal::ZERO {
            return Err(PricingError::InvalidPricingInput("strike must be positive"));
        }
        if params.time_to_expiry < Decimal::ZERO {
            return Err(PricingError::InvalidPricingInput(
                "time to expiry must not be negative",
            ));
        }
        if params.volatility < Decimal::ZERO {
            return Err(PricingError::InvalidPricingInput(
                "volatility must not be negative",
            ));
        }

        let s = to_f64(params.spot)?;
        let k = to_f64(params.strike)?;
        let t = to_f64(params.time_to_expiry)?;
        let sigma = to_f64(params.volatility)?;
        let r = to_f64(params.risk_free_rate)?;

        let premium = Self::put(s, k, t, sigma, r);
        if !premium.is_finite() {
            return Err(PricingError::NonFinite(premium));
        }
        Decimal::try_from(premium).map_err(|_| PricingError::NonFinite(premium))
    }
}

fn to_f64(value: Decimal) -> Result<f64, PricingError> {
    f64::try_from(value).map_err(|_| PricingError::InvalidPricingInput("value out of f64 range"))
}

/// Standard normal CDF (Abramowitz and Stegun 7.1.26, |error| < 1.5e-7)
pub(crate) fn normal_cdf(x: f64) -> f64 {
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs() / std::f64::consts::SQRT_2;

    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();

    0.5 * (1.0 + sign * y)
}
