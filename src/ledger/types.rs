//! Loan ledger types

use crate::fixed::{Bps, FixedError, Price, StableAmount, TokenAmount};
use crate::ids::{AccountId, AssetId, FeedId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Monotonic loan identifier, starting at 1
pub type LoanId = u64;

/// Supported collateral type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAsset {
    pub token: AssetId,
    pub price_feed: FeedId,
    pub volatility_feed: Option<FeedId>,
    pub ltv: Bps,
    pub is_active: bool,
    /// Price with the volatility feed instead of the default volatility
    pub use_real_volatility: bool,
}

/// Loan lifecycle. Repaid and Exercised are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Active,
    Repaid,
    Exercised,
}

/// One borrow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub borrower: AccountId,
    pub stock_token: AssetId,
    pub collateral_amount: TokenAmount,
    pub loan_amount: StableAmount,
    pub put_strike: Price,
    pub put_premium: StableAmount,
    pub created_at: DateTime<Utc>,
    pub expiration: DateTime<Utc>,
    pub base_yield: StableAmount,
    pub premium_yield: StableAmount,
    /// Base plus premium yield owed at repayment
    pub target_yield: StableAmount,
    pub protocol_fee: StableAmount,
    pub status: LoanStatus,
    pub creation_price: Price,
    pub volatility_used: Decimal,
    /// Amount paid by the protection fund on exercise
    pub protection_payout: StableAmount,
}

impl Loan {
    pub fn is_active(&self) -> bool {
        self.status == LoanStatus::Active
    }

    pub fn put_exercised(&self) -> bool {
        self.status == LoanStatus::Exercised
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiration
    }

    /// max(strike - price, 0) * collateral, in stablecoin
    pub fn intrinsic_value(&self, price: Price) -> Result<StableAmount, FixedError> {
        self.put_strike
            .saturating_sub(price)
            .value_of(self.collateral_amount)
    }

    /// Active, not exercised and below strike
    pub fn is_exercisable(&self, price: Price) -> bool {
        self.is_active() && price < self.put_strike
    }

    /// Principal, target yield and fee
    pub fn repayment_due(&self) -> Result<StableAmount, FixedError> {
        self.loan_amount
            .checked_add(self.target_yield)?
            .checked_add(self.protocol_fee)
    }
}

/// Loan plus its valuation at the current price
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoanView {
    pub loan: Loan,
    pub current_price: Price,
    pub intrinsic_value: StableAmount,
    pub should_exercise: bool,
    pub is_expired: bool,
}

/// Ledger state errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("Loan {0} not found")]
    LoanNotFound(LoanId),
    #[error("Loan {0} is not active")]
    LoanNotActive(LoanId),
}
