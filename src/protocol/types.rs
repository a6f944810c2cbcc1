//! Protocol types

use crate::allocation::{Allocation, AllocationError, YieldPolicy};
use crate::fixed::{Bps, FixedError, Price, StableAmount, TokenAmount};
use crate::fund::{FundError, Payout};
use crate::ids::{AccountId, AssetId, FeedId};
use crate::ledger::{LedgerError, LoanId};
use crate::oracle::OracleError;
use crate::pricing::PricingError;
use crate::token::TransferError;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Protocol errors
///
/// Validation, authorization and state-conflict errors are returned before any state
/// changes. Oracle errors abort only the operation that needed the price.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    #[error("Asset {0} is not supported")]
    AssetNotSupported(AssetId),
    #[error("Asset {0} is inactive")]
    AssetInactive(AssetId),
    #[error("Asset {0} is already listed")]
    AssetAlreadyListed(AssetId),
    #[error("LTV {ltv} must be between 1bps and {max}")]
    InvalidLtv { ltv: Bps, max: Bps },
    #[error("Asset {0} uses real volatility but has no volatility feed")]
    MissingVolatilityFeed(AssetId),
    #[error("Amount must be greater than zero")]
    ZeroAmount,
    #[error("Loan {loan_amount} exceeds {ltv} of collateral value {collateral_value}")]
    LtvExceeded {
        loan_amount: StableAmount,
        collateral_value: StableAmount,
        ltv: Bps,
    },
    #[error("Duration {duration_secs}s outside [{min_secs}s, {max_secs}s]")]
    DurationOutOfRange {
        duration_secs: u64,
        min_secs: u64,
        max_secs: u64,
    },
    #[error(transparent)]
    InvalidPricingInput(#[from] PricingError),

    #[error("{0} is not the protocol owner")]
    NotOwner(AccountId),
    #[error("{caller} is not the borrower of loan {loan_id}")]
    NotBorrower { loan_id: LoanId, caller: AccountId },

    #[error("Loan {0} not found")]
    LoanNotFound(LoanId),
    #[error("Loan {0} is not active")]
    LoanNotActive(LoanId),
    #[error("Loan {loan_id} not exercisable: price {price} >= strike {strike}")]
    NotExercisable {
        loan_id: LoanId,
        price: Price,
        strike: Price,
    },
    #[error("Insufficient protocol fees: available {available}, requested {requested}")]
    InsufficientFees {
        available: StableAmount,
        requested: StableAmount,
    },

    #[error("Invalid price feed: {0}")]
    InvalidPriceFeed(#[from] OracleError),
    #[error("Transfer failed: {0}")]
    Transfer(#[from] TransferError),
    #[error("Arithmetic error: {0}")]
    Arithmetic(#[from] FixedError),
}

impl From<AllocationError> for ProtocolError {
    fn from(err: AllocationError) -> Self {
        match err {
            AllocationError::DurationOutOfRange {
                duration_secs,
                min_secs,
                max_secs,
            } => Self::DurationOutOfRange {
                duration_secs,
                min_secs,
                max_secs,
            },
            AllocationError::LtvExceeded {
                loan_amount,
                collateral_value,
                ltv,
            } => Self::LtvExceeded {
                loan_amount,
                collateral_value,
                ltv,
            },
            AllocationError::ZeroAmount => Self::ZeroAmount,
            AllocationError::Pricing(e) => Self::InvalidPricingInput(e),
            AllocationError::Fixed(e) => Self::Arithmetic(e),
        }
    }
}

impl From<LedgerError> for ProtocolError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::LoanNotFound(id) => Self::LoanNotFound(id),
            LedgerError::LoanNotActive(id) => Self::LoanNotActive(id),
        }
    }
}

impl From<FundError> for ProtocolError {
    fn from(err: FundError) -> Self {
        match err {
            FundError::InsufficientFees {
                available,
                requested,
            } => Self::InsufficientFees {
                available,
                requested,
            },
            FundError::Fixed(e) => Self::Arithmetic(e),
        }
    }
}

/// Deployment parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolSettings {
    pub owner: AccountId,
    /// Lender side: funds loans, receives repayments and exercised collateral
    pub treasury: AccountId,
    /// Protocol custody: escrowed collateral, protection reserve and fees
    pub vault: AccountId,
    pub stablecoin: AssetId,
    /// Used when an asset has no usable volatility feed
    pub default_volatility: Decimal,
    pub max_ltv: Bps,
    pub max_price_age: Duration,
    /// Most loans one `check` reports
    pub exercise_batch_size: usize,
    pub policy: YieldPolicy,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            owner: AccountId::from("owner"),
            treasury: AccountId::from("treasury"),
            vault: AccountId::from("vault"),
            stablecoin: AssetId::from("USDC"),
            default_volatility: dec!(0.30),
            max_ltv: Bps::new(8000),
            max_price_age: Duration::hours(1),
            exercise_batch_size: 50,
            policy: YieldPolicy::default(),
        }
    }
}

/// Owner-supplied asset parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetListing {
    pub token: AssetId,
    pub price_feed: FeedId,
    pub volatility_feed: Option<FeedId>,
    pub ltv: Bps,
    pub use_real_volatility: bool,
}

/// Borrower request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanRequest {
    pub stock_token: AssetId,
    pub collateral_amount: TokenAmount,
    pub loan_amount: StableAmount,
    pub duration_secs: u64,
}

/// Loan economics at current market inputs, without side effects
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoanQuote {
    pub spot: Price,
    pub volatility: Decimal,
    pub collateral_value: StableAmount,
    pub max_borrow: StableAmount,
    pub allocation: Allocation,
    pub repayment_due: StableAmount,
    pub expiration: DateTime<Utc>,
}

/// Derived protocol totals
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProtocolStats {
    pub total_protection_fund: StableAmount,
    pub total_protocol_fees: StableAmount,
    pub available_protocol_fees: StableAmount,
    pub total_protection_paid: StableAmount,
    pub active_loans: usize,
    pub total_loans: usize,
    pub base_yield_rate: Decimal,
}

/// Result of one scheduler `check`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpkeepCheck {
    pub needed: bool,
    /// Exercisable loans in ascending id order
    pub loan_ids: Vec<LoanId>,
}

/// Outcome of exercising one loan's put
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Settlement {
    pub loan_id: LoanId,
    pub payout: Payout,
    pub current_price: Price,
    pub put_strike: Price,
}

/// Protocol event log entry
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event")]
pub enum ProtocolEvent {
    AssetAdded {
        token: AssetId,
        ltv: Bps,
        use_real_volatility: bool,
    },
    AssetUpdated {
        token: AssetId,
        ltv: Bps,
        is_active: bool,
    },
    LoanCreated {
        loan_id: LoanId,
        borrower: AccountId,
        stock_token: AssetId,
        collateral_amount: TokenAmount,
        loan_amount: StableAmount,
        put_strike: Price,
        expiration: DateTime<Utc>,
    },
    YieldCalculated {
        loan_id: LoanId,
        budget_prime: StableAmount,
        base_yield: StableAmount,
        premium_yield: StableAmount,
        target_yield: StableAmount,
        put_premium: StableAmount,
        protocol_fee: StableAmount,
    },
    LoanRepaid {
        loan_id: LoanId,
        borrower: AccountId,
        amount_paid: StableAmount,
        collateral_returned: TokenAmount,
    },
    PutOptionExercised {
        loan_id: LoanId,
        protection_payout: StableAmount,
        requested_payout: StableAmount,
        current_price: Price,
        put_strike: Price,
    },
    ProtectionFundDeposited {
        from: AccountId,
        amount: StableAmount,
        new_balance: StableAmount,
    },
    ProtocolFeesWithdrawn {
        to: AccountId,
        amount: StableAmount,
    },
}

/// Event with its position in the log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    pub sequence: u64,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: ProtocolEvent,
}
