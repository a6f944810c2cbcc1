//! Protection fund module
//!
//! Pooled reserve that pays put exercises, plus the separately tracked protocol fees. Both
//! are held by the protocol vault; this is the accounting, not the tokens.

use crate::fixed::{FixedError, StableAmount};
use serde::Serialize;
use thiserror::Error;

/// Fund accounting errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FundError {
    #[error("Insufficient protocol fees: available {available}, requested {requested}")]
    InsufficientFees {
        available: StableAmount,
        requested: StableAmount,
    },
    #[error(transparent)]
    Fixed(#[from] FixedError),
}

/// Result of a payout request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Payout {
    pub requested: StableAmount,
    /// min(requested, balance)
    pub paid: StableAmount,
    pub shortfall: StableAmount,
}

impl Payout {
    pub fn is_partial(&self) -> bool {
        !self.shortfall.is_zero()
    }
}

/// Reserve balance and fee ledger
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProtectionFund {
    balance: StableAmount,
    total_deposited: StableAmount,
    total_paid_out: StableAmount,
    total_fees: StableAmount,
    available_fees: StableAmount,
}

impl ProtectionFund {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self) -> StableAmount {
        self.balance
    }

    pub fn total_paid_out(&self) -> StableAmount {
        self.total_paid_out
    }

    pub fn total_deposited(&self) -> StableAmount {
        self.total_deposited
    }

    /// Fees collected over the protocol's lifetime
    pub fn total_fees(&self) -> StableAmount {
        self.total_fees
    }

    /// Fees not yet withdrawn
    pub fn available_fees(&self) -> StableAmount {
        self.available_fees
    }

    /// Returns the new balance
    pub fn deposit(&mut self, amount: StableAmount) -> Result<StableAmount, FundError> {
        let balance = self.balance.checked_add(amount)?;
        let deposited = self.total_deposited.checked_add(amount)?;
        self.balance = balance;
        self.total_deposited = deposited;
        Ok(balance)
    }

    /// Pay up to `requested`, capped at the balance. Never fails.
    pub fn payout(&mut self, requested: StableAmount) -> Payout {
        let paid = requested.min(self.balance);
        self.balance = self.balance.saturating_sub(paid);
        self.total_paid_out =
            StableAmount::from_raw(self.total_paid_out.raw().saturating_add(paid.raw()));
        Payout {
            requested,
            paid,
            shortfall: requested.saturating_sub(paid),
        }
    }

    /// Put back a payout whose transfer failed
    pub fn refund(&mut self, payout: &Payout) -> Result<(), FundError> {
        self.balance = self.balance.checked_add(payout.paid)?;
        self.total_paid_out = self.total_paid_out.saturating_sub(payout.paid);
        Ok(())
    }

    /// Undo a deposit whose transfer failed
    pub fn reverse_deposit(&mut self, amount: StableAmount) -> Result<(), FundError> {
        self.balance = self.balance.checked_sub(amount)?;
        self.total_deposited = self.total_deposited.saturating_sub(amount);
        Ok(())
    }

    pub fn accrue_fees(&mut self, amount: StableAmount) -> Result<(), FundError> {
        let total = self.total_fees.checked_add(amount)?;
        let available = self.available_fees.checked_add(amount)?;
        self.total_fees = total;
        self.available_fees = available;
        Ok(())
    }

    /// Undo `accrue_fees`
    pub fn reverse_fees(&mut self, amount: StableAmount) {
        self.total_fees = self.total_fees.saturating_sub(amount);
        self.available_fees = self.available_fees.saturating_sub(amount);
    }

    pub fn withdraw_fees(&mut self, amount: StableAmount) -> Result<(), FundError> {
        if amount > self.available_fees {
            return Err(FundError::InsufficientFees {
                available: self.available_fees,
                requested: amount,
            });
        }
        self.available_fees = self.available_fees.saturating_sub(amount);
        Ok(())
    }

    /// Undo `withdraw_fees`
    pub fn restore_fees(&mut self, amount: StableAmount) -> Result<(), FundError> {
        self.available_fees = self.available_fees.checked_add(amount)?;
        Ok(())
    }
}
