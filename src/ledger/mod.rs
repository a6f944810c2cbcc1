//! Loan ledger module
//!
//! Authoritative loan records with a per-borrower index and the set of active loans.
//! State transitions are Active -> Repaid and Active -> Exercised; the reverse moves exist
//! only to roll back an operation whose token transfer failed.

mod types;

pub use types::{LedgerError, Loan, LoanId, LoanStatus, LoanView, StockAsset};

use crate::fixed::StableAmount;
use crate::ids::AccountId;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Loan records keyed by id
#[derive(Debug)]
pub struct LoanLedger {
    loans: BTreeMap<LoanId, Loan>,
    by_borrower: HashMap<AccountId, Vec<LoanId>>,
    active: BTreeSet<LoanId>,
    next_id: LoanId,
}

impl Default for LoanLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl LoanLedger {
    pub fn new() -> Self {
        Self {
            loans: BTreeMap::new(),
            by_borrower: HashMap::new(),
            active: BTreeSet::new(),
            next_id: 1,
        }
    }

    /// Store `loan` as active under the next id. The id and status on `loan` are overwritten.
    pub fn open(&mut self, mut loan: Loan) -> LoanId {
        let id = self.next_id;
        self.next_id += 1;

        loan.id = id;
        loan.status = LoanStatus::Active;
        loan.protection_payout = StableAmount::ZERO;

        self.by_borrower
            .entry(loan.borrower.clone())
            .or_default()
            .push(id);
        self.active.insert(id);
        self.loans.insert(id, loan);
        id
    }

    /// Forget the most recently opened loan. Only valid before any other loan is opened.
    pub fn unwind_open(&mut self, id: LoanId) -> Option<Loan> {
        if id + 1 != self.next_id {
            return None;
        }
        let loan = self.loans.remove(&id)?;
        self.active.remove(&id);
        if let Some(ids) = self.by_borrower.get_mut(&loan.borrower) {
            ids.retain(|existing| *existing != id);
            if ids.is_empty() {
                self.by_borrower.remove(&loan.borrower);
            }
        }
        self.next_id = id;
        Some(loan)
    }

    /// Active -> Repaid
    pub fn close_repaid(&mut self, id: LoanId) -> Result<&Loan, LedgerError> {
        self.transition(id, LoanStatus::Repaid, StableAmount::ZERO)
    }

    /// Active -> Exercised, recording what the fund paid
    pub fn mark_exercised(
        &mut self,
        id: LoanId,
        payout: StableAmount,
    ) -> Result<&Loan, LedgerError> {
        self.transition(id, LoanStatus::Exercised, payout)
    }

    /// Undo a terminal transition whose settlement failed
    pub fn restore(&mut self, id: LoanId) -> Result<(), LedgerError> {
        let loan = self.loans.get_mut(&id).ok_or(LedgerError::LoanNotFound(id))?;
        loan.status = LoanStatus::Active;
        loan.protection_payout = StableAmount::ZERO;
        self.active.insert(id);
        Ok(())
    }

    fn transition(
        &mut self,
        id: LoanId,
        status: LoanStatus,
        payout: StableAmount,
    ) -> Result<&Loan, LedgerError> {
        let loan = self.loans.get_mut(&id).ok_or(LedgerError::LoanNotFound(id))?;
        if !loan.is_active() {
            return Err(LedgerError::LoanNotActive(id));
        }
        loan.status = status;
        loan.protection_payout = payout;
        self.active.remove(&id);
        Ok(loan)
    }

    pub fn get(&self, id: LoanId) -> Option<&Loan> {
        self.loans.get(&id)
    }

    /// Loan ids of `borrower` in creation order
    pub fn loans_of(&self, borrower: &AccountId) -> &[LoanId] {
        self.by_borrower
            .get(borrower)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Active loans in ascending id order
    pub fn active_loans(&self) -> impl Iterator<Item = &Loan> + '_ {
        self.active.iter().filter_map(|id| self.loans.get(id))
    }

    /// Total loans ever opened
    pub fn len(&self) -> usize {
        self.loans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loans.is_empty()
    }
}
