//! Token legs of an operation, executed all-or-nothing

use crate::ids::{AccountId, AssetId};
use crate::telemetry::{increment_counter, CounterMetric};
use crate::token::{TokenLedger, TransferError};

/// One token movement
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Leg {
    asset: AssetId,
    from: AccountId,
    to: AccountId,
    amount: u128,
    /// Spend on `from`'s allowance rather than out of protocol custody
    pull: bool,
}

impl Leg {
    pub(crate) fn pull(asset: &AssetId, from: &AccountId, to: &AccountId, amount: u128) -> Self {
        Self {
            asset: asset.clone(),
            from: from.clone(),
            to: to.clone(),
            amount,
            pull: true,
        }
    }

    pub(crate) fn push(asset: &AssetId, from: &AccountId, to: &AccountId, amount: u128) -> Self {
        Self {
            pull: false,
            ..Self::pull(asset, from, to, amount)
        }
    }

    async fn execute(&self, tokens: &dyn TokenLedger) -> Result<(), TransferError> {
        if self.pull {
            tokens
                .transfer_from(&self.asset, &self.from, &self.to, self.amount)
                .await
        } else {
            tokens
                .transfer(&self.asset, &self.from, &self.to, self.amount)
                .await
        }
    }
}

/// Run `legs` in order. If one fails, the completed legs are sent back in reverse order
/// and the failure is returned. Zero-amount legs are skipped.
pub(crate) async fn settle(tokens: &dyn TokenLedger, legs: &[Leg]) -> Result<(), TransferError> {
    for (index, leg) in legs.iter().enumerate() {
        if leg.amount == 0 {
            continue;
        }
        if let Err(err) = leg.execute(tokens).await {
            increment_counter(CounterMetric::Rollbacks);
            for done in legs[..index].iter().rev().filter(|l| l.amount > 0) {
                if let Err(undo) = tokens
                    .transfer(&done.asset, &done.to, &done.from, done.amount)
                    .await
                {
                    tracing::error!(
                        asset = %done.asset,
                        from = %done.to,
                        to = %done.from,
                        amount = done.amount,
                        error = %undo,
                        "Failed to reverse transfer leg"
                    );
                }
            }
            return Err(err);
        }
    }
    Ok(())
}
