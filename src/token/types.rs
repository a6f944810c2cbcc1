//! Token transfer types

use crate::ids::{AccountId, AssetId};
use thiserror::Error;

/// Transfer errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    #[error("Insufficient {asset} balance for {account}: have {available}, need {requested}")]
    InsufficientBalance {
        asset: AssetId,
        account: AccountId,
        available: u128,
        requested: u128,
    },
    #[error("Balance overflow for {account} in {asset}")]
    Overflow { asset: AssetId, account: AccountId },
}
