//! Token transfer module
//!
//! Moves collateral and stablecoin between accounts. Amounts are raw token units; callers
//! convert from the fixed-point types at the boundary.

mod memory;
mod types;

pub use memory::InMemoryTokens;
pub use types::TransferError;

use crate::ids::{AccountId, AssetId};
use async_trait::async_trait;

/// Token transfer capability
#[async_trait]
pub trait TokenLedger: Send + Sync {
    /// Move `amount` of `asset` from `owner` to `recipient` on the owner's allowance
    async fn transfer_from(
        &self,
        asset: &AssetId,
        owner: &AccountId,
        recipient: &AccountId,
        amount: u128,
    ) -> Result<(), TransferError>;

    /// Move `amount` of `asset` out of an account the protocol controls
    async fn transfer(
        &self,
        asset: &AssetId,
        from: &AccountId,
        recipient: &AccountId,
        amount: u128,
    ) -> Result<(), TransferError>;

    async fn balance_of(&self, asset: &AssetId, account: &AccountId) -> u128;
}
