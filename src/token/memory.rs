//! In-memory token balances

use super::{TokenLedger, TransferError};
use crate::ids::{AccountId, AssetId};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Balance sheet keyed by (token, account)
#[derive(Default)]
pub struct InMemoryTokens {
    balances: RwLock<HashMap<(AssetId, AccountId), u128>>,
}

impl InMemoryTokens {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `amount` of `asset` to `account` out of thin air
    pub async fn mint(
        &self,
        asset: &AssetId,
        account: &AccountId,
        amount: u128,
    ) -> Result<(), TransferError> {
        let mut balances = self.balances.write().await;
        let balance = balances.entry((asset.clone(), account.clone())).or_default();
        *balance = balance
            .checked_add(amount)
            .ok_or_else(|| TransferError::Overflow {
                asset: asset.clone(),
                account: account.clone(),
            })?;
        tracing::debug!(asset = %asset, account = %account, amount, "Minted");
        Ok(())
    }

    async fn move_balance(
        &self,
        asset: &AssetId,
        from: &AccountId,
        to: &AccountId,
        amount: u128,
    ) -> Result<(), TransferError> {
        let mut balances = self.balances.write().await;
        let from_key = (asset.clone(), from.clone());
        let available = balances.get(&from_key).copied().unwrap_or(0);
        if available < amount {
            return Err(TransferError::InsufficientBalance {
                asset: asset.clone(),
                account: from.clone(),
                available,
                requested: amount,
            });
        }
        if from == to {
            return Ok(());
        }
        let to_key = (asset.clone(), to.clone());
        let credited = balances
            .get(&to_key)
            .copied()
            .unwrap_or(0)
            .checked_add(amount)
            .ok_or_else(|| TransferError::Overflow {
                asset: asset.clone(),
                account: to.clone(),
            })?;

        balances.insert(from_key, available - amount);
        balances.insert(to_key, credited);
        Ok(())
    }
}

#[async_trait]
impl TokenLedger for InMemoryTokens {
    async fn transfer_from(
        &self,
        asset: &AssetId,
        owner: &AccountId,
        recipient: &AccountId,
        amount: u128,
    ) -> Result<(), TransferError> {
        self.move_balance(asset, owner, recipient, amount).await
    }

    async fn transfer(
        &self,
        asset: &AssetId,
        from: &AccountId,
        recipient: &AccountId,
        amount: u128,
    ) -> Result<(), TransferError> {
        self.move_balance(asset, from, recipient, amount).await
    }

    async fn balance_of(&self, asset: &AssetId, account: &AccountId) -> u128 {
        self.balances
            .read()
            .await
            .get(&(asset.clone(), account.clone()))
            .copied()
            .unwrap_or(0)
    }
}
