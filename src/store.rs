//! Protocol state owned in one place
//!
//! Assets, loans, the protection fund and the event log. The protocol holds this behind a
//! single async mutex; components receive it by reference instead of reaching for globals.

use crate::fund::ProtectionFund;
use crate::ids::AssetId;
use crate::ledger::{LoanLedger, StockAsset};
use crate::protocol::{EventRecord, ProtocolEvent};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct LedgerStore {
    assets: BTreeMap<AssetId, StockAsset>,
    ledger: LoanLedger,
    fund: ProtectionFund,
    events: Vec<EventRecord>,
}

impl LedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn asset(&self, token: &AssetId) -> Option<&StockAsset> {
        self.assets.get(token)
    }

    pub fn assets(&self) -> impl Iterator<Item = &StockAsset> + '_ {
        self.assets.values()
    }

    /// Insert or replace; assets are never removed
    pub fn put_asset(&mut self, asset: StockAsset) {
        self.assets.insert(asset.token.clone(), asset);
    }

    pub fn asset_mut(&mut self, token: &AssetId) -> Option<&mut StockAsset> {
        self.assets.get_mut(token)
    }

    pub fn ledger(&self) -> &LoanLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut LoanLedger {
        &mut self.ledger
    }

    pub fn fund(&self) -> &ProtectionFund {
        &self.fund
    }

    pub fn fund_mut(&mut self) -> &mut ProtectionFund {
        &mut self.fund
    }

    /// Append to the event log
    pub fn record(&mut self, at: DateTime<Utc>, event: ProtocolEvent) {
        let sequence = self.events.len() as u64 + 1;
        self.events.push(EventRecord {
            sequence,
            at,
            event,
        });
    }

    pub fn events(&self) -> &[EventRecord] {
        &self.events
    }
}
