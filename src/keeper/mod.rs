//! Keeper module
//!
//! Poll-then-act scheduler: calls `check_upkeep` on an interval and dispatches
//! `perform_upkeep` when work is reported. Delivery is at-least-once; the protocol
//! tolerates repeated performs.

use crate::ledger::LoanId;
use crate::protocol::{Protocol, Settlement, UpkeepCheck};
use crate::telemetry::{record_latency, LatencyMetric};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Work source driven by the keeper
#[async_trait]
pub trait Upkeep: Send + Sync {
    /// Read-only scan for work
    async fn check_upkeep(&self) -> UpkeepCheck;
    /// Act on the ids a previous check reported
    async fn perform_upkeep(&self, loan_ids: &[LoanId]) -> Vec<Settlement>;
}

#[async_trait]
impl Upkeep for Protocol {
    async fn check_upkeep(&self) -> UpkeepCheck {
        self.check().await
    }

    async fn perform_upkeep(&self, loan_ids: &[LoanId]) -> Vec<Settlement> {
        self.perform(loan_ids).await
    }
}

/// Outcome of one keeper pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub checked: usize,
    pub settled: Vec<Settlement>,
}

/// Interval poller over an `Upkeep`
pub struct Keeper<U: ?Sized> {
    upkeep: Arc<U>,
    interval: Duration,
}

impl<U: Upkeep + ?Sized> Keeper<U> {
    pub fn new(upkeep: Arc<U>, interval: Duration) -> Self {
        Self { upkeep, interval }
    }

    /// One check, and a perform if the check reported work
    pub async fn tick(&self) -> PassReport {
        let started = Instant::now();
        let check = self.upkeep.check_upkeep().await;
        let report = if check.needed {
            let settled = self.upkeep.perform_upkeep(&check.loan_ids).await;
            tracing::info!(
                reported = check.loan_ids.len(),
                settled = settled.len(),
                "Keeper performed upkeep"
            );
            PassReport {
                checked: check.loan_ids.len(),
                settled,
            }
        } else {
            PassReport::default()
        };
        record_latency(LatencyMetric::KeeperPass, started.elapsed());
        report
    }

    /// Poll until `shutdown` flips to true. A pass in progress always completes.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tracing::info!(interval_ms = self.interval.as_millis() as u64, "Keeper started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("Keeper stopped");
    }
}
