//! Put exercise engine
//!
//! `check` is read-only and reports exercisable loans; `perform` re-validates each one at
//! the current price and settles it. `perform` may be called by anyone, any number of
//! times: loans that are no longer active are skipped.

use super::settlement::{settle, Leg};
use super::{publish_gauges, Protocol, ProtocolError, ProtocolEvent, Settlement, UpkeepCheck};
use crate::fixed::Price;
use crate::ids::{AssetId, FeedId};
use crate::ledger::LoanId;
use crate::oracle::OracleError;
use crate::store::LedgerStore;
use crate::telemetry::{increment_counter, CounterMetric};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Prices read during one pass, one oracle call per feed
type PriceCache = HashMap<FeedId, Result<Price, OracleError>>;

impl Protocol {
    async fn cached_spot(
        &self,
        cache: &mut PriceCache,
        feed: &FeedId,
        now: DateTime<Utc>,
    ) -> Result<Price, OracleError> {
        if let Some(result) = cache.get(feed) {
            return result.clone();
        }
        let result = match self.oracle.latest_price(feed).await {
            Ok(reading) => {
                crate::oracle::ensure_fresh(feed, &reading, now, self.settings.max_price_age)
            }
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            increment_counter(CounterMetric::OracleErrors);
            tracing::warn!(feed = %feed, error = %e, "Price unavailable, skipping feed");
        }
        cache.insert(feed.clone(), result.clone());
        result
    }

    /// Active loans currently below strike, at most the configured batch size.
    ///
    /// Spot is read once per listed feed outside the lock; the active set is then walked in
    /// id order and the walk stops as soon as the batch is full.
    pub async fn check(&self) -> UpkeepCheck {
        let feeds: Vec<(AssetId, FeedId)> = {
            let store = self.store.lock().await;
            if store.ledger().active_count() == 0 {
                return UpkeepCheck::default();
            }
            store
                .assets()
                .map(|asset| (asset.token.clone(), asset.price_feed.clone()))
                .collect()
        };

        let now = self.clock.now();
        let mut cache = PriceCache::new();
        let mut spots: HashMap<AssetId, Price> = HashMap::new();
        for (token, feed) in feeds {
            if let Ok(price) = self.cached_spot(&mut cache, &feed, now).await {
                spots.insert(token, price);
            }
        }
        if spots.is_empty() {
            return UpkeepCheck::default();
        }

        let loan_ids: Vec<LoanId> = {
            let store = self.store.lock().await;
            store
                .ledger()
                .active_loans()
                .filter(|loan| {
                    spots
                        .get(&loan.stock_token)
                        .is_some_and(|price| loan.is_exercisable(*price))
                })
                .map(|loan| loan.id)
                .take(self.settings.exercise_batch_size)
                .collect()
        };

        UpkeepCheck {
            needed: !loan_ids.is_empty(),
            loan_ids,
        }
    }

    /// Exercise every listed loan still exercisable at the current price, in ascending id
    /// order. Ineligible loans are skipped; one loan's failure does not stop the batch.
    pub async fn perform(&self, loan_ids: &[LoanId]) -> Vec<Settlement> {
        let mut ids = loan_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        let mut store = self.store.lock().await;
        let now = self.clock.now();
        let mut cache = PriceCache::new();
        let mut settlements = Vec::new();

        for loan_id in ids {
            match self.exercise_locked(&mut store, &mut cache, loan_id, now).await {
                Ok(settlement) => settlements.push(settlement),
                Err(ProtocolError::LoanNotActive(_)) | Err(ProtocolError::NotExercisable { .. }) => {
                    tracing::debug!(loan_id, "Loan not exercisable, skipped");
                }
                Err(e) => {
                    tracing::warn!(loan_id, error = %e, "Exercise skipped");
                }
            }
        }

        if !settlements.is_empty() {
            publish_gauges(&store);
        }
        settlements
    }

    /// Exercise one loan, failing instead of skipping when it is not eligible
    pub async fn exercise_put(&self, loan_id: LoanId) -> Result<Settlement, ProtocolError> {
        let mut store = self.store.lock().await;
        let now = self.clock.now();
        let mut cache = PriceCache::new();
        let settlement = self
            .exercise_locked(&mut store, &mut cache, loan_id, now)
            .await?;
        publish_gauges(&store);
        Ok(settlement)
    }

    async fn exercise_locked(
        &self,
        store: &mut LedgerStore,
        cache: &mut PriceCache,
        loan_id: LoanId,
        now: DateTime<Utc>,
    ) -> Result<Settlement, ProtocolError> {
        let loan = store
            .ledger()
            .get(loan_id)
            .cloned()
            .ok_or(ProtocolError::LoanNotFound(loan_id))?;
        if !loan.is_active() {
            return Err(ProtocolError::LoanNotActive(loan_id));
        }
        let feed = store
            .asset(&loan.stock_token)
            .map(|asset| asset.price_feed.clone())
            .ok_or_else(|| ProtocolError::AssetNotSupported(loan.stock_token.clone()))?;

        let price = self.cached_spot(cache, &feed, now).await?;
        if !loan.is_exercisable(price) {
            return Err(ProtocolError::NotExercisable {
                loan_id,
                price,
                strike: loan.put_strike,
            });
        }
        let intrinsic = loan.intrinsic_value(price)?;

        let payout = store.fund_mut().payout(intrinsic);
        store.ledger_mut().mark_exercised(loan_id, payout.paid)?;

        let legs = [
            Leg::push(
                &loan.stock_token,
                &self.settings.vault,
                &self.settings.treasury,
                loan.collateral_amount.raw(),
            ),
            Leg::push(
                &self.settings.stablecoin,
                &self.settings.vault,
                &self.settings.treasury,
                payout.paid.raw(),
            ),
        ];
        if let Err(err) = settle(self.tokens.as_ref(), &legs).await {
            store.ledger_mut().restore(loan_id)?;
            store.fund_mut().refund(&payout)?;
            return Err(err.into());
        }

        store.record(
            now,
            ProtocolEvent::PutOptionExercised {
                loan_id,
                protection_payout: payout.paid,
                requested_payout: payout.requested,
                current_price: price,
                put_strike: loan.put_strike,
            },
        );
        increment_counter(CounterMetric::PutsExercised);
        if payout.is_partial() {
            increment_counter(CounterMetric::PartialPayouts);
            tracing::warn!(
                loan_id,
                requested = %payout.requested,
                paid = %payout.paid,
                "Protection fund short, partial payout"
            );
        }
        tracing::info!(
            loan_id,
            price = %price,
            strike = %loan.put_strike,
            payout = %payout.paid,
            "Put exercised"
        );

        Ok(Settlement {
            loan_id,
            payout,
            current_price: price,
            put_strike: loan.put_strike,
        })
    }
}
