//! Lending protocol
//!
//! Public API over the ledger store: asset listing, loan creation and repayment, the
//! protection fund, and the check/perform exercise pair. Every state-changing call holds
//! the store lock from validation through its token transfers, so calls are linearized.
//! State is updated before transfers run; a failed transfer rolls the state back.

mod exercise;
mod settlement;
mod types;

pub use types::{
    AssetListing, EventRecord, LoanQuote, LoanRequest, ProtocolError, ProtocolEvent,
    ProtocolSettings, ProtocolStats, Settlement, UpkeepCheck,
};

use crate::allocation::{max_borrow, LoanTerms, YieldAllocator};
use crate::clock::Clock;
use crate::fixed::{Price, StableAmount};
use crate::ids::{AccountId, AssetId};
use crate::ledger::{Loan, LoanId, LoanStatus, LoanView, StockAsset};
use crate::oracle::{ensure_fresh, PriceOracle, VolatilityFeed};
use crate::pricing::{PutParams, PutPricer};
use crate::store::LedgerStore;
use crate::telemetry::{
    increment_counter, record_latency, set_amount_gauge, set_gauge, CounterMetric, GaugeMetric,
    LatencyMetric,
};
use crate::token::TokenLedger;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use settlement::{settle, Leg};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

/// Stock-collateralized lending with embedded put protection
pub struct Protocol {
    settings: ProtocolSettings,
    allocator: YieldAllocator,
    oracle: Arc<dyn PriceOracle>,
    volatility: Arc<dyn VolatilityFeed>,
    tokens: Arc<dyn TokenLedger>,
    clock: Arc<dyn Clock>,
    store: Mutex<LedgerStore>,
}

impl Protocol {
    pub fn new(
        settings: ProtocolSettings,
        oracle: Arc<dyn PriceOracle>,
        volatility: Arc<dyn VolatilityFeed>,
        tokens: Arc<dyn TokenLedger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let allocator = YieldAllocator::new(settings.policy.clone());
        Self {
            settings,
            allocator,
            oracle,
            volatility,
            tokens,
            clock,
            store: Mutex::new(LedgerStore::new()),
        }
    }

    pub fn settings(&self) -> &ProtocolSettings {
        &self.settings
    }

    fn ensure_owner(&self, caller: &AccountId) -> Result<(), ProtocolError> {
        if caller != &self.settings.owner {
            return Err(ProtocolError::NotOwner(caller.clone()));
        }
        Ok(())
    }

    fn validate_listing(&self, listing: &AssetListing) -> Result<(), ProtocolError> {
        if listing.ltv.get() == 0 || listing.ltv > self.settings.max_ltv {
            return Err(ProtocolError::InvalidLtv {
                ltv: listing.ltv,
                max: self.settings.max_ltv,
            });
        }
        if listing.use_real_volatility && listing.volatility_feed.is_none() {
            return Err(ProtocolError::MissingVolatilityFeed(listing.token.clone()));
        }
        Ok(())
    }

    /// List a new collateral asset. Owner only.
    pub async fn add_asset(
        &self,
        caller: &AccountId,
        listing: AssetListing,
    ) -> Result<(), ProtocolError> {
        self.ensure_owner(caller)?;
        self.validate_listing(&listing)?;

        let mut store = self.store.lock().await;
        if store.asset(&listing.token).is_some() {
            return Err(ProtocolError::AssetAlreadyListed(listing.token));
        }
        let event = ProtocolEvent::AssetAdded {
            token: listing.token.clone(),
            ltv: listing.ltv,
            use_real_volatility: listing.use_real_volatility,
        };
        tracing::info!(token = %listing.token, ltv = %listing.ltv, "Asset added");
        store.put_asset(StockAsset {
            token: listing.token,
            price_feed: listing.price_feed,
            volatility_feed: listing.volatility_feed,
            ltv: listing.ltv,
            is_active: true,
            use_real_volatility: listing.use_real_volatility,
        });
        store.record(self.clock.now(), event);
        Ok(())
    }

    /// Change feeds, LTV or volatility source of a listed asset. Owner only.
    /// Existing loans keep the terms they were created with.
    pub async fn update_asset(
        &self,
        caller: &AccountId,
        listing: AssetListing,
    ) -> Result<(), ProtocolError> {
        self.ensure_owner(caller)?;
        self.validate_listing(&listing)?;

        let mut store = self.store.lock().await;
        let is_active = lookup_asset(&store, &listing.token)?.is_active;
        let event = ProtocolEvent::AssetUpdated {
            token: listing.token.clone(),
            ltv: listing.ltv,
            is_active,
        };
        store.put_asset(StockAsset {
            token: listing.token,
            price_feed: listing.price_feed,
            volatility_feed: listing.volatility_feed,
            ltv: listing.ltv,
            is_active,
            use_real_volatility: listing.use_real_volatility,
        });
        store.record(self.clock.now(), event);
        Ok(())
    }

    /// Enable or disable new loans against `token`. Owner only.
    pub async fn set_asset_active(
        &self,
        caller: &AccountId,
        token: &AssetId,
        active: bool,
    ) -> Result<(), ProtocolError> {
        self.ensure_owner(caller)?;

        let mut store = self.store.lock().await;
        let asset = store
            .asset_mut(token)
            .ok_or_else(|| ProtocolError::AssetNotSupported(token.clone()))?;
        asset.is_active = active;
        let event = ProtocolEvent::AssetUpdated {
            token: token.clone(),
            ltv: asset.ltv,
            is_active: active,
        };
        store.record(self.clock.now(), event);
        tracing::info!(token = %token, active, "Asset status changed");
        Ok(())
    }

    pub async fn asset(&self, token: &AssetId) -> Option<StockAsset> {
        self.store.lock().await.asset(token).cloned()
    }

    async fn spot(&self, asset: &StockAsset, now: DateTime<Utc>) -> Result<Price, ProtocolError> {
        let reading = self.oracle.latest_price(&asset.price_feed).await?;
        Ok(ensure_fresh(
            &asset.price_feed,
            &reading,
            now,
            self.settings.max_price_age,
        )?)
    }

    /// Feed volatility when the asset opts in and the feed answers, else the default
    async fn volatility_for(&self, asset: &StockAsset) -> Decimal {
        let default = self.settings.default_volatility;
        let feed = match (&asset.volatility_feed, asset.use_real_volatility) {
            (Some(feed), true) => feed,
            _ => return default,
        };
        match self.volatility.latest_volatility(feed).await {
            Ok(reading) if reading.volatility > Decimal::ZERO => reading.volatility,
            Ok(reading) => {
                tracing::warn!(
                    feed = %feed,
                    volatility = %reading.volatility,
                    "Non-positive volatility, using default"
                );
                default
            }
            Err(e) => {
                tracing::warn!(feed = %feed, error = %e, "Volatility feed failed, using default");
                default
            }
        }
    }

    async fn quote(
        &self,
        asset: &StockAsset,
        request: &LoanRequest,
        now: DateTime<Utc>,
    ) -> Result<LoanQuote, ProtocolError> {
        if !asset.is_active {
            return Err(ProtocolError::AssetInactive(asset.token.clone()));
        }
        if request.collateral_amount.is_zero() || request.loan_amount.is_zero() {
            return Err(ProtocolError::ZeroAmount);
        }

        let spot = self.spot(asset, now).await?;
        let volatility = self.volatility_for(asset).await;
        let collateral_value = spot.value_of(request.collateral_amount)?;
        let allocation = self.allocator.allocate(&LoanTerms {
            loan_amount: request.loan_amount,
            duration_secs: request.duration_secs,
            spot,
            volatility,
            collateral_value,
            ltv: asset.ltv,
        })?;

        let repayment_due = request
            .loan_amount
            .checked_add(allocation.target_yield)?
            .checked_add(allocation.protocol_fee)?;
        let expiration = i64::try_from(request.duration_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|d| now.checked_add_signed(d))
            .ok_or(ProtocolError::DurationOutOfRange {
                duration_secs: request.duration_secs,
                min_secs: self.settings.policy.min_duration_secs,
                max_secs: self.settings.policy.max_duration_secs,
            })?;

        Ok(LoanQuote {
            spot,
            volatility,
            collateral_value,
            max_borrow: max_borrow(collateral_value, asset.ltv)?,
            allocation,
            repayment_due,
            expiration,
        })
    }

    /// Loan economics at current prices without opening a loan
    pub async fn preview_loan(&self, request: &LoanRequest) -> Result<LoanQuote, ProtocolError> {
        let asset = lookup_asset(&*self.store.lock().await, &request.stock_token)?;
        self.quote(&asset, request, self.clock.now()).await
    }

    /// Open a loan: escrow the collateral and disburse the stablecoin
    pub async fn create_loan(
        &self,
        borrower: &AccountId,
        request: LoanRequest,
    ) -> Result<LoanId, ProtocolError> {
        let started = Instant::now();
        let mut store = self.store.lock().await;
        let now = self.clock.now();
        let asset = lookup_asset(&store, &request.stock_token)?;
        let quote = self.quote(&asset, &request, now).await?;
        let allocation = quote.allocation;

        let loan_id = store.ledger_mut().open(Loan {
            id: 0,
            borrower: borrower.clone(),
            stock_token: request.stock_token.clone(),
            collateral_amount: request.collateral_amount,
            loan_amount: request.loan_amount,
            put_strike: allocation.optimal_strike,
            put_premium: allocation.actual_premium,
            created_at: now,
            expiration: quote.expiration,
            base_yield: allocation.base_yield,
            premium_yield: allocation.premium_yield,
            target_yield: allocation.target_yield,
            protocol_fee: allocation.protocol_fee,
            status: LoanStatus::Active,
            creation_price: quote.spot,
            volatility_used: quote.volatility,
            protection_payout: StableAmount::ZERO,
        });

        let legs = [
            Leg::pull(
                &request.stock_token,
                borrower,
                &self.settings.vault,
                request.collateral_amount.raw(),
            ),
            Leg::pull(
                &self.settings.stablecoin,
                &self.settings.treasury,
                borrower,
                request.loan_amount.raw(),
            ),
        ];
        if let Err(err) = settle(self.tokens.as_ref(), &legs).await {
            store.ledger_mut().unwind_open(loan_id);
            tracing::warn!(borrower = %borrower, error = %err, "Loan creation rolled back");
            return Err(err.into());
        }

        store.record(
            now,
            ProtocolEvent::LoanCreated {
                loan_id,
                borrower: borrower.clone(),
                stock_token: request.stock_token.clone(),
                collateral_amount: request.collateral_amount,
                loan_amount: request.loan_amount,
                put_strike: allocation.optimal_strike,
                expiration: quote.expiration,
            },
        );
        store.record(
            now,
            ProtocolEvent::YieldCalculated {
                loan_id,
                budget_prime: allocation.budget_prime,
                base_yield: allocation.base_yield,
                premium_yield: allocation.premium_yield,
                target_yield: allocation.target_yield,
                put_premium: allocation.actual_premium,
                protocol_fee: allocation.protocol_fee,
            },
        );

        tracing::info!(
            loan_id,
            borrower = %borrower,
            token = %request.stock_token,
            loan_amount = %request.loan_amount,
            strike = %allocation.optimal_strike,
            premium = %allocation.actual_premium,
            "Loan created"
        );
        increment_counter(CounterMetric::LoansCreated);
        record_latency(LatencyMetric::LoanCreation, started.elapsed());
        publish_gauges(&store);
        Ok(loan_id)
    }

    /// Repay principal, target yield and fee; the collateral is returned.
    /// Returns the total paid.
    pub async fn repay_loan(
        &self,
        caller: &AccountId,
        loan_id: LoanId,
    ) -> Result<StableAmount, ProtocolError> {
        let mut store = self.store.lock().await;
        let loan = store
            .ledger()
            .get(loan_id)
            .cloned()
            .ok_or(ProtocolError::LoanNotFound(loan_id))?;
        if &loan.borrower != caller {
            return Err(ProtocolError::NotBorrower {
                loan_id,
                caller: caller.clone(),
            });
        }
        if !loan.is_active() {
            return Err(ProtocolError::LoanNotActive(loan_id));
        }
        let owed_to_lender = loan.loan_amount.checked_add(loan.target_yield)?;
        let total = owed_to_lender.checked_add(loan.protocol_fee)?;

        store.ledger_mut().close_repaid(loan_id)?;
        if let Err(err) = store.fund_mut().accrue_fees(loan.protocol_fee) {
            store.ledger_mut().restore(loan_id)?;
            return Err(err.into());
        }

        let stable = &self.settings.stablecoin;
        let legs = [
            Leg::pull(stable, caller, &self.settings.treasury, owed_to_lender.raw()),
            Leg::pull(stable, caller, &self.settings.vault, loan.protocol_fee.raw()),
            Leg::push(
                &loan.stock_token,
                &self.settings.vault,
                caller,
                loan.collateral_amount.raw(),
            ),
        ];
        if let Err(err) = settle(self.tokens.as_ref(), &legs).await {
            store.ledger_mut().restore(loan_id)?;
            store.fund_mut().reverse_fees(loan.protocol_fee);
            tracing::warn!(loan_id, error = %err, "Repayment rolled back");
            return Err(err.into());
        }

        store.record(
            self.clock.now(),
            ProtocolEvent::LoanRepaid {
                loan_id,
                borrower: caller.clone(),
                amount_paid: total,
                collateral_returned: loan.collateral_amount,
            },
        );
        tracing::info!(loan_id, borrower = %caller, amount = %total, "Loan repaid");
        increment_counter(CounterMetric::LoansRepaid);
        publish_gauges(&store);
        Ok(total)
    }

    /// Loan record with its valuation at the current price
    pub async fn loan_details(&self, loan_id: LoanId) -> Result<LoanView, ProtocolError> {
        let (loan, asset) = {
            let store = self.store.lock().await;
            let loan = store
                .ledger()
                .get(loan_id)
                .cloned()
                .ok_or(ProtocolError::LoanNotFound(loan_id))?;
            let asset = lookup_asset(&store, &loan.stock_token)?;
            (loan, asset)
        };
        let now = self.clock.now();
        let price = self.spot(&asset, now).await?;

        Ok(LoanView {
            intrinsic_value: loan.intrinsic_value(price)?,
            should_exercise: loan.is_exercisable(price),
            is_expired: loan.is_expired(now),
            current_price: price,
            loan,
        })
    }

    pub async fn should_exercise(&self, loan_id: LoanId) -> Result<bool, ProtocolError> {
        Ok(self.loan_details(loan_id).await?.should_exercise)
    }

    /// Stored record without a price read
    pub async fn loan(&self, loan_id: LoanId) -> Option<Loan> {
        self.store.lock().await.ledger().get(loan_id).cloned()
    }

    /// Loan ids of `borrower` in creation order
    pub async fn user_loans(&self, borrower: &AccountId) -> Vec<LoanId> {
        self.store.lock().await.ledger().loans_of(borrower).to_vec()
    }

    pub async fn protocol_stats(&self) -> ProtocolStats {
        let store = self.store.lock().await;
        let fund = store.fund();
        ProtocolStats {
            total_protection_fund: fund.balance(),
            total_protocol_fees: fund.total_fees(),
            available_protocol_fees: fund.available_fees(),
            total_protection_paid: fund.total_paid_out(),
            active_loans: store.ledger().active_count(),
            total_loans: store.ledger().len(),
            base_yield_rate: self.settings.policy.base_yield_rate,
        }
    }

    /// Add `amount` to the protection reserve. Anyone may fund it.
    pub async fn deposit_protection_fund(
        &self,
        from: &AccountId,
        amount: StableAmount,
    ) -> Result<StableAmount, ProtocolError> {
        if amount.is_zero() {
            return Err(ProtocolError::ZeroAmount);
        }
        let mut store = self.store.lock().await;
        let new_balance = store.fund_mut().deposit(amount)?;

        let legs = [Leg::pull(
            &self.settings.stablecoin,
            from,
            &self.settings.vault,
            amount.raw(),
        )];
        if let Err(err) = settle(self.tokens.as_ref(), &legs).await {
            store.fund_mut().reverse_deposit(amount)?;
            return Err(err.into());
        }

        store.record(
            self.clock.now(),
            ProtocolEvent::ProtectionFundDeposited {
                from: from.clone(),
                amount,
                new_balance,
            },
        );
        tracing::info!(from = %from, amount = %amount, balance = %new_balance, "Protection fund deposit");
        publish_gauges(&store);
        Ok(new_balance)
    }

    /// Send collected fees to `to`. Owner only.
    pub async fn withdraw_protocol_fees(
        &self,
        caller: &AccountId,
        amount: StableAmount,
        to: &AccountId,
    ) -> Result<(), ProtocolError> {
        self.ensure_owner(caller)?;
        if amount.is_zero() {
            return Err(ProtocolError::ZeroAmount);
        }
        let mut store = self.store.lock().await;
        store.fund_mut().withdraw_fees(amount)?;

        let legs = [Leg::push(
            &self.settings.stablecoin,
            &self.settings.vault,
            to,
            amount.raw(),
        )];
        if let Err(err) = settle(self.tokens.as_ref(), &legs).await {
            store.fund_mut().restore_fees(amount)?;
            return Err(err.into());
        }

        store.record(
            self.clock.now(),
            ProtocolEvent::ProtocolFeesWithdrawn {
                to: to.clone(),
                amount,
            },
        );
        tracing::info!(to = %to, amount = %amount, "Protocol fees withdrawn");
        publish_gauges(&store);
        Ok(())
    }

    /// Premium of one unit at the configured risk-free rate
    pub fn calculate_put_premium(
        &self,
        spot: Price,
        strike: Price,
        duration_secs: u64,
        volatility: Decimal,
    ) -> Result<Decimal, ProtocolError> {
        let params = PutParams {
            spot: spot.to_decimal()?,
            strike: strike.to_decimal()?,
            time_to_expiry: crate::allocation::year_fraction(duration_secs),
            volatility,
            risk_free_rate: self.settings.policy.risk_free_rate,
        };
        Ok(self.allocator.pricer().put_premium(&params)?)
    }

    /// Ordered event log
    pub async fn events(&self) -> Vec<EventRecord> {
        self.store.lock().await.events().to_vec()
    }
}

fn lookup_asset(store: &LedgerStore, token: &AssetId) -> Result<StockAsset, ProtocolError> {
    store
        .asset(token)
        .cloned()
        .ok_or_else(|| ProtocolError::AssetNotSupported(token.clone()))
}

fn publish_gauges(store: &LedgerStore) {
    set_amount_gauge(GaugeMetric::ProtectionFund, store.fund().balance());
    set_amount_gauge(GaugeMetric::ProtocolFees, store.fund().available_fees());
    set_gauge(GaugeMetric::ActiveLoans, store.ledger().active_count() as f64);
}
