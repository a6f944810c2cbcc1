//! Put exercise through check and perform

use crate::harness::{
    aapl, config, harness, harness_from, harness_with, request, usdc, Harness,
};
use chrono::Duration;
use rust_decimal_macros::dec;
use stock_lend::fixed::{Price, StableAmount, TokenAmount};
use stock_lend::ids::{AccountId, AssetId, FeedId};
use stock_lend::keeper::Keeper;
use stock_lend::ledger::LoanStatus;
use stock_lend::protocol::{ProtocolError, ProtocolEvent};
use stock_lend::token::TokenLedger;
use tokio_test::assert_ok;

const TSLA: &str = r#"
[[assets]]
token = "TSLA"
price = 250.0
ltv_bps = 6000
"#;

fn intrinsic(strike: Price, price: Price, collateral: u64) -> StableAmount {
    strike
        .saturating_sub(price)
        .value_of(TokenAmount::from_units(collateral).unwrap())
        .unwrap()
}

async fn crashed(fund: u64) -> (Harness, u64) {
    let h = harness(fund).await;
    let loan_id = h.open(100, 12_000).await;
    h.set_price("AAPL", dec!(150)).await;
    (h, loan_id)
}

#[tokio::test]
async fn test_check_then_perform_settles_put() {
    let (h, loan_id) = crashed(50_000).await;
    let strike = h.protocol.loan(loan_id).await.unwrap().put_strike;
    let treasury_before = h.stable_of(&h.treasury()).await;

    let check = h.protocol.check().await;
    assert!(check.needed);
    assert_eq!(check.loan_ids, vec![loan_id]);

    let settled = h.protocol.perform(&check.loan_ids).await;
    assert_eq!(settled.len(), 1);
    let expected = intrinsic(strike, Price::from_units(150).unwrap(), 100);
    assert_eq!(settled[0].loan_id, loan_id);
    assert_eq!(settled[0].payout.paid, expected);
    assert!(!settled[0].payout.is_partial());

    let loan = h.protocol.loan(loan_id).await.unwrap();
    assert_eq!(loan.status, LoanStatus::Exercised);
    assert!(loan.put_exercised());
    assert_eq!(loan.protection_payout, expected);

    // Collateral and payout both go to the lender
    assert_eq!(h.collateral_of(&h.treasury()).await, TokenAmount::from_units(100).unwrap());
    assert_eq!(
        h.stable_of(&h.treasury()).await,
        treasury_before.checked_add(expected).unwrap()
    );

    let stats = h.protocol.protocol_stats().await;
    assert_eq!(stats.total_protection_paid, expected);
    assert_eq!(
        stats.total_protection_fund,
        StableAmount::from_units(50_000).unwrap().checked_sub(expected).unwrap()
    );
    assert_eq!(stats.active_loans, 0);
    assert!(!h.protocol.check().await.needed);
}

#[tokio::test]
async fn test_perform_is_idempotent() {
    let (h, loan_id) = crashed(50_000).await;

    let first = h.protocol.perform(&[loan_id, loan_id]).await;
    assert_eq!(first.len(), 1);
    let fund_after = h.protocol.protocol_stats().await.total_protection_fund;

    let second = h.protocol.perform(&[loan_id]).await;
    assert!(second.is_empty());
    assert_eq!(h.protocol.protocol_stats().await.total_protection_fund, fund_after);

    let exercised = h
        .protocol
        .events()
        .await
        .into_iter()
        .filter(|e| matches!(e.event, ProtocolEvent::PutOptionExercised { .. }))
        .count();
    assert_eq!(exercised, 1);
}

#[tokio::test]
async fn test_above_strike_is_not_exercisable() {
    let h = harness(50_000).await;
    let loan_id = h.open(100, 12_000).await;
    h.set_price("AAPL", dec!(195)).await;

    assert!(!h.protocol.check().await.needed);
    assert!(!h.protocol.should_exercise(loan_id).await.unwrap());
    assert!(h.protocol.perform(&[loan_id]).await.is_empty());

    let result = h.protocol.exercise_put(loan_id).await;
    assert!(matches!(result, Err(ProtocolError::NotExercisable { .. })));
    assert!(h.protocol.loan(loan_id).await.unwrap().is_active());
}

#[tokio::test]
async fn test_unknown_loan_skipped_in_batch() {
    let (h, loan_id) = crashed(50_000).await;
    let settled = h.protocol.perform(&[99, loan_id]).await;
    assert_eq!(settled.len(), 1);
    assert_eq!(
        h.protocol.exercise_put(99).await,
        Err(ProtocolError::LoanNotFound(99))
    );
}

#[tokio::test]
async fn test_partial_payouts_in_id_order() {
    let h = harness(1_000).await;
    let first = h.open(100, 12_000).await;
    let second = h.open(100, 12_000).await;
    h.set_price("AAPL", dec!(150)).await;

    // Reported out of order, settled in ascending id order
    let settled = h.protocol.perform(&[second, first]).await;
    let ids: Vec<u64> = settled.iter().map(|s| s.loan_id).collect();
    assert_eq!(ids, vec![first, second]);

    assert_eq!(settled[0].payout.paid, StableAmount::from_units(1_000).unwrap());
    assert!(settled[0].payout.is_partial());
    assert!(settled[1].payout.paid.is_zero());
    assert_eq!(settled[1].payout.shortfall, settled[1].payout.requested);

    let stats = h.protocol.protocol_stats().await;
    assert!(stats.total_protection_fund.is_zero());
    assert_eq!(stats.total_protection_paid, StableAmount::from_units(1_000).unwrap());

    // Both loans close even though the second was paid nothing
    assert_eq!(h.protocol.loan(second).await.unwrap().status, LoanStatus::Exercised);
    assert_eq!(h.collateral_of(&h.treasury()).await, TokenAmount::from_units(200).unwrap());
}

#[tokio::test]
async fn test_repay_wins_race_with_exercise() {
    let (h, loan_id) = crashed(50_000).await;
    let check = h.protocol.check().await;
    assert_eq!(check.loan_ids, vec![loan_id]);

    h.protocol.repay_loan(&h.borrower, loan_id).await.unwrap();
    assert!(h.protocol.perform(&check.loan_ids).await.is_empty());
    assert_eq!(h.protocol.loan(loan_id).await.unwrap().status, LoanStatus::Repaid);
    assert!(h.protocol.protocol_stats().await.total_protection_paid.is_zero());
}

#[tokio::test]
async fn test_exercise_wins_race_with_repay() {
    let (h, loan_id) = crashed(50_000).await;
    let settlement = assert_ok!(h.protocol.exercise_put(loan_id).await);
    assert_eq!(settlement.loan_id, loan_id);

    let repay = h.protocol.repay_loan(&h.borrower, loan_id).await;
    assert_eq!(repay, Err(ProtocolError::LoanNotActive(loan_id)));
    // Collateral stays with the lender
    assert_eq!(h.collateral_of(&h.borrower).await, TokenAmount::from_units(900).unwrap());
}

#[tokio::test]
async fn test_concurrent_repay_and_exercise_settle_once() {
    let (h, loan_id) = crashed(50_000).await;

    let ids = [loan_id];
    let (repay, settled) = tokio::join!(
        h.protocol.repay_loan(&h.borrower, loan_id),
        h.protocol.perform(&ids)
    );

    let loan = h.protocol.loan(loan_id).await.unwrap();
    let stats = h.protocol.protocol_stats().await;
    match repay {
        Ok(_) => {
            assert!(settled.is_empty());
            assert_eq!(loan.status, LoanStatus::Repaid);
            assert!(stats.total_protection_paid.is_zero());
            assert_eq!(h.collateral_of(&h.borrower).await, TokenAmount::from_units(1_000).unwrap());
        }
        Err(err) => {
            assert_eq!(err, ProtocolError::LoanNotActive(loan_id));
            assert_eq!(settled.len(), 1);
            assert_eq!(loan.status, LoanStatus::Exercised);
            assert_eq!(stats.total_protection_paid, settled[0].payout.paid);
        }
    }
    assert_eq!(stats.active_loans, 0);
}

#[tokio::test]
async fn test_failed_payout_leg_rolls_back_exercise() {
    let (h, loan_id) = crashed(50_000).await;
    // Empty the vault's stablecoin so the collateral leg succeeds and the payout leg fails
    let vault = h.vault();
    let held = h.stable_of(&vault).await;
    h.tokens
        .transfer(&usdc(), &vault, &AccountId::from("elsewhere"), held.raw())
        .await
        .unwrap();
    let treasury_before = h.stable_of(&h.treasury()).await;

    assert!(h.protocol.perform(&[loan_id]).await.is_empty());
    let result = h.protocol.exercise_put(loan_id).await;
    assert!(matches!(result, Err(ProtocolError::Transfer(_))));

    assert!(h.protocol.loan(loan_id).await.unwrap().is_active());
    assert_eq!(h.collateral_of(&vault).await, TokenAmount::from_units(100).unwrap());
    assert!(h.collateral_of(&h.treasury()).await.is_zero());
    assert_eq!(h.stable_of(&h.treasury()).await, treasury_before);

    let stats = h.protocol.protocol_stats().await;
    assert!(stats.total_protection_paid.is_zero());
    assert_eq!(stats.total_protection_fund, StableAmount::from_units(50_000).unwrap());
    assert_eq!(stats.active_loans, 1);

    // Once the vault is topped up the same loan settles
    h.tokens.mint(&usdc(), &vault, held.raw()).await.unwrap();
    assert_eq!(h.protocol.perform(&[loan_id]).await.len(), 1);
}

#[tokio::test]
async fn test_exercise_after_expiry() {
    let h = harness(50_000).await;
    let loan_id = h.open(100, 12_000).await;
    h.advance_days(120);
    h.set_price("AAPL", dec!(150)).await;

    let view = h.protocol.loan_details(loan_id).await.unwrap();
    assert!(view.is_expired);
    assert!(view.should_exercise);
    assert_eq!(h.protocol.perform(&[loan_id]).await.len(), 1);
}

#[tokio::test]
async fn test_stale_feed_skips_only_that_asset() {
    let h = harness_with(50_000, TSLA).await;
    let tsla = AssetId::from("TSLA");
    let aapl_loan = h.open(100, 12_000).await;
    let tsla_loan = h
        .protocol
        .create_loan(&h.borrower, request(&tsla, 100, 12_000))
        .await
        .unwrap();

    h.set_price("AAPL", dec!(150)).await;
    let stale_at = h.clock_now() - Duration::hours(2);
    h.feed
        .set_price_at(&FeedId::from("TSLA/USD"), Price::from_units(100).unwrap(), stale_at)
        .await;

    let check = h.protocol.check().await;
    assert_eq!(check.loan_ids, vec![aapl_loan]);

    let settled = h.protocol.perform(&[aapl_loan, tsla_loan]).await;
    assert_eq!(settled.len(), 1);
    assert!(h.protocol.loan(tsla_loan).await.unwrap().is_active());

    let result = h.protocol.exercise_put(tsla_loan).await;
    assert!(matches!(result, Err(ProtocolError::InvalidPriceFeed(_))));

    // Fresh price, the TSLA loan goes through
    h.set_price("TSLA", dec!(100)).await;
    assert_eq!(h.protocol.check().await.loan_ids, vec![tsla_loan]);
    assert_eq!(h.protocol.perform(&[tsla_loan]).await.len(), 1);
}

#[tokio::test]
async fn test_missing_feed_skipped() {
    let h = harness_with(50_000, TSLA).await;
    let tsla = AssetId::from("TSLA");
    let aapl_loan = h.open(100, 12_000).await;
    h.protocol
        .create_loan(&h.borrower, request(&tsla, 100, 12_000))
        .await
        .unwrap();

    h.set_price("AAPL", dec!(150)).await;
    h.feed.remove(&FeedId::from("TSLA/USD")).await;

    assert_eq!(h.protocol.check().await.loan_ids, vec![aapl_loan]);
}

#[tokio::test]
async fn test_check_bounded_by_batch_size() {
    let mut cfg = config(50_000, "");
    cfg.keeper.batch_size = 2;
    let h = harness_from(&cfg).await;
    for _ in 0..3 {
        h.open(100, 12_000).await;
    }
    h.set_price("AAPL", dec!(150)).await;

    let check = h.protocol.check().await;
    assert_eq!(check.loan_ids, vec![1, 2]);
    h.protocol.perform(&check.loan_ids).await;
    assert_eq!(h.protocol.check().await.loan_ids, vec![3]);
}

#[tokio::test]
async fn test_keeper_tick_exercises() {
    let (h, loan_id) = crashed(50_000).await;
    let keeper = Keeper::new(h.protocol.clone(), std::time::Duration::from_secs(30));

    let report = keeper.tick().await;
    assert_eq!(report.checked, 1);
    assert_eq!(report.settled.len(), 1);
    assert_eq!(report.settled[0].loan_id, loan_id);

    let idle = keeper.tick().await;
    assert_eq!(idle.checked, 0);
    assert!(idle.settled.is_empty());
}

#[tokio::test]
async fn test_loan_details_values_put() {
    let (h, loan_id) = crashed(50_000).await;
    let view = h.protocol.loan_details(loan_id).await.unwrap();

    assert_eq!(view.current_price, Price::from_units(150).unwrap());
    assert_eq!(
        view.intrinsic_value,
        intrinsic(view.loan.put_strike, view.current_price, 100)
    );
    assert!(view.should_exercise);
    assert!(!view.is_expired);
    assert_eq!(view.loan.stock_token, aapl());
}
