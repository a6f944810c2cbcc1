//! Loan creation and repayment

use crate::harness::{aapl, harness, request, usdc};
use stock_lend::fixed::{StableAmount, TokenAmount};
use stock_lend::ids::AccountId;
use stock_lend::ledger::LoanStatus;
use stock_lend::protocol::{ProtocolError, ProtocolEvent};
use stock_lend::token::TokenLedger;

#[tokio::test]
async fn test_create_escrows_collateral_and_disburses_loan() {
    let h = harness(50_000).await;
    let treasury_before = h.stable_of(&h.treasury()).await;

    let loan_id = h.open(100, 12_000).await;
    assert_eq!(loan_id, 1);

    let loan = h.protocol.loan(loan_id).await.unwrap();
    assert_eq!(loan.status, LoanStatus::Active);
    assert_eq!(loan.borrower, h.borrower);
    assert!(loan.put_strike < loan.creation_price);

    assert_eq!(h.collateral_of(&h.borrower).await, TokenAmount::from_units(900).unwrap());
    assert_eq!(h.collateral_of(&h.vault()).await, TokenAmount::from_units(100).unwrap());
    assert_eq!(
        h.stable_of(&h.borrower).await,
        StableAmount::from_units(112_000).unwrap()
    );
    assert_eq!(
        treasury_before.checked_sub(h.stable_of(&h.treasury()).await).unwrap(),
        StableAmount::from_units(12_000).unwrap()
    );
    assert_eq!(h.protocol.user_loans(&h.borrower).await, vec![loan_id]);
}

#[tokio::test]
async fn test_repay_round_trip() {
    let h = harness(50_000).await;
    let treasury_start = h.stable_of(&h.treasury()).await;
    let loan_id = h.open(100, 12_000).await;
    let loan = h.protocol.loan(loan_id).await.unwrap();

    h.advance_days(30);
    let paid = h.protocol.repay_loan(&h.borrower, loan_id).await.unwrap();
    assert_eq!(paid, loan.repayment_due().unwrap());

    let loan = h.protocol.loan(loan_id).await.unwrap();
    assert_eq!(loan.status, LoanStatus::Repaid);
    assert_eq!(h.collateral_of(&h.borrower).await, TokenAmount::from_units(1_000).unwrap());
    assert!(h.collateral_of(&h.vault()).await.is_zero());

    // Lender receives principal plus target yield, the vault keeps the fee
    assert_eq!(
        h.stable_of(&h.treasury()).await,
        treasury_start.checked_add(loan.target_yield).unwrap()
    );
    let stats = h.protocol.protocol_stats().await;
    assert_eq!(stats.total_protocol_fees, loan.protocol_fee);
    assert_eq!(stats.available_protocol_fees, loan.protocol_fee);
    assert_eq!(stats.active_loans, 0);
    assert_eq!(stats.total_loans, 1);
    assert_eq!(
        h.stable_of(&h.vault()).await,
        StableAmount::from_units(50_000)
            .unwrap()
            .checked_add(loan.protocol_fee)
            .unwrap()
    );
}

#[tokio::test]
async fn test_repay_twice_fails() {
    let h = harness(50_000).await;
    let loan_id = h.open(100, 12_000).await;
    h.protocol.repay_loan(&h.borrower, loan_id).await.unwrap();

    let again = h.protocol.repay_loan(&h.borrower, loan_id).await;
    assert_eq!(again, Err(ProtocolError::LoanNotActive(loan_id)));
}

#[tokio::test]
async fn test_only_borrower_repays() {
    let h = harness(50_000).await;
    let loan_id = h.open(100, 12_000).await;

    let mallory = AccountId::from("mallory");
    let result = h.protocol.repay_loan(&mallory, loan_id).await;
    assert!(matches!(result, Err(ProtocolError::NotBorrower { .. })));
    assert!(h.protocol.loan(loan_id).await.unwrap().is_active());
}

#[tokio::test]
async fn test_ltv_exceeded_leaves_no_trace() {
    let h = harness(50_000).await;

    // 100 tokens at $200 and 75% LTV allow $15,000
    let result = h
        .protocol
        .create_loan(&h.borrower, request(&aapl(), 100, 15_001))
        .await;
    assert!(matches!(result, Err(ProtocolError::LtvExceeded { .. })));
    assert_eq!(h.protocol.protocol_stats().await.total_loans, 0);
    assert_eq!(h.collateral_of(&h.borrower).await, TokenAmount::from_units(1_000).unwrap());
}

#[tokio::test]
async fn test_failed_disbursement_rolls_back_collateral() {
    let h = harness(50_000).await;
    // Drain the treasury so the stablecoin leg fails after collateral moved
    let treasury = h.treasury();
    let liquidity = h.stable_of(&treasury).await;
    h.tokens
        .transfer(&usdc(), &treasury, &AccountId::from("elsewhere"), liquidity.raw())
        .await
        .unwrap();

    let result = h
        .protocol
        .create_loan(&h.borrower, request(&aapl(), 100, 12_000))
        .await;
    assert!(matches!(result, Err(ProtocolError::Transfer(_))));

    assert_eq!(h.collateral_of(&h.borrower).await, TokenAmount::from_units(1_000).unwrap());
    assert!(h.collateral_of(&h.vault()).await.is_zero());
    assert_eq!(h.protocol.protocol_stats().await.total_loans, 0);
    assert!(h.protocol.user_loans(&h.borrower).await.is_empty());

    // Ids are not consumed by a rolled back loan
    h.tokens.mint(&usdc(), &treasury, liquidity.raw()).await.unwrap();
    assert_eq!(h.open(100, 12_000).await, 1);
}

#[tokio::test]
async fn test_failed_repayment_rolls_back() {
    let h = harness(50_000).await;
    let loan_id = h.open(100, 12_000).await;
    let loan = h.protocol.loan(loan_id).await.unwrap();

    // Leave the borrower enough for principal and yield but not the fee
    let keep = loan.loan_amount.checked_add(loan.target_yield).unwrap();
    let balance = h.stable_of(&h.borrower).await;
    let excess = balance.checked_sub(keep).unwrap();
    h.tokens
        .transfer(&usdc(), &h.borrower, &AccountId::from("elsewhere"), excess.raw())
        .await
        .unwrap();
    let treasury_before = h.stable_of(&h.treasury()).await;

    let result = h.protocol.repay_loan(&h.borrower, loan_id).await;
    assert!(matches!(result, Err(ProtocolError::Transfer(_))));

    assert!(h.protocol.loan(loan_id).await.unwrap().is_active());
    assert_eq!(h.stable_of(&h.borrower).await, keep);
    assert_eq!(h.stable_of(&h.treasury()).await, treasury_before);
    assert!(h.protocol.protocol_stats().await.total_protocol_fees.is_zero());
    assert_eq!(h.collateral_of(&h.vault()).await, TokenAmount::from_units(100).unwrap());
}

#[tokio::test]
async fn test_events_record_lifecycle_in_order() {
    let h = harness(50_000).await;
    let loan_id = h.open(100, 12_000).await;
    h.protocol.repay_loan(&h.borrower, loan_id).await.unwrap();

    let events = h.protocol.events().await;
    let sequences: Vec<u64> = events.iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, (1..=events.len() as u64).collect::<Vec<_>>());

    let kinds: Vec<&str> = events
        .iter()
        .map(|e| match &e.event {
            ProtocolEvent::AssetAdded { .. } => "asset_added",
            ProtocolEvent::ProtectionFundDeposited { .. } => "deposit",
            ProtocolEvent::LoanCreated { .. } => "created",
            ProtocolEvent::YieldCalculated { .. } => "yield",
            ProtocolEvent::LoanRepaid { .. } => "repaid",
            _ => "other",
        })
        .collect();
    assert_eq!(kinds, vec!["asset_added", "deposit", "created", "yield", "repaid"]);

    // Token amounts exceed u64, so go through the text form rather than to_value
    let text = serde_json::to_string(&events[4]).unwrap();
    assert!(text.contains("\"collateral_returned\":100000000000000000000"), "{}", text);
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(json["event"], "LoanRepaid");
    assert_eq!(json["sequence"], 5);
}

#[tokio::test]
async fn test_withdraw_fees_owner_only() {
    let h = harness(50_000).await;
    let loan_id = h.open(100, 12_000).await;
    h.protocol.repay_loan(&h.borrower, loan_id).await.unwrap();
    let fee = h.protocol.loan(loan_id).await.unwrap().protocol_fee;

    let to = AccountId::from("ops");
    let denied = h.protocol.withdraw_protocol_fees(&h.borrower, fee, &to).await;
    assert!(matches!(denied, Err(ProtocolError::NotOwner(_))));

    let too_much = fee.checked_add(StableAmount::from_raw(1)).unwrap();
    let over = h.protocol.withdraw_protocol_fees(&h.owner(), too_much, &to).await;
    assert!(matches!(over, Err(ProtocolError::InsufficientFees { .. })));

    h.protocol
        .withdraw_protocol_fees(&h.owner(), fee, &to)
        .await
        .unwrap();
    assert_eq!(h.stable_of(&to).await, fee);
    let stats = h.protocol.protocol_stats().await;
    assert!(stats.available_protocol_fees.is_zero());
    assert_eq!(stats.total_protocol_fees, fee);
    // Withdrawal never touches the reserve
    assert_eq!(stats.total_protection_fund, StableAmount::from_units(50_000).unwrap());
}
