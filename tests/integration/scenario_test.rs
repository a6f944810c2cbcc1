//! End-to-end scenarios: quoting, asset administration and funding

use crate::harness::{aapl, harness, harness_with, request, usdc, NINETY_DAYS};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use stock_lend::fixed::{Bps, Price, StableAmount};
use stock_lend::ids::{AccountId, AssetId, FeedId};
use stock_lend::protocol::{AssetListing, ProtocolError};

fn units(amount: StableAmount) -> Decimal {
    amount.to_decimal().unwrap()
}

#[tokio::test]
async fn test_reference_loan_economics() {
    let h = harness(50_000).await;
    let loan_request = request(&aapl(), 100, 12_000);
    let quote = h.protocol.preview_loan(&loan_request).await.unwrap();
    let allocation = quote.allocation;

    assert_eq!(quote.spot, Price::from_units(200).unwrap());
    assert_eq!(quote.volatility, dec!(0.30));
    assert_eq!(quote.collateral_value, StableAmount::from_units(20_000).unwrap());
    assert_eq!(quote.max_borrow, StableAmount::from_units(15_000).unwrap());

    assert!((units(allocation.base_yield) - dec!(110.958904)).abs() < dec!(0.00001));
    assert!((units(allocation.premium_yield) - dec!(75.119178)).abs() < dec!(0.00001));
    assert_eq!(units(allocation.protocol_fee), dec!(30));

    let strike = allocation.optimal_strike.to_decimal().unwrap();
    assert!(strike > dec!(185) && strike < dec!(186.5), "strike {}", strike);
    assert!((units(allocation.actual_premium) - dec!(75.12)).abs() < dec!(0.1));

    let apy = allocation
        .effective_apy(loan_request.loan_amount, NINETY_DAYS)
        .unwrap();
    assert!(apy > dec!(0.0628) && apy < dec!(0.0630), "apy {}", apy);

    // Opening the loan records the quoted terms
    let loan_id = h.open(100, 12_000).await;
    let loan = h.protocol.loan(loan_id).await.unwrap();
    assert_eq!(loan.put_strike, allocation.optimal_strike);
    assert_eq!(loan.target_yield, allocation.target_yield);
    assert_eq!(loan.repayment_due().unwrap(), quote.repayment_due);
    assert_eq!(loan.expiration, quote.expiration);
}

#[tokio::test]
async fn test_preview_has_no_side_effects() {
    let h = harness(50_000).await;
    h.protocol
        .preview_loan(&request(&aapl(), 100, 12_000))
        .await
        .unwrap();

    let stats = h.protocol.protocol_stats().await;
    assert_eq!(stats.total_loans, 0);
    assert_eq!(h.protocol.events().await.len(), 2);
}

#[tokio::test]
async fn test_larger_loan_same_strike_more_premium() {
    let h = harness(50_000).await;
    let small = h
        .protocol
        .preview_loan(&request(&aapl(), 100, 12_000))
        .await
        .unwrap();
    let large = h
        .protocol
        .preview_loan(&request(&aapl(), 100, 15_000))
        .await
        .unwrap();

    let diff = small
        .allocation
        .optimal_strike
        .raw()
        .abs_diff(large.allocation.optimal_strike.raw());
    assert!(diff < 1_000_000);
    assert!((units(large.allocation.actual_premium) - dec!(93.9)).abs() < dec!(0.2));
}

#[tokio::test]
async fn test_duration_limits() {
    let h = harness(50_000).await;
    let mut short = request(&aapl(), 100, 12_000);
    short.duration_secs = 6 * 86_400;
    assert!(matches!(
        h.protocol.preview_loan(&short).await,
        Err(ProtocolError::DurationOutOfRange { .. })
    ));

    let mut long = request(&aapl(), 100, 12_000);
    long.duration_secs = 366 * 86_400;
    assert!(matches!(
        h.protocol.create_loan(&h.borrower, long).await,
        Err(ProtocolError::DurationOutOfRange { .. })
    ));
}

#[tokio::test]
async fn test_zero_amounts_rejected() {
    let h = harness(50_000).await;
    let zero_loan = h
        .protocol
        .preview_loan(&request(&aapl(), 100, 0))
        .await;
    assert_eq!(zero_loan, Err(ProtocolError::ZeroAmount));

    let zero_collateral = h
        .protocol
        .preview_loan(&request(&aapl(), 0, 12_000))
        .await;
    assert_eq!(zero_collateral, Err(ProtocolError::ZeroAmount));
}

#[tokio::test]
async fn test_asset_administration() {
    let h = harness(50_000).await;
    let owner = h.owner();
    let msft = AssetId::from("MSFT");
    let listing = AssetListing {
        token: msft.clone(),
        price_feed: FeedId::from("MSFT/USD"),
        volatility_feed: None,
        ltv: Bps::new(7000),
        use_real_volatility: false,
    };

    let denied = h.protocol.add_asset(&h.borrower, listing.clone()).await;
    assert!(matches!(denied, Err(ProtocolError::NotOwner(_))));

    let too_high = AssetListing {
        ltv: Bps::new(9000),
        ..listing.clone()
    };
    assert!(matches!(
        h.protocol.add_asset(&owner, too_high).await,
        Err(ProtocolError::InvalidLtv { .. })
    ));

    let no_feed = AssetListing {
        use_real_volatility: true,
        ..listing.clone()
    };
    assert!(matches!(
        h.protocol.add_asset(&owner, no_feed).await,
        Err(ProtocolError::MissingVolatilityFeed(_))
    ));

    h.protocol.add_asset(&owner, listing.clone()).await.unwrap();
    assert!(matches!(
        h.protocol.add_asset(&owner, listing.clone()).await,
        Err(ProtocolError::AssetAlreadyListed(_))
    ));

    let updated = AssetListing {
        ltv: Bps::new(5000),
        ..listing
    };
    h.protocol.update_asset(&owner, updated).await.unwrap();
    assert_eq!(h.protocol.asset(&msft).await.unwrap().ltv, Bps::new(5000));

    let unknown = h
        .protocol
        .preview_loan(&request(&AssetId::from("NFLX"), 10, 1_000))
        .await;
    assert!(matches!(unknown, Err(ProtocolError::AssetNotSupported(_))));
}

#[tokio::test]
async fn test_inactive_asset_blocks_new_loans_only() {
    let h = harness(50_000).await;
    let loan_id = h.open(100, 12_000).await;
    h.protocol
        .set_asset_active(&h.owner(), &aapl(), false)
        .await
        .unwrap();

    let blocked = h
        .protocol
        .create_loan(&h.borrower, request(&aapl(), 100, 12_000))
        .await;
    assert!(matches!(blocked, Err(ProtocolError::AssetInactive(_))));

    // Existing loans still repay and exercise
    h.protocol.repay_loan(&h.borrower, loan_id).await.unwrap();

    h.protocol
        .set_asset_active(&h.owner(), &aapl(), true)
        .await
        .unwrap();
    h.open(100, 12_000).await;
}

#[tokio::test]
async fn test_feed_volatility_used_when_enabled() {
    let h = harness_with(
        50_000,
        r#"
        [[assets]]
        token = "TSLA"
        price = 200.0
        ltv_bps = 7500
        volatility = 0.60
        "#,
    )
    .await;
    let tsla = AssetId::from("TSLA");

    let calm = h.protocol.preview_loan(&request(&aapl(), 100, 12_000)).await.unwrap();
    let wild = h.protocol.preview_loan(&request(&tsla, 100, 12_000)).await.unwrap();
    assert_eq!(wild.volatility, dec!(0.60));
    // Same budget buys a lower strike when volatility is higher
    assert!(wild.allocation.optimal_strike < calm.allocation.optimal_strike);

    // A failing volatility feed falls back to the default
    h.feed.remove(&FeedId::from("TSLA/USD")).await;
    h.set_price("TSLA", dec!(200)).await;
    let fallback = h.protocol.preview_loan(&request(&tsla, 100, 12_000)).await.unwrap();
    assert_eq!(fallback.volatility, dec!(0.30));
}

#[tokio::test]
async fn test_stale_price_blocks_creation() {
    let h = harness(50_000).await;
    h.advance_days(1);

    let result = h
        .protocol
        .create_loan(&h.borrower, request(&aapl(), 100, 12_000))
        .await;
    assert!(matches!(result, Err(ProtocolError::InvalidPriceFeed(_))));

    h.set_price("AAPL", dec!(200)).await;
    h.open(100, 12_000).await;
}

#[tokio::test]
async fn test_anyone_funds_protection() {
    let h = harness(0).await;
    let donor = AccountId::from("donor");
    h.tokens
        .mint(&usdc(), &donor, StableAmount::from_units(500).unwrap().raw())
        .await
        .unwrap();

    let balance = h
        .protocol
        .deposit_protection_fund(&donor, StableAmount::from_units(500).unwrap())
        .await
        .unwrap();
    assert_eq!(balance, StableAmount::from_units(500).unwrap());

    // More than the donor holds
    let short = h
        .protocol
        .deposit_protection_fund(&donor, StableAmount::from_units(1).unwrap())
        .await;
    assert!(matches!(short, Err(ProtocolError::Transfer(_))));
    assert_eq!(
        h.protocol.protocol_stats().await.total_protection_fund,
        StableAmount::from_units(500).unwrap()
    );

    assert_eq!(
        h.protocol
            .deposit_protection_fund(&donor, StableAmount::ZERO)
            .await,
        Err(ProtocolError::ZeroAmount)
    );
}

#[tokio::test]
async fn test_calculate_put_premium() {
    let h = harness(0).await;
    let spot = Price::from_units(200).unwrap();

    let otm = h
        .protocol
        .calculate_put_premium(spot, Price::from_units(180).unwrap(), NINETY_DAYS, dec!(0.3))
        .unwrap();
    let atm = h
        .protocol
        .calculate_put_premium(spot, spot, NINETY_DAYS, dec!(0.3))
        .unwrap();
    assert!(otm > Decimal::ZERO && otm < atm);

    let expired = h
        .protocol
        .calculate_put_premium(spot, Price::from_units(210).unwrap(), 0, dec!(0.3))
        .unwrap();
    assert!((expired - dec!(10)).abs() < dec!(0.000001), "expired {}", expired);
}
