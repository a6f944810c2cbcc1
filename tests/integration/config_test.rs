//! Configuration loading

use rust_decimal_macros::dec;
use std::io::Write;
use stock_lend::config::Config;
use stock_lend::fixed::Bps;
use stock_lend::telemetry::LogFormat;
use tokio_test::{assert_err, assert_ok};

#[test]
fn test_config_example_parses() {
    let config: Config = assert_ok!(toml::from_str(include_str!("../../config.toml.example")));
    assert_ok!(config.validate());

    assert_eq!(config.protocol.base_yield_rate, dec!(0.0375));
    assert_eq!(config.protocol.enhancement_fraction, dec!(0.677));
    assert_eq!(config.assets.len(), 2);
    assert_eq!(config.assets[0].feed().as_str(), "AAPL/USD");
    assert_eq!(config.assets[1].volatility, Some(dec!(0.55)));
    assert_eq!(config.telemetry.log_format, LogFormat::Pretty);
}

#[test]
fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
        [protocol]
        max_ltv_bps = 7000
        max_price_age_secs = 120

        [keeper]
        batch_size = 5

        [[assets]]
        token = "NVDA"
        price = 120.5
        ltv_bps = 6500
        "#
    )
    .unwrap();

    let config = assert_ok!(Config::load(file.path()));
    let settings = config.protocol_settings();
    assert_eq!(settings.max_ltv, Bps::new(7000));
    assert_eq!(settings.max_price_age, chrono::Duration::seconds(120));
    assert_eq!(settings.exercise_batch_size, 5);
    assert_eq!(settings.policy.base_yield_rate, dec!(0.0375));
}

#[test]
fn test_load_rejects_invalid() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
        [protocol]
        max_ltv_bps = 7000

        [[assets]]
        token = "NVDA"
        price = 120.5
        ltv_bps = 7500
        "#
    )
    .unwrap();

    let err = assert_err!(Config::load(file.path()));
    assert!(err.to_string().contains("NVDA"), "{}", err);
}

#[test]
fn test_load_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    assert_err!(Config::load(dir.path().join("absent.toml")));
}
