//! Prometheus metrics

use crate::fixed::StableAmount;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Counter metric types
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    /// Loans opened
    LoansCreated,
    /// Loans repaid
    LoansRepaid,
    /// Puts exercised
    PutsExercised,
    /// Exercises paid less than intrinsic value
    PartialPayouts,
    /// Price reads rejected during exercise evaluation
    OracleErrors,
    /// Operations rolled back after a failed transfer
    Rollbacks,
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Protection fund balance
    ProtectionFund,
    /// Fees available for withdrawal
    ProtocolFees,
    /// Active loan count
    ActiveLoans,
}

/// Latency metric types
#[derive(Debug, Clone, Copy)]
pub enum LatencyMetric {
    /// One keeper check/perform pass
    KeeperPass,
    /// Loan creation including the strike search
    LoanCreation,
}

fn counter_name(metric: CounterMetric) -> &'static str {
    match metric {
        CounterMetric::LoansCreated => "stocklend_loans_created_total",
        CounterMetric::LoansRepaid => "stocklend_loans_repaid_total",
        CounterMetric::PutsExercised => "stocklend_puts_exercised_total",
        CounterMetric::PartialPayouts => "stocklend_partial_payouts_total",
        CounterMetric::OracleErrors => "stocklend_oracle_errors_total",
        CounterMetric::Rollbacks => "stocklend_rollbacks_total",
    }
}

fn gauge_name(metric: GaugeMetric) -> &'static str {
    match metric {
        GaugeMetric::ProtectionFund => "stocklend_protection_fund_usd",
        GaugeMetric::ProtocolFees => "stocklend_protocol_fees_usd",
        GaugeMetric::ActiveLoans => "stocklend_active_loans",
    }
}

fn latency_name(metric: LatencyMetric) -> &'static str {
    match metric {
        LatencyMetric::KeeperPass => "stocklend_keeper_pass_latency_ms",
        LatencyMetric::LoanCreation => "stocklend_loan_creation_latency_ms",
    }
}

pub fn increment_counter(metric: CounterMetric) {
    metrics::counter!(counter_name(metric)).increment(1);
}

pub fn set_gauge(metric: GaugeMetric, value: f64) {
    metrics::gauge!(gauge_name(metric)).set(value);
}

/// Set a gauge to a stablecoin amount in whole units
pub fn set_amount_gauge(metric: GaugeMetric, amount: StableAmount) {
    set_gauge(metric, amount.raw() as f64 / StableAmount::SCALE as f64);
}

pub fn record_latency(metric: LatencyMetric, duration: Duration) {
    metrics::histogram!(latency_name(metric)).record(duration.as_secs_f64() * 1000.0);
}

/// Install the Prometheus recorder with an HTTP scrape endpoint on `port`
pub fn init_metrics(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;
    tracing::info!(%addr, "Prometheus metrics exporter started");
    Ok(())
}
