//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Lifecycle events per action (send, boost, cancel, rejection, mined, ...)
//! - Confirmation checks
//! - Fees paid by mined transactions

use crate::events::TxEvent;

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, CounterVec, Encoder, GaugeVec, TextEncoder,
};

lazy_static! {
    pub static ref TX_EVENTS: CounterVec = register_counter_vec!(
        "tx_booster_events_total",
        "Total lifecycle events by action",
        &["chain_id", "action"]
    ).unwrap();

    pub static ref TX_CHECKS: CounterVec = register_counter_vec!(
        "tx_booster_checks_total",
        "Total confirmation checks by result",
        &["result"]
    ).unwrap();

    pub static ref TX_FEE_PAID: GaugeVec = register_gauge_vec!(
        "tx_booster_last_fee_paid",
        "Fee paid by the most recently mined transaction, in base units",
        &["chain_id"]
    ).unwrap();
}

fn chain_label(chain_id: Option<u64>) -> String {
    chain_id.map(|id| id.to_string()).unwrap_or_else(|| "unknown".to_string())
}

pub fn record_event(event: &TxEvent) {
    TX_EVENTS
        .with_label_values(&[&chain_label(event.chain_id), event.action.name()])
        .inc();
}

pub fn record_check(result: &str) {
    TX_CHECKS.with_label_values(&[result]).inc();
}

pub fn record_fee_paid(chain_id: Option<u64>, fee: f64) {
    TX_FEE_PAID
        .with_label_values(&[&chain_label(chain_id)])
        .set(fee);
}

/// Render all registered metrics in the text exposition format
pub fn gather_text() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
