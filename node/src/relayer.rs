//! # Oracle Relayer
//!
//! Stands in for the external decryption service. On every tick it answers
//! all queued decryption requests, publishes whatever the settlements
//! logged, frees ciphertexts nothing references any more and refreshes the
//! gauges.

use std::time::Duration;

use chrono::Utc;
use tokio::time::MissedTickBehavior;

use umbra_adapters::RelayReport;

use crate::api::AppState;

/// One relay pass plus the bookkeeping around it.
pub fn relay_once(state: &AppState) -> RelayReport {
    let timer = state.metrics.relay_duration_seconds.start_timer();
    let report = state.deployment.relay();
    timer.observe_duration();

    state.metrics.record_report(&report);
    state.publish_events();
    state.deployment.compact();
    state.refresh_gauges();
    report
}

/// Relays every `period` until the task is aborted.
pub async fn run(state: AppState, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        let report = relay_once(&state);
        if report.unknown() > 0 {
            tracing::warn!(
                unknown = report.unknown(),
                "callbacks for ids with no pending entry"
            );
        }

        let overdue = state.deployment.vault.overdue_operations(Utc::now());
        if !overdue.is_empty() {
            tracing::warn!(
                overdue = overdue.len(),
                oldest = %overdue[0].correlation_id,
                "pending operations past their decryption deadline"
            );
        }
    }
}
