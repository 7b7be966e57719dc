//! # Prometheus Metrics
//!
//! Exposes operational metrics for the vault node. Scraped by Prometheus at
//! the `/metrics` HTTP endpoint on the configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so they
//! do not collide with any default global registry consumers. Counters are
//! fed from the vault's event log and from relay reports; gauges are
//! refreshed from [`umbra_protocol::vault::VaultStatus`] after every pass.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

use umbra_adapters::RelayReport;
use umbra_protocol::vault::VaultStatus;
use umbra_protocol::{Settlement, VaultEvent};

/// Holds all Prometheus metric handles for the node.
#[derive(Clone)]
pub struct NodeMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Accepted requests, by kind (`deposit`, `borrow`, `withdraw`, `repay`).
    pub requests_total: IntCounterVec,
    /// Oracle callbacks, by outcome (`settled`, `rejected`, `unknown`).
    pub settlements_total: IntCounterVec,
    /// Callbacks the vault refused, by error kind.
    pub aborts_total: IntCounterVec,
    /// Operations awaiting decryption.
    pub pending_operations: IntGauge,
    /// Aggregate collateral shares.
    pub total_collateral: IntGauge,
    /// Aggregate debt.
    pub total_debt: IntGauge,
    /// 1 while the vault is paused.
    pub paused: IntGauge,
    /// Wall time of one relay pass in seconds.
    pub relay_duration_seconds: Histogram,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("umbra".into()), None)?;

        let requests_total = IntCounterVec::new(
            Opts::new("requests_total", "Accepted vault requests by kind"),
            &["kind"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let settlements_total = IntCounterVec::new(
            Opts::new("settlements_total", "Decryption callbacks by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(settlements_total.clone()))?;

        let aborts_total = IntCounterVec::new(
            Opts::new("aborts_total", "Callbacks refused by the vault, by error kind"),
            &["error"],
        )?;
        registry.register(Box::new(aborts_total.clone()))?;

        let pending_operations =
            IntGauge::new("pending_operations", "Operations awaiting decryption")?;
        registry.register(Box::new(pending_operations.clone()))?;

        let total_collateral =
            IntGauge::new("total_collateral", "Aggregate collateral shares held")?;
        registry.register(Box::new(total_collateral.clone()))?;

        let total_debt = IntGauge::new("total_debt", "Aggregate outstanding debt")?;
        registry.register(Box::new(total_debt.clone()))?;

        let paused = IntGauge::new("paused", "1 while the vault is paused")?;
        registry.register(Box::new(paused.clone()))?;

        let relay_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("relay_duration_seconds", "Wall time of one relay pass")
                .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 1.0]),
        )?;
        registry.register(Box::new(relay_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            settlements_total,
            aborts_total,
            pending_operations,
            total_collateral,
            total_debt,
            paused,
            relay_duration_seconds,
        })
    }

    /// Counts request events. Settlement events are counted from relay
    /// reports instead, which also see rejections.
    pub fn record_event(&self, event: &VaultEvent) {
        let kind = match event {
            VaultEvent::Deposited { .. } => "deposit",
            VaultEvent::BorrowRequested { .. } => "borrow",
            VaultEvent::WithdrawRequested { .. } => "withdraw",
            VaultEvent::RepayRequested { .. } => "repay",
            _ => return,
        };
        self.requests_total.with_label_values(&[kind]).inc();
    }

    pub fn record_report(&self, report: &RelayReport) {
        for settlement in &report.settlements {
            let outcome = match settlement {
                Settlement::Settled { .. } => "settled",
                Settlement::Rejected { .. } => "rejected",
                Settlement::Unknown { .. } => "unknown",
            };
            self.settlements_total.with_label_values(&[outcome]).inc();
        }
        for failure in &report.failures {
            self.aborts_total
                .with_label_values(&[failure.error.kind()])
                .inc();
        }
    }

    pub fn record_status(&self, status: &VaultStatus) {
        self.pending_operations
            .set(i64::try_from(status.pending_operations).unwrap_or(i64::MAX));
        self.total_collateral
            .set(i64::try_from(status.total_collateral).unwrap_or(i64::MAX));
        self.total_debt
            .set(i64::try_from(status.total_debt).unwrap_or(i64::MAX));
        self.paused.set(i64::from(status.paused));
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared metrics state passed to axum handlers via extension.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use umbra_protocol::Address;

    #[test]
    fn request_events_are_counted_by_kind() {
        let metrics = NodeMetrics::new().unwrap();
        metrics.record_event(&VaultEvent::Deposited {
            participant: Address::from("alice"),
            amount: 5,
            shares: 5,
            at: Utc::now(),
        });
        metrics.record_event(&VaultEvent::Paused {
            by: Address::from("owner"),
            at: Utc::now(),
        });
        assert_eq!(metrics.requests_total.with_label_values(&["deposit"]).get(), 1);
        assert_eq!(metrics.requests_total.with_label_values(&["borrow"]).get(), 0);

        let text = metrics.encode().unwrap();
        assert!(text.contains("umbra_requests_total{kind=\"deposit\"} 1"));
    }
}
