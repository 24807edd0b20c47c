//! # Prometheus Metrics
//!
//! Operational metrics for the escrow node, scraped at `/metrics` on the
//! configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] with
//! the `vaultpay` prefix.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::core::Collector;
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the node.
///
/// Prometheus handles are internally reference-counted, so cloning is cheap.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    pub accounts_registered_total: IntCounter,
    pub logins_total: IntCounter,
    pub escrows_opened_total: IntCounter,
    pub escrows_completed_total: IntCounter,
    pub escrows_cancelled_total: IntCounter,
    /// Minor units currently held in escrow by transactions this process
    /// opened or settled. Resets on restart.
    pub escrowed_minor_units: IntGauge,
    pub active_sessions: IntGauge,
    pub ws_subscribers: IntGauge,
    /// Engine errors returned to clients, by HTTP status.
    pub api_errors_total: IntCounterVec,
    /// Handler latency by operation.
    pub request_latency_seconds: HistogramVec,
}

fn register<C: Collector + Clone + 'static>(
    registry: &Registry,
    collector: C,
) -> Result<C, prometheus::Error> {
    registry.register(Box::new(collector.clone()))?;
    Ok(collector)
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("vaultpay".into()), None)?;

        let counter = |name: &str, help: &str| register(&registry, IntCounter::new(name, help)?);
        let gauge = |name: &str, help: &str| register(&registry, IntGauge::new(name, help)?);

        Ok(Self {
            accounts_registered_total: counter(
                "accounts_registered_total",
                "Accounts created through signup",
            )?,
            logins_total: counter("logins_total", "Successful logins")?,
            escrows_opened_total: counter("escrows_opened_total", "Escrow transactions created")?,
            escrows_completed_total: counter(
                "escrows_completed_total",
                "Escrows released to the receiver",
            )?,
            escrows_cancelled_total: counter(
                "escrows_cancelled_total",
                "Escrows refunded to the sender",
            )?,
            escrowed_minor_units: gauge(
                "escrowed_minor_units",
                "Net minor units placed into escrow since startup",
            )?,
            active_sessions: gauge("active_sessions", "Sessions currently open")?,
            ws_subscribers: gauge("ws_subscribers", "Connected WebSocket subscribers")?,
            api_errors_total: register(
                &registry,
                IntCounterVec::new(
                    Opts::new("api_errors_total", "Error responses by HTTP status"),
                    &["status"],
                )?,
            )?,
            request_latency_seconds: register(
                &registry,
                HistogramVec::new(
                    HistogramOpts::new(
                        "request_latency_seconds",
                        "Engine call latency by operation in seconds",
                    )
                    .buckets(vec![
                        0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
                    ]),
                    &["operation"],
                )?,
            )?,
            registry,
        })
    }

    /// Starts a latency timer for `operation`; observed when dropped.
    pub fn time(&self, operation: &str) -> prometheus::HistogramTimer {
        self.latency(operation).start_timer()
    }

    fn latency(&self, operation: &str) -> Histogram {
        self.request_latency_seconds.with_label_values(&[operation])
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

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(State(metrics): State<SharedMetrics>) -> impl IntoResponse {
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
