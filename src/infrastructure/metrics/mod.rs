//! Prometheus Metrics Module
//!
//! Application-wide metrics collection.
//!
//! # Metrics Collected
//! - Active WebSocket connection gauges
//! - Chat messages delivered, by ingress transport
//! - Gateway events fanned out to connections

use once_cell::sync::Lazy;
use prometheus::{Encoder, GaugeVec, IntCounterVec, Opts, Registry, TextEncoder};

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// Active WebSocket connections gauge
pub static WEBSOCKET_CONNECTIONS_ACTIVE: Lazy<GaugeVec> = Lazy::new(|| {
    GaugeVec::new(
        Opts::new(
            "websocket_connections_active",
            "Number of active WebSocket connections",
        )
        .namespace("platform_chat"),
        &["state"], // "connected", "identified"
    )
    .expect("Failed to create WEBSOCKET_CONNECTIONS_ACTIVE metric")
});

/// Messages accepted for delivery, by ingress transport
pub static CHAT_MESSAGES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("chat_messages_total", "Total chat messages accepted")
            .namespace("platform_chat"),
        &["transport"], // "gateway", "rest"
    )
    .expect("Failed to create CHAT_MESSAGES_TOTAL metric")
});

/// Events pushed to individual connections during room broadcasts
pub static GATEWAY_EVENTS_DELIVERED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "gateway_events_delivered_total",
            "Events delivered to connections",
        )
        .namespace("platform_chat"),
        &["event"],
    )
    .expect("Failed to create GATEWAY_EVENTS_DELIVERED_TOTAL metric")
});

fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(WEBSOCKET_CONNECTIONS_ACTIVE.clone()))
        .expect("Failed to register WEBSOCKET_CONNECTIONS_ACTIVE");
    registry
        .register(Box::new(CHAT_MESSAGES_TOTAL.clone()))
        .expect("Failed to register CHAT_MESSAGES_TOTAL");
    registry
        .register(Box::new(GATEWAY_EVENTS_DELIVERED_TOTAL.clone()))
        .expect("Failed to register GATEWAY_EVENTS_DELIVERED_TOTAL");
}

/// Collect and encode all metrics as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .expect("Failed to encode metrics");
    String::from_utf8(buffer).expect("Metrics should be valid UTF-8")
}

/// Helper to record an accepted message
pub fn record_message(transport: &str) {
    CHAT_MESSAGES_TOTAL.with_label_values(&[transport]).inc();
}

/// Helpers tracking the WebSocket connection lifecycle
pub fn connection_opened(state: &str) {
    WEBSOCKET_CONNECTIONS_ACTIVE.with_label_values(&[state]).inc();
}

pub fn connection_closed(state: &str) {
    WEBSOCKET_CONNECTIONS_ACTIVE.with_label_values(&[state]).dec();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_metrics() {
        // Labeled collectors emit nothing until a label combination exists.
        connection_opened("connected");
        let metrics = gather_metrics();
        assert!(metrics.contains("websocket_connections_active"));
    }

    #[test]
    fn test_record_message() {
        record_message("rest");
        let metrics = gather_metrics();
        assert!(metrics.contains("chat_messages_total"));
    }
}
