#![forbid(unsafe_code)]

//! Conga telemetry.
//!
//! - [`init_tracing`] installs a `tracing-subscriber` fmt subscriber.
//! - [`RoutingMetrics`] turns [`RoutingEvent`]s into Prometheus counters kept in a private
//!   registry, so several switches in one process never collide.

use std::str::FromStr;

use anyhow::Context;
use conga_routing::{RoutingEvent, RoutingObserver};
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use serde::{Deserialize, Serialize};
use tracing::{span, Level};

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Maximum level emitted: `error`, `warn`, `info`, `debug` or `trace`.
    pub log_level: String,
    /// Include the module path of each event.
    pub with_target: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            with_target: true,
        }
    }
}

/// Install the global fmt subscriber.
///
/// Returns `Ok(false)` when a subscriber was already installed; the existing one is kept.
pub fn init_tracing(cfg: &TelemetryConfig) -> anyhow::Result<bool> {
    let level = Level::from_str(&cfg.log_level)
        .with_context(|| format!("invalid log level {:?}", cfg.log_level))?;
    let installed = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(cfg.with_target)
        .try_init()
        .is_ok();
    if installed {
        tracing::info!(%level, "tracing initialised");
    }
    Ok(installed)
}

/// Create a tracing span for a switch operation.
pub fn create_span(name: &str, operation: &str) -> tracing::Span {
    span!(
        Level::INFO,
        "conga_operation",
        operation = operation,
        operation_name = name
    )
}

/// Prometheus counters fed by routing events.
pub struct RoutingMetrics {
    registry: Registry,
    flowlets: IntCounter,
    port_changes: IntCounter,
    dropped: IntCounterVec,
}

impl RoutingMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();
        let flowlets = IntCounter::new("conga_flowlets_total", "Flowlets assigned a port by congestion-aware selection")?;
        let port_changes = IntCounter::new("conga_port_changes_total", "Flowlets that moved to a different port than their flow's previous flowlet")?;
        let dropped = IntCounterVec::new(
            Opts::new("conga_packets_dropped_total", "Packets dropped by routing, by reason"),
            &["reason"],
        )?;
        registry.register(Box::new(flowlets.clone()))?;
        registry.register(Box::new(port_changes.clone()))?;
        registry.register(Box::new(dropped.clone()))?;
        Ok(Self { registry, flowlets, port_changes, dropped })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn flowlets_total(&self) -> u64 {
        self.flowlets.get()
    }

    pub fn port_changes_total(&self) -> u64 {
        self.port_changes.get()
    }

    pub fn dropped_total(&self, reason: &str) -> u64 {
        self.dropped.with_label_values(&[reason]).get()
    }

    /// Text exposition of every counter.
    pub fn render(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).context("prometheus output is not utf-8")
    }
}

impl RoutingObserver for RoutingMetrics {
    fn on_event(&self, event: &RoutingEvent) {
        match event {
            RoutingEvent::NewFlowlet { .. } => self.flowlets.inc(),
            RoutingEvent::PortChanged { .. } => self.port_changes.inc(),
            RoutingEvent::Dropped { reason } => self.dropped.with_label_values(&[*reason]).inc(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_info() {
        let cfg = TelemetryConfig::default();
        assert_eq!(cfg.log_level, "info");
    }

    #[test]
    fn rejects_unknown_level() {
        let cfg = TelemetryConfig { log_level: "loud".into(), ..Default::default() };
        assert!(init_tracing(&cfg).is_err());
    }

    #[test]
    fn counts_events() {
        let metrics = RoutingMetrics::new().unwrap();
        metrics.on_event(&RoutingEvent::NewFlowlet { leaf_id: 1, flow_id: 1, port: 1, congestion: vec![] });
        metrics.on_event(&RoutingEvent::PortChanged { leaf_id: 1, flow_id: 1, from: 1, to: 2, congestion: vec![] });
        metrics.on_event(&RoutingEvent::Dropped { reason: "no_route" });
        metrics.on_event(&RoutingEvent::Dropped { reason: "no_route" });
        assert_eq!(metrics.flowlets_total(), 1);
        assert_eq!(metrics.port_changes_total(), 1);
        assert_eq!(metrics.dropped_total("no_route"), 2);
        assert_eq!(metrics.dropped_total("missing_tag"), 0);
    }

    #[test]
    fn registries_are_independent() {
        let a = RoutingMetrics::new().unwrap();
        let b = RoutingMetrics::new().unwrap();
        a.on_event(&RoutingEvent::Dropped { reason: "not_unicast" });
        assert_eq!(b.dropped_total("not_unicast"), 0);
    }

    #[test]
    fn span_has_name() {
        let span = create_span("leaf-1", "handle_packet");
        // Disabled when no subscriber is installed, but construction must not panic.
        let _guard = span.enter();
    }
}
