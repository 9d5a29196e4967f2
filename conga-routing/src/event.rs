#![forbid(unsafe_code)]

//! Routing decisions published for telemetry. Nothing in the forwarding path depends on
//! who listens.

use std::sync::Mutex;

use conga_core::{FlowId, LeafId, PortId};

use crate::selection::PortCongestion;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingEvent {
    /// A flowlet of `flow_id` was assigned `port` on leaf `leaf_id`.
    NewFlowlet {
        leaf_id: LeafId,
        flow_id: FlowId,
        port: PortId,
        congestion: Vec<PortCongestion>,
    },
    /// A new flowlet of `flow_id` moved off the port its previous flowlet used.
    PortChanged {
        leaf_id: LeafId,
        flow_id: FlowId,
        from: PortId,
        to: PortId,
        congestion: Vec<PortCongestion>,
    },
    /// A packet was dropped; `reason` is [`RoutingError::reason`](crate::RoutingError::reason).
    Dropped { reason: &'static str },
}

/// Receives [`RoutingEvent`]s synchronously from the packet path. Implementations must be
/// cheap; they run inside the per-packet decision.
pub trait RoutingObserver: Send + Sync {
    fn on_event(&self, event: &RoutingEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl RoutingObserver for NoopObserver {
    fn on_event(&self, _event: &RoutingEvent) {}
}

/// Keeps every event in memory. Handy for tests and offline analysis.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<RoutingEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RoutingEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl RoutingObserver for EventLog {
    fn on_event(&self, event: &RoutingEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
    }
}
