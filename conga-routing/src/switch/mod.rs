#![forbid(unsafe_code)]

//! Leaf and spine switches.
//!
//! A switch's role is fixed when it is built: [`Switch::from_config`] returns either a
//! [`LeafSwitch`] or a [`SpineSwitch`] and there is no way to turn one into the other.
//! Both implement [`PacketHandler`], which is all the forwarding layer and the timer
//! driver need.

use std::sync::Arc;
use std::time::Instant;

use conga_core::{CongaResult, FlowId, PortId, SwitchConfig, SwitchRole};
use tracing::info;

use crate::dre::Dre;
use crate::packet::Packet;
use crate::route::RouteTable;
use crate::{RoutingError, RoutingEvent, RoutingObserver, RoutingResult};

mod leaf;
mod spine;

pub use leaf::LeafSwitch;
pub use spine::SpineSwitch;

/// Forwarded/dropped packet counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SwitchStats {
    pub forwarded: u64,
    pub dropped: u64,
}

/// Per-packet routing plus the periodic maintenance that goes with it.
pub trait PacketHandler {
    /// Pick the egress port for `packet`, updating its congestion tag in place.
    ///
    /// An error means the packet must be dropped; the switch has already counted it.
    fn handle_packet(&mut self, packet: &mut Packet, now: Instant) -> RoutingResult<PortId>;

    /// Run every decay/aging step due at or before `now`.
    fn run_timers(&mut self, now: Instant);

    /// When [`run_timers`](Self::run_timers) next has work to do. `None` while idle.
    fn next_deadline(&self) -> Option<Instant>;

    /// Cancel pending timers. Tables stay readable.
    fn shutdown(&mut self);

    fn stats(&self) -> SwitchStats;

    fn dre(&self) -> &Dre;
}

/// A switch of either role.
pub enum Switch {
    Leaf(LeafSwitch),
    Spine(SpineSwitch),
}

impl Switch {
    /// Validate `cfg` and build the switch its role describes.
    pub fn from_config(cfg: &SwitchConfig, observer: Arc<dyn RoutingObserver>) -> CongaResult<Self> {
        cfg.validate()?;
        let switch = match cfg.role {
            SwitchRole::Leaf { leaf_id } => Switch::Leaf(LeafSwitch::new(leaf_id, cfg, observer)),
            SwitchRole::Spine => Switch::Spine(SpineSwitch::new(cfg, observer)),
        };
        info!(role = ?cfg.role, routes = cfg.routes.len(), "switch built");
        Ok(switch)
    }

    pub fn role(&self) -> SwitchRole {
        match self {
            Switch::Leaf(leaf) => SwitchRole::Leaf { leaf_id: leaf.leaf_id() },
            Switch::Spine(_) => SwitchRole::Spine,
        }
    }

    pub fn as_leaf(&self) -> Option<&LeafSwitch> {
        match self {
            Switch::Leaf(leaf) => Some(leaf),
            Switch::Spine(_) => None,
        }
    }

    pub fn as_leaf_mut(&mut self) -> Option<&mut LeafSwitch> {
        match self {
            Switch::Leaf(leaf) => Some(leaf),
            Switch::Spine(_) => None,
        }
    }

    pub fn as_spine_mut(&mut self) -> Option<&mut SpineSwitch> {
        match self {
            Switch::Spine(spine) => Some(spine),
            Switch::Leaf(_) => None,
        }
    }

    /// Mutable DRE access, e.g. to inject background load.
    pub fn dre_mut(&mut self) -> &mut Dre {
        match self {
            Switch::Leaf(leaf) => leaf.dre_mut(),
            Switch::Spine(spine) => spine.dre_mut(),
        }
    }
}

impl PacketHandler for Switch {
    fn handle_packet(&mut self, packet: &mut Packet, now: Instant) -> RoutingResult<PortId> {
        match self {
            Switch::Leaf(leaf) => leaf.handle_packet(packet, now),
            Switch::Spine(spine) => spine.handle_packet(packet, now),
        }
    }

    fn run_timers(&mut self, now: Instant) {
        match self {
            Switch::Leaf(leaf) => leaf.run_timers(now),
            Switch::Spine(spine) => spine.run_timers(now),
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        match self {
            Switch::Leaf(leaf) => leaf.next_deadline(),
            Switch::Spine(spine) => spine.next_deadline(),
        }
    }

    fn shutdown(&mut self) {
        match self {
            Switch::Leaf(leaf) => leaf.shutdown(),
            Switch::Spine(spine) => spine.shutdown(),
        }
    }

    fn stats(&self) -> SwitchStats {
        match self {
            Switch::Leaf(leaf) => leaf.stats(),
            Switch::Spine(spine) => spine.stats(),
        }
    }

    fn dre(&self) -> &Dre {
        match self {
            Switch::Leaf(leaf) => leaf.dre(),
            Switch::Spine(spine) => spine.dre(),
        }
    }
}

/// Checks shared by both roles: unicast destination, flow id present, at least one route.
fn admit(packet: &Packet, routes: &RouteTable) -> RoutingResult<(FlowId, Vec<PortId>)> {
    if packet.dst.is_multicast() || packet.dst.is_broadcast() {
        return Err(RoutingError::NotUnicast(packet.dst));
    }
    let flow_id = packet.flow_id.ok_or(RoutingError::MissingFlowId)?;
    let ports = routes.lookup(packet.dst)?;
    Ok((flow_id, ports))
}

/// Count the outcome of one routing decision and publish drops.
fn account(
    result: RoutingResult<PortId>,
    packet: &Packet,
    stats: &mut SwitchStats,
    observer: &dyn RoutingObserver,
) -> RoutingResult<PortId> {
    match &result {
        Ok(_) => stats.forwarded += 1,
        Err(err) => {
            stats.dropped += 1;
            tracing::warn!(src = %packet.src, dst = %packet.dst, flow = ?packet.flow_id, %err, "dropping packet");
            observer.on_event(&RoutingEvent::Dropped { reason: err.reason() });
        }
    }
    result
}
