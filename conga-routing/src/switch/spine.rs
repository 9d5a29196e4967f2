#![forbid(unsafe_code)]

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Instant;

use conga_core::{PortId, SwitchConfig};
use tracing::debug;

use super::{account, admit, PacketHandler, SwitchStats};
use crate::aging::{AgingEngine, TimerKind};
use crate::dre::Dre;
use crate::packet::Packet;
use crate::route::RouteTable;
use crate::{RoutingError, RoutingObserver, RoutingResult};

/// Fabric switch between leaves. Forwards by flow hash and raises the tag's `ce` to its
/// own congestion level on the chosen port.
pub struct SpineSwitch {
    routes: RouteTable,
    dre: Dre,
    timers: AgingEngine,
    observer: Arc<dyn RoutingObserver>,
    stats: SwitchStats,
}

impl SpineSwitch {
    pub(crate) fn new(cfg: &SwitchConfig, observer: Arc<dyn RoutingObserver>) -> Self {
        Self {
            routes: cfg.routes.iter().copied().collect(),
            dre: Dre::from_config(cfg),
            timers: AgingEngine::decay_only(cfg.dre.tdre()),
            observer,
            stats: SwitchStats::default(),
        }
    }

    pub fn add_route(&mut self, network: Ipv4Addr, mask: Ipv4Addr, port: PortId) {
        self.routes.add_route(network, mask, port);
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn dre_mut(&mut self) -> &mut Dre {
        &mut self.dre
    }

    pub fn timers(&self) -> &AgingEngine {
        &self.timers
    }

    fn route(&mut self, packet: &mut Packet, now: Instant) -> RoutingResult<PortId> {
        let (flow_id, ports) = admit(packet, &self.routes)?;
        let mut tag = packet.tag().copied().ok_or(RoutingError::MissingCongaTag)?;

        let port = RouteTable::ecmp(&ports, flow_id).unwrap_or(ports[0]);
        self.timers.arm(now);

        let x = self.dre.record_bytes(port, u64::from(packet.size));
        let level = self.dre.quantize(port, x);
        if tag.aggregate_ce(level) {
            packet.replace_tag(tag);
        }
        debug!(flow = flow_id, port, level, lb_tag = tag.lb_tag, ce = tag.ce, "spine forwarding");
        Ok(port)
    }
}

impl PacketHandler for SpineSwitch {
    fn handle_packet(&mut self, packet: &mut Packet, now: Instant) -> RoutingResult<PortId> {
        let result = self.route(packet, now);
        account(result, packet, &mut self.stats, self.observer.as_ref())
    }

    fn run_timers(&mut self, now: Instant) {
        while let Some((kind, at)) = self.timers.pop_due(now) {
            let live = match kind {
                TimerKind::Decay => self.dre.decay(),
                TimerKind::Aging => false,
            };
            self.timers.rearm(kind, at, live);
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    fn shutdown(&mut self) {
        self.timers.cancel();
        debug!("spine timers cancelled");
    }

    fn stats(&self) -> SwitchStats {
        self.stats
    }

    fn dre(&self) -> &Dre {
        &self.dre
    }
}
