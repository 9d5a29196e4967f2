#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use conga_core::{FlowId, InitialCongestion, LeafId, PortId, SwitchConfig};
use rand::{rngs::StdRng, SeedableRng};
use tracing::{debug, trace};

use super::{account, admit, PacketHandler, SwitchStats};
use crate::aging::{AgingEngine, TimerKind};
use crate::dre::Dre;
use crate::feedback::{CongestionFromLeaf, CongestionToLeaf};
use crate::flowlet::{Assignment, FlowletTable};
use crate::packet::Packet;
use crate::route::RouteTable;
use crate::selection::{congestion_snapshot, select_port, PortCongestion};
use crate::tag::CongaTag;
use crate::{RoutingError, RoutingEvent, RoutingObserver, RoutingResult};

/// Top-of-rack switch. Picks uplinks for the flowlets it originates and reflects the
/// congestion it observes back to the leaves that sent traffic to it.
pub struct LeafSwitch {
    leaf_id: LeafId,
    routes: RouteTable,
    leaf_of: HashMap<Ipv4Addr, LeafId>,
    dre: Dre,
    flowlets: FlowletTable,
    to_leaf: CongestionToLeaf,
    // Configured seeds, stamped with the time of the first packet.
    pending_congestion: Vec<InitialCongestion>,
    from_leaf: CongestionFromLeaf,
    timers: AgingEngine,
    aging_time: Duration,
    ecmp_mode: bool,
    rng: StdRng,
    observer: Arc<dyn RoutingObserver>,
    stats: SwitchStats,
}

impl LeafSwitch {
    pub(crate) fn new(leaf_id: LeafId, cfg: &SwitchConfig, observer: Arc<dyn RoutingObserver>) -> Self {
        Self {
            leaf_id,
            routes: cfg.routes.iter().copied().collect(),
            leaf_of: cfg.hosts.iter().map(|h| (h.address, h.leaf)).collect(),
            dre: Dre::from_config(cfg),
            flowlets: FlowletTable::new(cfg.flowlet_timeout()),
            to_leaf: CongestionToLeaf::new(),
            pending_congestion: cfg.initial_congestion.clone(),
            from_leaf: CongestionFromLeaf::new(cfg.piggyback),
            timers: AgingEngine::new(cfg.dre.tdre(), cfg.aging_time()),
            aging_time: cfg.aging_time(),
            ecmp_mode: cfg.ecmp_mode,
            rng: cfg.seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64),
            observer,
            stats: SwitchStats::default(),
        }
    }

    pub fn leaf_id(&self) -> LeafId {
        self.leaf_id
    }

    pub fn add_route(&mut self, network: Ipv4Addr, mask: Ipv4Addr, port: PortId) {
        self.routes.add_route(network, mask, port);
    }

    /// Map a host address to the leaf it is attached to.
    pub fn add_host(&mut self, address: Ipv4Addr, leaf: LeafId) {
        self.leaf_of.insert(address, leaf);
    }

    /// Seed the level assumed for `(leaf, port)` before any feedback arrives.
    pub fn init_congestion(&mut self, leaf: LeafId, port: PortId, level: u32, now: Instant) {
        self.to_leaf.record(leaf, port, level, now);
    }

    pub fn leaf_of(&self, address: Ipv4Addr) -> Option<LeafId> {
        self.leaf_of.get(&address).copied()
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn dre_mut(&mut self) -> &mut Dre {
        &mut self.dre
    }

    pub fn flowlets(&self) -> &FlowletTable {
        &self.flowlets
    }

    pub fn congestion_to_leaf(&self) -> &CongestionToLeaf {
        &self.to_leaf
    }

    pub fn congestion_from_leaf(&self) -> &CongestionFromLeaf {
        &self.from_leaf
    }

    pub fn timers(&self) -> &AgingEngine {
        &self.timers
    }

    /// Dump every table at `trace` level.
    pub fn trace_tables(&self) {
        for (port, x) in self.dre.iter() {
            trace!(leaf = self.leaf_id, port, x, level = self.dre.quantize(port, x), "dre");
        }
        for (flow, flowlet) in self.flowlets.iter() {
            trace!(leaf = self.leaf_id, flow, port = flowlet.port, "flowlet");
        }
        for (to, port, m) in self.to_leaf.iter() {
            trace!(leaf = self.leaf_id, to, port, level = m.level, "congestion to leaf");
        }
        for (from, port, e) in self.from_leaf.iter() {
            trace!(leaf = self.leaf_id, from, port, ce = e.ce, changed = e.changed, "congestion from leaf");
        }
    }

    fn seed_congestion(&mut self, now: Instant) {
        for init in self.pending_congestion.drain(..) {
            self.to_leaf.record(init.leaf, init.port, init.level, now);
        }
    }

    fn resolve_leaf(&self, address: Ipv4Addr) -> RoutingResult<LeafId> {
        self.leaf_of(address).ok_or(RoutingError::UnknownLeafMapping(address))
    }

    fn route(&mut self, packet: &mut Packet, now: Instant) -> RoutingResult<PortId> {
        let (flow_id, ports) = admit(packet, &self.routes)?;

        if self.ecmp_mode {
            let port = ecmp_port(&ports, flow_id);
            self.timers.arm(now);
            self.dre.record_bytes(port, u64::from(packet.size));
            return Ok(port);
        }

        if packet.tag().is_some() {
            self.terminate(packet, flow_id, &ports, now)
        } else {
            self.originate(packet, flow_id, &ports, now)
        }
    }

    /// Untagged packet from a local host: choose an uplink and attach a tag.
    fn originate(
        &mut self,
        packet: &mut Packet,
        flow_id: FlowId,
        ports: &[PortId],
        now: Instant,
    ) -> RoutingResult<PortId> {
        let dest_leaf = self.resolve_leaf(packet.dst)?;
        self.timers.arm(now);

        let feedback = self.from_leaf.next_piggyback(dest_leaf);

        let Self { flowlets, dre, to_leaf, rng, .. } = &mut *self;
        let mut snapshot = Vec::new();
        let (port, assignment) = flowlets.get_or_assign(flow_id, now, |previous| {
            snapshot = congestion_snapshot(ports, dre, to_leaf, dest_leaf);
            select_port(&snapshot, previous, rng).unwrap_or(ports[0])
        });

        packet.add_tag(CongaTag::new(port).with_feedback(feedback));
        self.dre.record_bytes(port, u64::from(packet.size));

        debug!(
            leaf = self.leaf_id,
            flow = flow_id,
            dest_leaf,
            port,
            ?assignment,
            ?feedback,
            "originating packet"
        );
        self.publish(flow_id, port, assignment, snapshot);
        Ok(port)
    }

    /// Tagged packet from the fabric: absorb its congestion information, strip the tag and
    /// hand it to the local host port.
    fn terminate(
        &mut self,
        packet: &mut Packet,
        flow_id: FlowId,
        ports: &[PortId],
        now: Instant,
    ) -> RoutingResult<PortId> {
        let src_leaf = self.resolve_leaf(packet.src)?;
        let port = ecmp_port(ports, flow_id);
        self.timers.arm(now);

        if let Some(tag) = packet.remove_tag() {
            debug!(leaf = self.leaf_id, src_leaf, lb_tag = tag.lb_tag, ce = tag.ce, feedback = ?tag.feedback, "terminating packet");
            // Port 0 is the wire's "no feedback" marker and never names a real uplink.
            if tag.lb_tag != 0 {
                self.from_leaf.record(src_leaf, tag.lb_tag, tag.ce, now);
            }
            if let Some(fb) = tag.feedback {
                self.to_leaf.record(src_leaf, fb.port, fb.metric, now);
            }
        }
        self.dre.record_bytes(port, u64::from(packet.size));
        Ok(port)
    }

    fn publish(&self, flow_id: FlowId, port: PortId, assignment: Assignment, congestion: Vec<PortCongestion>) {
        match assignment {
            Assignment::Hit => {}
            Assignment::New | Assignment::Renewed => {
                self.observer.on_event(&RoutingEvent::NewFlowlet {
                    leaf_id: self.leaf_id,
                    flow_id,
                    port,
                    congestion,
                });
            }
            Assignment::Moved { from } => {
                self.observer.on_event(&RoutingEvent::NewFlowlet {
                    leaf_id: self.leaf_id,
                    flow_id,
                    port,
                    congestion: congestion.clone(),
                });
                self.observer.on_event(&RoutingEvent::PortChanged {
                    leaf_id: self.leaf_id,
                    flow_id,
                    from,
                    to: port,
                    congestion,
                });
            }
        }
    }

    /// Aging step as of `at`. Returns whether any aged state is still live.
    fn age_tables(&mut self, at: Instant) -> bool {
        let to_live = self.to_leaf.age(at, self.aging_time);
        let from_live = self.from_leaf.age(at, self.aging_time);
        let purged = self.flowlets.purge(at, self.aging_time.max(self.flowlets.timeout()));
        if purged > 0 {
            trace!(leaf = self.leaf_id, purged, "purged idle flowlets");
        }
        to_live || from_live || !self.flowlets.is_empty()
    }
}

impl PacketHandler for LeafSwitch {
    fn handle_packet(&mut self, packet: &mut Packet, now: Instant) -> RoutingResult<PortId> {
        self.seed_congestion(now);
        let result = self.route(packet, now);
        account(result, packet, &mut self.stats, self.observer.as_ref())
    }

    fn run_timers(&mut self, now: Instant) {
        while let Some((kind, at)) = self.timers.pop_due(now) {
            let live = match kind {
                TimerKind::Decay => self.dre.decay(),
                TimerKind::Aging => self.age_tables(at),
            };
            self.timers.rearm(kind, at, live);
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    fn shutdown(&mut self) {
        self.timers.cancel();
        debug!(leaf = self.leaf_id, "leaf timers cancelled");
    }

    fn stats(&self) -> SwitchStats {
        self.stats
    }

    fn dre(&self) -> &Dre {
        &self.dre
    }
}

fn ecmp_port(ports: &[PortId], flow_id: FlowId) -> PortId {
    // `admit` guarantees at least one candidate.
    RouteTable::ecmp(ports, flow_id).unwrap_or(ports[0])
}
