#![forbid(unsafe_code)]

//! Two-tier leaf-spine fabric built from switch instances.
//!
//! Numbering, for `L` leaves, `S` spines and `H` hosts per leaf:
//!
//! - leaf ids are `1..=L`, host `h` of leaf `l` has address `10.0.l.h`;
//! - leaf port `s` in `1..=S` is the uplink to spine `s`, leaf port `S + h` faces host `h`;
//! - spine port `l` is the downlink to leaf `l`.
//!
//! The congestion tag is encoded to its wire form and parsed again on every link, as it
//! would be between real switches.

use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Instant;

use conga_core::{
    CongaResult, DreConfig, FlowId, HostEntry, LeafId, PiggybackCursor, PortId, RouteConfig,
    SwitchConfig,
};
use conga_routing::{
    parse_tag, CongaTag, LeafSwitch, NoopObserver, Packet, PacketHandler, RoutingError,
    RoutingObserver, SpineSwitch, Switch,
};
use thiserror::Error;

const MASK24: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 0);
const HOST_MASK: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 255);

/// Fabric dimensions and the parameters every switch shares.
#[derive(Debug, Clone)]
pub struct FabricOpts {
    pub leaves: u32,
    pub spines: u32,
    pub hosts_per_leaf: u32,
    pub dre: DreConfig,
    pub flowlet_timeout_us: u64,
    pub aging_time_us: u64,
    pub piggyback: PiggybackCursor,
    /// Base seed; switch `n` uses `seed + n`.
    pub seed: u64,
}

impl Default for FabricOpts {
    fn default() -> Self {
        let cfg = SwitchConfig::default();
        Self {
            leaves: 2,
            spines: 2,
            hosts_per_leaf: 2,
            dre: cfg.dre,
            flowlet_timeout_us: cfg.flowlet_timeout_us,
            aging_time_us: cfg.aging_time_us,
            piggyback: cfg.piggyback,
            seed: 7,
        }
    }
}

impl FabricOpts {
    /// Address of host `host` attached to leaf `leaf`.
    pub fn host(leaf: LeafId, host: u32) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, leaf as u8, host as u8)
    }

    fn subnet(leaf: LeafId) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, leaf as u8, 0)
    }

    fn base(&self, role_seed: u64) -> SwitchConfig {
        SwitchConfig {
            dre: self.dre.clone(),
            flowlet_timeout_us: self.flowlet_timeout_us,
            aging_time_us: self.aging_time_us,
            piggyback: self.piggyback,
            seed: Some(self.seed.wrapping_add(role_seed)),
            ..SwitchConfig::default()
        }
    }

    /// Configuration of leaf `leaf`: one route per spine toward every other leaf's subnet,
    /// host routes for its own hosts, and the full host-to-leaf map.
    pub fn leaf_config(&self, leaf: LeafId) -> SwitchConfig {
        let mut cfg = SwitchConfig {
            role: conga_core::SwitchRole::Leaf { leaf_id: leaf },
            ..self.base(u64::from(leaf))
        };
        for remote in (1..=self.leaves).filter(|m| *m != leaf) {
            for spine in 1..=self.spines {
                cfg.routes.push(RouteConfig { network: Self::subnet(remote), mask: MASK24, port: spine });
            }
        }
        for host in 1..=self.hosts_per_leaf {
            cfg.routes.push(RouteConfig {
                network: Self::host(leaf, host),
                mask: HOST_MASK,
                port: self.spines + host,
            });
        }
        for l in 1..=self.leaves {
            for host in 1..=self.hosts_per_leaf {
                cfg.hosts.push(HostEntry { address: Self::host(l, host), leaf: l });
            }
        }
        cfg
    }

    /// Configuration of spine `spine`: one route per leaf subnet.
    pub fn spine_config(&self, spine: u32) -> SwitchConfig {
        let mut cfg = self.base(1_000 + u64::from(spine));
        cfg.routes = (1..=self.leaves)
            .map(|leaf| RouteConfig { network: Self::subnet(leaf), mask: MASK24, port: leaf })
            .collect();
        cfg
    }
}

/// A switch in the fabric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hop {
    Leaf(LeafId),
    Spine(u32),
}

impl fmt::Display for Hop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hop::Leaf(id) => write!(f, "leaf {id}"),
            Hop::Spine(id) => write!(f, "spine {id}"),
        }
    }
}

#[derive(Error, Debug)]
pub enum FabricError {
    #[error("{hop} dropped the packet: {source}")]
    Dropped { hop: Hop, source: RoutingError },

    #[error("{hop} has nothing wired to port {port}")]
    Unwired { hop: Hop, port: PortId },

    #[error("congestion tag did not survive the link out of {hop}")]
    Codec { hop: Hop },
}

impl FabricError {
    /// The routing error behind a drop, if this was one.
    pub fn routing_error(&self) -> Option<&RoutingError> {
        match self {
            FabricError::Dropped { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Where a packet went and what it carried on arrival.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub src_leaf: LeafId,
    pub dst_leaf: LeafId,
    /// Uplink picked by the source leaf, which is also the spine the packet crossed.
    pub uplink: PortId,
    /// Port toward the destination host on the destination leaf.
    pub host_port: PortId,
    /// Tag as it reached the destination leaf, before being stripped.
    pub tag: CongaTag,
}

pub struct LeafSpineFabric {
    opts: FabricOpts,
    leaves: Vec<Switch>,
    spines: Vec<Switch>,
}

impl LeafSpineFabric {
    pub fn new(opts: FabricOpts) -> CongaResult<Self> {
        Self::with_observer(opts, Arc::new(NoopObserver))
    }

    /// Build the fabric with every switch reporting to `observer`.
    pub fn with_observer(opts: FabricOpts, observer: Arc<dyn RoutingObserver>) -> CongaResult<Self> {
        let leaves = (1..=opts.leaves)
            .map(|l| Switch::from_config(&opts.leaf_config(l), observer.clone()))
            .collect::<CongaResult<Vec<_>>>()?;
        let spines = (1..=opts.spines)
            .map(|s| Switch::from_config(&opts.spine_config(s), observer.clone()))
            .collect::<CongaResult<Vec<_>>>()?;
        tracing::debug!(leaves = opts.leaves, spines = opts.spines, "fabric wired");
        Ok(Self { opts, leaves, spines })
    }

    pub fn opts(&self) -> &FabricOpts {
        &self.opts
    }

    pub fn switch(&self, hop: Hop) -> Option<&Switch> {
        match hop {
            Hop::Leaf(id) => self.leaves.get(index(id)?),
            Hop::Spine(id) => self.spines.get(index(id)?),
        }
    }

    pub fn switch_mut(&mut self, hop: Hop) -> Option<&mut Switch> {
        match hop {
            Hop::Leaf(id) => self.leaves.get_mut(index(id)?),
            Hop::Spine(id) => self.spines.get_mut(index(id)?),
        }
    }

    pub fn leaf(&self, id: LeafId) -> Option<&LeafSwitch> {
        self.switch(Hop::Leaf(id)).and_then(Switch::as_leaf)
    }

    pub fn leaf_mut(&mut self, id: LeafId) -> Option<&mut LeafSwitch> {
        self.switch_mut(Hop::Leaf(id)).and_then(Switch::as_leaf_mut)
    }

    pub fn spine_mut(&mut self, id: u32) -> Option<&mut SpineSwitch> {
        self.switch_mut(Hop::Spine(id)).and_then(Switch::as_spine_mut)
    }

    /// Send one packet of `flow_id` from host `src` to host `dst` at `now`, hop by hop.
    pub fn send(
        &mut self,
        src: Ipv4Addr,
        dst: Ipv4Addr,
        flow_id: FlowId,
        size: u32,
        now: Instant,
    ) -> Result<Delivery, FabricError> {
        self.send_packet(Packet::new(src, dst, flow_id, size), now)
    }

    pub fn send_packet(&mut self, mut packet: Packet, now: Instant) -> Result<Delivery, FabricError> {
        let src_leaf = LeafId::from(packet.src.octets()[2]);
        let uplink = self.hop(Hop::Leaf(src_leaf), &mut packet, now)?;
        if uplink == 0 || uplink > self.opts.spines {
            return Err(FabricError::Unwired { hop: Hop::Leaf(src_leaf), port: uplink });
        }
        carry(Hop::Leaf(src_leaf), &mut packet)?;

        let dst_leaf = self.hop(Hop::Spine(uplink), &mut packet, now)?;
        if dst_leaf == 0 || dst_leaf > self.opts.leaves {
            return Err(FabricError::Unwired { hop: Hop::Spine(uplink), port: dst_leaf });
        }
        carry(Hop::Spine(uplink), &mut packet)?;

        let tag = packet.tag().copied().ok_or(FabricError::Codec { hop: Hop::Spine(uplink) })?;
        let host_port = self.hop(Hop::Leaf(dst_leaf), &mut packet, now)?;
        Ok(Delivery { src_leaf, dst_leaf, uplink, host_port, tag })
    }

    /// Run due timers on every switch.
    pub fn run_timers(&mut self, now: Instant) {
        for switch in self.leaves.iter_mut().chain(self.spines.iter_mut()) {
            switch.run_timers(now);
        }
    }

    /// Earliest pending timer across the fabric.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.leaves
            .iter()
            .chain(self.spines.iter())
            .filter_map(|s| s.next_deadline())
            .min()
    }

    fn hop(&mut self, hop: Hop, packet: &mut Packet, now: Instant) -> Result<PortId, FabricError> {
        let switch = self.switch_mut(hop).ok_or(FabricError::Unwired { hop, port: 0 })?;
        switch
            .handle_packet(packet, now)
            .map_err(|source| FabricError::Dropped { hop, source })
    }
}

fn index(id: u32) -> Option<usize> {
    usize::try_from(id).ok()?.checked_sub(1)
}

/// Put the tag through its wire encoding, as a link between two switches would.
fn carry(from: Hop, packet: &mut Packet) -> Result<(), FabricError> {
    if let Some(tag) = packet.remove_tag() {
        let bytes = tag.to_bytes();
        let (_, parsed) = parse_tag(&bytes).map_err(|_| FabricError::Codec { hop: from })?;
        packet.add_tag(parsed);
    }
    Ok(())
}
