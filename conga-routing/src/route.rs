#![forbid(unsafe_code)]

//! Static `network/mask -> port` table. Several entries may match one destination; that is
//! how multipath fan-out toward a remote leaf is expressed.

use std::net::Ipv4Addr;

use conga_core::{FlowId, PortId, RouteConfig};

use crate::{RoutingError, RoutingResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteEntry {
    pub network: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub port: PortId,
}

impl RouteEntry {
    pub fn new(network: Ipv4Addr, mask: Ipv4Addr, port: PortId) -> Self {
        Self { network, mask, port }
    }

    pub fn matches(&self, addr: Ipv4Addr) -> bool {
        let mask = u32::from(self.mask);
        u32::from(addr) & mask == u32::from(self.network) & mask
    }
}

impl From<RouteConfig> for RouteEntry {
    fn from(cfg: RouteConfig) -> Self {
        Self::new(cfg.network, cfg.mask, cfg.port)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_route(&mut self, network: Ipv4Addr, mask: Ipv4Addr, port: PortId) {
        tracing::trace!(%network, %mask, port, "add route");
        self.entries.push(RouteEntry::new(network, mask, port));
    }

    /// Ports of every entry matching `dst`, in installation order, without duplicates.
    pub fn candidates(&self, dst: Ipv4Addr) -> Vec<PortId> {
        let mut ports: Vec<PortId> = Vec::new();
        for entry in self.entries.iter().filter(|e| e.matches(dst)) {
            if !ports.contains(&entry.port) {
                ports.push(entry.port);
            }
        }
        ports
    }

    /// Like [`candidates`](Self::candidates) but an empty result is a routing error.
    pub fn lookup(&self, dst: Ipv4Addr) -> RoutingResult<Vec<PortId>> {
        let ports = self.candidates(dst);
        if ports.is_empty() {
            Err(RoutingError::NoRouteFound(dst))
        } else {
            Ok(ports)
        }
    }

    /// Equal-cost pick among `ports` by flow hash.
    pub fn ecmp(ports: &[PortId], flow_id: FlowId) -> Option<PortId> {
        if ports.is_empty() {
            None
        } else {
            Some(ports[flow_id as usize % ports.len()])
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteEntry> {
        self.entries.iter()
    }
}

impl FromIterator<RouteConfig> for RouteTable {
    fn from_iter<I: IntoIterator<Item = RouteConfig>>(iter: I) -> Self {
        Self { entries: iter.into_iter().map(RouteEntry::from).collect() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask24() -> Ipv4Addr {
        Ipv4Addr::new(255, 255, 255, 0)
    }

    #[test]
    fn multipath_lookup_returns_all_ports() {
        let mut table = RouteTable::new();
        table.add_route(Ipv4Addr::new(10, 0, 2, 0), mask24(), 1);
        table.add_route(Ipv4Addr::new(10, 0, 2, 0), mask24(), 2);
        table.add_route(Ipv4Addr::new(10, 0, 3, 0), mask24(), 3);
        assert_eq!(table.lookup(Ipv4Addr::new(10, 0, 2, 9)).unwrap(), vec![1, 2]);
        assert_eq!(table.lookup(Ipv4Addr::new(10, 0, 3, 1)).unwrap(), vec![3]);
    }

    #[test]
    fn host_route_and_prefix_both_match() {
        let mut table = RouteTable::new();
        table.add_route(Ipv4Addr::new(10, 0, 1, 5), Ipv4Addr::new(255, 255, 255, 255), 4);
        table.add_route(Ipv4Addr::new(10, 0, 0, 0), Ipv4Addr::new(255, 255, 0, 0), 1);
        assert_eq!(table.candidates(Ipv4Addr::new(10, 0, 1, 5)), vec![4, 1]);
        assert_eq!(table.candidates(Ipv4Addr::new(10, 0, 1, 6)), vec![1]);
    }

    #[test]
    fn duplicate_ports_collapse() {
        let mut table = RouteTable::new();
        table.add_route(Ipv4Addr::new(10, 0, 2, 0), mask24(), 1);
        table.add_route(Ipv4Addr::new(10, 0, 0, 0), Ipv4Addr::new(255, 0, 0, 0), 1);
        assert_eq!(table.candidates(Ipv4Addr::new(10, 0, 2, 1)), vec![1]);
    }

    #[test]
    fn empty_lookup_is_no_route() {
        let table = RouteTable::new();
        let dst = Ipv4Addr::new(192, 168, 0, 1);
        assert_eq!(table.lookup(dst), Err(RoutingError::NoRouteFound(dst)));
    }

    #[test]
    fn ecmp_is_stable_per_flow() {
        let ports = [1, 2, 3];
        assert_eq!(RouteTable::ecmp(&ports, 4), Some(2));
        assert_eq!(RouteTable::ecmp(&ports, 4), RouteTable::ecmp(&ports, 4));
        assert_eq!(RouteTable::ecmp(&[], 4), None);
    }
}
