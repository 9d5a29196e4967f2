#![forbid(unsafe_code)]

//! Min-max uplink selection for a new flowlet.
//!
//! Each candidate is scored by `max(local DRE level, level reported by the destination
//! leaf)`; the flowlet goes to a port with the lowest score. Ties are broken uniformly at
//! random, except that the flow's previous port wins any tie it is part of.

use conga_core::{LeafId, PortId};
use rand::{seq::SliceRandom, Rng};

use crate::dre::Dre;
use crate::feedback::CongestionToLeaf;

/// Congestion figures that justified a decision for one candidate port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortCongestion {
    pub port: PortId,
    pub local: u32,
    pub remote: u32,
}

impl PortCongestion {
    /// Congestion degree: the worse of the local and remote measurements.
    pub fn degree(&self) -> u32 {
        self.local.max(self.remote)
    }
}

/// Score every candidate toward `dest_leaf`. Unknown remote entries count as zero.
pub fn congestion_snapshot(
    candidates: &[PortId],
    dre: &Dre,
    to_leaf: &CongestionToLeaf,
    dest_leaf: LeafId,
) -> Vec<PortCongestion> {
    candidates
        .iter()
        .map(|&port| PortCongestion {
            port,
            local: dre.quantized_level(port),
            remote: to_leaf.level(dest_leaf, port),
        })
        .collect()
}

/// Ports sharing the minimum congestion degree, in candidate order.
pub fn least_congested(snapshot: &[PortCongestion]) -> Vec<PortId> {
    let Some(min) = snapshot.iter().map(PortCongestion::degree).min() else {
        return Vec::new();
    };
    snapshot.iter().filter(|c| c.degree() == min).map(|c| c.port).collect()
}

/// Choose the port for a new flowlet. `None` only when `snapshot` is empty.
pub fn select_port<R: Rng + ?Sized>(
    snapshot: &[PortCongestion],
    previous: Option<PortId>,
    rng: &mut R,
) -> Option<PortId> {
    let best = least_congested(snapshot);
    match previous {
        Some(port) if best.contains(&port) => Some(port),
        _ => best.choose(rng).copied(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conga_core::DataRate;
    use rand::{rngs::StdRng, SeedableRng};
    use std::collections::HashMap;
    use std::time::{Duration, Instant};

    fn pc(port: PortId, local: u32, remote: u32) -> PortCongestion {
        PortCongestion { port, local, remote }
    }

    #[test]
    fn picks_min_of_max() {
        let mut rng = StdRng::seed_from_u64(1);
        // Port 1: local 1 remote 6 → 6; port 2: 3/2 → 3; port 3: 5/0 → 5.
        let snap = [pc(1, 1, 6), pc(2, 3, 2), pc(3, 5, 0)];
        assert_eq!(select_port(&snap, None, &mut rng), Some(2));
    }

    #[test]
    fn previous_port_wins_ties() {
        let mut rng = StdRng::seed_from_u64(2);
        let snap = [pc(1, 2, 0), pc(2, 0, 2), pc(3, 1, 1)];
        assert_eq!(least_congested(&snap), vec![3]);
        let snap = [pc(1, 2, 0), pc(2, 0, 2), pc(3, 4, 1)];
        for _ in 0..50 {
            assert_eq!(select_port(&snap, Some(2), &mut rng), Some(2));
        }
    }

    #[test]
    fn previous_port_ignored_when_not_minimal() {
        let mut rng = StdRng::seed_from_u64(3);
        let snap = [pc(1, 7, 0), pc(2, 1, 1)];
        assert_eq!(select_port(&snap, Some(1), &mut rng), Some(2));
    }

    #[test]
    fn ties_are_spread() {
        let mut rng = StdRng::seed_from_u64(4);
        let snap = [pc(1, 0, 0), pc(2, 0, 0)];
        let mut counts: HashMap<PortId, u32> = HashMap::new();
        for _ in 0..1000 {
            *counts.entry(select_port(&snap, None, &mut rng).unwrap()).or_default() += 1;
        }
        assert!(counts[&1] > 350 && counts[&2] > 350, "{counts:?}");
    }

    #[test]
    fn empty_snapshot_selects_nothing() {
        let mut rng = StdRng::seed_from_u64(5);
        assert_eq!(select_port(&[], Some(1), &mut rng), None);
    }

    #[test]
    fn snapshot_combines_dre_and_feedback() {
        let mut dre = Dre::new(Duration::from_micros(200), 0.2, 3, DataRate::from_gbps(1));
        dre.record_bytes(1, 62_500);
        let mut to_leaf = CongestionToLeaf::new();
        to_leaf.record(2, 2, 6, Instant::now());
        let snap = congestion_snapshot(&[1, 2], &dre, &to_leaf, 2);
        assert_eq!(snap, vec![pc(1, 4, 0), pc(2, 0, 6)]);
        assert_eq!(least_congested(&snap), vec![1]);
    }
}
