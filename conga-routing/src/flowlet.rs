#![forbid(unsafe_code)]

//! Flowlet table: per-flow sticky port with an inactivity timeout.
//!
//! A flow keeps its port while packets keep arriving within `timeout` of each other. Once
//! a gap exceeds the timeout the next packet starts a new flowlet and the caller's
//! selector picks a port again; the previous port is handed to the selector so it can be
//! preferred when it is still among the best.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use conga_core::{FlowId, PortId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flowlet {
    pub port: PortId,
    pub active_at: Instant,
}

/// How a packet's port was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    /// Live flowlet, cached port reused without consulting the selector.
    Hit,
    /// First packet of a flow the table has never seen.
    New,
    /// Expired flowlet; the selector returned the same port it had before.
    Renewed,
    /// Expired flowlet; the selector moved the flow to a different port.
    Moved { from: PortId },
}

#[derive(Debug, Clone)]
pub struct FlowletTable {
    entries: HashMap<FlowId, Flowlet>,
    timeout: Duration,
}

impl FlowletTable {
    pub fn new(timeout: Duration) -> Self {
        Self { entries: HashMap::new(), timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Return the port for `flow_id` at `now`.
    ///
    /// On a live flowlet the cached port is returned and its timestamp refreshed. Otherwise
    /// `select` is called with the expired flowlet's port (if any) and its answer is
    /// recorded as the flow's new flowlet.
    pub fn get_or_assign<F>(&mut self, flow_id: FlowId, now: Instant, select: F) -> (PortId, Assignment)
    where
        F: FnOnce(Option<PortId>) -> PortId,
    {
        let timeout = self.timeout;
        match self.entries.get_mut(&flow_id) {
            Some(flowlet) if now.saturating_duration_since(flowlet.active_at) <= timeout => {
                flowlet.active_at = now;
                (flowlet.port, Assignment::Hit)
            }
            Some(flowlet) => {
                let previous = flowlet.port;
                let port = select(Some(previous));
                // Same port: refresh in place rather than rebuilding the entry.
                flowlet.port = port;
                flowlet.active_at = now;
                let kind = if port == previous {
                    Assignment::Renewed
                } else {
                    Assignment::Moved { from: previous }
                };
                (port, kind)
            }
            None => {
                let port = select(None);
                self.entries.insert(flow_id, Flowlet { port, active_at: now });
                (port, Assignment::New)
            }
        }
    }

    pub fn get(&self, flow_id: FlowId) -> Option<&Flowlet> {
        self.entries.get(&flow_id)
    }

    /// Drop flowlets idle for longer than `max_idle`. Returns how many were removed.
    pub fn purge(&mut self, now: Instant, max_idle: Duration) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, f| now.saturating_duration_since(f.active_at) <= max_idle);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FlowId, &Flowlet)> + '_ {
        self.entries.iter().map(|(id, f)| (*id, f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_micros(50);

    #[test]
    fn live_flowlet_skips_selector() {
        let mut table = FlowletTable::new(TIMEOUT);
        let t0 = Instant::now();
        assert_eq!(table.get_or_assign(1, t0, |_| 3), (3, Assignment::New));
        let t1 = t0 + Duration::from_micros(40);
        let (port, kind) = table.get_or_assign(1, t1, |_| panic!("selector called on hit"));
        assert_eq!((port, kind), (3, Assignment::Hit));
        assert_eq!(table.get(1).unwrap().active_at, t1);
    }

    #[test]
    fn gap_equal_to_timeout_is_still_live() {
        let mut table = FlowletTable::new(TIMEOUT);
        let t0 = Instant::now();
        table.get_or_assign(1, t0, |_| 2);
        let (_, kind) = table.get_or_assign(1, t0 + TIMEOUT, |_| 5);
        assert_eq!(kind, Assignment::Hit);
    }

    #[test]
    fn expired_flowlet_passes_previous_port() {
        let mut table = FlowletTable::new(TIMEOUT);
        let t0 = Instant::now();
        table.get_or_assign(1, t0, |_| 2);
        let later = t0 + Duration::from_micros(51);
        let mut seen = None;
        let (port, kind) = table.get_or_assign(1, later, |prev| {
            seen = prev;
            4
        });
        assert_eq!(seen, Some(2));
        assert_eq!((port, kind), (4, Assignment::Moved { from: 2 }));
    }

    #[test]
    fn expired_flowlet_same_port_is_renewed() {
        let mut table = FlowletTable::new(TIMEOUT);
        let t0 = Instant::now();
        table.get_or_assign(7, t0, |_| 2);
        let later = t0 + Duration::from_millis(1);
        assert_eq!(table.get_or_assign(7, later, |prev| prev.unwrap()), (2, Assignment::Renewed));
        assert_eq!(table.get(7).unwrap().active_at, later);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn purge_removes_idle_entries() {
        let mut table = FlowletTable::new(TIMEOUT);
        let t0 = Instant::now();
        table.get_or_assign(1, t0, |_| 1);
        table.get_or_assign(2, t0 + Duration::from_millis(5), |_| 1);
        let removed = table.purge(t0 + Duration::from_millis(8), Duration::from_millis(4));
        assert_eq!(removed, 1);
        assert!(table.get(1).is_none());
        assert!(table.get(2).is_some());
    }
}
