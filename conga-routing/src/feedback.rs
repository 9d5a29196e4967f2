#![forbid(unsafe_code)]

//! Feedback tables exchanged between leaves by piggybacking on data packets.
//!
//! * [`CongestionToLeaf`]: what remote leaves told us about the paths *to* them, indexed
//!   by our own uplink. Used by port selection.
//! * [`CongestionFromLeaf`]: what we measured on traffic arriving *from* remote leaves,
//!   indexed by the sender's uplink. Waiting to be piggybacked back to the sender.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use conga_core::{LeafId, PiggybackCursor, PortId};

use crate::tag::Feedback;

/// Last congestion level a remote leaf reported for one of our uplinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteMetric {
    pub level: u32,
    pub updated_at: Instant,
}

#[derive(Debug, Clone, Default)]
pub struct CongestionToLeaf {
    table: BTreeMap<LeafId, BTreeMap<PortId, RemoteMetric>>,
}

impl CongestionToLeaf {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a reported level, replacing whatever was there.
    pub fn record(&mut self, leaf: LeafId, port: PortId, level: u32, now: Instant) {
        self.table
            .entry(leaf)
            .or_default()
            .insert(port, RemoteMetric { level, updated_at: now });
    }

    /// Reported level for `(leaf, port)`; zero until the first report.
    pub fn level(&self, leaf: LeafId, port: PortId) -> u32 {
        self.get(leaf, port).map_or(0, |m| m.level)
    }

    pub fn get(&self, leaf: LeafId, port: PortId) -> Option<&RemoteMetric> {
        self.table.get(&leaf).and_then(|ports| ports.get(&port))
    }

    /// Reset levels older than `window` to zero. Entries are kept.
    ///
    /// Returns `true` while any entry is still within its window.
    pub fn age(&mut self, now: Instant, window: Duration) -> bool {
        let mut live = false;
        for metric in self.table.values_mut().flat_map(|ports| ports.values_mut()) {
            if now.saturating_duration_since(metric.updated_at) > window {
                metric.level = 0;
            } else {
                live = true;
            }
        }
        live
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (LeafId, PortId, &RemoteMetric)> + '_ {
        self.table
            .iter()
            .flat_map(|(leaf, ports)| ports.iter().map(move |(port, m)| (*leaf, *port, m)))
    }
}

/// Congestion measured on traffic from a remote leaf, pending piggyback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedbackEntry {
    pub ce: u32,
    /// Set on every update, cleared once the value has been piggybacked.
    pub changed: bool,
    pub updated_at: Instant,
}

#[derive(Debug, Clone)]
enum Cursor {
    Shared(u64),
    PerLeaf(HashMap<LeafId, u64>),
}

impl Cursor {
    /// Current position for `leaf`, advancing it for next time.
    fn advance(&mut self, leaf: LeafId) -> u64 {
        let slot = match self {
            Cursor::Shared(pos) => pos,
            Cursor::PerLeaf(positions) => positions.entry(leaf).or_insert(0),
        };
        let current = *slot;
        *slot = slot.wrapping_add(1);
        current
    }
}

#[derive(Debug, Clone)]
pub struct CongestionFromLeaf {
    table: BTreeMap<LeafId, BTreeMap<PortId, FeedbackEntry>>,
    cursor: Cursor,
}

impl CongestionFromLeaf {
    pub fn new(mode: PiggybackCursor) -> Self {
        let cursor = match mode {
            PiggybackCursor::Shared => Cursor::Shared(0),
            PiggybackCursor::PerLeaf => Cursor::PerLeaf(HashMap::new()),
        };
        Self { table: BTreeMap::new(), cursor }
    }

    /// Store the congestion seen on a packet that `leaf` sent through its uplink `port`.
    pub fn record(&mut self, leaf: LeafId, port: PortId, ce: u32, now: Instant) {
        self.table
            .entry(leaf)
            .or_default()
            .insert(port, FeedbackEntry { ce, changed: true, updated_at: now });
    }

    pub fn get(&self, leaf: LeafId, port: PortId) -> Option<&FeedbackEntry> {
        self.table.get(&leaf).and_then(|ports| ports.get(&port))
    }

    /// Pick the sample to piggyback on the next packet toward `leaf`.
    ///
    /// Walks the leaf's entries round-robin starting at the cursor, taking the first entry
    /// whose value changed since it was last sent; if none changed, the entry under the
    /// cursor is resent. The picked entry's `changed` flag is cleared. `None` when nothing
    /// is known about `leaf` yet.
    pub fn next_piggyback(&mut self, leaf: LeafId) -> Option<Feedback> {
        let entries = self.table.get_mut(&leaf).filter(|e| !e.is_empty())?;
        let len = entries.len();
        let start = (self.cursor.advance(leaf) % len as u64) as usize;

        let changed: Vec<bool> = entries.values().map(|e| e.changed).collect();
        let pick = (0..len)
            .map(|offset| (start + offset) % len)
            .find(|&i| changed[i])
            .unwrap_or(start);

        let (port, entry) = entries.iter_mut().nth(pick)?;
        entry.changed = false;
        Some(Feedback { port: *port, metric: entry.ce })
    }

    /// Remove entries not refreshed within `window`, and leaves left with no entries.
    ///
    /// Returns `true` while any entry remains.
    pub fn age(&mut self, now: Instant, window: Duration) -> bool {
        self.table.retain(|_, ports| {
            ports.retain(|_, e| now.saturating_duration_since(e.updated_at) <= window);
            !ports.is_empty()
        });
        !self.table.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (LeafId, PortId, &FeedbackEntry)> + '_ {
        self.table
            .iter()
            .flat_map(|(leaf, ports)| ports.iter().map(move |(port, e)| (*leaf, *port, e)))
    }
}
