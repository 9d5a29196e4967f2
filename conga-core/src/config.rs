#![forbid(unsafe_code)]

//! Switch configuration handling. Parses a TOML file into a strongly-typed structure
//! describing one switch: its role, DRE parameters, timeouts, and the topology facts
//! (routes, host-to-leaf map) installed once at build time.
//!
//! ```toml
//! flowlet_timeout_us = 50
//! aging_time_us = 10000
//! piggyback = "per-leaf"
//!
//! [role]
//! kind = "leaf"
//! leaf_id = 1
//!
//! [dre]
//! tdre_us = 200
//! alpha = 0.2
//! quantize_bits = 3
//! link_capacity = "10Gbps"
//!
//! [[routes]]
//! network = "10.0.2.0"
//! mask = "255.255.255.0"
//! port = 1
//!
//! [[hosts]]
//! address = "10.0.2.1"
//! leaf = 2
//! ```

use serde::{Deserialize, Serialize};
use std::{fs, net::Ipv4Addr, path::Path, time::Duration};

use crate::{CongaError, DataRate, LeafId, PortId};

/// Role a switch plays in the leaf-spine fabric. Chosen once when the switch is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SwitchRole {
    /// Attached to hosts; originates and terminates the feedback protocol.
    Leaf { leaf_id: LeafId },
    /// Interconnects leaves; only estimates congestion and stamps it into tags.
    Spine,
}

impl Default for SwitchRole {
    fn default() -> Self {
        SwitchRole::Spine
    }
}

/// How a leaf walks its Congestion-From-Leaf entries when choosing a piggyback sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PiggybackCursor {
    /// One round-robin position per destination leaf.
    PerLeaf,
    /// A single position shared by all destination leaves.
    Shared,
}

impl Default for PiggybackCursor {
    fn default() -> Self {
        PiggybackCursor::PerLeaf
    }
}

/// Link capacity override for a single port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortCapacity {
    pub port: PortId,
    pub capacity: DataRate,
}

/// Discounted rate estimator parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DreConfig {
    /// Decay period in microseconds.
    pub tdre_us: u64,
    /// Multiplicative decay factor applied every period.
    pub alpha: f64,
    /// Quantization width in bits; levels fall in `0..=2^Q`.
    pub quantize_bits: u32,
    /// Capacity used for every port without an override.
    pub link_capacity: DataRate,
    pub port_capacity: Vec<PortCapacity>,
}

impl Default for DreConfig {
    fn default() -> Self {
        Self {
            tdre_us: 200,
            alpha: 0.2,
            quantize_bits: 3,
            link_capacity: DataRate::from_gbps(1),
            port_capacity: Vec::new(),
        }
    }
}

impl DreConfig {
    pub fn tdre(&self) -> Duration {
        Duration::from_micros(self.tdre_us)
    }
}

/// A `network/mask -> port` route entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    pub network: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub port: PortId,
}

/// One entry of the address to leaf identity map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostEntry {
    pub address: Ipv4Addr,
    pub leaf: LeafId,
}

/// Congestion level assumed for `(leaf, port)` before any feedback arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialCongestion {
    pub leaf: LeafId,
    pub port: PortId,
    pub level: u32,
}

/// Complete configuration of one switch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchConfig {
    pub role: SwitchRole,

    pub dre: DreConfig,

    /// Inactivity gap after which a flow starts a new flowlet.
    pub flowlet_timeout_us: u64,

    /// Staleness window for the feedback tables.
    pub aging_time_us: u64,

    pub piggyback: PiggybackCursor,

    /// Forward by flow hash only, bypassing congestion-aware selection.
    pub ecmp_mode: bool,

    /// Seed for the tie-breaking RNG. Random when omitted.
    pub seed: Option<u64>,

    pub routes: Vec<RouteConfig>,

    pub hosts: Vec<HostEntry>,

    pub initial_congestion: Vec<InitialCongestion>,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self {
            role: SwitchRole::default(),
            dre: DreConfig::default(),
            flowlet_timeout_us: default_flowlet_timeout_us(),
            aging_time_us: default_aging_time_us(),
            piggyback: PiggybackCursor::default(),
            ecmp_mode: false,
            seed: None,
            routes: Vec::new(),
            hosts: Vec::new(),
            initial_congestion: Vec::new(),
        }
    }
}

fn default_flowlet_timeout_us() -> u64 {
    50
}

fn default_aging_time_us() -> u64 {
    10_000
}

impl SwitchConfig {
    /// Default configuration for a leaf switch.
    pub fn leaf(leaf_id: LeafId) -> Self {
        Self {
            role: SwitchRole::Leaf { leaf_id },
            ..Default::default()
        }
    }

    /// Default configuration for a spine switch.
    pub fn spine() -> Self {
        Self::default()
    }

    /// Load and validate a configuration file from the given path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::CongaResult<Self> {
        let data = fs::read_to_string(&path).map_err(CongaError::from)?;
        let cfg = Self::from_toml_str(&data)?;
        tracing::debug!(path = %path.as_ref().display(), role = ?cfg.role, "loaded switch config");
        Ok(cfg)
    }

    /// Parse and validate a configuration from TOML text.
    pub fn from_toml_str(data: &str) -> crate::CongaResult<Self> {
        let cfg = toml::from_str::<SwitchConfig>(data).map_err(CongaError::ConfigParse)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn flowlet_timeout(&self) -> Duration {
        Duration::from_micros(self.flowlet_timeout_us)
    }

    pub fn aging_time(&self) -> Duration {
        Duration::from_micros(self.aging_time_us)
    }

    /// Capacity configured for `port`, falling back to the default link capacity.
    pub fn capacity_of(&self, port: PortId) -> DataRate {
        self.dre
            .port_capacity
            .iter()
            .rev()
            .find(|pc| pc.port == port)
            .map(|pc| pc.capacity)
            .unwrap_or(self.dre.link_capacity)
    }

    /// Check parameter ranges that the estimator and tables rely on.
    pub fn validate(&self) -> crate::CongaResult<()> {
        let invalid = |msg: String| Err(CongaError::InvalidConfig(msg));

        if !(self.dre.alpha > 0.0 && self.dre.alpha <= 1.0) {
            return invalid(format!("dre.alpha must be in (0, 1], got {}", self.dre.alpha));
        }
        if self.dre.tdre_us == 0 {
            return invalid("dre.tdre_us must be positive".into());
        }
        if !(1..=16).contains(&self.dre.quantize_bits) {
            return invalid(format!(
                "dre.quantize_bits must be in 1..=16, got {}",
                self.dre.quantize_bits
            ));
        }
        if self.dre.link_capacity.bps() == 0 {
            return invalid("dre.link_capacity must be non-zero".into());
        }
        if let Some(pc) = self.dre.port_capacity.iter().find(|pc| pc.capacity.bps() == 0) {
            return invalid(format!("capacity of port {} must be non-zero", pc.port));
        }
        if self.aging_time_us == 0 {
            return invalid("aging_time_us must be positive".into());
        }
        if let Some(route) = self.routes.iter().find(|r| r.port == 0) {
            return invalid(format!(
                "route {}/{} uses reserved port 0",
                route.network, route.mask
            ));
        }
        if let Some(init) = self.initial_congestion.iter().find(|c| c.port == 0) {
            return invalid(format!(
                "initial congestion for leaf {} uses reserved port 0",
                init.leaf
            ));
        }
        Ok(())
    }
}
