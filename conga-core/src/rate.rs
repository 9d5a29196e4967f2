#![forbid(unsafe_code)]

//! Link data rates written the way topology files usually write them (`"10Gbps"`,
//! `"100Mbps"`, `"1.5Gbps"`). Stored internally as bits per second.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CongaError;

/// A link capacity in bits per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DataRate(u64);

impl DataRate {
    pub const fn from_bps(bps: u64) -> Self {
        Self(bps)
    }

    pub const fn from_mbps(mbps: u64) -> Self {
        Self(mbps * 1_000_000)
    }

    pub const fn from_gbps(gbps: u64) -> Self {
        Self(gbps * 1_000_000_000)
    }

    /// Bits per second.
    #[must_use]
    pub const fn bps(&self) -> u64 {
        self.0
    }
}

impl Default for DataRate {
    fn default() -> Self {
        Self::from_gbps(1)
    }
}

// Longest suffixes first so "Mbps" is not mistaken for "bps".
const UNITS: &[(&str, f64)] = &[
    ("Tbps", 1e12),
    ("Gbps", 1e9),
    ("Mbps", 1e6),
    ("kbps", 1e3),
    ("Kbps", 1e3),
    ("TBps", 8e12),
    ("GBps", 8e9),
    ("MBps", 8e6),
    ("kBps", 8e3),
    ("KBps", 8e3),
    ("bps", 1.0),
    ("Bps", 8.0),
];

impl FromStr for DataRate {
    type Err = CongaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (number, scale) = UNITS
            .iter()
            .find_map(|(suffix, scale)| trimmed.strip_suffix(suffix).map(|n| (n, *scale)))
            .ok_or_else(|| CongaError::InvalidDataRate(s.to_string()))?;
        let value: f64 = number
            .trim()
            .parse()
            .map_err(|_| CongaError::InvalidDataRate(s.to_string()))?;
        if !value.is_finite() || value < 0.0 {
            return Err(CongaError::InvalidDataRate(s.to_string()));
        }
        Ok(Self((value * scale).round() as u64))
    }
}

impl TryFrom<String> for DataRate {
    type Error = CongaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DataRate> for String {
    fn from(rate: DataRate) -> Self {
        rate.to_string()
    }
}

impl fmt::Display for DataRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}bps", self.0)
    }
}
