//! Discounted Rate Estimator (DRE).
//!
//! One byte accumulator `X` per egress port. Every forwarded packet adds its size to the
//! accumulator of the port it leaves through; every `tdre` the aging engine multiplies all
//! accumulators by `1 - alpha`. In steady state `X ≈ rate * tdre / alpha`, so dividing by
//! the same quantity computed at link capacity yields utilisation, which is then scaled to
//! a small integer level in `0..=2^Q`.

#![forbid(unsafe_code)]

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use conga_core::{DataRate, PortId, SwitchConfig};

#[derive(Debug, Clone)]
pub struct Dre {
    accumulators: BTreeMap<PortId, u64>,
    default_capacity: DataRate,
    capacities: HashMap<PortId, DataRate>,
    tdre: Duration,
    alpha: f64,
    quantize_bits: u32,
}

impl Dre {
    /// `alpha` is the decay factor in `(0, 1]` and `quantize_bits` the width `Q` of the level.
    pub fn new(tdre: Duration, alpha: f64, quantize_bits: u32, default_capacity: DataRate) -> Self {
        Self {
            accumulators: BTreeMap::new(),
            default_capacity,
            capacities: HashMap::new(),
            tdre,
            alpha,
            quantize_bits,
        }
    }

    pub fn from_config(cfg: &SwitchConfig) -> Self {
        let mut dre = Self::new(cfg.dre.tdre(), cfg.dre.alpha, cfg.dre.quantize_bits, cfg.dre.link_capacity);
        for pc in &cfg.dre.port_capacity {
            dre.set_capacity(pc.port, cfg.capacity_of(pc.port));
        }
        dre
    }

    /// Override the capacity of one port (asymmetric links).
    pub fn set_capacity(&mut self, port: PortId, capacity: DataRate) {
        self.capacities.insert(port, capacity);
    }

    pub fn capacity(&self, port: PortId) -> DataRate {
        self.capacities.get(&port).copied().unwrap_or(self.default_capacity)
    }

    /// Decay period.
    pub fn period(&self) -> Duration {
        self.tdre
    }

    /// Highest level `quantized_level` can return.
    pub fn max_level(&self) -> u32 {
        1u32 << self.quantize_bits
    }

    /// Account `bytes` leaving through `port`. Returns the new accumulator value.
    pub fn record_bytes(&mut self, port: PortId, bytes: u64) -> u64 {
        let x = self.accumulators.entry(port).or_insert(0);
        *x = x.saturating_add(bytes);
        *x
    }

    /// Raw accumulator of `port`; zero for ports never seen.
    pub fn accumulator(&self, port: PortId) -> u64 {
        self.accumulators.get(&port).copied().unwrap_or(0)
    }

    pub fn quantized_level(&self, port: PortId) -> u32 {
        self.quantize(port, self.accumulator(port))
    }

    /// Convert a byte accumulator into a congestion level for `port`.
    pub fn quantize(&self, port: PortId, x: u64) -> u32 {
        // Bits the link carries in one period; may be fractional on slow links.
        let period_bits = self.capacity(port).bps() as f64 * self.tdre.as_secs_f64();
        if period_bits == 0.0 {
            return 0;
        }
        // X * 8 / (C * tdre / alpha), rearranged so alpha multiplies instead of divides.
        let ratio = (x as f64 * 8.0 * self.alpha) / period_bits;
        // The epsilon absorbs binary rounding of alpha on exact level boundaries.
        let level = (ratio * f64::from(self.max_level()) + 1e-9).floor();
        (level as u32).min(self.max_level())
    }

    /// One decay step: `X *= 1 - alpha` on every port.
    ///
    /// Returns `true` while at least one accumulator is still non-zero.
    pub fn decay(&mut self) -> bool {
        let keep = 1.0 - self.alpha;
        let mut live = false;
        for x in self.accumulators.values_mut() {
            *x = (*x as f64 * keep) as u64;
            live |= *x != 0;
        }
        live
    }

    pub fn is_idle(&self) -> bool {
        self.accumulators.values().all(|x| *x == 0)
    }

    /// `(port, accumulator)` pairs in port order.
    pub fn iter(&self) -> impl Iterator<Item = (PortId, u64)> + '_ {
        self.accumulators.iter().map(|(p, x)| (*p, *x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 1 Gbps, 200 us, alpha 0.2 → full scale is 1e6 bits = 125 000 bytes.
    fn reference() -> Dre {
        Dre::new(Duration::from_micros(200), 0.2, 3, DataRate::from_gbps(1))
    }

    #[test]
    fn unknown_port_is_zero() {
        let dre = reference();
        assert_eq!(dre.accumulator(9), 0);
        assert_eq!(dre.quantized_level(9), 0);
        assert!(dre.is_idle());
    }

    #[test]
    fn quantizes_against_capacity() {
        let mut dre = reference();
        dre.record_bytes(1, 62_500);
        assert_eq!(dre.quantized_level(1), 4);
        dre.record_bytes(1, 62_500);
        assert_eq!(dre.quantized_level(1), 8);
    }

    #[test]
    fn level_is_clamped() {
        let mut dre = reference();
        dre.record_bytes(1, 10_000_000);
        assert_eq!(dre.quantized_level(1), dre.max_level());
    }

    #[test]
    fn per_port_capacity_changes_level() {
        let mut dre = reference();
        dre.set_capacity(2, DataRate::from_mbps(500));
        dre.record_bytes(1, 31_250);
        dre.record_bytes(2, 31_250);
        assert_eq!(dre.quantized_level(1), 2);
        assert_eq!(dre.quantized_level(2), 4);
    }

    #[test]
    fn sub_bit_period_still_saturates() {
        // 64 bps over 200 us is 0.0128 bits per period.
        let mut dre = Dre::new(Duration::from_micros(200), 0.2, 3, DataRate::from_bps(64));
        dre.record_bytes(1, 1500);
        assert_eq!(dre.quantized_level(1), dre.max_level());
    }

    #[test]
    fn fractional_period_bits_are_not_truncated() {
        // 7 kbps over 200 us is 1.4 bits; 88 * 0.01 / 1.4 = 0.629 of full scale.
        let mut dre = Dre::new(Duration::from_micros(200), 0.01, 3, DataRate::from_bps(7_000));
        dre.record_bytes(1, 11);
        assert_eq!(dre.quantized_level(1), 5);
    }

    #[test]
    fn zero_capacity_port_reports_zero() {
        let mut dre = reference();
        dre.set_capacity(1, DataRate::from_bps(0));
        dre.record_bytes(1, 1500);
        assert_eq!(dre.quantized_level(1), 0);
    }

    #[test]
    fn config_overrides_use_last_entry() {
        let mut cfg = SwitchConfig::leaf(1);
        cfg.dre.port_capacity = vec![
            conga_core::PortCapacity { port: 2, capacity: DataRate::from_gbps(10) },
            conga_core::PortCapacity { port: 2, capacity: DataRate::from_mbps(500) },
        ];
        let dre = Dre::from_config(&cfg);
        assert_eq!(dre.capacity(2), DataRate::from_mbps(500));
        assert_eq!(dre.capacity(1), cfg.dre.link_capacity);
    }

    #[test]
    fn decay_reaches_zero() {
        let mut dre = reference();
        dre.record_bytes(1, 100_000);
        assert!(dre.decay());
        assert_eq!(dre.accumulator(1), 80_000);
        let mut steps = 0;
        while dre.decay() {
            steps += 1;
            assert!(steps < 1_000, "decay never converged");
        }
        assert!(dre.is_idle());
        assert!(!dre.decay());
    }
}
