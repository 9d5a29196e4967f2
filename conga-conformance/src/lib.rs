#![forbid(unsafe_code)]

//! Conformance harness for the Conga routing engine.
//!
//! [`fabric::LeafSpineFabric`] wires leaf and spine switches together port by port and
//! walks packets through them, so tests can observe the whole piggyback loop without a
//! network simulator.

pub mod fabric;

pub use fabric::{Delivery, FabricError, FabricOpts, Hop, LeafSpineFabric};
