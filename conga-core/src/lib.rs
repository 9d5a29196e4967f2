#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod rate;
pub mod types;

pub use config::{
    DreConfig, HostEntry, InitialCongestion, PiggybackCursor, PortCapacity, RouteConfig,
    SwitchConfig, SwitchRole,
};
pub use error::{CongaError, CongaResult};
pub use rate::DataRate;
pub use types::{FlowId, LeafId, PortId};
