#![forbid(unsafe_code)]

//! Conga congestion-aware flowlet routing for two-tier leaf-spine fabrics.
//!
//! Leaves split each flow into flowlets and send every new flowlet over the uplink whose
//! path to the destination leaf is least congested, combining their own DRE measurement
//! with what the destination leaf reported back. Spines forward by flow hash and stamp
//! the worst congestion seen along the way into the packet's [`CongaTag`]. Reports travel
//! back piggybacked on ordinary traffic in the reverse direction.
//!
//! Build a switch with [`Switch::from_config`], feed packets through
//! [`PacketHandler::handle_packet`] and either call [`PacketHandler::run_timers`] from
//! your own clock or let [`driver::spawn_timer_driver`] do it on tokio.

pub mod aging;
pub mod driver;
pub mod dre;
mod error;
pub mod event;
pub mod feedback;
pub mod flowlet;
pub mod packet;
pub mod route;
pub mod selection;
pub mod switch;
pub mod tag;

pub use aging::{AgingEngine, TimerKind};
pub use driver::{spawn_timer_driver, SharedSwitch, TimerHandle};
pub use dre::Dre;
pub use error::{RoutingError, RoutingResult};
pub use event::{EventLog, NoopObserver, RoutingEvent, RoutingObserver};
pub use feedback::{CongestionFromLeaf, CongestionToLeaf};
pub use flowlet::{Assignment, FlowletTable};
pub use packet::Packet;
pub use route::{RouteEntry, RouteTable};
pub use selection::PortCongestion;
pub use switch::{LeafSwitch, PacketHandler, SpineSwitch, Switch, SwitchStats};
pub use tag::{parse_tag, CongaTag, Feedback, TAG_LEN};
