//! Identifiers shared by every switch in the fabric. All of them are stable for the
//! lifetime of the topology.

/// Leaf switch identifier.
pub type LeafId = u32;

/// Local egress port (interface index). Port 0 is reserved as the "no feedback"
/// sentinel in the congestion tag wire format and never names a real port.
pub type PortId = u32;

/// Per-flow identifier delivered by the transport layer with every packet.
pub type FlowId = u32;
