use std::net::Ipv4Addr;
use thiserror::Error;

/// Result type for per-packet routing decisions.
pub type RoutingResult<T> = Result<T, RoutingError>;

/// Reasons a packet cannot be routed. Every variant is fatal for the packet it was
/// raised for: the switch drops it and the caller decides what to do next.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoutingError {
    #[error("only unicast destinations are routed, got {0}")]
    NotUnicast(Ipv4Addr),

    #[error("packet carries no flow id")]
    MissingFlowId,

    #[error("no route to {0}")]
    NoRouteFound(Ipv4Addr),

    #[error("address {0} is not mapped to a leaf")]
    UnknownLeafMapping(Ipv4Addr),

    #[error("spine received a packet without a congestion tag")]
    MissingCongaTag,
}

impl RoutingError {
    /// Short label for counters and log fields.
    pub fn reason(&self) -> &'static str {
        match self {
            RoutingError::NotUnicast(_) => "not_unicast",
            RoutingError::MissingFlowId => "missing_flow_id",
            RoutingError::NoRouteFound(_) => "no_route",
            RoutingError::UnknownLeafMapping(_) => "unknown_leaf",
            RoutingError::MissingCongaTag => "missing_tag",
        }
    }
}
