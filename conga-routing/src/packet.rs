#![forbid(unsafe_code)]

//! The slice of a packet a routing decision needs to see.

use std::net::Ipv4Addr;

use conga_core::FlowId;

use crate::tag::CongaTag;

/// Addresses, flow identity, size and the optional congestion tag of one packet.
///
/// The tag travels alongside the packet; switches add, replace or strip it explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub flow_id: Option<FlowId>,
    /// Bytes on the wire, headers included.
    pub size: u32,
    tag: Option<CongaTag>,
}

impl Packet {
    pub fn new(src: Ipv4Addr, dst: Ipv4Addr, flow_id: FlowId, size: u32) -> Self {
        Self { src, dst, flow_id: Some(flow_id), size, tag: None }
    }

    /// Packet without a flow identifier, as produced by a misbehaving classifier.
    pub fn unclassified(src: Ipv4Addr, dst: Ipv4Addr, size: u32) -> Self {
        Self { src, dst, flow_id: None, size, tag: None }
    }

    pub fn tag(&self) -> Option<&CongaTag> {
        self.tag.as_ref()
    }

    /// Attach a tag. Returns the tag that was already attached, if any.
    pub fn add_tag(&mut self, tag: CongaTag) -> Option<CongaTag> {
        self.tag.replace(tag)
    }

    /// Overwrite the attached tag. Does nothing on an untagged packet.
    pub fn replace_tag(&mut self, tag: CongaTag) -> bool {
        match self.tag.as_mut() {
            Some(current) => {
                *current = tag;
                true
            }
            None => false,
        }
    }

    pub fn remove_tag(&mut self) -> Option<CongaTag> {
        self.tag.take()
    }
}
