#![forbid(unsafe_code)]

//! Congestion tag carried by every packet between a source leaf and a destination leaf.
//!
//! Wire layout (16 bytes, big-endian):
//!
//! ```text
//! +----------+----------+----------+-----------+
//! | lb_tag   | ce       | fb_port  | fb_metric |
//! | u32      | u32      | u32      | u32       |
//! +----------+----------+----------+-----------+
//! ```
//!
//! `fb_port == 0` means the packet piggybacks no feedback.

use conga_core::PortId;
use nom::{number::complete::be_u32, IResult};

/// Encoded tag length in bytes.
pub const TAG_LEN: usize = 16;

const NO_FEEDBACK_PORT: PortId = 0;

/// A congestion sample one leaf reports back to another: "traffic you sent me via your
/// port `port` saw congestion `metric`".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Feedback {
    pub port: PortId,
    pub metric: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CongaTag {
    /// Uplink chosen by the source leaf.
    pub lb_tag: PortId,
    /// Worst quantized congestion seen along the path so far.
    pub ce: u32,
    /// Piggybacked sample for the destination leaf.
    pub feedback: Option<Feedback>,
}

impl CongaTag {
    pub fn new(lb_tag: PortId) -> Self {
        Self { lb_tag, ce: 0, feedback: None }
    }

    pub fn with_feedback(mut self, feedback: Option<Feedback>) -> Self {
        self.feedback = feedback;
        self
    }

    /// Raise `ce` to `level` if `level` is higher. Returns whether the tag changed.
    pub fn aggregate_ce(&mut self, level: u32) -> bool {
        if level > self.ce {
            self.ce = level;
            true
        } else {
            false
        }
    }

    pub fn to_bytes(&self) -> [u8; TAG_LEN] {
        let (fb_port, fb_metric) = match self.feedback {
            Some(fb) => (fb.port, fb.metric),
            None => (NO_FEEDBACK_PORT, 0),
        };
        let mut out = [0u8; TAG_LEN];
        out[0..4].copy_from_slice(&self.lb_tag.to_be_bytes());
        out[4..8].copy_from_slice(&self.ce.to_be_bytes());
        out[8..12].copy_from_slice(&fb_port.to_be_bytes());
        out[12..16].copy_from_slice(&fb_metric.to_be_bytes());
        out
    }
}

pub fn parse_tag(input: &[u8]) -> IResult<&[u8], CongaTag> {
    let (input, lb_tag) = be_u32(input)?;
    let (input, ce) = be_u32(input)?;
    let (input, fb_port) = be_u32(input)?;
    let (input, fb_metric) = be_u32(input)?;
    let feedback = (fb_port != NO_FEEDBACK_PORT).then_some(Feedback { port: fb_port, metric: fb_metric });
    Ok((input, CongaTag { lb_tag, ce, feedback }))
}
