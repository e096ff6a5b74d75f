//! Binary wire format shared by discovery and the UDP transfer protocol.
//!
//! Every message starts with the same header: a 32-bit magic cookie that
//! filters out unrelated traffic on the wire, followed by a one-byte message
//! type. All multi-byte integers are big-endian.
//!
//! # Message Layouts
//!
//! ```text
//! Offer    | cookie (4) | 0x02 | udp_port (2) | tcp_port (2) |
//! Request  | cookie (4) | 0x03 | requested_size (8)          |
//! Payload  | cookie (4) | 0x04 | total_segments (8) | segment_index (8) | payload (<=1024) |
//! ```
//!
//! Decoding a buffer that is too short, carries the wrong cookie, or carries
//! an unexpected type fails with [`Error::MalformedMessage`]. Callers treat
//! that as "ignore and keep listening", never as a fatal condition.

use crate::{Error, Result};

/// Default magic cookie prefixing every message.
pub const MAGIC_COOKIE: u32 = 0xABCD_DCBA;

/// Message type tag for [`Offer`].
pub const MSG_OFFER: u8 = 0x02;
/// Message type tag for [`Request`].
pub const MSG_REQUEST: u8 = 0x03;
/// Message type tag for [`PayloadHeader`].
pub const MSG_PAYLOAD: u8 = 0x04;

/// Number of segments needed to carry `size` bytes in segments of `capacity`.
///
/// # Examples
///
/// ```
/// use netblast::wire::total_segments;
///
/// assert_eq!(total_segments(1024, 1024), 1);
/// assert_eq!(total_segments(1025, 1024), 2);
/// assert_eq!(total_segments(0, 1024), 0);
/// ```
pub fn total_segments(size: u64, capacity: u64) -> u64 {
    size.div_ceil(capacity)
}

fn check_header(buf: &[u8], cookie: u32, msg_type: u8, required: usize) -> Result<()> {
    if buf.len() < required {
        return Err(Error::MalformedMessage("message shorter than header"));
    }
    let got_cookie = u32::from_be_bytes(buf[0..4].try_into().unwrap());
    if got_cookie != cookie {
        return Err(Error::MalformedMessage("magic cookie mismatch"));
    }
    if buf[4] != msg_type {
        return Err(Error::MalformedMessage("unexpected message type"));
    }
    Ok(())
}

/// Server announcement broadcast during discovery.
///
/// Carries the UDP and TCP ports the server allocated at startup. The offer
/// is stateless: there is no sequence number and no reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Offer {
    pub udp_port: u16,
    pub tcp_port: u16,
}

impl Offer {
    /// Encoded size in bytes.
    pub const SIZE: usize = 9;

    /// Serializes the offer with the given cookie.
    pub fn encode(&self, cookie: u32) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&cookie.to_be_bytes());
        bytes[4] = MSG_OFFER;
        bytes[5..7].copy_from_slice(&self.udp_port.to_be_bytes());
        bytes[7..9].copy_from_slice(&self.tcp_port.to_be_bytes());
        bytes
    }

    /// Decodes an offer, validating cookie and message type.
    pub fn decode(buf: &[u8], cookie: u32) -> Result<Self> {
        check_header(buf, cookie, MSG_OFFER, Self::SIZE)?;
        Ok(Self {
            udp_port: u16::from_be_bytes(buf[5..7].try_into().unwrap()),
            tcp_port: u16::from_be_bytes(buf[7..9].try_into().unwrap()),
        })
    }
}

/// Transfer request sent once by a UDP client to initiate a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    /// Requested transfer size in bytes.
    pub size: u64,
}

impl Request {
    /// Encoded size in bytes.
    pub const SIZE: usize = 13;

    pub fn encode(&self, cookie: u32) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&cookie.to_be_bytes());
        bytes[4] = MSG_REQUEST;
        bytes[5..13].copy_from_slice(&self.size.to_be_bytes());
        bytes
    }

    pub fn decode(buf: &[u8], cookie: u32) -> Result<Self> {
        check_header(buf, cookie, MSG_REQUEST, Self::SIZE)?;
        Ok(Self {
            size: u64::from_be_bytes(buf[5..13].try_into().unwrap()),
        })
    }
}

/// Header prefixing every UDP payload segment.
///
/// Each segment is tagged with the transfer's total segment count and its
/// own index so the receiver can account for loss without acknowledgments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadHeader {
    pub total_segments: u64,
    pub segment_index: u64,
}

impl PayloadHeader {
    /// Encoded header size in bytes (payload bytes follow).
    pub const SIZE: usize = 21;

    /// Builds a complete segment datagram: header followed by payload bytes.
    pub fn encode_with(&self, payload: &[u8], cookie: u32) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::SIZE + payload.len());
        bytes.extend_from_slice(&cookie.to_be_bytes());
        bytes.push(MSG_PAYLOAD);
        bytes.extend_from_slice(&self.total_segments.to_be_bytes());
        bytes.extend_from_slice(&self.segment_index.to_be_bytes());
        bytes.extend_from_slice(payload);
        bytes
    }

    /// Splits a datagram into its header and payload bytes.
    pub fn decode(buf: &[u8], cookie: u32) -> Result<(Self, &[u8])> {
        check_header(buf, cookie, MSG_PAYLOAD, Self::SIZE)?;
        let header = Self {
            total_segments: u64::from_be_bytes(buf[5..13].try_into().unwrap()),
            segment_index: u64::from_be_bytes(buf[13..21].try_into().unwrap()),
        };
        Ok((header, &buf[Self::SIZE..]))
    }
}
