//! Framing of the pathfinder event channel.
//!
//! Every frame starts with a 4-byte event code and a 4-byte pathfinder id:
//! the destination on frames the core emits, the source on frames it
//! consumes. [`PF_BROADCAST`] as destination addresses every pathfinder.

use byteorder::{BigEndian, ByteOrder};

use crate::headers::{Ip6, PublicKey};
use crate::message::Message;

/// Destination pathfinder id meaning "all pathfinders".
pub const PF_BROADCAST: u32 = 0xffff_ffff;

/// Events the core emits towards the pathfinder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum CoreEvent {
    /// A session was created. Payload: [`NodeRecord`].
    Session = 16,
    /// A session was destroyed. Payload: [`NodeRecord`] with the last
    /// known send label as path.
    SessionEnded = 17,
    /// Ingress revealed a new path to an existing session. Payload:
    /// [`NodeRecord`] with the new path.
    DiscoveredPath = 18,
    /// An outbound packet is waiting on route discovery. Payload: the
    /// target [`Ip6`].
    SearchReq = 19,
}

/// Events the pathfinder sends to the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PathfinderEvent {
    /// A node record arrived. Payload: [`NodeRecord`].
    Node = 1,
    /// Enumerate all current sessions back to the source pathfinder.
    /// No payload.
    Sessions = 2,
}

impl PathfinderEvent {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::Node),
            2 => Some(Self::Sessions),
            _ => None,
        }
    }
}

/// The node description exchanged with the pathfinder.
#[derive(Debug, Clone, Copy)]
pub struct NodeRecord {
    pub path: u64,
    pub metric: u32,
    pub version: u32,
    pub ip6: Ip6,
    pub public_key: PublicKey,
}

impl NodeRecord {
    /// Wire size; the 20 bytes after the public key are reserved, zeroed
    /// on emit and ignored on parse.
    pub const SIZE: usize = 84;

    pub fn parse(bytes: &[u8]) -> Self {
        let mut ip6 = [0u8; 16];
        ip6.copy_from_slice(&bytes[16..32]);
        let mut public_key = [0u8; 32];
        public_key.copy_from_slice(&bytes[32..64]);
        Self {
            path: BigEndian::read_u64(&bytes[0..8]),
            metric: BigEndian::read_u32(&bytes[8..12]),
            version: BigEndian::read_u32(&bytes[12..16]),
            ip6: Ip6(ip6),
            public_key: PublicKey(public_key),
        }
    }

    pub fn write_to(&self, bytes: &mut [u8]) {
        BigEndian::write_u64(&mut bytes[0..8], self.path);
        BigEndian::write_u32(&mut bytes[8..12], self.metric);
        BigEndian::write_u32(&mut bytes[12..16], self.version);
        bytes[16..32].copy_from_slice(&self.ip6.0);
        bytes[32..64].copy_from_slice(&self.public_key.0);
        bytes[64..Self::SIZE].fill(0);
    }
}

/// Builds an event frame: code, pathfinder id, payload.
pub fn event_frame(code: u32, pathfinder: u32, payload: &[u8]) -> Message {
    let mut frame = Message::with_headroom(payload, 8);
    frame.push_front_u32(pathfinder);
    frame.push_front_u32(code);
    frame
}
