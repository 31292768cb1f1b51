//! Wire crate
//!
//! Byte-level plumbing shared by the switch-facing and inside-facing halves
//! of the node: the [`Message`] packet buffer, the fixed-layout headers
//! exchanged on the wire and between components, and the framing of the
//! pathfinder event channel.
//!
//! All multi-byte wire fields are big-endian.

pub mod events;
pub mod headers;
pub mod message;

pub use headers::{CryptoHeader, Ip6, PublicKey, RouteHeader, SwitchHeader};
pub use message::Message;
