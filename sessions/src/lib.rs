//! Sessions crate
//!
//! The session management core of a mesh overlay node. It sits between the
//! switch layer, which moves opaque packets along labelled paths, and the
//! inside layer, which consumes and produces decrypted packets addressed to
//! cryptographically derived IPv6 addresses.
//!
//! The [`SessionManager`] owns:
//!
//! - a session table indexed both by the peer's overlay address and by a
//!   locally assigned receive handle, so run packets dispatch without a
//!   handshake header;
//! - a bounded buffer of at most one pending outbound packet per peer,
//!   held while a route lookup is in flight and evicted after 10 seconds;
//! - the packet transforms in both directions, working in place on a
//!   single contiguous buffer;
//! - the event protocol with the pathfinder: `SESSION`, `SESSION_ENDED`,
//!   `DISCOVERED_PATH` and `SEARCH_REQ` out, `NODE` and `SESSIONS` in.
//!
//! # Scheduling model
//!
//! Everything runs on one cooperative event loop. The embedding node calls
//! [`SessionManager::incoming_from_switch`],
//! [`SessionManager::incoming_from_inside`] and
//! [`SessionManager::incoming_event`] as packets and frames arrive, and
//! [`SessionManager::check_timed_out_buffers`] every
//! [`SWEEP_INTERVAL_MILLIS`]. Each call returns the packet to forward on
//! the opposite interface, if any; pathfinder emissions go through the
//! [`EventSink`] handed to the constructor. There is no internal locking
//! and no suspension point within a single packet's processing.
//!
//! # External collaborators
//!
//! Cryptography is behind the `crypto-session` traits, time behind
//! [`Clock`], and the event bus behind [`EventSink`]. Nothing here
//! performs a handshake, derives an address or reads a wall clock
//! directly.

mod buffer;
mod config;
mod session_manager;
mod session_table;
mod utils;

pub use config::SessionManagerConfig;
pub use session_manager::{EventSink, SessionManager, SWEEP_INTERVAL_MILLIS};
pub use session_table::{Session, MAX_FIRST_HANDLE, MIN_FIRST_HANDLE};
pub use utils::{Clock, SystemClock};
