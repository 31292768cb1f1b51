//! Crypto-session crate
//!
//! Interfaces to the node's cryptographic layer. The session core never
//! performs cryptography itself: it drives a [`CryptoSession`] obtained
//! from a [`CryptoContext`] and relies on the wire contract below.
//!
//! # Wire contract
//!
//! Both transforms operate in place on the shared packet buffer.
//!
//! - While the session [`state`](CryptoSession::state) is before
//!   [`SessionState::Handshake3`], `encrypt` prepends a full handshake
//!   header ([`CryptoHeader::SIZE`] bytes, first u32 a nonce in 0-3 and
//!   the sender's public key embedded). From `Handshake3` on it prepends
//!   the compact run framing ([`CryptoHeader::COMPACT_SIZE`] bytes).
//! - `decrypt` strips the corresponding framing: the full handshake
//!   header when the packet front holds a nonce in 0-3, the compact
//!   framing otherwise.
//!
//! [`CryptoHeader::SIZE`]: wire::CryptoHeader::SIZE
//! [`CryptoHeader::COMPACT_SIZE`]: wire::CryptoHeader::COMPACT_SIZE

use wire::{Ip6, Message, PublicKey};

/// Handshake progress of a session, ordered.
///
/// Everything before [`Handshake3`](Self::Handshake3) sends and accepts
/// handshake-form packets; from `Handshake3` on, the session is in the
/// run phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    /// No handshake traffic yet.
    Init,
    /// We sent our hello.
    Handshake1,
    /// We received the peer's hello.
    Handshake2,
    /// Key packets exchanged; run phase begins.
    Handshake3,
    /// Traffic flowing in both directions.
    Running,
}

impl SessionState {
    /// Short name for drop diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Handshake1 => "HANDSHAKE1",
            Self::Handshake2 => "HANDSHAKE2",
            Self::Handshake3 => "HANDSHAKE3",
            Self::Running => "RUNNING",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecryptError {
    #[error("packet too short for its framing")]
    Runt,
    #[error("authentication failed")]
    Authentication,
    #[error("malformed handshake")]
    Handshake,
}

#[derive(Debug, thiserror::Error)]
pub enum EncryptError {
    #[error("message does not fit the crypto framing")]
    NoSpace,
}

/// One end of a bidirectional encrypted channel with a single peer.
pub trait CryptoSession {
    /// Encrypts the message in place, prepending the framing described in
    /// the crate docs. The session core treats a failure here as a
    /// contract violation and aborts.
    fn encrypt(&mut self, msg: &mut Message) -> Result<(), EncryptError>;

    /// Decrypts the message in place, stripping its framing. The message
    /// is left untouched on error.
    fn decrypt(&mut self, msg: &mut Message) -> Result<(), DecryptError>;

    fn state(&self) -> SessionState;

    /// Restarts the handshake if it has been stuck for too long. Invoked
    /// on every outbound packet; timeout policy lives with the crypto
    /// layer.
    fn reset_if_timeout(&mut self);

    /// The peer's derived overlay address.
    fn peer_ip6(&self) -> Ip6;

    fn peer_public_key(&self) -> PublicKey;
}

/// Factory and node-wide cryptographic identity.
pub trait CryptoContext {
    /// This node's own public key.
    fn public_key(&self) -> PublicKey;

    /// Derives the overlay address for a public key, or `None` when the
    /// key does not map into the overlay address space.
    fn address_for_public_key(&self, key: &PublicKey) -> Option<Ip6>;

    /// Opens a new session with a peer. The session layer always passes
    /// `initiator = false` and the name `"inner"`.
    fn new_session(
        &self,
        peer_key: &PublicKey,
        initiator: bool,
        name: &str,
    ) -> Box<dyn CryptoSession>;
}
