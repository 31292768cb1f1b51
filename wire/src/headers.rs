//! Fixed-layout headers.
//!
//! Three headers matter to the session layer:
//!
//! - [`SwitchHeader`] rides at the front of every packet on the switch
//!   interface and carries the 64-bit source-routing label.
//! - [`RouteHeader`] is the internal inside-interface header: the switch
//!   header plus the peer's protocol version, overlay address and public
//!   key.
//! - [`CryptoHeader`] is the handshake header produced and consumed by the
//!   crypto session; the session layer only ever reads the embedded public
//!   key out of it.
//!
//! Parsers take a slice at least as long as the header and panic otherwise;
//! pipelines validate packet lengths before any header is touched.

use std::fmt;
use std::net::Ipv6Addr;

use byteorder::{BigEndian, ByteOrder};

/// A 16-byte overlay address derived from a public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ip6(pub [u8; 16]);

impl Ip6 {
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl From<[u8; 16]> for Ip6 {
    fn from(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Ip6 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Ipv6Addr::from(self.0).fmt(f)
    }
}

/// A 32-byte x25519 public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(pub [u8; 32]);

impl PublicKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// An all-zero key marks "unknown" in route headers.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl From<[u8; 32]> for PublicKey {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// The lower routing layer's per-packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchHeader {
    /// Source-routing label steering the packet along a path.
    pub label: u64,
    pub congestion: u8,
    pub version_and_label_shift: u8,
    pub traffic_class: u16,
}

impl SwitchHeader {
    pub const SIZE: usize = 12;

    pub fn parse(bytes: &[u8]) -> Self {
        Self {
            label: BigEndian::read_u64(&bytes[0..8]),
            congestion: bytes[8],
            version_and_label_shift: bytes[9],
            traffic_class: BigEndian::read_u16(&bytes[10..12]),
        }
    }

    pub fn write_to(&self, bytes: &mut [u8]) {
        BigEndian::write_u64(&mut bytes[0..8], self.label);
        bytes[8] = self.congestion;
        bytes[9] = self.version_and_label_shift;
        BigEndian::write_u16(&mut bytes[10..12], self.traffic_class);
    }
}

/// The inside-interface header: where a decrypted packet came from, or
/// where an outbound packet should go.
#[derive(Debug, Clone, Copy)]
pub struct RouteHeader {
    pub switch_header: SwitchHeader,
    pub version: u32,
    pub ip6: Ip6,
    pub public_key: PublicKey,
}

impl RouteHeader {
    pub const SIZE: usize = SwitchHeader::SIZE + 4 + 16 + 32;

    pub fn parse(bytes: &[u8]) -> Self {
        let mut ip6 = [0u8; 16];
        ip6.copy_from_slice(&bytes[16..32]);
        let mut public_key = [0u8; 32];
        public_key.copy_from_slice(&bytes[32..64]);
        Self {
            switch_header: SwitchHeader::parse(&bytes[0..SwitchHeader::SIZE]),
            version: BigEndian::read_u32(&bytes[12..16]),
            ip6: Ip6(ip6),
            public_key: PublicKey(public_key),
        }
    }

    pub fn write_to(&self, bytes: &mut [u8]) {
        self.switch_header.write_to(&mut bytes[0..SwitchHeader::SIZE]);
        BigEndian::write_u32(&mut bytes[12..16], self.version);
        bytes[16..32].copy_from_slice(&self.ip6.0);
        bytes[32..64].copy_from_slice(&self.public_key.0);
    }
}

/// Handshake-header constants of the crypto session's wire format.
///
/// Layout: nonce (4, value 0-3), auth challenge (12), handshake nonce (24),
/// sender public key (32), authenticator (16), encrypted temporary key (32).
pub struct CryptoHeader;

impl CryptoHeader {
    pub const SIZE: usize = 120;

    /// Framing of a run packet: nonce (4) plus authenticator (16).
    pub const COMPACT_SIZE: usize = 20;

    const PUBLIC_KEY_OFFSET: usize = 40;

    /// The sender public key embedded in a handshake header.
    pub fn public_key(bytes: &[u8]) -> PublicKey {
        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes[Self::PUBLIC_KEY_OFFSET..Self::PUBLIC_KEY_OFFSET + 32]);
        PublicKey(key)
    }

    /// Writes the sender public key into a handshake header under
    /// construction.
    pub fn write_public_key(bytes: &mut [u8], key: &PublicKey) {
        bytes[Self::PUBLIC_KEY_OFFSET..Self::PUBLIC_KEY_OFFSET + 32].copy_from_slice(&key.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_switch_header_round_trip() {
        let header = SwitchHeader {
            label: 0x0123_4567_89ab_cdef,
            congestion: 3,
            version_and_label_shift: 0x45,
            traffic_class: 0xbeef,
        };
        let mut bytes = [0u8; SwitchHeader::SIZE];
        header.write_to(&mut bytes);
        assert_eq!(bytes[0..8], [0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef]);
        assert_eq!(SwitchHeader::parse(&bytes), header);
    }

    #[test]
    fn test_route_header_round_trip() {
        let header = RouteHeader {
            switch_header: SwitchHeader {
                label: 0x13,
                congestion: 0,
                version_and_label_shift: 0,
                traffic_class: 0,
            },
            version: 22,
            ip6: Ip6([0xfc; 16]),
            public_key: PublicKey([0x5a; 32]),
        };
        let mut bytes = [0u8; RouteHeader::SIZE];
        header.write_to(&mut bytes);
        let parsed = RouteHeader::parse(&bytes);
        assert_eq!(parsed.switch_header.label, 0x13);
        assert_eq!(parsed.version, 22);
        assert_eq!(parsed.ip6, header.ip6);
        assert_eq!(parsed.public_key, header.public_key);
    }

    #[test]
    fn test_crypto_header_public_key() {
        let mut bytes = [0u8; CryptoHeader::SIZE];
        let key = PublicKey([0x77; 32]);
        CryptoHeader::write_public_key(&mut bytes, &key);
        assert_eq!(CryptoHeader::public_key(&bytes), key);
        assert_eq!(bytes[0..4], [0, 0, 0, 0]);
    }
}
