//! The session table.
//!
//! Sessions are owned by a slot vector; a map from overlay address to slot
//! and the arithmetic `receive_handle = slot + first_handle` give the two
//! lookup paths the pipelines need. Slots are stable for a session's
//! lifetime and reused after removal; the randomized handle base keeps
//! handles from colliding across manager restarts.

use std::collections::HashMap;
use std::rc::Rc;

use crypto_session::CryptoSession;
use log::debug;
use wire::events::{event_frame, CoreEvent, NodeRecord, PF_BROADCAST};
use wire::{Ip6, Message, PublicKey};

use crate::session_manager::EventSink;

/// Handle values 0-3 are reserved for handshake nonces.
pub const MIN_FIRST_HANDLE: u32 = 4;
pub const MAX_FIRST_HANDLE: u32 = 100_000;

/// Uniformly random handle base in `[MIN_FIRST_HANDLE, MAX_FIRST_HANDLE)`.
pub(crate) fn random_first_handle() -> u32 {
    let mut bytes = [0u8; 4];
    getrandom::getrandom(&mut bytes).expect("system rng unavailable");
    u32::from_le_bytes(bytes) % (MAX_FIRST_HANDLE - MIN_FIRST_HANDLE) + MIN_FIRST_HANDLE
}

/// A bidirectional encrypted channel with one peer.
pub struct Session {
    pub(crate) crypto: Box<dyn CryptoSession>,
    pub(crate) peer_ip6: Ip6,
    pub(crate) peer_public_key: PublicKey,
    pub(crate) receive_handle: u32,
    pub(crate) send_handle: u32,
    pub(crate) send_switch_label: u64,
    pub(crate) recv_switch_label: u64,
    pub(crate) version: u32,
    pub(crate) time_of_creation: u64,
    events: Rc<dyn EventSink>,
}

impl Session {
    pub fn peer_ip6(&self) -> Ip6 {
        self.peer_ip6
    }

    pub fn peer_public_key(&self) -> PublicKey {
        self.peer_public_key
    }

    /// The handle peers attach to their run packets towards us.
    pub fn receive_handle(&self) -> u32 {
        self.receive_handle
    }

    /// The handle we attach to run packets towards the peer; zero until
    /// the peer's first handshake packet has been decrypted.
    pub fn send_handle(&self) -> u32 {
        self.send_handle
    }

    /// Our best known egress path to the peer.
    pub fn send_switch_label(&self) -> u64 {
        self.send_switch_label
    }

    /// The label of the most recent decrypted ingress packet.
    pub fn recv_switch_label(&self) -> u64 {
        self.recv_switch_label
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn time_of_creation(&self) -> u64 {
        self.time_of_creation
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.events.send(session_event(
            CoreEvent::SessionEnded,
            PF_BROADCAST,
            self.send_switch_label,
            self.version,
            self.peer_ip6,
            self.peer_public_key,
        ));
    }
}

/// Builds a session lifecycle frame carrying a [`NodeRecord`] payload.
pub(crate) fn session_event(
    code: CoreEvent,
    pathfinder: u32,
    path: u64,
    version: u32,
    ip6: Ip6,
    public_key: PublicKey,
) -> Message {
    let node = NodeRecord {
        path,
        metric: 0xffff_ffff,
        version,
        ip6,
        public_key,
    };
    let mut payload = [0u8; NodeRecord::SIZE];
    node.write_to(&mut payload);
    event_frame(code as u32, pathfinder, &payload)
}

pub(crate) struct SessionTable {
    slots: Vec<Option<Session>>,
    free: Vec<usize>,
    by_ip6: HashMap<Ip6, usize>,
    first_handle: u32,
}

impl SessionTable {
    pub(crate) fn new(first_handle: u32) -> Self {
        assert!((MIN_FIRST_HANDLE..MAX_FIRST_HANDLE).contains(&first_handle));
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            by_ip6: HashMap::new(),
            first_handle,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.by_ip6.len()
    }

    pub(crate) fn slot_by_ip6(&self, ip6: &Ip6) -> Option<usize> {
        self.by_ip6.get(ip6).copied()
    }

    pub(crate) fn slot_by_handle(&self, handle: u32) -> Option<usize> {
        let slot = handle.checked_sub(self.first_handle)? as usize;
        match self.slots.get(slot) {
            Some(Some(_)) => Some(slot),
            _ => None,
        }
    }

    pub(crate) fn get(&self, slot: usize) -> &Session {
        self.slots[slot].as_ref().expect("session slot is live")
    }

    pub(crate) fn get_mut(&mut self, slot: usize) -> &mut Session {
        self.slots[slot].as_mut().expect("session slot is live")
    }

    /// Inserts a new session built around `crypto`, indexes it under the
    /// peer address the crypto session derived, and returns its slot.
    pub(crate) fn insert(
        &mut self,
        crypto: Box<dyn CryptoSession>,
        version: u32,
        send_switch_label: u64,
        time_of_creation: u64,
        events: Rc<dyn EventSink>,
    ) -> usize {
        let peer_ip6 = crypto.peer_ip6();
        let peer_public_key = crypto.peer_public_key();
        debug_assert!(!self.by_ip6.contains_key(&peer_ip6));
        let slot = match self.free.pop() {
            Some(slot) => slot,
            None => {
                self.slots.push(None);
                self.slots.len() - 1
            }
        };
        let session = Session {
            crypto,
            peer_ip6,
            peer_public_key,
            receive_handle: self.first_handle + slot as u32,
            send_handle: 0,
            send_switch_label,
            recv_switch_label: 0,
            version,
            time_of_creation,
            events,
        };
        self.slots[slot] = Some(session);
        self.by_ip6.insert(peer_ip6, slot);
        slot
    }

    /// Removes the session for `ip6`, returning it; dropping the returned
    /// session emits its end-of-life event.
    pub(crate) fn remove(&mut self, ip6: &Ip6) -> Option<Session> {
        let slot = self.by_ip6.remove(ip6)?;
        let session = self.slots[slot].take().expect("session slot is live");
        debug!(
            "removing session ip[{}] handle[{}]",
            session.peer_ip6, session.receive_handle
        );
        self.free.push(slot);
        Some(session)
    }

    /// Every live receive handle, in slot order.
    pub(crate) fn handles(&self) -> Vec<u32> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(i, _)| self.first_handle + i as u32)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use crypto_session::{DecryptError, EncryptError, SessionState};

    use super::*;

    struct NullCrypto {
        ip6: Ip6,
        key: PublicKey,
    }

    impl CryptoSession for NullCrypto {
        fn encrypt(&mut self, _msg: &mut Message) -> Result<(), EncryptError> {
            Ok(())
        }
        fn decrypt(&mut self, _msg: &mut Message) -> Result<(), DecryptError> {
            Ok(())
        }
        fn state(&self) -> SessionState {
            SessionState::Init
        }
        fn reset_if_timeout(&mut self) {}
        fn peer_ip6(&self) -> Ip6 {
            self.ip6
        }
        fn peer_public_key(&self) -> PublicKey {
            self.key
        }
    }

    #[derive(Default)]
    struct CodeSink(RefCell<Vec<u32>>);

    impl EventSink for CodeSink {
        fn send(&self, mut frame: Message) {
            self.0.borrow_mut().push(frame.pop_front_u32());
        }
    }

    fn ip(byte: u8) -> Ip6 {
        let mut bytes = [0u8; 16];
        bytes[0] = 0xfc;
        bytes[15] = byte;
        Ip6(bytes)
    }

    fn add(table: &mut SessionTable, byte: u8, events: Rc<CodeSink>) -> usize {
        let crypto = Box::new(NullCrypto {
            ip6: ip(byte),
            key: PublicKey([byte; 32]),
        });
        table.insert(crypto, 0, 0, 0, events)
    }

    #[test]
    fn test_both_indexes_reach_the_same_session() {
        let events = Rc::new(CodeSink::default());
        let mut table = SessionTable::new(1000);
        let slot = add(&mut table, 1, events.clone());
        assert_eq!(table.slot_by_ip6(&ip(1)), Some(slot));
        let handle = table.get(slot).receive_handle();
        assert_eq!(handle, 1000 + slot as u32);
        assert_eq!(table.slot_by_handle(handle), Some(slot));
    }

    #[test]
    fn test_handle_below_base_is_unknown() {
        let events = Rc::new(CodeSink::default());
        let mut table = SessionTable::new(1000);
        add(&mut table, 1, events.clone());
        assert_eq!(table.slot_by_handle(999), None);
        assert_eq!(table.slot_by_handle(3), None);
        assert_eq!(table.slot_by_handle(1001), None);
    }

    #[test]
    fn test_removed_slot_is_reused() {
        let events = Rc::new(CodeSink::default());
        let mut table = SessionTable::new(4);
        let first = add(&mut table, 1, events.clone());
        add(&mut table, 2, events.clone());
        assert!(table.remove(&ip(1)).is_some());
        assert_eq!(table.len(), 1);
        let reused = add(&mut table, 3, events.clone());
        assert_eq!(reused, first);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_drop_emits_session_ended() {
        let events = Rc::new(CodeSink::default());
        let mut table = SessionTable::new(4);
        add(&mut table, 1, events.clone());
        assert!(events.0.borrow().is_empty());
        drop(table.remove(&ip(1)));
        assert_eq!(*events.0.borrow(), vec![CoreEvent::SessionEnded as u32]);
    }

    #[test]
    fn test_handles_track_live_slots() {
        let events = Rc::new(CodeSink::default());
        let mut table = SessionTable::new(50);
        add(&mut table, 1, events.clone());
        add(&mut table, 2, events.clone());
        add(&mut table, 3, events.clone());
        table.remove(&ip(2));
        assert_eq!(table.handles(), vec![50, 52]);
    }

    #[test]
    fn test_random_first_handle_in_range() {
        for _ in 0..32 {
            let base = random_first_handle();
            assert!((MIN_FIRST_HANDLE..MAX_FIRST_HANDLE).contains(&base));
        }
    }
}
