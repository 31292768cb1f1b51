//! The session manager: demultiplexing, packet transforms and the
//! pathfinder event protocol.
//!
//! # Ingress (switch -> inside)
//!
//! A switch packet is either a run packet, dispatched by the 32-bit handle
//! following the switch header, or a handshake packet, recognized by a
//! nonce of 0-3 in the same position and carrying a full handshake header
//! from which the peer's identity is read. Either way the packet is
//! decrypted through the session's crypto primitive, rewritten to carry a
//! route header and handed upward. The ingress label is tracked per
//! session; a change emits `DISCOVERED_PATH`.
//!
//! # Egress (inside -> switch)
//!
//! An inside packet names its destination by overlay address in the route
//! header. If no session exists and the header carries no public key, or
//! no switch label can be determined, the packet is parked in the
//! buffered-message queue and a `SEARCH_REQ` goes out; the pathfinder's
//! `NODE` answer drains the queue through the same send path. Otherwise
//! the route header is stripped, the payload encrypted in place and the
//! packet emitted with its switch header at the front.
//!
//! # Buffering
//!
//! At most one packet is parked per peer and at most
//! `max_buffered_messages` in total; entries expire after 10 seconds,
//! enforced by [`SessionManager::check_timed_out_buffers`] which the
//! embedding node schedules every [`SWEEP_INTERVAL_MILLIS`].

use std::rc::Rc;

use crypto_session::{CryptoContext, SessionState};
use log::debug;
use wire::events::{event_frame, CoreEvent, NodeRecord, PathfinderEvent, PF_BROADCAST};
use wire::{CryptoHeader, Ip6, Message, PublicKey, RouteHeader, SwitchHeader};

use crate::buffer::BufferedMessages;
use crate::config::SessionManagerConfig;
use crate::session_table::{random_first_handle, session_event, Session, SessionTable};
use crate::utils::Clock;

/// How often the embedding node should call
/// [`SessionManager::check_timed_out_buffers`].
pub const SWEEP_INTERVAL_MILLIS: u64 = 10_000;

/// The half of the event bus the core publishes into.
pub trait EventSink {
    fn send(&self, frame: Message);
}

pub struct SessionManager {
    table: SessionTable,
    buffered: BufferedMessages,
    config: SessionManagerConfig,
    crypto: Rc<dyn CryptoContext>,
    clock: Rc<dyn Clock>,
    events: Rc<dyn EventSink>,
}

impl SessionManager {
    pub fn new(
        config: SessionManagerConfig,
        crypto: Rc<dyn CryptoContext>,
        clock: Rc<dyn Clock>,
        events: Rc<dyn EventSink>,
    ) -> Self {
        Self {
            table: SessionTable::new(random_first_handle()),
            buffered: BufferedMessages::default(),
            config,
            crypto,
            clock,
            events,
        }
    }

    /// Handles a packet arriving from the switch; returns the decrypted
    /// packet to forward upward, route header at the front.
    pub fn incoming_from_switch(&mut self, mut msg: Message) -> Option<Message> {
        // switch header, handle, compact crypto framing
        if msg.len() < SwitchHeader::SIZE + 4 + CryptoHeader::COMPACT_SIZE {
            debug!("DROP runt");
            return None;
        }

        let switch_header = SwitchHeader::parse(msg.bytes());
        msg.pop_front(SwitchHeader::SIZE);

        let nonce_or_handle = msg.peek_u32();
        let (slot, is_setup) = if nonce_or_handle > 3 {
            // > 3 means it's a handle
            let Some(slot) = self.table.slot_by_handle(nonce_or_handle) else {
                debug!("DROP message with unrecognized handle [{nonce_or_handle}]");
                return None;
            };
            msg.pop_front(4);
            (slot, false)
        } else {
            // nonce plus full handshake header
            if msg.len() < CryptoHeader::SIZE + 4 {
                debug!("DROP runt");
                return None;
            }
            let peer_key = CryptoHeader::public_key(msg.bytes());
            let Some(ip6) = self.crypto.address_for_public_key(&peer_key) else {
                debug!("DROP handshake with non-overlay key");
                return None;
            };
            // a packet which claims to be "from us" causes problems
            if peer_key == self.crypto.public_key() {
                debug!("DROP handshake from ourselves");
                return None;
            }
            let slot = self.get_or_create(ip6, peer_key, 0, switch_header.label);
            debug_session(
                self.table.get(slot),
                switch_header.label,
                &format!("handshake nonce[{nonce_or_handle}]"),
            );
            (slot, true)
        };

        {
            let sess = self.table.get_mut(slot);
            if let Err(err) = sess.crypto.decrypt(&mut msg) {
                debug!(
                    "DROP failed decrypting message nonce_or_handle[{}] state[{}]: {}",
                    nonce_or_handle,
                    sess.crypto.state().name(),
                    err
                );
                return None;
            }
            if is_setup {
                // the peer's handle for us rides inside the handshake ciphertext
                sess.send_handle = msg.pop_front_u32();
                debug_session(sess, switch_header.label, "received start message");
            } else {
                debug_session(sess, switch_header.label, "received run message");
            }
        }

        let (version, ip6, public_key) = {
            let sess = self.table.get(slot);
            (sess.version, sess.peer_ip6, sess.peer_public_key)
        };
        let header = RouteHeader {
            switch_header,
            version,
            ip6,
            public_key,
        };
        header.write_to(msg.push_front_zeroed(RouteHeader::SIZE));

        let path = switch_header.label;
        let discovered = {
            let sess = self.table.get_mut(slot);
            if sess.send_switch_label == 0 {
                sess.send_switch_label = path;
            }
            if path != sess.recv_switch_label {
                sess.recv_switch_label = path;
                true
            } else {
                false
            }
        };
        if discovered {
            self.events.send(session_event(
                CoreEvent::DiscoveredPath,
                PF_BROADCAST,
                path,
                version,
                ip6,
                public_key,
            ));
        }

        Some(msg)
    }

    /// Handles a packet arriving from the inside layer; returns the
    /// encrypted packet to forward to the switch, or `None` when the
    /// packet was parked for route discovery or dropped.
    pub fn incoming_from_inside(&mut self, msg: Message) -> Option<Message> {
        assert!(
            msg.len() >= RouteHeader::SIZE,
            "inside packet shorter than a route header"
        );
        let header = RouteHeader::parse(msg.bytes());

        let slot = match self.table.slot_by_ip6(&header.ip6) {
            Some(slot) => slot,
            None => {
                if header.public_key.is_zero() {
                    self.needs_lookup(msg);
                    return None;
                }
                self.get_or_create(
                    header.ip6,
                    header.public_key,
                    header.version,
                    header.switch_header.label,
                )
            }
        };

        if header.version != 0 {
            self.table.get_mut(slot).version = header.version;
        }

        let label = if header.switch_header.label != 0 {
            header.switch_header.label
        } else if self.table.get(slot).send_switch_label != 0 {
            self.table.get(slot).send_switch_label
        } else {
            self.needs_lookup(msg);
            return None;
        };

        let mut switch_header = header.switch_header;
        switch_header.label = label;
        Some(self.ready_to_send(slot, switch_header, msg))
    }

    /// Handles a frame from the pathfinder. A `NODE` answer that drains a
    /// buffered packet returns the resulting switch packet.
    ///
    /// # Panics
    ///
    /// Panics on an unknown event code or a payload of unexpected length;
    /// the event channel is a trusted internal interface.
    pub fn incoming_event(&mut self, mut frame: Message) -> Option<Message> {
        assert!(frame.len() >= 8, "event frame shorter than its header");
        let code = frame.pop_front_u32();
        let source_pf = frame.pop_front_u32();
        let event = PathfinderEvent::from_code(code)
            .unwrap_or_else(|| panic!("unknown pathfinder event code [{code}]"));
        match event {
            PathfinderEvent::Sessions => {
                assert!(frame.is_empty(), "SESSIONS event carries an unexpected payload");
                self.enumerate_sessions(source_pf);
                None
            }
            PathfinderEvent::Node => {
                assert_eq!(
                    frame.len(),
                    NodeRecord::SIZE,
                    "NODE event with unexpected length"
                );
                self.node_discovered(NodeRecord::parse(frame.bytes()))
            }
        }
    }

    /// Evicts buffered packets older than 10 seconds. Scheduled by the
    /// embedding node every [`SWEEP_INTERVAL_MILLIS`].
    pub fn check_timed_out_buffers(&mut self) {
        let now_seconds = self.clock.now_millis() / 1000;
        self.buffered.sweep_expired(now_seconds);
    }

    pub fn session_for_ip6(&self, ip6: &Ip6) -> Option<&Session> {
        self.table.slot_by_ip6(ip6).map(|slot| self.table.get(slot))
    }

    pub fn session_for_handle(&self, handle: u32) -> Option<&Session> {
        self.table
            .slot_by_handle(handle)
            .map(|slot| self.table.get(slot))
    }

    /// The receive handles of all live sessions.
    pub fn handle_list(&self) -> Vec<u32> {
        self.table.handles()
    }

    pub fn session_count(&self) -> usize {
        self.table.len()
    }

    pub fn buffered_count(&self) -> usize {
        self.buffered.len()
    }

    /// Ends the session for `ip6`; its `SESSION_ENDED` event is emitted
    /// as the session is destroyed.
    pub fn remove_session(&mut self, ip6: &Ip6) -> bool {
        self.table.remove(ip6).is_some()
    }

    /// Returns the slot of the session for `ip6`, creating it if needed.
    /// An existing session is never replaced; its unset version and send
    /// label are filled in from the arguments.
    fn get_or_create(&mut self, ip6: Ip6, key: PublicKey, version: u32, label: u64) -> usize {
        if let Some(slot) = self.table.slot_by_ip6(&ip6) {
            let sess = self.table.get_mut(slot);
            if sess.version == 0 {
                sess.version = version;
            }
            if sess.send_switch_label == 0 {
                sess.send_switch_label = label;
            }
            return slot;
        }
        let crypto = self.crypto.new_session(&key, false, "inner");
        let now = self.clock.now_millis();
        let slot = self
            .table
            .insert(crypto, version, label, now, Rc::clone(&self.events));
        debug_session(self.table.get(slot), label, "new session");
        self.events.send(session_event(
            CoreEvent::Session,
            PF_BROADCAST,
            label,
            version,
            ip6,
            key,
        ));
        slot
    }

    /// Parks a packet (route header still at the front) until the
    /// pathfinder answers, and asks it to search.
    fn needs_lookup(&mut self, msg: Message) {
        let ip6 = RouteHeader::parse(msg.bytes()).ip6;
        debug!("buffering a packet to [{ip6}] and beginning a search");
        let now_seconds = self.clock.now_millis() / 1000;
        if !self
            .buffered
            .enqueue(ip6, msg, now_seconds, self.config.max_buffered_messages)
        {
            return;
        }
        self.events.send(event_frame(
            CoreEvent::SearchReq as u32,
            PF_BROADCAST,
            ip6.as_bytes(),
        ));
    }

    /// The send path after the destination session and switch label are
    /// known: strips the route header, encrypts in place and puts the
    /// switch header at the front.
    fn ready_to_send(&mut self, slot: usize, switch_header: SwitchHeader, mut msg: Message) -> Message {
        msg.pop_front(RouteHeader::SIZE);
        let sess = self.table.get_mut(slot);
        sess.crypto.reset_if_timeout();
        if sess.crypto.state() < SessionState::Handshake3 {
            // the receive handle rides inside the ciphertext so the peer
            // can dispatch the reply without a handshake header
            msg.push_front_u32(sess.receive_handle);
        }
        sess.crypto
            .encrypt(&mut msg)
            .expect("crypto session failed to encrypt an outbound packet");
        if sess.crypto.state() >= SessionState::Handshake3 {
            debug_session(sess, switch_header.label, "sending run message");
            msg.push_front_u32(sess.send_handle);
        } else {
            debug_session(sess, switch_header.label, "sending start message");
        }
        switch_header.write_to(msg.push_front_zeroed(SwitchHeader::SIZE));
        msg
    }

    /// `NODE` answer from the pathfinder. With a packet buffered for that
    /// address, create-or-merge the session and send the packet; without
    /// one, only refresh an existing session.
    fn node_discovered(&mut self, node: NodeRecord) -> Option<Message> {
        let Some(msg) = self.buffered.take(&node.ip6) else {
            // a node we are not waiting on
            let slot = self.table.slot_by_ip6(&node.ip6)?;
            let sess = self.table.get_mut(slot);
            sess.send_switch_label = node.path;
            sess.version = node.version;
            return None;
        };
        let slot = self.get_or_create(node.ip6, node.public_key, node.version, node.path);
        let header = RouteHeader::parse(msg.bytes());
        let label = if header.switch_header.label != 0 {
            header.switch_header.label
        } else {
            self.table.get(slot).send_switch_label
        };
        let mut switch_header = header.switch_header;
        switch_header.label = label;
        Some(self.ready_to_send(slot, switch_header, msg))
    }

    /// `SESSIONS` request: one `SESSION` event per live session, back to
    /// the requesting pathfinder.
    fn enumerate_sessions(&mut self, source_pf: u32) {
        for handle in self.table.handles() {
            let Some(slot) = self.table.slot_by_handle(handle) else {
                continue;
            };
            let sess = self.table.get(slot);
            self.events.send(session_event(
                CoreEvent::Session,
                source_pf,
                sess.send_switch_label,
                sess.version,
                sess.peer_ip6,
                sess.peer_public_key,
            ));
        }
    }
}

fn debug_session(sess: &Session, label: u64, what: &str) {
    debug!(
        "ver[{}] send[{}] recv[{}] ip[{}] path[{:#018x}] {}",
        sess.version, sess.send_handle, sess.receive_handle, sess.peer_ip6, label, what
    );
}
