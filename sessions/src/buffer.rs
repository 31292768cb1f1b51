//! Outbound packets parked while their route lookup is in flight.
//!
//! At most one packet per peer; a newer packet supersedes the old one.
//! Entries live for at most [`BUFFER_TIMEOUT_SECONDS`], enforced by the
//! periodic sweep and opportunistically when the buffer is full.

use std::collections::HashMap;

use log::debug;
use wire::{Ip6, Message};

/// A buffered entry older than this is evicted by the sweep.
pub(crate) const BUFFER_TIMEOUT_SECONDS: u64 = 10;

struct BufferedMessage {
    msg: Message,
    enqueued_at: u64,
}

#[derive(Default)]
pub(crate) struct BufferedMessages {
    map: HashMap<Ip6, BufferedMessage>,
}

impl BufferedMessages {
    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    /// Parks `msg` for `ip6`. Returns false when the buffer stayed full
    /// even after a sweep and the packet was dropped.
    pub(crate) fn enqueue(
        &mut self,
        ip6: Ip6,
        msg: Message,
        now_seconds: u64,
        max_buffered_messages: usize,
    ) -> bool {
        if self.map.remove(&ip6).is_some() {
            debug!("DROP message which needs lookup because a new one arrived");
        }
        if self.map.len() >= max_buffered_messages {
            self.sweep_expired(now_seconds);
            if self.map.len() >= max_buffered_messages {
                debug!(
                    "DROP message needing lookup, max_buffered_messages [{}] reached",
                    max_buffered_messages
                );
                return false;
            }
        }
        self.map.insert(
            ip6,
            BufferedMessage {
                msg,
                enqueued_at: now_seconds,
            },
        );
        true
    }

    pub(crate) fn take(&mut self, ip6: &Ip6) -> Option<Message> {
        self.map.remove(ip6).map(|buffered| buffered.msg)
    }

    pub(crate) fn sweep_expired(&mut self, now_seconds: u64) {
        self.map
            .retain(|_, buffered| now_seconds.saturating_sub(buffered.enqueued_at) < BUFFER_TIMEOUT_SECONDS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(byte: u8) -> Ip6 {
        let mut bytes = [0u8; 16];
        bytes[0] = 0xfc;
        bytes[15] = byte;
        Ip6(bytes)
    }

    fn msg(payload: &[u8]) -> Message {
        Message::with_headroom(payload, 0)
    }

    #[test]
    fn test_newer_message_supersedes() {
        let mut buffered = BufferedMessages::default();
        assert!(buffered.enqueue(ip(1), msg(b"old"), 0, 8));
        assert!(buffered.enqueue(ip(1), msg(b"new"), 1, 8));
        assert_eq!(buffered.len(), 1);
        assert_eq!(buffered.take(&ip(1)).unwrap().bytes(), b"new");
        assert!(buffered.take(&ip(1)).is_none());
    }

    #[test]
    fn test_full_buffer_drops_the_new_packet() {
        let mut buffered = BufferedMessages::default();
        assert!(buffered.enqueue(ip(1), msg(b"a"), 0, 2));
        assert!(buffered.enqueue(ip(2), msg(b"b"), 0, 2));
        assert!(!buffered.enqueue(ip(3), msg(b"c"), 1, 2));
        assert_eq!(buffered.len(), 2);
        assert!(buffered.take(&ip(3)).is_none());
    }

    #[test]
    fn test_full_buffer_sweeps_before_dropping() {
        let mut buffered = BufferedMessages::default();
        assert!(buffered.enqueue(ip(1), msg(b"a"), 0, 1));
        // The stale entry makes room for the new one.
        assert!(buffered.enqueue(ip(2), msg(b"b"), 15, 1));
        assert!(buffered.take(&ip(1)).is_none());
        assert!(buffered.take(&ip(2)).is_some());
    }

    #[test]
    fn test_sweep_boundary() {
        let mut buffered = BufferedMessages::default();
        buffered.enqueue(ip(1), msg(b"a"), 0, 8);
        buffered.enqueue(ip(2), msg(b"b"), 1, 8);
        buffered.sweep_expired(10);
        // lag 10 is evicted, lag 9 survives
        assert!(buffered.take(&ip(1)).is_none());
        assert!(buffered.take(&ip(2)).is_some());
    }
}
