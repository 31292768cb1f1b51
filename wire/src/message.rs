//! A contiguous packet buffer with an adjustable head.
//!
//! Packets cross several layers that each strip a header on the way in and
//! prepend one on the way out. `Message` keeps the packet in one allocation
//! and moves a start cursor instead of copying: consuming a header is a
//! cursor bump, prepending one writes into headroom in front of the cursor.
//! Callers that provision enough headroom up front never reallocate on the
//! hot path.

use byteorder::{BigEndian, ByteOrder};

pub struct Message {
    buf: Vec<u8>,
    start: usize,
}

impl Message {
    /// An empty message with `headroom` bytes of front space.
    pub fn new(headroom: usize) -> Self {
        Self {
            buf: vec![0; headroom],
            start: headroom,
        }
    }

    /// A message holding `payload`, with `headroom` bytes of front space for
    /// headers to be prepended later.
    pub fn with_headroom(payload: &[u8], headroom: usize) -> Self {
        let mut buf = vec![0; headroom + payload.len()];
        buf[headroom..].copy_from_slice(payload);
        Self {
            buf,
            start: headroom,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len() - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.buf.len()
    }

    /// Front space currently available for prepending without reallocating.
    pub fn headroom(&self) -> usize {
        self.start
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf[self.start..]
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.start..]
    }

    /// Consumes `n` bytes off the front and returns them.
    ///
    /// # Panics
    ///
    /// Panics if the message holds fewer than `n` bytes; length checks
    /// happen before headers are consumed, like slice indexing.
    pub fn pop_front(&mut self, n: usize) -> &[u8] {
        assert!(n <= self.len(), "pop_front past the end of the message");
        let at = self.start;
        self.start += n;
        &self.buf[at..at + n]
    }

    /// Consumes a big-endian u32 off the front.
    ///
    /// # Panics
    ///
    /// Panics if the message holds fewer than 4 bytes.
    pub fn pop_front_u32(&mut self) -> u32 {
        BigEndian::read_u32(self.pop_front(4))
    }

    /// Reads the big-endian u32 at the front without consuming it.
    ///
    /// # Panics
    ///
    /// Panics if the message holds fewer than 4 bytes.
    pub fn peek_u32(&self) -> u32 {
        assert!(self.len() >= 4, "peek_u32 on a message shorter than 4 bytes");
        BigEndian::read_u32(self.bytes())
    }

    /// Exposes `n` zeroed bytes in front of the current head and returns
    /// them for the caller to fill in.
    pub fn push_front_zeroed(&mut self, n: usize) -> &mut [u8] {
        self.ensure_headroom(n);
        self.start -= n;
        let at = self.start;
        let slot = &mut self.buf[at..at + n];
        slot.fill(0);
        slot
    }

    pub fn push_front(&mut self, bytes: &[u8]) {
        self.push_front_zeroed(bytes.len()).copy_from_slice(bytes);
    }

    pub fn push_front_u32(&mut self, value: u32) {
        let mut bytes = [0u8; 4];
        BigEndian::write_u32(&mut bytes, value);
        self.push_front(&bytes);
    }

    fn ensure_headroom(&mut self, n: usize) {
        if self.start >= n {
            return;
        }
        // Cold path: rebuild with fresh front space.
        let new_start = n.max(64);
        let mut buf = vec![0; new_start + self.len()];
        buf[new_start..].copy_from_slice(self.bytes());
        self.buf = buf;
        self.start = new_start;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pop_and_push_move_the_head() {
        let mut msg = Message::with_headroom(&[1, 2, 3, 4, 5, 6], 8);
        assert_eq!(msg.pop_front(2), [1, 2]);
        assert_eq!(msg.len(), 4);
        msg.push_front(&[9, 9]);
        assert_eq!(msg.bytes(), [9, 9, 3, 4, 5, 6]);
        assert_eq!(msg.headroom(), 8);
    }

    #[test]
    fn test_u32_front_accessors_are_big_endian() {
        let mut msg = Message::new(16);
        msg.push_front_u32(0xcafe_babe);
        assert_eq!(msg.bytes(), [0xca, 0xfe, 0xba, 0xbe]);
        assert_eq!(msg.peek_u32(), 0xcafe_babe);
        assert_eq!(msg.pop_front_u32(), 0xcafe_babe);
        assert!(msg.is_empty());
    }

    #[test]
    fn test_push_front_zeroed_clears_the_slot() {
        let mut msg = Message::with_headroom(&[7], 4);
        msg.push_front(&[0xff, 0xff, 0xff, 0xff]);
        msg.pop_front(4);
        let slot = msg.push_front_zeroed(4);
        assert_eq!(slot, [0, 0, 0, 0]);
    }

    #[test]
    fn test_exhausted_headroom_grows_the_buffer() {
        let mut msg = Message::with_headroom(&[1, 2], 2);
        msg.push_front(&[3, 4, 5, 6]);
        assert_eq!(msg.bytes(), [3, 4, 5, 6, 1, 2]);
        assert!(msg.headroom() >= 60);
    }

    #[test]
    #[should_panic(expected = "pop_front past the end")]
    fn test_pop_front_past_end_panics() {
        let mut msg = Message::with_headroom(&[1, 2], 0);
        msg.pop_front(3);
    }
}
