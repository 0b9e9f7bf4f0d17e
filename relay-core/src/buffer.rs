// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! Grow-on-write byte buffer with offset-based head/tail cursors.
//!
//! Every session and backend send queue is backed by one of these. Cursors
//! are indices into the owned `Vec<u8>` rather than raw pointers, so growth
//! (which reallocates) never invalidates anything a caller is holding.

const INITIAL_CAPACITY: usize = 4096;

/// ```text
///      head                  tail
///       |XXXXXXXXXXXXXXXXXXXXXX|              |
///       [ ----------- data.len() ------------ ]
///                              [  spacecount  ]
///       [   datacount   ]
/// ```
#[derive(Debug)]
pub struct Buffer {
    data: Vec<u8>,
    head: usize,
    tail: usize,
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new(INITIAL_CAPACITY)
    }
}

impl Buffer {
    pub fn new(capacity: usize) -> Self {
        Buffer {
            data: vec![0u8; capacity.max(1)],
            head: 0,
            tail: 0,
        }
    }

    pub fn with_contents(bytes: &[u8]) -> Self {
        let mut buf = Buffer::new(bytes.len().max(INITIAL_CAPACITY));
        buf.set(bytes);
        buf
    }

    /// Number of unread bytes currently held.
    pub fn datacount(&self) -> usize {
        self.tail - self.head
    }

    /// Room remaining before the backing storage must grow.
    pub fn spacecount(&self) -> usize {
        self.data.len() - self.tail
    }

    /// The unread region `[head, tail)`.
    pub fn readable(&self) -> &[u8] {
        &self.data[self.head..self.tail]
    }

    pub fn head(&self) -> usize {
        self.head
    }

    pub fn tail(&self) -> usize {
        self.tail
    }

    /// Advance `head` by `amt`, marking that many bytes as read.
    ///
    /// Fails if `amt` would run `head` past `tail`.
    pub fn consume(&mut self, amt: usize) -> Result<(), BufferError> {
        if amt > self.datacount() {
            return Err(BufferError::ConsumePastTail);
        }
        self.head += amt;
        Ok(())
    }

    /// Advance `tail` by `amt`, marking that many freshly written bytes as
    /// readable. The caller must have already written into
    /// `self.writable()[..amt]`.
    pub fn produced(&mut self, amt: usize) -> Result<(), BufferError> {
        if amt > self.spacecount() {
            return Err(BufferError::ProducedPastCapacity);
        }
        self.tail += amt;
        Ok(())
    }

    /// The writable region callers may fill before calling `produced`.
    pub fn writable(&mut self) -> &mut [u8] {
        &mut self.data[self.tail..]
    }

    /// Double the backing storage, preserving `head`/`tail` offsets.
    pub fn expand(&mut self) {
        let new_len = (self.data.len() * 2).max(INITIAL_CAPACITY);
        self.data.resize(new_len, 0);
    }

    /// Move `[head, tail)` down to the base of the storage, maximizing
    /// `spacecount()`. `datacount()` is unchanged; `head` becomes 0.
    pub fn realign(&mut self) {
        if self.head == 0 {
            return;
        }
        self.data.copy_within(self.head..self.tail, 0);
        self.tail -= self.head;
        self.head = 0;
    }

    /// Replace the contents wholesale, growing first if `bytes` doesn't fit.
    pub fn set(&mut self, bytes: &[u8]) {
        if self.data.len() < bytes.len() {
            self.data.resize(bytes.len(), 0);
        }
        self.head = 0;
        self.tail = 0;
        self.data[..bytes.len()].copy_from_slice(bytes);
        self.tail = bytes.len();
    }

    /// Append bytes to the end, realigning and/or expanding as needed to fit.
    pub fn append(&mut self, bytes: &[u8]) {
        if self.head != 0 && self.spacecount() < bytes.len() {
            self.realign();
        }
        while self.spacecount() < bytes.len() {
            self.expand();
        }
        let start = self.tail;
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
        self.tail += bytes.len();
    }

    pub fn is_empty(&self) -> bool {
        self.datacount() == 0
    }
}

#[derive(Debug)]
pub enum BufferError {
    ConsumePastTail,
    ProducedPastCapacity,
}

impl std::fmt::Display for BufferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BufferError::ConsumePastTail => write!(f, "consume() would run past tail"),
            BufferError::ProducedPastCapacity => write!(f, "produced() would exceed capacity"),
        }
    }
}

impl std::error::Error for BufferError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_consume() {
        let mut buf = Buffer::new(16);
        buf.set(b"hello world");
        assert_eq!(buf.datacount(), 11);
        buf.consume(11).unwrap();
        assert_eq!(buf.datacount(), 0);
        assert_eq!(buf.head(), 11);
    }

    #[test]
    fn realign_preserves_datacount_and_resets_head() {
        let mut buf = Buffer::new(16);
        buf.set(b"hello world");
        buf.consume(6).unwrap();
        let before = buf.datacount();
        buf.realign();
        assert_eq!(buf.datacount(), before);
        assert_eq!(buf.head(), 0);
        assert_eq!(buf.readable(), b"world");
    }

    #[test]
    fn expand_doubles_capacity_and_preserves_data() {
        let mut buf = Buffer::new(4);
        buf.append(b"abcd");
        buf.append(b"efgh");
        assert_eq!(buf.readable(), b"abcdefgh");
    }

    #[test]
    fn consume_past_tail_fails() {
        let mut buf = Buffer::new(16);
        buf.set(b"ab");
        assert!(buf.consume(3).is_err());
    }

    #[test]
    fn produced_past_capacity_fails() {
        let mut buf = Buffer::new(4);
        assert!(buf.produced(5).is_err());
    }

    #[test]
    fn append_realigns_before_growing_when_head_advanced() {
        let mut buf = Buffer::new(8);
        buf.append(b"abcdefg");
        buf.consume(7).unwrap();
        buf.append(b"xyz");
        assert_eq!(buf.readable(), b"xyz");
    }
}
