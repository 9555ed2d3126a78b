//! Fixed-capacity ring buffer for received bytes
//!
//! The receive side of a link accumulates raw transport bytes here until a
//! complete message is known to exist. There is exactly one writer (whoever
//! pulls bytes off the transport) and one reader (the parse loop), so the
//! buffer itself does no locking.
//!
//! Multi-byte writes and reads are all-or-nothing: a write that does not fit
//! leaves the buffer untouched. Callers treat a failed write as a stream
//! desync, never as a partial write.

/// Circular byte buffer with a fixed capacity
#[derive(Debug, Clone)]
pub struct RingBuffer {
    storage: Box<[u8]>,
    /// Index of the next byte to read
    head: usize,
    /// Index of the next byte to write
    tail: usize,
    /// Number of occupied bytes
    len: usize,
}

impl RingBuffer {
    /// Create an empty buffer holding at most `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            storage: vec![0u8; capacity].into_boxed_slice(),
            head: 0,
            tail: 0,
            len: 0,
        }
    }

    /// Total capacity in bytes
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Number of bytes available to read
    pub fn len(&self) -> usize {
        self.len
    }

    /// Free space in bytes
    pub fn remaining(&self) -> usize {
        self.capacity() - self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// Append one byte. Returns false if the buffer is full.
    pub fn write(&mut self, byte: u8) -> bool {
        if self.is_full() {
            return false;
        }
        self.storage[self.tail] = byte;
        self.tail = (self.tail + 1) % self.capacity();
        self.len += 1;
        true
    }

    /// Append all of `data`, or nothing if it does not fit
    pub fn write_bytes(&mut self, data: &[u8]) -> bool {
        if data.len() > self.remaining() {
            return false;
        }
        for &byte in data {
            self.storage[self.tail] = byte;
            self.tail = (self.tail + 1) % self.capacity();
        }
        self.len += data.len();
        true
    }

    /// Remove and return the oldest byte
    pub fn read(&mut self) -> Option<u8> {
        if self.is_empty() {
            return None;
        }
        let byte = self.storage[self.head];
        self.head = (self.head + 1) % self.capacity();
        self.len -= 1;
        Some(byte)
    }

    /// Fill `out` with the oldest bytes, or read nothing if fewer than
    /// `out.len()` bytes are buffered
    pub fn read_bytes(&mut self, out: &mut [u8]) -> bool {
        if out.len() > self.len {
            return false;
        }
        for slot in out.iter_mut() {
            *slot = self.storage[self.head];
            self.head = (self.head + 1) % self.capacity();
        }
        self.len -= out.len();
        true
    }

    /// Read the byte at `*cursor` bytes past the read position without
    /// consuming it, then advance the cursor.
    ///
    /// The cursor is owned by the caller and is independent of the read
    /// position; it must be reset to 0 after any bytes are consumed.
    pub fn peek(&self, cursor: &mut usize) -> Option<u8> {
        let byte = self.peek_at(*cursor)?;
        *cursor += 1;
        Some(byte)
    }

    /// Read the byte `offset` bytes past the read position without consuming it
    pub fn peek_at(&self, offset: usize) -> Option<u8> {
        if offset >= self.len {
            return None;
        }
        Some(self.storage[(self.head + offset) % self.capacity()])
    }

    /// Drop up to `count` of the oldest bytes, returning how many were dropped
    pub fn discard(&mut self, count: usize) -> usize {
        let count = count.min(self.len);
        if count > 0 {
            self.head = (self.head + count) % self.capacity();
            self.len -= count;
        }
        count
    }

    /// Drop everything
    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.len = 0;
    }
}
