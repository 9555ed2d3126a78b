//! Message framing
//!
//! Every message on the wire ends with three consecutive `0xFF` bytes:
//!
//! ```text
//! [code: 1 byte] [payload: 0..N bytes] [FF FF FF]
//! ```
//!
//! The scanner finds the end of the next message by counting consecutive
//! terminator bytes. It can run once over a complete slice, or be fed one
//! byte at a time as bytes arrive; both yield the same length for the same
//! content.
//!
//! Text payloads are not escaped, so a payload that itself contains three
//! `0xFF` bytes in a row ends the message early. The protocol has no way to
//! express that case.

use crate::ring::RingBuffer;

/// Value of each terminator byte
pub const TERMINATOR_BYTE: u8 = 0xFF;

/// Number of terminator bytes ending each message
pub const TERMINATOR_LEN: usize = 3;

/// The full terminator sequence
pub const TERMINATOR: [u8; TERMINATOR_LEN] = [TERMINATOR_BYTE; TERMINATOR_LEN];

/// Find the length of the first complete message in `data`, including its
/// terminator. Returns `None` if no terminator run has been seen yet.
pub fn find_message_length(data: &[u8]) -> Option<usize> {
    let mut scanner = FramingScanner::new();
    data.iter().find_map(|&byte| scanner.push(byte))
}

/// Returns true if `message` ends with the terminator
pub fn has_terminator(message: &[u8]) -> bool {
    message.len() >= TERMINATOR_LEN && message.ends_with(&TERMINATOR)
}

/// Streaming terminator scanner
///
/// Holds the count of consecutive terminator bytes seen so far and a peek
/// cursor for scanning a [`RingBuffer`] without consuming from it.
#[derive(Debug, Clone, Default)]
pub struct FramingScanner {
    run: usize,
    scanned: usize,
    cursor: usize,
}

impl FramingScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next byte. Returns the message length the first time a
    /// full terminator run completes.
    pub fn push(&mut self, byte: u8) -> Option<usize> {
        self.scanned += 1;
        if byte == TERMINATOR_BYTE {
            self.run += 1;
            if self.run == TERMINATOR_LEN {
                return Some(self.scanned);
            }
        } else {
            self.run = 0;
        }
        None
    }

    /// Scan bytes buffered in `ring` that have not been scanned yet.
    ///
    /// Only the peek cursor moves; the ring's read position is untouched.
    /// Call [`reset`](Self::reset) once the message has been consumed.
    pub fn scan(&mut self, ring: &RingBuffer) -> Option<usize> {
        while let Some(byte) = ring.peek(&mut self.cursor) {
            if let Some(len) = self.push(byte) {
                return Some(len);
            }
        }
        None
    }

    /// Number of bytes examined since the last reset
    pub fn scanned(&self) -> usize {
        self.scanned
    }

    /// Forget all progress
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_ack_message() {
        assert_eq!(find_message_length(&[0x01, 0xFF, 0xFF, 0xFF]), Some(4));
    }

    #[test]
    fn test_incomplete() {
        assert_eq!(find_message_length(&[0x01, 0xFF, 0xFF]), None);
        assert_eq!(find_message_length(&[]), None);
    }

    #[test]
    fn test_run_resets_on_other_byte() {
        let data = [0x70, 0xFF, 0xFF, 0x41, 0xFF, 0xFF, 0xFF];
        assert_eq!(find_message_length(&data), Some(7));
    }

    #[test]
    fn test_first_message_only() {
        let data = [0x01, 0xFF, 0xFF, 0xFF, 0x02, 0xFF, 0xFF, 0xFF];
        assert_eq!(find_message_length(&data), Some(4));
    }

    #[test]
    fn test_longer_run_stops_at_third() {
        let data = [0xFF, 0xFF, 0xFF, 0xFF];
        assert_eq!(find_message_length(&data), Some(3));
    }

    #[test]
    fn test_scan_ring_incrementally() {
        let mut ring = RingBuffer::new(16);
        let mut scanner = FramingScanner::new();

        ring.write_bytes(&[0x71, 0x32, 0x00]);
        assert_eq!(scanner.scan(&ring), None);
        ring.write_bytes(&[0x00, 0x00, 0xFF, 0xFF]);
        assert_eq!(scanner.scan(&ring), None);
        ring.write_bytes(&[0xFF, 0x01]);
        assert_eq!(scanner.scan(&ring), Some(8));

        // Read position untouched
        assert_eq!(ring.len(), 9);
        assert_eq!(ring.peek_at(0), Some(0x71));
    }

    #[test]
    fn test_has_terminator() {
        assert!(has_terminator(&[0x01, 0xFF, 0xFF, 0xFF]));
        assert!(!has_terminator(&[0x01, 0xFF, 0xFF, 0x00]));
        assert!(!has_terminator(&[0xFF, 0xFF]));
    }

    fn message_then_noise() -> impl Strategy<Value = (Vec<u8>, usize)> {
        (
            prop::collection::vec(0u8..0xFF, 0..32),
            prop::collection::vec(any::<u8>(), 0..32),
        )
            .prop_map(|(payload, noise)| {
                let mut bytes = payload;
                bytes.extend_from_slice(&TERMINATOR);
                let len = bytes.len();
                bytes.extend(noise);
                (bytes, len)
            })
    }

    proptest! {
        #[test]
        fn streaming_matches_bulk((bytes, len) in message_then_noise()) {
            prop_assert_eq!(find_message_length(&bytes), Some(len));

            let mut ring = RingBuffer::new(bytes.len());
            let mut scanner = FramingScanner::new();
            let mut streamed = None;
            for &byte in &bytes {
                ring.write(byte);
                if let Some(found) = scanner.scan(&ring) {
                    streamed = Some(found);
                    break;
                }
            }
            prop_assert_eq!(streamed, Some(len));
        }
    }
}
