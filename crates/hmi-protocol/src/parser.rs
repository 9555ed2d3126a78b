//! Incremental response parsers
//!
//! A command's reply is read byte by byte. The parser chosen for the command
//! answers three questions as bytes accumulate:
//!
//! 1. [`accepts`](ResponseParser::accepts): can a reply start with this code?
//! 2. [`more_bytes_needed`](ResponseParser::more_bytes_needed): how many more
//!    bytes before a parse can be attempted? Zero or negative means ready.
//! 3. [`parse`](ResponseParser::parse): decode the complete message.
//!
//! Parsers hold no stream state. Everything lives in the caller's message
//! buffer, so the same parser value can be reused across commands.

use crate::code::{codes, is_instruction_result, ResultCode};
use crate::error::ParseError;
use crate::framing::{find_message_length, has_terminator, TERMINATOR_LEN};

/// Length of a message with no payload: code plus terminator
pub const ACK_LEN: usize = 1 + TERMINATOR_LEN;

/// Length of a numeric reply: code, 4-byte integer, terminator
pub const NUMBER_LEN: usize = 1 + 4 + TERMINATOR_LEN;

/// Length of a page id reply: code, page byte, terminator
pub const PAGE_ID_LEN: usize = 1 + 1 + TERMINATOR_LEN;

/// The kind of reply a command expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ResponseParser {
    /// Instruction result with no payload
    Ack,
    /// Little-endian `i32` from `get`, or an instruction result
    Number,
    /// String from `get`; `capacity` is the caller's buffer size including
    /// the trailing NUL
    Text { capacity: usize },
    /// Exactly `length` raw bytes with no code and no terminator
    Raw { length: usize },
    /// Page id from `sendme`, or an instruction result
    PageId,
    /// "Ready for transparent data" signal, or an instruction result
    TransparentReady,
    /// "Transparent data finished" signal, or an instruction result
    TransparentFinished,
}

/// A decoded reply
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Response {
    /// Instruction result (success or device-side error)
    Result(ResultCode),
    /// Numeric attribute value
    Number(i32),
    /// Text attribute value
    Text(String),
    /// Raw byte dump
    Raw(Vec<u8>),
    /// Current page id
    PageId(u8),
    /// Device is ready for transparent data
    TransparentReady,
    /// Device received all transparent data
    TransparentFinished,
}

impl Response {
    /// The device-side error carried by this reply, if any
    pub fn device_error(&self) -> Option<ResultCode> {
        match self {
            Self::Result(code) if !code.is_success() => Some(*code),
            _ => None,
        }
    }
}

impl ResponseParser {
    /// Short name used in error messages
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ack => "ack",
            Self::Number => "number",
            Self::Text { .. } => "text",
            Self::Raw { .. } => "raw",
            Self::PageId => "page id",
            Self::TransparentReady => "transparent-ready",
            Self::TransparentFinished => "transparent-finished",
        }
    }

    /// Returns true if a reply of this kind may start with `code`
    pub fn accepts(&self, code: u8) -> bool {
        match self {
            Self::Raw { .. } => true,
            Self::Ack => is_instruction_result(code),
            Self::Number => code == codes::NUMBER_DATA || is_instruction_result(code),
            Self::Text { .. } => code == codes::STRING_DATA || is_instruction_result(code),
            Self::PageId => code == codes::PAGE_ID || is_instruction_result(code),
            Self::TransparentReady => {
                code == codes::TRANSPARENT_READY || is_instruction_result(code)
            }
            Self::TransparentFinished => {
                code == codes::TRANSPARENT_FINISHED || is_instruction_result(code)
            }
        }
    }

    /// Bytes still needed before [`parse`](Self::parse) can run on `message`.
    ///
    /// Zero or negative means the message is complete.
    pub fn more_bytes_needed(&self, message: &[u8]) -> isize {
        self.expected_len(message) as isize - message.len() as isize
    }

    /// Total message length implied by the bytes seen so far
    fn expected_len(&self, message: &[u8]) -> usize {
        let code = message.first().copied();
        match self {
            Self::Raw { length } => *length,
            Self::Ack | Self::TransparentReady | Self::TransparentFinished => ACK_LEN,
            Self::Number if code == Some(codes::NUMBER_DATA) => NUMBER_LEN,
            Self::PageId if code == Some(codes::PAGE_ID) => PAGE_ID_LEN,
            Self::Number | Self::PageId => ACK_LEN,
            Self::Text { .. } => {
                if message.len() < ACK_LEN || code != Some(codes::STRING_DATA) {
                    return ACK_LEN;
                }
                // Length unknown until the terminator run shows up after the code
                match find_message_length(&message[1..]) {
                    Some(len) => 1 + len,
                    None => message.len() + 1,
                }
            }
        }
    }

    /// Decode a complete message
    pub fn parse(&self, message: &[u8]) -> Result<Response, ParseError> {
        let needed = self.more_bytes_needed(message);
        if needed > 0 {
            return Err(ParseError::Incomplete {
                needed: needed as usize,
            });
        }

        if let Self::Raw { length } = self {
            if message.len() != *length {
                return Err(ParseError::InvalidLength {
                    expected: *length,
                    actual: message.len(),
                });
            }
            return Ok(Response::Raw(message.to_vec()));
        }

        let code = message[0];
        if !self.accepts(code) {
            return Err(ParseError::UnexpectedCode {
                code,
                expected: self.name(),
            });
        }
        if !has_terminator(message) {
            return Err(ParseError::MissingTerminator { len: message.len() });
        }
        if is_instruction_result(code) {
            if message.len() != ACK_LEN {
                return Err(ParseError::InvalidLength {
                    expected: ACK_LEN,
                    actual: message.len(),
                });
            }
            return Ok(Response::Result(ResultCode::from(code)));
        }

        match self {
            Self::Number => {
                let value = i32::from_le_bytes([message[1], message[2], message[3], message[4]]);
                Ok(Response::Number(value))
            }
            Self::Text { capacity } => {
                let needed = message.len().saturating_sub(1 + TERMINATOR_LEN) + 1;
                if needed > *capacity {
                    return Err(ParseError::BufferTooSmall {
                        needed,
                        capacity: *capacity,
                    });
                }
                let mut out = vec![0u8; needed];
                let len = copy_text(message, &mut out)?;
                out.truncate(len);
                Ok(Response::Text(String::from_utf8_lossy(&out).into_owned()))
            }
            Self::PageId => Ok(Response::PageId(message[1])),
            Self::TransparentReady => Ok(Response::TransparentReady),
            Self::TransparentFinished => Ok(Response::TransparentFinished),
            Self::Ack | Self::Raw { .. } => Err(ParseError::UnexpectedCode {
                code,
                expected: self.name(),
            }),
        }
    }
}

/// Copy the payload of a complete string-data message into `out` and
/// NUL-terminate it. Returns the payload length (excluding the NUL).
///
/// Fails rather than truncating when `out` cannot hold payload plus NUL.
pub fn copy_text(message: &[u8], out: &mut [u8]) -> Result<usize, ParseError> {
    if message.first() != Some(&codes::STRING_DATA) {
        return Err(ParseError::UnexpectedCode {
            code: message.first().copied().unwrap_or_default(),
            expected: "text",
        });
    }
    if message.len() < ACK_LEN || !has_terminator(message) {
        return Err(ParseError::MissingTerminator { len: message.len() });
    }

    let payload = &message[1..message.len() - TERMINATOR_LEN];
    if payload.len() + 1 > out.len() {
        return Err(ParseError::BufferTooSmall {
            needed: payload.len() + 1,
            capacity: out.len(),
        });
    }

    out[..payload.len()].copy_from_slice(payload);
    out[payload.len()] = 0;
    Ok(payload.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feed `bytes` one at a time until the parser reports completion
    fn feed(parser: ResponseParser, bytes: &[u8]) -> Vec<u8> {
        let mut message = Vec::new();
        for &byte in bytes {
            if parser.more_bytes_needed(&message) <= 0 {
                break;
            }
            message.push(byte);
        }
        message
    }

    #[test]
    fn test_ack_success() {
        let msg = [0x01, 0xFF, 0xFF, 0xFF];
        assert_eq!(ResponseParser::Ack.more_bytes_needed(&[]), 4);
        assert_eq!(ResponseParser::Ack.more_bytes_needed(&msg), 0);
        assert_eq!(
            ResponseParser::Ack.parse(&msg),
            Ok(Response::Result(ResultCode::Success))
        );
    }

    #[test]
    fn test_ack_rejects_event_code() {
        assert!(!ResponseParser::Ack.accepts(codes::TOUCH_EVENT));
        assert!(!ResponseParser::Ack.accepts(codes::NUMBER_DATA));
        assert!(ResponseParser::Ack.accepts(0x02));
    }

    #[test]
    fn test_ack_missing_terminator() {
        let msg = [0x01, 0xFF, 0xFF, 0x00];
        assert_eq!(
            ResponseParser::Ack.parse(&msg),
            Err(ParseError::MissingTerminator { len: 4 })
        );
    }

    #[test]
    fn test_number_little_endian() {
        let msg = [0x71, 0x01, 0x02, 0x03, 0x04, 0xFF, 0xFF, 0xFF];
        assert_eq!(ResponseParser::Number.more_bytes_needed(&msg[..1]), 7);
        assert_eq!(
            ResponseParser::Number.parse(&msg),
            Ok(Response::Number(67_305_985))
        );
    }

    #[test]
    fn test_number_negative() {
        let msg = [0x71, 0xFE, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
        assert_eq!(feed(ResponseParser::Number, &msg).len(), 8);
        assert_eq!(ResponseParser::Number.parse(&msg), Ok(Response::Number(-2)));
    }

    #[test]
    fn test_number_error_path() {
        let msg = [0x1A, 0xFF, 0xFF, 0xFF];
        assert_eq!(ResponseParser::Number.more_bytes_needed(&msg[..1]), 3);
        assert_eq!(
            ResponseParser::Number.parse(&msg),
            Ok(Response::Result(ResultCode::InvalidVariable))
        );
    }

    #[test]
    fn test_text_length_discovered_at_terminator() {
        let msg = [0x70, b'a', b'b', b'1', b'2', b'3', 0xFF, 0xFF, 0xFF];
        let parser = ResponseParser::Text { capacity: 16 };

        for len in 0..msg.len() {
            assert!(parser.more_bytes_needed(&msg[..len]) > 0, "len {}", len);
        }
        assert_eq!(parser.more_bytes_needed(&msg), 0);
        assert_eq!(parser.parse(&msg), Ok(Response::Text("ab123".into())));
    }

    #[test]
    fn test_text_nul_terminated() {
        let msg = [0x70, b'a', b'b', b'1', b'2', b'3', 0xFF, 0xFF, 0xFF];
        let mut out = [0xAAu8; 8];
        assert_eq!(copy_text(&msg, &mut out), Ok(5));
        assert_eq!(&out[..6], b"ab123\0");
    }

    #[test]
    fn test_text_buffer_too_small() {
        let msg = [0x70, b'a', b'b', b'1', b'2', b'3', 0xFF, 0xFF, 0xFF];
        let mut out = [0u8; 4];
        assert_eq!(
            copy_text(&msg, &mut out),
            Err(ParseError::BufferTooSmall {
                needed: 6,
                capacity: 4
            })
        );
        assert_eq!(
            ResponseParser::Text { capacity: 4 }.parse(&msg),
            Err(ParseError::BufferTooSmall {
                needed: 6,
                capacity: 4
            })
        );
    }

    #[test]
    fn test_text_empty_string() {
        let msg = [0x70, 0xFF, 0xFF, 0xFF];
        let parser = ResponseParser::Text { capacity: 1 };
        assert_eq!(parser.more_bytes_needed(&msg), 0);
        assert_eq!(parser.parse(&msg), Ok(Response::Text(String::new())));
    }

    #[test]
    fn test_text_huge_capacity() {
        let msg = [0x70, b'o', b'k', 0xFF, 0xFF, 0xFF];
        let parser = ResponseParser::Text {
            capacity: usize::MAX,
        };
        assert_eq!(parser.parse(&msg), Ok(Response::Text("ok".into())));
    }

    #[test]
    fn test_text_error_path() {
        let msg = [0x1A, 0xFF, 0xFF, 0xFF];
        let parser = ResponseParser::Text { capacity: 8 };
        assert_eq!(parser.more_bytes_needed(&msg), 0);
        assert_eq!(
            parser.parse(&msg),
            Ok(Response::Result(ResultCode::InvalidVariable))
        );
    }

    #[test]
    fn test_raw_takes_declared_length() {
        let parser = ResponseParser::Raw { length: 3 };
        assert!(parser.accepts(0x65));
        let msg = [0xFF, 0x00, 0x65];
        assert_eq!(parser.more_bytes_needed(&msg[..2]), 1);
        assert_eq!(parser.parse(&msg), Ok(Response::Raw(msg.to_vec())));
    }

    #[test]
    fn test_page_id() {
        let msg = [0x66, 0x02, 0xFF, 0xFF, 0xFF];
        assert_eq!(ResponseParser::PageId.more_bytes_needed(&msg[..1]), 4);
        assert_eq!(ResponseParser::PageId.parse(&msg), Ok(Response::PageId(2)));

        let err = [0x03, 0xFF, 0xFF, 0xFF];
        assert_eq!(
            ResponseParser::PageId.parse(&err),
            Ok(Response::Result(ResultCode::InvalidPage))
        );
    }

    #[test]
    fn test_transparent_signals() {
        let ready = [0xFE, 0xFF, 0xFF, 0xFF];
        let finished = [0xFD, 0xFF, 0xFF, 0xFF];
        assert_eq!(
            ResponseParser::TransparentReady.parse(&ready),
            Ok(Response::TransparentReady)
        );
        assert_eq!(
            ResponseParser::TransparentFinished.parse(&finished),
            Ok(Response::TransparentFinished)
        );
        assert!(!ResponseParser::TransparentReady.accepts(0xFD));
        assert!(ResponseParser::TransparentReady.parse(&finished).is_err());
    }

    #[test]
    fn test_incomplete() {
        assert_eq!(
            ResponseParser::Ack.parse(&[0x01, 0xFF]),
            Err(ParseError::Incomplete { needed: 2 })
        );
    }

    #[test]
    fn test_device_error() {
        assert_eq!(
            Response::Result(ResultCode::InvalidComponent).device_error(),
            Some(ResultCode::InvalidComponent)
        );
        assert_eq!(Response::Result(ResultCode::Success).device_error(), None);
        assert_eq!(Response::Number(0).device_error(), None);
    }
}
