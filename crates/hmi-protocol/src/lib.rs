//! HMI Display Protocol Library
//!
//! This crate provides parsing and encoding for the serial protocol spoken
//! by UART-attached HMI touch displays. Commands are ASCII text; everything
//! the display sends back is a one-byte code, an optional payload, and the
//! terminator `FF FF FF`.
//!
//! - **Framing**: terminator scanning over a slice or a [`RingBuffer`]
//! - **Responses**: incremental parsers for acknowledgements, numbers,
//!   strings, raw dumps, page ids and the transparent-data handshake
//! - **Events**: touch, coordinate and device-state notifications
//! - **Commands**: typed command builder with argument validation
//!
//! # Architecture
//!
//! Nothing here performs I/O. A link layer pulls bytes off the transport,
//! buffers them in a [`RingBuffer`], and uses the code table to decide
//! whether the next message is a reply to the command in flight or an
//! unsolicited event:
//!
//! - Codes in the instruction-result or typed-response range belong to the
//!   current [`ResponseParser`]
//! - Codes in the event range are consumed by fixed length through
//!   [`EventDecoder`]
//!
//! # Example
//!
//! ```rust
//! use hmi_protocol::{Command, ObjectRef, Response, ResponseParser};
//!
//! let cmd = Command::GetValue { object: ObjectRef::new("n0") };
//! assert_eq!(cmd.encode().unwrap(), b"get n0.val\xFF\xFF\xFF");
//!
//! let reply = [0x71, 0x32, 0x00, 0x00, 0x00, 0xFF, 0xFF, 0xFF];
//! assert_eq!(ResponseParser::Number.more_bytes_needed(&reply), 0);
//! assert_eq!(ResponseParser::Number.parse(&reply), Ok(Response::Number(50)));
//! ```

pub mod code;
pub mod command;
pub mod error;
pub mod event;
pub mod framing;
pub mod parser;
pub mod ring;

pub use code::{is_event_code, is_instruction_result, CodeRange, ResultCode, STARTUP_MESSAGE};
pub use command::{encode, Command, ObjectRef, PageRef};
pub use error::ParseError;
pub use event::{
    CoordinateEvent, DeviceState, DisplayEvent, EventDecoder, EventKind, TouchAction, TouchEvent,
};
pub use framing::{find_message_length, FramingScanner, TERMINATOR};
pub use parser::{copy_text, Response, ResponseParser};
pub use ring::RingBuffer;
