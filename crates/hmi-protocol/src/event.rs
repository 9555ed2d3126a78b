//! Unsolicited event decoding
//!
//! Events arrive on the same wire as command replies. Each event code has a
//! fixed message length, so events are consumed by arity rather than by
//! scanning for the terminator (coordinate payloads may contain `0xFF`).
//!
//! | Code | Event | Length |
//! |------|-------|--------|
//! | `0x65` | touch: page, component, press/release | 7 |
//! | `0x67` | touch coordinate (awake): x, y, press/release | 9 |
//! | `0x68` | touch coordinate (woke from sleep) | 9 |
//! | `0x86`-`0x89`, `0xFD`, `0xFE` | device state | 4 |
//!
//! Coordinates are big-endian `u16`.

use crate::code::{codes, STARTUP_MESSAGE};
use crate::error::ParseError;
use crate::framing::{has_terminator, TERMINATOR_LEN};

/// Length of a component touch event
pub const TOUCH_EVENT_LEN: usize = 1 + 3 + TERMINATOR_LEN;

/// Length of a touch coordinate event
pub const COORDINATE_EVENT_LEN: usize = 1 + 5 + TERMINATOR_LEN;

/// Length of a device state event
pub const DEVICE_STATE_LEN: usize = 1 + TERMINATOR_LEN;

/// Press or release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TouchAction {
    Release,
    Press,
}

impl TouchAction {
    fn from_byte(byte: u8) -> Result<Self, ParseError> {
        match byte {
            0x00 => Ok(Self::Release),
            0x01 => Ok(Self::Press),
            other => Err(ParseError::MalformedEvent(format!(
                "touch action 0x{:02X}",
                other
            ))),
        }
    }

    /// Wire value
    pub fn to_byte(self) -> u8 {
        match self {
            Self::Release => 0x00,
            Self::Press => 0x01,
        }
    }
}

/// Device state notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DeviceState {
    /// Powered up or reset
    Startup,
    /// Entered automatic sleep
    AutoSleep,
    /// Woke from automatic sleep
    AutoWake,
    /// Ready to accept commands
    Ready,
    /// Upgrading firmware from storage
    Upgrading,
    /// Ready for transparent data
    TransparentReady,
    /// Transparent data finished
    TransparentFinished,
}

/// Component touch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TouchEvent {
    pub page_id: u8,
    pub component_id: u8,
    pub action: TouchAction,
}

/// Raw touch coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CoordinateEvent {
    pub x: u16,
    pub y: u16,
    pub action: TouchAction,
    /// True when this touch woke the display from sleep
    pub exited_sleep: bool,
}

/// A decoded event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DisplayEvent {
    DeviceState(DeviceState),
    Touch(TouchEvent),
    Coordinate(CoordinateEvent),
}

/// Subscription category of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EventKind {
    DeviceState,
    Touch,
    Coordinate,
}

impl DisplayEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::DeviceState(_) => EventKind::DeviceState,
            Self::Touch(_) => EventKind::Touch,
            Self::Coordinate(_) => EventKind::Coordinate,
        }
    }

    /// Encode as a wire message
    pub fn encode(&self) -> Vec<u8> {
        let mut out = match self {
            Self::DeviceState(DeviceState::Startup) => return STARTUP_MESSAGE.to_vec(),
            Self::DeviceState(state) => vec![device_state_code(*state)],
            Self::Touch(touch) => vec![
                codes::TOUCH_EVENT,
                touch.page_id,
                touch.component_id,
                touch.action.to_byte(),
            ],
            Self::Coordinate(coord) => {
                let code = if coord.exited_sleep {
                    codes::TOUCH_COORDINATE_SLEEP
                } else {
                    codes::TOUCH_COORDINATE
                };
                let mut out = vec![code];
                out.extend_from_slice(&coord.x.to_be_bytes());
                out.extend_from_slice(&coord.y.to_be_bytes());
                out.push(coord.action.to_byte());
                out
            }
        };
        out.extend_from_slice(&crate::framing::TERMINATOR);
        out
    }
}

fn device_state_code(state: DeviceState) -> u8 {
    match state {
        DeviceState::Startup => codes::INVALID_INSTRUCTION,
        DeviceState::AutoSleep => codes::AUTO_SLEEP,
        DeviceState::AutoWake => codes::AUTO_WAKE,
        DeviceState::Ready => codes::READY,
        DeviceState::Upgrading => codes::UPGRADING,
        DeviceState::TransparentReady => codes::TRANSPARENT_READY,
        DeviceState::TransparentFinished => codes::TRANSPARENT_FINISHED,
    }
}

/// Maps event codes to message lengths and decodes complete event messages
pub struct EventDecoder;

impl EventDecoder {
    /// Total message length for an event code, or `None` if `code` is not
    /// an event code
    pub fn message_length(code: u8) -> Option<usize> {
        match code {
            codes::TOUCH_EVENT => Some(TOUCH_EVENT_LEN),
            codes::TOUCH_COORDINATE | codes::TOUCH_COORDINATE_SLEEP => Some(COORDINATE_EVENT_LEN),
            codes::AUTO_SLEEP
            | codes::AUTO_WAKE
            | codes::READY
            | codes::UPGRADING
            | codes::TRANSPARENT_READY
            | codes::TRANSPARENT_FINISHED => Some(DEVICE_STATE_LEN),
            _ => None,
        }
    }

    /// Returns true if `message` is the startup notification
    pub fn is_startup(message: &[u8]) -> bool {
        message == STARTUP_MESSAGE
    }

    /// Decode a complete event message
    pub fn decode(message: &[u8]) -> Result<DisplayEvent, ParseError> {
        if Self::is_startup(message) {
            return Ok(DisplayEvent::DeviceState(DeviceState::Startup));
        }

        let code = *message.first().ok_or(ParseError::Incomplete { needed: 1 })?;
        let expected = Self::message_length(code).ok_or(ParseError::UnknownEvent(code))?;
        if message.len() < expected {
            return Err(ParseError::Incomplete {
                needed: expected - message.len(),
            });
        }
        if message.len() != expected {
            return Err(ParseError::InvalidLength {
                expected,
                actual: message.len(),
            });
        }
        if !has_terminator(message) {
            return Err(ParseError::MissingTerminator { len: message.len() });
        }

        let event = match code {
            codes::TOUCH_EVENT => DisplayEvent::Touch(TouchEvent {
                page_id: message[1],
                component_id: message[2],
                action: TouchAction::from_byte(message[3])?,
            }),
            codes::TOUCH_COORDINATE | codes::TOUCH_COORDINATE_SLEEP => {
                DisplayEvent::Coordinate(CoordinateEvent {
                    x: u16::from_be_bytes([message[1], message[2]]),
                    y: u16::from_be_bytes([message[3], message[4]]),
                    action: TouchAction::from_byte(message[5])?,
                    exited_sleep: code == codes::TOUCH_COORDINATE_SLEEP,
                })
            }
            codes::AUTO_SLEEP => DisplayEvent::DeviceState(DeviceState::AutoSleep),
            codes::AUTO_WAKE => DisplayEvent::DeviceState(DeviceState::AutoWake),
            codes::READY => DisplayEvent::DeviceState(DeviceState::Ready),
            codes::UPGRADING => DisplayEvent::DeviceState(DeviceState::Upgrading),
            codes::TRANSPARENT_READY => DisplayEvent::DeviceState(DeviceState::TransparentReady),
            codes::TRANSPARENT_FINISHED => {
                DisplayEvent::DeviceState(DeviceState::TransparentFinished)
            }
            other => return Err(ParseError::UnknownEvent(other)),
        };

        tracing::trace!("Decoded event {:?}", event);
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_touch() {
        let msg = [0x65, 0x00, 0x02, 0x01, 0xFF, 0xFF, 0xFF];
        assert_eq!(
            EventDecoder::decode(&msg),
            Ok(DisplayEvent::Touch(TouchEvent {
                page_id: 0,
                component_id: 2,
                action: TouchAction::Press,
            }))
        );
    }

    #[test]
    fn test_decode_coordinate_big_endian() {
        let msg = [0x67, 0x00, 0x7A, 0x01, 0x2C, 0x00, 0xFF, 0xFF, 0xFF];
        assert_eq!(
            EventDecoder::decode(&msg),
            Ok(DisplayEvent::Coordinate(CoordinateEvent {
                x: 122,
                y: 300,
                action: TouchAction::Release,
                exited_sleep: false,
            }))
        );
    }

    #[test]
    fn test_decode_coordinate_from_sleep() {
        let msg = [0x68, 0x00, 0xFF, 0x00, 0xFF, 0x01, 0xFF, 0xFF, 0xFF];
        let event = EventDecoder::decode(&msg).unwrap();
        match event {
            DisplayEvent::Coordinate(coord) => {
                assert_eq!(coord.x, 255);
                assert_eq!(coord.y, 255);
                assert!(coord.exited_sleep);
                assert_eq!(coord.action, TouchAction::Press);
            }
            _ => panic!("Expected coordinate event"),
        }
    }

    #[test]
    fn test_decode_device_states() {
        let cases = [
            (0x86, DeviceState::AutoSleep),
            (0x87, DeviceState::AutoWake),
            (0x88, DeviceState::Ready),
            (0x89, DeviceState::Upgrading),
            (0xFE, DeviceState::TransparentReady),
            (0xFD, DeviceState::TransparentFinished),
        ];
        for (code, state) in cases {
            let msg = [code, 0xFF, 0xFF, 0xFF];
            assert_eq!(
                EventDecoder::decode(&msg),
                Ok(DisplayEvent::DeviceState(state))
            );
        }
    }

    #[test]
    fn test_decode_startup() {
        assert_eq!(
            EventDecoder::decode(&STARTUP_MESSAGE),
            Ok(DisplayEvent::DeviceState(DeviceState::Startup))
        );
    }

    #[test]
    fn test_unknown_code() {
        let msg = [0x01, 0xFF, 0xFF, 0xFF];
        assert_eq!(
            EventDecoder::decode(&msg),
            Err(ParseError::UnknownEvent(0x01))
        );
        assert_eq!(EventDecoder::message_length(0x71), None);
    }

    #[test]
    fn test_bad_action_byte() {
        let msg = [0x65, 0x00, 0x02, 0x07, 0xFF, 0xFF, 0xFF];
        assert!(matches!(
            EventDecoder::decode(&msg),
            Err(ParseError::MalformedEvent(_))
        ));
    }

    #[test]
    fn test_missing_terminator() {
        let msg = [0x65, 0x00, 0x02, 0x01, 0xFF, 0xFF, 0x00];
        assert_eq!(
            EventDecoder::decode(&msg),
            Err(ParseError::MissingTerminator { len: 7 })
        );
    }

    #[test]
    fn test_encode_matches_decode() {
        let events = [
            DisplayEvent::DeviceState(DeviceState::Startup),
            DisplayEvent::DeviceState(DeviceState::Ready),
            DisplayEvent::Touch(TouchEvent {
                page_id: 1,
                component_id: 5,
                action: TouchAction::Release,
            }),
            DisplayEvent::Coordinate(CoordinateEvent {
                x: 479,
                y: 271,
                action: TouchAction::Press,
                exited_sleep: true,
            }),
        ];
        for event in events {
            assert_eq!(EventDecoder::decode(&event.encode()), Ok(event));
        }
    }
}
