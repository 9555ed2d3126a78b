//! Event subscription and idle-time message demultiplexing
//!
//! While no command is in flight, every complete message in the receive
//! buffer is either an unsolicited event (dispatched to its handler) or a
//! response nobody is waiting for (logged and discarded).
//!
//! # Message lengths when idle
//!
//! - Event codes have fixed lengths ([`EventDecoder::message_length`])
//! - `0x71` number data is always 8 bytes and `0x66` page id 5 bytes, so
//!   payload bytes equal to `0xFF` cannot end them early
//! - `0x70` string data and `0x00` (which doubles as the first byte of the
//!   6-byte startup notification) are framed by the terminator
//! - Every other instruction result is 4 bytes

use std::sync::{Arc, Mutex, PoisonError};

use hmi_protocol::code::codes;
use hmi_protocol::parser::{ACK_LEN, NUMBER_LEN, PAGE_ID_LEN};
use hmi_protocol::{
    CoordinateEvent, DeviceState, DisplayEvent, EventDecoder, FramingScanner, ParseError,
    RingBuffer, TouchEvent,
};
use tracing::{debug, warn};

type Handler<E> = Arc<dyn Fn(E) + Send + Sync>;

/// One optional handler per event kind
///
/// Registering a handler replaces the previous one for that kind.
#[derive(Default)]
pub struct EventHandlers {
    touch: Mutex<Option<Handler<TouchEvent>>>,
    coordinate: Mutex<Option<Handler<CoordinateEvent>>>,
    device_state: Mutex<Option<Handler<DeviceState>>>,
}

impl EventHandlers {
    pub fn set_touch(&self, handler: impl Fn(TouchEvent) + Send + Sync + 'static) {
        *self.touch.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(handler));
    }

    pub fn set_coordinate(&self, handler: impl Fn(CoordinateEvent) + Send + Sync + 'static) {
        *self
            .coordinate
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(handler));
    }

    pub fn set_device_state(&self, handler: impl Fn(DeviceState) + Send + Sync + 'static) {
        *self
            .device_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(handler));
    }

    /// Remove all handlers
    pub fn clear(&self) {
        *self.touch.lock().unwrap_or_else(PoisonError::into_inner) = None;
        *self
            .coordinate
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        *self
            .device_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Call the handler registered for this event's kind.
    ///
    /// Returns false if no handler is registered. The handler runs without
    /// any handler lock held, so it may register or replace handlers.
    pub fn dispatch(&self, event: DisplayEvent) -> bool {
        match event {
            DisplayEvent::Touch(touch) => call(&self.touch, touch),
            DisplayEvent::Coordinate(coord) => call(&self.coordinate, coord),
            DisplayEvent::DeviceState(state) => call(&self.device_state, state),
        }
    }
}

fn call<E>(slot: &Mutex<Option<Handler<E>>>, event: E) -> bool {
    let handler = slot.lock().unwrap_or_else(PoisonError::into_inner).clone();
    match handler {
        Some(handler) => {
            handler(event);
            true
        }
        None => false,
    }
}

/// A complete message taken from the receive buffer while idle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pending {
    /// Decoded event
    Event(DisplayEvent),
    /// Response with no command waiting for it
    Stray(Vec<u8>),
    /// Event-coded message that failed to decode
    Malformed { bytes: Vec<u8>, error: ParseError },
}

/// Length of the complete message at the front of `ring`, or `None` if the
/// message has not fully arrived
pub fn pending_message_length(ring: &RingBuffer) -> Option<usize> {
    let code = ring.peek_at(0)?;
    let len = match code {
        codes::NUMBER_DATA => NUMBER_LEN,
        codes::PAGE_ID => PAGE_ID_LEN,
        codes::STRING_DATA | codes::INVALID_INSTRUCTION => {
            return FramingScanner::new().scan(ring);
        }
        other => EventDecoder::message_length(other).unwrap_or(ACK_LEN),
    };
    (ring.len() >= len).then_some(len)
}

/// Take every complete message from the front of `ring`
pub fn take_pending(ring: &mut RingBuffer) -> Vec<Pending> {
    let mut pending = Vec::new();
    while let Some(len) = pending_message_length(ring) {
        let mut bytes = vec![0u8; len];
        if !ring.read_bytes(&mut bytes) {
            break;
        }
        pending.push(classify(bytes));
    }
    pending
}

/// Sort one complete message into event, stray reply or undecodable event
pub fn classify(bytes: Vec<u8>) -> Pending {
    let is_event = EventDecoder::is_startup(&bytes)
        || bytes
            .first()
            .and_then(|&code| EventDecoder::message_length(code))
            .is_some();
    if !is_event {
        return Pending::Stray(bytes);
    }
    match EventDecoder::decode(&bytes) {
        Ok(event) => {
            debug!("Event {:?}", event);
            Pending::Event(event)
        }
        Err(error) => Pending::Malformed { bytes, error },
    }
}

/// Dispatch pending messages, returning how many events were delivered
pub fn deliver(handlers: &EventHandlers, pending: Vec<Pending>) -> usize {
    let mut delivered = 0;
    for item in pending {
        match item {
            Pending::Event(event) => {
                if !handlers.dispatch(event) {
                    debug!("No handler for {:?}", event.kind());
                }
                delivered += 1;
            }
            Pending::Stray(bytes) => {
                warn!("Discarding response with no command pending: {:02X?}", bytes);
            }
            Pending::Malformed { bytes, error } => {
                warn!("Dropping undecodable event {:02X?}: {}", bytes, error);
            }
        }
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmi_protocol::{TouchAction, STARTUP_MESSAGE};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ring_with(bytes: &[u8]) -> RingBuffer {
        let mut ring = RingBuffer::new(64);
        assert!(ring.write_bytes(bytes));
        ring
    }

    #[test]
    fn test_touch_event_taken() {
        let mut ring = ring_with(&[0x65, 0x00, 0x02, 0x01, 0xFF, 0xFF, 0xFF]);
        let pending = take_pending(&mut ring);
        assert_eq!(
            pending,
            vec![Pending::Event(DisplayEvent::Touch(TouchEvent {
                page_id: 0,
                component_id: 2,
                action: TouchAction::Press,
            }))]
        );
        assert!(ring.is_empty());
    }

    #[test]
    fn test_partial_event_left_in_buffer() {
        let mut ring = ring_with(&[0x88, 0xFF, 0xFF, 0xFF, 0x65, 0x00]);
        let pending = take_pending(&mut ring);
        assert_eq!(pending.len(), 1);
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn test_coordinate_with_ff_payload() {
        let mut ring = ring_with(&[0x67, 0xFF, 0xFF, 0xFF, 0x10, 0x00, 0xFF, 0xFF, 0xFF]);
        assert_eq!(pending_message_length(&ring), Some(9));
        let pending = take_pending(&mut ring);
        assert!(matches!(
            pending[0],
            Pending::Event(DisplayEvent::Coordinate(CoordinateEvent { x: 0xFFFF, .. }))
        ));
    }

    #[test]
    fn test_startup_vs_invalid_instruction() {
        let mut ring = ring_with(&STARTUP_MESSAGE);
        ring.write_bytes(&[0x00, 0xFF, 0xFF, 0xFF]);
        let pending = take_pending(&mut ring);
        assert_eq!(
            pending,
            vec![
                Pending::Event(DisplayEvent::DeviceState(DeviceState::Startup)),
                Pending::Stray(vec![0x00, 0xFF, 0xFF, 0xFF]),
            ]
        );
    }

    #[test]
    fn test_stray_responses_never_dispatched() {
        let mut ring = ring_with(&[
            0x01, 0xFF, 0xFF, 0xFF, // ack
            0x71, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, // number -1
            0x70, b'h', b'i', 0xFF, 0xFF, 0xFF, // text
            0x66, 0x01, 0xFF, 0xFF, 0xFF, // page id
        ]);
        let pending = take_pending(&mut ring);
        assert_eq!(pending.len(), 4);
        assert!(pending.iter().all(|p| matches!(p, Pending::Stray(_))));
        assert!(ring.is_empty());
    }

    #[test]
    fn test_malformed_event_dropped() {
        let mut ring = ring_with(&[0x65, 0x00, 0x02, 0x09, 0xFF, 0xFF, 0xFF]);
        let pending = take_pending(&mut ring);
        assert!(matches!(pending[0], Pending::Malformed { .. }));

        let handlers = EventHandlers::default();
        assert_eq!(deliver(&handlers, pending), 0);
    }

    #[test]
    fn test_handler_replaced() {
        let handlers = EventHandlers::default();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let counter = first.clone();
        handlers.set_device_state(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = second.clone();
        handlers.set_device_state(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(handlers.dispatch(DisplayEvent::DeviceState(DeviceState::Ready)));
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);

        assert!(!handlers.dispatch(DisplayEvent::Touch(TouchEvent {
            page_id: 0,
            component_id: 1,
            action: TouchAction::Release,
        })));

        handlers.clear();
        assert!(!handlers.dispatch(DisplayEvent::DeviceState(DeviceState::Ready)));
    }
}
