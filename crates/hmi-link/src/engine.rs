//! Protocol engine
//!
//! [`HmiLink`] owns one byte stream to one display. At most one command is
//! in flight at a time: `send` and the transparent data operations all take
//! the command lock (bounded by `lock_timeout_ms`) for their whole exchange.
//!
//! # States
//!
//! ```text
//!           send / begin_transparent_data
//!   Idle ────────────────────────────────▶ CommandInFlight
//!    ▲  ◀──────────────────────────────────  │
//!    │             reply or timeout          │ ready signal
//!    │                                       ▼
//!    └──────── end_transparent_data ── TransparentDataActive
//! ```
//!
//! # Reading
//!
//! Received bytes always pass through a [`RingBuffer`]. With
//! `background_reader` set, a spawned task fills it and wakes the waiting
//! command through a capacity-1 channel; otherwise the command reads the
//! transport inline. Either way, events buffered before a command is
//! transmitted are dispatched first, so a stale event is never read as that
//! command's reply.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hmi_protocol::{
    command, CoordinateEvent, DeviceState, EventDecoder, ParseError, Response, ResponseParser,
    RingBuffer, TouchEvent,
};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::LinkConfig;
use crate::error::LinkError;
use crate::events::{self, EventHandlers};
use crate::reader;
use crate::transport::{Receiver, Transmitter};

/// Expected reply to `end_transparent_data`
const TRANSPARENT_FINISHED_REPLY: [u8; 4] = [0xFD, 0xFF, 0xFF, 0xFF];

/// Observable engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    CommandInFlight,
    TransparentDataActive,
}

/// Byte accounting for an open transparent data session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransparentSession {
    pub total: usize,
    pub remaining: usize,
}

/// Where response bytes come from
pub(crate) enum Feed<T> {
    /// Read the transport directly while waiting
    Inline(Receiver<ReadHalf<T>>),
    /// Wait for the background reader to fill the ring
    Background(mpsc::Receiver<()>),
}

/// Everything owned by the command in flight
pub(crate) struct CommandSlot<T> {
    tx: Transmitter<WriteHalf<T>>,
    feed: Feed<T>,
    session: Option<TransparentSession>,
}

impl<T> CommandSlot<T> {
    pub(crate) fn session_active(&self) -> bool {
        self.session.is_some()
    }
}

pub(crate) struct ReaderHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

pub(crate) struct Shared<T> {
    pub(crate) config: LinkConfig,
    pub(crate) slot: tokio::sync::Mutex<CommandSlot<T>>,
    ring: Mutex<RingBuffer>,
    pub(crate) handlers: EventHandlers,
    reader: Mutex<Option<ReaderHandle>>,
    /// Set while a caller holds the command slot; the reader never sets it
    busy: AtomicBool,
    session_open: AtomicBool,
}

impl<T> Shared<T> {
    fn ring(&self) -> MutexGuard<'_, RingBuffer> {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append received bytes; a full buffer drops the whole chunk
    pub(crate) fn ingest(&self, data: &[u8]) {
        if !self.ring().write_bytes(data) {
            warn!(
                "Receive buffer full, dropping {} bytes: {:02X?}",
                data.len(),
                data
            );
        }
    }

    /// Dispatch every complete buffered message as an event or stray reply
    pub(crate) fn dispatch_buffered(&self) -> usize {
        let pending = events::take_pending(&mut self.ring());
        events::deliver(&self.handlers, pending)
    }
}

/// Command slot held by a caller, marking the link busy until dropped
struct SlotGuard<'a, T> {
    guard: tokio::sync::MutexGuard<'a, CommandSlot<T>>,
    busy: &'a AtomicBool,
}

impl<T> Deref for SlotGuard<'_, T> {
    type Target = CommandSlot<T>;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl<T> DerefMut for SlotGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}

impl<T> Drop for SlotGuard<'_, T> {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Async driver for one display
///
/// Cloning is cheap and every clone talks to the same display.
pub struct HmiLink<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for HmiLink<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> HmiLink<T>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Create a link over any byte stream
    ///
    /// Spawns the background reader when `config.background_reader` is set,
    /// which requires a running Tokio runtime.
    pub fn new(io: T, config: LinkConfig) -> Self {
        let (rx, tx) = tokio::io::split(io);
        let tx = Transmitter::new(tx, config.transmit_timeout());

        let (feed, reader_parts) = if config.background_reader {
            let (signal_tx, signal_rx) = mpsc::channel(1);
            (Feed::Background(signal_rx), Some((rx, signal_tx)))
        } else {
            (Feed::Inline(Receiver::new(rx)), None)
        };

        let shared = Arc::new(Shared {
            ring: Mutex::new(RingBuffer::new(config.rx_buffer_size)),
            slot: tokio::sync::Mutex::new(CommandSlot {
                tx,
                feed,
                session: None,
            }),
            handlers: EventHandlers::default(),
            reader: Mutex::new(None),
            busy: AtomicBool::new(false),
            session_open: AtomicBool::new(false),
            config,
        });

        if let Some((rx, signal_tx)) = reader_parts {
            let (shutdown_tx, shutdown_rx) = oneshot::channel();
            let task = tokio::spawn(reader::run_reader(
                Arc::downgrade(&shared),
                Receiver::new(rx),
                signal_tx,
                shutdown_rx,
            ));
            *shared.reader.lock().unwrap_or_else(PoisonError::into_inner) = Some(ReaderHandle {
                shutdown: shutdown_tx,
                task,
            });
        }

        Self { shared }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.shared.config
    }

    /// Current engine state
    pub fn state(&self) -> LinkState {
        if self.shared.busy.load(Ordering::Acquire) {
            LinkState::CommandInFlight
        } else if self.shared.session_open.load(Ordering::Acquire) {
            LinkState::TransparentDataActive
        } else {
            LinkState::Idle
        }
    }

    /// Remaining bytes in the open transparent data session
    pub async fn transparent_session(&self) -> Result<Option<TransparentSession>, LinkError> {
        let slot = self.lock().await?;
        Ok(slot.session)
    }

    /// Register the component touch handler, replacing any previous one
    pub fn on_touch(&self, handler: impl Fn(TouchEvent) + Send + Sync + 'static) {
        self.shared.handlers.set_touch(handler);
    }

    /// Register the touch coordinate handler, replacing any previous one
    pub fn on_coordinate(&self, handler: impl Fn(CoordinateEvent) + Send + Sync + 'static) {
        self.shared.handlers.set_coordinate(handler);
    }

    /// Register the device state handler, replacing any previous one
    pub fn on_device_state(&self, handler: impl Fn(DeviceState) + Send + Sync + 'static) {
        self.shared.handlers.set_device_state(handler);
    }

    /// Send a command and parse its reply
    ///
    /// The terminator is appended here. A well-formed error code from the
    /// device is returned as [`LinkError::Device`].
    pub async fn send(
        &self,
        command: &str,
        parser: ResponseParser,
    ) -> Result<Response, LinkError> {
        let mut guard = self.lock().await?;
        self.exchange(&mut guard, command, parser).await
    }

    /// Dispatch buffered events while no command is in flight
    ///
    /// Responses found here have no waiting command; they are logged and
    /// discarded. Returns the number of events dispatched.
    pub async fn process_pending_events(&self) -> Result<usize, LinkError> {
        let mut guard = self.lock().await?;
        let slot = &mut *guard;
        if slot.session_active() {
            return Err(LinkError::InvalidState(
                "transparent data session active".into(),
            ));
        }
        self.drain_events(slot).await
    }

    /// Send `command` and switch to transparent data mode for `size` bytes
    ///
    /// `size` must be non-zero and below `max_transparent_bytes`; this is
    /// checked before anything is sent.
    pub async fn begin_transparent_data(&self, size: usize, command: &str) -> Result<(), LinkError> {
        let max = self.shared.config.max_transparent_bytes;
        if size == 0 || size >= max {
            return Err(LinkError::InvalidArgument(format!(
                "transparent data size {} outside 1..{}",
                size, max
            )));
        }

        let mut guard = self.lock().await?;
        let slot = &mut *guard;
        match self
            .exchange(slot, command, ResponseParser::TransparentReady)
            .await?
        {
            Response::TransparentReady => {
                info!("Transparent data session open for {} bytes", size);
                self.set_session(
                    slot,
                    Some(TransparentSession {
                        total: size,
                        remaining: size,
                    }),
                );
                Ok(())
            }
            other => Err(LinkError::UnexpectedResponse {
                expected: ResponseParser::TransparentReady.name(),
                actual: other,
            }),
        }
    }

    /// Write one raw byte of the open transparent data session
    pub async fn write_transparent_byte(&self, byte: u8) -> Result<(), LinkError> {
        self.write_transparent_data(&[byte]).await
    }

    /// Write raw bytes of the open transparent data session
    ///
    /// Fails without writing anything if `data` exceeds the remaining budget.
    pub async fn write_transparent_data(&self, data: &[u8]) -> Result<(), LinkError> {
        let mut guard = self.lock().await?;
        let slot = &mut *guard;
        let session = slot
            .session
            .as_mut()
            .ok_or_else(|| LinkError::InvalidState("no transparent data session".into()))?;
        if data.len() > session.remaining {
            return Err(LinkError::InvalidState(format!(
                "{} bytes exceed the {} remaining in the transparent data session",
                data.len(),
                session.remaining
            )));
        }

        let mut written = 0;
        let result = match slot.tx.write_counted(data, &mut written).await {
            Ok(()) => slot.tx.wait_transmit_complete().await,
            Err(e) => Err(e),
        };
        session.remaining -= written;
        if let Err(e) = &result {
            warn!(
                "Transparent data write failed after {} of {} bytes, {} still owed: {}",
                written,
                data.len(),
                session.remaining,
                e
            );
        }
        result
    }

    /// Drop the open transparent data session and return to idle
    ///
    /// Use after a failed write. Nothing more is sent and unread input is
    /// discarded; the display may still be waiting for the bytes it was
    /// promised.
    pub async fn abort_transparent_data(&self) -> Result<(), LinkError> {
        let mut guard = self.lock().await?;
        let slot = &mut *guard;
        let session = self
            .set_session(slot, None)
            .ok_or_else(|| LinkError::InvalidState("no transparent data session".into()))?;
        warn!(
            "Transparent data session aborted with {} of {} bytes unwritten",
            session.remaining, session.total
        );
        self.flush_input(slot).await;
        Ok(())
    }

    /// Close the transparent data session and check the device's reply
    ///
    /// Fails without reading if bytes are still outstanding. Once the reply
    /// is read the link is idle again whatever the reply was.
    pub async fn end_transparent_data(&self) -> Result<(), LinkError> {
        let mut guard = self.lock().await?;
        let slot = &mut *guard;
        match slot.session {
            None => {
                return Err(LinkError::InvalidState(
                    "no transparent data session".into(),
                ))
            }
            Some(session) if session.remaining > 0 => {
                return Err(LinkError::InvalidState(format!(
                    "{} of {} transparent data bytes not yet written",
                    session.remaining, session.total
                )))
            }
            Some(_) => {}
        }
        self.set_session(slot, None);

        let mut reply = [0u8; TRANSPARENT_FINISHED_REPLY.len()];
        for byte in reply.iter_mut() {
            *byte = self.next_byte(slot).await?;
        }
        if reply != TRANSPARENT_FINISHED_REPLY {
            warn!("Unexpected transparent data reply {:02X?}", reply);
            self.flush_input(slot).await;
            return Err(LinkError::Protocol(ParseError::UnexpectedCode {
                code: reply[0],
                expected: ResponseParser::TransparentFinished.name(),
            }));
        }

        info!("Transparent data session closed");
        self.shared.dispatch_buffered();
        Ok(())
    }

    /// Stop the background reader, if any, and wait for it to exit
    pub async fn shutdown(&self) {
        let handle = self
            .shared
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.shutdown.send(());
            let _ = handle.task.await;
        }
    }

    async fn lock(&self) -> Result<SlotGuard<'_, T>, LinkError> {
        let guard = tokio::time::timeout(self.shared.config.lock_timeout(), self.shared.slot.lock())
            .await
            .map_err(|_| LinkError::LockTimeout)?;
        self.shared.busy.store(true, Ordering::Release);
        Ok(SlotGuard {
            guard,
            busy: &self.shared.busy,
        })
    }

    /// Replace the transparent data session, returning the old one
    fn set_session(
        &self,
        slot: &mut CommandSlot<T>,
        session: Option<TransparentSession>,
    ) -> Option<TransparentSession> {
        self.shared
            .session_open
            .store(session.is_some(), Ordering::Release);
        std::mem::replace(&mut slot.session, session)
    }

    /// One command exchange; the caller holds the lock
    async fn exchange(
        &self,
        slot: &mut CommandSlot<T>,
        command: &str,
        parser: ResponseParser,
    ) -> Result<Response, LinkError> {
        if slot.session_active() {
            return Err(LinkError::InvalidState(
                "transparent data session active".into(),
            ));
        }
        let bytes = command::encode(command)?;

        self.drain_events(slot).await?;

        debug!("Sending {:?}", command);
        slot.tx.write(&bytes).await?;
        slot.tx.wait_transmit_complete().await?;

        let response = self.receive(slot, parser).await?;
        debug!("Reply to {:?}: {:?}", command, response);
        self.shared.dispatch_buffered();

        match response.device_error() {
            Some(code) => Err(LinkError::Device(code)),
            None => Ok(response),
        }
    }

    /// Read one reply, dispatching any events that arrive ahead of it
    async fn receive(
        &self,
        slot: &mut CommandSlot<T>,
        parser: ResponseParser,
    ) -> Result<Response, LinkError> {
        let mut message = Vec::new();
        while parser.more_bytes_needed(&message) > 0 {
            let byte = self.next_byte(slot).await?;
            if message.is_empty() && !parser.accepts(byte) {
                if let Some(len) = EventDecoder::message_length(byte) {
                    let mut event = vec![byte];
                    while event.len() < len {
                        event.push(self.next_byte(slot).await?);
                    }
                    events::deliver(&self.shared.handlers, vec![events::classify(event)]);
                    continue;
                }

                warn!(
                    "Unexpected leading code 0x{:02X} for {} reply, flushing input",
                    byte,
                    parser.name()
                );
                self.flush_input(slot).await;
                return Err(LinkError::Protocol(ParseError::UnexpectedCode {
                    code: byte,
                    expected: parser.name(),
                }));
            }
            message.push(byte);
        }

        match parser.parse(&message) {
            Ok(response) => Ok(response),
            Err(err @ ParseError::BufferTooSmall { .. }) => Err(LinkError::Protocol(err)),
            Err(err) => {
                warn!("Malformed reply {:02X?}: {}, flushing input", message, err);
                self.flush_input(slot).await;
                Err(err.into())
            }
        }
    }

    /// Next received byte, waiting at most the read timeout for it
    async fn next_byte(&self, slot: &mut CommandSlot<T>) -> Result<u8, LinkError> {
        let timeout = self.shared.config.read_timeout();
        loop {
            let buffered = self.shared.ring().read();
            if let Some(byte) = buffered {
                return Ok(byte);
            }

            match &mut slot.feed {
                Feed::Inline(rx) => {
                    let data = rx.read(timeout).await?;
                    if data.is_empty() {
                        return Err(LinkError::Timeout);
                    }
                    self.shared.ingest(data);
                }
                Feed::Background(signal) => match tokio::time::timeout(timeout, signal.recv()).await
                {
                    Ok(Some(())) => {}
                    Ok(None) => return Err(LinkError::Closed),
                    Err(_) => return Err(LinkError::Timeout),
                },
            }
        }
    }

    /// Pull in already-arrived bytes and dispatch complete events
    async fn drain_events(&self, slot: &mut CommandSlot<T>) -> Result<usize, LinkError> {
        if let Feed::Inline(rx) = &mut slot.feed {
            let timeout = self.shared.config.drain_timeout();
            loop {
                let data = rx.read(timeout).await?;
                if data.is_empty() {
                    break;
                }
                self.shared.ingest(data);
            }
        }

        let delivered = self.shared.dispatch_buffered();
        let leftover = self.shared.ring().len();
        if leftover > 0 {
            debug!("{} bytes of an incomplete message still buffered", leftover);
        }
        Ok(delivered)
    }

    /// Discard all unread input after a desync
    async fn flush_input(&self, slot: &mut CommandSlot<T>) {
        let buffered = {
            let mut ring = self.shared.ring();
            let len = ring.len();
            ring.clear();
            len
        };
        let unread = match &mut slot.feed {
            Feed::Inline(rx) => rx.flush_input().await,
            Feed::Background(_) => 0,
        };
        debug!("Discarded {} buffered and {} unread bytes", buffered, unread);
    }
}

impl HmiLink<tokio_serial::SerialStream> {
    /// Open a serial port and create a link over it
    pub fn open(port: &str, baud_rate: u32, config: LinkConfig) -> Result<Self, LinkError> {
        use tokio_serial::SerialPortBuilderExt;

        let stream = tokio_serial::new(port, baud_rate)
            .timeout(config.read_timeout())
            .open_native_async()?;
        info!("Opened {} at {} baud", port, baud_rate);
        Ok(Self::new(stream, config))
    }
}
