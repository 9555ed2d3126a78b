//! Background reader task
//!
//! Continuously pulls bytes off the transport into the shared receive
//! buffer. After each chunk it wakes the waiting command, if any, through a
//! capacity-1 channel. When the command lock is free and no transparent data
//! session is open, it dispatches complete buffered events itself.
//!
//! The task holds only a weak reference to the link, so it exits once every
//! [`HmiLink`](crate::HmiLink) handle has been dropped, as well as on end of
//! stream, read error, or an explicit shutdown.

use std::sync::Weak;
use std::time::Duration;

use tokio::io::{AsyncRead, ReadHalf};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::engine::Shared;
use crate::error::LinkError;
use crate::transport::Receiver;

/// How often an idle reader re-checks for undispatched events
const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub(crate) async fn run_reader<T>(
    shared: Weak<Shared<T>>,
    mut rx: Receiver<ReadHalf<T>>,
    signal: mpsc::Sender<()>,
    mut shutdown_rx: oneshot::Receiver<()>,
) where
    T: AsyncRead,
{
    info!("Background reader starting");

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                debug!("Background reader shutdown requested");
                break;
            }

            result = rx.read(POLL_INTERVAL) => {
                let Some(link) = shared.upgrade() else {
                    break;
                };
                match result {
                    Ok(data) => {
                        if !data.is_empty() {
                            link.ingest(data);
                            // A full channel already holds a wakeup
                            let _ = signal.try_send(());
                        }
                        dispatch_if_idle(&link);
                    }
                    Err(LinkError::Closed) => {
                        info!("Transport closed");
                        break;
                    }
                    Err(e) => {
                        warn!("Read error: {}", e);
                        break;
                    }
                }
            }
        }
    }

    info!("Background reader stopped");
}

/// Dispatch buffered events unless a command or transparent session owns
/// the incoming bytes
fn dispatch_if_idle<T>(shared: &Shared<T>) {
    if let Ok(slot) = shared.slot.try_lock() {
        if !slot.session_active() {
            shared.dispatch_buffered();
        }
    }
}
