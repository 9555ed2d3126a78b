//! Virtual display actor task
//!
//! Owns a [`VirtualDisplay`] and serves it over an async stream. The task
//! uses a select! loop to:
//! - Read host commands from the stream and write back the replies
//! - Inject touch, sleep and raw output requested over a channel
//! - Finish a pending reset once the reset delay has elapsed

use std::io;
use std::time::Duration;

use hmi_protocol::TouchAction;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::VirtualDisplay;

/// Commands that can be sent to a virtual display actor
#[derive(Debug, Clone)]
pub enum VirtualDisplayCommand {
    /// Touch a named component on the current page
    Touch {
        component: String,
        action: TouchAction,
    },
    /// Touch raw screen coordinates
    TouchAt { x: u16, y: u16, action: TouchAction },
    /// Enter or leave automatic sleep
    SetSleeping(bool),
    /// Write arbitrary bytes to the host
    Emit(Vec<u8>),
    /// Shutdown the virtual display actor
    Shutdown,
}

/// Run the virtual display actor task
///
/// Returns the display when the stream closes or a shutdown is requested,
/// so callers can inspect its final state.
pub async fn run_virtual_display_task<S>(
    mut stream: S,
    mut panel: VirtualDisplay,
    mut cmd_rx: mpsc::Receiver<VirtualDisplayCommand>,
) -> io::Result<VirtualDisplay>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; 1024];
    let reset_delay = Duration::from_millis(panel.config().reset_delay_ms);
    let mut reset_at: Option<Instant> = None;

    info!("Starting virtual display task for {}", panel.id());

    loop {
        tokio::select! {
            result = stream.read(&mut buf) => {
                match result {
                    Ok(0) => {
                        debug!("Virtual display stream closed for {}", panel.id());
                        break;
                    }
                    Ok(n) => {
                        let data = &buf[..n];
                        debug!(
                            "Virtual display {} received {} bytes: {:02X?}",
                            panel.id(), n, data
                        );
                        panel.process_bytes(data);
                        if panel.take_reset_request() {
                            debug!("Virtual display {} resetting", panel.id());
                            reset_at = Some(Instant::now() + reset_delay);
                        }
                    }
                    Err(e) => {
                        warn!("Virtual display {} stream error: {}", panel.id(), e);
                        return Err(e);
                    }
                }
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(VirtualDisplayCommand::Touch { component, action }) => {
                        if !panel.touch(&component, action) {
                            warn!(
                                "Virtual display {} has no component {} on page {}",
                                panel.id(), component, panel.current_page()
                            );
                        }
                    }
                    Some(VirtualDisplayCommand::TouchAt { x, y, action }) => {
                        panel.touch_at(x, y, action);
                    }
                    Some(VirtualDisplayCommand::SetSleeping(sleeping)) => {
                        panel.set_sleeping(sleeping);
                    }
                    Some(VirtualDisplayCommand::Emit(bytes)) => {
                        panel.emit(bytes);
                    }
                    Some(VirtualDisplayCommand::Shutdown) => {
                        info!("Shutdown requested for virtual display {}", panel.id());
                        break;
                    }
                    None => {
                        debug!("Command channel closed for virtual display {}", panel.id());
                        break;
                    }
                }
            }

            _ = sleep_until(reset_at.unwrap_or_else(Instant::now)), if reset_at.is_some() => {
                reset_at = None;
                panel.complete_reset();
                info!("Virtual display {} restarted", panel.id());
            }
        }

        while let Some(out) = panel.take_output() {
            debug!("Virtual display {} sending {:02X?}", panel.id(), out);
            stream.write_all(&out).await?;
        }
        stream.flush().await?;
    }

    info!("Virtual display task ended for {}", panel.id());
    Ok(panel)
}
