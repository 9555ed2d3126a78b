//! HMI Display Link Engine
//!
//! This crate drives a UART-attached HMI display over any async byte stream:
//! a serial port opened with `tokio-serial`, or a `tokio::io::duplex` pipe to
//! a simulated display.
//!
//! # Architecture
//!
//! - [`HmiLink`] serializes commands (one in flight at a time), separates
//!   replies from unsolicited events arriving on the same wire, and runs the
//!   transparent data handshake
//! - A background reader task (optional) keeps pulling bytes and dispatches
//!   events while no command is waiting
//! - Event handlers are plain closures, one per event kind
//! - The convenience API (`set_text`, `get_value`, `show_page`, ...) builds
//!   command text and picks the reply parser
//!
//! # Example
//!
//! ```rust,no_run
//! use hmi_link::{HmiLink, LinkConfig};
//!
//! # async fn run() -> Result<(), hmi_link::LinkError> {
//! let link = HmiLink::open("/dev/ttyUSB0", 9600, LinkConfig::default())?;
//! link.on_touch(|touch| println!("touched {:?}", touch));
//!
//! link.set_text("t0", "hello").await?;
//! let value = link.get_value("n0").await?;
//! println!("n0 = {}", value);
//! # Ok(())
//! # }
//! ```

pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
mod reader;
pub mod transport;

pub use config::LinkConfig;
pub use engine::{HmiLink, LinkState, TransparentSession};
pub use error::LinkError;
pub use events::EventHandlers;
