//! HMI Display Simulation Library
//!
//! This crate provides a simulated display panel for exercising the link
//! engine without hardware. It includes:
//!
//! - **VirtualDisplay**: Pages, components, EEPROM and waveforms, answering
//!   commands with protocol-accurate replies
//! - **run_virtual_display_task**: Serves a display over any async stream,
//!   such as one end of `tokio::io::duplex`
//!
//! # Example
//!
//! ```rust
//! use hmi_sim::VirtualDisplay;
//! use hmi_protocol::TouchAction;
//!
//! let mut display = VirtualDisplay::new("panel");
//!
//! display.process_bytes(b"get n0.val\xFF\xFF\xFF");
//! assert!(display.touch("b0", TouchAction::Press));
//!
//! while let Some(bytes) = display.take_output() {
//!     println!("Display output: {:02X?}", bytes);
//! }
//! ```

pub mod display;
pub mod task;

pub use display::{ComponentConfig, PageConfig, VirtualDisplay, VirtualDisplayConfig};
pub use task::{run_virtual_display_task, VirtualDisplayCommand};
