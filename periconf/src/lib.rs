//! # periconf
//!
//! A library for configuring and flashing ESP32-based peripheral boards.
//!
//! The boards are configured over a serial link using a plain ASCII line
//! protocol (9600 baud, 8N1, one command per line), and re-flashed through
//! esptool. This crate provides:
//!
//! - a [`DeviceSession`] that drives the line protocol for every supported board
//! - response classification that separates text replies from binary noise
//! - a [`FlashOperation`] running the flashing utility on a worker thread with
//!   live progress
//! - MAC address formatting and validation
//!
//! ## Supported Boards
//!
//! BLE base, fuel indicator, current sensor, temperature sensor (Wi-Fi and
//! BLE variants) and attendance reader. See [`BoardKind`].
//!
//! ## Features
//!
//! - `native` (default): Native serial port support via the `serialport` crate
//! - `serde`: Serialization support for data types
//!
//! ## Example
//!
//! ```rust,no_run
//! use periconf::{BoardKind, DeviceMode, DeviceSession, SerialConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut session = DeviceSession::new(BoardKind::BleBase.profile(), Vec::new());
//!
//!     #[cfg(feature = "native")]
//!     session.open(&SerialConfig::new("/dev/ttyUSB0"))?;
//!
//!     session.set_mode(DeviceMode::Label)?;
//!     session.add_label_mac("AA:BB:CC:DD:EE:FF")?;
//!
//!     for line in session.poll_incoming()? {
//!         println!("{line:?}");
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod board;
pub mod classify;
pub mod error;
pub mod flash;
pub mod mac;
pub mod port;
pub mod progress;
pub mod session;
pub mod sink;
pub mod text;

// Re-exports for convenience
#[cfg(feature = "native")]
pub use port::{NativePort, NativePortEnumerator};
pub use {
    board::{BoardKind, BoardProfile, ByteNumber, DutPreset, SettingSpec, ValueKind},
    classify::{BinaryPreview, Response, classify},
    error::{Error, FlashPrecondition, Result},
    flash::{
        EsptoolCommand, FlashEvent, FlashHandle, FlashOperation, FlashParams, FlashReport,
        FlashState, FlashTool, SUCCESS_MARKER, ToolExit,
    },
    mac::{MacAddress, format_as_typed},
    port::{MemoryPort, MemoryPortHandle, Port, PortEnumerator, PortInfo, SerialConfig},
    progress::ProgressTracker,
    session::{ConnectionState, DeviceMode, DeviceSession, Incoming},
    sink::{NullSink, OutputLine, OutputSink},
};
