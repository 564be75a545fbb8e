//! Transport abstraction for the board line protocol.
//!
//! A [`DeviceSession`](crate::session::DeviceSession) talks to a board through
//! the `Port` trait only, so the protocol logic is independent of where the
//! bytes actually go:
//!
//! ```text
//! +--------------------+
//! |   DeviceSession    |
//! +---------+----------+
//!           |
//!           v
//! +---------+----------+
//! |     Port trait     |
//! +----+----------+----+
//!      |          |
//!      v          v
//! +----+----+ +---+--------+
//! |NativePort| | MemoryPort |
//! |serialport| | (in-memory)|
//! +----------+ +------------+
//! ```
//!
//! Listing ports is a plain OS service exposed through [`PortEnumerator`].

pub mod memory;
#[cfg(feature = "native")]
pub mod native;

use std::io::{Read, Write};
use std::time::Duration;

use crate::error::Result;

/// Baud rate of the configuration line protocol.
pub const PROTOCOL_BAUD: u32 = 9600;

/// Read timeout used by sessions; polling never waits longer than this.
pub const PROTOCOL_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Serial port configuration.
///
/// Framing is always 8 data bits, no parity, one stop bit and no flow control.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyUSB0", "COM3").
    pub port_name: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Read/write timeout.
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: PROTOCOL_BAUD,
            timeout: PROTOCOL_READ_TIMEOUT,
        }
    }
}

impl SerialConfig {
    /// Line-protocol configuration (9600 8N1) for the given port.
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            ..Default::default()
        }
    }
}

/// Serial port information.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PortInfo {
    /// Port name/path.
    pub name: String,
    /// USB vendor ID (if available).
    pub vid: Option<u16>,
    /// USB product ID (if available).
    pub pid: Option<u16>,
    /// Manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Product string (if available).
    pub product: Option<String>,
}

/// Byte transport used by a device session.
///
/// Reads must honour the configured timeout; [`bytes_to_read`](Port::bytes_to_read)
/// must not block so that polling stays non-blocking.
pub trait Port: Read + Write + Send {
    /// Get the port name/path.
    fn name(&self) -> &str;

    /// Number of bytes that can be read right now without waiting.
    fn bytes_to_read(&mut self) -> Result<usize>;

    /// Discard anything pending in the input and output buffers.
    fn clear_buffers(&mut self) -> Result<()>;

    /// Close the port and release resources.
    ///
    /// After calling this method, the port cannot be used for further I/O.
    fn close(&mut self) -> Result<()>;

    /// Write all bytes and flush.
    fn write_all_bytes(&mut self, buf: &[u8]) -> Result<()> {
        std::io::Write::write_all(self, buf)?;
        std::io::Write::flush(self)?;
        Ok(())
    }
}

/// Trait for listing available serial ports.
///
/// This is separated from `Port` because it's a static operation that
/// doesn't require an open port instance.
pub trait PortEnumerator {
    /// List all available serial ports.
    fn list_ports() -> Result<Vec<PortInfo>>;
}

pub use memory::{MemoryPort, MemoryPortHandle};
#[cfg(feature = "native")]
pub use native::{NativePort, NativePortEnumerator};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_config_is_line_protocol() {
        let config = SerialConfig::new("/dev/ttyUSB0");
        assert_eq!(config.port_name, "/dev/ttyUSB0");
        assert_eq!(config.baud_rate, 9600);
        assert!(config.timeout <= Duration::from_millis(100));
    }
}
