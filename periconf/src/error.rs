//! Error types for periconf.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for periconf operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for periconf operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (file operations outside of a flash run).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// A command was issued while the session has no open transport.
    #[error("Not connected to a device")]
    NotConnected,

    /// Opening the transport failed; the session stays disconnected.
    #[error("Failed to connect to {port}: {reason}")]
    Connection {
        /// Port that was being opened.
        port: String,
        /// Underlying failure.
        reason: String,
    },

    /// I/O failure on an open transport. The session is disconnected.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Client-side validation rejected a value before anything was written.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// A flash run could not be started.
    #[error("Cannot start flashing: {0}")]
    FlashPrecondition(FlashPrecondition),

    /// The flashing utility ran but did not confirm a verified write.
    #[error("Flashing failed:\n{output}")]
    FlashFailure {
        /// Everything the utility printed, or a placeholder when it printed nothing.
        output: String,
    },

    /// Preparing the scratch copy of the firmware failed.
    #[error("Firmware file error: {0}")]
    FlashIo(String),

    /// The selected board does not offer this command or setting.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Reasons a flash run is refused before any work starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlashPrecondition {
    /// No target port was selected.
    NoPort,
    /// The firmware image does not exist.
    FirmwareMissing(PathBuf),
    /// The firmware image exists but cannot be opened for reading.
    FirmwareUnreadable {
        /// Firmware path.
        path: PathBuf,
        /// Why it could not be read.
        reason: String,
    },
}

impl std::fmt::Display for FlashPrecondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoPort => write!(f, "no serial port selected"),
            Self::FirmwareMissing(path) => {
                write!(f, "firmware file not found: {}", path.display())
            },
            Self::FirmwareUnreadable { path, reason } => {
                write!(f, "firmware file {} is not readable: {reason}", path.display())
            },
        }
    }
}

impl Error {
    /// Whether this error closed the session's transport.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
