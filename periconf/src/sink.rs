//! Output sink for user-visible session and flash output.
//!
//! Everything a front end would show in its log pane goes through an
//! [`OutputSink`] owned by the component producing it. This is separate from
//! diagnostics, which use the `log` facade.

use {
    crate::classify::BinaryPreview,
    std::{fmt, sync::mpsc},
};

/// One line of user-visible output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    /// A command that was written to the device (without the newline).
    Sent(String),
    /// A generic text line received from the device.
    Text(String),
    /// A received settings-report line.
    Setting(String),
    /// A received binary chunk.
    Binary(BinaryPreview),
    /// A status notice (connected, disconnected, ...).
    Status(String),
    /// An error notice.
    Error(String),
}

impl fmt::Display for OutputLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sent(cmd) => write!(f, "> {cmd}"),
            Self::Text(line) | Self::Setting(line) | Self::Status(line) => f.write_str(line),
            Self::Binary(preview) => write!(f, "{preview}"),
            Self::Error(msg) => write!(f, "error: {msg}"),
        }
    }
}

/// Destination for [`OutputLine`]s.
pub trait OutputSink: Send {
    /// Append one line.
    fn emit(&mut self, line: OutputLine);
}

impl OutputSink for Vec<OutputLine> {
    fn emit(&mut self, line: OutputLine) {
        self.push(line);
    }
}

/// Forwards lines to another thread. A disconnected receiver drops them.
impl OutputSink for mpsc::Sender<OutputLine> {
    fn emit(&mut self, line: OutputLine) {
        let _ = self.send(line);
    }
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl OutputSink for NullSink {
    fn emit(&mut self, _line: OutputLine) {}
}
