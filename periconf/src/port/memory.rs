//! In-memory transport.
//!
//! `MemoryPort` stands in for a board: everything written to it is recorded,
//! and bytes queued through its [`MemoryPortHandle`] become readable. The handle
//! stays usable after the port has been moved into a session, which is what
//! tests and dry runs need.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::port::Port;

#[derive(Debug, Default)]
struct Shared {
    written: Vec<u8>,
    incoming: VecDeque<u8>,
    fail_reads: bool,
    fail_writes: bool,
    clears: usize,
    closed: bool,
}

/// In-memory [`Port`] implementation.
#[derive(Debug)]
pub struct MemoryPort {
    name: String,
    shared: Arc<Mutex<Shared>>,
}

/// Control handle for a [`MemoryPort`].
#[derive(Debug, Clone)]
pub struct MemoryPortHandle {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryPort {
    /// Create a port and its control handle.
    pub fn new(name: impl Into<String>) -> (Self, MemoryPortHandle) {
        let shared = Arc::new(Mutex::new(Shared::default()));
        (
            Self {
                name: name.into(),
                shared: Arc::clone(&shared),
            },
            MemoryPortHandle { shared },
        )
    }

    fn lock(&self) -> io::Result<MutexGuard<'_, Shared>> {
        self.shared
            .lock()
            .map_err(|_| io::Error::other("memory port state poisoned"))
    }
}

impl MemoryPortHandle {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        // A poisoned lock only means a test thread panicked; the data is still usable.
        self.shared
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Queue bytes for the session to read.
    pub fn push_incoming(&self, bytes: &[u8]) {
        self.lock()
            .incoming
            .extend(bytes);
    }

    /// Everything written so far.
    #[must_use]
    pub fn written(&self) -> Vec<u8> {
        self.lock()
            .written
            .clone()
    }

    /// Everything written so far, as text.
    #[must_use]
    pub fn written_text(&self) -> String {
        String::from_utf8_lossy(&self.written()).into_owned()
    }

    /// Take and clear the written bytes.
    pub fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut self.lock().written)
    }

    /// Make subsequent reads fail.
    pub fn fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    /// Make subsequent writes fail.
    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// How many times the buffers were cleared.
    #[must_use]
    pub fn clear_count(&self) -> usize {
        self.lock().clears
    }

    /// Whether the port was closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

impl Port for MemoryPort {
    fn name(&self) -> &str {
        &self.name
    }

    fn bytes_to_read(&mut self) -> Result<usize> {
        let shared = self.lock()?;
        if shared.closed {
            return Err(Error::Transport("port closed".to_string()));
        }
        if shared.fail_reads {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "device unplugged",
            )));
        }
        Ok(shared.incoming.len())
    }

    fn clear_buffers(&mut self) -> Result<()> {
        let mut shared = self.lock()?;
        shared.incoming.clear();
        shared.clears += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.lock()?.closed = true;
        Ok(())
    }
}

impl Read for MemoryPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut shared = self.lock()?;
        if shared.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "port closed"));
        }
        if shared.fail_reads {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }
        if shared.incoming.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        }
        let n = buf.len().min(shared.incoming.len());
        for (slot, byte) in buf.iter_mut().zip(shared.incoming.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for MemoryPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut shared = self.lock()?;
        if shared.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "port closed"));
        }
        if shared.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }
        shared.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
