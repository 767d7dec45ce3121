//! Debug Channel
//!
//! One-way byte path from user code into a kernel-owned sink. On the
//! board the sink is the UART; tests and early boot use [`MemorySink`].
//!
//! A write is all-or-nothing: the sink either accepts every byte or the
//! call fails and the sink is left exactly as it was.

use alloc::vec::Vec;
use core::fmt;

use log::{trace, warn};
use spin::Mutex;

use crate::syscall::SyscallError;

/// Failure reported by a [`DebugSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkError {
    /// The sink cannot take `needed` bytes; only `available` fit.
    Full { needed: usize, available: usize },
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full { needed, available } => {
                write!(f, "sink full: {} bytes requested, {} available", needed, available)
            }
        }
    }
}

/// Destination for debug output.
pub trait DebugSink: Send {
    /// Append all of `bytes`, or nothing at all.
    fn append(&mut self, bytes: &[u8]) -> Result<(), SinkError>;
}

/// Bounded in-memory sink.
#[derive(Debug)]
pub struct MemorySink {
    buf: Vec<u8>,
    capacity: usize,
}

impl MemorySink {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::new(),
            capacity,
        }
    }

    /// Everything appended so far.
    pub fn contents(&self) -> &[u8] {
        &self.buf
    }

    /// Bytes that still fit.
    pub fn remaining(&self) -> usize {
        self.capacity - self.buf.len()
    }
}

impl DebugSink for MemorySink {
    fn append(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        let available = self.remaining();
        if bytes.len() > available {
            return Err(SinkError::Full {
                needed: bytes.len(),
                available,
            });
        }
        self.buf.extend_from_slice(bytes);
        Ok(())
    }
}

/// Kernel side of `sys_debug_write`.
pub struct DebugChannel<S: DebugSink> {
    sink: Mutex<S>,
    max_write: usize,
}

impl<S: DebugSink> DebugChannel<S> {
    pub fn new(sink: S, max_write: usize) -> Self {
        Self {
            sink: Mutex::new(sink),
            max_write,
        }
    }

    /// Append a kernel copy of user bytes to the sink.
    ///
    /// # Returns
    /// Number of bytes written (always `bytes.len()`) on success.
    ///
    /// # Errors
    /// - `Einval` if the write is longer than the configured maximum
    /// - `Enospc` if the sink cannot take every byte
    pub fn write(&self, bytes: &[u8]) -> Result<usize, SyscallError> {
        if bytes.len() > self.max_write {
            warn!(
                "[DEBUG] write of {} bytes exceeds limit {}",
                bytes.len(),
                self.max_write
            );
            return Err(SyscallError::Einval);
        }
        if bytes.is_empty() {
            return Ok(0);
        }

        self.sink.lock().append(bytes).map_err(|e| {
            warn!("[DEBUG] write rejected: {}", e);
            SyscallError::Enospc
        })?;

        trace!("[DEBUG] {} bytes written", bytes.len());
        Ok(bytes.len())
    }

    /// Run `f` with the sink locked.
    pub fn with_sink<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut self.sink.lock())
    }
}
