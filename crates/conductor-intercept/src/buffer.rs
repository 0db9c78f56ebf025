//! Analysis flush buffer.
//!
//! Accumulates the same bytes that were passed through to the host terminal
//! and releases them as one text fragment when either the size threshold is
//! reached or the flush interval elapses with content waiting. A flush
//! returns the whole buffer and atomically resets it.

use std::time::{Duration, Instant};

/// Byte accumulator with size- and interval-triggered flushing.
pub struct FlushBuffer {
    bytes: Vec<u8>,
    max_size: usize,
    interval: Duration,
    last_flush: Instant,
}

impl FlushBuffer {
    pub fn new(max_size: usize, interval: Duration) -> Self {
        Self {
            bytes: Vec::with_capacity(max_size),
            max_size,
            interval,
            last_flush: Instant::now(),
        }
    }

    /// Append a chunk of worker output.
    pub fn push(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
    }

    /// Whether a flush is due: the buffer reached `max_size`, or the
    /// interval elapsed with non-empty content.
    pub fn due(&self) -> bool {
        if self.bytes.is_empty() {
            return false;
        }
        self.bytes.len() >= self.max_size || self.last_flush.elapsed() >= self.interval
    }

    /// Flush if due, returning the buffered text.
    pub fn take_if_due(&mut self) -> Option<String> {
        if self.due() {
            self.take()
        } else {
            None
        }
    }

    /// Unconditionally flush whatever is buffered (used on child exit and
    /// stop). Returns `None` when empty.
    pub fn take(&mut self) -> Option<String> {
        self.last_flush = Instant::now();
        if self.bytes.is_empty() {
            return None;
        }
        let bytes = std::mem::take(&mut self.bytes);
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
