//! Bounded capture of process output
//!
//! Only the most recent `max_bytes` are retained; older bytes are dropped.

use std::collections::VecDeque;
use std::fmt;

/// A byte ring buffer that keeps the tail of everything written to it
#[derive(Debug, Clone)]
pub struct RingBuffer {
    buffer: VecDeque<u8>,
    max_bytes: usize,
    total_bytes_written: usize,
}

impl RingBuffer {
    #[must_use]
    pub fn new(max_bytes: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(max_bytes.min(8192)),
            max_bytes,
            total_bytes_written: 0,
        }
    }

    /// Append `data`, evicting the oldest bytes once `max_bytes` is reached.
    pub fn write(&mut self, data: &[u8]) {
        self.total_bytes_written += data.len();
        if self.max_bytes == 0 {
            return;
        }

        let incoming = if data.len() > self.max_bytes {
            &data[data.len() - self.max_bytes..]
        } else {
            data
        };
        let overflow = (self.buffer.len() + incoming.len()).saturating_sub(self.max_bytes);
        self.buffer.drain(..overflow);
        self.buffer.extend(incoming);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Total bytes ever written, including evicted ones
    #[must_use]
    pub const fn total_bytes_written(&self) -> usize {
        self.total_bytes_written
    }

    #[must_use]
    pub const fn was_truncated(&self) -> bool {
        self.total_bytes_written > self.max_bytes
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer.into()
    }
}

impl fmt::Display for RingBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (front, back) = self.buffer.as_slices();
        let mut bytes = Vec::with_capacity(self.buffer.len());
        bytes.extend_from_slice(front);
        bytes.extend_from_slice(back);
        f.write_str(&String::from_utf8_lossy(&bytes))
    }
}
