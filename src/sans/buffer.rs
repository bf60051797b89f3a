//! Bounded accumulation buffers.

use thiserror::Error;

/// A buffer refused bytes past its bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Exceeded the {limit} byte bound.")]
pub struct Overflow {
    pub limit: usize,
}

/// A growable byte buffer that never holds more than `limit` bytes.
#[derive(Debug, Clone)]
pub struct BoundedBuffer {
    bytes: Vec<u8>,
    limit: usize,
}

impl BoundedBuffer {
    /// Create an empty buffer. Memory is allocated as bytes arrive.
    pub fn new(limit: usize) -> Self {
        Self {
            bytes: Vec::new(),
            limit,
        }
    }

    /// Append a byte, unless the buffer is full.
    pub fn push(&mut self, b: u8) -> Result<(), Overflow> {
        if self.bytes.len() >= self.limit {
            Err(Overflow { limit: self.limit })?;
        }
        self.bytes.push(b);
        Ok(())
    }

    /// Append a slice. On overflow, nothing is appended.
    pub fn extend_from_slice(&mut self, r: &[u8]) -> Result<(), Overflow> {
        if self.limit - self.bytes.len() < r.len() {
            Err(Overflow { limit: self.limit })?;
        }
        self.bytes.extend_from_slice(r);
        Ok(())
    }

    /// Empty the buffer, keeping its allocation.
    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    /// Move the contents out, leaving the buffer empty.
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.bytes)
    }

    /// Contents, in arrival order.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Bytes held.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether no bytes are held.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
