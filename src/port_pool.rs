//! Bounded pool of reusable chunk ports.
//!
//! The pool is a pure resource-ID allocator over a fixed contiguous range:
//! it hands out ports FIFO and takes them back, nothing more. Waiting for a
//! port to free up is admission control and belongs to the session
//! dispatcher, which owns the pool on a single task.

use std::collections::VecDeque;

use crate::error::TransferError;

pub struct PortPool {
    base: u16,
    capacity: u16,
    available: VecDeque<u16>,
}

impl PortPool {
    /// Seed the pool with every port in `[base, base + capacity)`.
    pub fn new(base: u16, capacity: u16) -> Self {
        Self {
            base,
            capacity,
            available: (base..base + capacity).collect(),
        }
    }

    /// Take the longest-idle port. Errors if the pool is empty; check
    /// [`is_exhausted`](Self::is_exhausted) before calling.
    pub fn acquire(&mut self) -> Result<u16, TransferError> {
        self.available.pop_front().ok_or(TransferError::PoolExhausted)
    }

    /// Return an acquired port. Rejects ports outside the pool's range and
    /// double releases; either would let two workers bind the same port.
    pub fn release(&mut self, port: u16) -> Result<(), TransferError> {
        let in_range = port >= self.base && port < self.base + self.capacity;
        if !in_range || self.available.contains(&port) {
            return Err(TransferError::PoolMisuse { port });
        }
        self.available.push_back(port);
        Ok(())
    }

    pub fn is_exhausted(&self) -> bool {
        self.available.is_empty()
    }

    pub fn available(&self) -> usize {
        self.available.len()
    }

    pub fn capacity(&self) -> u16 {
        self.capacity
    }
}
