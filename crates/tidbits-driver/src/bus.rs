//! Register bus abstraction
//!
//! A [`RegisterBus`] is the word-granular window onto one accelerator's
//! register file. Each method call is exactly one bus transaction of the
//! stated width; implementations must not cache, combine or reorder.
//!
//! Implementations:
//! - [`crate::mmio::MmioRegion`]: memory-mapped device file (real hardware)
//! - [`crate::sim::SimAccelerator`]: software model for CI
//! - [`RecordingBus`]: wraps another bus and logs every transaction

use parking_lot::Mutex;
use std::fmt::Debug;
use std::sync::Arc;

/// Word-granular register bus
///
/// Offsets are byte offsets from the accelerator base and are always
/// naturally aligned for the access width. Callers guarantee
/// `offset + width <= size()`; [`crate::RegisterMap`] checks this once at
/// construction.
pub trait RegisterBus: Debug + Send {
    /// Bytes of register space behind this bus
    fn size(&self) -> usize;

    /// One 32-bit read
    fn read32(&self, offset: usize) -> u32;

    /// One 32-bit write
    fn write32(&self, offset: usize, value: u32);

    /// One 64-bit read
    fn read64(&self, offset: usize) -> u64;

    /// One 64-bit write
    fn write64(&self, offset: usize, value: u64);
}

impl<T: RegisterBus + ?Sized> RegisterBus for Box<T> {
    fn size(&self) -> usize {
        (**self).size()
    }

    fn read32(&self, offset: usize) -> u32 {
        (**self).read32(offset)
    }

    fn write32(&self, offset: usize, value: u32) {
        (**self).write32(offset, value);
    }

    fn read64(&self, offset: usize) -> u64 {
        (**self).read64(offset)
    }

    fn write64(&self, offset: usize, value: u64) {
        (**self).write64(offset, value);
    }
}

/// Direction of a recorded transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Host read
    Read,
    /// Host write
    Write,
}

/// One recorded bus transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transaction {
    /// Read or write
    pub direction: Direction,
    /// Byte offset
    pub offset: usize,
    /// Access width in bytes
    pub width: usize,
    /// Value read or written
    pub value: u64,
}

impl Transaction {
    /// A 32-bit write, for building expected traces
    pub const fn write32(offset: usize, value: u32) -> Self {
        Self {
            direction: Direction::Write,
            offset,
            width: 4,
            value: value as u64,
        }
    }
}

/// Shared, append-only log of bus transactions
#[derive(Debug, Clone, Default)]
pub struct BusLog {
    entries: Arc<Mutex<Vec<Transaction>>>,
}

impl BusLog {
    /// Snapshot of every transaction so far
    pub fn transactions(&self) -> Vec<Transaction> {
        self.entries.lock().clone()
    }

    /// Writes that hit `offset`, in order
    pub fn writes_to(&self, offset: usize) -> Vec<u64> {
        self.entries
            .lock()
            .iter()
            .filter(|t| t.direction == Direction::Write && t.offset == offset)
            .map(|t| t.value)
            .collect()
    }

    /// Number of reads of `offset`
    pub fn reads_of(&self, offset: usize) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|t| t.direction == Direction::Read && t.offset == offset)
            .count()
    }

    /// Forget all recorded transactions
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    fn push(&self, transaction: Transaction) {
        self.entries.lock().push(transaction);
    }
}

/// Bus wrapper that records every transaction into a [`BusLog`]
#[derive(Debug)]
pub struct RecordingBus<B> {
    inner: B,
    log: BusLog,
}

impl<B: RegisterBus> RecordingBus<B> {
    /// Wrap `inner`, returning the bus and a handle to its log
    pub fn new(inner: B) -> (Self, BusLog) {
        let log = BusLog::default();
        (
            Self {
                inner,
                log: log.clone(),
            },
            log,
        )
    }

    /// Unwrap the inner bus
    pub fn into_inner(self) -> B {
        self.inner
    }
}

impl<B: RegisterBus> RegisterBus for RecordingBus<B> {
    fn size(&self) -> usize {
        self.inner.size()
    }

    fn read32(&self, offset: usize) -> u32 {
        let value = self.inner.read32(offset);
        self.log.push(Transaction {
            direction: Direction::Read,
            offset,
            width: 4,
            value: u64::from(value),
        });
        value
    }

    fn write32(&self, offset: usize, value: u32) {
        self.log.push(Transaction::write32(offset, value));
        self.inner.write32(offset, value);
    }

    fn read64(&self, offset: usize) -> u64 {
        let value = self.inner.read64(offset);
        self.log.push(Transaction {
            direction: Direction::Read,
            offset,
            width: 8,
            value,
        });
        value
    }

    fn write64(&self, offset: usize, value: u64) {
        self.log.push(Transaction {
            direction: Direction::Write,
            offset,
            width: 8,
            value,
        });
        self.inner.write64(offset, value);
    }
}
