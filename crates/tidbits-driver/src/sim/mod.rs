// SPDX-License-Identifier: AGPL-3.0-only

//! Simulated platform
//!
//! Software models of all five accelerator builds plus a simulated physical
//! DRAM they share with a [`SimAllocator`]. This enables:
//!
//! 1. **CI without hardware**: every driver operation runs end to end on the
//!    host, with the same register traffic the FPGA would see.
//!
//! 2. **Protocol checks**: the models react only to the transitions the
//!    hardware reacts to (rising edges on enables, level `start` bits), so
//!    a driver that skips a pulse or forgets to clear `start` misbehaves
//!    here the same way it would on the board.
//!
//! 3. **Timeout paths**: [`SimTiming::stalled`] keeps the done bit low
//!    forever, standing in for a wedged or absent device.
//!
//! ## Memory model
//!
//! ```text
//! SimAllocator ──allocate──▶ SimBuffer ──descriptor──▶ driver registers
//!       │                        │                           │
//!       └────────── SimDram (shared, phys 0x1000_0000+) ◀────┘ SimAccelerator
//! ```

mod models;

pub use models::SimAccelerator;

use crate::buffer::{byte_len, check_range, BufferDescriptor, BufferHandle, PhysAllocator, PhysBuffer};
use crate::error::{DriverError, Result};
use crate::platform::Platform;
use parking_lot::Mutex;
use std::sync::Arc;
use tidbits_regs::platform::BUFFER_ADDR_ALIGNMENT;
use tidbits_regs::{AcceleratorKind, Layout};
use tracing::debug;

/// Physical address of the first simulated DRAM byte
pub const SIM_DRAM_BASE: u64 = 0x1000_0000;

/// Default simulated DRAM size
pub const SIM_DRAM_SIZE: usize = 16 * 1024 * 1024;

/// Completion timing of the simulated accelerators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimTiming {
    /// Status reads that return "not done" after a start
    pub latency_polls: u32,
    /// Never complete
    pub stalled: bool,
}

impl Default for SimTiming {
    fn default() -> Self {
        Self {
            latency_polls: 3,
            stalled: false,
        }
    }
}

#[derive(Debug)]
struct DramInner {
    bytes: Vec<u8>,
    next: usize,
    live: usize,
    next_handle: u32,
}

/// Simulated physical memory shared by buffers and accelerators
#[derive(Debug, Clone)]
pub struct SimDram {
    base: u64,
    inner: Arc<Mutex<DramInner>>,
}

impl SimDram {
    /// Zeroed memory of `size` bytes at [`SIM_DRAM_BASE`]
    pub fn new(size: usize) -> Self {
        Self {
            base: SIM_DRAM_BASE,
            inner: Arc::new(Mutex::new(DramInner {
                bytes: vec![0; size],
                next: 0,
                live: 0,
                next_handle: 1,
            })),
        }
    }

    /// Physical address of the first byte
    pub const fn base(&self) -> u64 {
        self.base
    }

    /// Size in bytes
    pub fn size(&self) -> usize {
        self.inner.lock().bytes.len()
    }

    fn index(&self, phys_addr: u64, len: usize, size: usize) -> Result<usize> {
        let offset = phys_addr
            .checked_sub(self.base)
            .and_then(|o| usize::try_from(o).ok())
            .ok_or_else(|| {
                DriverError::precondition(format!("physical address {phys_addr:#x} below DRAM base"))
            })?;
        check_range(offset, len, size)?;
        Ok(offset)
    }

    /// Copy out of physical memory
    ///
    /// # Errors
    ///
    /// Returns `CallerPrecondition` if the range is outside the DRAM.
    pub fn read(&self, phys_addr: u64, out: &mut [u8]) -> Result<()> {
        let inner = self.inner.lock();
        let start = self.index(phys_addr, out.len(), inner.bytes.len())?;
        out.copy_from_slice(&inner.bytes[start..start + out.len()]);
        Ok(())
    }

    /// Copy into physical memory
    ///
    /// # Errors
    ///
    /// Returns `CallerPrecondition` if the range is outside the DRAM.
    pub fn write(&self, phys_addr: u64, data: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        let start = self.index(phys_addr, data.len(), inner.bytes.len())?;
        inner.bytes[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Copy `len` bytes between two physical ranges
    ///
    /// # Errors
    ///
    /// Returns `CallerPrecondition` if either range is outside the DRAM.
    pub fn copy(&self, src: u64, dst: u64, len: usize) -> Result<()> {
        let mut inner = self.inner.lock();
        let size = inner.bytes.len();
        let from = self.index(src, len, size)?;
        let to = self.index(dst, len, size)?;
        inner.bytes.copy_within(from..from + len, to);
        Ok(())
    }

    fn reserve(&self, len: usize) -> Result<(u64, BufferHandle)> {
        let mut inner = self.inner.lock();
        #[allow(clippy::cast_possible_truncation)] // alignment constant is tiny
        let align = BUFFER_ADDR_ALIGNMENT as usize;
        let start = inner.next.div_ceil(align) * align;
        let end = start
            .checked_add(len)
            .filter(|&end| end <= inner.bytes.len())
            .ok_or_else(|| {
                DriverError::allocation_failed(format!(
                    "simulated DRAM exhausted: need {len} bytes at offset {start:#x}"
                ))
            })?;
        inner.next = end;
        inner.live += 1;
        let handle = BufferHandle::new(inner.next_handle);
        inner.next_handle = inner.next_handle.wrapping_add(1);
        inner.bytes[start..end].fill(0);
        Ok((self.base + start as u64, handle))
    }

    fn retire(&self) {
        let mut inner = self.inner.lock();
        inner.live = inner.live.saturating_sub(1);
        if inner.live == 0 {
            inner.next = 0;
        }
    }
}

/// Buffer carved out of [`SimDram`]
#[derive(Debug)]
pub struct SimBuffer {
    dram: SimDram,
    phys_addr: u64,
    len: usize,
    handle: BufferHandle,
}

impl PhysBuffer for SimBuffer {
    fn descriptor(&self) -> BufferDescriptor<'_> {
        BufferDescriptor::new(self, self.phys_addr, self.len, self.handle)
    }

    fn read_at(&self, offset: usize, out: &mut [u8]) -> Result<()> {
        check_range(offset, out.len(), self.len)?;
        self.dram.read(self.phys_addr + offset as u64, out)
    }

    fn write_at(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        check_range(offset, data.len(), self.len)?;
        self.dram.write(self.phys_addr + offset as u64, data)
    }
}

impl Drop for SimBuffer {
    fn drop(&mut self) {
        self.dram.retire();
        debug!("Released simulated buffer {} at {:#x}", self.handle.id(), self.phys_addr);
    }
}

/// Bump allocator over [`SimDram`]
///
/// Space is reclaimed when every outstanding buffer has been dropped.
#[derive(Debug, Clone)]
pub struct SimAllocator {
    dram: SimDram,
}

impl SimAllocator {
    /// Allocate out of `dram`
    pub const fn new(dram: SimDram) -> Self {
        Self { dram }
    }
}

impl PhysAllocator for SimAllocator {
    type Buffer = SimBuffer;

    fn allocate(&self, element_count: usize, element_width: usize) -> Result<SimBuffer> {
        let len = byte_len(element_count, element_width)?;
        let (phys_addr, handle) = self.dram.reserve(len)?;
        debug!("Allocated simulated buffer {}: {len} bytes at {phys_addr:#x}", handle.id());
        Ok(SimBuffer {
            dram: self.dram.clone(),
            phys_addr,
            len,
            handle,
        })
    }
}

/// A host with simulated accelerators and DRAM
#[derive(Debug, Clone)]
pub struct SimPlatform {
    dram: SimDram,
    timing: SimTiming,
}

impl Default for SimPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl SimPlatform {
    /// Default timing and DRAM size
    pub fn new() -> Self {
        Self::with_timing(SimTiming::default())
    }

    /// Custom completion timing
    pub fn with_timing(timing: SimTiming) -> Self {
        Self {
            dram: SimDram::new(SIM_DRAM_SIZE),
            timing,
        }
    }

    /// Shared physical memory
    pub const fn dram(&self) -> &SimDram {
        &self.dram
    }

    /// A fresh accelerator of the given build
    pub fn accelerator(&self, kind: AcceleratorKind) -> SimAccelerator {
        SimAccelerator::new(kind.layout(), self.dram.clone(), self.timing)
    }

    /// Allocator over the shared DRAM
    pub fn sim_allocator(&self) -> SimAllocator {
        SimAllocator::new(self.dram.clone())
    }
}

impl Platform for SimPlatform {
    type Bus = SimAccelerator;
    type Allocator = SimAllocator;

    fn name(&self) -> String {
        "simulated".to_string()
    }

    fn open_bus(&self, layout: &'static Layout) -> Result<SimAccelerator> {
        Ok(SimAccelerator::new(layout, self.dram.clone(), self.timing))
    }

    fn allocator(&self) -> Result<SimAllocator> {
        Ok(self.sim_allocator())
    }
}
