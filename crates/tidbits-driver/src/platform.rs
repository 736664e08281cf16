//! Platform abstraction
//!
//! A platform supplies the two things a driver needs from its host: a
//! register bus for an accelerator's layout and a physical allocator for
//! the DRAM-backed builds.

use crate::buffer::PhysAllocator;
use crate::bus::RegisterBus;
use crate::error::{DriverError, Result};
use crate::mmio::MmioRegion;
use crate::sim::SimPlatform;
use crate::udmabuf::UdmabufAllocator;
use std::path::PathBuf;
use tidbits_regs::Layout;

/// Source of register buses and physical buffers
pub trait Platform {
    /// Bus type handed to drivers
    type Bus: RegisterBus;
    /// Allocator for DRAM-backed jobs
    type Allocator: PhysAllocator;

    /// Human-readable description for logs
    fn name(&self) -> String;

    /// Open the register window of an accelerator with `layout`
    ///
    /// # Errors
    ///
    /// Returns `MapFailed` if the window cannot be mapped.
    fn open_bus(&self, layout: &'static Layout) -> Result<Self::Bus>;

    /// Open the physical allocator
    ///
    /// # Errors
    ///
    /// Returns `AllocationFailed` or `Io` if no allocator is available.
    fn allocator(&self) -> Result<Self::Allocator>;
}

/// Memory-mapped accelerator on a real board
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MmioPlatform {
    /// Device file exposing the register window (`/dev/uio0`, `/dev/mem`, ...)
    pub device: PathBuf,
    /// Byte offset of the window within `device`
    pub base: u64,
    /// `u-dma-buf` device name for DRAM-backed jobs
    pub udmabuf: Option<String>,
}

impl MmioPlatform {
    /// Register window at `base` in `device`, no DMA allocator
    pub fn new(device: impl Into<PathBuf>, base: u64) -> Self {
        Self {
            device: device.into(),
            base,
            udmabuf: None,
        }
    }

    /// Use the named `u-dma-buf` device for buffers
    #[must_use]
    pub fn with_udmabuf(mut self, name: impl Into<String>) -> Self {
        self.udmabuf = Some(name.into());
        self
    }
}

/// Page-rounded window size covering `layout`
fn window_size(layout: &Layout) -> usize {
    let page = rustix::param::page_size();
    layout.span().div_ceil(page) * page
}

impl Platform for MmioPlatform {
    type Bus = MmioRegion;
    type Allocator = UdmabufAllocator;

    fn name(&self) -> String {
        format!("mmio {} @ {:#x}", self.device.display(), self.base)
    }

    fn open_bus(&self, layout: &'static Layout) -> Result<MmioRegion> {
        MmioRegion::open(&self.device, self.base, window_size(layout))
    }

    fn allocator(&self) -> Result<UdmabufAllocator> {
        let name = self.udmabuf.as_deref().ok_or_else(|| {
            DriverError::allocation_failed("no u-dma-buf device configured for this platform")
        })?;
        UdmabufAllocator::open(name)
    }
}

/// Platform chosen at startup
#[derive(Debug, Clone)]
pub enum PlatformSelection {
    /// Software models, no hardware required
    Simulated(SimPlatform),
    /// Memory-mapped hardware
    Mmio(MmioPlatform),
}

impl PlatformSelection {
    /// Description for logs
    pub fn name(&self) -> String {
        match self {
            Self::Simulated(p) => p.name(),
            Self::Mmio(p) => p.name(),
        }
    }

    /// Whether this selection touches real hardware
    pub const fn is_hardware(&self) -> bool {
        matches!(self, Self::Mmio(_))
    }
}
