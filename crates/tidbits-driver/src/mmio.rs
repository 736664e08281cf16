//! Memory-mapped register access
//!
//! Maps an accelerator's register window from a device file (`/dev/uioN`,
//! `/dev/mem`, or a PCI `resourceN` in sysfs) and implements
//! [`RegisterBus`] with volatile word accesses.
//!
//! Uses rustix for mmap/munmap; no libc bindings are needed on this path.

// MMIO registers are naturally aligned by hardware, so pointer casts are safe
#![allow(clippy::cast_ptr_alignment)]

use crate::bus::RegisterBus;
use crate::error::{DriverError, Result};
use rustix::mm::{mmap, munmap, MapFlags, ProtFlags};
use std::fs::{File, OpenOptions};
use std::os::unix::io::AsFd;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

/// Mapped register window
pub struct MmioRegion {
    /// Memory-mapped pointer
    ptr: NonNull<u8>,
    /// Size of the mapping
    size: usize,
    /// Keeps the device open for the mapping's lifetime
    _file: File,
    /// Device path, for diagnostics
    path: PathBuf,
}

impl std::fmt::Debug for MmioRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MmioRegion")
            .field("ptr", &format_args!("{:p}", self.ptr))
            .field("size", &self.size)
            .field("path", &self.path)
            .finish()
    }
}

// SAFETY: Send - MmioRegion owns the mapping exclusively. Moving between threads
// doesn't invalidate the mapping (mmap'd memory is process-wide). No thread-local state.
unsafe impl Send for MmioRegion {}

// SAFETY: Sync - every access is a single volatile load or store of a naturally
// aligned word; the hardware serialises concurrent bus transactions.
unsafe impl Sync for MmioRegion {}

impl MmioRegion {
    /// Map `size` bytes of `path` starting at byte `offset`
    ///
    /// `offset` must be page aligned (for `/dev/mem` it is the accelerator's
    /// physical base address).
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The device cannot be opened
    /// - `offset` is not page aligned or `size` is zero
    /// - mmap fails
    pub fn open(path: impl AsRef<Path>, offset: u64, size: usize) -> Result<Self> {
        let path = path.as_ref();
        let page = rustix::param::page_size() as u64;
        if offset % page != 0 {
            return Err(DriverError::map_failed(format!(
                "offset {offset:#x} is not aligned to the {page}-byte page size"
            )));
        }
        if size == 0 {
            return Err(DriverError::map_failed("register window size is 0"));
        }

        tracing::debug!("Mapping registers: {} @ {offset:#x}, {size:#x} bytes", path.display());

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| DriverError::map_failed(format!("Cannot open {}: {e}", path.display())))?;

        // SAFETY: mmap necessary for MMIO - maps the register window into process address space.
        // Invariants: (1) file is open read/write; (2) offset is page aligned (checked above);
        // (3) size > 0; (4) ptr valid for size bytes or Err. Unmapped in Drop.
        let ptr = unsafe {
            mmap(
                std::ptr::null_mut(),
                size,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                file.as_fd(),
                offset,
            )
            .map_err(|e| DriverError::map_failed(format!("mmap of {} failed: {e}", path.display())))?
        };

        let ptr = NonNull::new(ptr.cast::<u8>())
            .ok_or_else(|| DriverError::map_failed("mmap returned a null pointer"))?;

        tracing::info!("Mapped {} at {:p}, size={size:#x}", path.display(), ptr);

        Ok(Self {
            ptr,
            size,
            _file: file,
            path: path.to_path_buf(),
        })
    }

    /// Device path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check(&self, offset: usize, width: usize) {
        assert!(
            offset % width == 0 && offset + width <= self.size,
            "Register offset {offset:#x} out of bounds or misaligned"
        );
    }
}

impl RegisterBus for MmioRegion {
    fn size(&self) -> usize {
        self.size
    }

    /// # Panics
    ///
    /// Panics if `offset + 4` exceeds the mapped region size.
    fn read32(&self, offset: usize) -> u32 {
        self.check(offset, 4);
        // SAFETY: read_volatile necessary for MMIO - hardware can change value.
        // Invariants: (1) ptr from mmap in open(), valid for self.size; (2) offset+4 <= size;
        // (3) u32 aligned. Caller guarantees: offset in bounds.
        unsafe { std::ptr::read_volatile(self.ptr.as_ptr().add(offset).cast::<u32>()) }
    }

    /// # Panics
    ///
    /// Panics if `offset + 4` exceeds the mapped region size.
    fn write32(&self, offset: usize, value: u32) {
        self.check(offset, 4);
        // SAFETY: write_volatile necessary for MMIO - triggers hardware side effects.
        // Invariants: (1) ptr from mmap; (2) offset+4 <= size; (3) u32 aligned.
        unsafe { std::ptr::write_volatile(self.ptr.as_ptr().add(offset).cast::<u32>(), value) }
    }

    /// # Panics
    ///
    /// Panics if `offset + 8` exceeds the mapped region size.
    fn read64(&self, offset: usize) -> u64 {
        self.check(offset, 8);
        // SAFETY: read_volatile necessary for MMIO - hardware can change value.
        // Invariants: (1) ptr from mmap; (2) offset+8 <= size; (3) u64 aligned.
        unsafe { std::ptr::read_volatile(self.ptr.as_ptr().add(offset).cast::<u64>()) }
    }

    /// # Panics
    ///
    /// Panics if `offset + 8` exceeds the mapped region size.
    fn write64(&self, offset: usize, value: u64) {
        self.check(offset, 8);
        // SAFETY: write_volatile necessary for MMIO - triggers hardware side effects.
        // Invariants: (1) ptr from mmap; (2) offset+8 <= size; (3) u64 aligned.
        unsafe { std::ptr::write_volatile(self.ptr.as_ptr().add(offset).cast::<u64>(), value) }
    }
}

impl Drop for MmioRegion {
    fn drop(&mut self) {
        // SAFETY: munmap necessary - must unmap region before the file closes.
        // Invariants: (1) ptr from mmap in open(), valid for self.size; (2) Drop runs at
        // most once; (3) no references into the mapping outlive self.
        unsafe {
            // Ignore error in Drop (can't propagate)
            let _ = munmap(self.ptr.as_ptr().cast(), self.size);
        }
        tracing::debug!("Unmapped {}", self.path.display());
    }
}
