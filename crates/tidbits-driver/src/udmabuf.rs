//! Physically contiguous buffers from a Linux `u-dma-buf` device
//!
//! The `u-dma-buf` kernel module reserves a contiguous CMA region at load
//! time and exposes it as `/dev/udmabufN`, with its bus address and size in
//! `/sys/class/u-dma-buf/udmabufN/{phys_addr,size}`. [`UdmabufAllocator`]
//! maps the whole region once and carves 64-byte aligned buffers out of it.
//!
//! The device is opened with `O_SYNC`, which the module maps to uncached
//! pages, so host writes are visible to the accelerator without explicit
//! cache maintenance.

use crate::buffer::{byte_len, check_range, BufferDescriptor, BufferHandle, PhysAllocator, PhysBuffer};
use crate::error::{DriverError, Result};
use parking_lot::Mutex;
use rustix::fs::{Mode, OFlags};
use rustix::mm::{mmap, munmap, MapFlags, ProtFlags};
use std::fs::File;
use std::os::unix::io::AsFd;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::Arc;
use tidbits_regs::platform::BUFFER_ADDR_ALIGNMENT;

/// sysfs class directory of the `u-dma-buf` module
pub const SYSFS_CLASS: &str = "/sys/class/u-dma-buf";

#[derive(Debug)]
struct ArenaState {
    next: usize,
    live: usize,
    next_handle: u32,
}

/// The mapped device region, shared by the allocator and its buffers
struct Arena {
    ptr: NonNull<u8>,
    size: usize,
    phys_addr: u64,
    device: PathBuf,
    state: Mutex<ArenaState>,
    _file: File,
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena")
            .field("device", &self.device)
            .field("phys_addr", &format_args!("{:#x}", self.phys_addr))
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

// SAFETY: Send - the mapping is process-wide and owned by the Arena; moving
// the owner between threads does not invalidate it.
unsafe impl Send for Arena {}

// SAFETY: Sync - bookkeeping is behind a Mutex; byte ranges are handed out
// disjointly, and each range is only accessed through its owning buffer.
unsafe impl Sync for Arena {}

impl Drop for Arena {
    fn drop(&mut self) {
        // SAFETY: munmap necessary - releases the mapping created in open_at().
        // Invariants: (1) ptr/size from that mmap; (2) the last Arc is gone, so
        // no buffer can still reach the mapping.
        unsafe {
            let _ = munmap(self.ptr.as_ptr().cast(), self.size);
        }
        tracing::debug!("Unmapped {}", self.device.display());
    }
}

impl Arena {
    fn reserve(&self, len: usize) -> Result<(usize, BufferHandle)> {
        let mut st = self.state.lock();
        #[allow(clippy::cast_possible_truncation)] // alignment constant is tiny
        let align = BUFFER_ADDR_ALIGNMENT as usize;
        let start = st.next.div_ceil(align) * align;
        let end = start
            .checked_add(len)
            .filter(|&end| end <= self.size)
            .ok_or_else(|| {
                DriverError::allocation_failed(format!(
                    "{}: {len} bytes requested, {} free",
                    self.device.display(),
                    self.size.saturating_sub(start)
                ))
            })?;
        st.next = end;
        st.live += 1;
        let handle = BufferHandle::new(st.next_handle);
        st.next_handle = st.next_handle.wrapping_add(1);
        Ok((start, handle))
    }

    fn retire(&self) {
        let mut st = self.state.lock();
        st.live = st.live.saturating_sub(1);
        if st.live == 0 {
            st.next = 0;
        }
    }
}

/// Bump allocator over one `u-dma-buf` device
///
/// Buffers are released logically; the arena rewinds once every outstanding
/// buffer has been dropped.
#[derive(Debug, Clone)]
pub struct UdmabufAllocator {
    arena: Arc<Arena>,
}

impl UdmabufAllocator {
    /// Open `/dev/<name>` using the attributes in `/sys/class/u-dma-buf/<name>`
    ///
    /// # Errors
    ///
    /// As [`UdmabufAllocator::open_at`].
    pub fn open(name: &str) -> Result<Self> {
        Self::open_at(Path::new(SYSFS_CLASS).join(name), Path::new("/dev").join(name))
    }

    /// Open `device`, reading `phys_addr` and `size` from `sysfs_dir`
    ///
    /// # Errors
    ///
    /// Returns `Io` if an attribute cannot be read, `AllocationFailed` if one
    /// does not parse or the region is empty, and `MapFailed` if the device
    /// cannot be opened or mapped.
    pub fn open_at(sysfs_dir: impl AsRef<Path>, device: impl AsRef<Path>) -> Result<Self> {
        let sysfs_dir = sysfs_dir.as_ref();
        let device = device.as_ref();

        let phys_addr = read_attr(&sysfs_dir.join("phys_addr"))?;
        let size = read_attr(&sysfs_dir.join("size"))?;
        let size = usize::try_from(size)
            .map_err(|_| DriverError::allocation_failed(format!("region size {size:#x} exceeds address space")))?;
        if size == 0 {
            return Err(DriverError::allocation_failed(format!(
                "{} reports a zero-sized region",
                sysfs_dir.display()
            )));
        }
        if phys_addr % BUFFER_ADDR_ALIGNMENT != 0 {
            return Err(DriverError::allocation_failed(format!(
                "region base {phys_addr:#x} is not {BUFFER_ADDR_ALIGNMENT}-byte aligned"
            )));
        }

        let fd = rustix::fs::open(device, OFlags::RDWR | OFlags::SYNC | OFlags::CLOEXEC, Mode::empty())
            .map_err(|e| DriverError::map_failed(format!("Cannot open {}: {e}", device.display())))?;
        let file = File::from(fd);

        // SAFETY: mmap necessary - exposes the DMA region to the host.
        // Invariants: (1) file open read/write; (2) offset 0; (3) size > 0 and
        // equal to the region size reported by the driver. Unmapped in Arena::drop.
        let ptr = unsafe {
            mmap(
                std::ptr::null_mut(),
                size,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                file.as_fd(),
                0,
            )
            .map_err(|e| DriverError::map_failed(format!("mmap of {} failed: {e}", device.display())))?
        };
        let ptr = NonNull::new(ptr.cast::<u8>())
            .ok_or_else(|| DriverError::map_failed("mmap returned a null pointer"))?;

        tracing::info!(
            "Opened {}: phys {phys_addr:#x}, {size} bytes",
            device.display()
        );

        Ok(Self {
            arena: Arc::new(Arena {
                ptr,
                size,
                phys_addr,
                device: device.to_path_buf(),
                state: Mutex::new(ArenaState {
                    next: 0,
                    live: 0,
                    next_handle: 1,
                }),
                _file: file,
            }),
        })
    }

    /// Bus address of the region
    pub fn phys_addr(&self) -> u64 {
        self.arena.phys_addr
    }

    /// Region size in bytes
    pub fn capacity(&self) -> usize {
        self.arena.size
    }
}

impl PhysAllocator for UdmabufAllocator {
    type Buffer = UdmabufBuffer;

    fn allocate(&self, element_count: usize, element_width: usize) -> Result<UdmabufBuffer> {
        let len = byte_len(element_count, element_width)?;
        let (offset, handle) = self.arena.reserve(len)?;
        // SAFETY: write_bytes zeroes the freshly reserved range.
        // Invariants: offset + len <= size (checked in reserve); range not shared.
        unsafe { std::ptr::write_bytes(self.arena.ptr.as_ptr().add(offset), 0, len) };
        tracing::debug!(
            "Allocated udmabuf buffer {}: {len} bytes at {:#x}",
            handle.id(),
            self.arena.phys_addr + offset as u64
        );
        Ok(UdmabufBuffer {
            arena: Arc::clone(&self.arena),
            offset,
            len,
            handle,
        })
    }
}

/// Buffer inside a `u-dma-buf` region
#[derive(Debug)]
pub struct UdmabufBuffer {
    arena: Arc<Arena>,
    offset: usize,
    len: usize,
    handle: BufferHandle,
}

impl PhysBuffer for UdmabufBuffer {
    fn descriptor(&self) -> BufferDescriptor<'_> {
        BufferDescriptor::new(self, self.arena.phys_addr + self.offset as u64, self.len, self.handle)
    }

    fn read_at(&self, offset: usize, out: &mut [u8]) -> Result<()> {
        check_range(offset, out.len(), self.len)?;
        // SAFETY: copy out of the mapping.
        // Invariants: (1) self.offset + offset + out.len() <= arena size; (2) out is
        // host memory, never part of the mapping, so the ranges do not overlap.
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.arena.ptr.as_ptr().add(self.offset + offset),
                out.as_mut_ptr(),
                out.len(),
            );
        }
        Ok(())
    }

    fn write_at(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        check_range(offset, data.len(), self.len)?;
        // SAFETY: copy into the mapping.
        // Invariants: as read_at; &mut self means no other host access to this range.
        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                self.arena.ptr.as_ptr().add(self.offset + offset),
                data.len(),
            );
        }
        Ok(())
    }
}

impl Drop for UdmabufBuffer {
    fn drop(&mut self) {
        self.arena.retire();
    }
}

/// Parse a sysfs attribute written as decimal or `0x` hex
fn read_attr(path: &Path) -> Result<u64> {
    let raw = std::fs::read_to_string(path)?;
    let text = raw.trim();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|e| DriverError::allocation_failed(format!("{}: '{text}': {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        _dir: tempfile::TempDir,
        sysfs: PathBuf,
        device: PathBuf,
    }

    fn fixture(phys: &str, size: usize) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let sysfs = dir.path().join("udmabuf0");
        std::fs::create_dir(&sysfs).unwrap();
        std::fs::write(sysfs.join("phys_addr"), format!("{phys}\n")).unwrap();
        std::fs::write(sysfs.join("size"), format!("{size}\n")).unwrap();
        let device = dir.path().join("dev-udmabuf0");
        std::fs::File::create(&device).unwrap().set_len(size as u64).unwrap();
        Fixture { _dir: dir, sysfs, device }
    }

    #[test]
    fn reads_region_attributes() {
        let fx = fixture("0x3e000000", 8192);
        let alloc = UdmabufAllocator::open_at(&fx.sysfs, &fx.device).unwrap();
        assert_eq!(alloc.phys_addr(), 0x3e00_0000);
        assert_eq!(alloc.capacity(), 8192);
    }

    #[test]
    fn buffers_are_aligned_views_of_the_region() {
        let fx = fixture("0x3e000000", 8192);
        let alloc = UdmabufAllocator::open_at(&fx.sysfs, &fx.device).unwrap();
        let a = alloc.allocate(3, 4).unwrap();
        let mut b = alloc.allocate(16, 4).unwrap();
        assert_eq!(a.descriptor().phys_addr(), 0x3e00_0000);
        assert_eq!(b.descriptor().phys_addr(), 0x3e00_0040);
        b.write_u32s(&[7; 16]).unwrap();
        assert_eq!(b.to_u32s().unwrap(), vec![7; 16]);
        assert!(b.read_at(60, &mut [0u8; 8]).is_err());
    }

    #[test]
    fn exhausted_region_fails_and_rewinds_after_release() {
        let fx = fixture("4096", 128);
        let alloc = UdmabufAllocator::open_at(&fx.sysfs, &fx.device).unwrap();
        let first = alloc.allocate(32, 4).unwrap();
        assert!(matches!(alloc.allocate(1, 4), Err(DriverError::AllocationFailed { .. })));
        alloc.release(first);
        assert!(alloc.allocate(32, 4).is_ok());
    }

    #[test]
    fn malformed_attributes_are_rejected() {
        let fx = fixture("banana", 4096);
        assert!(UdmabufAllocator::open_at(&fx.sysfs, &fx.device).is_err());
        let fx = fixture("0x1000", 0);
        assert!(UdmabufAllocator::open_at(&fx.sysfs, &fx.device).is_err());
        let fx = fixture("0x1004", 4096);
        assert!(UdmabufAllocator::open_at(&fx.sysfs, &fx.device).is_err());
    }

    #[test]
    #[ignore] // Requires hardware
    fn opens_real_udmabuf0() {
        let alloc = UdmabufAllocator::open("udmabuf0").unwrap();
        assert!(alloc.capacity() > 0);
    }
}
