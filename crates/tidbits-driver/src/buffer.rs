//! Physical buffers for the DRAM-backed accelerators
//!
//! The accelerators see memory only through a physical address and a byte
//! count. A [`PhysAllocator`] hands out buffers that own a physically
//! contiguous region; a [`BufferDescriptor`] is the address/length handoff
//! the driver writes into registers.
//!
//! A descriptor borrows the buffer it came from. While an operation holds the
//! descriptor, the buffer cannot be written through the host API, released,
//! or dropped, which is exactly the window between trigger and observed
//! completion during which the hardware may touch the memory.

use crate::error::{DriverError, Result};
use std::marker::PhantomData;

/// Opaque allocator-assigned buffer identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(u32);

impl BufferHandle {
    /// Create a handle
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Raw handle value
    pub const fn id(&self) -> u32 {
        self.0
    }
}

/// Physical address + byte count of a DMA-eligible region
///
/// The `'b` lifetime ties the descriptor to the buffer that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDescriptor<'b> {
    phys_addr: u64,
    byte_count: usize,
    handle: BufferHandle,
    _buffer: PhantomData<&'b ()>,
}

impl<'b> BufferDescriptor<'b> {
    /// Describe memory owned by `owner`
    ///
    /// Allocators call this from [`PhysBuffer::descriptor`]; the result
    /// borrows `owner` for as long as it lives.
    pub const fn new<T: ?Sized>(_owner: &'b T, phys_addr: u64, byte_count: usize, handle: BufferHandle) -> Self {
        Self {
            phys_addr,
            byte_count,
            handle,
            _buffer: PhantomData,
        }
    }

    /// Restrict the descriptor to its first `byte_count` bytes
    ///
    /// # Errors
    ///
    /// Returns `CallerPrecondition` if `byte_count` exceeds the buffer.
    pub fn truncate(self, byte_count: usize) -> Result<Self> {
        if byte_count > self.byte_count {
            return Err(DriverError::precondition(format!(
                "cannot take {byte_count} bytes of a {}-byte buffer",
                self.byte_count
            )));
        }
        let truncated = Self { byte_count, ..self };
        truncated.end_addr()?;
        Ok(truncated)
    }
}

impl BufferDescriptor<'_> {
    /// Device-visible start address
    pub const fn phys_addr(&self) -> u64 {
        self.phys_addr
    }

    /// Length in bytes
    pub const fn byte_count(&self) -> usize {
        self.byte_count
    }

    /// Allocator handle
    pub const fn handle(&self) -> BufferHandle {
        self.handle
    }

    /// Whether `byte_count` is a multiple of `alignment`
    pub const fn is_aligned(&self, alignment: usize) -> bool {
        alignment != 0 && self.byte_count % alignment == 0
    }

    /// One past the last byte, in device address space
    ///
    /// # Errors
    ///
    /// Returns `CallerPrecondition` if the region runs past the top of the
    /// 64-bit address space.
    pub fn end_addr(&self) -> Result<u64> {
        u64::try_from(self.byte_count)
            .ok()
            .and_then(|len| self.phys_addr.checked_add(len))
            .ok_or_else(|| {
                DriverError::precondition(format!(
                    "{}-byte region at {:#x} runs past the end of the address space",
                    self.byte_count, self.phys_addr
                ))
            })
    }

    /// Whether the two regions share any byte
    pub const fn overlaps(&self, other: &BufferDescriptor<'_>) -> bool {
        let a_end = self.phys_addr as u128 + self.byte_count as u128;
        let b_end = other.phys_addr as u128 + other.byte_count as u128;
        (self.phys_addr as u128) < b_end && (other.phys_addr as u128) < a_end
    }
}

/// A physically contiguous, device-visible buffer
///
/// Host access goes through copies rather than slices: the device writes the
/// memory behind the host's back, so no long-lived `&[u8]` into it is handed
/// out.
pub trait PhysBuffer {
    /// Address/length handoff for the driver
    fn descriptor(&self) -> BufferDescriptor<'_>;

    /// Copy `out.len()` bytes starting at `offset` out of the buffer
    ///
    /// # Errors
    ///
    /// Returns `CallerPrecondition` if the range exceeds the buffer.
    fn read_at(&self, offset: usize, out: &mut [u8]) -> Result<()>;

    /// Copy `data` into the buffer starting at `offset`
    ///
    /// # Errors
    ///
    /// Returns `CallerPrecondition` if the range exceeds the buffer.
    fn write_at(&mut self, offset: usize, data: &[u8]) -> Result<()>;

    /// Length in bytes
    fn len(&self) -> usize {
        self.descriptor().byte_count()
    }

    /// Whether the buffer has zero length
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whole buffer contents
    ///
    /// # Errors
    ///
    /// As [`PhysBuffer::read_at`].
    fn to_vec(&self) -> Result<Vec<u8>> {
        let mut out = vec![0u8; self.len()];
        self.read_at(0, &mut out)?;
        Ok(out)
    }

    /// Store `values` as native-endian `u32` elements from the start
    ///
    /// # Errors
    ///
    /// As [`PhysBuffer::write_at`].
    fn write_u32s(&mut self, values: &[u32]) -> Result<()> {
        self.write_at(0, bytemuck::cast_slice(values))
    }

    /// Whole buffer as `u32` elements (trailing partial word dropped)
    ///
    /// # Errors
    ///
    /// As [`PhysBuffer::read_at`].
    fn to_u32s(&self) -> Result<Vec<u32>> {
        let mut words = vec![0u32; self.len() / 4];
        self.read_at(0, bytemuck::cast_slice_mut(words.as_mut_slice()))?;
        Ok(words)
    }
}

/// External physical memory allocator
pub trait PhysAllocator {
    /// Buffer type produced
    type Buffer: PhysBuffer;

    /// Allocate `element_count` elements of `element_width` bytes
    ///
    /// # Errors
    ///
    /// Returns `AllocationFailed` when the request cannot be satisfied.
    fn allocate(&self, element_count: usize, element_width: usize) -> Result<Self::Buffer>;

    /// Return a buffer to the allocator
    ///
    /// Taking the buffer by value means it cannot be released while any
    /// descriptor borrowed from it is still held by an operation.
    fn release(&self, buffer: Self::Buffer) {
        drop(buffer);
    }
}

/// Checked `element_count * element_width`
pub(crate) fn byte_len(element_count: usize, element_width: usize) -> Result<usize> {
    if element_width == 0 {
        return Err(DriverError::allocation_failed("element width must be non-zero"));
    }
    element_count.checked_mul(element_width).ok_or_else(|| {
        DriverError::allocation_failed(format!("{element_count} x {element_width} bytes overflows"))
    })
}

/// Bounds check shared by buffer implementations
pub(crate) fn check_range(offset: usize, len: usize, size: usize) -> Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(DriverError::precondition(format!(
            "range {offset}+{len} exceeds {size}-byte buffer"
        ))),
    }
}

/// Outcome of comparing a memcpy destination with its source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyCheck {
    /// The first `byte_count` bytes are identical
    Identical,
    /// First differing byte
    Mismatch {
        /// Byte offset of the first difference
        offset: usize,
        /// Source byte
        expected: u8,
        /// Destination byte
        found: u8,
    },
}

/// Compare the first `byte_count` bytes of `source` and `destination`
///
/// Content equality after a copy is the caller's postcondition to check; the
/// copy engine only reports that it finished.
///
/// # Errors
///
/// Returns `CallerPrecondition` if either buffer is shorter than
/// `byte_count`.
pub fn verify_copy<S, D>(source: &S, destination: &D, byte_count: usize) -> Result<CopyCheck>
where
    S: PhysBuffer + ?Sized,
    D: PhysBuffer + ?Sized,
{
    let mut src = vec![0u8; byte_count];
    let mut dst = vec![0u8; byte_count];
    source.read_at(0, &mut src)?;
    destination.read_at(0, &mut dst)?;
    Ok(src
        .iter()
        .zip(&dst)
        .position(|(a, b)| a != b)
        .map_or(CopyCheck::Identical, |offset| CopyCheck::Mismatch {
            offset,
            expected: src[offset],
            found: dst[offset],
        }))
}
