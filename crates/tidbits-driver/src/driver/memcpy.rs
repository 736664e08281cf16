//! Memory copy build (`MemCpyExample`)
//!
//! The engine reports only that it finished and how many cycles it took.
//! Whether the destination matches the source is for the caller to check,
//! e.g. with [`crate::buffer::verify_copy`].

use super::stream_sum::check_stream_len;
use super::{AcceleratorDriver, Triggered, Variant};
use crate::buffer::BufferDescriptor;
use crate::bus::RegisterBus;
use crate::error::{DriverError, Result};
use crate::regmap::RegisterMap;
use tidbits_regs::regs::memcpy;
use tidbits_regs::{Layout, RegisterDef};

/// DRAM-to-DRAM copy engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemCopy;

/// Driver for the copy engine build
pub type MemCopyDriver<B> = AcceleratorDriver<B, MemCopy>;

/// Copy of the first `byte_count` bytes of `source` into `destination`
///
/// The regions must not overlap.
#[derive(Debug, Clone, Copy)]
pub struct MemCopyJob<'b> {
    /// Buffer read by the engine
    pub source: BufferDescriptor<'b>,
    /// Buffer written by the engine
    pub destination: BufferDescriptor<'b>,
    /// Bytes to copy
    pub byte_count: usize,
}

impl<'b> MemCopyJob<'b> {
    /// Copy `byte_count` bytes
    pub const fn new(source: BufferDescriptor<'b>, destination: BufferDescriptor<'b>, byte_count: usize) -> Self {
        Self {
            source,
            destination,
            byte_count,
        }
    }

    /// Copy the whole source
    pub const fn whole(source: BufferDescriptor<'b>, destination: BufferDescriptor<'b>) -> Self {
        Self::new(source, destination, source.byte_count())
    }
}

/// What the engine reports after a copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyReport {
    /// Bytes the engine was asked to copy
    pub byte_count: usize,
    /// Hardware cycles from start to finish
    pub cycle_count: u32,
}

impl Variant for MemCopy {
    const LAYOUT: &'static Layout = &memcpy::LAYOUT;
}

impl Triggered for MemCopy {
    type Job<'b> = MemCopyJob<'b>;
    type Output = CopyReport;

    const START: RegisterDef = memcpy::START;
    const DONE: RegisterDef = memcpy::FINISHED;

    fn program<B: RegisterBus>(map: &mut RegisterMap<B>, job: &MemCopyJob<'_>) -> Result<()> {
        let byte_count = check_stream_len(job.byte_count)?;
        let source = job.source.truncate(job.byte_count)?;
        let destination = job.destination.truncate(job.byte_count)?;
        if source.overlaps(&destination) {
            return Err(DriverError::precondition(format!(
                "source {:#x} and destination {:#x} overlap over {} bytes",
                source.phys_addr(),
                destination.phys_addr(),
                job.byte_count
            )));
        }
        map.write(memcpy::SRC_ADDR.name, source.phys_addr())?;
        map.write(memcpy::DEST_ADDR.name, destination.phys_addr())?;
        map.write32(memcpy::BYTE_COUNT.name, byte_count)
    }

    fn collect<B: RegisterBus>(map: &RegisterMap<B>, job: &MemCopyJob<'_>) -> Result<CopyReport> {
        Ok(CopyReport {
            byte_count: job.byte_count,
            cycle_count: map.read32(memcpy::CYCLE_COUNT.name)?,
        })
    }
}

impl<B: RegisterBus> AcceleratorDriver<B, MemCopy> {
    /// Copy `byte_count` bytes in one blocking call
    ///
    /// # Errors
    ///
    /// As [`AcceleratorDriver::run`].
    pub fn copy(
        &mut self,
        source: BufferDescriptor<'_>,
        destination: BufferDescriptor<'_>,
        byte_count: usize,
    ) -> Result<CopyReport> {
        self.run(MemCopyJob::new(source, destination, byte_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{verify_copy, CopyCheck, PhysAllocator, PhysBuffer};
    use crate::config::DriverConfig;
    use crate::sim::SimPlatform;

    #[test]
    fn copies_and_reports_cycles() {
        let platform = SimPlatform::new();
        let alloc = platform.sim_allocator();
        let mut src = alloc.allocate(64, 4).unwrap();
        let dst = alloc.allocate(64, 4).unwrap();
        src.write_u32s(&(0..64).collect::<Vec<u32>>()).unwrap();

        let mut driver = MemCopyDriver::attach(&platform, &DriverConfig::default()).unwrap();
        let report = driver.run(MemCopyJob::whole(src.descriptor(), dst.descriptor())).unwrap();
        assert_eq!(report.byte_count, 256);
        assert!(report.cycle_count > 0);
        assert_eq!(verify_copy(&src, &dst, 256).unwrap(), CopyCheck::Identical);
    }

    #[test]
    fn partial_copy_leaves_the_tail() {
        let platform = SimPlatform::new();
        let alloc = platform.sim_allocator();
        let mut src = alloc.allocate(32, 4).unwrap();
        let dst = alloc.allocate(32, 4).unwrap();
        src.write_u32s(&[0xAB; 32]).unwrap();

        let mut driver = MemCopyDriver::attach(&platform, &DriverConfig::default()).unwrap();
        driver.copy(src.descriptor(), dst.descriptor(), 64).unwrap();
        assert_eq!(verify_copy(&src, &dst, 64).unwrap(), CopyCheck::Identical);
        assert!(matches!(verify_copy(&src, &dst, 128).unwrap(), CopyCheck::Mismatch { offset: 64, .. }));
    }

    #[test]
    fn byte_count_must_fit_both_buffers() {
        let platform = SimPlatform::new();
        let alloc = platform.sim_allocator();
        let src = alloc.allocate(32, 4).unwrap();
        let dst = alloc.allocate(16, 4).unwrap();
        let mut driver = MemCopyDriver::attach(&platform, &DriverConfig::default()).unwrap();
        assert!(matches!(
            driver.configure(MemCopyJob::whole(src.descriptor(), dst.descriptor())),
            Err(DriverError::CallerPrecondition { .. })
        ));
        assert!(matches!(
            driver.configure(MemCopyJob::new(src.descriptor(), dst.descriptor(), 32)),
            Err(DriverError::AlignmentError { .. })
        ));
    }

    #[test]
    fn overlapping_regions_are_rejected() {
        let platform = SimPlatform::new();
        let buf = platform.sim_allocator().allocate(32, 4).unwrap();
        let mut driver = MemCopyDriver::attach(&platform, &DriverConfig::default()).unwrap();
        let desc = buf.descriptor();
        assert!(matches!(
            driver.configure(MemCopyJob::new(desc, desc, 64)),
            Err(DriverError::CallerPrecondition { .. })
        ));
    }

    #[test]
    fn region_past_the_end_of_the_address_space_is_rejected() {
        use crate::buffer::BufferHandle;

        let platform = SimPlatform::new();
        let dst = platform.sim_allocator().allocate(16, 4).unwrap();
        let owner = ();
        let src = BufferDescriptor::new(&owner, 0xFFFF_FFFF_FFFF_FFC0, 64, BufferHandle::new(99));
        let mut driver = MemCopyDriver::attach(&platform, &DriverConfig::default()).unwrap();
        assert!(matches!(
            driver.configure(MemCopyJob::new(src, dst.descriptor(), 64)),
            Err(DriverError::CallerPrecondition { .. })
        ));
        assert!(matches!(
            driver.configure(MemCopyJob::new(dst.descriptor(), src, 64)),
            Err(DriverError::CallerPrecondition { .. })
        ));
        assert_eq!(driver.state(), crate::driver::OpState::Idle);
    }
}
