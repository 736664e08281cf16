//! DRAM streaming sum build (`DRAMExample`)

use super::{AcceleratorDriver, Triggered, Variant};
use crate::buffer::BufferDescriptor;
use crate::bus::RegisterBus;
use crate::error::{DriverError, Result};
use crate::regmap::RegisterMap;
use tidbits_regs::platform::{is_stream_aligned, STREAM_ALIGNMENT};
use tidbits_regs::regs::dram_sum;
use tidbits_regs::{Layout, RegisterDef};

/// Streams a DRAM region and sums it as `u32` elements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamSum;

/// Driver for the streaming sum build
pub type StreamSumDriver<B> = AcceleratorDriver<B, StreamSum>;

/// Region to sum
#[derive(Debug, Clone, Copy)]
pub struct StreamSumJob<'b> {
    /// Source buffer; `byte_count` is summed
    pub source: BufferDescriptor<'b>,
}

impl<'b> StreamSumJob<'b> {
    /// Sum the whole of `source`
    pub const fn new(source: BufferDescriptor<'b>) -> Self {
        Self { source }
    }
}

/// Checks shared by the streaming builds
pub(super) fn check_stream_len(byte_count: usize) -> Result<u32> {
    if byte_count == 0 {
        return Err(DriverError::precondition("byte count must be non-zero"));
    }
    if !is_stream_aligned(byte_count) {
        return Err(DriverError::AlignmentError {
            byte_count,
            alignment: STREAM_ALIGNMENT,
        });
    }
    u32::try_from(byte_count)
        .map_err(|_| DriverError::precondition(format!("byte count {byte_count} exceeds the 32-bit register")))
}

impl Variant for StreamSum {
    const LAYOUT: &'static Layout = &dram_sum::LAYOUT;
}

impl Triggered for StreamSum {
    type Job<'b> = StreamSumJob<'b>;
    type Output = u32;

    const START: RegisterDef = dram_sum::START;
    const DONE: RegisterDef = dram_sum::FINISHED;

    fn program<B: RegisterBus>(map: &mut RegisterMap<B>, job: &StreamSumJob<'_>) -> Result<()> {
        let byte_count = check_stream_len(job.source.byte_count())?;
        job.source.end_addr()?;
        map.write(dram_sum::BASE_ADDR.name, job.source.phys_addr())?;
        map.write32(dram_sum::BYTE_COUNT.name, byte_count)
    }

    fn collect<B: RegisterBus>(map: &RegisterMap<B>, _job: &StreamSumJob<'_>) -> Result<u32> {
        map.read32(dram_sum::SUM.name)
    }
}

impl<B: RegisterBus> AcceleratorDriver<B, StreamSum> {
    /// Sum `source` in one blocking call
    ///
    /// # Errors
    ///
    /// As [`AcceleratorDriver::run`].
    pub fn sum(&mut self, source: BufferDescriptor<'_>) -> Result<u32> {
        self.run(StreamSumJob::new(source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{PhysAllocator, PhysBuffer};
    use crate::config::DriverConfig;
    use crate::driver::OpState;
    use crate::sim::SimPlatform;

    #[test]
    fn sums_one_to_sixteen() {
        let platform = SimPlatform::new();
        let mut buf = platform.sim_allocator().allocate(16, 4).unwrap();
        buf.write_u32s(&(1..=16).collect::<Vec<u32>>()).unwrap();
        let mut driver = StreamSumDriver::attach(&platform, &DriverConfig::default()).unwrap();
        assert_eq!(driver.sum(buf.descriptor()).unwrap(), 136);
    }

    #[test]
    fn sum_wraps() {
        let platform = SimPlatform::new();
        let mut buf = platform.sim_allocator().allocate(16, 4).unwrap();
        buf.write_u32s(&[u32::MAX; 16]).unwrap();
        let mut driver = StreamSumDriver::attach(&platform, &DriverConfig::default()).unwrap();
        assert_eq!(driver.sum(buf.descriptor()).unwrap(), u32::MAX.wrapping_mul(16));
    }

    #[test]
    fn prefix_of_a_buffer() {
        let platform = SimPlatform::new();
        let mut buf = platform.sim_allocator().allocate(32, 4).unwrap();
        buf.write_u32s(&[1; 32]).unwrap();
        let mut driver = StreamSumDriver::attach(&platform, &DriverConfig::default()).unwrap();
        let half = buf.descriptor().truncate(64).unwrap();
        assert_eq!(driver.sum(half).unwrap(), 16);
    }

    #[test]
    fn unaligned_and_empty_regions_are_rejected() {
        let platform = SimPlatform::new();
        let alloc = platform.sim_allocator();
        let odd = alloc.allocate(15, 4).unwrap();
        let empty = alloc.allocate(0, 4).unwrap();
        let mut driver = StreamSumDriver::attach(&platform, &DriverConfig::default()).unwrap();

        let err = driver.configure(StreamSumJob::new(odd.descriptor())).unwrap_err();
        assert!(matches!(err, DriverError::AlignmentError { byte_count: 60, alignment: 64 }));
        assert!(matches!(
            driver.configure(StreamSumJob::new(empty.descriptor())),
            Err(DriverError::CallerPrecondition { .. })
        ));
        assert_eq!(driver.state(), OpState::Idle);
    }
}
