//! Vector accumulator build (`TestAccumulateVector`)
//!
//! Elements are loaded one at a time through an address/data pair and an
//! edge-triggered write enable; raising `vector_sum_enable` then sums the
//! whole vector into `result`.

use super::{AcceleratorDriver, Triggered, Variant};
use crate::bus::RegisterBus;
use crate::error::{DriverError, Result};
use crate::regmap::RegisterMap;
use tidbits_regs::regs::accumulate_vector as regs;
use tidbits_regs::{Layout, RegisterDef};

/// Fixed-length vector summed in hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VectorAccumulate;

/// Driver for the vector accumulator build
pub type VectorAccumulateDriver<B> = AcceleratorDriver<B, VectorAccumulate>;

/// Vector to load and sum
#[derive(Debug, Clone, Copy)]
pub struct AccumulateJob<'b> {
    /// One value per hardware element
    pub values: &'b [u32],
}

impl<'b> AccumulateJob<'b> {
    /// Load and sum `values`
    pub const fn new(values: &'b [u32]) -> Self {
        Self { values }
    }
}

fn capacity<B: RegisterBus>(map: &RegisterMap<B>) -> Result<usize> {
    let n = map.read32(regs::VECTOR_NUM_ELEMS.name)?;
    usize::try_from(n).map_err(|_| DriverError::precondition(format!("vector length {n} exceeds usize")))
}

fn load<B: RegisterBus>(map: &mut RegisterMap<B>, index: u32, value: u32) -> Result<()> {
    map.write32(regs::VECTOR_IN_ADDR.name, index)?;
    map.write32(regs::VECTOR_IN_DATA.name, value)?;
    map.pulse(regs::VECTOR_IN_WRITE_ENABLE.name)
}

impl Variant for VectorAccumulate {
    const LAYOUT: &'static Layout = &regs::LAYOUT;
}

impl Triggered for VectorAccumulate {
    type Job<'b> = AccumulateJob<'b>;
    type Output = u32;

    const START: RegisterDef = regs::VECTOR_SUM_ENABLE;
    const DONE: RegisterDef = regs::VECTOR_SUM_DONE;

    fn program<B: RegisterBus>(map: &mut RegisterMap<B>, job: &AccumulateJob<'_>) -> Result<()> {
        let expected = capacity(map)?;
        if job.values.len() != expected {
            return Err(DriverError::precondition(format!(
                "vector has {expected} elements, got {} values",
                job.values.len()
            )));
        }
        for (index, &value) in (0u32..).zip(job.values) {
            load(map, index, value)?;
        }
        Ok(())
    }

    fn collect<B: RegisterBus>(map: &RegisterMap<B>, _job: &AccumulateJob<'_>) -> Result<u32> {
        map.read32(regs::RESULT.name)
    }
}

impl<B: RegisterBus> AcceleratorDriver<B, VectorAccumulate> {
    /// Number of elements the hardware vector holds
    ///
    /// # Errors
    ///
    /// Register errors propagate.
    pub fn vector_capacity(&self) -> Result<usize> {
        capacity(&self.map)
    }

    /// Store one element
    ///
    /// # Errors
    ///
    /// `CallerPrecondition` if `index` is outside the vector; `Wedged` after
    /// an unrecovered timeout.
    pub fn load_element(&mut self, index: usize, value: u32) -> Result<()> {
        self.ensure_usable()?;
        let len = self.vector_capacity()?;
        if index >= len {
            return Err(DriverError::precondition(format!(
                "element {index} outside {len}-element vector"
            )));
        }
        let index = u32::try_from(index).map_err(|_| DriverError::precondition("element index exceeds u32"))?;
        load(&mut self.map, index, value)
    }

    /// Load `values` and sum them in one blocking call
    ///
    /// # Errors
    ///
    /// As [`AcceleratorDriver::run`].
    pub fn accumulate(&mut self, values: &[u32]) -> Result<u32> {
        self.run(AccumulateJob::new(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::RecordingBus;
    use crate::config::DriverConfig;
    use crate::driver::OpState;
    use crate::sim::SimPlatform;
    use tidbits_regs::AcceleratorKind;

    #[test]
    fn sums_the_vector() {
        let mut driver = VectorAccumulateDriver::attach(&SimPlatform::new(), &DriverConfig::default()).unwrap();
        assert_eq!(driver.vector_capacity().unwrap(), 10);
        let values: Vec<u32> = (1..=10).collect();
        assert_eq!(driver.accumulate(&values).unwrap(), 55);
    }

    #[test]
    fn wrong_length_is_rejected_before_any_load() {
        let platform = SimPlatform::new();
        let (bus, log) = RecordingBus::new(platform.accelerator(AcceleratorKind::AccumulateVector));
        let mut driver = VectorAccumulateDriver::open(bus, &DriverConfig::default()).unwrap();
        log.clear();
        let err = driver.configure(AccumulateJob::new(&[1, 2, 3])).unwrap_err();
        assert!(matches!(err, DriverError::CallerPrecondition { .. }));
        assert!(log.writes_to(regs::VECTOR_IN_WRITE_ENABLE.offset).is_empty());
        assert_eq!(driver.state(), OpState::Idle);
    }

    #[test]
    fn configure_pulses_once_per_element() {
        let platform = SimPlatform::new();
        let (bus, log) = RecordingBus::new(platform.accelerator(AcceleratorKind::AccumulateVector));
        let mut driver = VectorAccumulateDriver::open(bus, &DriverConfig::default()).unwrap();
        let values = [7u32; 10];
        let op = driver.configure(AccumulateJob::new(&values)).unwrap();
        drop(op);
        assert_eq!(log.writes_to(regs::VECTOR_IN_WRITE_ENABLE.offset), [1u64, 0].repeat(10));
        assert_eq!(log.writes_to(regs::VECTOR_IN_ADDR.offset), (0..10).collect::<Vec<u64>>());
    }

    #[test]
    fn elements_can_be_updated_individually() {
        let mut driver = VectorAccumulateDriver::attach(&SimPlatform::new(), &DriverConfig::default()).unwrap();
        assert_eq!(driver.accumulate(&[1; 10]).unwrap(), 10);
        driver.load_element(9, 100).unwrap();
        assert!(driver.load_element(10, 1).is_err());

        let mut op = driver.configure(AccumulateJob::new(&[0; 10])).unwrap();
        op.trigger().unwrap();
        op.wait().unwrap();
        assert_eq!(op.finish().unwrap(), 0);
    }

    #[test]
    fn sum_wraps() {
        let mut driver = VectorAccumulateDriver::attach(&SimPlatform::new(), &DriverConfig::default()).unwrap();
        assert_eq!(driver.accumulate(&[u32::MAX; 10]).unwrap(), u32::MAX.wrapping_mul(10));
    }
}
