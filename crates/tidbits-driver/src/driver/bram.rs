//! On-chip block memory build (`BRAMExample`)
//!
//! Writes commit on the rising edge of `write_enable`; reads are
//! combinational on `read_addr`. Addresses beyond [`bram::DEPTH`] are not
//! rejected: the hardware ignores the upper bits, so the driver passes them
//! through and logs a warning.

use super::{AcceleratorDriver, Variant};
use crate::bus::RegisterBus;
use crate::error::Result;
use tidbits_regs::regs::bram;
use tidbits_regs::Layout;
use tracing::warn;

/// Single-port word memory behind address/data registers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bram;

impl Variant for Bram {
    const LAYOUT: &'static Layout = &bram::LAYOUT;
}

/// Driver for the BRAM build
pub type BramDriver<B> = AcceleratorDriver<B, Bram>;

fn check_addr(addr: u32) {
    if addr >= bram::DEPTH {
        warn!("BRAM address {addr} beyond depth {}; hardware wraps it", bram::DEPTH);
    }
}

impl<B: RegisterBus> AcceleratorDriver<B, Bram> {
    /// Addressable words
    pub const fn depth(&self) -> u32 {
        bram::DEPTH
    }

    /// Store `data` at `addr`
    ///
    /// # Errors
    ///
    /// Register errors propagate.
    pub fn write(&mut self, addr: u32, data: u32) -> Result<()> {
        check_addr(addr);
        self.map.write32(bram::WRITE_ADDR.name, addr)?;
        self.map.write32(bram::WRITE_DATA.name, data)?;
        self.map.pulse(bram::WRITE_ENABLE.name)
    }

    /// Load the word at `addr`
    ///
    /// # Errors
    ///
    /// Register errors propagate.
    pub fn read(&mut self, addr: u32) -> Result<u32> {
        check_addr(addr);
        self.map.write32(bram::READ_ADDR.name, addr)?;
        self.map.read32(bram::READ_DATA.name)
    }

    /// Store `words` at consecutive addresses from `base`
    ///
    /// Addresses wrap at `u32::MAX` like single-word accesses.
    ///
    /// # Errors
    ///
    /// Register errors propagate; words before the failing one are stored.
    pub fn write_block(&mut self, base: u32, words: &[u32]) -> Result<()> {
        for (offset, &word) in (0u32..).zip(words) {
            self.write(base.wrapping_add(offset), word)?;
        }
        Ok(())
    }

    /// Load `len` consecutive words from `base`
    ///
    /// # Errors
    ///
    /// Register errors propagate.
    pub fn read_block(&mut self, base: u32, len: usize) -> Result<Vec<u32>> {
        (0u32..)
            .take(len)
            .map(|offset| self.read(base.wrapping_add(offset)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::RecordingBus;
    use crate::config::DriverConfig;
    use crate::sim::SimPlatform;
    use tidbits_regs::AcceleratorKind;

    #[test]
    fn write_then_read_round_trips() {
        let mut driver = BramDriver::attach(&SimPlatform::new(), &DriverConfig::default()).unwrap();
        driver.write(12, 0xDEAD_BEEF).unwrap();
        driver.write(13, 7).unwrap();
        assert_eq!(driver.read(12).unwrap(), 0xDEAD_BEEF);
        assert_eq!(driver.read(13).unwrap(), 7);
        assert_eq!(driver.read(14).unwrap(), 0);
        assert_eq!(driver.depth(), 1024);
    }

    #[test]
    fn later_writes_win() {
        let mut driver = BramDriver::attach(&SimPlatform::new(), &DriverConfig::default()).unwrap();
        driver.write(5, 1).unwrap();
        driver.write(5, 2).unwrap();
        assert_eq!(driver.read(5).unwrap(), 2);
    }

    #[test]
    fn blocks() {
        let mut driver = BramDriver::attach(&SimPlatform::new(), &DriverConfig::default()).unwrap();
        let words: Vec<u32> = (0..32).map(|i| i * 3).collect();
        driver.write_block(100, &words).unwrap();
        assert_eq!(driver.read_block(100, 32).unwrap(), words);
    }

    #[test]
    fn write_commits_through_one_pulse() {
        let platform = SimPlatform::new();
        let (bus, log) = RecordingBus::new(platform.accelerator(AcceleratorKind::Bram));
        let mut driver = BramDriver::open(bus, &DriverConfig::default()).unwrap();
        log.clear();
        driver.write(3, 9).unwrap();
        assert_eq!(log.writes_to(bram::WRITE_ENABLE.offset), vec![1, 0]);
        assert_eq!(log.writes_to(bram::WRITE_ADDR.offset), vec![3]);
        assert_eq!(log.writes_to(bram::WRITE_DATA.offset), vec![9]);
    }

    #[test]
    fn out_of_range_address_wraps() {
        let mut driver = BramDriver::attach(&SimPlatform::new(), &DriverConfig::default()).unwrap();
        driver.write(bram::DEPTH + 4, 55).unwrap();
        assert_eq!(driver.read(4).unwrap(), 55);
    }

    #[test]
    fn blocks_wrap_at_the_top_of_the_address_range() {
        let mut driver = BramDriver::attach(&SimPlatform::new(), &DriverConfig::default()).unwrap();
        driver.write_block(u32::MAX, &[11, 22]).unwrap();
        assert_eq!(driver.read(u32::MAX & (bram::DEPTH - 1)).unwrap(), 11);
        assert_eq!(driver.read(0).unwrap(), 22);
        assert_eq!(driver.read_block(u32::MAX, 2).unwrap(), vec![11, 22]);
    }
}
