//! Scalar register-op build (`TestRegOps`)

use super::{AcceleratorDriver, Variant};
use crate::bus::RegisterBus;
use crate::error::{DriverError, Result};
use tidbits_regs::regs::reg_ops as regs;
use tidbits_regs::Layout;

/// Two operand registers and a combinational sum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegOps;

impl Variant for RegOps {
    const LAYOUT: &'static Layout = &regs::LAYOUT;
}

/// Driver for the register-op build
pub type RegOpsDriver<B> = AcceleratorDriver<B, RegOps>;

impl<B: RegisterBus> AcceleratorDriver<B, RegOps> {
    /// Write operand `index` (0 or 1)
    ///
    /// # Errors
    ///
    /// `CallerPrecondition` for any other index.
    pub fn set_operand(&mut self, index: usize, value: u32) -> Result<()> {
        let reg = regs::OPERANDS.get(index).ok_or_else(|| {
            DriverError::precondition(format!("operand index {index} out of range (0..{})", regs::OPERANDS.len()))
        })?;
        self.map.write32(reg.name, value)
    }

    /// Read both operands back
    ///
    /// # Errors
    ///
    /// Register errors propagate.
    pub fn operands(&self) -> Result<[u32; 2]> {
        Ok([self.map.read32(regs::OP_0.name)?, self.map.read32(regs::OP_1.name)?])
    }

    /// Current value of the sum register, `op_0 + op_1` modulo 2^32
    ///
    /// # Errors
    ///
    /// Register errors propagate.
    pub fn get_result(&self) -> Result<u32> {
        self.map.read32(regs::SUM.name)
    }

    /// Write both operands and read the sum
    ///
    /// # Errors
    ///
    /// Register errors propagate.
    pub fn add(&mut self, a: u32, b: u32) -> Result<u32> {
        self.set_operand(0, a)?;
        self.set_operand(1, b)?;
        self.get_result()
    }
}
