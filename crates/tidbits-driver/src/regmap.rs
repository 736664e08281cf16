//! Typed register access over a fixed layout
//!
//! [`RegisterMap`] pairs one [`RegisterBus`] with the static [`Layout`] of
//! the accelerator behind it. Lookups are by logical name; every `read` or
//! `write` is exactly one bus transaction of the register's width.

use crate::bus::RegisterBus;
use crate::error::{AccessKind, DriverError, Result};
use tidbits_regs::{Layout, RegisterDef, Width};

/// Named register accessor for one accelerator instance
#[derive(Debug)]
pub struct RegisterMap<B> {
    bus: B,
    layout: &'static Layout,
}

impl<B: RegisterBus> RegisterMap<B> {
    /// Bind `layout` to `bus`
    ///
    /// # Errors
    ///
    /// Returns `MapFailed` if the bus window is smaller than the layout.
    pub fn new(bus: B, layout: &'static Layout) -> Result<Self> {
        if bus.size() < layout.span() {
            return Err(DriverError::map_failed(format!(
                "{} needs {:#x} bytes of register space, bus has {:#x}",
                layout.kind,
                layout.span(),
                bus.size()
            )));
        }
        Ok(Self { bus, layout })
    }

    /// Layout this map was built for
    pub const fn layout(&self) -> &'static Layout {
        self.layout
    }

    /// Underlying bus
    pub const fn bus(&self) -> &B {
        &self.bus
    }

    /// Release the bus
    pub fn into_bus(self) -> B {
        self.bus
    }

    /// Resolve a register name
    ///
    /// # Errors
    ///
    /// Returns `InvalidRegister` if the layout has no such register.
    pub fn lookup(&self, name: &str) -> Result<&'static RegisterDef> {
        self.layout
            .find(name)
            .ok_or_else(|| DriverError::invalid_register(name, self.layout.kind))
    }

    /// Read a register
    ///
    /// # Errors
    ///
    /// `InvalidRegister` for unknown names, `AccessViolation` for write-only
    /// registers.
    pub fn read(&self, name: &str) -> Result<u64> {
        let reg = self.lookup(name)?;
        if !reg.access.readable() {
            return Err(DriverError::AccessViolation {
                register: reg.name,
                access: reg.access,
                attempted: AccessKind::Read,
            });
        }
        let value = match reg.width {
            Width::W32 => u64::from(self.bus.read32(reg.offset)),
            Width::W64 => self.bus.read64(reg.offset),
        };
        tracing::trace!("{} read {} @ {:#06x} = {value:#x}", self.layout.kind, reg.name, reg.offset);
        Ok(value)
    }

    /// Read a 32-bit register
    ///
    /// # Errors
    ///
    /// As [`RegisterMap::read`]; additionally `CallerPrecondition` if the
    /// register is 64 bits wide.
    pub fn read32(&self, name: &str) -> Result<u32> {
        let reg = self.lookup(name)?;
        if reg.width != Width::W32 {
            return Err(DriverError::precondition(format!(
                "register '{}' is 64 bits wide",
                reg.name
            )));
        }
        let value = self.read(name)?;
        u32::try_from(value).map_err(|_| DriverError::precondition("32-bit read overflowed"))
    }

    /// Write a register
    ///
    /// # Errors
    ///
    /// `InvalidRegister` for unknown names, `AccessViolation` for read-only
    /// registers, `CallerPrecondition` if `value` does not fit the register
    /// width.
    pub fn write(&mut self, name: &str, value: u64) -> Result<()> {
        let reg = self.lookup(name)?;
        if !reg.access.writable() {
            return Err(DriverError::AccessViolation {
                register: reg.name,
                access: reg.access,
                attempted: AccessKind::Write,
            });
        }
        if value > reg.width.max_value() {
            return Err(DriverError::precondition(format!(
                "value {value:#x} does not fit {}-byte register '{}'",
                reg.width.bytes(),
                reg.name
            )));
        }
        tracing::trace!("{} write {} @ {:#06x} = {value:#x}", self.layout.kind, reg.name, reg.offset);
        match reg.width {
            #[allow(clippy::cast_possible_truncation)] // bounded by max_value above
            Width::W32 => self.bus.write32(reg.offset, value as u32),
            Width::W64 => self.bus.write64(reg.offset, value),
        }
        Ok(())
    }

    /// Write a 32-bit value
    ///
    /// # Errors
    ///
    /// As [`RegisterMap::write`].
    pub fn write32(&mut self, name: &str, value: u32) -> Result<()> {
        self.write(name, u64::from(value))
    }

    /// Commit through an edge-triggered enable: write 1, then 0
    ///
    /// The two writes are issued back to back on the same bus. `&mut self`
    /// keeps any other write through this map from landing between them.
    ///
    /// # Errors
    ///
    /// As [`RegisterMap::write`]. Validation happens before the first write,
    /// so a failed pulse issues no transaction at all.
    pub fn pulse(&mut self, name: &str) -> Result<()> {
        let reg = self.lookup(name)?;
        if !reg.access.writable() {
            return Err(DriverError::AccessViolation {
                register: reg.name,
                access: reg.access,
                attempted: AccessKind::Write,
            });
        }
        self.write(reg.name, 1)?;
        self.write(reg.name, 0)
    }

    /// Read the build signature
    ///
    /// # Errors
    ///
    /// Never fails for layouts from `tidbits-regs`; the signature register is
    /// always present and readable.
    pub fn signature(&self) -> Result<u32> {
        self.read32(self.layout.signature_register().name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::RecordingBus;
    use crate::sim::SimPlatform;
    use tidbits_regs::regs::{bram, dram_sum, reg_ops};
    use tidbits_regs::{Access, AcceleratorKind};

    fn map(kind: AcceleratorKind) -> RegisterMap<crate::sim::SimAccelerator> {
        let platform = SimPlatform::new();
        RegisterMap::new(platform.accelerator(kind), kind.layout()).unwrap()
    }

    #[test]
    fn unknown_register_is_rejected() {
        let mut regs = map(AcceleratorKind::RegOps);
        assert!(matches!(
            regs.read("bogus"),
            Err(DriverError::InvalidRegister { kind: AcceleratorKind::RegOps, .. })
        ));
        assert!(matches!(regs.write("bogus", 1), Err(DriverError::InvalidRegister { .. })));
    }

    #[test]
    fn access_modes_are_enforced() {
        let mut regs = map(AcceleratorKind::Bram);
        let err = regs.write(bram::READ_DATA.name, 1).unwrap_err();
        assert!(matches!(
            err,
            DriverError::AccessViolation { access: Access::ReadOnly, attempted: AccessKind::Write, .. }
        ));
        let err = regs.read(bram::WRITE_DATA.name).unwrap_err();
        assert!(matches!(
            err,
            DriverError::AccessViolation { access: Access::WriteOnly, attempted: AccessKind::Read, .. }
        ));
        let mut regs = map(AcceleratorKind::RegOps);
        assert!(regs.write(reg_ops::SIGNATURE.name, 0).is_err());
    }

    #[test]
    fn values_wider_than_register_are_rejected() {
        let mut regs = map(AcceleratorKind::DramSum);
        assert!(matches!(
            regs.write(dram_sum::BYTE_COUNT.name, 1 << 32),
            Err(DriverError::CallerPrecondition { .. })
        ));
        regs.write(dram_sum::BASE_ADDR.name, 0x1_0000_0040).unwrap();
        assert_eq!(regs.read(dram_sum::BASE_ADDR.name).unwrap(), 0x1_0000_0040);
        assert!(regs.read32(dram_sum::BASE_ADDR.name).is_err());
    }

    #[test]
    fn signature_reads_layout_value() {
        let regs = map(AcceleratorKind::Bram);
        assert_eq!(regs.signature().unwrap(), bram::LAYOUT.signature);
    }

    #[test]
    fn one_call_is_one_transaction() {
        let platform = SimPlatform::new();
        let (bus, log) = RecordingBus::new(platform.accelerator(AcceleratorKind::RegOps));
        let mut regs = RegisterMap::new(bus, &reg_ops::LAYOUT).unwrap();
        regs.write32(reg_ops::OP_0.name, 3).unwrap();
        regs.read32(reg_ops::SUM.name).unwrap();
        regs.read32(reg_ops::SUM.name).unwrap();
        assert_eq!(log.transactions().len(), 3);
        assert_eq!(log.reads_of(reg_ops::SUM.offset), 2);
    }

    #[test]
    fn pulse_is_one_then_zero() {
        let platform = SimPlatform::new();
        let (bus, log) = RecordingBus::new(platform.accelerator(AcceleratorKind::Bram));
        let mut regs = RegisterMap::new(bus, &bram::LAYOUT).unwrap();
        regs.pulse(bram::WRITE_ENABLE.name).unwrap();
        assert_eq!(log.writes_to(bram::WRITE_ENABLE.offset), vec![1, 0]);

        log.clear();
        assert!(regs.pulse(bram::READ_DATA.name).is_err());
        assert!(log.transactions().is_empty());
    }

    #[test]
    fn small_bus_is_rejected() {
        let platform = SimPlatform::new();
        let bus = platform.accelerator(AcceleratorKind::RegOps);
        assert!(matches!(
            RegisterMap::new(bus, &dram_sum::LAYOUT),
            Err(DriverError::MapFailed { .. })
        ));
    }
}
