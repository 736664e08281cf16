//! Register definitions and per-variant layouts.
//!
//! A [`Layout`] is an ordered, immutable table of [`RegisterDef`]s. Offsets
//! are byte offsets from the accelerator's base address and are fixed at
//! build time; nothing in this crate can move a register once defined.

use std::fmt;

/// Host-side access mode of a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    /// Hardware output; host writes are rejected.
    ReadOnly,
    /// Hardware input with no readback path; host reads are rejected.
    WriteOnly,
    /// Latched register, readable and writable.
    ReadWrite,
}

impl Access {
    /// Whether the host may read this register.
    #[must_use]
    pub const fn readable(self) -> bool {
        matches!(self, Self::ReadOnly | Self::ReadWrite)
    }

    /// Whether the host may write this register.
    #[must_use]
    pub const fn writable(self) -> bool {
        matches!(self, Self::WriteOnly | Self::ReadWrite)
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadOnly => write!(f, "read-only"),
            Self::WriteOnly => write!(f, "write-only"),
            Self::ReadWrite => write!(f, "read-write"),
        }
    }
}

/// Register width on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Width {
    /// One 32-bit word.
    W32,
    /// One 64-bit transaction (physical addresses).
    W64,
}

impl Width {
    /// Width in bytes.
    #[must_use]
    pub const fn bytes(self) -> usize {
        match self {
            Self::W32 => 4,
            Self::W64 => 8,
        }
    }

    /// Largest value that fits.
    #[must_use]
    pub const fn max_value(self) -> u64 {
        match self {
            Self::W32 => u32::MAX as u64,
            Self::W64 => u64::MAX,
        }
    }
}

/// One hardware register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegisterDef {
    /// Logical name, unique within a layout.
    pub name: &'static str,
    /// Byte offset from the accelerator base.
    pub offset: usize,
    /// Bus width.
    pub width: Width,
    /// Host access mode.
    pub access: Access,
}

impl RegisterDef {
    /// Define a register.
    #[must_use]
    pub const fn new(name: &'static str, offset: usize, width: Width, access: Access) -> Self {
        Self {
            name,
            offset,
            width,
            access,
        }
    }

    /// 32-bit read-only register.
    #[must_use]
    pub const fn read_only(name: &'static str, offset: usize) -> Self {
        Self::new(name, offset, Width::W32, Access::ReadOnly)
    }

    /// 32-bit write-only register.
    #[must_use]
    pub const fn write_only(name: &'static str, offset: usize) -> Self {
        Self::new(name, offset, Width::W32, Access::WriteOnly)
    }

    /// 32-bit read-write register.
    #[must_use]
    pub const fn read_write(name: &'static str, offset: usize) -> Self {
        Self::new(name, offset, Width::W32, Access::ReadWrite)
    }

    /// 64-bit read-write register.
    #[must_use]
    pub const fn read_write64(name: &'static str, offset: usize) -> Self {
        Self::new(name, offset, Width::W64, Access::ReadWrite)
    }

    /// First byte past the end of this register.
    #[must_use]
    pub const fn end(&self) -> usize {
        self.offset + self.width.bytes()
    }
}

/// Accelerator variant identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AcceleratorKind {
    /// Combinational scalar adder (`TestRegOps`).
    RegOps,
    /// On-chip block memory with edge-triggered writes.
    Bram,
    /// DRAM-backed streaming sum.
    DramSum,
    /// On-chip vector load + accumulate.
    AccumulateVector,
    /// DRAM-to-DRAM copy engine.
    MemCpy,
}

impl AcceleratorKind {
    /// All variants, in register-map order.
    pub const ALL: [Self; 5] = [
        Self::RegOps,
        Self::Bram,
        Self::DramSum,
        Self::AccumulateVector,
        Self::MemCpy,
    ];

    /// Register layout for this variant.
    #[must_use]
    pub const fn layout(self) -> &'static Layout {
        match self {
            Self::RegOps => &crate::regs::reg_ops::LAYOUT,
            Self::Bram => &crate::regs::bram::LAYOUT,
            Self::DramSum => &crate::regs::dram_sum::LAYOUT,
            Self::AccumulateVector => &crate::regs::accumulate_vector::LAYOUT,
            Self::MemCpy => &crate::regs::memcpy::LAYOUT,
        }
    }
}

impl fmt::Display for AcceleratorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RegOps => write!(f, "TestRegOps"),
            Self::Bram => write!(f, "BRAMExample"),
            Self::DramSum => write!(f, "DRAMExample"),
            Self::AccumulateVector => write!(f, "TestAccumulateVector"),
            Self::MemCpy => write!(f, "MemCpyExample"),
        }
    }
}

/// Fixed register table for one accelerator build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    /// Variant this layout describes.
    pub kind: AcceleratorKind,
    /// Value the `signature` register reads on this build.
    pub signature: u32,
    /// Registers in offset order. The first entry is always the signature.
    pub registers: &'static [RegisterDef],
}

impl Layout {
    /// Look up a register by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&'static RegisterDef> {
        let registers: &'static [RegisterDef] = self.registers;
        registers.iter().find(|r| r.name == name)
    }

    /// Look up a register by byte offset.
    #[must_use]
    pub fn at_offset(&self, offset: usize) -> Option<&'static RegisterDef> {
        let registers: &'static [RegisterDef] = self.registers;
        registers.iter().find(|r| r.offset == offset)
    }

    /// Bytes of address space the layout occupies.
    #[must_use]
    pub fn span(&self) -> usize {
        self.registers.iter().map(RegisterDef::end).max().unwrap_or(0)
    }

    /// The signature register.
    #[must_use]
    pub fn signature_register(&self) -> &'static RegisterDef {
        let registers: &'static [RegisterDef] = self.registers;
        &registers[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_modes() {
        assert!(Access::ReadOnly.readable());
        assert!(!Access::ReadOnly.writable());
        assert!(!Access::WriteOnly.readable());
        assert!(Access::ReadWrite.readable() && Access::ReadWrite.writable());
    }

    #[test]
    fn width_limits() {
        assert_eq!(Width::W32.max_value(), 0xFFFF_FFFF);
        assert_eq!(Width::W64.bytes(), 8);
    }

    #[test]
    fn every_layout_starts_with_readonly_signature() {
        for kind in AcceleratorKind::ALL {
            let layout = kind.layout();
            let sig = layout.signature_register();
            assert_eq!(sig.offset, 0, "{kind}");
            assert_eq!(sig.access, Access::ReadOnly, "{kind}");
            assert_eq!(layout.kind, kind);
        }
    }

    #[test]
    fn registers_do_not_overlap() {
        for kind in AcceleratorKind::ALL {
            let regs = kind.layout().registers;
            for (i, a) in regs.iter().enumerate() {
                for b in &regs[i + 1..] {
                    assert!(
                        a.end() <= b.offset || b.end() <= a.offset,
                        "{kind}: {} overlaps {}",
                        a.name,
                        b.name
                    );
                    assert_ne!(a.name, b.name, "{kind}: duplicate name");
                }
            }
        }
    }

    #[test]
    fn lookup_by_name_and_offset() {
        let layout = AcceleratorKind::DramSum.layout();
        let base = layout.find("baseAddr").expect("baseAddr defined");
        assert_eq!(base.width, Width::W64);
        assert_eq!(layout.at_offset(base.offset), Some(base));
        assert!(layout.find("nope").is_none());
        assert!(layout.span() >= base.end());
    }
}
