//! Register maps for each accelerator build.
//!
//! Offsets follow the generated wrapper's register file: the signature is
//! always register 0, then the accelerator's I/O fields in declaration
//! order, one 32-bit word each. Physical addresses take a full 64-bit slot.
//!
//! ```text
//! variant              0x00       0x04        0x08         0x0c            0x10 ..
//! TestRegOps           signature  op_0        op_1         sum
//! BRAMExample          signature  write_addr  write_data   write_enable    read_addr, read_data
//! DRAMExample          signature  start       finished     byteCount       baseAddr(64), sum
//! TestAccumulateVector signature  num_elems   in_addr      in_data         in_we, sum_en, sum_done, result
//! MemCpyExample        signature  start       finished     byteCount       srcAddr(64), destAddr(64), cycleCount
//! ```

/// Scalar register-op accelerator (`TestRegOps`).
///
/// `sum` is combinational: it always reflects `op_0 + op_1` modulo 2^32.
pub mod reg_ops {
    use crate::layout::{AcceleratorKind, Layout, RegisterDef};

    /// Build signature.
    pub const SIGNATURE: RegisterDef = RegisterDef::read_only("signature", 0x00);
    /// First operand.
    pub const OP_0: RegisterDef = RegisterDef::read_write("op_0", 0x04);
    /// Second operand.
    pub const OP_1: RegisterDef = RegisterDef::read_write("op_1", 0x08);
    /// Combinational sum.
    pub const SUM: RegisterDef = RegisterDef::read_only("sum", 0x0C);

    /// Operand registers in index order.
    pub const OPERANDS: [RegisterDef; 2] = [OP_0, OP_1];

    /// Register layout.
    pub const LAYOUT: Layout = Layout {
        kind: AcceleratorKind::RegOps,
        signature: 0x5EA1_0001,
        registers: &[SIGNATURE, OP_0, OP_1, SUM],
    };
}

/// On-chip block memory (`BRAMExample`).
///
/// Writes commit on a 0→1→0 pulse of `write_enable`. Reads are
/// combinational from `read_addr` to `read_data`.
pub mod bram {
    use crate::layout::{AcceleratorKind, Layout, RegisterDef};

    /// Build signature.
    pub const SIGNATURE: RegisterDef = RegisterDef::read_only("signature", 0x00);
    /// Write port address.
    pub const WRITE_ADDR: RegisterDef = RegisterDef::write_only("write_addr", 0x04);
    /// Write port data.
    pub const WRITE_DATA: RegisterDef = RegisterDef::write_only("write_data", 0x08);
    /// Write enable (edge-triggered).
    pub const WRITE_ENABLE: RegisterDef = RegisterDef::write_only("write_enable", 0x0C);
    /// Read port address.
    pub const READ_ADDR: RegisterDef = RegisterDef::read_write("read_addr", 0x10);
    /// Read port data.
    pub const READ_DATA: RegisterDef = RegisterDef::read_only("read_data", 0x14);

    /// Address bits of the memory.
    pub const ADDR_BITS: u32 = 10;
    /// Addressable 32-bit words.
    pub const DEPTH: u32 = 1 << ADDR_BITS;

    /// Register layout.
    pub const LAYOUT: Layout = Layout {
        kind: AcceleratorKind::Bram,
        signature: 0x5EA1_0002,
        registers: &[SIGNATURE, WRITE_ADDR, WRITE_DATA, WRITE_ENABLE, READ_ADDR, READ_DATA],
    };
}

/// DRAM streaming sum (`DRAMExample`).
///
/// Reads `byteCount` bytes of `u32` elements starting at `baseAddr` and sums
/// them modulo 2^32.
pub mod dram_sum {
    use crate::layout::{AcceleratorKind, Layout, RegisterDef};

    /// Build signature.
    pub const SIGNATURE: RegisterDef = RegisterDef::read_only("signature", 0x00);
    /// Start bit (level, held high for the whole run).
    pub const START: RegisterDef = RegisterDef::read_write("start", 0x04);
    /// Finished bit.
    pub const FINISHED: RegisterDef = RegisterDef::read_only("finished", 0x08);
    /// Bytes to stream; multiple of [`crate::platform::STREAM_ALIGNMENT`].
    pub const BYTE_COUNT: RegisterDef = RegisterDef::read_write("byteCount", 0x0C);
    /// Physical base address of the input buffer.
    pub const BASE_ADDR: RegisterDef = RegisterDef::read_write64("baseAddr", 0x10);
    /// Accumulated sum.
    pub const SUM: RegisterDef = RegisterDef::read_only("sum", 0x18);

    /// Register layout.
    pub const LAYOUT: Layout = Layout {
        kind: AcceleratorKind::DramSum,
        signature: 0x5EA1_0003,
        registers: &[SIGNATURE, START, FINISHED, BYTE_COUNT, BASE_ADDR, SUM],
    };
}

/// Vector load + accumulate (`TestAccumulateVector`).
pub mod accumulate_vector {
    use crate::layout::{AcceleratorKind, Layout, RegisterDef};

    /// Build signature.
    pub const SIGNATURE: RegisterDef = RegisterDef::read_only("signature", 0x00);
    /// Vector length N, fixed by the build.
    pub const VECTOR_NUM_ELEMS: RegisterDef = RegisterDef::read_only("vector_num_elems", 0x04);
    /// Element index for the next load.
    pub const VECTOR_IN_ADDR: RegisterDef = RegisterDef::write_only("vector_in_addr", 0x08);
    /// Element value for the next load.
    pub const VECTOR_IN_DATA: RegisterDef = RegisterDef::write_only("vector_in_data", 0x0C);
    /// Element write enable (edge-triggered).
    pub const VECTOR_IN_WRITE_ENABLE: RegisterDef =
        RegisterDef::write_only("vector_in_write_enable", 0x10);
    /// Sum enable (level).
    pub const VECTOR_SUM_ENABLE: RegisterDef = RegisterDef::read_write("vector_sum_enable", 0x14);
    /// Sum done.
    pub const VECTOR_SUM_DONE: RegisterDef = RegisterDef::read_only("vector_sum_done", 0x18);
    /// Accumulated result.
    pub const RESULT: RegisterDef = RegisterDef::read_only("result", 0x1C);

    /// Vector length of the reference build.
    pub const NUM_ELEMS: u32 = 10;

    /// Register layout.
    pub const LAYOUT: Layout = Layout {
        kind: AcceleratorKind::AccumulateVector,
        signature: 0x5EA1_0004,
        registers: &[
            SIGNATURE,
            VECTOR_NUM_ELEMS,
            VECTOR_IN_ADDR,
            VECTOR_IN_DATA,
            VECTOR_IN_WRITE_ENABLE,
            VECTOR_SUM_ENABLE,
            VECTOR_SUM_DONE,
            RESULT,
        ],
    };
}

/// DRAM-to-DRAM copy engine (`MemCpyExample`).
pub mod memcpy {
    use crate::layout::{AcceleratorKind, Layout, RegisterDef};

    /// Build signature.
    pub const SIGNATURE: RegisterDef = RegisterDef::read_only("signature", 0x00);
    /// Start bit (level).
    pub const START: RegisterDef = RegisterDef::read_write("start", 0x04);
    /// Finished bit.
    pub const FINISHED: RegisterDef = RegisterDef::read_only("finished", 0x08);
    /// Bytes to copy.
    pub const BYTE_COUNT: RegisterDef = RegisterDef::read_write("byteCount", 0x0C);
    /// Physical source address.
    pub const SRC_ADDR: RegisterDef = RegisterDef::read_write64("srcAddr", 0x10);
    /// Physical destination address.
    pub const DEST_ADDR: RegisterDef = RegisterDef::read_write64("destAddr", 0x18);
    /// Cycles the last copy took.
    pub const CYCLE_COUNT: RegisterDef = RegisterDef::read_only("cycleCount", 0x20);

    /// Register layout.
    pub const LAYOUT: Layout = Layout {
        kind: AcceleratorKind::MemCpy,
        signature: 0x5EA1_0005,
        registers: &[SIGNATURE, START, FINISHED, BYTE_COUNT, SRC_ADDR, DEST_ADDR, CYCLE_COUNT],
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Width;

    #[test]
    fn address_registers_are_64_bit_and_aligned() {
        for reg in [dram_sum::BASE_ADDR, memcpy::SRC_ADDR, memcpy::DEST_ADDR] {
            assert_eq!(reg.width, Width::W64, "{}", reg.name);
            assert_eq!(reg.offset % 8, 0, "{}", reg.name);
        }
    }

    #[test]
    fn signatures_are_distinct() {
        let sigs = [
            reg_ops::LAYOUT.signature,
            bram::LAYOUT.signature,
            dram_sum::LAYOUT.signature,
            accumulate_vector::LAYOUT.signature,
            memcpy::LAYOUT.signature,
        ];
        for (i, a) in sigs.iter().enumerate() {
            assert!(!sigs[i + 1..].contains(a));
        }
    }

    #[test]
    fn bram_depth_matches_address_bits() {
        assert_eq!(bram::DEPTH, 1024);
    }
}
