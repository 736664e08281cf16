// SPDX-License-Identifier: AGPL-3.0-only

//! Register-level models of the accelerator builds
//!
//! Each model reacts to bus transactions the way the RTL does:
//!
//! | Build | Behaviour |
//! |-------|-----------|
//! | `TestRegOps` | `sum` is `op_0 + op_1` mod 2^32 on every read |
//! | `BRAMExample` | rising edge of `write_enable` stores `write_data` at `write_addr` |
//! | `DRAMExample` | rising `start` arms a countdown; completion sums DRAM |
//! | `TestAccumulateVector` | rising `vector_in_write_enable` loads one element |
//! | `MemCpyExample` | rising `start` arms a countdown; completion copies DRAM |
//!
//! Completion advances only on reads of the done register, one step per
//! read, so poll counts in tests are deterministic.

use super::{SimDram, SimTiming};
use crate::bus::RegisterBus;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tidbits_regs::regs::{accumulate_vector, bram, dram_sum, memcpy, reg_ops};
use tidbits_regs::{AcceleratorKind, Layout, RegisterDef};
use tracing::{debug, warn};

/// Fixed pipeline overhead of the copy engine, in cycles
const MEMCPY_SETUP_CYCLES: u64 = 16;

/// Bytes the copy engine moves per cycle (64-bit data path)
const MEMCPY_BYTES_PER_CYCLE: u64 = 8;

#[derive(Debug, Default)]
struct SimState {
    regs: BTreeMap<usize, u64>,
    memory: Vec<u32>,
    countdown: Option<u32>,
    finished: bool,
}

impl SimState {
    fn reg(&self, def: RegisterDef) -> u64 {
        self.regs.get(&def.offset).copied().unwrap_or(0)
    }

    #[allow(clippy::cast_possible_truncation)] // 32-bit registers hold 32-bit values
    fn reg32(&self, def: RegisterDef) -> u32 {
        self.reg(def) as u32
    }
}

/// Software model of one accelerator instance
#[derive(Debug)]
pub struct SimAccelerator {
    layout: &'static Layout,
    dram: SimDram,
    timing: SimTiming,
    state: Mutex<SimState>,
}

impl SimAccelerator {
    pub(crate) fn new(layout: &'static Layout, dram: SimDram, timing: SimTiming) -> Self {
        let memory = match layout.kind {
            AcceleratorKind::Bram => vec![0; bram::DEPTH as usize],
            AcceleratorKind::AccumulateVector => vec![0; accumulate_vector::NUM_ELEMS as usize],
            _ => Vec::new(),
        };
        Self {
            layout,
            dram,
            timing,
            state: Mutex::new(SimState {
                memory,
                ..SimState::default()
            }),
        }
    }

    /// Build this model implements
    pub const fn kind(&self) -> AcceleratorKind {
        self.layout.kind
    }

    /// Level-sensitive start bit and done bit, for builds that have them
    fn control(&self) -> Option<(RegisterDef, RegisterDef)> {
        match self.layout.kind {
            AcceleratorKind::DramSum => Some((dram_sum::START, dram_sum::FINISHED)),
            AcceleratorKind::MemCpy => Some((memcpy::START, memcpy::FINISHED)),
            AcceleratorKind::AccumulateVector => Some((
                accumulate_vector::VECTOR_SUM_ENABLE,
                accumulate_vector::VECTOR_SUM_DONE,
            )),
            AcceleratorKind::RegOps | AcceleratorKind::Bram => None,
        }
    }

    fn store(&self, offset: usize, value: u64) {
        let mut st = self.state.lock();
        let previous = st.regs.insert(offset, value).unwrap_or(0);
        let rising = previous & 1 == 0 && value & 1 == 1;

        if let Some((start, _)) = self.control() {
            if offset == start.offset {
                if rising {
                    st.countdown = Some(self.timing.latency_polls);
                    st.finished = false;
                    debug!("{}: start", self.layout.kind);
                } else if value & 1 == 0 {
                    st.countdown = None;
                    st.finished = false;
                }
                return;
            }
        }

        match self.layout.kind {
            AcceleratorKind::Bram if offset == bram::WRITE_ENABLE.offset && rising => {
                let addr = st.reg32(bram::WRITE_ADDR) & (bram::DEPTH - 1);
                let data = st.reg32(bram::WRITE_DATA);
                st.memory[addr as usize] = data;
            }
            AcceleratorKind::AccumulateVector
                if offset == accumulate_vector::VECTOR_IN_WRITE_ENABLE.offset && rising =>
            {
                let index = st.reg32(accumulate_vector::VECTOR_IN_ADDR) as usize;
                let data = st.reg32(accumulate_vector::VECTOR_IN_DATA);
                match st.memory.get_mut(index) {
                    Some(slot) => *slot = data,
                    None => warn!("vector_in_addr {index} outside vector, write dropped"),
                }
            }
            _ => {}
        }
    }

    fn load(&self, offset: usize) -> u64 {
        let mut st = self.state.lock();
        if offset == self.layout.signature_register().offset {
            return u64::from(self.layout.signature);
        }
        if let Some((_, done)) = self.control() {
            if offset == done.offset {
                self.advance(&mut st);
                return u64::from(st.finished);
            }
        }
        match self.layout.kind {
            AcceleratorKind::RegOps if offset == reg_ops::SUM.offset => {
                u64::from(st.reg32(reg_ops::OP_0).wrapping_add(st.reg32(reg_ops::OP_1)))
            }
            AcceleratorKind::Bram if offset == bram::READ_DATA.offset => {
                let addr = st.reg32(bram::READ_ADDR) & (bram::DEPTH - 1);
                u64::from(st.memory[addr as usize])
            }
            AcceleratorKind::AccumulateVector if offset == accumulate_vector::VECTOR_NUM_ELEMS.offset => {
                st.memory.len() as u64
            }
            _ => st.regs.get(&offset).copied().unwrap_or(0),
        }
    }

    fn advance(&self, st: &mut SimState) {
        if st.finished || self.timing.stalled {
            return;
        }
        match st.countdown {
            Some(0) => {
                st.countdown = None;
                self.complete(st);
                st.finished = true;
            }
            Some(n) => st.countdown = Some(n - 1),
            None => {}
        }
    }

    fn complete(&self, st: &mut SimState) {
        match self.layout.kind {
            AcceleratorKind::DramSum => {
                let base = st.reg(dram_sum::BASE_ADDR);
                let count = st.reg32(dram_sum::BYTE_COUNT) as usize;
                let mut bytes = vec![0u8; count];
                let sum = match self.dram.read(base, &mut bytes) {
                    Ok(()) => bytes
                        .chunks_exact(4)
                        .map(|w| u32::from_ne_bytes([w[0], w[1], w[2], w[3]]))
                        .fold(0u32, u32::wrapping_add),
                    Err(e) => {
                        warn!("DRAMExample read fault: {e}");
                        0
                    }
                };
                st.regs.insert(dram_sum::SUM.offset, u64::from(sum));
            }
            AcceleratorKind::AccumulateVector => {
                let sum = st.memory.iter().copied().fold(0u32, u32::wrapping_add);
                st.regs.insert(accumulate_vector::RESULT.offset, u64::from(sum));
            }
            AcceleratorKind::MemCpy => {
                let src = st.reg(memcpy::SRC_ADDR);
                let dst = st.reg(memcpy::DEST_ADDR);
                let count = st.reg32(memcpy::BYTE_COUNT);
                if let Err(e) = self.dram.copy(src, dst, count as usize) {
                    warn!("MemCpyExample bus fault: {e}");
                }
                let cycles = MEMCPY_SETUP_CYCLES + u64::from(count).div_ceil(MEMCPY_BYTES_PER_CYCLE);
                st.regs.insert(memcpy::CYCLE_COUNT.offset, cycles & u64::from(u32::MAX));
            }
            AcceleratorKind::RegOps | AcceleratorKind::Bram => {}
        }
        debug!("{}: finished", self.layout.kind);
    }
}

impl RegisterBus for SimAccelerator {
    fn size(&self) -> usize {
        self.layout.span()
    }

    fn read32(&self, offset: usize) -> u32 {
        #[allow(clippy::cast_possible_truncation)]
        let value = self.load(offset) as u32;
        value
    }

    fn write32(&self, offset: usize, value: u32) {
        self.store(offset, u64::from(value));
    }

    fn read64(&self, offset: usize) -> u64 {
        self.load(offset)
    }

    fn write64(&self, offset: usize, value: u64) {
        self.store(offset, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimPlatform;

    #[test]
    fn reg_ops_sum_wraps() {
        let acc = SimPlatform::new().accelerator(AcceleratorKind::RegOps);
        acc.write32(reg_ops::OP_0.offset, u32::MAX);
        acc.write32(reg_ops::OP_1.offset, 2);
        assert_eq!(acc.read32(reg_ops::SUM.offset), 1);
        assert_eq!(acc.read32(0), reg_ops::LAYOUT.signature);
    }

    #[test]
    fn bram_commits_only_on_rising_edge() {
        let acc = SimPlatform::new().accelerator(AcceleratorKind::Bram);
        acc.write32(bram::WRITE_ADDR.offset, 9);
        acc.write32(bram::WRITE_DATA.offset, 77);
        acc.write32(bram::READ_ADDR.offset, 9);
        assert_eq!(acc.read32(bram::READ_DATA.offset), 0);

        acc.write32(bram::WRITE_ENABLE.offset, 1);
        assert_eq!(acc.read32(bram::READ_DATA.offset), 77);

        // Held high: new data does not commit without another edge.
        acc.write32(bram::WRITE_DATA.offset, 88);
        acc.write32(bram::WRITE_ENABLE.offset, 1);
        assert_eq!(acc.read32(bram::READ_DATA.offset), 77);
    }

    #[test]
    fn clearing_start_drops_finished() {
        let platform = SimPlatform::with_timing(SimTiming { latency_polls: 0, stalled: false });
        let acc = platform.accelerator(AcceleratorKind::MemCpy);
        acc.write32(memcpy::START.offset, 1);
        assert_eq!(acc.read32(memcpy::FINISHED.offset), 1);
        acc.write32(memcpy::START.offset, 0);
        assert_eq!(acc.read32(memcpy::FINISHED.offset), 0);
    }

    #[test]
    fn vector_reports_capacity() {
        let acc = SimPlatform::new().accelerator(AcceleratorKind::AccumulateVector);
        assert_eq!(
            acc.read32(accumulate_vector::VECTOR_NUM_ELEMS.offset),
            accumulate_vector::NUM_ELEMS
        );
    }
}
