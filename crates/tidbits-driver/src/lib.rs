//! Driver core for polling-controlled FPGA accelerators.
//!
//! Every accelerator build behind this crate exposes the same contract: a
//! fixed register file with a read-only signature, input registers, a start
//! or enable bit, a done bit and result registers. The host programs inputs,
//! triggers, busy-waits for completion and reads back results. There are no
//! interrupts and no command queues.
//!
//! # Layers
//!
//! ```text
//! AcceleratorDriver<B, V>   state machine + Operation guard, one per instance
//!   ├── RegisterMap<B>      named, access-checked register I/O (tidbits-regs layouts)
//!   ├── PollLoop            bounded busy-wait on a done bit
//!   └── BufferDescriptor    physical address + length borrowed from a PhysBuffer
//!
//! Platform                  where buses and buffers come from
//!   ├── MmioPlatform        mmap'd register window + u-dma-buf allocator
//!   └── SimPlatform         register-level software models + simulated DRAM
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use tidbits_driver::prelude::*;
//!
//! # fn main() -> tidbits_driver::Result<()> {
//! let platform = SimPlatform::new();
//! let config = DriverConfig::from_env()?;
//!
//! let mut regops = RegOpsDriver::attach(&platform, &config)?;
//! assert_eq!(regops.add(2, 3)?, 5);
//!
//! let alloc = platform.allocator()?;
//! let mut src = alloc.allocate(256, 4)?;
//! let dst = alloc.allocate(256, 4)?;
//! src.write_u32s(&[0xA5A5_A5A5; 256])?;
//!
//! let mut memcpy = MemCopyDriver::attach(&platform, &config)?;
//! let report = memcpy.run(MemCopyJob::whole(src.descriptor(), dst.descriptor()))?;
//! println!("{} bytes in {} cycles", report.byte_count, report.cycle_count);
//! assert_eq!(verify_copy(&src, &dst, report.byte_count)?, CopyCheck::Identical);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

pub mod buffer;
pub mod bus;
mod config;
mod driver;
mod error;
pub mod mmio;
pub mod platform;
pub mod poll;
mod regmap;
pub mod sim;
pub mod udmabuf;

/// Register layouts (re-exported from tidbits-regs).
pub use tidbits_regs as regs;

pub use buffer::{verify_copy, BufferDescriptor, BufferHandle, CopyCheck, PhysAllocator, PhysBuffer};
pub use bus::{BusLog, RecordingBus, RegisterBus};
pub use config::DriverConfig;
pub use driver::{
    AccumulateJob, AcceleratorDriver, Bram, BramDriver, CopyReport, MemCopy, MemCopyDriver, MemCopyJob,
    OpState, Operation, RegOps, RegOpsDriver, StreamSum, StreamSumDriver, StreamSumJob, Triggered,
    Variant, VectorAccumulate, VectorAccumulateDriver, DROP_WAIT_LIMIT,
};
pub use error::{AccessKind, DriverError, Result};
pub use mmio::MmioRegion;
pub use platform::{MmioPlatform, Platform, PlatformSelection};
pub use poll::{PollConfig, PollLoop, PollOutcome};
pub use regmap::RegisterMap;
pub use sim::{SimAllocator, SimPlatform, SimTiming};
pub use udmabuf::UdmabufAllocator;

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        verify_copy, AccumulateJob, BramDriver, CopyCheck, CopyReport, DriverConfig, DriverError,
        MemCopyDriver, MemCopyJob, OpState, PhysAllocator, PhysBuffer, Platform, RegOpsDriver,
        RegisterBus, Result, SimPlatform, StreamSumDriver, StreamSumJob, VectorAccumulateDriver,
    };
}
