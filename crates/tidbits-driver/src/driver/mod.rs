//! Accelerator drivers
//!
//! One generic [`AcceleratorDriver`] type serves every build; a zero-sized
//! variant marker selects the register layout and the operations available.
//!
//! ## Operation lifecycle
//!
//! The DRAM-backed and vector builds share a four-phase protocol: program
//! inputs, raise the start bit, poll the done bit, read results. Those phases
//! are driven through an [`Operation`] guard:
//!
//! ```text
//!            configure          trigger            wait              finish
//!   Idle ─────────────▶ Configured ───────▶ Running ───────▶ Done ─────────▶ Idle
//!                                              │
//!                                              └── timeout ──▶ Wedged ── reset ──▶ Idle
//! ```
//!
//! The guard mutably borrows the driver and owns the job, which in turn
//! borrows the caller's buffers. Neither the driver nor those buffers can be
//! touched from the host until the guard is finished or dropped.
//!
//! ```no_run
//! use tidbits_driver::prelude::*;
//!
//! # fn main() -> tidbits_driver::Result<()> {
//! let platform = SimPlatform::new();
//! let alloc = platform.allocator()?;
//! let mut buffer = alloc.allocate(16, 4)?;
//! buffer.write_u32s(&(1..=16).collect::<Vec<u32>>())?;
//!
//! let mut driver = StreamSumDriver::attach(&platform, &DriverConfig::default())?;
//! let mut op = driver.configure(StreamSumJob::new(buffer.descriptor()))?;
//! op.trigger()?;
//! op.wait()?;
//! assert_eq!(op.finish()?, 136);
//! # Ok(())
//! # }
//! ```

mod accumulate;
mod bram;
mod memcpy;
mod reg_ops;
mod stream_sum;

pub use accumulate::{AccumulateJob, VectorAccumulate, VectorAccumulateDriver};
pub use bram::{Bram, BramDriver};
pub use memcpy::{CopyReport, MemCopy, MemCopyDriver, MemCopyJob};
pub use reg_ops::{RegOps, RegOpsDriver};
pub use stream_sum::{StreamSum, StreamSumDriver, StreamSumJob};

use crate::bus::RegisterBus;
use crate::config::DriverConfig;
use crate::error::{DriverError, Result};
use crate::platform::Platform;
use crate::poll::{PollLoop, PollOutcome};
use crate::regmap::RegisterMap;
use std::fmt;
use std::marker::PhantomData;
use std::time::Duration;
use tidbits_regs::{Layout, RegisterDef};
use tracing::{debug, info, warn};

/// Bound on the wait performed when a running operation is dropped and the
/// driver was configured without a timeout
pub const DROP_WAIT_LIMIT: Duration = Duration::from_secs(1);

/// Per-instance operation state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpState {
    /// No operation configured
    Idle,
    /// Inputs programmed, start bit low
    Configured,
    /// Start bit high, completion not yet observed
    Running,
    /// Completion observed, results readable
    Done,
    /// Completion never observed; the hardware may still be running
    Wedged,
}

impl fmt::Display for OpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Configured => write!(f, "configured"),
            Self::Running => write!(f, "running"),
            Self::Done => write!(f, "done"),
            Self::Wedged => write!(f, "wedged"),
        }
    }
}

/// Accelerator build selected at compile time
pub trait Variant: fmt::Debug + Send + Sync + 'static {
    /// Register layout of the build
    const LAYOUT: &'static Layout;
}

/// Builds driven through the start/poll/result protocol
pub trait Triggered: Variant {
    /// Inputs of one operation; may borrow caller buffers for `'b`
    type Job<'b>: fmt::Debug;
    /// Value read back after completion
    type Output;

    /// Level-sensitive start bit
    const START: RegisterDef;
    /// Done bit polled for completion
    const DONE: RegisterDef;

    /// Validate `job` and program every input register
    ///
    /// Validation happens before the first register write.
    ///
    /// # Errors
    ///
    /// Variant-specific precondition errors; register errors propagate.
    fn program<B: RegisterBus>(map: &mut RegisterMap<B>, job: &Self::Job<'_>) -> Result<()>;

    /// Read the result registers after completion
    ///
    /// # Errors
    ///
    /// Register errors propagate.
    fn collect<B: RegisterBus>(map: &RegisterMap<B>, job: &Self::Job<'_>) -> Result<Self::Output>;
}

/// Driver for one accelerator instance
///
/// Owns the register bus exclusively. All methods take `&mut self` where
/// they issue writes, so an instance is used by one thread at a time.
#[derive(Debug)]
pub struct AcceleratorDriver<B, V> {
    map: RegisterMap<B>,
    poll: PollLoop,
    state: OpState,
    _variant: PhantomData<V>,
}

impl<B: RegisterBus, V: Variant> AcceleratorDriver<B, V> {
    /// Bind a driver to `bus`
    ///
    /// # Errors
    ///
    /// Returns `MapFailed` if the bus is smaller than the layout and
    /// `SignatureMismatch` if signature checking is enabled and the register
    /// does not hold the build's signature.
    pub fn open(bus: B, config: &DriverConfig) -> Result<Self> {
        let map = RegisterMap::new(bus, V::LAYOUT)?;
        if config.verify_signature {
            let found = map.signature()?;
            if found != V::LAYOUT.signature {
                return Err(DriverError::SignatureMismatch {
                    expected: V::LAYOUT.signature,
                    found,
                });
            }
        }
        info!("{} driver ready", V::LAYOUT.kind);
        Ok(Self {
            map,
            poll: PollLoop::new(config.poll),
            state: OpState::Idle,
            _variant: PhantomData,
        })
    }

    /// Open the build's register window on `platform` and bind a driver to it
    ///
    /// # Errors
    ///
    /// As [`Platform::open_bus`] and [`AcceleratorDriver::open`].
    pub fn attach<P>(platform: &P, config: &DriverConfig) -> Result<Self>
    where
        P: Platform<Bus = B>,
    {
        debug!("Attaching {} on {}", V::LAYOUT.kind, platform.name());
        Self::open(platform.open_bus(V::LAYOUT)?, config)
    }

    /// Read the build signature
    ///
    /// # Errors
    ///
    /// Register errors propagate.
    pub fn signature(&self) -> Result<u32> {
        self.map.signature()
    }

    /// Current operation state
    pub const fn state(&self) -> OpState {
        self.state
    }

    /// Register accessor, for diagnostics
    pub const fn registers(&self) -> &RegisterMap<B> {
        &self.map
    }

    /// Polling parameters
    pub const fn poll_loop(&self) -> &PollLoop {
        &self.poll
    }

    /// Release the bus
    pub fn into_bus(self) -> B {
        self.map.into_bus()
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.state == OpState::Wedged {
            return Err(DriverError::Wedged);
        }
        Ok(())
    }
}

impl<B: RegisterBus, V: Triggered> AcceleratorDriver<B, V> {
    /// Validate `job`, program the inputs and hand back the operation guard
    ///
    /// # Errors
    ///
    /// - `Wedged` if an earlier operation timed out and no reset followed
    /// - `OperationInProgress` if a leaked guard left the hardware running
    /// - Variant-specific precondition errors (alignment, sizes); the driver
    ///   stays `Idle` and nothing was written
    pub fn configure<'b>(&mut self, job: V::Job<'b>) -> Result<Operation<'_, 'b, B, V>> {
        match self.state {
            OpState::Idle => {}
            OpState::Wedged => return Err(DriverError::Wedged),
            OpState::Running => return Err(DriverError::OperationInProgress),
            OpState::Configured | OpState::Done => self.settle()?,
        }
        V::program(&mut self.map, &job)?;
        self.state = OpState::Configured;
        debug!("{} configured: {job:?}", V::LAYOUT.kind);
        Ok(Operation { driver: self, job })
    }

    /// Configure, trigger, wait and finish in one call
    ///
    /// # Errors
    ///
    /// Any error of the individual phases.
    pub fn run(&mut self, job: V::Job<'_>) -> Result<V::Output> {
        let mut op = self.configure(job)?;
        op.trigger()?;
        op.wait()?;
        op.finish()
    }

    /// Clear the start bit and return to `Idle`
    ///
    /// This is the only way out of `Wedged`. The caller asserts the hardware
    /// is quiescent: the driver cannot stop an engine that is still running.
    ///
    /// # Errors
    ///
    /// Register errors propagate; the state is unchanged on error.
    pub fn reset(&mut self) -> Result<()> {
        let previous = self.state;
        self.settle()?;
        if previous == OpState::Wedged {
            warn!("{} reset out of wedged state", V::LAYOUT.kind);
        } else {
            debug!("{} reset from {previous}", V::LAYOUT.kind);
        }
        Ok(())
    }

    fn settle(&mut self) -> Result<()> {
        self.map.write(V::START.name, 0)?;
        self.state = OpState::Idle;
        Ok(())
    }
}

/// One in-flight operation
///
/// Mutably borrows its driver for `'d` and holds the job (and with it any
/// borrowed buffer descriptors) for `'b`. Dropping a guard whose operation
/// is still running performs a bounded wait for completion first; if that
/// wait times out, the driver is left `Wedged`.
pub struct Operation<'d, 'b, B: RegisterBus, V: Triggered> {
    driver: &'d mut AcceleratorDriver<B, V>,
    job: V::Job<'b>,
}

impl<B: RegisterBus, V: Triggered> fmt::Debug for Operation<'_, '_, B, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("kind", &V::LAYOUT.kind)
            .field("state", &self.driver.state)
            .field("job", &self.job)
            .finish()
    }
}

impl<'b, B: RegisterBus, V: Triggered> Operation<'_, 'b, B, V> {
    /// Current state of the owning driver
    pub fn state(&self) -> OpState {
        self.driver.state
    }

    /// Job this operation was configured with
    pub fn job(&self) -> &V::Job<'b> {
        &self.job
    }

    /// Raise the start bit
    ///
    /// # Errors
    ///
    /// - `OperationInProgress` if already running
    /// - `CallerPrecondition` if the operation already completed
    /// - `Wedged` after a timeout
    pub fn trigger(&mut self) -> Result<()> {
        match self.driver.state {
            OpState::Configured => {
                self.driver.map.write(V::START.name, 1)?;
                self.driver.state = OpState::Running;
                debug!("{} triggered", V::LAYOUT.kind);
                Ok(())
            }
            OpState::Running => Err(DriverError::OperationInProgress),
            OpState::Done => Err(DriverError::precondition(
                "operation already completed; finish it and configure a new one",
            )),
            OpState::Wedged => Err(DriverError::Wedged),
            state @ OpState::Idle => Err(DriverError::NotReady { state }),
        }
    }

    /// Poll the done bit with the driver's configured timeout
    ///
    /// # Errors
    ///
    /// As [`Operation::wait_for`].
    pub fn wait(&mut self) -> Result<()> {
        let timeout = self.driver.poll.config().timeout;
        self.wait_for(timeout)
    }

    /// Poll the done bit for at most `timeout` (`None` waits forever)
    ///
    /// Returns immediately if completion was already observed.
    ///
    /// # Errors
    ///
    /// - `NotReady` if the operation was never triggered
    /// - `TimedOut` if the bit did not rise in time; the driver is then
    ///   `Wedged` and every later call fails with `Wedged` until
    ///   [`AcceleratorDriver::reset`]
    pub fn wait_for(&mut self, timeout: Option<Duration>) -> Result<()> {
        match self.driver.state {
            OpState::Running => {}
            OpState::Done => return Ok(()),
            OpState::Wedged => return Err(DriverError::Wedged),
            state @ (OpState::Idle | OpState::Configured) => return Err(DriverError::NotReady { state }),
        }
        let driver = &mut *self.driver;
        match driver.poll.wait_until(&driver.map, V::DONE.name, |v| v & 1 == 1, timeout)? {
            PollOutcome::Completed { polls, elapsed } => {
                driver.state = OpState::Done;
                info!("{} completed after {polls} polls ({elapsed:?})", V::LAYOUT.kind);
                Ok(())
            }
            PollOutcome::TimedOut { polls, elapsed } => {
                driver.state = OpState::Wedged;
                warn!(
                    "{} timed out after {polls} polls ({elapsed:?}); driver wedged until reset",
                    V::LAYOUT.kind
                );
                Err(DriverError::timed_out(V::DONE.name, polls, elapsed))
            }
        }
    }

    /// Read the result registers
    ///
    /// # Errors
    ///
    /// `NotReady` unless completion has been observed; `Wedged` after a
    /// timeout.
    pub fn result(&self) -> Result<V::Output> {
        match self.driver.state {
            OpState::Done => V::collect(&self.driver.map, &self.job),
            OpState::Wedged => Err(DriverError::Wedged),
            state => Err(DriverError::NotReady { state }),
        }
    }

    /// Read the result, clear the start bit and return the driver to `Idle`
    ///
    /// Releases the borrow on the job's buffers.
    ///
    /// # Errors
    ///
    /// As [`Operation::result`]; on error the guard is dropped normally.
    pub fn finish(self) -> Result<V::Output> {
        let output = self.result()?;
        self.driver.settle()?;
        Ok(output)
    }
}

impl<B: RegisterBus, V: Triggered> Drop for Operation<'_, '_, B, V> {
    fn drop(&mut self) {
        match self.driver.state {
            OpState::Running => {
                let limit = self.driver.poll.config().timeout.unwrap_or(DROP_WAIT_LIMIT);
                warn!("{} operation dropped while running; waiting up to {limit:?}", V::LAYOUT.kind);
                if self.wait_for(Some(limit)).is_err() {
                    return;
                }
            }
            OpState::Configured | OpState::Done => {}
            OpState::Idle | OpState::Wedged => return,
        }
        if let Err(e) = self.driver.settle() {
            warn!("{} failed to clear start bit on drop: {e}", V::LAYOUT.kind);
        }
    }
}
