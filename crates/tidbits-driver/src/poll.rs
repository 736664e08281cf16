//! Busy-wait completion polling
//!
//! The accelerators have no interrupt path, so completion is observed by
//! reading a status register until a predicate holds. Every wait is bounded
//! by a timeout unless the caller explicitly passes `None`.

use crate::bus::RegisterBus;
use crate::error::Result;
use crate::regmap::RegisterMap;
use std::time::{Duration, Instant};

/// Default bound on a single wait
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Polling parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Give up after this long; `None` polls forever
    pub timeout: Option<Duration>,
    /// Sleep between status reads; `None` spins
    pub interval: Option<Duration>,
    /// Yield the thread every this many spins (ignored when sleeping)
    pub yield_every: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            timeout: Some(DEFAULT_TIMEOUT),
            interval: None,
            yield_every: 1_000,
        }
    }
}

/// How a wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Predicate satisfied
    Completed {
        /// Status reads performed, including the successful one
        polls: u64,
        /// Time spent waiting
        elapsed: Duration,
    },
    /// Timeout expired first
    TimedOut {
        /// Status reads performed
        polls: u64,
        /// Time spent waiting
        elapsed: Duration,
    },
}

impl PollOutcome {
    /// Whether the predicate was satisfied
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// Status reads performed
    pub const fn polls(&self) -> u64 {
        match self {
            Self::Completed { polls, .. } | Self::TimedOut { polls, .. } => *polls,
        }
    }
}

/// Completion poller
#[derive(Debug, Clone, Copy, Default)]
pub struct PollLoop {
    config: PollConfig,
}

impl PollLoop {
    /// Create a poller with the given parameters
    pub const fn new(config: PollConfig) -> Self {
        Self { config }
    }

    /// Active parameters
    pub const fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Read `register` until `predicate` accepts its value or `timeout` expires
    ///
    /// The register is read at least once even with a zero timeout.
    ///
    /// # Errors
    ///
    /// Propagates register access errors (`InvalidRegister`,
    /// `AccessViolation`). A timeout is not an error here; it is reported as
    /// [`PollOutcome::TimedOut`].
    pub fn wait_until<B, F>(
        &self,
        map: &RegisterMap<B>,
        register: &str,
        mut predicate: F,
        timeout: Option<Duration>,
    ) -> Result<PollOutcome>
    where
        B: RegisterBus,
        F: FnMut(u64) -> bool,
    {
        let start = Instant::now();
        let mut polls: u64 = 0;
        loop {
            let value = map.read(register)?;
            polls += 1;
            if predicate(value) {
                return Ok(PollOutcome::Completed {
                    polls,
                    elapsed: start.elapsed(),
                });
            }

            let elapsed = start.elapsed();
            if timeout.is_some_and(|limit| elapsed >= limit) {
                return Ok(PollOutcome::TimedOut { polls, elapsed });
            }

            match self.config.interval {
                Some(interval) => std::thread::sleep(interval),
                None => {
                    if self.config.yield_every > 0 && polls % u64::from(self.config.yield_every) == 0 {
                        std::thread::yield_now();
                    }
                }
            }
        }
    }

    /// Wait for bit 0 of `register` to read 1, using the configured timeout
    ///
    /// # Errors
    ///
    /// As [`PollLoop::wait_until`].
    pub fn wait_for_bit<B: RegisterBus>(&self, map: &RegisterMap<B>, register: &str) -> Result<PollOutcome> {
        self.wait_until(map, register, |v| v & 1 == 1, self.config.timeout)
    }
}
