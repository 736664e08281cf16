//! Driver configuration
//!
//! Defaults are safe for every build: a one second completion timeout,
//! spin-polling, and a signature check on open. Deployments override them
//! through the environment:
//!
//! | Variable | Meaning |
//! |----------|---------|
//! | `TIDBITS_POLL_TIMEOUT_MS` | Completion timeout; `0` polls forever |
//! | `TIDBITS_POLL_INTERVAL_US` | Sleep between status reads; `0` spins |
//! | `TIDBITS_POLL_YIELD_EVERY` | Spins between `yield_now` calls |
//! | `TIDBITS_VERIFY_SIGNATURE` | `0`/`false` skips the signature check |

use crate::error::{DriverError, Result};
use crate::poll::PollConfig;
use std::str::FromStr;
use std::time::Duration;

/// Completion timeout variable
pub const ENV_POLL_TIMEOUT_MS: &str = "TIDBITS_POLL_TIMEOUT_MS";
/// Poll interval variable
pub const ENV_POLL_INTERVAL_US: &str = "TIDBITS_POLL_INTERVAL_US";
/// Yield cadence variable
pub const ENV_POLL_YIELD_EVERY: &str = "TIDBITS_POLL_YIELD_EVERY";
/// Signature check variable
pub const ENV_VERIFY_SIGNATURE: &str = "TIDBITS_VERIFY_SIGNATURE";

/// Per-instance driver settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverConfig {
    /// Completion polling parameters
    pub poll: PollConfig,
    /// Compare the signature register with the layout's on open
    pub verify_signature: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            poll: PollConfig::default(),
            verify_signature: true,
        }
    }
}

impl DriverConfig {
    /// Defaults overridden by `TIDBITS_*` environment variables
    ///
    /// # Errors
    ///
    /// Returns `CallerPrecondition` naming the variable if a value does not
    /// parse.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable
    ///
    /// # Errors
    ///
    /// As [`DriverConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(ms) = parse::<u64, _>(&lookup, ENV_POLL_TIMEOUT_MS)? {
            config.poll.timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(us) = parse::<u64, _>(&lookup, ENV_POLL_INTERVAL_US)? {
            config.poll.interval = (us > 0).then(|| Duration::from_micros(us));
        }
        if let Some(n) = parse::<u32, _>(&lookup, ENV_POLL_YIELD_EVERY)? {
            config.poll.yield_every = n;
        }
        if let Some(raw) = lookup(ENV_VERIFY_SIGNATURE) {
            config.verify_signature = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => {
                    return Err(DriverError::precondition(format!(
                        "{ENV_VERIFY_SIGNATURE}={other} is not a boolean"
                    )))
                }
            };
        }

        if config.poll.timeout.is_none() {
            tracing::warn!("Completion timeout disabled; a hung accelerator will block forever");
        }
        Ok(config)
    }

    /// Replace the completion timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.poll.timeout = timeout;
        self
    }

    /// Replace the polling parameters
    #[must_use]
    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Enable or skip the signature check
    #[must_use]
    pub fn with_signature_check(mut self, verify: bool) -> Self {
        self.verify_signature = verify;
        self
    }
}

fn parse<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| DriverError::precondition(format!("{key}={raw}: {e}")))
        })
        .transpose()
}
