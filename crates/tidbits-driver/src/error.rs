//! Error types for accelerator driver operations

use crate::driver::OpState;
use std::time::Duration;
use thiserror::Error;
use tidbits_regs::{Access, AcceleratorKind};

/// Result type alias for driver operations
pub type Result<T> = std::result::Result<T, DriverError>;

/// Direction of a rejected register access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    /// Host read
    Read,
    /// Host write
    Write,
}

impl std::fmt::Display for AccessKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
        }
    }
}

/// Errors that can occur while driving an accelerator
///
/// Every variant except [`DriverError::Wedged`] leaves the driver instance
/// usable. None of them are retried by the driver.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Register name not present in the variant's layout
    #[error("Unknown register '{name}' on {kind}")]
    InvalidRegister {
        /// Requested register name
        name: String,
        /// Variant whose layout was searched
        kind: AcceleratorKind,
    },

    /// Read of a write-only register or write of a read-only one
    #[error("Cannot {attempted} {access} register '{register}'")]
    AccessViolation {
        /// Register name
        register: &'static str,
        /// Declared access mode
        access: Access,
        /// Rejected direction
        attempted: AccessKind,
    },

    /// Byte count not a whole number of streaming bursts
    #[error("Byte count {byte_count} is not a multiple of {alignment} bytes")]
    AlignmentError {
        /// Requested byte count
        byte_count: usize,
        /// Required alignment in bytes
        alignment: usize,
    },

    /// Result requested before completion was observed
    #[error("Result not ready (operation is {state})")]
    NotReady {
        /// Driver state at the time of the request
        state: OpState,
    },

    /// Start requested while an operation is already running
    #[error("An operation is already in progress")]
    OperationInProgress,

    /// Completion bit not observed within the poll timeout
    #[error("Timed out after {duration_ms}ms ({polls} polls) waiting for '{register}'")]
    TimedOut {
        /// Status register being polled
        register: &'static str,
        /// Number of status reads performed
        polls: u64,
        /// Time spent polling in milliseconds
        duration_ms: u64,
    },

    /// Caller violated a documented precondition
    #[error("Precondition violated: {reason}")]
    CallerPrecondition {
        /// What was violated
        reason: String,
    },

    /// A previous operation timed out; the instance needs a reset
    #[error("Accelerator is wedged after a timeout; reset required")]
    Wedged,

    /// Signature register does not match the expected build
    #[error("Signature mismatch: expected {expected:#010x}, found {found:#010x}")]
    SignatureMismatch {
        /// Signature of the layout the driver was built for
        expected: u32,
        /// Signature read from hardware
        found: u32,
    },

    /// I/O error while opening a device or sysfs attribute
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },

    /// Register window could not be mapped
    #[error("Register mapping failed: {reason}")]
    MapFailed {
        /// Reason for failure
        reason: String,
    },

    /// Physical buffer allocation failed
    #[error("Buffer allocation failed: {reason}")]
    AllocationFailed {
        /// Reason for failure
        reason: String,
    },
}

impl DriverError {
    /// Create an invalid register error
    pub fn invalid_register(name: impl Into<String>, kind: AcceleratorKind) -> Self {
        Self::InvalidRegister {
            name: name.into(),
            kind,
        }
    }

    /// Create a timeout error
    pub fn timed_out(register: &'static str, polls: u64, elapsed: Duration) -> Self {
        Self::TimedOut {
            register,
            polls,
            duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Create a caller precondition error
    pub fn precondition(reason: impl Into<String>) -> Self {
        Self::CallerPrecondition {
            reason: reason.into(),
        }
    }

    /// Create a mapping error
    pub fn map_failed(reason: impl Into<String>) -> Self {
        Self::MapFailed {
            reason: reason.into(),
        }
    }

    /// Create an allocation error
    pub fn allocation_failed(reason: impl Into<String>) -> Self {
        Self::AllocationFailed {
            reason: reason.into(),
        }
    }

    /// Whether the driver instance must be reset before further use
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Wedged)
    }
}
