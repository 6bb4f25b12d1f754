//! Error types for selfmon.
//!
//! All errors are strongly typed using thiserror and grouped by the concern
//! that raises them. Probe and sink faults are contained to the trigger cycle
//! that produced them and never escape the scheduler; only scheduler errors
//! surface through the public API.

use thiserror::Error;

/// Errors raised by the scheduler's public operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The requested monitor name is not in the registry.
    #[error("Unknown monitor: {name}")]
    UnknownMonitor {
        /// The name that failed registry lookup.
        name: String,
    },

    /// The control queue is full; the request was not enqueued.
    #[error("Scheduler control queue is full (capacity: {capacity})")]
    QueueFull {
        /// Configured queue capacity.
        capacity: usize,
    },

    /// The scheduler worker has shut down.
    #[error("Scheduler worker disconnected")]
    Disconnected,
}

/// Faults raised by probe bodies during execution.
///
/// The scheduler treats probes as opaque: any of these is reported to the
/// sink once, tagged with the monitor name, and swallowed. The monitor is
/// not stopped and rescheduling continues.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The probe ran but could not produce a result.
    #[error("Probe failed: {message}")]
    Failed {
        /// Human-readable fault description.
        message: String,
    },

    /// The probe is not available on this platform.
    #[error("Probe unsupported: {reason}")]
    Unsupported {
        /// Why the platform cannot serve this probe.
        reason: String,
    },

    /// The probe panicked; the panic was caught at the trigger boundary.
    #[error("Probe panicked: {message}")]
    Panicked {
        /// The panic payload, when it was a string.
        message: String,
    },
}

impl ProbeError {
    /// Creates a `Failed` fault from any displayable cause.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Creates an `Unsupported` fault.
    #[must_use]
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::Unsupported {
            reason: reason.into(),
        }
    }
}

/// Faults raised by the reporting path.
///
/// Caught by the scheduler and degraded to the timestamped fallback output;
/// never propagated to the probe's caller.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The sink could not write the line.
    #[error("Sink write failed: {message}")]
    Write {
        /// Human-readable failure description.
        message: String,
    },
}

impl SinkError {
    /// Creates a `Write` failure from any displayable cause.
    #[must_use]
    pub fn write(message: impl Into<String>) -> Self {
        Self::Write {
            message: message.into(),
        }
    }
}

/// Top-level error type for selfmon.
#[derive(Debug, Error)]
pub enum SelfmonError {
    /// Scheduler error.
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Probe fault.
    #[error("Probe error: {0}")]
    Probe(#[from] ProbeError),

    /// Sink fault.
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),
}

impl SelfmonError {
    /// Returns true if this is a scheduler error.
    #[must_use]
    pub const fn is_scheduler(&self) -> bool {
        matches!(self, Self::Scheduler(_))
    }

    /// Returns true if this is a probe fault.
    #[must_use]
    pub const fn is_probe(&self) -> bool {
        matches!(self, Self::Probe(_))
    }

    /// Returns true if this is a sink fault.
    #[must_use]
    pub const fn is_sink(&self) -> bool {
        matches!(self, Self::Sink(_))
    }
}

/// Result type alias for selfmon operations.
pub type SelfmonResult<T> = Result<T, SelfmonError>;
