//! Monitor registry: the static catalog of diagnostic monitors.
//!
//! The catalog is a closed set defined at compile time. The registry has no
//! behavior beyond lookup; it is consulted once per `start` to seed a
//! monitor's state with its default interval.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;

/// A named, independently scheduled periodic diagnostic probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Monitor {
    /// Humanized elapsed time since the probe set was created.
    Uptime,
    /// Summarized survey of live threads grouped by name and state.
    ThreadSurvey,
    /// Thread census broken down by scheduler state.
    ThreadReport,
    /// Terse current thread count.
    ThreadSummary,
    /// Resident memory footprint of the process.
    MemoryCount,
    /// Thread report and memory footprint combined.
    ThreadsAndMemory,
}

/// Every monitor in the catalog, in catalog order.
pub const ALL_MONITORS: [Monitor; 6] = [
    Monitor::Uptime,
    Monitor::ThreadSurvey,
    Monitor::ThreadReport,
    Monitor::ThreadSummary,
    Monitor::MemoryCount,
    Monitor::ThreadsAndMemory,
];

impl Monitor {
    /// The registry key for this monitor.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Uptime => "uptime",
            Self::ThreadSurvey => "thread_survey",
            Self::ThreadReport => "thread_report",
            Self::ThreadSummary => "thread_summary",
            Self::MemoryCount => "memory_count",
            Self::ThreadsAndMemory => "threads_and_memory",
        }
    }

    /// Default interval between a trigger's completion and the next trigger.
    #[must_use]
    pub const fn default_interval(self) -> Duration {
        match self {
            Self::Uptime => Duration::from_secs(90),
            Self::ThreadSurvey => Duration::from_secs(30),
            Self::ThreadReport => Duration::from_secs(15),
            Self::ThreadSummary => Duration::from_secs(3),
            Self::MemoryCount => Duration::from_secs(13),
            Self::ThreadsAndMemory => Duration::from_secs(45),
        }
    }

    /// Registry lookup by name.
    ///
    /// # Errors
    ///
    /// `SchedulerError::UnknownMonitor` if `name` is not in the catalog.
    pub fn from_name(name: &str) -> Result<Self, SchedulerError> {
        ALL_MONITORS
            .into_iter()
            .find(|m| m.name() == name)
            .ok_or_else(|| SchedulerError::UnknownMonitor {
                name: name.to_string(),
            })
    }
}

impl fmt::Display for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Monitor {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

/// A monitor definition as resolved from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorDef {
    /// The catalog entry.
    pub monitor: Monitor,
    /// Its default interval.
    pub default_interval: Duration,
}

/// Resolves a name to its catalog definition.
///
/// # Errors
///
/// `SchedulerError::UnknownMonitor` if `name` is not in the catalog.
pub fn definition_for(name: &str) -> Result<MonitorDef, SchedulerError> {
    let monitor = Monitor::from_name(name)?;
    Ok(MonitorDef {
        monitor,
        default_interval: monitor.default_interval(),
    })
}
