//! Concrete measurement probes.
//!
//! The scheduler invokes probes opaquely through the `ProbeSet` trait:
//! produce a display string or fail. The default `SystemProbes` samples the
//! current process through procfs; each sampler keeps its parsing isolated
//! in a pure function so it can be unit-tested on captured text without
//! touching the scheduler.

use std::time::Instant;

use crate::error::ProbeError;
use crate::registry::Monitor;

pub mod memory;
pub mod threads;
pub mod uptime;

/// The collection of measurement functions behind the monitor catalog.
///
/// Each registered monitor maps to a zero-argument operation returning a
/// display string or failing with a fault. The scheduler treats the body as
/// opaque: faults are reported once and swallowed.
pub trait ProbeSet: Send + Sync {
    /// Runs the probe for `monitor`.
    ///
    /// # Errors
    ///
    /// Any `ProbeError`; the scheduler contains it to the current cycle.
    fn run(&self, monitor: Monitor) -> Result<String, ProbeError>;
}

/// Default probe set sampling the current process.
#[derive(Debug)]
pub struct SystemProbes {
    started: Instant,
}

impl SystemProbes {
    /// Creates a probe set; uptime is measured from this moment.
    #[must_use]
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for SystemProbes {
    fn default() -> Self {
        Self::new()
    }
}

impl ProbeSet for SystemProbes {
    fn run(&self, monitor: Monitor) -> Result<String, ProbeError> {
        match monitor {
            Monitor::Uptime => Ok(uptime::report(self.started.elapsed())),
            Monitor::ThreadSurvey => threads::survey(),
            Monitor::ThreadReport => threads::report(),
            Monitor::ThreadSummary => threads::summary(),
            Monitor::MemoryCount => memory::footprint(),
            Monitor::ThreadsAndMemory => {
                Ok(format!("{}; {}", threads::report()?, memory::footprint()?))
            }
        }
    }
}
