//! # selfmon - in-process self-monitoring scheduler
//!
//! selfmon runs a fixed catalog of named diagnostic probes (thread census,
//! memory footprint, uptime, thread surveys) on independent periodic
//! schedules inside a long-lived host process, reporting each result through
//! a pluggable sink.
//!
//! ## Core ideas
//!
//! - **Monitor**: a named, independently scheduled periodic diagnostic probe
//!   from a closed catalog.
//! - **Delay-after-completion scheduling**: the next execution is armed
//!   relative to the end of the previous one, never on a fixed wall-clock
//!   grid, so a slow probe throttles its own frequency.
//! - **Fault isolation**: a failing (or panicking) probe is reported once
//!   and swallowed; it never disables the scheduler or sibling monitors.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use selfmon::{LogSink, Scheduler, SchedulerOptions, SystemProbes};
//!
//! let scheduler = Scheduler::launch(
//!     Arc::new(SystemProbes::new()),
//!     Arc::new(LogSink),
//!     SchedulerOptions {
//!         monitors: Some(vec!["thread_summary".into(), "memory_count".into()]),
//!         mark: false,
//!     },
//! );
//!
//! // ... host runs; monitors report on their own cadence ...
//!
//! scheduler.stop("thread_summary")?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod probes;
pub mod registry;
pub mod scheduler;
pub mod sink;
pub mod state;

pub use error::{ProbeError, SchedulerError, SelfmonError, SelfmonResult, SinkError};
pub use probes::{ProbeSet, SystemProbes};
pub use registry::{definition_for, Monitor, MonitorDef, ALL_MONITORS};
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerOptions, SOURCE_TAG};
pub use sink::{LogSink, Sink, StdStreamSink};
pub use state::MonitorStatus;
