//! Reporting sinks.
//!
//! The scheduler forwards every probe result and fault report through a
//! `Sink` supplied by the host. Sinks are best-effort: when a write fails the
//! scheduler degrades to a timestamped line on the process's standard
//! streams and keeps scheduling.

use chrono::{DateTime, Local};

use crate::error::SinkError;

/// Reporting destination for monitor output.
///
/// Implementations must tolerate interleaved calls from different monitors'
/// trigger cycles. A failing write is contained by the scheduler; it never
/// destabilizes the calling monitor.
pub trait Sink: Send + Sync {
    /// Writes one line of monitor output.
    ///
    /// `source` is a fixed tag identifying the scheduler as the origin.
    ///
    /// # Errors
    ///
    /// `SinkError` when the line could not be delivered.
    fn write(&self, text: &str, source: &str) -> Result<(), SinkError>;
}

/// Sink that writes the timestamped plain format to stderr and stdout.
///
/// This is the same format the scheduler falls back to when a host-supplied
/// sink fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdStreamSink;

impl Sink for StdStreamSink {
    fn write(&self, text: &str, _source: &str) -> Result<(), SinkError> {
        fallback_write(text);
        Ok(())
    }
}

/// Sink that emits monitor output as `tracing` info events.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl Sink for LogSink {
    fn write(&self, text: &str, source: &str) -> Result<(), SinkError> {
        tracing::info!(source, "{text}");
        Ok(())
    }
}

/// Writes the fallback line to both standard streams.
pub(crate) fn fallback_write(message: &str) {
    let line = fallback_line(Local::now(), message);
    eprintln!("{line}");
    println!("{line}");
}

fn fallback_line(at: DateTime<Local>, message: &str) -> String {
    format!("*, [{}] {}", at.format("%Y-%m-%dT%H:%M:%S%.3f"), message)
}
