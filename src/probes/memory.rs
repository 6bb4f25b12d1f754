//! Resident memory footprint of the current process.
//!
//! Reads `VmRSS` from `/proc/self/status` instead of scraping external
//! tooling, so the numeric parsing is exact and testable. Platforms without
//! procfs report `ProbeError::Unsupported`.

use std::fs;

use crate::error::ProbeError;

/// Samples the resident set size and renders it for display.
///
/// # Errors
///
/// `Unsupported` when procfs is unavailable, `Failed` when the status file
/// carries no `VmRSS` line.
pub fn footprint() -> Result<String, ProbeError> {
    let status = fs::read_to_string("/proc/self/status")
        .map_err(|err| ProbeError::unsupported(format!("cannot read /proc/self/status: {err}")))?;
    let kb = parse_vm_rss(&status)
        .ok_or_else(|| ProbeError::failed("VmRSS not present in /proc/self/status"))?;
    Ok(format_footprint(kb))
}

/// Extracts the `VmRSS` value in kilobytes from `/proc/self/status` text.
#[must_use]
pub fn parse_vm_rss(status: &str) -> Option<u64> {
    status
        .lines()
        .find(|line| line.starts_with("VmRSS:"))?
        .split_whitespace()
        .nth(1)?
        .parse()
        .ok()
}

/// Renders a kilobyte count as a two-decimal mb/gb display string.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_footprint(kb: u64) -> String {
    let mb = kb as f64 / 1024.0;
    if mb >= 1024.0 {
        format!("Memory: {:.2}gb", mb / 1024.0)
    } else {
        format!("Memory: {mb:.2}mb")
    }
}
