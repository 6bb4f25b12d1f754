//! Thread census probes.
//!
//! Samples every task of the current process from `/proc/self/task/*/stat`.
//! The stat-line parsing and the three renderings (terse count, state
//! census, grouped survey) are pure functions over the samples.

use std::collections::BTreeMap;
use std::fs;

use crate::error::ProbeError;

/// One sampled thread: its name (comm) and single-letter scheduler state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSample {
    /// Thread name.
    pub name: String,
    /// Kernel state letter (R, S, D, Z, T, ...).
    pub state: char,
}

/// Terse current thread count.
///
/// # Errors
///
/// `Unsupported` without procfs; `Failed` when no task is readable.
pub fn summary() -> Result<String, ProbeError> {
    Ok(format!(" {} ", samples()?.len()))
}

/// Thread census broken down by scheduler state.
///
/// # Errors
///
/// `Unsupported` without procfs; `Failed` when no task is readable.
pub fn report() -> Result<String, ProbeError> {
    Ok(format_report(&census(&samples()?)))
}

/// Summarized survey grouping threads by name and state.
///
/// # Errors
///
/// `Unsupported` without procfs; `Failed` when no task is readable.
pub fn survey() -> Result<String, ProbeError> {
    Ok(format_survey(&samples()?))
}

fn samples() -> Result<Vec<TaskSample>, ProbeError> {
    let tasks = fs::read_dir("/proc/self/task")
        .map_err(|err| ProbeError::unsupported(format!("cannot read /proc/self/task: {err}")))?;

    let mut out = Vec::new();
    for entry in tasks {
        let entry = entry.map_err(|err| ProbeError::failed(err.to_string()))?;
        // Tasks may exit between readdir and read; skip the gaps.
        let Ok(stat) = fs::read_to_string(entry.path().join("stat")) else {
            continue;
        };
        if let Some(sample) = parse_stat(&stat) {
            out.push(sample);
        }
    }

    if out.is_empty() {
        return Err(ProbeError::failed("no task records readable"));
    }
    Ok(out)
}

/// Parses one `/proc/<pid>/task/<tid>/stat` line into a sample.
///
/// The comm field is parenthesized and may itself contain spaces or
/// parentheses, so the state letter is located after the *last* `)`.
#[must_use]
pub fn parse_stat(stat: &str) -> Option<TaskSample> {
    let open = stat.find('(')?;
    let close = stat.rfind(')')?;
    let name = stat.get(open + 1..close)?.to_string();
    let state = stat
        .get(close + 1..)?
        .split_whitespace()
        .next()?
        .chars()
        .next()?;
    Some(TaskSample { name, state })
}

/// Thread counts per scheduler state.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Census {
    /// All sampled threads.
    pub total: usize,
    /// Running (R).
    pub running: usize,
    /// Sleeping (S).
    pub sleeping: usize,
    /// Uninterruptible wait (D).
    pub uninterruptible: usize,
    /// Zombie (Z).
    pub zombie: usize,
    /// Stopped or traced (T/t).
    pub stopped: usize,
    /// Anything else (e.g. idle kernel threads).
    pub other: usize,
}

/// Tallies samples into a census.
#[must_use]
pub fn census(samples: &[TaskSample]) -> Census {
    let mut out = Census {
        total: samples.len(),
        ..Census::default()
    };
    for sample in samples {
        match sample.state {
            'R' => out.running += 1,
            'S' => out.sleeping += 1,
            'D' => out.uninterruptible += 1,
            'Z' => out.zombie += 1,
            'T' | 't' => out.stopped += 1,
            _ => out.other += 1,
        }
    }
    out
}

/// Renders a census as a single report line.
#[must_use]
pub fn format_report(census: &Census) -> String {
    let mut line = format!(
        "Threads {}: {}r {}s {}d {}z {}t",
        census.total,
        census.running,
        census.sleeping,
        census.uninterruptible,
        census.zombie,
        census.stopped,
    );
    if census.other > 0 {
        line.push_str(&format!(" {}?", census.other));
    }
    line
}

/// Renders samples grouped by name and state, largest groups first in
/// deterministic order.
#[must_use]
pub fn format_survey(samples: &[TaskSample]) -> String {
    let mut groups: BTreeMap<(&str, char), usize> = BTreeMap::new();
    for sample in samples {
        *groups.entry((sample.name.as_str(), sample.state)).or_default() += 1;
    }

    let mut entries: Vec<((&str, char), usize)> = groups.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let parts: Vec<String> = entries
        .into_iter()
        .map(|((name, state), count)| format!("{count}x {name}[{state}]"))
        .collect();

    format!("Survey of {} threads: {}", samples.len(), parts.join(", "))
}
