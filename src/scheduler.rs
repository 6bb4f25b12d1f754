//! The periodic-monitor scheduling engine.
//!
//! One dedicated worker thread owns every `MonitorState` and processes
//! start/stop requests and timer expiries run-to-completion, in order, off a
//! bounded control queue. Timer expiry is realized as the worker's own
//! receive deadline over the earliest pending re-trigger, so a monitor's
//! wait never blocks another monitor's trigger while executions stay
//! strictly serialized.
//!
//! Rescheduling is delay-after-completion: the next trigger is armed
//! `interval` after the previous execution (probe, sink write and fault
//! handling included) finished. A slow probe therefore throttles its own
//! frequency instead of piling up firings.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use serde::{Deserialize, Serialize};

use crate::error::{ProbeError, SchedulerError};
use crate::probes::{uptime, ProbeSet};
use crate::registry::{self, Monitor};
use crate::sink::{self, Sink};
use crate::state::{MonitorState, MonitorStatus, StatusCell};

/// Fixed tag identifying the scheduler as the source of a sink write.
pub const SOURCE_TAG: &str = "Selfmon";

const MARK_PREFIX: &str = "Selfmon > ";

/// Floor for effective intervals. A zero or near-zero interval would retrigger
/// continuously; like the queue-capacity floor, it is normalized rather than
/// rejected.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Scheduler tuning knobs.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Max queued control messages (start/stop) before callers see
    /// `QueueFull`.
    pub queue_capacity: usize,
    /// Prefix every output line with the scheduler mark.
    pub mark: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            mark: false,
        }
    }
}

/// Host-facing launch options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerOptions {
    /// Ordered list of monitor names to activate. `None` activates nothing
    /// and logs a diagnostic; this is a configuration validation boundary,
    /// not an error.
    pub monitors: Option<Vec<String>>,
    /// Prefix every output line with the scheduler mark.
    #[serde(default)]
    pub mark: bool,
}

enum Command {
    Start {
        monitor: Monitor,
        interval: Duration,
        cell: Arc<StatusCell>,
    },
    Stop {
        monitor: Monitor,
    },
}

type CellMap = Arc<Mutex<HashMap<Monitor, Arc<StatusCell>>>>;

/// Generates the per-catalog-entry ergonomic aliases over
/// `start(name)`/`stop(name)`. No additional semantics.
macro_rules! monitor_aliases {
    ($(($start:ident, $stop:ident, $name:literal)),+ $(,)?) => {
        $(
            #[doc = concat!("Starts the `", $name, "` monitor with its default interval.")]
            ///
            /// # Errors
            ///
            /// Same as [`Scheduler::start`].
            pub fn $start(&self) -> Result<(), SchedulerError> {
                self.start($name)
            }

            #[doc = concat!("Stops the `", $name, "` monitor.")]
            ///
            /// # Errors
            ///
            /// Same as [`Scheduler::stop`].
            pub fn $stop(&self) -> Result<(), SchedulerError> {
                self.stop($name)
            }
        )+
    };
}

/// Handle to a running scheduler.
///
/// Returned by [`Scheduler::launch`]/[`Scheduler::new`]; the host passes it
/// to whoever needs to issue stop or status calls. Dropping the handle shuts
/// the worker down: the control queue is closed and the worker joined after
/// any in-flight trigger finishes.
pub struct Scheduler {
    control_tx: Sender<Command>,
    cells: CellMap,
    queue_capacity: usize,
    join: Option<JoinHandle<()>>,
}

impl Scheduler {
    /// Starts the scheduler worker without activating any monitor.
    ///
    /// # Panics
    ///
    /// Panics if the worker thread cannot be spawned.
    #[must_use]
    pub fn new(probes: Arc<dyn ProbeSet>, sink: Arc<dyn Sink>, config: SchedulerConfig) -> Self {
        let queue_capacity = config.queue_capacity.max(1);
        let (control_tx, control_rx) = bounded::<Command>(queue_capacity);
        let cells: CellMap = Arc::new(Mutex::new(HashMap::new()));

        let worker = Worker {
            probes,
            sink,
            mark: if config.mark { MARK_PREFIX } else { "" },
            active: HashMap::new(),
        };
        let join = thread::Builder::new()
            .name("selfmon-scheduler".to_string())
            .spawn(move || worker.run(&control_rx))
            .expect("failed to spawn selfmon scheduler worker");

        Self {
            control_tx,
            cells,
            queue_capacity,
            join: Some(join),
        }
    }

    /// Starts the scheduler and activates the monitors named in `options`.
    ///
    /// Unknown names are logged and skipped without affecting siblings. An
    /// absent monitor list activates nothing (logged, not an error).
    #[must_use]
    pub fn launch(
        probes: Arc<dyn ProbeSet>,
        sink: Arc<dyn Sink>,
        options: SchedulerOptions,
    ) -> Self {
        let scheduler = Self::new(
            probes,
            sink,
            SchedulerConfig {
                mark: options.mark,
                ..SchedulerConfig::default()
            },
        );

        let Some(names) = options.monitors else {
            tracing::warn!("no monitors specified, scheduler started idle");
            return scheduler;
        };

        for name in &names {
            match registry::definition_for(name) {
                Ok(def) => {
                    tracing::debug!(
                        monitor = %def.monitor,
                        every = %uptime::humanize(def.default_interval),
                        "activating monitor",
                    );
                    if let Err(err) = scheduler.start(name) {
                        tracing::warn!(monitor = name.as_str(), error = %err, "failed to start monitor");
                    }
                }
                Err(err) => {
                    tracing::warn!(monitor = name.as_str(), error = %err, "skipping unknown monitor");
                }
            }
        }

        scheduler
    }

    /// Starts `name` with its default interval.
    ///
    /// Starting an already-active monitor replaces its state and restarts
    /// its cycle (redefine and relaunch, not an error). The first trigger
    /// runs asynchronously; this call does not block on it.
    ///
    /// # Errors
    ///
    /// `UnknownMonitor` if `name` is not in the registry (no state is
    /// created); `QueueFull`/`Disconnected` if the control queue rejects the
    /// request.
    pub fn start(&self, name: &str) -> Result<(), SchedulerError> {
        let def = registry::definition_for(name)?;
        self.activate(def.monitor, def.default_interval)
    }

    /// Starts `name` with an explicit interval override.
    ///
    /// Intervals below one millisecond are normalized up to that floor.
    ///
    /// # Errors
    ///
    /// Same as [`Scheduler::start`].
    pub fn start_with_interval(
        &self,
        name: &str,
        interval: Duration,
    ) -> Result<(), SchedulerError> {
        let def = registry::definition_for(name)?;
        self.activate(def.monitor, interval)
    }

    /// Stops `name`: marks it stopped and cancels its pending timer.
    ///
    /// Stopping a monitor that was never started, or an unknown name, is a
    /// harmless no-op. An in-flight trigger is allowed to finish but will
    /// observe the stopped status and refuse to rearm.
    ///
    /// # Errors
    ///
    /// `QueueFull`/`Disconnected` if the control queue rejects the request.
    pub fn stop(&self, name: &str) -> Result<(), SchedulerError> {
        let Ok(monitor) = Monitor::from_name(name) else {
            tracing::debug!(monitor = name, "stop requested for unknown monitor, ignoring");
            return Ok(());
        };

        let cell = {
            let cells = lock(&self.cells);
            cells.get(&monitor).map(Arc::clone)
        };
        let Some(cell) = cell else {
            return Ok(());
        };

        // Stop wins immediately, even against a trigger mid-execution; the
        // worker command below only cleans up the timer and state record.
        cell.set(MonitorStatus::Stopped);
        self.send(Command::Stop { monitor })
    }

    /// Guarded read of a monitor's lifecycle status.
    ///
    /// A monitor that was never started reports `Uninitialized`.
    #[must_use]
    pub fn status(&self, monitor: Monitor) -> MonitorStatus {
        let cells = lock(&self.cells);
        cells
            .get(&monitor)
            .map_or(MonitorStatus::Uninitialized, |cell| cell.get())
    }

    /// Whether the monitor is idle between triggers.
    #[must_use]
    pub fn is_ready(&self, monitor: Monitor) -> bool {
        self.status(monitor) == MonitorStatus::Ready
    }

    /// Whether the monitor's probe is executing right now.
    #[must_use]
    pub fn is_running(&self, monitor: Monitor) -> bool {
        self.status(monitor) == MonitorStatus::Running
    }

    /// Whether the monitor has been stopped.
    #[must_use]
    pub fn is_stopped(&self, monitor: Monitor) -> bool {
        self.status(monitor) == MonitorStatus::Stopped
    }

    monitor_aliases! {
        (start_uptime, stop_uptime, "uptime"),
        (start_thread_survey, stop_thread_survey, "thread_survey"),
        (start_thread_report, stop_thread_report, "thread_report"),
        (start_thread_summary, stop_thread_summary, "thread_summary"),
        (start_memory_count, stop_memory_count, "memory_count"),
        (start_threads_and_memory, stop_threads_and_memory, "threads_and_memory"),
    }

    fn activate(&self, monitor: Monitor, interval: Duration) -> Result<(), SchedulerError> {
        let interval = interval.max(MIN_INTERVAL);
        let cell = StatusCell::initializing();

        // Install the cell before enqueueing so a query issued right after
        // this call returns never observes `Uninitialized`.
        let previous = {
            let mut cells = lock(&self.cells);
            cells.insert(monitor, Arc::clone(&cell))
        };

        let result = self.send(Command::Start {
            monitor,
            interval,
            cell: Arc::clone(&cell),
        });

        if result.is_err() {
            // A failed start leaves no state behind.
            let mut cells = lock(&self.cells);
            if cells.get(&monitor).is_some_and(|current| Arc::ptr_eq(current, &cell)) {
                match previous {
                    Some(prev) => {
                        cells.insert(monitor, prev);
                    }
                    None => {
                        cells.remove(&monitor);
                    }
                }
            }
        }
        result
    }

    fn send(&self, command: Command) -> Result<(), SchedulerError> {
        match self.control_tx.try_send(command) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(SchedulerError::QueueFull {
                capacity: self.queue_capacity,
            }),
            Err(TrySendError::Disconnected(_)) => Err(SchedulerError::Disconnected),
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        // Close the control queue so the worker exits its loop, then join.
        // An in-flight trigger runs to completion first.
        let (dummy_tx, _) = bounded::<Command>(1);
        drop(std::mem::replace(&mut self.control_tx, dummy_tx));
        if let Some(handle) = self.join.take() {
            let _ = handle.join();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Worker {
    probes: Arc<dyn ProbeSet>,
    sink: Arc<dyn Sink>,
    mark: &'static str,
    active: HashMap<Monitor, MonitorState>,
}

impl Worker {
    fn run(mut self, control_rx: &Receiver<Command>) {
        loop {
            let next_deadline = self
                .active
                .values()
                .filter_map(|state| state.timer.map(|timer| timer.deadline))
                .min();

            let command = match next_deadline {
                Some(deadline) => {
                    let timeout = deadline.saturating_duration_since(Instant::now());
                    match control_rx.recv_timeout(timeout) {
                        Ok(command) => Some(command),
                        Err(RecvTimeoutError::Timeout) => None,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match control_rx.recv() {
                    Ok(command) => Some(command),
                    Err(_) => break,
                },
            };

            match command {
                Some(Command::Start {
                    monitor,
                    interval,
                    cell,
                }) => self.handle_start(monitor, interval, cell),
                Some(Command::Stop { monitor }) => self.handle_stop(monitor),
                None => {}
            }

            self.fire_due_triggers();
        }
    }

    fn handle_start(&mut self, monitor: Monitor, interval: Duration, cell: Arc<StatusCell>) {
        let mut state = MonitorState::new(interval, cell);
        // Seed the first trigger, then mark ready so it may execute.
        state.arm_now(Instant::now());
        if state.status.transition(MonitorStatus::Initializing, MonitorStatus::Ready) {
            tracing::debug!(monitor = %monitor, "monitor started");
            // Replaces any prior state, superseding its pending timer.
            self.active.insert(monitor, state);
        } else {
            // Stopped before the worker got here; never activate.
            tracing::debug!(monitor = %monitor, "monitor stopped before first trigger");
        }
    }

    fn handle_stop(&mut self, monitor: Monitor) {
        if let Some(mut state) = self.active.remove(&monitor) {
            state.cancel_timer();
            state.status.set(MonitorStatus::Stopped);
            tracing::debug!(monitor = %monitor, "monitor stopped");
        }
    }

    /// Fires every trigger due at entry, once each. Entries rearmed during
    /// this pass wait for the next loop iteration, so back-to-back triggers
    /// always interleave with the control queue and a hot monitor cannot
    /// starve sibling start/stop requests.
    fn fire_due_triggers(&mut self) {
        let now = Instant::now();
        let due: Vec<Monitor> = self
            .active
            .iter()
            .filter(|(_, state)| state.timer.is_some_and(|timer| timer.deadline <= now))
            .map(|(monitor, _)| *monitor)
            .collect();
        for monitor in due {
            self.trigger(monitor);
        }
    }

    /// One execution cycle: guard check, probe invocation, result/fault
    /// reporting, status reset, timer rearm.
    fn trigger(&mut self, monitor: Monitor) {
        let cell = {
            let Some(state) = self.active.get_mut(&monitor) else {
                return;
            };
            // The entry that fired (or a stray leftover) is spent either way.
            state.cancel_timer();
            Arc::clone(&state.status)
        };

        // Execute only from ready; a monitor stopped or mid-run is skipped.
        if cell.transition(MonitorStatus::Ready, MonitorStatus::Running) {
            let outcome = catch_unwind(AssertUnwindSafe(|| self.probes.run(monitor)));
            match outcome {
                Ok(Ok(text)) => self.emit(&format!("{}{text}", self.mark)),
                Ok(Err(fault)) => self.report_fault(monitor, &fault),
                Err(payload) => {
                    let fault = ProbeError::Panicked {
                        message: panic_message(&*payload),
                    };
                    self.report_fault(monitor, &fault);
                }
            }
            // Reset for the next cycle unless a concurrent stop won.
            cell.transition(MonitorStatus::Running, MonitorStatus::Ready);
        }

        // A stopped monitor never reschedules; everything else rearms
        // `interval` from completion, not from the trigger's start.
        if cell.get() == MonitorStatus::Stopped {
            self.active.remove(&monitor);
        } else if let Some(state) = self.active.get_mut(&monitor) {
            state.arm_timer(Instant::now());
        }
    }

    fn report_fault(&self, monitor: Monitor, fault: &ProbeError) {
        tracing::debug!(monitor = %monitor, error = %fault, "probe fault contained");
        self.emit(&format!("{SOURCE_TAG} > failure in {monitor}: {fault}"));
    }

    fn emit(&self, message: &str) {
        if let Err(err) = self.sink.write(message, SOURCE_TAG) {
            tracing::debug!(error = %err, "sink write failed, using fallback output");
            sink::fallback_write(message);
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "opaque panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use crate::error::SinkError;

    use super::*;

    struct OkProbes;

    impl ProbeSet for OkProbes {
        fn run(&self, monitor: Monitor) -> Result<String, ProbeError> {
            Ok(format!("probe result for {monitor}"))
        }
    }

    #[derive(Default)]
    struct CollectSink {
        lines: Mutex<Vec<String>>,
    }

    impl CollectSink {
        fn lines(&self) -> Vec<String> {
            lock(&self.lines).clone()
        }
    }

    impl Sink for CollectSink {
        fn write(&self, text: &str, _source: &str) -> Result<(), SinkError> {
            lock(&self.lines).push(text.to_string());
            Ok(())
        }
    }

    struct FailingSink;

    impl Sink for FailingSink {
        fn write(&self, _text: &str, _source: &str) -> Result<(), SinkError> {
            Err(SinkError::write("sink rejected the line"))
        }
    }

    fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    fn scheduler_with(sink: Arc<dyn Sink>) -> Scheduler {
        Scheduler::new(Arc::new(OkProbes), sink, SchedulerConfig::default())
    }

    #[test]
    fn unknown_start_fails_and_creates_no_state() {
        let sink = Arc::new(CollectSink::default());
        let scheduler = scheduler_with(Arc::clone(&sink) as Arc<dyn Sink>);

        let err = scheduler.start("heap_dump").unwrap_err();
        assert!(matches!(err, SchedulerError::UnknownMonitor { .. }));

        thread::sleep(Duration::from_millis(30));
        assert!(sink.lines().is_empty());
    }

    #[test]
    fn started_monitor_is_never_observed_uninitialized() {
        let scheduler = scheduler_with(Arc::new(CollectSink::default()));
        scheduler.start("thread_summary").unwrap();

        assert_ne!(
            scheduler.status(Monitor::ThreadSummary),
            MonitorStatus::Uninitialized
        );
        assert!(wait_until(Duration::from_secs(2), || {
            scheduler.is_ready(Monitor::ThreadSummary)
        }));
    }

    #[test]
    fn restart_replaces_state_and_relaunches() {
        let sink = Arc::new(CollectSink::default());
        let scheduler = scheduler_with(Arc::clone(&sink) as Arc<dyn Sink>);

        // Effectively dormant after its first immediate trigger.
        scheduler
            .start_with_interval("memory_count", Duration::from_secs(3600))
            .unwrap();
        assert!(wait_until(Duration::from_secs(2), || !sink.lines().is_empty()));

        scheduler
            .start_with_interval("memory_count", Duration::from_millis(10))
            .unwrap();
        assert!(wait_until(Duration::from_secs(2), || sink.lines().len() >= 4));
    }

    #[test]
    fn stop_of_never_started_monitor_is_a_noop() {
        let scheduler = scheduler_with(Arc::new(CollectSink::default()));
        scheduler.stop("memory_count").unwrap();
        assert_eq!(
            scheduler.status(Monitor::MemoryCount),
            MonitorStatus::Uninitialized
        );
    }

    #[test]
    fn stop_of_unknown_name_is_a_noop() {
        let scheduler = scheduler_with(Arc::new(CollectSink::default()));
        scheduler.stop("heap_dump").unwrap();
    }

    #[test]
    fn launch_without_monitor_list_activates_nothing() {
        let sink = Arc::new(CollectSink::default());
        let scheduler = Scheduler::launch(
            Arc::new(OkProbes),
            Arc::clone(&sink) as Arc<dyn Sink>,
            SchedulerOptions::default(),
        );

        thread::sleep(Duration::from_millis(30));
        assert!(sink.lines().is_empty());
        for monitor in crate::registry::ALL_MONITORS {
            assert_eq!(scheduler.status(monitor), MonitorStatus::Uninitialized);
        }
    }

    #[test]
    fn launch_skips_unknown_names_without_affecting_siblings() {
        let sink = Arc::new(CollectSink::default());
        let scheduler = Scheduler::launch(
            Arc::new(OkProbes),
            Arc::clone(&sink) as Arc<dyn Sink>,
            SchedulerOptions {
                monitors: Some(vec!["heap_dump".to_string(), "thread_summary".to_string()]),
                mark: false,
            },
        );

        assert!(wait_until(Duration::from_secs(2), || !sink.lines().is_empty()));
        assert_ne!(
            scheduler.status(Monitor::ThreadSummary),
            MonitorStatus::Uninitialized
        );
    }

    #[test]
    fn alias_methods_map_to_start_and_stop() {
        let scheduler = scheduler_with(Arc::new(CollectSink::default()));
        scheduler.start_thread_summary().unwrap();
        assert!(wait_until(Duration::from_secs(2), || {
            scheduler.is_ready(Monitor::ThreadSummary)
        }));
        scheduler.stop_thread_summary().unwrap();
        assert!(scheduler.is_stopped(Monitor::ThreadSummary));
    }

    #[test]
    fn mark_prefixes_every_output_line() {
        let sink = Arc::new(CollectSink::default());
        let scheduler = Scheduler::new(
            Arc::new(OkProbes),
            Arc::clone(&sink) as Arc<dyn Sink>,
            SchedulerConfig {
                mark: true,
                ..SchedulerConfig::default()
            },
        );
        scheduler.start("uptime").unwrap();

        assert!(wait_until(Duration::from_secs(2), || !sink.lines().is_empty()));
        assert!(sink.lines()[0].starts_with("Selfmon > "));
    }

    #[test]
    fn sink_failure_is_contained_and_scheduling_continues() {
        let scheduler = Scheduler::new(
            Arc::new(OkProbes),
            Arc::new(FailingSink),
            SchedulerConfig::default(),
        );
        scheduler
            .start_with_interval("thread_summary", Duration::from_millis(10))
            .unwrap();

        thread::sleep(Duration::from_millis(80));
        // Several cycles have degraded to the fallback path; the monitor is
        // still alive and idle between triggers.
        assert!(wait_until(Duration::from_secs(2), || {
            scheduler.is_ready(Monitor::ThreadSummary)
        }));
    }

    #[test]
    fn skipped_execution_still_rearms_unless_stopped() {
        let sink = Arc::new(CollectSink::default());
        let mut worker = Worker {
            probes: Arc::new(OkProbes),
            sink: Arc::clone(&sink) as Arc<dyn Sink>,
            mark: "",
            active: HashMap::new(),
        };

        // Guard observed mid-run: the cycle skips the probe but still rearms.
        let cell = StatusCell::initializing();
        cell.set(MonitorStatus::Running);
        let mut state = MonitorState::new(Duration::from_millis(50), Arc::clone(&cell));
        state.arm_now(Instant::now());
        worker.active.insert(Monitor::Uptime, state);

        worker.trigger(Monitor::Uptime);
        assert!(sink.lines().is_empty());
        assert_eq!(cell.get(), MonitorStatus::Running);
        assert!(worker.active[&Monitor::Uptime].timer.is_some());

        // Guard observed stopped: no execution, no rearm, state destroyed.
        let cell = StatusCell::initializing();
        cell.set(MonitorStatus::Stopped);
        let mut state = MonitorState::new(Duration::from_millis(50), Arc::clone(&cell));
        state.arm_now(Instant::now());
        worker.active.insert(Monitor::MemoryCount, state);

        worker.trigger(Monitor::MemoryCount);
        assert!(sink.lines().is_empty());
        assert!(!worker.active.contains_key(&Monitor::MemoryCount));
    }

    #[test]
    fn panicking_probe_is_contained() {
        struct PanickingProbes;

        impl ProbeSet for PanickingProbes {
            fn run(&self, _monitor: Monitor) -> Result<String, ProbeError> {
                panic!("probe blew up");
            }
        }

        let sink = Arc::new(CollectSink::default());
        let scheduler = Scheduler::new(
            Arc::new(PanickingProbes),
            Arc::clone(&sink) as Arc<dyn Sink>,
            SchedulerConfig::default(),
        );
        scheduler
            .start_with_interval("memory_count", Duration::from_millis(10))
            .unwrap();

        assert!(wait_until(Duration::from_secs(2), || sink.lines().len() >= 2));
        for line in sink.lines() {
            assert!(line.contains("failure in memory_count"));
            assert!(line.contains("probe blew up"));
        }
        assert!(wait_until(Duration::from_secs(2), || {
            scheduler.is_ready(Monitor::MemoryCount)
        }));
    }
}
