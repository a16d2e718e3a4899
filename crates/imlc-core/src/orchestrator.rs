//! Benchmark runs from button press to result
//!
//! [`TestOrchestrator::toggle`] is the click handler: it starts a run on the
//! worker pool, or cancels the active one. Each run walks its modes in order,
//! generating arguments, starting MLC, scanning its output and killing it
//! once the scan ends. Results reach the presentation layer only through the
//! [`Dispatcher`].

use crate::args::{ArgumentOptions, TestMode, generate_arguments};
use crate::cancel::CancellationScope;
use crate::error::{Error, Result};
use crate::parser::{Measurement, parser_for};
use crate::presentation::{Dispatcher, Notice, RunObserver};
use crate::process::{ProcessSupervisor, StartOutcome};
use crate::tool::ToolContext;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Worker threads in the run pool
pub const WORKER_THREADS: usize = 2;

/// A benchmark the user asked for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "test", rename_all = "snake_case")]
pub enum RunRequest {
    /// Bandwidth matrix then latency matrix
    Quick,
    /// Max or peak injection bandwidth
    Bandwidth {
        /// Use `--peak_injection_bandwidth`
        peak_injection: bool,
    },
    /// Cache-to-cache latency
    Cache,
    /// Loaded latency
    Latency {
        /// Measure only this inject delay
        inject_delay: Option<String>,
    },
}

impl RunRequest {
    /// Modes run for this request, in order
    #[must_use]
    pub fn modes(&self) -> &'static [TestMode] {
        match self {
            Self::Quick => &[TestMode::QuickBandwidth, TestMode::QuickLatency],
            Self::Bandwidth { .. } => &[TestMode::Bandwidth],
            Self::Cache => &[TestMode::Cache],
            Self::Latency { .. } => &[TestMode::Latency],
        }
    }

    /// Argument options for this request
    #[must_use]
    pub fn options(&self) -> ArgumentOptions {
        match self {
            Self::Bandwidth {
                peak_injection: true,
            } => ArgumentOptions::peak(),
            Self::Latency {
                inject_delay: Some(delay),
            } if !delay.trim().is_empty() => ArgumentOptions::with_inject_delay(delay.trim()),
            _ => ArgumentOptions::default(),
        }
    }

    /// Name used in log lines
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Quick => "quick",
            Self::Bandwidth { .. } => "bandwidth",
            Self::Cache => "cache",
            Self::Latency { .. } => "latency",
        }
    }
}

impl fmt::Display for RunRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How one mode process ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Output scanned to the end of the table
    Completed {
        /// Measurements delivered
        rows: usize,
    },
    /// The result table never appeared
    NoData,
    /// Collection stopped at an unexpected line; partial results were kept
    Malformed {
        /// Measurements delivered before the bad line
        rows: usize,
    },
    /// The user cancelled
    Cancelled,
    /// Another MLC process was live; nothing was started
    AlreadyRunning,
    /// MLC could not be started or supervised
    LaunchFailed {
        /// Error text
        reason: String,
    },
}

impl RunOutcome {
    /// Whether the process ran; a quick test only continues after one that did
    #[must_use]
    pub fn process_ran(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::NoData | Self::Malformed { .. }
        )
    }

    /// Measurements delivered
    #[must_use]
    pub fn rows(&self) -> usize {
        match self {
            Self::Completed { rows } | Self::Malformed { rows } => *rows,
            _ => 0,
        }
    }
}

/// Outcome of one mode within a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeReport {
    /// Mode that ran
    pub mode: TestMode,
    /// How it ended
    pub outcome: RunOutcome,
}

/// Record of one finished run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// What was asked for
    pub request: RunRequest,
    /// Wall-clock start
    pub started_at: DateTime<Utc>,
    /// Elapsed time
    pub duration_ms: u64,
    /// First mode outcome that is not `Completed`, else `Completed` with all rows
    pub outcome: RunOutcome,
    /// Per-mode outcomes
    pub modes: Vec<ModeReport>,
    /// Every measurement delivered
    pub measurements: Vec<Measurement>,
}

impl RunSummary {
    fn new(
        request: RunRequest,
        started_at: DateTime<Utc>,
        timer: Instant,
        modes: Vec<ModeReport>,
        measurements: Vec<Measurement>,
    ) -> Self {
        let outcome = modes
            .iter()
            .map(|m| &m.outcome)
            .find(|o| !matches!(o, RunOutcome::Completed { .. }))
            .cloned()
            .unwrap_or_else(|| RunOutcome::Completed {
                rows: modes.iter().map(|m| m.outcome.rows()).sum(),
            });
        Self {
            request,
            started_at,
            duration_ms: timer.elapsed().as_millis() as u64,
            outcome,
            modes,
            measurements,
        }
    }

    /// Whether every mode completed
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self.outcome, RunOutcome::Completed { .. })
    }
}

/// Result of a click on a run button
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Toggle {
    /// A run was queued on the worker pool
    Started,
    /// The click cancelled the active run
    Cancelled,
    /// Validation failed; nothing was started
    Rejected(Notice),
}

struct Shared {
    supervisor: Arc<ProcessSupervisor>,
    tool: Arc<ToolContext>,
    dispatcher: Arc<dyn Dispatcher>,
    observer: Arc<dyn RunObserver>,
    run_active: AtomicBool,
}

impl Shared {
    fn notify(&self, notice: Notice) {
        let observer = Arc::clone(&self.observer);
        self.dispatcher
            .dispatch(Box::new(move || observer.on_notice(&notice)));
    }

    /// Resolve the executable and version a run needs
    fn prepare(&self) -> Result<(PathBuf, String)> {
        let program = self.tool.validate()?;
        let version = match self.tool.version() {
            Some(v) => v,
            None => self.tool.fetch_version().ok_or(Error::VersionUnavailable)?,
        };
        Ok((program, version))
    }

    fn reset(&self, request: &RunRequest) {
        for &mode in request.modes() {
            let observer = Arc::clone(&self.observer);
            self.dispatcher
                .dispatch(Box::new(move || observer.on_reset(mode)));
        }
        self.supervisor
            .sink()
            .info(&format!("Running Intel MLC {} test", request.label()));
    }

    fn execute(
        &self,
        request: RunRequest,
        program: &Path,
        version: &str,
        scope: &CancellationScope,
    ) -> RunSummary {
        let started_at = Utc::now();
        let timer = Instant::now();
        let options = request.options();
        let mut modes = Vec::new();
        let mut measurements = Vec::new();

        for &mode in request.modes() {
            let outcome =
                self.run_mode(mode, program, version, &options, scope, &mut measurements);
            let carry_on = outcome.process_ran();
            modes.push(ModeReport { mode, outcome });
            if !carry_on {
                break;
            }
        }

        self.supervisor.finish_run(scope);
        RunSummary::new(request, started_at, timer, modes, measurements)
    }

    fn run_mode(
        &self,
        mode: TestMode,
        program: &Path,
        version: &str,
        options: &ArgumentOptions,
        scope: &CancellationScope,
        measurements: &mut Vec<Measurement>,
    ) -> RunOutcome {
        let sink = self.supervisor.sink();
        if scope.is_cancelled() {
            return RunOutcome::Cancelled;
        }

        let arguments = generate_arguments(Some(version), mode, options);
        let mut output = match self.supervisor.start(program, &arguments) {
            Ok(StartOutcome::Started(output)) => output,
            Ok(StartOutcome::AlreadyRunning { pid }) => {
                sink.warn(&format!("MLC is already running (pid {pid}); not starting {mode}"));
                return RunOutcome::AlreadyRunning;
            }
            Err(e) => {
                sink.error(&e.to_string());
                let reason = match e {
                    Error::Launch { source, .. } => source.to_string(),
                    other => other.to_string(),
                };
                self.notify(Notice::LaunchFailed {
                    mode,
                    reason: reason.clone(),
                });
                return RunOutcome::LaunchFailed { reason };
            }
        };
        let pid = output.pid;

        let mut parser = parser_for(mode, options.inject_delay.is_some());
        let scanned = {
            let dispatcher = Arc::clone(&self.dispatcher);
            let observer = Arc::clone(&self.observer);
            let mut emit = |measurement: Measurement| {
                measurements.push(measurement.clone());
                let observer = Arc::clone(&observer);
                dispatcher.dispatch(Box::new(move || observer.on_measurement(&measurement)));
            };
            self.supervisor
                .consume_output(&mut output.stdout, scope, parser.as_mut(), &mut emit)
        };
        drop(output);

        // stop() may already have killed and released the process
        if self.supervisor.running_pid() == Some(pid) {
            self.supervisor.kill(Some(pid), false);
        }

        let report = match scanned {
            Ok(_) if scope.is_cancelled() => return RunOutcome::Cancelled,
            Ok(report) => report,
            Err(e) if e.is_cancelled() => {
                tracing::debug!(%mode, "run cancelled");
                return RunOutcome::Cancelled;
            }
            Err(e) => {
                sink.error(&format!("Failed to read {mode} output: {e}"));
                return RunOutcome::LaunchFailed {
                    reason: e.to_string(),
                };
            }
        };

        if report.no_data() {
            self.notify(Notice::NoData { mode });
            RunOutcome::NoData
        } else if report.is_malformed() {
            self.notify(Notice::MalformedOutput { mode });
            RunOutcome::Malformed {
                rows: report.measurements,
            }
        } else {
            RunOutcome::Completed {
                rows: report.measurements,
            }
        }
    }

    /// Mark a run active; false if one already is
    fn claim(&self) -> bool {
        self.run_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn finish(&self, summary: RunSummary) {
        self.run_active.store(false, Ordering::SeqCst);
        let observer = Arc::clone(&self.observer);
        self.dispatcher
            .dispatch(Box::new(move || observer.on_run_finished(&summary)));
    }
}

/// Starts and cancels benchmark runs
pub struct TestOrchestrator {
    shared: Arc<Shared>,
    pool: rayon::ThreadPool,
}

impl fmt::Debug for TestOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestOrchestrator")
            .field("run_active", &self.is_active())
            .field("supervisor", &self.shared.supervisor)
            .finish_non_exhaustive()
    }
}

impl TestOrchestrator {
    /// Create an orchestrator with its own worker pool
    ///
    /// # Errors
    ///
    /// Returns [`Error::WorkerPool`] if the worker threads cannot be created.
    pub fn new(
        supervisor: Arc<ProcessSupervisor>,
        tool: Arc<ToolContext>,
        dispatcher: Arc<dyn Dispatcher>,
        observer: Arc<dyn RunObserver>,
    ) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(WORKER_THREADS)
            .thread_name(|i| format!("imlc-worker-{i}"))
            .build()
            .map_err(|e| Error::WorkerPool(e.to_string()))?;
        Ok(Self {
            shared: Arc::new(Shared {
                supervisor,
                tool,
                dispatcher,
                observer,
                run_active: AtomicBool::new(false),
            }),
            pool,
        })
    }

    /// Supervisor owning the MLC process
    #[must_use]
    pub fn supervisor(&self) -> &Arc<ProcessSupervisor> {
        &self.shared.supervisor
    }

    /// Tool path and version
    #[must_use]
    pub fn tool(&self) -> &Arc<ToolContext> {
        &self.shared.tool
    }

    /// Whether a run is in progress
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.shared.run_active.load(Ordering::SeqCst)
    }

    /// Start `request`, or cancel the active run
    pub fn toggle(&self, request: RunRequest) -> Toggle {
        let active = self.is_active();
        if self.shared.supervisor.stop() || active {
            return Toggle::Cancelled;
        }

        let (program, version) = match self.shared.prepare() {
            Ok(prepared) => prepared,
            Err(e) => {
                self.shared.supervisor.sink().warn(&e.to_string());
                let notice = Notice::from_error(&e).unwrap_or(Notice::VersionUnavailable);
                self.shared.notify(notice.clone());
                return Toggle::Rejected(notice);
            }
        };

        if !self.shared.claim() {
            self.shared.supervisor.stop();
            return Toggle::Cancelled;
        }
        self.shared.reset(&request);
        let scope = self.shared.supervisor.begin_run();

        let shared = Arc::clone(&self.shared);
        self.pool.spawn(move || {
            let summary = shared.execute(request, &program, &version, &scope);
            shared.finish(summary);
        });
        Toggle::Started
    }

    /// Run `request` on the calling thread
    ///
    /// Unlike [`toggle`](Self::toggle) this never cancels anything: an active
    /// run, or a live process left behind by one, is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RunInProgress`] while another run or process is
    /// live, or the validation error if no executable or version is
    /// available. Run-time problems are reported in the summary.
    pub fn run_blocking(&self, request: RunRequest) -> Result<RunSummary> {
        if self.shared.supervisor.is_running() || !self.shared.claim() {
            return Err(Error::RunInProgress);
        }
        let prepared = self.shared.prepare().inspect_err(|e| {
            self.shared.run_active.store(false, Ordering::SeqCst);
            if let Some(notice) = Notice::from_error(e) {
                self.shared.notify(notice);
            }
        });
        let (program, version) = prepared?;

        self.shared.reset(&request);
        let scope = self.shared.supervisor.begin_run();
        let summary = self.shared.execute(request, &program, &version, &scope);
        self.shared.finish(summary.clone());
        Ok(summary)
    }

    /// Cancel the active run; returns whether anything was stopped
    pub fn stop(&self) -> bool {
        self.shared.supervisor.stop()
    }

    /// Point at a new MLC executable
    ///
    /// # Errors
    ///
    /// Returns [`Error::ToolBusy`] while MLC runs, otherwise whatever
    /// [`ToolContext::set_path`] reports. Each rejection is also raised as a
    /// notice.
    pub fn configure_path(&self, path: &Path) -> Result<Option<String>> {
        let result = if self.shared.supervisor.is_running() || self.is_active() {
            Err(Error::ToolBusy)
        } else {
            self.shared.tool.set_path(path)
        };
        if let Err(e) = &result {
            if let Some(notice) = Notice::from_error(e) {
                self.shared.notify(notice);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{MockRun, MockToolLauncher};
    use crate::config::MemoryConfigStore;
    use crate::logging::{LogLevel, MemoryLogSink};
    use crate::presentation::{InlineDispatcher, ObservedEvent, RecordingObserver};
    use crate::test_fixtures::{
        BANDWIDTH_OUTPUT, CACHE_OUTPUT, LATENCY_OUTPUT, QUICK_BANDWIDTH_OUTPUT,
        QUICK_LATENCY_OUTPUT, latency_rows, version_banner,
    };
    use std::time::Duration;

    struct Harness {
        _dir: tempfile::TempDir,
        exe: PathBuf,
        launcher: MockToolLauncher,
        sink: MemoryLogSink,
        observer: RecordingObserver,
        orchestrator: TestOrchestrator,
    }

    fn harness(runs: Vec<MockRun>) -> Harness {
        let dir = tempfile::tempdir().expect("tempdir");
        let exe = dir.path().join("mlc");
        std::fs::write(&exe, b"").expect("write exe");

        let launcher = MockToolLauncher::new().with_run(MockRun::output(version_banner("v3.11")));
        for run in runs {
            launcher.push_run(run);
        }
        let sink = MemoryLogSink::new();
        let observer = RecordingObserver::new();

        let config = Arc::new(MemoryConfigStore::with_tool_path(exe.display().to_string()));
        let tool = Arc::new(ToolContext::new(
            config,
            Arc::new(launcher.clone()),
            Arc::new(sink.clone()),
        ));
        tool.fetch_version();
        let supervisor = Arc::new(ProcessSupervisor::new(
            Arc::new(launcher.clone()),
            Arc::new(sink.clone()),
        ));
        let orchestrator = TestOrchestrator::new(
            supervisor,
            tool,
            Arc::new(InlineDispatcher),
            Arc::new(observer.clone()),
        )
        .expect("orchestrator");

        Harness {
            _dir: dir,
            exe,
            launcher,
            sink,
            observer,
            orchestrator,
        }
    }

    fn wait_until(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "timed out");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_request_modes_and_options() {
        assert_eq!(
            RunRequest::Quick.modes(),
            &[TestMode::QuickBandwidth, TestMode::QuickLatency]
        );
        assert_eq!(
            RunRequest::Bandwidth {
                peak_injection: true
            }
            .options(),
            ArgumentOptions::peak()
        );
        assert_eq!(
            RunRequest::Latency {
                inject_delay: Some(" ".into())
            }
            .options(),
            ArgumentOptions::default()
        );
    }

    #[test]
    fn test_bandwidth_run_completes() {
        let h = harness(vec![MockRun::output(BANDWIDTH_OUTPUT)]);
        let summary = h
            .orchestrator
            .run_blocking(RunRequest::Bandwidth {
                peak_injection: false,
            })
            .expect("run");

        assert_eq!(summary.outcome, RunOutcome::Completed { rows: 5 });
        assert_eq!(summary.measurements.len(), 5);
        assert_eq!(h.observer.measurements().len(), 5);
        assert_eq!(
            h.launcher.launched_arguments(),
            vec!["--invalid_argument", "--max_bandwidth"]
        );
        assert!(!h.orchestrator.supervisor().is_running());
        assert!(h.orchestrator.supervisor().active_scope().is_none());
        assert!(!h.orchestrator.is_active());

        let events = h.observer.events();
        assert_eq!(events.first(), Some(&ObservedEvent::Reset(TestMode::Bandwidth)));
        assert!(matches!(events.last(), Some(ObservedEvent::Finished(_))));
    }

    #[test]
    fn test_version_suffix_reaches_command_line() {
        let h = harness(vec![MockRun::output(LATENCY_OUTPUT)]);
        let summary = h
            .orchestrator
            .run_blocking(RunRequest::Latency {
                inject_delay: Some("00200".into()),
            })
            .expect("run");
        assert_eq!(
            h.launcher.launched_arguments()[1],
            "--loaded_latency -d00200 -e0"
        );
        let rows = latency_rows(&summary.measurements);
        assert!(rows.iter().all(|r| r.progress == 100));
    }

    #[test]
    fn test_quick_runs_both_halves() {
        let h = harness(vec![
            MockRun::output(QUICK_BANDWIDTH_OUTPUT),
            MockRun::output(QUICK_LATENCY_OUTPUT),
        ]);
        let summary = h.orchestrator.run_blocking(RunRequest::Quick).expect("run");

        assert_eq!(summary.outcome, RunOutcome::Completed { rows: 2 });
        assert_eq!(summary.modes.len(), 2);
        assert_eq!(
            h.launcher.launched_arguments()[1..],
            ["--bandwidth_matrix", "--latency_matrix -e0"]
        );
        assert!(
            h.sink
                .messages_at(LogLevel::Info)
                .contains(&"Running Intel MLC quick test".to_string())
        );
    }

    #[test]
    fn test_quick_stops_when_first_half_cannot_start() {
        let h = harness(vec![MockRun::launch_failure()]);
        let summary = h.orchestrator.run_blocking(RunRequest::Quick).expect("run");

        assert!(matches!(summary.outcome, RunOutcome::LaunchFailed { .. }));
        assert_eq!(summary.modes.len(), 1);
        assert_eq!(h.launcher.launch_count(), 1);
        assert!(matches!(
            h.observer.notices().as_slice(),
            [Notice::LaunchFailed {
                mode: TestMode::QuickBandwidth,
                ..
            }]
        ));
    }

    #[test]
    fn test_missing_table_reports_no_data() {
        let h = harness(vec![MockRun::output("Intel(R) Memory Latency Checker - v3.11\n")]);
        let summary = h.orchestrator.run_blocking(RunRequest::Cache).expect("run");
        assert_eq!(summary.outcome, RunOutcome::NoData);
        assert_eq!(
            h.observer.notices(),
            vec![Notice::NoData {
                mode: TestMode::Cache
            }]
        );
    }

    #[test]
    fn test_malformed_output_keeps_partial_rows() {
        let text = "Using small pages for allocating buffers\nL2->L2 HIT  latency\t48.3\nsomething else\n";
        let h = harness(vec![MockRun::output(text).still_running()]);
        let summary = h.orchestrator.run_blocking(RunRequest::Cache).expect("run");

        assert_eq!(summary.outcome, RunOutcome::Malformed { rows: 1 });
        assert_eq!(h.observer.measurements().len(), 1);
        assert_eq!(
            h.observer.notices(),
            vec![Notice::MalformedOutput {
                mode: TestMode::Cache
            }]
        );
        // the post-scan kill still runs
        assert_eq!(h.launcher.kill_count(), 1);
    }

    #[test]
    fn test_toggle_rejects_missing_executable() {
        let h = harness(Vec::new());
        std::fs::remove_file(&h.exe).expect("remove");

        let toggle = h.orchestrator.toggle(RunRequest::Cache);
        assert!(matches!(toggle, Toggle::Rejected(Notice::ToolNotFound { .. })));
        assert!(!h.orchestrator.is_active());
        assert_eq!(h.launcher.launch_count(), 1);
    }

    #[test]
    fn test_toggle_rejects_unknown_version() {
        let h = harness(Vec::new());
        let tool = ToolContext::new(
            Arc::new(MemoryConfigStore::with_tool_path(h.exe.display().to_string())),
            Arc::new(MockToolLauncher::new()),
            Arc::new(MemoryLogSink::new()),
        );
        assert_eq!(tool.fetch_version(), None);

        let orchestrator = TestOrchestrator::new(
            Arc::clone(h.orchestrator.supervisor()),
            Arc::new(tool),
            Arc::new(InlineDispatcher),
            Arc::new(h.observer.clone()),
        )
        .expect("orchestrator");
        assert_eq!(
            orchestrator.toggle(RunRequest::Cache),
            Toggle::Rejected(Notice::VersionUnavailable)
        );
    }

    #[test]
    fn test_toggle_twice_cancels() {
        let h = harness(vec![MockRun::hanging(
            "Using small pages for allocating buffers\n",
        )]);

        assert_eq!(h.orchestrator.toggle(RunRequest::Cache), Toggle::Started);
        wait_until(|| h.orchestrator.supervisor().is_running());
        assert_eq!(h.orchestrator.toggle(RunRequest::Cache), Toggle::Cancelled);

        wait_until(|| !h.observer.finished().is_empty());
        let finished = h.observer.finished();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].outcome, RunOutcome::Cancelled);
        assert!(!h.orchestrator.supervisor().is_running());
        assert!(h.sink.messages_at(LogLevel::Error).is_empty());
    }

    #[test]
    fn test_blocking_run_refused_while_worker_run_is_active() {
        let h = harness(vec![MockRun::hanging(
            "Using small pages for allocating buffers\n",
        )]);
        assert_eq!(h.orchestrator.toggle(RunRequest::Cache), Toggle::Started);
        wait_until(|| h.orchestrator.supervisor().is_running());

        let err = h
            .orchestrator
            .run_blocking(RunRequest::Cache)
            .expect_err("worker run owns MLC");
        assert!(matches!(err, Error::RunInProgress));
        assert!(h.orchestrator.is_active());
        assert!(h.orchestrator.supervisor().active_scope().is_some());
        assert_eq!(h.launcher.launch_count(), 2);

        assert!(h.orchestrator.stop());
        wait_until(|| !h.observer.finished().is_empty());
        let finished = h.observer.finished();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].outcome, RunOutcome::Cancelled);
        assert!(h.observer.notices().is_empty());
    }

    #[test]
    fn test_blocking_run_refused_while_leftover_process_lives() {
        let h = harness(vec![MockRun::hanging("")]);
        let supervisor = h.orchestrator.supervisor();
        let _output = supervisor
            .start(&h.exe, "--c2c_latency")
            .expect("start leftover");

        let err = h
            .orchestrator
            .run_blocking(RunRequest::Cache)
            .expect_err("process is live");
        assert!(matches!(err, Error::RunInProgress));
        assert!(!h.orchestrator.is_active());
        assert!(supervisor.is_running());
        assert!(supervisor.kill(None, true));
    }

    #[test]
    fn test_failed_validation_releases_run_flag() {
        let h = harness(vec![MockRun::output(CACHE_OUTPUT)]);
        std::fs::remove_file(&h.exe).expect("remove");
        let err = h
            .orchestrator
            .run_blocking(RunRequest::Cache)
            .expect_err("missing exe");
        assert!(matches!(err, Error::ToolNotFound { .. }));
        assert!(!h.orchestrator.is_active());

        std::fs::write(&h.exe, b"").expect("restore");
        let summary = h.orchestrator.run_blocking(RunRequest::Cache).expect("run");
        assert!(summary.is_complete());
    }

    #[test]
    fn test_toggle_runs_on_worker_pool() {
        let h = harness(vec![MockRun::output(CACHE_OUTPUT)]);
        assert_eq!(h.orchestrator.toggle(RunRequest::Cache), Toggle::Started);
        wait_until(|| !h.observer.finished().is_empty());
        let finished = h.observer.finished();
        assert_eq!(finished[0].outcome, RunOutcome::Completed { rows: 2 });
    }

    #[test]
    fn test_configure_path_refused_while_running() {
        let h = harness(vec![MockRun::hanging("")]);
        assert_eq!(h.orchestrator.toggle(RunRequest::Cache), Toggle::Started);
        wait_until(|| h.orchestrator.supervisor().is_running());

        let err = h
            .orchestrator
            .configure_path(&h.exe)
            .expect_err("busy");
        assert!(matches!(err, Error::ToolBusy));
        assert!(h.observer.notices().contains(&Notice::ToolBusy));

        assert!(h.orchestrator.stop());
        wait_until(|| !h.orchestrator.is_active());
    }

    #[test]
    fn test_configure_path_rejects_directory() {
        let h = harness(Vec::new());
        let dir = h.exe.parent().expect("parent").to_path_buf();
        let err = h.orchestrator.configure_path(&dir).expect_err("directory");
        assert!(matches!(err, Error::InvalidExecutable { .. }));
        assert_eq!(
            h.observer.notices(),
            vec![Notice::InvalidExecutable { path: dir }]
        );
    }

    #[test]
    fn test_summary_serializes() {
        let h = harness(vec![MockRun::output(CACHE_OUTPUT)]);
        let summary = h.orchestrator.run_blocking(RunRequest::Cache).expect("run");
        let json = serde_json::to_value(&summary).expect("json");
        assert_eq!(json["outcome"]["status"], "completed");
        assert_eq!(json["request"]["test"], "cache");
        assert_eq!(json["measurements"][0]["kind"], "cache");
    }
}
