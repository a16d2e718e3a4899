//! MLC process supervision
//!
//! At most one MLC instance is alive at a time. The supervisor owns its
//! handle together with the cancellation scope of the run using it; both are
//! only touched under one mutex, and that mutex is never held while waiting
//! for output.
//!
//! A supervisor dropped with a live process kills and reaps it, so a
//! panicking worker never leaves an orphan benchmark burning CPU.

use crate::cancel::CancellationScope;
use crate::command::{ToolLauncher, ToolProcess, ToolStdout};
use crate::error::{Error, Result};
use crate::logging::LogSink;
use crate::parser::{LineParser, Measurement, ScanReport, scan_output};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Time a cancelled worker gets to notice before `stop` kills the process
pub const GRACE_PERIOD: Duration = Duration::from_millis(250);

struct RunningTool {
    pid: u32,
    process: Box<dyn ToolProcess>,
}

#[derive(Default)]
struct SupervisorState {
    running: Option<RunningTool>,
    scope: Option<CancellationScope>,
}

/// Stdout of a freshly started process
pub struct ToolOutput {
    /// Process id
    pub pid: u32,
    /// Line reader over the process's stdout
    pub stdout: ToolStdout,
}

impl fmt::Debug for ToolOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolOutput")
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

/// Result of [`ProcessSupervisor::start`]
#[derive(Debug)]
pub enum StartOutcome {
    /// A new process was spawned
    Started(ToolOutput),
    /// A process was already live; nothing was spawned
    AlreadyRunning {
        /// Id of the live process
        pid: u32,
    },
}

/// Owner of the single MLC process handle
pub struct ProcessSupervisor {
    launcher: Arc<dyn ToolLauncher>,
    sink: Arc<dyn LogSink>,
    state: Mutex<SupervisorState>,
}

impl fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessSupervisor")
            .field("running_pid", &self.running_pid())
            .finish_non_exhaustive()
    }
}

impl ProcessSupervisor {
    /// Create an idle supervisor
    #[must_use]
    pub fn new(launcher: Arc<dyn ToolLauncher>, sink: Arc<dyn LogSink>) -> Self {
        Self {
            launcher,
            sink,
            state: Mutex::new(SupervisorState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SupervisorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Log sink shared with scans started through this supervisor
    #[must_use]
    pub fn sink(&self) -> &Arc<dyn LogSink> {
        &self.sink
    }

    /// Launcher used for benchmark runs
    #[must_use]
    pub fn launcher(&self) -> &Arc<dyn ToolLauncher> {
        &self.launcher
    }

    /// Spawn `program` with `arguments` unless a process is already live
    ///
    /// # Errors
    ///
    /// Returns [`Error::Launch`] if the process cannot be spawned or has no
    /// stdout.
    pub fn start(&self, program: &Path, arguments: &str) -> Result<StartOutcome> {
        let mut state = self.lock();
        if let Some(running) = state.running.as_ref() {
            return Ok(StartOutcome::AlreadyRunning { pid: running.pid });
        }

        let launch_error = |source| Error::Launch {
            program: program.display().to_string(),
            source,
        };
        let mut process = self
            .launcher
            .launch(program, arguments)
            .map_err(launch_error)?;
        let Some(stdout) = process.take_stdout() else {
            let _ = process.kill();
            return Err(launch_error(std::io::Error::other("stdout was not captured")));
        };

        let pid = process.id();
        state.running = Some(RunningTool { pid, process });
        drop(state);

        self.sink.info(&format!("Running \"mlc {arguments}\""));
        tracing::debug!(pid, "mlc started");
        Ok(StartOutcome::Started(ToolOutput { pid, stdout }))
    }

    /// Kill the live process
    ///
    /// `target` names the process id the caller believes is live; `None`
    /// means whatever is recorded. The recorded handle is always released on
    /// return: a target that does not match it is reported, and the recorded
    /// process is still killed. Kill failures are logged only. With
    /// `destroy_scope` the installed cancellation scope is cleared too.
    ///
    /// Returns whether a process matching `target` was found.
    pub fn kill(&self, target: Option<u32>, destroy_scope: bool) -> bool {
        let mut state = self.lock();
        if destroy_scope {
            state.scope = None;
        }

        let matches = match (target, state.running.as_ref()) {
            (Some(pid), None) => {
                self.sink
                    .warn(&format!("Could not find MLC process {pid} to kill"));
                false
            }
            (None, None) => false,
            (Some(pid), Some(running)) if pid != running.pid => {
                self.sink.warn(&format!(
                    "Could not find MLC process {pid} to kill; releasing process {}",
                    running.pid
                ));
                false
            }
            (_, Some(_)) => true,
        };

        if let Some(mut running) = state.running.take() {
            Self::terminate(&mut running, self.sink.as_ref());
        }
        matches
    }

    fn terminate(running: &mut RunningTool, sink: &dyn LogSink) {
        match running.process.has_exited() {
            Ok(true) => return,
            Ok(false) => {}
            Err(e) => tracing::debug!(pid = running.pid, "try_wait failed: {e}"),
        }
        match running.process.kill() {
            Ok(()) => {
                if let Err(e) = running.process.wait() {
                    sink.warn(&format!("Failed to reap MLC process {}: {e}", running.pid));
                }
            }
            Err(e) => sink.warn(&format!("Failed to kill MLC process {}: {e}", running.pid)),
        }
    }

    /// Cancel the active run and kill the live process
    ///
    /// A scope cancelled here gets [`GRACE_PERIOD`] to be noticed by the
    /// worker before the process is killed; a leftover process with no live
    /// scope is killed at once. Returns whether anything was done.
    pub fn stop(&self) -> bool {
        let (scope, running) = {
            let state = self.lock();
            (state.scope.clone(), state.running.is_some())
        };
        if scope.is_none() && !running {
            return false;
        }

        let mut acted = false;
        if let Some(scope) = scope.filter(|s| !s.is_cancelled()) {
            scope.cancel();
            acted = true;
            std::thread::sleep(GRACE_PERIOD);
        }

        let killed = self.is_running() && self.kill(None, true);
        acted || killed
    }

    /// Install a fresh cancellation scope for a new run
    pub fn begin_run(&self) -> CancellationScope {
        let scope = CancellationScope::new();
        self.lock().scope = Some(scope.clone());
        scope
    }

    /// Clear `scope` if it is still the installed one
    pub fn finish_run(&self, scope: &CancellationScope) {
        let mut state = self.lock();
        if state.scope.as_ref().is_some_and(|s| s.same_scope(scope)) {
            state.scope = None;
        }
    }

    /// Currently installed scope
    #[must_use]
    pub fn active_scope(&self) -> Option<CancellationScope> {
        self.lock().scope.clone()
    }

    /// Whether a process is live
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lock().running.is_some()
    }

    /// Id of the live process
    #[must_use]
    pub fn running_pid(&self) -> Option<u32> {
        self.lock().running.as_ref().map(|r| r.pid)
    }

    /// Scan `stdout` through `parser`, logging to this supervisor's sink
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] once `scope` is triggered.
    pub fn consume_output(
        &self,
        stdout: &mut ToolStdout,
        scope: &CancellationScope,
        parser: &mut dyn LineParser,
        emit: &mut dyn FnMut(Measurement),
    ) -> Result<ScanReport> {
        scan_output(stdout.as_mut(), scope, parser, self.sink.as_ref(), emit)
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        let running = self
            .state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .running
            .take();
        if let Some(mut running) = running {
            tracing::warn!(pid = running.pid, "cleaning up MLC process on shutdown");
            Self::terminate(&mut running, self.sink.as_ref());
        }
    }
}
