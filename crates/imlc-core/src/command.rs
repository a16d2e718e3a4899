//! Process execution abstraction for testability
//!
//! This module provides a trait-based abstraction over launching the MLC
//! executable, allowing the supervisor and the version probe to be tested
//! with mock implementations.

use crate::priority::{self, ProcessPriority};
use std::collections::VecDeque;
use std::fmt;
use std::io::{self, BufRead, BufReader, Cursor, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};

/// Line-oriented standard output of a launched tool
pub type ToolStdout = Box<dyn BufRead + Send>;

/// A launched external process
pub trait ToolProcess: Send + fmt::Debug {
    /// Operating-system process id
    fn id(&self) -> u32;

    /// Take the captured standard output. Returns `None` on the second call.
    fn take_stdout(&mut self) -> Option<ToolStdout>;

    /// Whether the process has exited (reaps it if so)
    fn has_exited(&mut self) -> io::Result<bool>;

    /// Exit code once the process has exited
    fn exit_code(&mut self) -> Option<i32>;

    /// Request termination
    fn kill(&mut self) -> io::Result<()>;

    /// Block until the process exits, returning its exit code
    fn wait(&mut self) -> io::Result<Option<i32>>;
}

/// Trait for launching the external tool
pub trait ToolLauncher: Send + Sync + fmt::Debug {
    /// Start `program` with a whitespace-separated argument string
    fn launch(&self, program: &Path, arguments: &str) -> io::Result<Box<dyn ToolProcess>>;
}

/// Launcher that spawns real subprocesses
#[derive(Debug, Clone)]
pub struct RealToolLauncher {
    /// Pipe stderr and forward it to the log instead of discarding it
    pub capture_stderr: bool,
    /// Scheduling priority given to each launched process
    pub priority: ProcessPriority,
}

impl Default for RealToolLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl RealToolLauncher {
    /// Create a launcher that captures stderr and raises priority as far as
    /// this process's rights allow
    #[must_use]
    pub fn new() -> Self {
        Self {
            capture_stderr: true,
            priority: ProcessPriority::for_current_process(),
        }
    }

    /// Set the priority of launched processes
    #[must_use]
    pub fn with_priority(mut self, priority: ProcessPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set whether stderr is captured
    #[must_use]
    pub fn with_stderr_capture(mut self, capture: bool) -> Self {
        self.capture_stderr = capture;
        self
    }
}

impl ToolLauncher for RealToolLauncher {
    fn launch(&self, program: &Path, arguments: &str) -> io::Result<Box<dyn ToolProcess>> {
        let mut command = Command::new(program);
        command
            .args(arguments.split_whitespace())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(if self.capture_stderr {
                Stdio::piped()
            } else {
                Stdio::null()
            });

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            command.creation_flags(CREATE_NO_WINDOW | self.priority.priority_class());
        }

        let mut child = command.spawn()?;
        if let Err(e) = priority::apply(&child, self.priority) {
            tracing::warn!(
                pid = child.id(),
                "Could not run MLC at {} priority: {e}",
                self.priority
            );
        }

        // Unread stderr would fill its pipe and stall MLC
        if let Some(stderr) = child.stderr.take() {
            let pid = child.id();
            let drained = std::thread::Builder::new()
                .name(format!("mlc-stderr-{pid}"))
                .spawn(move || {
                    for line in BufReader::new(stderr).lines().map_while(io::Result::ok) {
                        tracing::debug!(target: "imlc::process", pid, "stderr: {line}");
                    }
                });
            if let Err(e) = drained {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e);
            }
        }

        Ok(Box::new(RealToolProcess {
            child,
            exit_code: None,
        }))
    }
}

/// A real child process
#[derive(Debug)]
pub struct RealToolProcess {
    child: Child,
    exit_code: Option<i32>,
}

impl ToolProcess for RealToolProcess {
    fn id(&self) -> u32 {
        self.child.id()
    }

    fn take_stdout(&mut self) -> Option<ToolStdout> {
        self.child
            .stdout
            .take()
            .map(|out| Box::new(BufReader::new(out)) as ToolStdout)
    }

    fn has_exited(&mut self) -> io::Result<bool> {
        match self.child.try_wait()? {
            Some(status) => {
                self.exit_code = status.code();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn exit_code(&mut self) -> Option<i32> {
        if self.exit_code.is_none() {
            let _ = self.has_exited();
        }
        self.exit_code
    }

    fn kill(&mut self) -> io::Result<()> {
        self.child.kill()
    }

    fn wait(&mut self) -> io::Result<Option<i32>> {
        let status = self.child.wait()?;
        self.exit_code = status.code();
        Ok(self.exit_code)
    }
}

static NEXT_MOCK_PID: AtomicU32 = AtomicU32::new(40_000);

/// Canned behaviour for one mock launch
#[derive(Debug, Clone, Default)]
pub struct MockRun {
    /// Text written to stdout
    pub stdout: String,
    /// Keep stdout open after the text until the process is killed
    pub hold_open: bool,
    /// Fail the launch with `NotFound`
    pub fail_launch: bool,
    /// Report the process as already exited
    pub exited: bool,
    /// Make `kill` return an error
    pub kill_fails: bool,
    /// Make `wait` return an error
    pub wait_fails: bool,
}

impl MockRun {
    /// A process that prints `stdout` and exits
    #[must_use]
    pub fn output(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            exited: true,
            ..Self::default()
        }
    }

    /// A process that prints `stdout` and then keeps running until killed
    #[must_use]
    pub fn hanging(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            hold_open: true,
            ..Self::default()
        }
    }

    /// A launch that fails as if the executable were missing
    #[must_use]
    pub fn launch_failure() -> Self {
        Self {
            fail_launch: true,
            ..Self::default()
        }
    }

    /// Keep the process alive (not exited) even though stdout closes
    #[must_use]
    pub fn still_running(mut self) -> Self {
        self.exited = false;
        self
    }

    /// Make `kill` fail
    #[must_use]
    pub fn with_kill_failure(mut self) -> Self {
        self.kill_fails = true;
        self
    }

    /// Make `wait` fail
    #[must_use]
    pub fn with_wait_failure(mut self) -> Self {
        self.wait_fails = true;
        self
    }
}

#[derive(Debug, Default)]
struct MockLedger {
    queue: VecDeque<MockRun>,
    fallback: MockRun,
    launches: Vec<(PathBuf, String)>,
}

/// Mock launcher for testing
///
/// Each launch pops the next queued [`MockRun`], falling back to a default
/// run once the queue is empty. Launches and kills are recorded.
#[derive(Debug, Clone, Default)]
pub struct MockToolLauncher {
    ledger: Arc<Mutex<MockLedger>>,
    kills: Arc<AtomicUsize>,
}

impl MockToolLauncher {
    /// Create a mock whose processes print nothing and exit
    #[must_use]
    pub fn new() -> Self {
        Self::default().with_fallback(MockRun::output(""))
    }

    /// Queue the behaviour for the next launch
    #[must_use]
    pub fn with_run(self, run: MockRun) -> Self {
        self.ledger().queue.push_back(run);
        self
    }

    /// Behaviour used once the queue is drained
    #[must_use]
    pub fn with_fallback(self, run: MockRun) -> Self {
        self.ledger().fallback = run;
        self
    }

    /// Queue a run after construction
    pub fn push_run(&self, run: MockRun) {
        self.ledger().queue.push_back(run);
    }

    /// Number of successful launches
    #[must_use]
    pub fn launch_count(&self) -> usize {
        self.ledger().launches.len()
    }

    /// Argument strings of every successful launch, in order
    #[must_use]
    pub fn launched_arguments(&self) -> Vec<String> {
        self.ledger()
            .launches
            .iter()
            .map(|(_, args)| args.clone())
            .collect()
    }

    /// Programs of every successful launch, in order
    #[must_use]
    pub fn launched_programs(&self) -> Vec<PathBuf> {
        self.ledger()
            .launches
            .iter()
            .map(|(program, _)| program.clone())
            .collect()
    }

    /// Number of kill requests across all processes
    #[must_use]
    pub fn kill_count(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }

    fn ledger(&self) -> std::sync::MutexGuard<'_, MockLedger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ToolLauncher for MockToolLauncher {
    fn launch(&self, program: &Path, arguments: &str) -> io::Result<Box<dyn ToolProcess>> {
        let run = {
            let mut ledger = self.ledger();
            let run = match ledger.queue.pop_front() {
                Some(run) => run,
                None => ledger.fallback.clone(),
            };
            if run.fail_launch {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("{} not found", program.display()),
                ));
            }
            ledger
                .launches
                .push((program.to_path_buf(), arguments.to_string()));
            run
        };

        let gate = Arc::new(KillGate::default());
        let stdout = MockStdout {
            data: Cursor::new(run.stdout.clone().into_bytes()),
            hold_open: run.hold_open,
            gate: Arc::clone(&gate),
        };
        Ok(Box::new(MockToolProcess {
            pid: NEXT_MOCK_PID.fetch_add(1, Ordering::SeqCst),
            stdout: Some(Box::new(BufReader::new(stdout))),
            exited: run.exited,
            kill_fails: run.kill_fails,
            wait_fails: run.wait_fails,
            gate,
            kills: Arc::clone(&self.kills),
        }))
    }
}

#[derive(Debug, Default)]
struct KillGate {
    killed: Mutex<bool>,
    signal: Condvar,
}

impl KillGate {
    fn trip(&self) {
        *self.killed.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.signal.notify_all();
    }

    fn wait(&self) {
        let mut killed = self.killed.lock().unwrap_or_else(PoisonError::into_inner);
        while !*killed {
            killed = self
                .signal
                .wait(killed)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

struct MockStdout {
    data: Cursor<Vec<u8>>,
    hold_open: bool,
    gate: Arc<KillGate>,
}

impl Read for MockStdout {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.data.read(buf)?;
        if n == 0 && self.hold_open {
            // Behave like a pipe whose writer is still alive: block until killed.
            self.gate.wait();
        }
        Ok(n)
    }
}

/// Process produced by [`MockToolLauncher`]
pub struct MockToolProcess {
    pid: u32,
    stdout: Option<ToolStdout>,
    exited: bool,
    kill_fails: bool,
    wait_fails: bool,
    gate: Arc<KillGate>,
    kills: Arc<AtomicUsize>,
}

impl fmt::Debug for MockToolProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockToolProcess")
            .field("pid", &self.pid)
            .field("exited", &self.exited)
            .finish_non_exhaustive()
    }
}

impl ToolProcess for MockToolProcess {
    fn id(&self) -> u32 {
        self.pid
    }

    fn take_stdout(&mut self) -> Option<ToolStdout> {
        self.stdout.take()
    }

    fn has_exited(&mut self) -> io::Result<bool> {
        Ok(self.exited)
    }

    fn exit_code(&mut self) -> Option<i32> {
        self.exited.then_some(0)
    }

    fn kill(&mut self) -> io::Result<()> {
        self.kills.fetch_add(1, Ordering::SeqCst);
        if self.kill_fails {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "access is denied",
            ));
        }
        self.exited = true;
        self.gate.trip();
        Ok(())
    }

    fn wait(&mut self) -> io::Result<Option<i32>> {
        if self.wait_fails {
            return Err(io::Error::other("no child process"));
        }
        if !self.exited {
            self.gate.wait();
            self.exited = true;
        }
        Ok(Some(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(mut stdout: ToolStdout) -> Vec<String> {
        let mut lines = Vec::new();
        let mut line = String::new();
        while stdout.read_line(&mut line).expect("read") > 0 {
            lines.push(line.trim_end().to_string());
            line.clear();
        }
        lines
    }

    #[test]
    fn test_mock_launcher_records_launches() {
        let launcher = MockToolLauncher::new().with_run(MockRun::output("hello\nworld\n"));
        let mut process = launcher
            .launch(Path::new("mlc"), "--max_bandwidth")
            .expect("launch");

        assert_eq!(launcher.launch_count(), 1);
        assert_eq!(launcher.launched_arguments(), vec!["--max_bandwidth"]);
        assert_eq!(launcher.launched_programs(), vec![PathBuf::from("mlc")]);

        let stdout = process.take_stdout().expect("stdout");
        assert!(process.take_stdout().is_none());
        assert_eq!(read_all(stdout), vec!["hello", "world"]);
        assert!(process.has_exited().expect("has_exited"));
    }

    #[test]
    fn test_mock_launch_failure_is_not_recorded() {
        let launcher = MockToolLauncher::new().with_run(MockRun::launch_failure());
        let err = launcher
            .launch(Path::new("missing"), "")
            .expect_err("should fail");
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert_eq!(launcher.launch_count(), 0);
    }

    #[test]
    fn test_mock_pids_are_unique() {
        let launcher = MockToolLauncher::new();
        let a = launcher.launch(Path::new("mlc"), "").expect("launch");
        let b = launcher.launch(Path::new("mlc"), "").expect("launch");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_hanging_stdout_unblocks_on_kill() {
        let launcher = MockToolLauncher::new().with_run(MockRun::hanging("first\n"));
        let mut process = launcher.launch(Path::new("mlc"), "").expect("launch");
        let stdout = process.take_stdout().expect("stdout");

        let reader = std::thread::spawn(move || read_all(stdout));
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(!process.has_exited().expect("has_exited"));

        process.kill().expect("kill");
        assert_eq!(reader.join().expect("join"), vec!["first"]);
        assert_eq!(launcher.kill_count(), 1);
    }

    #[test]
    fn test_kill_failure_is_reported() {
        let launcher =
            MockToolLauncher::new().with_run(MockRun::hanging("").with_kill_failure());
        let mut process = launcher.launch(Path::new("mlc"), "").expect("launch");
        assert!(process.kill().is_err());
        assert!(!process.has_exited().expect("has_exited"));
    }

    #[cfg(unix)]
    #[test]
    fn test_real_launcher_captures_stdout() {
        let launcher = RealToolLauncher::new();
        let mut process = launcher
            .launch(Path::new("/bin/echo"), "Memory Latency Checker - v3.11")
            .expect("spawn echo");
        let stdout = process.take_stdout().expect("stdout");
        assert_eq!(read_all(stdout), vec!["Memory Latency Checker - v3.11"]);
        assert_eq!(process.wait().expect("wait"), Some(0));
        assert_eq!(process.exit_code(), Some(0));
    }

    #[cfg(unix)]
    #[test]
    fn test_priority_refusal_does_not_fail_launch() {
        let launcher = RealToolLauncher::new()
            .with_stderr_capture(false)
            .with_priority(ProcessPriority::Highest);
        assert_eq!(launcher.priority, ProcessPriority::Highest);
        let mut process = launcher
            .launch(Path::new("sleep"), "60")
            .expect("launch regardless of nice permission");
        process.kill().expect("kill");
        process.wait().expect("wait");
    }

    #[cfg(unix)]
    #[test]
    fn test_real_launcher_kill() {
        let launcher = RealToolLauncher::new().with_stderr_capture(false);
        let mut process = launcher
            .launch(Path::new("sleep"), "60")
            .expect("spawn sleep");
        assert!(!process.has_exited().expect("has_exited"));
        process.kill().expect("kill");
        process.wait().expect("wait");
        assert!(process.has_exited().expect("has_exited"));
    }

    #[test]
    fn test_real_launcher_missing_program() {
        let launcher = RealToolLauncher::new();
        assert!(
            launcher
                .launch(Path::new("/definitely/not/a/real/mlc"), "--help")
                .is_err()
        );
    }
}
