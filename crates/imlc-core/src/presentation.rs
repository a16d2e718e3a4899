//! Contracts between the core and whatever displays results
//!
//! Workers never touch presentation state directly. Every callback on a
//! [`RunObserver`] is boxed and handed to a [`Dispatcher`], which decides on
//! which thread it runs.

use crate::args::TestMode;
use crate::error::Error;
use crate::orchestrator::RunSummary;
use crate::parser::Measurement;
use std::fmt;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Deferred presentation update
pub type UiTask = Box<dyn FnOnce() + Send>;

/// Marshals work onto the presentation thread
pub trait Dispatcher: Send + Sync + fmt::Debug {
    /// Queue `task`; completion is asynchronous
    fn dispatch(&self, task: UiTask);
}

/// Runs tasks immediately on the calling thread
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineDispatcher;

impl Dispatcher for InlineDispatcher {
    fn dispatch(&self, task: UiTask) {
        task();
    }
}

/// Sends tasks to a [`DispatchQueue`] drained by the presentation thread
#[derive(Debug, Clone)]
pub struct ChannelDispatcher {
    sender: Sender<UiTask>,
}

impl Dispatcher for ChannelDispatcher {
    fn dispatch(&self, task: UiTask) {
        if self.sender.send(task).is_err() {
            tracing::debug!("presentation queue closed; dropping update");
        }
    }
}

/// Receiving end of a [`ChannelDispatcher`]
pub struct DispatchQueue {
    receiver: Receiver<UiTask>,
}

impl fmt::Debug for DispatchQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchQueue").finish_non_exhaustive()
    }
}

/// Create a connected dispatcher and queue
#[must_use]
pub fn dispatch_channel() -> (ChannelDispatcher, DispatchQueue) {
    let (sender, receiver) = mpsc::channel();
    (ChannelDispatcher { sender }, DispatchQueue { receiver })
}

impl DispatchQueue {
    /// Run every task queued so far; returns how many ran
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.receiver.try_recv() {
            task();
            ran += 1;
        }
        ran
    }

    /// Wait up to `timeout` for one task and run it
    ///
    /// Returns `false` on timeout or once every dispatcher is gone.
    pub fn run_next(&self, timeout: Duration) -> bool {
        match self.receiver.recv_timeout(timeout) {
            Ok(task) => {
                task();
                true
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => false,
        }
    }
}

/// User-facing message raised by the core
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The version probe found nothing
    VersionUnavailable,
    /// No executable at the configured path
    ToolNotFound {
        /// Path that was checked
        path: PathBuf,
    },
    /// MLC could not be started
    LaunchFailed {
        /// Mode being started
        mode: TestMode,
        /// Error text
        reason: String,
    },
    /// MLC printed something the parser does not understand
    MalformedOutput {
        /// Mode being parsed
        mode: TestMode,
    },
    /// The mode's result table never appeared
    NoData {
        /// Mode being parsed
        mode: TestMode,
    },
    /// Path change attempted during a run
    ToolBusy,
    /// Chosen path is not an executable file
    InvalidExecutable {
        /// Rejected path
        path: PathBuf,
    },
}

impl Notice {
    /// Notice describing a validation or configuration error, if it has one
    #[must_use]
    pub fn from_error(error: &Error) -> Option<Self> {
        match error {
            Error::VersionUnavailable => Some(Self::VersionUnavailable),
            Error::ToolNotFound { path } => Some(Self::ToolNotFound { path: path.clone() }),
            Error::ToolBusy => Some(Self::ToolBusy),
            Error::InvalidExecutable { path } => {
                Some(Self::InvalidExecutable { path: path.clone() })
            }
            _ => None,
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VersionUnavailable => write!(
                f,
                "Could not fetch the MLC version. Please check the configured path."
            ),
            Self::ToolNotFound { path } => write!(
                f,
                "Failed to find MLC at \"{}\". Please visit the Configure tab.",
                path.display()
            ),
            Self::LaunchFailed { mode, reason } => {
                write!(f, "Failed to start Intel MLC for the {mode} test: {reason}")
            }
            Self::MalformedOutput { mode } => write!(
                f,
                "Intel MLC printed {mode} output in an unexpected format. \
                 Please report this issue along with the logs file."
            ),
            Self::NoData { mode } => write!(
                f,
                "Failed to fetch {mode} data from Intel MLC. Please check the logs file for any errors."
            ),
            Self::ToolBusy => write!(f, "Cannot modify MLC path whilst MLC is running."),
            Self::InvalidExecutable { .. } => write!(f, "Please select a valid exe."),
        }
    }
}

/// Receiver of run progress, always invoked through a [`Dispatcher`]
pub trait RunObserver: Send + Sync {
    /// Clear any result shown for `mode`
    fn on_reset(&self, mode: TestMode);

    /// A parsed result row
    fn on_measurement(&self, measurement: &Measurement);

    /// A message for the user
    fn on_notice(&self, notice: &Notice);

    /// The run ended; controls can be re-enabled
    fn on_run_finished(&self, summary: &RunSummary);
}

/// Event captured by [`RecordingObserver`]
#[derive(Debug, Clone, PartialEq)]
pub enum ObservedEvent {
    /// `on_reset`
    Reset(TestMode),
    /// `on_measurement`
    Measurement(Measurement),
    /// `on_notice`
    Notice(Notice),
    /// `on_run_finished`
    Finished(RunSummary),
}

/// Observer that records every callback, for tests and headless use
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    events: Arc<Mutex<Vec<ObservedEvent>>>,
}

impl RecordingObserver {
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: ObservedEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    /// Snapshot of recorded events
    #[must_use]
    pub fn events(&self) -> Vec<ObservedEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Recorded measurements
    #[must_use]
    pub fn measurements(&self) -> Vec<Measurement> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ObservedEvent::Measurement(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    /// Recorded notices
    #[must_use]
    pub fn notices(&self) -> Vec<Notice> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ObservedEvent::Notice(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    /// Summaries of finished runs
    #[must_use]
    pub fn finished(&self) -> Vec<RunSummary> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ObservedEvent::Finished(s) => Some(s),
                _ => None,
            })
            .collect()
    }
}

impl RunObserver for RecordingObserver {
    fn on_reset(&self, mode: TestMode) {
        self.push(ObservedEvent::Reset(mode));
    }

    fn on_measurement(&self, measurement: &Measurement) {
        self.push(ObservedEvent::Measurement(measurement.clone()));
    }

    fn on_notice(&self, notice: &Notice) {
        self.push(ObservedEvent::Notice(notice.clone()));
    }

    fn on_run_finished(&self, summary: &RunSummary) {
        self.push(ObservedEvent::Finished(summary.clone()));
    }
}
