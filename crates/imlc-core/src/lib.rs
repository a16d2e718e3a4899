//! imlc core
//!
//! Supervises Intel Memory Latency Checker (MLC) runs: generates the
//! version-dependent command line, owns the single MLC process, parses its
//! streamed output per benchmark mode and hands results to a presentation
//! layer through a dispatcher.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
// Allow common patterns
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
// Allow common patterns in test code
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::float_cmp))]
#![cfg_attr(test, allow(clippy::redundant_clone))]

pub mod args;
pub mod cancel;
pub mod command;
pub mod config;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod parser;
pub mod presentation;
pub mod priority;
pub mod process;
pub mod tool;
pub mod version;

#[cfg(test)]
pub mod test_fixtures;

pub use args::{
    ArgumentOptions, ModePolicy, NEW_VERSION_SUFFIX, NEW_VERSIONS, TestMode, generate_arguments,
    is_new_version,
};
pub use cancel::CancellationScope;
pub use command::{
    MockRun, MockToolLauncher, RealToolLauncher, ToolLauncher, ToolProcess, ToolStdout,
};
pub use config::{ConfigStore, DEFAULT_CONFIG_FILE, MemoryConfigStore, ToolConfig, YamlConfigStore};
pub use error::{Error, Result};
pub use logging::{
    FileLogSink, LogLevel, LogPathLease, LogPathRegistry, LogSink, MemoryLogSink, TracingSink,
};
pub use orchestrator::{ModeReport, RunOutcome, RunRequest, RunSummary, TestOrchestrator, Toggle};
pub use parser::{
    BandwidthCategory, CacheCategory, INJECT_DELAYS, LatencyRow, LineParser, Measurement, ScanEnd,
    ScanReport, parser_for, scan_output,
};
pub use presentation::{
    ChannelDispatcher, DispatchQueue, Dispatcher, InlineDispatcher, Notice, ObservedEvent,
    RecordingObserver, RunObserver, dispatch_channel,
};
pub use priority::{ProcessPriority, is_elevated};
pub use process::{GRACE_PERIOD, ProcessSupervisor, StartOutcome, ToolOutput};
pub use tool::{DEFAULT_EXECUTABLE, ToolContext, default_executable};
pub use version::{PROBE_ARGUMENT, VERSION_PREFIX, probe_version};
