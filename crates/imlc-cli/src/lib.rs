//! imlc CLI library
//!
//! Helpers behind the `imlc` binary: sink and config construction, result
//! formatting and the console observer that plays the UI thread.

#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
// Allow common patterns in test code
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

use imlc_core::{
    BandwidthCategory, ConfigStore, DEFAULT_CONFIG_FILE, FileLogSink, INJECT_DELAYS,
    LogPathRegistry, LogSink, Measurement, MemoryConfigStore, Notice, RunObserver, RunOutcome,
    RunSummary, TestMode, TracingSink, YamlConfigStore,
};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

/// Exit code after Ctrl-C or a cancelled run (128 + SIGINT)
pub const EXIT_INTERRUPTED: i32 = 130;

/// Result of a CLI operation
#[derive(Debug)]
pub enum CliResult {
    /// Operation succeeded
    Success(String),
    /// Operation failed with error
    Error(String),
}

impl CliResult {
    /// Returns true if the result is a success
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns the message
    pub fn message(&self) -> &str {
        match self {
            Self::Success(msg) | Self::Error(msg) => msg,
        }
    }

    /// Print to stdout or stderr and return the process exit code
    pub fn report(&self) -> i32 {
        match self {
            Self::Success(msg) => {
                println!("{msg}");
                0
            }
            Self::Error(msg) => {
                eprintln!("{msg}");
                1
            }
        }
    }
}

/// Process exit code for a finished run
pub fn exit_code_for(outcome: &RunOutcome) -> i32 {
    match outcome {
        RunOutcome::Completed { .. } => 0,
        RunOutcome::Cancelled => EXIT_INTERRUPTED,
        _ => 1,
    }
}

/// Startup warning for an unprivileged run; `elevated` as from [`imlc_core::is_elevated`]
pub fn elevation_warning(elevated: Option<bool>) -> Option<&'static str> {
    (elevated == Some(false)).then_some(
        "You are not running imlc as root. It is strongly recommended to run it \
         with elevated rights to obtain accurate data.",
    )
}

/// clap value parser for `--inject-delay`
///
/// MLC takes the delay as a plain number of cycles. Short values are padded
/// to the five-digit tag MLC prints, so `200` and `00200` are the same delay.
pub fn parse_inject_delay(value: &str) -> Result<String, String> {
    let value = value.trim();
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!("inject delay must be a number of cycles, got {value:?}"));
    }
    if value.len() > 5 {
        return Err(format!("inject delay {value} is longer than five digits"));
    }
    let padded = format!("{value:0>5}");
    if !INJECT_DELAYS.contains(&padded.as_str()) {
        return Err(format!(
            "unknown inject delay {padded}; expected one of {}",
            INJECT_DELAYS.join(", ")
        ));
    }
    Ok(padded)
}

/// Log sink for this invocation: a file when `log_file` is given, else `tracing`
pub fn build_sink(
    log_file: Option<&Path>,
    registry: &LogPathRegistry,
) -> imlc_core::Result<Arc<dyn LogSink>> {
    match log_file {
        Some(path) => Ok(Arc::new(FileLogSink::open(registry, path)?)),
        None => Ok(Arc::new(TracingSink)),
    }
}

/// Config store for this invocation
///
/// `--mlc` overrides the stored path for one run without persisting it.
pub fn open_config_store(
    config: Option<&Path>,
    mlc_override: Option<&Path>,
) -> imlc_core::Result<Arc<dyn ConfigStore>> {
    if let Some(mlc) = mlc_override {
        return Ok(Arc::new(MemoryConfigStore::with_tool_path(
            mlc.display().to_string(),
        )));
    }
    let path = config.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    Ok(Arc::new(YamlConfigStore::open(path)?))
}

/// One-line rendering of a measurement
pub fn format_measurement(measurement: &Measurement) -> String {
    match measurement {
        Measurement::Latency(row) => format!(
            "{:>5}  {:>8.2} ns  {:>10.1} MB/sec  [{:>3}%]",
            row.inject_delay, row.latency_ns, row.bandwidth_mb_s, row.progress
        ),
        Measurement::Bandwidth {
            category,
            mb_per_sec,
        } => format!("{:<18} {mb_per_sec:>10.1} MB/sec", format!("{category}:")),
        Measurement::Cache {
            category,
            latency_ns,
        } => format!("{:<18} {latency_ns:>10.1} ns", format!("{category}:")),
        Measurement::Quick {
            mode: TestMode::QuickBandwidth,
            value,
        } => format!("{:<18} {value:>10.1} MB/sec", "Bandwidth:"),
        Measurement::Quick { value, .. } => format!("{:<18} {value:>10.1} ns", "Latency:"),
    }
}

/// Header printed when a mode's results are reset
pub fn mode_heading(mode: TestMode) -> String {
    match mode {
        TestMode::Latency => "Inject  Latency     Bandwidth".to_string(),
        TestMode::Bandwidth => format!("Bandwidth ({} mixes)", BandwidthCategory::ALL.len()),
        TestMode::Cache => "Cache-to-cache transfer latency".to_string(),
        TestMode::QuickBandwidth | TestMode::QuickLatency => format!("Quick test ({mode})"),
    }
}

/// Observer that prints to the terminal and keeps the final summary
#[derive(Debug, Default)]
pub struct ConsoleObserver {
    json: bool,
    summary: Mutex<Option<RunSummary>>,
}

impl ConsoleObserver {
    /// With `json`, rows are not printed; the summary is emitted instead
    pub fn new(json: bool) -> Self {
        Self {
            json,
            summary: Mutex::new(None),
        }
    }

    /// Summary of the finished run, once there is one
    pub fn summary(&self) -> Option<RunSummary> {
        self.summary
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn line(&self, text: &str) {
        if self.json {
            return;
        }
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{text}");
    }
}

impl RunObserver for ConsoleObserver {
    fn on_reset(&self, mode: TestMode) {
        self.line(&mode_heading(mode));
    }

    fn on_measurement(&self, measurement: &Measurement) {
        self.line(&format_measurement(measurement));
    }

    fn on_notice(&self, notice: &Notice) {
        eprintln!("{notice}");
    }

    fn on_run_finished(&self, summary: &RunSummary) {
        if summary.outcome == RunOutcome::Cancelled {
            self.line("Cancelled.");
        }
        *self.summary.lock().unwrap_or_else(PoisonError::into_inner) = Some(summary.clone());
    }
}

/// Pretty JSON for `--json`
pub fn summary_json(summary: &RunSummary) -> imlc_core::Result<String> {
    Ok(serde_json::to_string_pretty(summary)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use imlc_core::{CacheCategory, LatencyRow, RunRequest};

    #[test]
    fn test_cli_result() {
        assert!(CliResult::Success("v3.11".into()).is_success());
        let err = CliResult::Error("boom".into());
        assert!(!err.is_success());
        assert_eq!(err.message(), "boom");
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code_for(&RunOutcome::Completed { rows: 5 }), 0);
        assert_eq!(exit_code_for(&RunOutcome::Cancelled), EXIT_INTERRUPTED);
        assert_eq!(exit_code_for(&RunOutcome::NoData), 1);
        assert_eq!(exit_code_for(&RunOutcome::Malformed { rows: 2 }), 1);
    }

    #[test]
    fn test_elevation_warning() {
        assert!(elevation_warning(Some(true)).is_none());
        assert!(elevation_warning(None).is_none());
        let warning = elevation_warning(Some(false)).expect("warning");
        assert!(warning.contains("accurate data"));
    }

    #[test]
    fn test_parse_inject_delay() {
        assert_eq!(parse_inject_delay("200").as_deref(), Ok("00200"));
        assert_eq!(parse_inject_delay("00000").as_deref(), Ok("00000"));
        assert_eq!(parse_inject_delay(" 20000 ").as_deref(), Ok("20000"));
        assert!(parse_inject_delay("").is_err());
        assert!(parse_inject_delay("-5").is_err());
        assert!(parse_inject_delay("123456").is_err());
        assert!(parse_inject_delay("00001").is_err());
    }

    #[test]
    fn test_format_measurement() {
        let row = Measurement::Latency(LatencyRow {
            index: 0,
            inject_delay: "00000".into(),
            latency_ns: 261.65,
            bandwidth_mb_s: 225_060.9,
            progress: 5,
        });
        assert_eq!(
            format_measurement(&row),
            "00000    261.65 ns    225060.9 MB/sec  [  5%]"
        );
        let cache = Measurement::Cache {
            category: CacheCategory::L2HitM,
            latency_ns: 53.4,
        };
        assert!(format_measurement(&cache).starts_with("L2->L2 HITM:"));
        let quick = Measurement::Quick {
            mode: TestMode::QuickLatency,
            value: 82.3,
        };
        assert!(format_measurement(&quick).ends_with("82.3 ns"));
    }

    #[test]
    fn test_build_sink_rejects_shared_log_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("imlcgui.log");
        let registry = LogPathRegistry::new();
        let first = build_sink(Some(&path), &registry).expect("first");
        assert!(build_sink(Some(&path), &registry).is_err());
        drop(first);
        assert!(build_sink(Some(&path), &registry).is_ok());
    }

    #[test]
    fn test_mlc_override_is_not_persisted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = dir.path().join("imlc.yaml");
        let store = open_config_store(Some(&config), Some(Path::new("/opt/mlc/mlc")))
            .expect("store");
        assert_eq!(store.tool_path(), "/opt/mlc/mlc");
        store.set_tool_path("/elsewhere/mlc").expect("set");
        assert!(!config.exists());
    }

    #[test]
    fn test_console_observer_keeps_summary() {
        let observer = ConsoleObserver::new(true);
        assert!(observer.summary().is_none());
        let summary = RunSummary {
            request: RunRequest::Cache,
            started_at: chrono::Utc::now(),
            duration_ms: 12,
            outcome: RunOutcome::NoData,
            modes: Vec::new(),
            measurements: Vec::new(),
        };
        observer.on_run_finished(&summary);
        assert_eq!(observer.summary(), Some(summary.clone()));
        let json = summary_json(&summary).expect("json");
        assert!(json.contains("\"status\": \"no_data\""));
    }
}
