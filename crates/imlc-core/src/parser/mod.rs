//! Line-oriented MLC output parsing
//!
//! Every mode uses the same two-phase scan: lines are discarded until the
//! mode's marker line arms the parser, then each following line is handed to
//! [`LineParser::process_row`] until the parser stops, the row limit is
//! reached, or the stream ends. The cancellation scope is polled before and
//! after every line read.

mod bandwidth;
mod cache;
mod latency;
mod quick;

pub use bandwidth::{BandwidthCategory, BandwidthParser};
pub use cache::{CacheCategory, CacheParser};
pub use latency::{INJECT_DELAYS, LatencyParser, LatencyRow};
pub use quick::QuickParser;

use crate::args::TestMode;
use crate::cancel::CancellationScope;
use crate::error::Result;
use crate::logging::{LogLevel, LogSink};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use std::sync::LazyLock;

/// Leading run of digits, `.` and `,`
static NUMERIC_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^[0-9.,]+").expect("static regex")
});

/// One parsed result row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Measurement {
    /// One inject-delay row of the loaded latency sweep
    Latency(LatencyRow),
    /// One read/write mix of the bandwidth test
    Bandwidth {
        /// Traffic mix
        category: BandwidthCategory,
        /// Bandwidth in MB/sec
        mb_per_sec: f64,
    },
    /// One cache-to-cache transfer latency
    Cache {
        /// Transfer kind
        category: CacheCategory,
        /// Latency in ns
        latency_ns: f64,
    },
    /// The single value of a quick bandwidth or quick latency run
    Quick {
        /// Which half of the quick test
        mode: TestMode,
        /// MB/sec for bandwidth, ns for latency
        value: f64,
    },
}

/// What the scan should do after a processed row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    /// Keep consuming rows
    Continue,
    /// This was the last expected row
    StopSuccess,
    /// The row broke the mode's format; stop collecting
    StopMalformed,
}

/// Result of processing one data line
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRow {
    /// Scan control
    pub outcome: RowOutcome,
    /// Measurement produced by this line, if any
    pub measurement: Option<Measurement>,
    /// Warning to record in the log
    pub warning: Option<String>,
}

impl ParsedRow {
    /// A row that produced a measurement
    #[must_use]
    pub fn measured(measurement: Measurement, outcome: RowOutcome) -> Self {
        Self {
            outcome,
            measurement: Some(measurement),
            warning: None,
        }
    }

    /// A row that was skipped without ending the scan
    #[must_use]
    pub fn skipped(warning: impl Into<String>) -> Self {
        Self {
            outcome: RowOutcome::Continue,
            measurement: None,
            warning: Some(warning.into()),
        }
    }

    /// A row that does not match the expected format
    #[must_use]
    pub fn malformed<S: AsRef<str>>(fields: &[S]) -> Self {
        let joined = fields.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(", ");
        Self {
            outcome: RowOutcome::StopMalformed,
            measurement: None,
            warning: Some(format!("Found unknown output line: [{joined}]")),
        }
    }
}

/// Per-mode output state machine
pub trait LineParser: Send {
    /// Mode this parser understands
    fn mode(&self) -> TestMode;

    /// Maximum number of data rows the mode produces
    fn max_rows(&self) -> usize;

    /// Whether `line` is the marker that precedes the data rows
    fn should_arm(&mut self, line: &str) -> bool;

    /// Parse the data row at index `row`
    fn process_row(&mut self, line: &str, row: usize) -> ParsedRow;
}

/// Build the parser for `mode`
///
/// `single_delay` marks a latency run restricted to one inject delay.
#[must_use]
pub fn parser_for(mode: TestMode, single_delay: bool) -> Box<dyn LineParser> {
    match mode {
        TestMode::Bandwidth => Box::new(BandwidthParser::new()),
        TestMode::Cache => Box::new(CacheParser::new()),
        TestMode::Latency => Box::new(LatencyParser::new(single_delay)),
        TestMode::QuickBandwidth | TestMode::QuickLatency => Box::new(QuickParser::new(mode)),
    }
}

/// Transient scan state for one consumption call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseState {
    /// Marker line seen
    pub armed: bool,
    /// Data rows processed so far
    pub rows: usize,
}

/// Why a scan stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEnd {
    /// The process closed its output
    EndOfStream,
    /// The parser reported its last expected row
    Finished,
    /// The mode's maximum row count was reached
    RowLimit,
    /// A data line did not match the expected format
    Malformed {
        /// Offending line
        line: String,
    },
    /// Reading the output failed
    ReadError {
        /// Error text
        reason: String,
    },
}

/// Summary of one completed (non-cancelled) scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    /// Final parse state
    pub state: ParseState,
    /// Measurements emitted
    pub measurements: usize,
    /// Why the scan stopped
    pub end: ScanEnd,
}

impl ScanReport {
    /// Whether the marker line was never seen
    #[must_use]
    pub fn no_data(&self) -> bool {
        !self.state.armed
    }

    /// Whether collection ended on a malformed line
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        matches!(self.end, ScanEnd::Malformed { .. })
    }
}

/// Consume `reader` line by line through `parser`
///
/// Every line is written to `sink` at [`LogLevel::Process`]. Measurements are
/// handed to `emit` as they are parsed. Returns `Err(Error::Cancelled)` as
/// soon as a checkpoint observes a triggered scope.
pub fn scan_output(
    reader: &mut dyn BufRead,
    scope: &CancellationScope,
    parser: &mut dyn LineParser,
    sink: &dyn LogSink,
    emit: &mut dyn FnMut(Measurement),
) -> Result<ScanReport> {
    let mut state = ParseState::default();
    let mut measurements = 0;
    let mut buf = String::new();

    let end = loop {
        scope.check()?;
        buf.clear();
        let read = reader.read_line(&mut buf);
        scope.check()?;

        match read {
            Ok(0) => break ScanEnd::EndOfStream,
            Ok(_) => {}
            Err(e) => {
                sink.warn(&format!("Failed to read {} output: {e}", parser.mode()));
                break ScanEnd::ReadError {
                    reason: e.to_string(),
                };
            }
        }

        let line = buf.trim_end_matches(['\r', '\n']);
        sink.log(LogLevel::Process, line);

        if !state.armed {
            state.armed = parser.should_arm(line);
            continue;
        }

        let parsed = parser.process_row(line, state.rows);
        state.rows += 1;
        if let Some(warning) = parsed.warning.as_deref() {
            sink.warn(warning);
        }
        if let Some(measurement) = parsed.measurement {
            measurements += 1;
            emit(measurement);
        }

        match parsed.outcome {
            RowOutcome::Continue if state.rows >= parser.max_rows() => break ScanEnd::RowLimit,
            RowOutcome::Continue => {}
            RowOutcome::StopSuccess => break ScanEnd::Finished,
            RowOutcome::StopMalformed => {
                break ScanEnd::Malformed {
                    line: line.to_string(),
                };
            }
        }
    };

    Ok(ScanReport {
        state,
        measurements,
        end,
    })
}

/// Leading numeric token of `text` after trimming (digits, `.` and `,` only)
#[must_use]
pub fn leading_numeric_token(text: &str) -> Option<&str> {
    NUMERIC_TOKEN.find(text.trim()).map(|m| m.as_str())
}

/// Parse the leading numeric token of `text`, treating `,` as a thousands separator
#[must_use]
pub fn parse_leading_number(text: &str) -> Option<f64> {
    let token = leading_numeric_token(text)?;
    token.replace(',', "").parse::<f64>().ok()
}
