//! Loaded latency (`--loaded_latency`) output

use super::{LineParser, Measurement, ParsedRow, RowOutcome};
use crate::args::TestMode;
use serde::{Deserialize, Serialize};

/// Inject delays MLC sweeps through, in output order
pub const INJECT_DELAYS: [&str; 19] = [
    "00000", "00002", "00008", "00015", "00050", "00100", "00200", "00300", "00400", "00500",
    "00700", "01000", "01300", "01700", "02500", "03500", "05000", "09000", "20000",
];

const MARKER: &str = "==========================";

/// One row of the loaded latency table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyRow {
    /// Position of the delay in [`INJECT_DELAYS`]
    pub index: usize,
    /// Inject delay tag as printed by MLC
    pub inject_delay: String,
    /// Latency in ns
    pub latency_ns: f64,
    /// Bandwidth in MB/sec
    pub bandwidth_mb_s: f64,
    /// Overall progress in percent
    pub progress: u8,
}

/// Parser for the loaded latency table
#[derive(Debug, Clone, Default)]
pub struct LatencyParser {
    single_delay: bool,
}

impl LatencyParser {
    /// `single_delay` is set when MLC was asked for one inject delay only
    #[must_use]
    pub fn new(single_delay: bool) -> Self {
        Self { single_delay }
    }

    fn progress(&self, index: usize) -> u8 {
        if self.single_delay {
            100
        } else {
            ((index + 1) * 100 / INJECT_DELAYS.len()) as u8
        }
    }
}

impl LineParser for LatencyParser {
    fn mode(&self) -> TestMode {
        TestMode::Latency
    }

    fn max_rows(&self) -> usize {
        INJECT_DELAYS.len()
    }

    fn should_arm(&mut self, line: &str) -> bool {
        line == MARKER
    }

    fn process_row(&mut self, line: &str, _row: usize) -> ParsedRow {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [delay, latency, bandwidth] = fields.as_slice() else {
            return ParsedRow::malformed(&fields);
        };

        let Some(index) = INJECT_DELAYS.iter().position(|d| d == delay) else {
            return ParsedRow::skipped(format!("Skipping unknown inject delay = {delay}"));
        };

        let (Ok(latency_ns), Ok(bandwidth_mb_s)) =
            (latency.parse::<f64>(), bandwidth.parse::<f64>())
        else {
            return ParsedRow::malformed(&fields);
        };

        ParsedRow::measured(
            Measurement::Latency(LatencyRow {
                index,
                inject_delay: (*delay).to_string(),
                latency_ns,
                bandwidth_mb_s,
                progress: self.progress(index),
            }),
            RowOutcome::Continue,
        )
    }
}
