//! Bandwidth / latency matrix output used by the quick test

use super::{LineParser, Measurement, ParsedRow, RowOutcome, parse_leading_number};
use crate::args::TestMode;

const MARKER_PREFIX: &str = "Numa node";

/// Parser for one half of the quick test
///
/// Only the first row after the header is read: on a single-node system it
/// holds the local value.
#[derive(Debug, Clone, Copy)]
pub struct QuickParser {
    mode: TestMode,
}

impl QuickParser {
    /// Parser for [`TestMode::QuickBandwidth`] or [`TestMode::QuickLatency`]
    #[must_use]
    pub fn new(mode: TestMode) -> Self {
        Self { mode }
    }
}

impl LineParser for QuickParser {
    fn mode(&self) -> TestMode {
        self.mode
    }

    fn max_rows(&self) -> usize {
        1
    }

    fn should_arm(&mut self, line: &str) -> bool {
        line.starts_with(MARKER_PREFIX)
    }

    fn process_row(&mut self, line: &str, _row: usize) -> ParsedRow {
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            [_, value] => match parse_leading_number(value) {
                Some(value) => ParsedRow::measured(
                    Measurement::Quick {
                        mode: self.mode,
                        value,
                    },
                    RowOutcome::StopSuccess,
                ),
                None => ParsedRow::malformed(&fields),
            },
            _ => ParsedRow::malformed(&fields),
        }
    }
}
