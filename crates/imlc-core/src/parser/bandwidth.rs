//! Max / peak injection bandwidth output

use super::{LineParser, Measurement, ParsedRow, RowOutcome, parse_leading_number};
use crate::args::TestMode;
use serde::{Deserialize, Serialize};
use std::fmt;

const MARKER_PREFIX: &str = "Using traffic";

/// Read/write mixes reported by the bandwidth test, in output order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandwidthCategory {
    /// ALL Reads
    AllReads,
    /// 3:1 Reads-Writes
    ThreeToOne,
    /// 2:1 Reads-Writes
    TwoToOne,
    /// 1:1 Reads-Writes
    OneToOne,
    /// Stream-triad like
    StreamTriad,
}

impl BandwidthCategory {
    /// All categories in row order
    pub const ALL: [Self; 5] = [
        Self::AllReads,
        Self::ThreeToOne,
        Self::TwoToOne,
        Self::OneToOne,
        Self::StreamTriad,
    ];

    /// Category reported on data row `row`
    #[must_use]
    pub fn from_row(row: usize) -> Option<Self> {
        Self::ALL.get(row).copied()
    }
}

impl fmt::Display for BandwidthCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AllReads => "ALL Reads",
            Self::ThreeToOne => "3:1 Reads-Writes",
            Self::TwoToOne => "2:1 Reads-Writes",
            Self::OneToOne => "1:1 Reads-Writes",
            Self::StreamTriad => "Stream-triad like",
        })
    }
}

/// Parser for the bandwidth table
#[derive(Debug, Clone, Copy, Default)]
pub struct BandwidthParser;

impl BandwidthParser {
    /// Create a parser
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl LineParser for BandwidthParser {
    fn mode(&self) -> TestMode {
        TestMode::Bandwidth
    }

    fn max_rows(&self) -> usize {
        BandwidthCategory::ALL.len()
    }

    fn should_arm(&mut self, line: &str) -> bool {
        line.starts_with(MARKER_PREFIX)
    }

    fn process_row(&mut self, line: &str, row: usize) -> ParsedRow {
        let segments: Vec<&str> = line.split(':').filter(|s| !s.is_empty()).collect();
        if segments.len() < 2 {
            return ParsedRow::malformed(&segments);
        }
        let Some(mb_per_sec) = segments.last().and_then(|s| parse_leading_number(s)) else {
            return ParsedRow::malformed(&segments);
        };
        let Some(category) = BandwidthCategory::from_row(row) else {
            return ParsedRow::malformed(&segments);
        };

        ParsedRow::measured(
            Measurement::Bandwidth {
                category,
                mb_per_sec,
            },
            RowOutcome::Continue,
        )
    }
}
