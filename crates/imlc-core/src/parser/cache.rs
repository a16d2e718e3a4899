//! Cache-to-cache transfer latency (`--c2c_latency`) output

use super::{LineParser, Measurement, ParsedRow, RowOutcome, parse_leading_number};
use crate::args::TestMode;
use serde::{Deserialize, Serialize};
use std::fmt;

const MARKER_PREFIX: &str = "Using small pages";
const SPLIT_TOKEN: &str = "latency";

/// Cache transfer kinds, in output order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheCategory {
    /// L2->L2 HIT
    L2Hit,
    /// L2->L2 HITM
    L2HitM,
}

impl CacheCategory {
    /// All categories in row order
    pub const ALL: [Self; 2] = [Self::L2Hit, Self::L2HitM];
}

impl fmt::Display for CacheCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::L2Hit => "L2->L2 HIT",
            Self::L2HitM => "L2->L2 HITM",
        })
    }
}

/// Parser for the cache-to-cache table
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheParser;

impl CacheParser {
    /// Create a parser
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl LineParser for CacheParser {
    fn mode(&self) -> TestMode {
        TestMode::Cache
    }

    fn max_rows(&self) -> usize {
        CacheCategory::ALL.len()
    }

    fn should_arm(&mut self, line: &str) -> bool {
        line.starts_with(MARKER_PREFIX)
    }

    fn process_row(&mut self, line: &str, row: usize) -> ParsedRow {
        let segments: Vec<&str> = line.split(SPLIT_TOKEN).filter(|s| !s.is_empty()).collect();
        let [_, value] = segments.as_slice() else {
            return ParsedRow::malformed(&segments);
        };
        let (Some(latency_ns), Some(&category)) =
            (parse_leading_number(value), CacheCategory::ALL.get(row))
        else {
            return ParsedRow::malformed(&segments);
        };
        ParsedRow::measured(
            Measurement::Cache {
                category,
                latency_ns,
            },
            RowOutcome::Continue,
        )
    }
}
