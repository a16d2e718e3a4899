//! MLC argument policy
//!
//! Maps `(detected version, test mode, options)` to the argument string passed
//! to the MLC executable. Version-dependent differences live in one table so
//! the compatibility matrix can be audited and tested on its own.

use serde::{Deserialize, Serialize};
use std::fmt;

/// MLC releases that expect the extra `-e0` flag on latency-style runs
pub const NEW_VERSIONS: &[&str] = &["v3.10", "v3.11"];

/// Flag appended for versions in [`NEW_VERSIONS`]
pub const NEW_VERSION_SUFFIX: &str = "-e0";

/// Benchmark mode understood by the argument generator and the parsers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestMode {
    /// Max or peak injection bandwidth
    Bandwidth,
    /// Cache-to-cache transfer latency
    Cache,
    /// Loaded latency sweep across inject delays
    Latency,
    /// Bandwidth matrix, first half of the quick test
    QuickBandwidth,
    /// Idle latency matrix, second half of the quick test
    QuickLatency,
}

impl TestMode {
    /// Every mode, in policy-table order
    pub const ALL: [Self; 5] = [
        Self::Bandwidth,
        Self::Cache,
        Self::Latency,
        Self::QuickBandwidth,
        Self::QuickLatency,
    ];

    /// Short label used in log lines and notices
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Bandwidth => "bandwidth",
            Self::Cache => "cache",
            Self::Latency => "latency",
            Self::QuickBandwidth => "quick bandwidth",
            Self::QuickLatency => "quick latency",
        }
    }

    /// Policy row for this mode
    #[must_use]
    pub fn policy(self) -> &'static ModePolicy {
        // POLICY_TABLE is indexed in `ALL` order
        &POLICY_TABLE[self as usize]
    }
}

impl fmt::Display for TestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One row of the argument policy table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModePolicy {
    /// Mode this row describes
    pub mode: TestMode,
    /// Base flag
    pub base_flag: &'static str,
    /// Base flag used instead when peak injection is requested
    pub peak_flag: Option<&'static str>,
    /// Whether [`NEW_VERSION_SUFFIX`] is appended for new versions
    pub version_suffix: bool,
    /// Whether an inject-delay override is forwarded as `-d<value>`
    pub accepts_inject_delay: bool,
}

/// The full version-compatibility matrix
pub const POLICY_TABLE: [ModePolicy; 5] = [
    ModePolicy {
        mode: TestMode::Bandwidth,
        base_flag: "--max_bandwidth",
        peak_flag: Some("--peak_injection_bandwidth"),
        version_suffix: false,
        accepts_inject_delay: false,
    },
    ModePolicy {
        mode: TestMode::Cache,
        base_flag: "--c2c_latency",
        peak_flag: None,
        version_suffix: true,
        accepts_inject_delay: false,
    },
    ModePolicy {
        mode: TestMode::Latency,
        base_flag: "--loaded_latency",
        peak_flag: None,
        version_suffix: true,
        accepts_inject_delay: true,
    },
    ModePolicy {
        mode: TestMode::QuickBandwidth,
        base_flag: "--bandwidth_matrix",
        peak_flag: None,
        version_suffix: false,
        accepts_inject_delay: false,
    },
    ModePolicy {
        mode: TestMode::QuickLatency,
        base_flag: "--latency_matrix",
        peak_flag: None,
        version_suffix: true,
        accepts_inject_delay: false,
    },
];

/// Per-run options that feed the argument generator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentOptions {
    /// Use peak injection bandwidth instead of max bandwidth
    pub peak_injection: bool,
    /// Single inject delay to measure instead of the full sweep
    pub inject_delay: Option<String>,
}

impl ArgumentOptions {
    /// Options requesting peak injection bandwidth
    #[must_use]
    pub fn peak() -> Self {
        Self {
            peak_injection: true,
            inject_delay: None,
        }
    }

    /// Options requesting a single inject delay
    #[must_use]
    pub fn with_inject_delay(delay: impl Into<String>) -> Self {
        Self {
            peak_injection: false,
            inject_delay: Some(delay.into()),
        }
    }
}

/// Whether `version` is one of the releases needing [`NEW_VERSION_SUFFIX`]
///
/// Unknown and absent versions count as "not new".
#[must_use]
pub fn is_new_version(version: Option<&str>) -> bool {
    version.is_some_and(|v| NEW_VERSIONS.contains(&v.trim()))
}

/// Build the MLC argument string for a run
#[must_use]
pub fn generate_arguments(
    version: Option<&str>,
    mode: TestMode,
    options: &ArgumentOptions,
) -> String {
    let policy = mode.policy();

    let base = match policy.peak_flag {
        Some(peak) if options.peak_injection => peak,
        _ => policy.base_flag,
    };
    let mut arguments = base.to_string();

    if policy.accepts_inject_delay {
        if let Some(delay) = options.inject_delay.as_deref() {
            arguments.push_str(" -d");
            arguments.push_str(delay.trim());
        }
    }

    if policy.version_suffix && is_new_version(version) {
        arguments.push(' ');
        arguments.push_str(NEW_VERSION_SUFFIX);
    }

    arguments
}
