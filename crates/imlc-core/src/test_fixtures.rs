//! Test fixtures for imlc-core unit tests
//!
//! Canned MLC transcripts for every mode plus helpers that run them through
//! the scanner without spawning a process.

use crate::args::TestMode;
use crate::cancel::CancellationScope;
use crate::error::Result;
use crate::logging::MemoryLogSink;
use crate::parser::{LatencyRow, Measurement, ScanReport, parser_for, scan_output};
use std::io::Cursor;

/// `--loaded_latency` transcript with all 19 inject delays
pub const LATENCY_OUTPUT: &str = "\
Intel(R) Memory Latency Checker - v3.11
Command line parameters: --loaded_latency -e0

Using buffer size of 100.000MiB/thread for reads and an additional 100.000MiB/thread for writes

Measuring Loaded Latencies for the system
Using all the threads from each core if Hyper-threading is enabled
Using Read-only traffic type
Inject\tLatency\tBandwidth
Delay\t(ns)\tMB/sec
==========================
 00000\t261.65\t 225060.9
 00002\t252.15\t 214060.6
 00008\t242.65\t 203060.3
 00015\t233.15\t 192060.0
 00050\t223.65\t 181059.7
 00100\t214.15\t 170059.4
 00200\t204.65\t 159059.1
 00300\t195.15\t 148058.8
 00400\t185.65\t 137058.5
 00500\t176.15\t 126058.2
 00700\t166.65\t 115057.9
 01000\t157.15\t 104057.6
 01300\t147.65\t 93057.3
 01700\t138.15\t 82057.0
 02500\t128.65\t 71056.7
 03500\t119.15\t 60056.4
 05000\t109.65\t 49056.1
 09000\t100.15\t 38055.8
 20000\t90.65\t 27055.5
";

/// `--max_bandwidth` transcript
pub const BANDWIDTH_OUTPUT: &str = "\
Intel(R) Memory Latency Checker - v3.11
Command line parameters: --max_bandwidth -e0

Using buffer size of 100.000MiB/thread for reads and an additional 100.000MiB/thread for writes

Measuring Maximum Memory Bandwidths for the system
Will take several minutes to complete as multiple injection rates will be tried to get the best bandwidth
Bandwidths are in MB/sec (1 MB/sec = 1,000,000 Bytes/sec)
Using all the threads from each core if Hyper-threading is enabled
Using traffic with the following read-write ratios
ALL Reads        :      225000.5
3:1 Reads-Writes :      200001.3
2:1 Reads-Writes :      198765.4
1:1 Reads-Writes :      180123.9
Stream-triad like:      190456.2
";

/// `--c2c_latency` transcript
pub const CACHE_OUTPUT: &str = "\
Intel(R) Memory Latency Checker - v3.11
Command line parameters: --c2c_latency -e0

Measuring cache-to-cache transfer latency (in ns)...
Using small pages for allocating buffers
Local Socket L2->L2 HIT  latency\t48.3
Local Socket L2->L2 HITM latency\t53.4
";

/// `--bandwidth_matrix` transcript on a single-node system
pub const QUICK_BANDWIDTH_OUTPUT: &str = "\
Intel(R) Memory Latency Checker - v3.11
Command line parameters: --bandwidth_matrix -e0

Using buffer size of 100.000MiB/thread for reads and an additional 100.000MiB/thread for writes
Measuring Memory Bandwidths between nodes within system
Bandwidths are in MB/sec (1 MB/sec = 1,000,000 Bytes/sec)
Using all the threads from each core if Hyper-threading is enabled
Using Read-only traffic type
\t\tNuma node
Numa node\t     0\t
       0\t225060.9
";

/// `--latency_matrix` transcript on a single-node system
pub const QUICK_LATENCY_OUTPUT: &str = "\
Intel(R) Memory Latency Checker - v3.11
Command line parameters: --latency_matrix

Using buffer size of 2000.000MiB
Measuring idle latencies for sequential access (in ns)...
\t\tNuma node
Numa node\t     0\t
       0\t  82.3
";

/// Banner MLC prints when started with an unknown argument
#[must_use]
pub fn version_banner(version: &str) -> String {
    format!(
        "Intel(R) Memory Latency Checker - {version}
         Invalid Argument: --invalid_argument
         Usage: mlc [options]\n"
    )
}

/// Scan `text` as `mode` output, collecting every measurement
pub fn collect_scan(
    mode: TestMode,
    single_delay: bool,
    text: &str,
    sink: &MemoryLogSink,
) -> Result<(ScanReport, Vec<Measurement>)> {
    let mut reader = Cursor::new(text.as_bytes().to_vec());
    let mut parser = parser_for(mode, single_delay);
    let mut measurements = Vec::new();
    let report = scan_output(
        &mut reader,
        &CancellationScope::new(),
        parser.as_mut(),
        sink,
        &mut |m| measurements.push(m),
    )?;
    Ok((report, measurements))
}

/// Latency rows among `measurements`
#[must_use]
pub fn latency_rows(measurements: &[Measurement]) -> Vec<LatencyRow> {
    measurements
        .iter()
        .filter_map(|m| match m {
            Measurement::Latency(row) => Some(row.clone()),
            _ => None,
        })
        .collect()
}
