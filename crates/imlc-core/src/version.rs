//! MLC version probe
//!
//! MLC has no `--version` flag. Started with an argument it does not know, it
//! prints its banner (`Intel(R) Memory Latency Checker - v3.11`) followed by
//! usage text, so the probe reads stdout until the banner shows up.

use crate::command::ToolLauncher;
use crate::logging::{LogLevel, LogSink};
use std::io::BufRead;
use std::path::Path;

/// Text preceding the version in the MLC banner
pub const VERSION_PREFIX: &str = "Memory Latency Checker - ";

/// Argument that makes MLC print its banner and exit
pub const PROBE_ARGUMENT: &str = "--invalid_argument";

/// Version carried by `line`, if it holds the banner
#[must_use]
pub fn extract_version(line: &str) -> Option<String> {
    line.rfind(VERSION_PREFIX)
        .map(|at| line[at + VERSION_PREFIX.len()..].trim().to_string())
}

/// Launch `program` with [`PROBE_ARGUMENT`] and return the reported version
///
/// Returns `None` when the launch fails or no banner line is printed. The
/// probe process is killed if it is still alive afterwards.
pub fn probe_version(
    launcher: &dyn ToolLauncher,
    program: &Path,
    sink: &dyn LogSink,
) -> Option<String> {
    let mut process = match launcher.launch(program, PROBE_ARGUMENT) {
        Ok(process) => process,
        Err(e) => {
            sink.warn(&format!(
                "Failed to start \"{}\" for version probe: {e}",
                program.display()
            ));
            return None;
        }
    };

    let mut version = None;
    if let Some(mut stdout) = process.take_stdout() {
        let mut line = String::new();
        loop {
            line.clear();
            match stdout.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {
                    if let Some(found) = extract_version(&line) {
                        version = Some(found);
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!("version probe read failed: {e}");
                    break;
                }
            }
        }
    }

    let exited = process.has_exited().unwrap_or(false);
    if !exited {
        if let Err(e) = process.kill() {
            sink.warn(&format!("Failed to kill version probe process: {e}"));
        } else if let Err(e) = process.wait() {
            sink.log(
                LogLevel::Debug,
                &format!("Failed to reap version probe process: {e}"),
            );
        }
    }

    version
}
