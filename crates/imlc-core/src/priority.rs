//! Scheduling priority of benchmark processes
//!
//! Competing load skews MLC's numbers, so runs are raised above normal
//! priority, and to the highest level when imlc itself runs elevated. On
//! Unix the nice value is set right after spawn; on Windows the priority
//! class is passed to `CreateProcess`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::process::Child;

/// Priority requested for a launched process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessPriority {
    /// Keep the inherited priority
    Normal,
    /// One step above normal
    #[default]
    AboveNormal,
    /// Nice -20 on Unix, the realtime class on Windows
    Highest,
}

impl ProcessPriority {
    /// Priority for MLC given the rights imlc runs with
    #[must_use]
    pub fn for_current_process() -> Self {
        if is_elevated() == Some(true) {
            Self::Highest
        } else {
            Self::AboveNormal
        }
    }

    /// Unix nice value; `None` leaves the process alone
    #[must_use]
    pub const fn nice_value(self) -> Option<i32> {
        match self {
            Self::Normal => None,
            Self::AboveNormal => Some(-5),
            Self::Highest => Some(-20),
        }
    }

    /// Windows process creation flag for this priority class
    #[must_use]
    pub const fn priority_class(self) -> u32 {
        match self {
            Self::Normal => 0x0000_0020,
            Self::AboveNormal => 0x0000_8000,
            Self::Highest => 0x0000_0100,
        }
    }
}

impl fmt::Display for ProcessPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Normal => "normal",
            Self::AboveNormal => "above normal",
            Self::Highest => "highest",
        })
    }
}

/// Whether imlc runs as root; `None` where this cannot be determined
#[must_use]
pub fn is_elevated() -> Option<bool> {
    #[cfg(unix)]
    {
        Some(rustix::process::geteuid().is_root())
    }
    #[cfg(not(unix))]
    {
        None
    }
}

/// Raise a freshly spawned `child` to `priority`
///
/// # Errors
///
/// Returns the OS error, typically permission denied when an unprivileged
/// user asks for a negative nice value.
#[cfg(unix)]
pub fn apply(child: &Child, priority: ProcessPriority) -> io::Result<()> {
    let Some(nice) = priority.nice_value() else {
        return Ok(());
    };
    let pid = rustix::process::Pid::from_child(child);
    rustix::process::setpriority_process(Some(pid), nice).map_err(io::Error::from)
}

/// Windows sets the class at creation, see [`ProcessPriority::priority_class`]
///
/// # Errors
///
/// Never fails on this platform.
#[cfg(not(unix))]
pub fn apply(_child: &Child, _priority: ProcessPriority) -> io::Result<()> {
    Ok(())
}
