//! Container lifecycle status and state machine.
//!
//! Defines the possible states of a container and valid transitions between
//! them. The last-known status is persisted with the record; after a host
//! reboot nothing is running, so recovery resets active statuses.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a container.
///
/// State machine:
/// ```text
/// create()  → Configured (persisted, no process)
/// start()   → Running
/// pause()   → Paused
/// stop()    → Stopped (record preserved, can restart)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    /// Cannot determine container state (error recovery).
    Unknown,

    /// Container is created and persisted, but never started.
    Configured,

    /// Container process is running.
    Running,

    /// Container process is frozen by the cgroup freezer.
    Paused,

    /// Container is shutting down (transient state).
    Stopping,

    /// Container is not running. The record is preserved and the container
    /// can be restarted.
    Stopped,
}

impl ContainerStatus {
    /// True when a live process backs this status.
    pub fn is_active(&self) -> bool {
        matches!(self, ContainerStatus::Running | ContainerStatus::Paused)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ContainerStatus::Running)
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, ContainerStatus::Paused)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, ContainerStatus::Stopped)
    }

    /// Check if transition to the target status is valid.
    pub fn can_transition_to(&self, target: ContainerStatus) -> bool {
        use ContainerStatus::*;
        matches!(
            (self, target),
            // Unknown can transition to any state (recovery)
            (Unknown, _)
                | (Configured, Running)
                | (Configured, Stopped)
                | (Configured, Unknown)
                | (Running, Paused)
                | (Running, Stopping)
                | (Running, Stopped)
                | (Running, Unknown)
                | (Paused, Running)
                | (Paused, Stopping)
                | (Paused, Stopped)
                | (Paused, Unknown)
                | (Stopping, Stopped)
                | (Stopping, Unknown)
                | (Stopped, Running)
                | (Stopped, Unknown)
        )
    }

    /// String form used for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerStatus::Unknown => "unknown",
            ContainerStatus::Configured => "configured",
            ContainerStatus::Running => "running",
            ContainerStatus::Paused => "paused",
            ContainerStatus::Stopping => "stopping",
            ContainerStatus::Stopped => "stopped",
        }
    }
}

impl std::str::FromStr for ContainerStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(ContainerStatus::Unknown),
            "configured" => Ok(ContainerStatus::Configured),
            "running" => Ok(ContainerStatus::Running),
            "paused" => Ok(ContainerStatus::Paused),
            "stopping" => Ok(ContainerStatus::Stopping),
            "stopped" => Ok(ContainerStatus::Stopped),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
