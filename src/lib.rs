pub mod actors;
pub mod api;
pub mod config;
pub mod executor;
pub mod filter;
pub mod render;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome class of a single poll of one host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HostStatus {
    /// The remote command ran and exited zero; payload is its stdout.
    Ok,
    /// Connection or authentication failure before the command could run.
    Unreachable,
    /// The command ran but signaled an error; payload is diagnostic text.
    CommandFailed,
    /// The execution budget was exceeded.
    Timeout,
}

impl HostStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, HostStatus::Ok)
    }
}

/// The current result for one host, replaced wholesale on every poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostResult {
    pub status: HostStatus,
    /// Opaque formatted text on `Ok`, diagnostic text otherwise.
    pub payload: String,
    pub observed_at: DateTime<Utc>,
    /// Monotonic per-host counter, used to discard out-of-order writes.
    pub sequence: u64,
}

impl HostResult {
    /// Whether two results carry the same observable content.
    ///
    /// Sequence and timestamp are deliberately ignored: a host that keeps
    /// reporting the same idle state should not force re-renders.
    pub fn same_observation(&self, other: &HostResult) -> bool {
        self.status == other.status && self.payload == other.payload
    }
}
