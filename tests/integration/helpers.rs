//! Shared helpers for integration tests

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use gpustat_hub::executor::{ExecOutcome, RemoteExecutor};
use gpustat_hub::{HostResult, HostStatus};

/// A long interval so tests drive polls explicitly via `poll_now`.
pub const MANUAL: Duration = Duration::from_secs(3600);

/// Executor replaying a scripted outcome list, then repeating a fallback.
pub struct ScriptedExecutor {
    outcomes: Mutex<VecDeque<ExecOutcome>>,
    fallback: ExecOutcome,
}

impl ScriptedExecutor {
    pub fn new(outcomes: Vec<ExecOutcome>, fallback: ExecOutcome) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into()),
            fallback,
        })
    }

    /// Executor that always yields the same outcome.
    pub fn constant(outcome: ExecOutcome) -> Arc<Self> {
        Self::new(vec![], outcome)
    }
}

#[async_trait]
impl RemoteExecutor for ScriptedExecutor {
    async fn run(&self) -> ExecOutcome {
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

/// Executor that stalls for a fixed delay before returning, imitating a
/// hung host whose execution budget eventually expires.
pub struct HangingExecutor {
    pub delay: Duration,
    pub outcome: ExecOutcome,
}

#[async_trait]
impl RemoteExecutor for HangingExecutor {
    async fn run(&self) -> ExecOutcome {
        tokio::time::sleep(self.delay).await;
        self.outcome.clone()
    }
}

pub fn host_result(sequence: u64, status: HostStatus, payload: &str) -> HostResult {
    HostResult {
        status,
        payload: payload.to_string(),
        observed_at: Utc::now(),
        sequence,
    }
}
