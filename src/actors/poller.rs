//! HostPollerActor - polls one remote host on a fixed interval
//!
//! Each configured host gets its own poller actor. The actor runs in an
//! infinite loop: execute the remote command, fold the outcome into a
//! [`HostResult`], and write it to the aggregate store. Failures are data,
//! not faults - a host that is down simply keeps reporting `Unreachable`
//! until it comes back.
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → RemoteExecutor::run → HostResult(sequence+1) → AggregateStore
//!     ↑
//!     └─── Commands (PollNow, Shutdown)
//! ```
//!
//! Cycle timing is independent per host: the executor bounds each call with
//! its own timeout, so a hung host costs at most one timeout per cycle and
//! never delays another host's poller.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, instrument, trace, warn};

use crate::executor::{ExecFailure, ExecOutcome, RemoteExecutor};
use crate::store::{AggregateStore, WriteOutcome};
use crate::{HostResult, HostStatus};

use super::messages::PollerCommand;

/// Actor that polls a single host.
pub struct HostPollerActor {
    /// Host identity; also the store slot this actor owns.
    host: String,

    executor: Arc<dyn RemoteExecutor>,

    store: Arc<AggregateStore>,

    command_rx: mpsc::Receiver<PollerCommand>,

    interval_duration: Duration,

    /// Monotonic per-host counter stamped onto every result.
    sequence: u64,
}

impl HostPollerActor {
    pub fn new(
        host: String,
        executor: Arc<dyn RemoteExecutor>,
        store: Arc<AggregateStore>,
        command_rx: mpsc::Receiver<PollerCommand>,
        interval_duration: Duration,
    ) -> Self {
        Self {
            host,
            executor,
            store,
            command_rx,
            interval_duration,
            sequence: 0,
        }
    }

    /// Run the actor's main loop until shutdown or mailbox closure.
    #[instrument(skip(self), fields(host = %self.host))]
    pub async fn run(mut self) {
        debug!("starting host poller");

        // First tick after one full interval; until then the host renders
        // as "Loading ...".
        let mut ticker = interval_at(
            Instant::now() + self.interval_duration,
            self.interval_duration,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll_once().await;
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        PollerCommand::PollNow { respond_to } => {
                            debug!("received PollNow command");
                            let status = self.poll_once().await;
                            let _ = respond_to.send(status);
                        }

                        PollerCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("host poller stopped");
    }

    /// Execute one cycle and store the result.
    ///
    /// The store's sequence guard discards this write if a later cycle has
    /// already been recorded, which covers out-of-order completion.
    #[instrument(skip(self), fields(host = %self.host))]
    async fn poll_once(&mut self) -> HostStatus {
        let outcome = self.executor.run().await;
        let (status, payload) = fold_outcome(outcome);

        self.sequence += 1;
        let result = HostResult {
            status,
            payload,
            observed_at: Utc::now(),
            sequence: self.sequence,
        };

        match self.store.write(&self.host, result) {
            WriteOutcome::Applied => trace!(?status, "result stored"),
            WriteOutcome::Unchanged => trace!(?status, "result unchanged"),
            WriteOutcome::Stale => warn!(sequence = self.sequence, "stale write discarded"),
            WriteOutcome::UnknownHost => warn!("host missing from store"),
        }

        status
    }
}

/// Fold an execution outcome into status plus display payload.
fn fold_outcome(outcome: ExecOutcome) -> (HostStatus, String) {
    match outcome {
        Ok(payload) => (HostStatus::Ok, payload),
        Err(ExecFailure::Unreachable(diag)) => (HostStatus::Unreachable, diag),
        Err(ExecFailure::CommandFailed(diag)) => (HostStatus::CommandFailed, diag),
        Err(ExecFailure::Timeout) => (HostStatus::Timeout, ExecFailure::Timeout.to_string()),
    }
}

/// Handle for controlling a [`HostPollerActor`].
///
/// Cloneable; dropping all handles closes the mailbox and stops the actor.
#[derive(Clone)]
pub struct PollerHandle {
    sender: mpsc::Sender<PollerCommand>,

    /// Host this poller owns.
    pub host: String,
}

impl PollerHandle {
    /// Spawn a poller actor for one host and return its handle.
    pub fn spawn(
        host: String,
        executor: Arc<dyn RemoteExecutor>,
        store: Arc<AggregateStore>,
        interval_duration: Duration,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = HostPollerActor::new(host.clone(), executor, store, cmd_rx, interval_duration);
        tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            host,
        }
    }

    /// Trigger an immediate poll and return the resulting status.
    pub async fn poll_now(&self) -> Result<HostStatus> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PollerCommand::PollNow { respond_to: tx })
            .await
            .context("failed to send PollNow command")?;

        rx.await.context("failed to receive poll result")
    }

    /// Gracefully shut down the poller.
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(PollerCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
