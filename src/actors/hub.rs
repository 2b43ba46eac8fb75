//! BroadcastHub - fans rendered snapshots out to live viewers
//!
//! The hub owns the viewer registry for its whole lifetime. It does not get
//! called by pollers; instead it watches the store's generation channel and
//! pulls a fresh aggregate on every transition, rendering once per distinct
//! filter through the shared cache.
//!
//! ## Viewer lifecycle
//!
//! ```text
//! Connecting ──initial snapshot delivered──> Active
//! Active ──outbound queue full──> Draining (removed; reconnect expected)
//! Active | Draining ──transport disconnect / unsubscribe──> Closed
//! ```
//!
//! Delivery is per-viewer through a bounded queue; one stalled viewer is
//! dropped rather than ever delaying the others.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, instrument, trace, warn};

use crate::filter::NodeFilter;
use crate::render::{Format, RenderCache, RenderedSnapshot};
use crate::store::AggregateStore;

use super::messages::{HubCommand, ViewerSession};

/// Delivery lifecycle of one connected viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerState {
    /// Registered, initial snapshot not yet enqueued.
    Connecting,
    /// Receiving updates.
    Active,
    /// Queue overflowed; being removed.
    Draining,
    /// Transport gone or unsubscribed.
    Closed,
}

struct Viewer {
    filter: Option<NodeFilter>,
    state: ViewerState,
    tx: mpsc::Sender<Arc<RenderedSnapshot>>,
    /// Last snapshot enqueued; byte-identical re-renders are suppressed.
    last_delivery: Option<Arc<RenderedSnapshot>>,
}

pub struct BroadcastHub {
    store: Arc<AggregateStore>,
    cache: Arc<RenderCache>,
    queue_capacity: usize,
    command_rx: mpsc::Receiver<HubCommand>,
    generation_rx: watch::Receiver<u64>,
    viewers: HashMap<u64, Viewer>,
    next_viewer_id: u64,
}

impl BroadcastHub {
    pub fn new(
        store: Arc<AggregateStore>,
        cache: Arc<RenderCache>,
        queue_capacity: usize,
        command_rx: mpsc::Receiver<HubCommand>,
    ) -> Self {
        let generation_rx = store.subscribe();

        Self {
            store,
            cache,
            queue_capacity: queue_capacity.max(1),
            command_rx,
            generation_rx,
            viewers: HashMap::new(),
            next_viewer_id: 1,
        }
    }

    /// Run the hub's main loop until shutdown or mailbox closure.
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting broadcast hub");

        loop {
            tokio::select! {
                changed = self.generation_rx.changed() => {
                    match changed {
                        Ok(()) => {
                            let generation = *self.generation_rx.borrow_and_update();
                            trace!(generation, "generation changed");
                            self.broadcast();
                        }
                        Err(_) => {
                            debug!("generation channel closed");
                            break;
                        }
                    }
                }

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(HubCommand::Connect { filter, respond_to }) => {
                            let session = self.connect(filter);
                            let _ = respond_to.send(session);
                        }

                        Some(HubCommand::Disconnect { viewer_id }) => {
                            self.disconnect(viewer_id);
                        }

                        Some(HubCommand::ActiveViewers { respond_to }) => {
                            let count = self
                                .viewers
                                .values()
                                .filter(|v| v.state == ViewerState::Active)
                                .count();
                            let _ = respond_to.send(count);
                        }

                        Some(HubCommand::Shutdown) | None => {
                            debug!("shutting down broadcast hub");
                            break;
                        }
                    }
                }
            }
        }

        // Dropping the senders closes every viewer session.
        self.viewers.clear();
        debug!("broadcast hub stopped");
    }

    /// Register a viewer and enqueue its initial full snapshot.
    fn connect(&mut self, filter: Option<NodeFilter>) -> ViewerSession {
        let viewer_id = self.next_viewer_id;
        self.next_viewer_id += 1;

        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let mut viewer = Viewer {
            filter,
            state: ViewerState::Connecting,
            tx,
            last_delivery: None,
        };

        let aggregate = self.store.read();
        let snapshot = self
            .cache
            .render(&aggregate, viewer.filter.as_ref(), Format::Html);

        // Queue capacity is at least one and the queue is empty, so the
        // initial delivery cannot overflow.
        match viewer.tx.try_send(snapshot.clone()) {
            Ok(()) => {
                viewer.last_delivery = Some(snapshot);
                viewer.state = ViewerState::Active;
            }
            Err(_) => viewer.state = ViewerState::Closed,
        }

        debug!(viewer_id, state = ?viewer.state, "viewer connected");
        self.viewers.insert(viewer_id, viewer);

        ViewerSession {
            viewer_id,
            deliveries: rx,
        }
    }

    fn disconnect(&mut self, viewer_id: u64) {
        if let Some(mut viewer) = self.viewers.remove(&viewer_id) {
            viewer.state = ViewerState::Closed;
            debug!(viewer_id, "viewer disconnected");
        }
    }

    /// Deliver the current aggregate to every active viewer.
    ///
    /// Renders once per distinct filter (the cache dedupes), then enqueues
    /// without waiting. A full queue drops the viewer instead of blocking
    /// the broadcast.
    fn broadcast(&mut self) {
        let aggregate = self.store.read();
        let mut dropped = Vec::new();

        for (&viewer_id, viewer) in self.viewers.iter_mut() {
            if viewer.state != ViewerState::Active {
                continue;
            }

            let snapshot = self
                .cache
                .render(&aggregate, viewer.filter.as_ref(), Format::Html);

            if let Some(last) = &viewer.last_delivery
                && last.body == snapshot.body
            {
                trace!(viewer_id, "unchanged under filter, delivery suppressed");
                continue;
            }

            match viewer.tx.try_send(snapshot.clone()) {
                Ok(()) => {
                    viewer.last_delivery = Some(snapshot);
                }
                Err(TrySendError::Full(_)) => {
                    warn!(viewer_id, "outbound queue full, dropping slow viewer");
                    viewer.state = ViewerState::Draining;
                    dropped.push(viewer_id);
                }
                Err(TrySendError::Closed(_)) => {
                    viewer.state = ViewerState::Closed;
                    dropped.push(viewer_id);
                }
            }
        }

        for viewer_id in dropped {
            self.viewers.remove(&viewer_id);
        }
    }
}

/// Handle for talking to the [`BroadcastHub`] from transport code.
#[derive(Clone)]
pub struct HubHandle {
    sender: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    /// Spawn the hub actor and return its handle.
    pub fn spawn(store: Arc<AggregateStore>, cache: Arc<RenderCache>, queue_capacity: usize) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);

        let actor = BroadcastHub::new(store, cache, queue_capacity, cmd_rx);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Register a viewer; the returned session already holds the initial
    /// full snapshot.
    pub async fn connect(&self, filter: Option<NodeFilter>) -> Result<ViewerSession> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(HubCommand::Connect {
                filter,
                respond_to: tx,
            })
            .await
            .context("failed to send Connect command")?;

        rx.await.context("failed to receive viewer session")
    }

    pub async fn disconnect(&self, viewer_id: u64) -> Result<()> {
        self.sender
            .send(HubCommand::Disconnect { viewer_id })
            .await
            .context("failed to send Disconnect command")?;
        Ok(())
    }

    /// Number of viewers currently receiving updates.
    pub async fn active_viewers(&self) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(HubCommand::ActiveViewers { respond_to: tx })
            .await
            .context("failed to send ActiveViewers command")?;

        rx.await.context("failed to receive viewer count")
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(HubCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
