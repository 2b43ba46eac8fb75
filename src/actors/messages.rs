//! Message types for actor communication
//!
//! Commands are request/response messages sent to a specific actor via its
//! mpsc mailbox; oneshot channels carry the responses.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::HostStatus;
use crate::filter::NodeFilter;
use crate::render::RenderedSnapshot;

/// Commands understood by a [`HostPollerActor`](super::poller::HostPollerActor).
#[derive(Debug)]
pub enum PollerCommand {
    /// Trigger an immediate poll, bypassing the interval timer.
    ///
    /// Responds with the status that was written to the store. Used for
    /// testing and manual refresh.
    PollNow {
        respond_to: oneshot::Sender<HostStatus>,
    },

    /// Stop polling. An in-flight execution is bounded by its own timeout;
    /// its result is discarded.
    Shutdown,
}

/// Commands understood by the [`BroadcastHub`](super::hub::BroadcastHub).
#[derive(Debug)]
pub enum HubCommand {
    /// Register a new viewer with an optional subset filter.
    ///
    /// The response carries the delivery queue; the first delivery is a
    /// full snapshot of the current aggregate.
    Connect {
        filter: Option<NodeFilter>,
        respond_to: oneshot::Sender<ViewerSession>,
    },

    /// Remove a viewer after transport disconnect or explicit unsubscribe.
    Disconnect { viewer_id: u64 },

    /// Number of viewers currently in the active set.
    ActiveViewers { respond_to: oneshot::Sender<usize> },

    /// Close all viewers and stop broadcasting.
    Shutdown,
}

/// A connected viewer's receiving end.
///
/// Dropping the receiver (or the hub dropping the sender on overflow)
/// closes the session.
#[derive(Debug)]
pub struct ViewerSession {
    pub viewer_id: u64,
    pub deliveries: mpsc::Receiver<Arc<RenderedSnapshot>>,
}
