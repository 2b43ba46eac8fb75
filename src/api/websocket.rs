//! WebSocket handler bridging live viewers to the broadcast hub

use axum::{
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, stream::StreamExt};
use tracing::{debug, info, warn};

use crate::api::{SnapshotQuery, state::ApiState};
use crate::filter::NodeFilter;

/// WebSocket upgrade handler
///
/// GET /?nodes=a,b
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<SnapshotQuery>,
    State(state): State<ApiState>,
) -> Response {
    let filter = NodeFilter::from_query(query.nodes.as_deref());
    ws.on_upgrade(move |socket| handle_websocket(socket, state, filter))
}

/// Bridge one socket to one hub viewer session.
///
/// The hub delivers the initial snapshot and all further updates through
/// the session's bounded queue; this task only moves bytes. When either
/// direction ends, the viewer is unregistered.
async fn handle_websocket(socket: WebSocket, state: ApiState, filter: Option<NodeFilter>) {
    let session = match state.hub.connect(filter).await {
        Ok(session) => session,
        Err(e) => {
            warn!("failed to register viewer: {e:#}");
            return;
        }
    };
    let viewer_id = session.viewer_id;
    let mut deliveries = session.deliveries;

    info!(viewer_id, "viewer connected");

    let (mut sender, mut receiver) = socket.split();

    // Forward hub deliveries to the socket. The stream ends when the hub
    // drops the viewer (disconnect or queue overflow).
    let mut send_task = tokio::spawn(async move {
        while let Some(snapshot) = deliveries.recv().await {
            if sender
                .send(Message::Text(snapshot.body.clone()))
                .await
                .is_err()
            {
                debug!("WebSocket send failed, client disconnected");
                break;
            }
        }
    });

    // Drain incoming frames; we only care about Close.
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
        }
    }

    if let Err(e) = state.hub.disconnect(viewer_id).await {
        debug!("viewer already gone: {e:#}");
    }

    info!(viewer_id, "viewer disconnected");
}
