//! HTTP boundary for live viewers and static snapshot renderings
//!
//! The boundary is deliberately thin: routing and connection upgrade only.
//! Live connections are handed to the broadcast hub; static requests read
//! the aggregate store through the render cache.
//!
//! ## Endpoints
//!
//! - `GET /` - upgrade to a live WebSocket view (`?nodes=a,b` filter)
//! - `GET /gpustat.html` - one-shot HTML rendering
//! - `GET /gpustat.txt` - one-shot plain-text rendering
//! - `GET /gpustat.ansi` - one-shot terminal-colored rendering

pub mod state;
pub mod websocket;

pub use state::ApiState;

use std::net::SocketAddr;

use axum::{
    Router,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::filter::NodeFilter;
use crate::render::Format;

/// Query parameters accepted by every endpoint.
#[derive(Debug, serde::Deserialize)]
pub struct SnapshotQuery {
    /// Comma-separated host subset; absent means all hosts.
    pub nodes: Option<String>,
}

fn render_snapshot(state: &ApiState, query: &SnapshotQuery, format: Format) -> Response {
    let filter = NodeFilter::from_query(query.nodes.as_deref());
    let aggregate = state.store.read();
    let snapshot = state.cache.render(&aggregate, filter.as_ref(), format);

    (
        [(header::CONTENT_TYPE, format.content_type())],
        snapshot.body.clone(),
    )
        .into_response()
}

async fn snapshot_html(
    State(state): State<ApiState>,
    Query(query): Query<SnapshotQuery>,
) -> Response {
    render_snapshot(&state, &query, Format::Html)
}

async fn snapshot_plain(
    State(state): State<ApiState>,
    Query(query): Query<SnapshotQuery>,
) -> Response {
    render_snapshot(&state, &query, Format::Plain)
}

async fn snapshot_ansi(
    State(state): State<ApiState>,
    Query(query): Query<SnapshotQuery>,
) -> Response {
    render_snapshot(&state, &query, Format::Ansi)
}

/// Build the boundary router.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(websocket::websocket_handler))
        .route("/gpustat.html", get(snapshot_html))
        .route("/gpustat.txt", get(snapshot_plain))
        .route("/gpustat.ansi", get(snapshot_ansi))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Spawn the boundary server in a background task.
///
/// Returns the bound local address.
pub async fn spawn_api_server(bind_addr: SocketAddr, state: ApiState) -> anyhow::Result<SocketAddr> {
    info!("starting server on {}", bind_addr);

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("server error: {}", e);
        }
    });

    Ok(addr)
}
