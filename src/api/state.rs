//! Shared state for boundary handlers

use std::sync::Arc;

use crate::actors::hub::HubHandle;
use crate::render::RenderCache;
use crate::store::AggregateStore;

/// Shared state passed to all handlers.
#[derive(Clone)]
pub struct ApiState {
    /// Point of truth read by the static snapshot handlers.
    pub store: Arc<AggregateStore>,

    /// Render cache shared with the broadcast hub.
    pub cache: Arc<RenderCache>,

    /// Handle to the broadcast hub for live viewer connections.
    pub hub: HubHandle,
}

impl ApiState {
    pub fn new(store: Arc<AggregateStore>, cache: Arc<RenderCache>, hub: HubHandle) -> Self {
        Self { store, cache, hub }
    }
}
