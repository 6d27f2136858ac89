//! Relay WebSocket route configuration

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::relay::relay_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the relay WebSocket router
///
/// # Endpoint
///
/// `GET /ws` - WebSocket upgrade for the audio relay. `?raw=true` selects raw
/// PCM output; the default is framed output with generation headers.
///
/// # Protocol
///
/// Client sends binary PCM16LE mono frames and the text commands `cancel`,
/// `clear`, `force` and `commit`.
///
/// Server sends binary audio frames, `playback.interrupt` notices (framed mode)
/// and upstream error diagnostics as text.
pub fn create_relay_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ws", get(relay_handler))
        .layer(TraceLayer::new_for_http())
}
