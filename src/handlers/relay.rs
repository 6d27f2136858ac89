//! Relay WebSocket handler
//!
//! Upgrades a client connection, dials the OpenAI Realtime API and runs one
//! relay session between the two sockets.

use std::sync::Arc;

use axum::{
    extract::{
        Query, State,
        ws::{WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use serde::Deserialize;
use tracing::{error, info};

use crate::core::relay::{Session, openai};
use crate::state::AppState;

/// Query parameters accepted on the upgrade request.
#[derive(Debug, Default, Deserialize)]
pub struct RelayParams {
    /// `raw=true` selects unframed PCM output without interruption notices
    #[serde(default)]
    pub raw: Option<String>,
}

impl RelayParams {
    pub fn raw_mode(&self) -> bool {
        self.raw.as_deref().map(str::trim).is_some_and(|raw| {
            ["true", "1", "yes"]
                .iter()
                .any(|accepted| raw.eq_ignore_ascii_case(accepted))
        })
    }
}

/// Relay WebSocket handler
///
/// # Arguments
/// * `ws` - The WebSocket upgrade request from Axum
/// * `params` - Query parameters (`raw`)
/// * `state` - Application state containing configuration
///
/// # Returns
/// * `Response` - HTTP response that upgrades the connection to WebSocket
pub async fn relay_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<RelayParams>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let raw_mode = params.raw_mode();
    info!(raw_mode, "Relay WebSocket connection upgrade requested");

    let max_frame_size = state.config.relay.max_frame_size;
    ws.max_frame_size(max_frame_size)
        .max_message_size(max_frame_size)
        .on_upgrade(move |socket| handle_relay_socket(socket, state, raw_mode))
}

/// Dial upstream, then run the session until either side ends.
///
/// A failed dial drops the client socket without starting a session.
async fn handle_relay_socket(socket: WebSocket, state: Arc<AppState>, raw_mode: bool) {
    let settings = state.session_settings();

    let upstream = match openai::connect(&settings.upstream, &state.config.openai_api_key).await {
        Ok(upstream) => upstream,
        Err(e) => {
            error!(raw_mode, "Failed to connect to OpenAI Realtime API: {}", e);
            return;
        }
    };

    let summary = Session::new(settings, raw_mode).run(socket, upstream).await;
    if let Some(e) = summary.error {
        info!(session_id = %summary.session_id, "Relay ended with error: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_mode_flag() {
        let params = |raw: Option<&str>| RelayParams {
            raw: raw.map(str::to_string),
        };
        assert!(params(Some("true")).raw_mode());
        assert!(params(Some("1")).raw_mode());
        assert!(params(Some("Yes")).raw_mode());
        assert!(params(Some("TRUE")).raw_mode());
        assert!(params(Some(" tRuE ")).raw_mode());
        assert!(!params(Some("no")).raw_mode());
        assert!(!params(Some("false")).raw_mode());
        assert!(!params(Some("")).raw_mode());
        assert!(!params(None).raw_mode());
    }
}
