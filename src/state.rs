//! Shared application state.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::core::relay::SessionSettings;

/// Per-process state handed to every handler.
///
/// Holds configuration only. Sessions share nothing with each other.
#[derive(Debug)]
pub struct AppState {
    pub config: ServerConfig,
    session_settings: SessionSettings,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let session_settings = config.session_settings();
        Arc::new(Self {
            config,
            session_settings,
        })
    }

    /// Settings for a new relay session.
    pub fn session_settings(&self) -> SessionSettings {
        self.session_settings.clone()
    }
}
