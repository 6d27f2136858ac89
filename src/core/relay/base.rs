//! Base types shared by every part of the relay engine.
//!
//! This module defines the error taxonomy, the keepalive policy applied to both
//! sockets of a session, and the per-session settings derived from the server
//! configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while running a relay session.
///
/// Transport-class variants are fatal to the owning session. Protocol problems
/// (malformed payloads) never surface as `RelayError`; they are logged and the
/// offending unit is discarded where it is detected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// Socket read or write failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// A single write exceeded the per-write deadline
    #[error("Write deadline of {0:?} exceeded")]
    WriteTimeout(Duration),

    /// No frame (data or pong) arrived within the keepalive window
    #[error("Keepalive expired after {0:?} without traffic")]
    KeepaliveExpired(Duration),

    /// The upstream realtime service could not be reached
    #[error("Upstream connection failed: {0}")]
    UpstreamConnect(String),

    /// The upstream request could not be built
    #[error("Invalid upstream request: {0}")]
    InvalidRequest(String),

    /// An outbound event could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The egress scheduler for this socket is gone
    #[error("Egress lane closed")]
    LaneClosed,

    /// The session was cancelled by another task
    #[error("Session cancelled")]
    Cancelled,
}

impl RelayError {
    /// Whether this error means the peer went away or misbehaved at the
    /// transport level, as opposed to a local shutdown.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::WriteTimeout(_) | Self::KeepaliveExpired(_)
        )
    }
}

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;

// =============================================================================
// Keepalive
// =============================================================================

/// Default interval between heartbeat pings.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(10);

/// Default read window; a socket silent for longer is considered dead.
pub const DEFAULT_PONG_WAIT: Duration = Duration::from_secs(30);

/// Default deadline for a single socket write.
pub const DEFAULT_WRITE_WAIT: Duration = Duration::from_secs(5);

/// Heartbeat and deadline policy for one socket.
///
/// The egress scheduler sends a ping every `ping_interval` and bounds each
/// write by `write_wait`. The reader treats `pong_wait` without any inbound
/// frame as socket death; a healthy peer answers every ping, so the window
/// always covers at least one pong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepalivePolicy {
    pub ping_interval: Duration,
    pub pong_wait: Duration,
    pub write_wait: Duration,
}

impl Default for KeepalivePolicy {
    fn default() -> Self {
        Self {
            ping_interval: DEFAULT_PING_INTERVAL,
            pong_wait: DEFAULT_PONG_WAIT,
            write_wait: DEFAULT_WRITE_WAIT,
        }
    }
}

// =============================================================================
// Session Settings
// =============================================================================

/// Turn detection strategy requested from the upstream service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnDetectionMode {
    /// Upstream voice-activity detection commits turns and creates responses
    #[default]
    ServerVad,
    /// The gateway commits after a period of client silence
    Manual,
}

impl TurnDetectionMode {
    /// Parse from a configuration string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "server_vad" | "server-vad" | "vad" => Some(Self::ServerVad),
            "manual" | "none" => Some(Self::Manual),
            _ => None,
        }
    }
}

/// Parameters of the upstream session configuration message.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamSessionSettings {
    /// Base WebSocket URL of the realtime service
    pub url: String,
    /// Model query parameter
    pub model: String,
    /// Persona / system instructions
    pub instructions: String,
    /// Output voice
    pub voice: String,
    /// Output speech speed
    pub speed: f32,
    /// PCM16 sample rate for input and output audio
    pub sample_rate: u32,
    pub turn_detection: TurnDetectionMode,
    pub vad_threshold: f32,
    pub vad_prefix_padding_ms: u32,
    pub vad_silence_duration_ms: u32,
    /// Manual mode: silence after which buffered audio is committed
    pub idle_commit: Duration,
    /// Advance the generation when the upstream reports speech start
    pub interrupt_on_speech: bool,
    /// Deadline for the upstream WebSocket handshake
    pub connect_timeout: Duration,
}

impl Default for UpstreamSessionSettings {
    fn default() -> Self {
        Self {
            url: super::openai::OPENAI_REALTIME_URL.to_string(),
            model: super::openai::DEFAULT_REALTIME_MODEL.to_string(),
            instructions: "You are a helpful voice assistant.".to_string(),
            voice: "alloy".to_string(),
            speed: 1.0,
            sample_rate: super::openai::OPENAI_REALTIME_SAMPLE_RATE,
            turn_detection: TurnDetectionMode::ServerVad,
            vad_threshold: 0.5,
            vad_prefix_padding_ms: 300,
            vad_silence_duration_ms: 500,
            idle_commit: Duration::from_millis(600),
            interrupt_on_speech: true,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Capacities of the two egress lanes of one socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneCapacity {
    /// Control lane; senders wait when it is full
    pub control: usize,
    /// Audio lane; the oldest item is evicted when it is full
    pub audio: usize,
}

impl Default for LaneCapacity {
    fn default() -> Self {
        Self {
            control: 64,
            audio: 32,
        }
    }
}

/// Everything a session needs to know, minus the credential.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSettings {
    pub upstream: UpstreamSessionSettings,
    pub keepalive: KeepalivePolicy,
    pub lanes: LaneCapacity,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        assert!(RelayError::Transport("reset".to_string()).is_transport());
        assert!(RelayError::WriteTimeout(Duration::from_secs(5)).is_transport());
        assert!(RelayError::KeepaliveExpired(Duration::from_secs(30)).is_transport());
        assert!(!RelayError::Cancelled.is_transport());
        assert!(!RelayError::LaneClosed.is_transport());
    }

    #[test]
    fn test_turn_detection_parse() {
        assert_eq!(
            TurnDetectionMode::parse("server_vad"),
            Some(TurnDetectionMode::ServerVad)
        );
        assert_eq!(
            TurnDetectionMode::parse(" Manual "),
            Some(TurnDetectionMode::Manual)
        );
        assert_eq!(TurnDetectionMode::parse("semantic"), None);
    }

    #[test]
    fn test_default_keepalive_matches_constants() {
        let policy = KeepalivePolicy::default();
        assert_eq!(policy.ping_interval, DEFAULT_PING_INTERVAL);
        assert!(policy.pong_wait > policy.ping_interval);
    }
}
