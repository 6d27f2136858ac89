//! Mapping between the client's minimal protocol and the upstream events.
//!
//! Everything here is pure: no socket I/O, no session state.

use base64::prelude::*;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::Value;

use super::base::UpstreamSessionSettings;
use super::openai::{ClientEvent, ResponseConfig, ServerEvent, SessionConfig};

/// Text commands a client may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCommand {
    /// Cancel the in-flight response
    Cancel,
    /// Discard buffered input audio
    Clear,
    /// Request a response now
    Force,
    /// Commit buffered input audio and request a response
    Commit,
}

impl ClientCommand {
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            "cancel" => Some(Self::Cancel),
            "clear" => Some(Self::Clear),
            "force" => Some(Self::Force),
            "commit" => Some(Self::Commit),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cancel => "cancel",
            Self::Clear => "clear",
            Self::Force => "force",
            Self::Commit => "commit",
        }
    }
}

/// First message on every upstream socket.
pub fn session_update(settings: &UpstreamSessionSettings) -> ClientEvent {
    ClientEvent::SessionUpdate {
        session: SessionConfig::from_settings(settings),
    }
}

/// Client PCM to an append event.
pub fn audio_append(pcm: &[u8]) -> ClientEvent {
    ClientEvent::audio_append(pcm)
}

/// Commit followed by an audio-only response request.
pub fn commit_turn() -> Vec<ClientEvent> {
    vec![ClientEvent::InputAudioBufferCommit, response_create()]
}

fn response_create() -> ClientEvent {
    ClientEvent::ResponseCreate {
        response: Some(ResponseConfig::audio()),
    }
}

/// Upstream events for a client command, in send order.
pub fn command_events(command: ClientCommand) -> Vec<ClientEvent> {
    match command {
        ClientCommand::Cancel => vec![ClientEvent::ResponseCancel],
        ClientCommand::Clear => vec![ClientEvent::InputAudioBufferClear],
        ClientCommand::Force => vec![response_create()],
        ClientCommand::Commit => commit_turn(),
    }
}

/// What the relay should do with one upstream text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamAction {
    /// Decoded assistant PCM for the client audio lane
    RelayAudio(Bytes),
    /// The user started speaking over the assistant
    Interrupt { reason: &'static str },
    /// Peer-reported error, forwarded verbatim as pretty JSON
    Diagnostic { message: String, payload: String },
    /// A response finished
    Milestone {
        response_id: Option<String>,
        status: Option<String>,
    },
    /// Recognized JSON with no relay action
    Observe(String),
    /// Malformed unit, dropped
    Discard(String),
}

/// Classify one upstream text frame.
pub fn translate_upstream(text: &str) -> UpstreamAction {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => return UpstreamAction::Discard(format!("non-JSON payload: {}", e)),
    };

    let event_type = match value.get("type").and_then(Value::as_str) {
        Some(t) => t.to_string(),
        None => return UpstreamAction::Discard("event without a type".to_string()),
    };

    // Peer errors reach the client whatever their body looks like.
    if event_type == "error" {
        return diagnostic(&value, text);
    }

    let event = match ServerEvent::deserialize(&value) {
        Ok(event) => event,
        Err(e) => return UpstreamAction::Discard(format!("malformed {} event: {}", event_type, e)),
    };

    match event {
        ServerEvent::Error { .. } => diagnostic(&value, text),
        ServerEvent::AudioDelta { delta, .. } => match BASE64_STANDARD.decode(delta.as_bytes()) {
            Ok(pcm) if pcm.is_empty() => UpstreamAction::Discard("empty audio delta".to_string()),
            Ok(pcm) => UpstreamAction::RelayAudio(Bytes::from(pcm)),
            Err(e) => UpstreamAction::Discard(format!("undecodable audio delta: {}", e)),
        },
        ServerEvent::ResponseDone { response } => {
            let response = response.unwrap_or_default();
            UpstreamAction::Milestone {
                response_id: response.id,
                status: response.status,
            }
        }
        ServerEvent::SpeechStarted { .. } => UpstreamAction::Interrupt {
            reason: "speech_started",
        },
        ServerEvent::Other => UpstreamAction::Observe(event_type),
    }
}

fn diagnostic(value: &Value, text: &str) -> UpstreamAction {
    let message = value
        .pointer("/error/message")
        .and_then(Value::as_str)
        .or_else(|| value.get("error").and_then(Value::as_str))
        .or_else(|| value.get("message").and_then(Value::as_str))
        .unwrap_or("unspecified error")
        .to_string();

    UpstreamAction::Diagnostic {
        message,
        payload: serde_json::to_string_pretty(value).unwrap_or_else(|_| text.to_string()),
    }
}
