//! OpenAI Realtime API WebSocket message types.
//!
//! Only the slice of the protocol the relay speaks is modeled here.
//!
//! # Protocol Overview
//!
//! Client events (sent to server):
//! - session.update - Configure audio formats, turn detection and voice
//! - input_audio_buffer.append - Append base64 PCM to the input buffer
//! - input_audio_buffer.commit - Commit the input buffer as a user turn
//! - input_audio_buffer.clear - Discard the input buffer
//! - response.create - Generate a response now
//! - response.cancel - Cancel the in-flight response
//!
//! Server events (received from server):
//! - error - Peer-reported failure
//! - response.output_audio.delta - Audio chunk (legacy name: response.audio.delta)
//! - response.done - Response complete
//! - input_audio_buffer.speech_started - Server VAD heard the user
//! - anything else is kept only as its type name

use base64::prelude::*;
use serde::{Deserialize, Serialize};

use super::config::{OPENAI_REALTIME_SAMPLE_RATE, PCM_FORMAT_TYPE};
use crate::core::relay::base::{RelayError, RelayResult, TurnDetectionMode, UpstreamSessionSettings};

// =============================================================================
// Session Configuration
// =============================================================================

/// Session configuration sent in `session.update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session kind, always `realtime`
    #[serde(rename = "type")]
    pub session_type: String,

    /// System instructions for the assistant
    pub instructions: String,

    /// Input and output audio settings
    pub audio: AudioConfig,

    /// Response modalities
    pub output_modalities: Vec<String>,
}

/// Audio section of the session configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    pub input: AudioInputConfig,
    pub output: AudioOutputConfig,
}

/// Input audio configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioInputConfig {
    pub format: AudioFormat,

    /// `null` disables server turn detection
    pub turn_detection: Option<TurnDetection>,
}

/// Output audio configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioOutputConfig {
    pub format: AudioFormat,
    pub voice: String,
    pub speed: f32,
}

/// Wire audio format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioFormat {
    #[serde(rename = "type")]
    pub format_type: String,
    pub rate: u32,
}

impl AudioFormat {
    /// PCM16 at the given rate.
    pub fn pcm(rate: u32) -> Self {
        Self {
            format_type: PCM_FORMAT_TYPE.to_string(),
            rate,
        }
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::pcm(OPENAI_REALTIME_SAMPLE_RATE)
    }
}

/// Turn detection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TurnDetection {
    /// Server-side VAD
    #[serde(rename = "server_vad")]
    ServerVad {
        /// Activation threshold
        threshold: f32,
        /// Audio prefix padding in ms
        prefix_padding_ms: u32,
        /// Silence duration in ms
        silence_duration_ms: u32,
        /// Whether to create response on turn end
        create_response: bool,
        /// Whether to interrupt the in-flight response on speech
        interrupt_response: bool,
    },
}

impl SessionConfig {
    /// Build the session configuration for a relay session.
    pub fn from_settings(settings: &UpstreamSessionSettings) -> Self {
        let turn_detection = match settings.turn_detection {
            TurnDetectionMode::ServerVad => Some(TurnDetection::ServerVad {
                threshold: settings.vad_threshold,
                prefix_padding_ms: settings.vad_prefix_padding_ms,
                silence_duration_ms: settings.vad_silence_duration_ms,
                create_response: true,
                interrupt_response: settings.interrupt_on_speech,
            }),
            TurnDetectionMode::Manual => None,
        };

        Self {
            session_type: "realtime".to_string(),
            instructions: settings.instructions.clone(),
            audio: AudioConfig {
                input: AudioInputConfig {
                    format: AudioFormat::pcm(settings.sample_rate),
                    turn_detection,
                },
                output: AudioOutputConfig {
                    format: AudioFormat::pcm(settings.sample_rate),
                    voice: settings.voice.clone(),
                    speed: settings.speed,
                },
            },
            output_modalities: vec!["audio".to_string()],
        }
    }
}

/// Response creation options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_modalities: Option<Vec<String>>,
}

impl ResponseConfig {
    /// Audio-only response.
    pub fn audio() -> Self {
        Self {
            output_modalities: Some(vec!["audio".to_string()]),
        }
    }
}

// =============================================================================
// Client Events
// =============================================================================

/// Events sent from the relay to the Realtime API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Update session configuration
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionConfig },

    /// Append audio to the input buffer
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend {
        /// Base64-encoded PCM16 audio
        audio: String,
    },

    /// Commit the input buffer
    #[serde(rename = "input_audio_buffer.commit")]
    InputAudioBufferCommit,

    /// Clear the input buffer
    #[serde(rename = "input_audio_buffer.clear")]
    InputAudioBufferClear,

    /// Create a response
    #[serde(rename = "response.create")]
    ResponseCreate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        response: Option<ResponseConfig>,
    },

    /// Cancel the in-flight response
    #[serde(rename = "response.cancel")]
    ResponseCancel,
}

impl ClientEvent {
    /// Create an audio append event from raw PCM bytes.
    pub fn audio_append(audio_data: &[u8]) -> Self {
        Self::InputAudioBufferAppend {
            audio: BASE64_STANDARD.encode(audio_data),
        }
    }

    /// Event type name as it appears on the wire.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SessionUpdate { .. } => "session.update",
            Self::InputAudioBufferAppend { .. } => "input_audio_buffer.append",
            Self::InputAudioBufferCommit => "input_audio_buffer.commit",
            Self::InputAudioBufferClear => "input_audio_buffer.clear",
            Self::ResponseCreate { .. } => "response.create",
            Self::ResponseCancel => "response.cancel",
        }
    }

    /// Encode as a JSON text payload.
    pub fn to_json(&self) -> RelayResult<String> {
        serde_json::to_string(self).map_err(|e| RelayError::Serialization(e.to_string()))
    }
}

// =============================================================================
// Server Events
// =============================================================================

/// Events received from the Realtime API.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Error occurred
    #[serde(rename = "error")]
    Error {
        /// Error details
        error: ApiError,
    },

    /// Audio chunk of the current response
    #[serde(
        rename = "response.output_audio.delta",
        alias = "response.audio.delta"
    )]
    AudioDelta {
        #[serde(default)]
        response_id: Option<String>,
        /// Base64-encoded PCM16 audio
        delta: String,
    },

    /// Response complete
    #[serde(rename = "response.done")]
    ResponseDone {
        #[serde(default)]
        response: Option<ResponseSummary>,
    },

    /// Speech started (VAD detected speech)
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted {
        #[serde(default)]
        audio_start_ms: u64,
        #[serde(default)]
        item_id: Option<String>,
    },

    /// Any event the relay does not act on
    #[serde(other)]
    Other,
}

/// Error details carried by an `error` event.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(rename = "type", default)]
    pub error_type: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub param: Option<String>,
}

/// The parts of a finished response worth logging.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResponseSummary {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_serialization() {
        let json = ClientEvent::InputAudioBufferCommit.to_json().unwrap();
        assert_eq!(json, r#"{"type":"input_audio_buffer.commit"}"#);

        let json = ClientEvent::ResponseCancel.to_json().unwrap();
        assert_eq!(json, r#"{"type":"response.cancel"}"#);
    }

    #[test]
    fn test_audio_append() {
        let data = vec![0u8, 1, 2, 3];
        match ClientEvent::audio_append(&data) {
            ClientEvent::InputAudioBufferAppend { audio } => {
                let decoded = BASE64_STANDARD.decode(&audio).unwrap();
                assert_eq!(decoded, data);
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_response_create_audio_only() {
        let event = ClientEvent::ResponseCreate {
            response: Some(ResponseConfig::audio()),
        };
        let value: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "response.create");
        assert_eq!(value["response"]["output_modalities"][0], "audio");
    }

    #[test]
    fn test_session_update_server_vad_shape() {
        let settings = UpstreamSessionSettings::default();
        let event = ClientEvent::SessionUpdate {
            session: SessionConfig::from_settings(&settings),
        };
        let value: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();

        assert_eq!(value["type"], "session.update");
        assert_eq!(value["session"]["type"], "realtime");
        assert_eq!(value["session"]["audio"]["input"]["format"]["type"], "audio/pcm");
        assert_eq!(value["session"]["audio"]["input"]["format"]["rate"], 24000);
        assert_eq!(
            value["session"]["audio"]["input"]["turn_detection"]["type"],
            "server_vad"
        );
        assert_eq!(
            value["session"]["audio"]["input"]["turn_detection"]["create_response"],
            true
        );
        assert_eq!(value["session"]["audio"]["output"]["voice"], "alloy");
        assert_eq!(value["session"]["output_modalities"][0], "audio");
    }

    #[test]
    fn test_session_update_manual_sends_null_turn_detection() {
        let settings = UpstreamSessionSettings {
            turn_detection: TurnDetectionMode::Manual,
            ..Default::default()
        };
        let json = serde_json::to_string(&SessionConfig::from_settings(&settings)).unwrap();
        assert!(json.contains(r#""turn_detection":null"#));
    }

    #[test]
    fn test_server_event_error() {
        let json = r#"{
            "type": "error",
            "error": {
                "type": "invalid_request_error",
                "message": "Test error"
            }
        }"#;
        match serde_json::from_str::<ServerEvent>(json).unwrap() {
            ServerEvent::Error { error } => {
                assert_eq!(error.error_type, "invalid_request_error");
                assert_eq!(error.message, "Test error");
            }
            other => panic!("Wrong event type: {:?}", other),
        }
    }

    #[test]
    fn test_server_event_audio_delta_both_names() {
        for name in ["response.output_audio.delta", "response.audio.delta"] {
            let json = format!(r#"{{"type":"{}","response_id":"r1","delta":"AAE="}}"#, name);
            match serde_json::from_str::<ServerEvent>(&json).unwrap() {
                ServerEvent::AudioDelta { delta, response_id } => {
                    assert_eq!(delta, "AAE=");
                    assert_eq!(response_id.as_deref(), Some("r1"));
                }
                other => panic!("Wrong event type for {}: {:?}", name, other),
            }
        }
    }

    #[test]
    fn test_server_event_unknown_type() {
        let json = r#"{"type":"session.created","session":{"id":"s1"}}"#;
        assert_eq!(
            serde_json::from_str::<ServerEvent>(json).unwrap(),
            ServerEvent::Other
        );
    }

    #[test]
    fn test_server_event_speech_started_lenient() {
        let json = r#"{"type":"input_audio_buffer.speech_started"}"#;
        assert!(matches!(
            serde_json::from_str::<ServerEvent>(json).unwrap(),
            ServerEvent::SpeechStarted { .. }
        ));
    }
}
