//! OpenAI Realtime API protocol.
//!
//! The relay talks to the GA Realtime API: `session.update` with the nested
//! `audio.input` / `audio.output` shape, PCM16 at 24 kHz in both directions,
//! and audio deltas named `response.output_audio.delta`. The legacy delta name
//! is still accepted on input.

mod client;
mod config;
mod messages;

pub use client::{UpstreamSocket, build_ws_url, connect};
pub use config::{
    DEFAULT_REALTIME_MODEL, OPENAI_REALTIME_SAMPLE_RATE, OPENAI_REALTIME_URL, OpenAIRealtimeVoice,
    PCM_FORMAT_TYPE,
};
pub use messages::{
    ApiError, AudioConfig, AudioFormat, AudioInputConfig, AudioOutputConfig, ClientEvent,
    ResponseConfig, ResponseSummary, ServerEvent, SessionConfig, TurnDetection,
};
