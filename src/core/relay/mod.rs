//! Per-session realtime audio relay engine.
//!
//! A [`Session`] bridges one client WebSocket speaking the minimal PCM
//! protocol to one OpenAI Realtime WebSocket speaking JSON events.
//!
//! # Client protocol
//!
//! Inbound:
//! - binary: PCM16LE mono at the session sample rate, any chunking
//! - text: `cancel`, `clear`, `force`, `commit`; anything else is ignored
//!
//! Outbound:
//! - binary, framed mode: `[0x01][u64 LE generation][PCM16LE]`
//! - binary, raw mode: PCM16LE only
//! - text, framed mode: `{"type":"playback.interrupt","gen":N,"reason":"..."}`
//! - text, both modes: upstream `error` events, pretty-printed
//!
//! # Example
//!
//! ```rust,ignore
//! use relay_gateway::core::relay::{Session, SessionSettings, openai};
//!
//! let settings = SessionSettings::default();
//! let upstream = openai::connect(&settings.upstream, &api_key).await?;
//! let summary = Session::new(settings, false).run(client_socket, upstream).await;
//! println!("final generation {}", summary.final_generation);
//! ```

pub mod base;
pub mod client;
pub mod egress;
pub mod frame;
pub mod generation;
pub mod openai;
pub mod session;
pub mod translator;
pub mod upstream;

pub use base::{
    KeepalivePolicy, LaneCapacity, RelayError, RelayResult, SessionSettings, TurnDetectionMode,
    UpstreamSessionSettings,
};
pub use egress::{EgressHandle, EgressScheduler, EgressStats, EgressStatsSnapshot};
pub use frame::{Inbound, WsFrame};
pub use generation::{
    AUDIO_FRAME_TAG, AudioFrame, DownstreamFramer, FrameError, GenerationTracker,
    InterruptionNotice,
};
pub use session::{Session, SessionSummary};
pub use translator::{ClientCommand, UpstreamAction};
