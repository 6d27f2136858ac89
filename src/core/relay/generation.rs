//! Playback generations and the downstream binary framing.
//!
//! Framed mode wire layout for assistant audio:
//!
//! ```text
//! +------+----------------------+------------------+
//! | 0x01 | generation (u64, LE) | PCM16LE payload  |
//! +------+----------------------+------------------+
//!   1 B          8 B                  N B
//! ```
//!
//! Interruptions are announced with a text frame
//! `{"type":"playback.interrupt","gen":N,"reason":"..."}`. Raw mode sends the
//! PCM payload bare and never announces interruptions.

use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use super::base::{RelayError, RelayResult};
use super::egress::EgressHandle;
use super::frame::WsFrame;

/// Tag byte marking an audio payload frame.
pub const AUDIO_FRAME_TAG: u8 = 0x01;

/// Tag plus generation.
pub const AUDIO_FRAME_HEADER_LEN: usize = 9;

/// Event name of the interruption notice.
pub const INTERRUPT_EVENT: &str = "playback.interrupt";

// =============================================================================
// Tracker
// =============================================================================

/// Monotonic playback generation shared by the tasks of one session.
///
/// All reads and writes go through one lock so that framing a chunk and
/// queueing it cannot interleave with an advance and its purge.
#[derive(Debug, Clone, Default)]
pub struct GenerationTracker {
    current: Arc<Mutex<u64>>,
}

impl GenerationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(generation: u64) -> Self {
        Self {
            current: Arc::new(Mutex::new(generation)),
        }
    }

    pub fn current(&self) -> u64 {
        *self.current.lock()
    }

    /// Increment and return the new generation.
    pub fn advance(&self) -> u64 {
        self.advance_with(|_| ()).0
    }

    /// Increment, then run `f` with the new value while still holding the lock.
    pub fn advance_with<R>(&self, f: impl FnOnce(u64) -> R) -> (u64, R) {
        let mut current = self.current.lock();
        *current = current.saturating_add(1);
        let generation = *current;
        (generation, f(generation))
    }

    /// Run `f` with the current value while holding the lock.
    pub fn with_current<R>(&self, f: impl FnOnce(u64) -> R) -> R {
        let current = self.current.lock();
        f(*current)
    }
}

// =============================================================================
// Frames
// =============================================================================

/// Errors decoding a framed audio message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame too short: {0} bytes")]
    TooShort(usize),

    #[error("Unknown frame tag 0x{0:02x}")]
    UnknownTag(u8),
}

/// A decoded framed-mode audio message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    pub generation: u64,
    pub pcm: Bytes,
}

impl AudioFrame {
    /// Encode as `[tag][gen LE][pcm]`.
    pub fn encode(generation: u64, pcm: &[u8]) -> Bytes {
        let mut buf = BytesMut::with_capacity(AUDIO_FRAME_HEADER_LEN + pcm.len());
        buf.put_u8(AUDIO_FRAME_TAG);
        buf.put_u64_le(generation);
        buf.put_slice(pcm);
        buf.freeze()
    }

    pub fn decode(data: &[u8]) -> Result<Self, FrameError> {
        if data.len() < AUDIO_FRAME_HEADER_LEN {
            return Err(FrameError::TooShort(data.len()));
        }
        if data[0] != AUDIO_FRAME_TAG {
            return Err(FrameError::UnknownTag(data[0]));
        }
        let mut generation = [0u8; 8];
        generation.copy_from_slice(&data[1..AUDIO_FRAME_HEADER_LEN]);
        Ok(Self {
            generation: u64::from_le_bytes(generation),
            pcm: Bytes::copy_from_slice(&data[AUDIO_FRAME_HEADER_LEN..]),
        })
    }
}

/// Text notice telling the client to drop audio older than `generation`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterruptionNotice {
    #[serde(rename = "type")]
    pub event: String,
    #[serde(rename = "gen")]
    pub generation: u64,
    pub reason: String,
}

impl InterruptionNotice {
    pub fn new(generation: u64, reason: &str) -> Self {
        Self {
            event: INTERRUPT_EVENT.to_string(),
            generation,
            reason: reason.to_string(),
        }
    }

    pub fn to_json(&self) -> RelayResult<String> {
        serde_json::to_string(self).map_err(|e| RelayError::Serialization(e.to_string()))
    }
}

// =============================================================================
// Framer
// =============================================================================

/// Turns assistant PCM into client frames for one session.
#[derive(Debug, Clone)]
pub struct DownstreamFramer {
    raw_mode: bool,
    tracker: GenerationTracker,
}

impl DownstreamFramer {
    pub fn new(raw_mode: bool, tracker: GenerationTracker) -> Self {
        Self { raw_mode, tracker }
    }

    pub fn raw_mode(&self) -> bool {
        self.raw_mode
    }

    pub fn tracker(&self) -> &GenerationTracker {
        &self.tracker
    }

    /// Frame `pcm` for a given generation according to the session mode.
    pub fn frame_for(&self, generation: u64, pcm: &[u8]) -> Bytes {
        if self.raw_mode {
            Bytes::copy_from_slice(pcm)
        } else {
            AudioFrame::encode(generation, pcm)
        }
    }

    /// Frame `pcm` with the current generation.
    pub fn current_frame(&self, pcm: &[u8]) -> Bytes {
        self.tracker
            .with_current(|generation| self.frame_for(generation, pcm))
    }

    /// Interruption notice text for `generation`, or `None` in raw mode.
    pub fn interruption_notice(&self, generation: u64, reason: &str) -> RelayResult<Option<String>> {
        if self.raw_mode {
            return Ok(None);
        }
        InterruptionNotice::new(generation, reason).to_json().map(Some)
    }

    /// Frame and queue one chunk of assistant audio on the client audio lane.
    pub fn relay_audio<M: WsFrame>(&self, pcm: &[u8], egress: &EgressHandle<M>) -> RelayResult<bool> {
        self.tracker.with_current(|generation| {
            let frame = self.frame_for(generation, pcm);
            egress.send_audio_tagged(M::binary(frame), generation)
        })
    }

    /// Advance the generation, purge stale queued audio and queue the notice.
    ///
    /// Returns the new generation.
    pub async fn interrupt<M: WsFrame>(&self, reason: &str, egress: &EgressHandle<M>) -> RelayResult<u64> {
        let (generation, purged) = self
            .tracker
            .advance_with(|generation| egress.purge_audio_before(generation));

        info!(generation, purged, reason, "Playback interrupted");

        match self.interruption_notice(generation, reason)? {
            Some(notice) => egress.send_control(M::text(notice)).await?,
            None => debug!("Raw mode, interruption notice not sent"),
        }

        Ok(generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::relay::base::LaneCapacity;
    use crate::core::relay::egress::EgressScheduler;
    use tokio_tungstenite::tungstenite::Message;

    #[test]
    fn test_advance_k_times() {
        let tracker = GenerationTracker::starting_at(5);
        for _ in 0..3 {
            tracker.advance();
        }
        assert_eq!(tracker.current(), 8);
        assert_eq!(tracker.advance(), 9);
    }

    #[test]
    fn test_tracker_shared_between_clones() {
        let tracker = GenerationTracker::new();
        let other = tracker.clone();
        other.advance();
        assert_eq!(tracker.current(), 1);
    }

    #[test]
    fn test_framed_layout() {
        let framer = DownstreamFramer::new(false, GenerationTracker::starting_at(0x0102));
        let frame = framer.current_frame(&[0xaa, 0xbb]);
        assert_eq!(
            frame.as_ref(),
            &[0x01, 0x02, 0x01, 0, 0, 0, 0, 0, 0, 0xaa, 0xbb]
        );

        let decoded = AudioFrame::decode(&frame).unwrap();
        assert_eq!(decoded.generation, 0x0102);
        assert_eq!(decoded.pcm.as_ref(), &[0xaa, 0xbb]);
    }

    #[test]
    fn test_raw_mode_is_bare_pcm() {
        let framer = DownstreamFramer::new(true, GenerationTracker::starting_at(7));
        assert_eq!(framer.current_frame(&[1, 2, 3]).as_ref(), &[1, 2, 3]);
        assert_eq!(framer.interruption_notice(8, "speech_started").unwrap(), None);
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(AudioFrame::decode(&[0x01, 0, 0]), Err(FrameError::TooShort(3)));
        assert_eq!(
            AudioFrame::decode(&[0x02, 0, 0, 0, 0, 0, 0, 0, 0]),
            Err(FrameError::UnknownTag(0x02))
        );
        let empty = AudioFrame::decode(&AudioFrame::encode(3, &[])).unwrap();
        assert_eq!(empty.generation, 3);
        assert!(empty.pcm.is_empty());
    }

    #[test]
    fn test_notice_json() {
        let notice = InterruptionNotice::new(6, "speech_started").to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&notice).unwrap();
        assert_eq!(value["type"], "playback.interrupt");
        assert_eq!(value["gen"], 6);
        assert_eq!(value["reason"], "speech_started");
    }

    #[tokio::test]
    async fn test_interrupt_purges_stale_audio() {
        let (handle, _scheduler) = EgressScheduler::<Message>::new(LaneCapacity {
            control: 4,
            audio: 8,
        });
        let framer = DownstreamFramer::new(false, GenerationTracker::starting_at(5));

        framer.relay_audio(&[1, 1], &handle).unwrap();
        framer.relay_audio(&[2, 2], &handle).unwrap();
        assert_eq!(handle.audio_len(), 2);

        let generation = framer.interrupt("speech_started", &handle).await.unwrap();
        assert_eq!(generation, 6);
        assert_eq!(handle.audio_len(), 0);
        assert_eq!(handle.stats().snapshot().purged, 2);

        framer.relay_audio(&[3, 3], &handle).unwrap();
        assert_eq!(handle.audio_len(), 1);
    }
}
