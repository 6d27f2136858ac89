//! Configuration validation logic.

use url::Url;

use super::{RealtimeConfig, RelayTuning};
use crate::core::relay::openai::{OPENAI_REALTIME_SAMPLE_RATE, OpenAIRealtimeVoice};

/// The credential is mandatory; the gateway cannot serve a session without it.
pub fn validate_api_key(api_key: &str) -> Result<(), Box<dyn std::error::Error>> {
    if api_key.trim().is_empty() {
        return Err(
            "OPENAI_API_KEY is required (set the environment variable or openai.api_key in YAML)"
                .into(),
        );
    }
    Ok(())
}

pub fn validate_realtime(realtime: &RealtimeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let url = Url::parse(&realtime.url)
        .map_err(|e| format!("Invalid realtime.url '{}': {e}", realtime.url))?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(format!(
            "Invalid realtime.url '{}': scheme must be ws or wss",
            realtime.url
        )
        .into());
    }

    if realtime.model.trim().is_empty() {
        return Err("realtime.model must not be empty".into());
    }

    if OpenAIRealtimeVoice::parse(&realtime.voice).is_none() {
        let known: Vec<&str> = OpenAIRealtimeVoice::all()
            .iter()
            .map(OpenAIRealtimeVoice::as_str)
            .collect();
        return Err(format!(
            "Unknown realtime.voice '{}' (expected one of: {})",
            realtime.voice,
            known.join(", ")
        )
        .into());
    }

    if !(0.25..=1.5).contains(&realtime.speed) {
        return Err(format!(
            "realtime.speed must be between 0.25 and 1.5, got {}",
            realtime.speed
        )
        .into());
    }

    if realtime.sample_rate < OPENAI_REALTIME_SAMPLE_RATE {
        return Err(format!(
            "realtime.sample_rate must be at least {OPENAI_REALTIME_SAMPLE_RATE} Hz, got {}",
            realtime.sample_rate
        )
        .into());
    }

    if !(0.0..=1.0).contains(&realtime.vad_threshold) {
        return Err(format!(
            "realtime.vad_threshold must be between 0.0 and 1.0, got {}",
            realtime.vad_threshold
        )
        .into());
    }

    if realtime.idle_commit_ms == 0 {
        return Err("realtime.idle_commit_ms must be greater than 0".into());
    }

    if realtime.connect_timeout_secs == 0 {
        return Err("realtime.connect_timeout_secs must be greater than 0".into());
    }

    Ok(())
}

pub fn validate_relay(relay: &RelayTuning) -> Result<(), Box<dyn std::error::Error>> {
    if relay.ping_interval_secs == 0 {
        return Err("relay.ping_interval_secs must be greater than 0".into());
    }
    if relay.pong_wait_secs <= relay.ping_interval_secs {
        return Err(format!(
            "relay.pong_wait_secs ({}) must exceed relay.ping_interval_secs ({})",
            relay.pong_wait_secs, relay.ping_interval_secs
        )
        .into());
    }
    if relay.write_wait_secs == 0 {
        return Err("relay.write_wait_secs must be greater than 0".into());
    }
    if relay.audio_lane_capacity == 0 {
        return Err("relay.audio_lane_capacity must be greater than 0".into());
    }
    if relay.control_lane_capacity == 0 {
        return Err("relay.control_lane_capacity must be greater than 0".into());
    }
    if relay.max_frame_size == 0 {
        return Err("relay.max_frame_size must be greater than 0".into());
    }
    Ok(())
}

pub fn validate_rate_limit(
    requests_per_second: u32,
    burst_size: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    if requests_per_second == 0 {
        return Err("rate_limit_requests_per_second must be greater than 0".into());
    }
    if burst_size == 0 {
        return Err("rate_limit_burst_size must be greater than 0".into());
    }
    Ok(())
}
