//! Merging YAML and environment configurations.

use std::path::PathBuf;

use super::env::EnvConfig;
use super::yaml::YamlConfig;
use super::{RealtimeConfig, RelayTuning, ServerConfig, TlsConfig};
use crate::core::relay::TurnDetectionMode;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_RATE_LIMIT_RPS: u32 = 60;
const DEFAULT_RATE_LIMIT_BURST: u32 = 10;

/// Build a `ServerConfig` from the environment with optional YAML overrides.
///
/// Precedence per field: YAML, then environment, then default.
pub fn merge_config(yaml: Option<YamlConfig>) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let env = EnvConfig::load()?;
    Ok(merge(env, yaml.unwrap_or_default())?)
}

fn merge(env: EnvConfig, yaml: YamlConfig) -> Result<ServerConfig, String> {
    let server = yaml.server.unwrap_or_default();
    let openai = yaml.openai.unwrap_or_default();
    let realtime = yaml.realtime.unwrap_or_default();
    let relay = yaml.relay.unwrap_or_default();
    let security = yaml.security.unwrap_or_default();

    let tls_yaml = server.tls.unwrap_or_default();
    let tls = if tls_yaml.enabled == Some(false) {
        None
    } else {
        let cert = tls_yaml.cert_path.or(env.tls_cert_path);
        let key = tls_yaml.key_path.or(env.tls_key_path);
        match (cert, key) {
            (Some(cert), Some(key)) => Some(TlsConfig {
                cert_path: PathBuf::from(cert),
                key_path: PathBuf::from(key),
            }),
            (None, None) if tls_yaml.enabled != Some(true) => None,
            _ => return Err("TLS requires both cert_path and key_path".to_string()),
        }
    };

    let turn_detection = match realtime.turn_detection {
        Some(raw) => TurnDetectionMode::parse(&raw).ok_or_else(|| {
            format!("Invalid realtime.turn_detection '{raw}': expected server_vad or manual")
        })?,
        None => env.realtime_turn_detection.unwrap_or_default(),
    };

    let realtime_defaults = RealtimeConfig::default();
    let relay_defaults = RelayTuning::default();

    Ok(ServerConfig {
        host: server
            .host
            .or(env.host)
            .unwrap_or_else(|| DEFAULT_HOST.to_string()),
        port: server.port.or(env.port).unwrap_or(DEFAULT_PORT),
        tls,
        openai_api_key: openai.api_key.or(env.openai_api_key).unwrap_or_default(),
        realtime: RealtimeConfig {
            url: realtime
                .url
                .or(env.realtime_url)
                .unwrap_or(realtime_defaults.url),
            model: realtime
                .model
                .or(env.realtime_model)
                .unwrap_or(realtime_defaults.model),
            instructions: realtime
                .instructions
                .or(env.realtime_instructions)
                .unwrap_or(realtime_defaults.instructions),
            voice: realtime
                .voice
                .or(env.realtime_voice)
                .unwrap_or(realtime_defaults.voice),
            speed: realtime
                .speed
                .or(env.realtime_speed)
                .unwrap_or(realtime_defaults.speed),
            sample_rate: realtime
                .sample_rate
                .or(env.realtime_sample_rate)
                .unwrap_or(realtime_defaults.sample_rate),
            turn_detection,
            vad_threshold: realtime
                .vad_threshold
                .or(env.realtime_vad_threshold)
                .unwrap_or(realtime_defaults.vad_threshold),
            vad_prefix_padding_ms: realtime
                .vad_prefix_padding_ms
                .or(env.realtime_vad_prefix_padding_ms)
                .unwrap_or(realtime_defaults.vad_prefix_padding_ms),
            vad_silence_duration_ms: realtime
                .vad_silence_duration_ms
                .or(env.realtime_vad_silence_duration_ms)
                .unwrap_or(realtime_defaults.vad_silence_duration_ms),
            idle_commit_ms: realtime
                .idle_commit_ms
                .or(env.realtime_idle_commit_ms)
                .unwrap_or(realtime_defaults.idle_commit_ms),
            interrupt_on_speech: realtime
                .interrupt_on_speech
                .or(env.realtime_interrupt_on_speech)
                .unwrap_or(realtime_defaults.interrupt_on_speech),
            connect_timeout_secs: realtime
                .connect_timeout_secs
                .or(env.realtime_connect_timeout_secs)
                .unwrap_or(realtime_defaults.connect_timeout_secs),
        },
        relay: RelayTuning {
            ping_interval_secs: relay
                .ping_interval_secs
                .or(env.relay_ping_interval_secs)
                .unwrap_or(relay_defaults.ping_interval_secs),
            pong_wait_secs: relay
                .pong_wait_secs
                .or(env.relay_pong_wait_secs)
                .unwrap_or(relay_defaults.pong_wait_secs),
            write_wait_secs: relay
                .write_wait_secs
                .or(env.relay_write_wait_secs)
                .unwrap_or(relay_defaults.write_wait_secs),
            audio_lane_capacity: relay
                .audio_lane_capacity
                .or(env.relay_audio_lane_capacity)
                .unwrap_or(relay_defaults.audio_lane_capacity),
            control_lane_capacity: relay
                .control_lane_capacity
                .or(env.relay_control_lane_capacity)
                .unwrap_or(relay_defaults.control_lane_capacity),
            max_frame_size: relay
                .max_frame_size
                .or(env.relay_max_frame_size)
                .unwrap_or(relay_defaults.max_frame_size),
        },
        rate_limit_requests_per_second: security
            .rate_limit_requests_per_second
            .or(env.rate_limit_requests_per_second)
            .unwrap_or(DEFAULT_RATE_LIMIT_RPS),
        rate_limit_burst_size: security
            .rate_limit_burst_size
            .or(env.rate_limit_burst_size)
            .unwrap_or(DEFAULT_RATE_LIMIT_BURST),
    })
}
