//! Environment variable loading.
//!
//! Every field is optional here; defaults are applied in `merge`.

use std::env;
use std::str::FromStr;

use crate::core::relay::TurnDetectionMode;

/// Values read from the process environment.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,

    pub openai_api_key: Option<String>,

    pub realtime_url: Option<String>,
    pub realtime_model: Option<String>,
    pub realtime_instructions: Option<String>,
    pub realtime_voice: Option<String>,
    pub realtime_speed: Option<f32>,
    pub realtime_sample_rate: Option<u32>,
    pub realtime_turn_detection: Option<TurnDetectionMode>,
    pub realtime_vad_threshold: Option<f32>,
    pub realtime_vad_prefix_padding_ms: Option<u32>,
    pub realtime_vad_silence_duration_ms: Option<u32>,
    pub realtime_idle_commit_ms: Option<u64>,
    pub realtime_interrupt_on_speech: Option<bool>,
    pub realtime_connect_timeout_secs: Option<u64>,

    pub relay_ping_interval_secs: Option<u64>,
    pub relay_pong_wait_secs: Option<u64>,
    pub relay_write_wait_secs: Option<u64>,
    pub relay_audio_lane_capacity: Option<usize>,
    pub relay_control_lane_capacity: Option<usize>,
    pub relay_max_frame_size: Option<usize>,

    pub rate_limit_requests_per_second: Option<u32>,
    pub rate_limit_burst_size: Option<u32>,
}

impl EnvConfig {
    /// Read all recognized variables.
    ///
    /// # Errors
    /// Returns an error naming the variable when a value cannot be parsed.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            host: string_var("HOST"),
            port: parse_var("PORT")?,
            tls_cert_path: string_var("TLS_CERT_PATH"),
            tls_key_path: string_var("TLS_KEY_PATH"),

            openai_api_key: string_var("OPENAI_API_KEY"),

            realtime_url: string_var("REALTIME_URL"),
            realtime_model: string_var("REALTIME_MODEL"),
            realtime_instructions: string_var("REALTIME_INSTRUCTIONS"),
            realtime_voice: string_var("REALTIME_VOICE"),
            realtime_speed: parse_var("REALTIME_SPEED")?,
            realtime_sample_rate: parse_var("REALTIME_SAMPLE_RATE")?,
            realtime_turn_detection: turn_detection_var("REALTIME_TURN_DETECTION")?,
            realtime_vad_threshold: parse_var("REALTIME_VAD_THRESHOLD")?,
            realtime_vad_prefix_padding_ms: parse_var("REALTIME_VAD_PREFIX_PADDING_MS")?,
            realtime_vad_silence_duration_ms: parse_var("REALTIME_VAD_SILENCE_DURATION_MS")?,
            realtime_idle_commit_ms: parse_var("REALTIME_IDLE_COMMIT_MS")?,
            realtime_interrupt_on_speech: bool_var("REALTIME_INTERRUPT_ON_SPEECH")?,
            realtime_connect_timeout_secs: parse_var("REALTIME_CONNECT_TIMEOUT_SECS")?,

            relay_ping_interval_secs: parse_var("RELAY_PING_INTERVAL_SECS")?,
            relay_pong_wait_secs: parse_var("RELAY_PONG_WAIT_SECS")?,
            relay_write_wait_secs: parse_var("RELAY_WRITE_WAIT_SECS")?,
            relay_audio_lane_capacity: parse_var("RELAY_AUDIO_LANE_CAPACITY")?,
            relay_control_lane_capacity: parse_var("RELAY_CONTROL_LANE_CAPACITY")?,
            relay_max_frame_size: parse_var("RELAY_MAX_FRAME_SIZE")?,

            rate_limit_requests_per_second: parse_var("RATE_LIMIT_REQUESTS_PER_SECOND")?,
            rate_limit_burst_size: parse_var("RATE_LIMIT_BURST_SIZE")?,
        })
    }
}

/// Non-empty string value.
fn string_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(name: &str) -> Result<Option<T>, Box<dyn std::error::Error>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match string_var(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("Invalid {name} value '{raw}': {e}").into()),
        None => Ok(None),
    }
}

fn bool_var(name: &str) -> Result<Option<bool>, Box<dyn std::error::Error>> {
    match string_var(name) {
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Some(true)),
            "false" | "0" | "no" | "off" => Ok(Some(false)),
            _ => Err(format!("Invalid {name} value '{raw}': expected true or false").into()),
        },
        None => Ok(None),
    }
}

fn turn_detection_var(name: &str) -> Result<Option<TurnDetectionMode>, Box<dyn std::error::Error>> {
    match string_var(name) {
        Some(raw) => TurnDetectionMode::parse(&raw).map(Some).ok_or_else(|| {
            format!("Invalid {name} value '{raw}': expected server_vad or manual").into()
        }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_parse_errors_name_the_variable() {
        unsafe {
            env::set_var("RELAY_PONG_WAIT_SECS", "soon");
        }
        let err = EnvConfig::load().unwrap_err().to_string();
        assert!(err.contains("RELAY_PONG_WAIT_SECS"));
        unsafe {
            env::remove_var("RELAY_PONG_WAIT_SECS");
        }
    }

    #[test]
    #[serial]
    fn test_bool_and_mode_values() {
        unsafe {
            env::set_var("REALTIME_INTERRUPT_ON_SPEECH", "off");
            env::set_var("REALTIME_TURN_DETECTION", "server_vad");
        }
        let config = EnvConfig::load().unwrap();
        assert_eq!(config.realtime_interrupt_on_speech, Some(false));
        assert_eq!(
            config.realtime_turn_detection,
            Some(TurnDetectionMode::ServerVad)
        );
        unsafe {
            env::remove_var("REALTIME_INTERRUPT_ON_SPEECH");
            env::remove_var("REALTIME_TURN_DETECTION");
        }
    }

    #[test]
    #[serial]
    fn test_blank_values_are_unset() {
        unsafe {
            env::set_var("HOST", "   ");
        }
        assert_eq!(EnvConfig::load().unwrap().host, None);
        unsafe {
            env::remove_var("HOST");
        }
    }
}
