//! Configuration module for the relay gateway
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use relay_gateway::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

use crate::core::relay::{
    KeepalivePolicy, LaneCapacity, SessionSettings, TurnDetectionMode, UpstreamSessionSettings,
    openai,
};

mod env;
mod merge;
mod validation;
mod yaml;

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone, PartialEq)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Upstream realtime session configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeConfig {
    /// Base WebSocket URL of the realtime service
    pub url: String,
    pub model: String,
    /// Persona text sent as session instructions
    pub instructions: String,
    pub voice: String,
    /// Output speech speed (0.25 - 1.5)
    pub speed: f32,
    /// PCM16 sample rate for both directions, at least 24000
    pub sample_rate: u32,
    pub turn_detection: TurnDetectionMode,
    pub vad_threshold: f32,
    pub vad_prefix_padding_ms: u32,
    pub vad_silence_duration_ms: u32,
    /// Manual turn detection: commit after this much client silence
    pub idle_commit_ms: u64,
    /// Advance the playback generation when the user starts speaking
    pub interrupt_on_speech: bool,
    pub connect_timeout_secs: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: openai::OPENAI_REALTIME_URL.to_string(),
            model: openai::DEFAULT_REALTIME_MODEL.to_string(),
            instructions: "You are a helpful voice assistant.".to_string(),
            voice: "alloy".to_string(),
            speed: 1.0,
            sample_rate: openai::OPENAI_REALTIME_SAMPLE_RATE,
            turn_detection: TurnDetectionMode::ServerVad,
            vad_threshold: 0.5,
            vad_prefix_padding_ms: 300,
            vad_silence_duration_ms: 500,
            idle_commit_ms: 600,
            interrupt_on_speech: true,
            connect_timeout_secs: 10,
        }
    }
}

/// Relay engine tuning
#[derive(Debug, Clone, PartialEq)]
pub struct RelayTuning {
    /// Heartbeat ping period for both sockets
    pub ping_interval_secs: u64,
    /// Read window; must exceed the ping interval
    pub pong_wait_secs: u64,
    /// Deadline for a single socket write
    pub write_wait_secs: u64,
    pub audio_lane_capacity: usize,
    pub control_lane_capacity: usize,
    /// Largest client frame/message accepted, in bytes
    pub max_frame_size: usize,
}

impl Default for RelayTuning {
    fn default() -> Self {
        Self {
            ping_interval_secs: 10,
            pong_wait_secs: 30,
            write_wait_secs: 5,
            audio_lane_capacity: 32,
            control_lane_capacity: 64,
            max_frame_size: 1024 * 1024,
        }
    }
}

/// Server configuration
///
/// Contains all configuration needed to run the relay gateway, including:
/// - Server settings (host, port, TLS)
/// - The OpenAI credential
/// - Upstream session parameters
/// - Relay engine tuning
/// - Rate limiting
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // TLS configuration (optional)
    pub tls: Option<TlsConfig>,

    /// OpenAI API key for the Realtime API (required)
    pub openai_api_key: String,

    pub realtime: RealtimeConfig,
    pub relay: RelayTuning,

    // Rate limiting configuration
    /// Maximum requests per second per IP address
    /// Default: 60
    pub rate_limit_requests_per_second: u32,
    /// Maximum burst size for rate limiting
    /// Default: 10
    pub rate_limit_burst_size: u32,
}

/// Implement Drop to zeroize the credential when ServerConfig is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        self.openai_api_key.zeroize();
    }
}

impl ServerConfig {
    /// Load configuration from environment variables only
    ///
    /// .env values must already be loaded into the process environment
    /// (main.rs does this with `dotenvy`).
    ///
    /// # Errors
    /// Returns an error if an environment variable has an invalid format or
    /// validation fails (for example when `OPENAI_API_KEY` is missing).
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = merge::merge_config(None)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        validation::validate_api_key(&self.openai_api_key)?;
        validation::validate_realtime(&self.realtime)?;
        validation::validate_relay(&self.relay)?;
        validation::validate_rate_limit(
            self.rate_limit_requests_per_second,
            self.rate_limit_burst_size,
        )?;
        Ok(())
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if TLS is enabled
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// Per-session settings derived from this configuration.
    pub fn session_settings(&self) -> SessionSettings {
        let realtime = &self.realtime;
        SessionSettings {
            upstream: UpstreamSessionSettings {
                url: realtime.url.clone(),
                model: realtime.model.clone(),
                instructions: realtime.instructions.clone(),
                voice: realtime.voice.clone(),
                speed: realtime.speed,
                sample_rate: realtime.sample_rate,
                turn_detection: realtime.turn_detection,
                vad_threshold: realtime.vad_threshold,
                vad_prefix_padding_ms: realtime.vad_prefix_padding_ms,
                vad_silence_duration_ms: realtime.vad_silence_duration_ms,
                idle_commit: Duration::from_millis(realtime.idle_commit_ms),
                interrupt_on_speech: realtime.interrupt_on_speech,
                connect_timeout: Duration::from_secs(realtime.connect_timeout_secs),
            },
            keepalive: KeepalivePolicy {
                ping_interval: Duration::from_secs(self.relay.ping_interval_secs),
                pong_wait: Duration::from_secs(self.relay.pong_wait_secs),
                write_wait: Duration::from_secs(self.relay.write_wait_secs),
            },
            lanes: LaneCapacity {
                control: self.relay.control_lane_capacity,
                audio: self.relay.audio_lane_capacity,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use std::fs;
    use tempfile::TempDir;

    fn test_config() -> ServerConfig {
        ServerConfig {
            host: "localhost".to_string(),
            port: 8080,
            tls: None,
            openai_api_key: "sk-test".to_string(),
            realtime: RealtimeConfig::default(),
            relay: RelayTuning::default(),
            rate_limit_requests_per_second: 60,
            rate_limit_burst_size: 10,
        }
    }

    #[test]
    fn test_address() {
        let config = test_config();
        assert_eq!(config.address(), "localhost:8080");
        assert!(!config.is_tls_enabled());
    }

    #[test]
    fn test_session_settings_mapping() {
        let mut config = test_config();
        config.realtime.turn_detection = TurnDetectionMode::Manual;
        config.realtime.idle_commit_ms = 750;
        config.relay.ping_interval_secs = 3;
        config.relay.pong_wait_secs = 9;
        config.relay.audio_lane_capacity = 8;

        let settings = config.session_settings();
        assert_eq!(settings.upstream.turn_detection, TurnDetectionMode::Manual);
        assert_eq!(settings.upstream.idle_commit, Duration::from_millis(750));
        assert_eq!(settings.keepalive.ping_interval, Duration::from_secs(3));
        assert_eq!(settings.keepalive.pong_wait, Duration::from_secs(9));
        assert_eq!(settings.lanes.audio, 8);
        assert_eq!(settings.lanes.control, 64);
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(test_config().validate().is_ok());
    }

    // Helper to clean up environment variables
    fn cleanup_env_vars() {
        unsafe {
            env::remove_var("HOST");
            env::remove_var("PORT");
            env::remove_var("OPENAI_API_KEY");
            env::remove_var("REALTIME_MODEL");
            env::remove_var("REALTIME_VOICE");
            env::remove_var("REALTIME_SAMPLE_RATE");
            env::remove_var("REALTIME_TURN_DETECTION");
            env::remove_var("RELAY_PING_INTERVAL_SECS");
            env::remove_var("RELAY_PONG_WAIT_SECS");
            env::remove_var("RELAY_AUDIO_LANE_CAPACITY");
        }
    }

    #[test]
    #[serial]
    fn test_from_env_requires_api_key() {
        cleanup_env_vars();

        let result = ServerConfig::from_env();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("OPENAI_API_KEY"));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_reads_values() {
        cleanup_env_vars();
        unsafe {
            env::set_var("OPENAI_API_KEY", "sk-env");
            env::set_var("PORT", "9100");
            env::set_var("REALTIME_VOICE", "verse");
            env::set_var("REALTIME_TURN_DETECTION", "manual");
            env::set_var("RELAY_AUDIO_LANE_CAPACITY", "12");
        }

        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.openai_api_key, "sk-env");
        assert_eq!(config.port, 9100);
        assert_eq!(config.realtime.voice, "verse");
        assert_eq!(config.realtime.turn_detection, TurnDetectionMode::Manual);
        assert_eq!(config.relay.audio_lane_capacity, 12);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_yaml_overrides_env() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let yaml_content = r#"
server:
  host: "127.0.0.1"
  port: 8081

openai:
  api_key: "sk-yaml"

realtime:
  voice: "coral"
  speed: 1.2
"#;

        fs::write(&config_path, yaml_content).unwrap();

        unsafe {
            env::set_var("HOST", "0.0.0.0");
            env::set_var("OPENAI_API_KEY", "sk-env");
            env::set_var("REALTIME_VOICE", "ash");
        }

        let config = ServerConfig::from_file(&config_path).unwrap();

        // YAML overrides ENV
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.openai_api_key, "sk-yaml");
        assert_eq!(config.realtime.voice, "coral");
        assert_eq!(config.port, 8081);
        assert!((config.realtime.speed - 1.2).abs() < f32::EPSILON);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_partial_config_keeps_env_and_defaults() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let yaml_content = r#"
relay:
  ping_interval_secs: 5
  pong_wait_secs: 15
"#;

        fs::write(&config_path, yaml_content).unwrap();

        unsafe {
            env::set_var("OPENAI_API_KEY", "sk-env");
        }

        let config = ServerConfig::from_file(&config_path).unwrap();

        assert_eq!(config.relay.ping_interval_secs, 5);
        assert_eq!(config.relay.pong_wait_secs, 15);
        assert_eq!(config.relay.write_wait_secs, 5);
        assert_eq!(config.openai_api_key, "sk-env");
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.realtime.model, "gpt-realtime");

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_rejects_low_sample_rate() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        fs::write(
            &config_path,
            r#"
openai:
  api_key: "sk-yaml"
realtime:
  sample_rate: 16000
"#,
        )
        .unwrap();

        let result = ServerConfig::from_file(&config_path);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("sample_rate"));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_missing_file() {
        cleanup_env_vars();

        let config_path = PathBuf::from("/nonexistent/config.yaml");
        let result = ServerConfig::from_file(&config_path);

        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read config file")
        );

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_invalid_yaml() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("invalid.yaml");

        fs::write(&config_path, "invalid: yaml: [content").unwrap();

        let result = ServerConfig::from_file(&config_path);

        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to parse YAML")
        );

        cleanup_env_vars();
    }
}
