use serde::Deserialize;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present
/// here override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 8080
///   tls:
///     enabled: true
///     cert_path: "/etc/relay/cert.pem"
///     key_path: "/etc/relay/key.pem"
///
/// openai:
///   api_key: "sk-..."
///
/// realtime:
///   url: "wss://api.openai.com/v1/realtime"
///   model: "gpt-realtime"
///   instructions: "You are a friendly concierge."
///   voice: "alloy"
///   speed: 1.0
///   sample_rate: 24000
///   turn_detection: "server_vad"   # or "manual"
///   vad_threshold: 0.5
///   vad_prefix_padding_ms: 300
///   vad_silence_duration_ms: 500
///   idle_commit_ms: 600
///   interrupt_on_speech: true
///   connect_timeout_secs: 10
///
/// relay:
///   ping_interval_secs: 10
///   pong_wait_secs: 30
///   write_wait_secs: 5
///   audio_lane_capacity: 32
///   control_lane_capacity: 64
///   max_frame_size: 1048576
///
/// security:
///   rate_limit_requests_per_second: 60
///   rate_limit_burst_size: 10
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub openai: Option<OpenAIYaml>,
    pub realtime: Option<RealtimeYaml>,
    pub relay: Option<RelayYaml>,
    pub security: Option<SecurityYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls: Option<TlsYaml>,
}

/// TLS configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TlsYaml {
    pub enabled: Option<bool>,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

/// OpenAI credential from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct OpenAIYaml {
    pub api_key: Option<String>,
}

/// Upstream session parameters from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RealtimeYaml {
    pub url: Option<String>,
    pub model: Option<String>,
    pub instructions: Option<String>,
    pub voice: Option<String>,
    pub speed: Option<f32>,
    pub sample_rate: Option<u32>,
    /// "server_vad" or "manual"
    pub turn_detection: Option<String>,
    pub vad_threshold: Option<f32>,
    pub vad_prefix_padding_ms: Option<u32>,
    pub vad_silence_duration_ms: Option<u32>,
    pub idle_commit_ms: Option<u64>,
    pub interrupt_on_speech: Option<bool>,
    pub connect_timeout_secs: Option<u64>,
}

/// Relay engine tuning from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RelayYaml {
    pub ping_interval_secs: Option<u64>,
    pub pong_wait_secs: Option<u64>,
    pub write_wait_secs: Option<u64>,
    pub audio_lane_capacity: Option<usize>,
    pub control_lane_capacity: Option<usize>,
    pub max_frame_size: Option<usize>,
}

/// Security configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityYaml {
    pub rate_limit_requests_per_second: Option<u32>,
    pub rate_limit_burst_size: Option<u32>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be read
    /// - The YAML is malformed
    /// - Fields have invalid types
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_yaml_config_full() {
        let yaml = r#"
server:
  host: "127.0.0.1"
  port: 8080
  tls:
    enabled: true
    cert_path: "/tmp/cert.pem"
    key_path: "/tmp/key.pem"

openai:
  api_key: "sk-yaml"

realtime:
  model: "gpt-realtime"
  voice: "marin"
  turn_detection: "manual"
  idle_commit_ms: 800

relay:
  audio_lane_capacity: 16

security:
  rate_limit_requests_per_second: 100
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();

        let server = config.server.unwrap();
        assert_eq!(server.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(server.port, Some(8080));
        assert_eq!(server.tls.unwrap().enabled, Some(true));

        assert_eq!(config.openai.unwrap().api_key.as_deref(), Some("sk-yaml"));

        let realtime = config.realtime.unwrap();
        assert_eq!(realtime.voice.as_deref(), Some("marin"));
        assert_eq!(realtime.turn_detection.as_deref(), Some("manual"));
        assert_eq!(realtime.idle_commit_ms, Some(800));
        assert_eq!(realtime.speed, None);

        assert_eq!(config.relay.unwrap().audio_lane_capacity, Some(16));
        assert_eq!(
            config.security.unwrap().rate_limit_requests_per_second,
            Some(100)
        );
    }

    #[test]
    fn test_yaml_config_empty() {
        let config: YamlConfig = serde_yaml::from_str("{}").unwrap();
        assert!(config.server.is_none());
        assert!(config.realtime.is_none());
    }

    #[test]
    fn test_yaml_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        fs::write(&path, "relay:\n  pong_wait_secs: 45\n").unwrap();

        let config = YamlConfig::from_file(&path).unwrap();
        assert_eq!(config.relay.unwrap().pong_wait_secs, Some(45));
    }

    #[test]
    fn test_yaml_wrong_type() {
        let result: Result<YamlConfig, _> = serde_yaml::from_str("server:\n  port: \"high\"\n");
        assert!(result.is_err());
    }
}
