use crate::session::{SessionConfig, SessionParameters, DEFAULT_INSTRUCTIONS};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub realtime: RealtimeConfig,
    pub session: SessionDefaults,
    pub recovery: RecoveryConfig,
    pub diagnostics: DiagnosticsConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
    pub cors: CorsConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "realtime-session".to_string(),
            http: HttpConfig::default(),
            cors: CorsConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Origin patterns; `*` matches any run of characters
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:4200".to_string()],
        }
    }
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Credential endpoint used by clients
    pub token_url: String,

    /// Key validation endpoint used by clients
    pub validate_url: String,

    /// Upstream SDP exchange endpoint
    pub signaling_url: String,

    /// Upstream session creation endpoint (token server)
    pub sessions_url: String,

    /// Upstream endpoint probed to validate a key (token server)
    pub models_url: String,

    pub model: String,
    pub transcription_model: String,

    /// Long-lived key; only the token server reads it
    pub api_key: Option<String>,

    pub token_timeout_ms: u64,
    pub channel_open_timeout_ms: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            token_url: "http://localhost:8080/api/realtime-token".to_string(),
            validate_url: "http://localhost:8080/api/validate-key".to_string(),
            signaling_url: "https://api.openai.com/v1/realtime".to_string(),
            sessions_url: "https://api.openai.com/v1/realtime/sessions".to_string(),
            models_url: "https://api.openai.com/v1/models".to_string(),
            model: "gpt-4o-realtime-preview".to_string(),
            transcription_model: "whisper-1".to_string(),
            api_key: None,
            token_timeout_ms: 10_000,
            channel_open_timeout_ms: 8_000,
        }
    }
}

impl fmt::Debug for RealtimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealtimeConfig")
            .field("token_url", &self.token_url)
            .field("validate_url", &self.validate_url)
            .field("signaling_url", &self.signaling_url)
            .field("sessions_url", &self.sessions_url)
            .field("models_url", &self.models_url)
            .field("model", &self.model)
            .field("transcription_model", &self.transcription_model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("token_timeout_ms", &self.token_timeout_ms)
            .field("channel_open_timeout_ms", &self.channel_open_timeout_ms)
            .finish()
    }
}

impl RealtimeConfig {
    pub fn token_timeout(&self) -> Duration {
        Duration::from_millis(self.token_timeout_ms)
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SessionDefaults {
    pub instructions: String,
    pub device_id: Option<String>,
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            device_id: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    pub backoff_ms: Vec<u64>,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            backoff_ms: vec![250, 500, 1000, 2000, 4000],
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub enabled: bool,
    pub capacity: usize,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: crate::diagnostics::DEFAULT_CAPACITY,
        }
    }
}

impl Config {
    /// Load `path` (extension optional, file optional) under `REALTIME__*`
    /// environment overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("REALTIME")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path))?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            channel_open_timeout: Duration::from_millis(self.realtime.channel_open_timeout_ms),
            backoff: self
                .recovery
                .backoff_ms
                .iter()
                .copied()
                .map(Duration::from_millis)
                .collect(),
            default_instructions: self.session.instructions.clone(),
            diagnostics_capacity: self.diagnostics.capacity,
            diagnostics_enabled: self.diagnostics.enabled,
        }
    }

    /// Connection parameters from configured defaults
    pub fn session_parameters(&self) -> SessionParameters {
        let mut params = SessionParameters::new();
        params.device_id = self.session.device_id.clone();
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = Config::load("/nonexistent/realtime-session").unwrap();
        assert_eq!(config.realtime.model, "gpt-4o-realtime-preview");
        assert_eq!(config.recovery.backoff_ms, vec![250, 500, 1000, 2000, 4000]);
        assert_eq!(config.service.cors.allowed_origins, vec!["http://localhost:4200"]);
        assert!(config.diagnostics.enabled);
    }

    #[test]
    fn test_file_overrides_sections() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[realtime]
model = "gpt-test"
channel_open_timeout_ms = 3000

[recovery]
backoff_ms = [10, 20]

[diagnostics]
capacity = 5
"#
        )
        .unwrap();

        let config = Config::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.realtime.model, "gpt-test");
        assert_eq!(config.realtime.transcription_model, "whisper-1");

        let session = config.session_config();
        assert_eq!(session.channel_open_timeout, Duration::from_secs(3));
        assert_eq!(session.backoff.len(), 2);
        assert_eq!(session.diagnostics_capacity, 5);
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let realtime = RealtimeConfig {
            api_key: Some("sk-very-secret".to_string()),
            ..RealtimeConfig::default()
        };
        assert!(!format!("{:?}", realtime).contains("sk-very-secret"));
    }
}
