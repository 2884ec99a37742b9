use crate::error::SessionError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Server-side voice-activity-detection tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VadSettings {
    /// Activation threshold (0.0 to 1.0)
    pub threshold: f32,

    /// Audio kept before detected speech, in milliseconds
    pub prefix_padding_ms: u32,

    /// Silence that ends a turn, in milliseconds
    pub silence_duration_ms: u32,
}

impl Default for VadSettings {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            prefix_padding_ms: 300,
            silence_duration_ms: 1000,
        }
    }
}

/// Body sent to the credential endpoint
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CredentialRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_detection: Option<VadSettings>,

    /// Caller-supplied key; the endpoint falls back to its own when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl fmt::Debug for CredentialRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRequest")
            .field("turn_detection", &self.turn_detection)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Short-lived bearer secret scoped to one offer/answer exchange
#[derive(Clone, PartialEq, Eq)]
pub struct EphemeralCredential {
    pub secret: String,

    /// Expiry as epoch seconds, when the endpoint reports one
    pub expires_at: Option<i64>,
}

impl fmt::Debug for EphemeralCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EphemeralCredential")
            .field("secret", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Deserialize)]
struct SecretValue {
    value: Option<String>,
    expires_at: Option<i64>,
}

#[derive(Deserialize)]
struct TokenResponse {
    client_secret: Option<SecretValue>,
}

impl EphemeralCredential {
    /// Parse a credential endpoint success body: `{"client_secret": {"value": ..}}`
    pub fn from_body(body: &str) -> Result<Self, SessionError> {
        let parsed: TokenResponse = serde_json::from_str(body)
            .map_err(|e| SessionError::Credential(format!("malformed token response: {}", e)))?;

        match parsed.client_secret {
            Some(SecretValue {
                value: Some(secret),
                expires_at,
            }) if !secret.is_empty() => Ok(Self { secret, expires_at }),
            _ => Err(SessionError::Credential(
                "no client secret returned".to_string(),
            )),
        }
    }
}

/// Result of checking an API key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValidation {
    pub valid: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Human-readable `error` field of an error body.
///
/// Accepts both `{"error": "text"}` and `{"error": {"message": "text"}}`.
pub fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("error")? {
        serde_json::Value::String(message) => Some(message.clone()),
        serde_json::Value::Object(obj) => obj
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string),
        _ => None,
    }
}
