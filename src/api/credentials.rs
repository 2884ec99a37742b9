use super::types::{error_message, CredentialRequest, EphemeralCredential, KeyValidation};
use crate::error::SessionError;
use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{info, warn};

/// Source of ephemeral session credentials
#[async_trait::async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn fetch(&self, request: &CredentialRequest) -> Result<EphemeralCredential, SessionError>;
}

/// HTTP client for the credential endpoint
pub struct TokenClient {
    http: reqwest::Client,
    token_url: String,
    validate_url: String,
}

impl TokenClient {
    /// `timeout` bounds each whole request, body included
    pub fn new(token_url: impl Into<String>, validate_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            token_url: token_url.into(),
            validate_url: validate_url.into(),
        })
    }

    /// Ask the endpoint whether `api_key` is usable
    pub async fn validate_key(&self, api_key: &str) -> Result<KeyValidation> {
        let resp = self
            .http
            .post(&self.validate_url)
            .json(&serde_json::json!({ "api_key": api_key }))
            .send()
            .await
            .context("Failed to reach validation endpoint")?;

        let status = resp.status();
        let body = resp.text().await.context("Failed to read validation response")?;

        if !status.is_success() {
            return Ok(KeyValidation {
                valid: false,
                error: Some(error_message(&body).unwrap_or_else(|| format!("HTTP {}", status.as_u16()))),
            });
        }

        serde_json::from_str(&body).context("Malformed validation response")
    }
}

#[async_trait::async_trait]
impl CredentialProvider for TokenClient {
    async fn fetch(&self, request: &CredentialRequest) -> Result<EphemeralCredential, SessionError> {
        info!("Requesting ephemeral credential from {}", self.token_url);

        let resp = self
            .http
            .post(&self.token_url)
            .json(request)
            .send()
            .await
            .map_err(credential_transport_error)?;

        let status = resp.status();
        let body = resp.text().await.map_err(credential_transport_error)?;

        if !status.is_success() {
            let message = error_message(&body).unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            warn!("Credential endpoint returned {}: {}", status, message);
            return Err(SessionError::Credential(message));
        }

        EphemeralCredential::from_body(&body)
    }
}

fn credential_transport_error(err: reqwest::Error) -> SessionError {
    if err.is_timeout() {
        SessionError::Credential("credential request timed out".to_string())
    } else {
        SessionError::Credential(format!("credential endpoint unreachable: {}", err))
    }
}

/// Provider that always hands out the same secret
pub struct StaticCredentials {
    secret: String,
}

impl StaticCredentials {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

#[async_trait::async_trait]
impl CredentialProvider for StaticCredentials {
    async fn fetch(&self, _request: &CredentialRequest) -> Result<EphemeralCredential, SessionError> {
        Ok(EphemeralCredential {
            secret: self.secret.clone(),
            expires_at: None,
        })
    }
}
