use super::types::EphemeralCredential;
use crate::error::SessionError;
use anyhow::{Context, Result};
use reqwest::header::CONTENT_TYPE;
use tracing::{info, warn};

/// Offer/answer exchange with the remote realtime endpoint
#[async_trait::async_trait]
pub trait SignalingClient: Send + Sync {
    /// Send the local offer, authorized by `credential`, and return the answer
    async fn exchange(&self, offer_sdp: &str, credential: &EphemeralCredential) -> Result<String, SessionError>;
}

/// SDP exchange over HTTPS
pub struct HttpSignaling {
    http: reqwest::Client,
    url: String,
    model: String,
}

impl HttpSignaling {
    pub fn new(url: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            url: url.into(),
            model: model.into(),
        })
    }
}

#[async_trait::async_trait]
impl SignalingClient for HttpSignaling {
    async fn exchange(&self, offer_sdp: &str, credential: &EphemeralCredential) -> Result<String, SessionError> {
        info!("Posting session offer to {} (model={})", self.url, self.model);

        let resp = self
            .http
            .post(&self.url)
            .query(&[("model", self.model.as_str())])
            .bearer_auth(&credential.secret)
            .header(CONTENT_TYPE, "application/sdp")
            .body(offer_sdp.to_string())
            .send()
            .await
            .map_err(|e| SessionError::Signaling {
                status: None,
                body: e.to_string(),
            })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| SessionError::Signaling {
            status: Some(status.as_u16()),
            body: e.to_string(),
        })?;

        if !status.is_success() {
            warn!("Signaling endpoint returned {}", status);
            return Err(SessionError::Signaling {
                status: Some(status.as_u16()),
                body,
            });
        }

        Ok(body)
    }
}
