use crate::config::RealtimeConfig;
use anyhow::{Context, Result};
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Client for upstream calls
    pub http: reqwest::Client,

    /// Upstream endpoints, model names and the long-lived key
    pub realtime: Arc<RealtimeConfig>,

    /// Instructions baked into every upstream session
    pub instructions: Arc<str>,
}

impl AppState {
    pub fn new(realtime: RealtimeConfig, instructions: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(realtime.token_timeout())
            .build()
            .context("Failed to build upstream HTTP client")?;

        Ok(Self {
            http,
            realtime: Arc::new(realtime),
            instructions: Arc::from(instructions.into()),
        })
    }
}
