// Shared harness: a session manager wired to in-process collaborators

#![allow(dead_code)]

use realtime_session::transport::loopback::{Loopback, LoopbackDevices, LoopbackSignaling};
use realtime_session::transport::MediaDevices;
use realtime_session::{
    CredentialProvider, SessionConfig, SessionManager, SessionNegotiator, StaticCredentials,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

pub struct Harness {
    pub manager: SessionManager,
    pub loopback: Loopback,
    pub devices: LoopbackDevices,
    pub signaling: LoopbackSignaling,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(Arc::new(StaticCredentials::new("ek_test")), None, SessionConfig::default())
    }

    pub fn with_credentials(credentials: Arc<dyn CredentialProvider>) -> Self {
        Self::build(credentials, None, SessionConfig::default())
    }

    pub fn with_media(media: Arc<dyn MediaDevices>) -> Self {
        Self::build(Arc::new(StaticCredentials::new("ek_test")), Some(media), SessionConfig::default())
    }

    fn build(
        credentials: Arc<dyn CredentialProvider>,
        media: Option<Arc<dyn MediaDevices>>,
        config: SessionConfig,
    ) -> Self {
        let loopback = Loopback::new();
        let devices = LoopbackDevices::new(["default", "usb-mic"]);
        let signaling = LoopbackSignaling::new();

        let negotiator = SessionNegotiator::new(
            credentials,
            media.unwrap_or_else(|| Arc::new(devices.clone())),
            Arc::new(loopback.connector()),
            Arc::new(signaling.clone()),
        );

        Self {
            manager: SessionManager::spawn(negotiator, config),
            loopback,
            devices,
            signaling,
        }
    }

    /// Deliver a server event and let the session process it
    pub async fn server(&self, event: serde_json::Value) {
        assert!(self.loopback.server_event(event), "no open peer to deliver to");
        settle().await;
    }

    /// One full user/assistant exchange
    pub async fn hello_turn(&self) {
        self.server(json!({"type": "input_audio_buffer.speech_started"})).await;
        self.server(json!({"type": "conversation.item.input_audio_transcription.delta", "delta": "hel"}))
            .await;
        self.server(json!({"type": "conversation.item.input_audio_transcription.delta", "delta": "lo"}))
            .await;
        self.server(json!({"type": "conversation.item.input_audio_transcription.completed", "transcript": "hello"}))
            .await;
        self.server(json!({"type": "response.text.delta", "delta": "Hi"})).await;
        self.server(json!({"type": "response.text.delta", "delta": " there"})).await;
        self.server(json!({"type": "response.text.done"})).await;
    }

    pub fn texts(&self) -> Vec<String> {
        self.manager
            .snapshot_transcript()
            .into_iter()
            .map(|e| e.text)
            .collect()
    }

    pub fn count_text(&self, text: &str) -> usize {
        self.texts().iter().filter(|t| t.as_str() == text).count()
    }
}

/// Run every task until the runtime is idle.
///
/// Under a paused clock the sleep only completes once nothing else can make
/// progress.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
