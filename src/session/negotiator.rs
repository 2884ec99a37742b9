//! Connection establishment
//!
//! One `negotiate` call runs the whole attempt: credential exchange, audio
//! capture, peer transport plus control channel, offer/answer, waiting for
//! the channel to open and the initial instructions message. Any failure
//! closes whatever was already opened before the error is returned.

use super::config::{SessionConfig, SessionParameters, DEFAULT_INSTRUCTIONS};
use crate::api::{CredentialProvider, EphemeralCredential, SignalingClient};
use crate::diagnostics::Diagnostics;
use crate::error::SessionError;
use crate::protocol::{ClientEvent, CONTROL_CHANNEL_LABEL};
use crate::transport::{
    AudioTrack, MediaDevices, MediaSource, PeerConnection, PeerConnector, TransportEvent,
};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Transport resources of one established attempt.
///
/// Owned by exactly one attempt; `close` releases everything and may be
/// called any number of times.
pub struct Connection {
    peer: Box<dyn PeerConnection>,
    media: Box<dyn MediaSource>,
    events: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    buffered: Vec<TransportEvent>,
}

impl Connection {
    /// Hand over transport events: those that arrived while the channel was
    /// opening, then the live stream.
    pub(crate) fn take_events(
        &mut self,
    ) -> (Vec<TransportEvent>, Option<mpsc::UnboundedReceiver<TransportEvent>>) {
        (std::mem::take(&mut self.buffered), self.events.take())
    }

    /// Send on the control channel; `Ok(false)` when the channel is not open
    pub fn send(&mut self, event: &ClientEvent) -> Result<bool> {
        if !self.peer.is_channel_open() {
            return Ok(false);
        }
        self.peer.send(&event.encode()?)?;
        Ok(true)
    }

    pub fn close(&mut self) {
        self.peer.close();
        self.media.stop();
        self.events = None;
        self.buffered.clear();
    }
}

/// Runs connection attempts against the session's collaborators
pub struct SessionNegotiator {
    credentials: Arc<dyn CredentialProvider>,
    media: Arc<dyn MediaDevices>,
    connector: Arc<dyn PeerConnector>,
    signaling: Arc<dyn SignalingClient>,
    channel_open_timeout: Duration,
    default_instructions: String,
}

impl SessionNegotiator {
    pub fn new(
        credentials: Arc<dyn CredentialProvider>,
        media: Arc<dyn MediaDevices>,
        connector: Arc<dyn PeerConnector>,
        signaling: Arc<dyn SignalingClient>,
    ) -> Self {
        Self {
            credentials,
            media,
            connector,
            signaling,
            channel_open_timeout: Duration::from_secs(8),
            default_instructions: DEFAULT_INSTRUCTIONS.to_string(),
        }
    }

    pub(crate) fn configure(&mut self, config: &SessionConfig) {
        self.channel_open_timeout = config.channel_open_timeout;
        self.default_instructions = config.default_instructions.clone();
    }

    pub async fn negotiate(
        &self,
        params: &SessionParameters,
        diagnostics: &Diagnostics,
    ) -> Result<Connection, SessionError> {
        diagnostics.record(
            "client.connect",
            format!("deviceId={}", params.device_id.as_deref().unwrap_or("default")),
        );

        // 1. Ephemeral credential
        let credential = match self.credentials.fetch(&params.credential_request()).await {
            Ok(credential) => {
                diagnostics.mark("token.ok");
                credential
            }
            Err(e) => {
                diagnostics.record("token.error", e.to_string());
                return Err(e);
            }
        };

        // 2. Audio input
        let mut media = match self.media.acquire(params.device_id.as_deref()).await {
            Ok(media) => media,
            Err(e) => {
                diagnostics.record("audio.error", e.to_string());
                return Err(SessionError::MediaAcquisition(e));
            }
        };
        let tracks = media.tracks();
        diagnostics.record(
            "audio.ok",
            format!(
                "tracks={} label={}",
                tracks.len(),
                tracks.first().map(|t| t.label.as_str()).unwrap_or("")
            ),
        );

        // 3. Peer transport
        let (mut peer, mut events) = match self.connector.open().await {
            Ok(opened) => opened,
            Err(e) => {
                media.stop();
                diagnostics.record("pc.error", format!("{:#}", e));
                return Err(SessionError::local_transport(e));
            }
        };

        // 3-6 on the open transport
        match self
            .establish(peer.as_mut(), &mut events, tracks, &credential, params, diagnostics)
            .await
        {
            Ok(buffered) => {
                info!("Session negotiated");
                Ok(Connection {
                    peer,
                    media,
                    events: Some(events),
                    buffered,
                })
            }
            Err(e) => {
                warn!("Connection attempt aborted: {}", e);
                peer.close();
                media.stop();
                diagnostics.record("connect.aborted", e.to_string());
                Err(e)
            }
        }
    }

    async fn establish(
        &self,
        peer: &mut dyn PeerConnection,
        events: &mut mpsc::UnboundedReceiver<TransportEvent>,
        tracks: Vec<AudioTrack>,
        credential: &EphemeralCredential,
        params: &SessionParameters,
        diagnostics: &Diagnostics,
    ) -> Result<Vec<TransportEvent>, SessionError> {
        for track in tracks {
            peer.add_track(track).map_err(SessionError::local_transport)?;
        }
        peer.open_control_channel(CONTROL_CHANNEL_LABEL)
            .map_err(SessionError::local_transport)?;
        diagnostics.record("pc.created", format!("channel={}", CONTROL_CHANNEL_LABEL));

        // 4. Offer/answer
        let offer = peer.create_offer().await.map_err(SessionError::local_transport)?;
        diagnostics.record("sdp.offer", format!("{} bytes", offer.len()));

        let answer = match self.signaling.exchange(&offer, credential).await {
            Ok(answer) => answer,
            Err(e) => {
                diagnostics.record("sdp.error", e.to_string());
                return Err(e);
            }
        };
        peer.apply_answer(&answer)
            .await
            .map_err(SessionError::local_transport)?;
        diagnostics.record("sdp.answer", format!("{} bytes", answer.len()));

        // 5. Control channel
        let buffered = wait_for_channel_open(events, self.channel_open_timeout).await?;
        diagnostics.mark("dc.open");

        // 6. Instructions override
        let instructions = params
            .system_instructions
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&self.default_instructions);
        let update = ClientEvent::instructions(instructions)
            .encode()
            .map_err(|e| SessionError::ChannelTimeout(e.to_string()))?;
        peer.send(&update)
            .map_err(|e| SessionError::ChannelTimeout(format!("{:#}", e)))?;
        diagnostics.mark("session.update");

        Ok(buffered)
    }
}

/// Wait for `ChannelOpen`, keeping any other events for later delivery
async fn wait_for_channel_open(
    events: &mut mpsc::UnboundedReceiver<TransportEvent>,
    deadline: Duration,
) -> Result<Vec<TransportEvent>, SessionError> {
    let mut buffered = Vec::new();

    let wait = async {
        loop {
            match events.recv().await {
                Some(TransportEvent::ChannelOpen) => return Ok(()),
                Some(TransportEvent::ChannelError(e)) => {
                    return Err(SessionError::ChannelTimeout(format!("control channel error: {}", e)))
                }
                Some(TransportEvent::ChannelClosed) => {
                    return Err(SessionError::ChannelTimeout(
                        "control channel closed while opening".to_string(),
                    ))
                }
                Some(other) => buffered.push(other),
                None => {
                    return Err(SessionError::ChannelTimeout(
                        "transport closed while opening".to_string(),
                    ))
                }
            }
        }
    };
    let outcome = tokio::time::timeout(deadline, wait).await;

    match outcome {
        Ok(Ok(())) => Ok(buffered),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(SessionError::ChannelTimeout(format!(
            "control channel did not open within {}ms",
            deadline.as_millis()
        ))),
    }
}
