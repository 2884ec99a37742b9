//! In-process transport
//!
//! A peer connector, media devices and signaling endpoint that never leave
//! the process. Every open/close and every message sent on the control
//! channel is recorded, and a driver can inject transport events into the
//! most recently opened peer. Used by the `replay` command and by tests.

use super::{
    AudioTrack, ConnectivitySignal, MediaDevices, MediaSource, PeerConnection, PeerConnector,
    TransportEvent,
};
use crate::api::{EphemeralCredential, SignalingClient};
use crate::error::{MediaError, SessionError};
use anyhow::{bail, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Default)]
struct PeerRecord {
    open: bool,
    channel_label: Option<String>,
    channel_open: bool,
    tracks: Vec<AudioTrack>,
    sent: Vec<String>,
}

struct PeerShared {
    peers: Vec<PeerRecord>,
    senders: Vec<mpsc::UnboundedSender<TransportEvent>>,
    auto_open_channel: bool,
    open_failure: Option<String>,
}

/// Handle for creating loopback peers and driving them from the outside
#[derive(Clone)]
pub struct Loopback {
    shared: Arc<Mutex<PeerShared>>,
}

impl Loopback {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(PeerShared {
                peers: Vec::new(),
                senders: Vec::new(),
                auto_open_channel: true,
                open_failure: None,
            })),
        }
    }

    pub fn connector(&self) -> LoopbackConnector {
        LoopbackConnector {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Whether applying the answer opens the control channel (default true)
    pub fn set_auto_open_channel(&self, enabled: bool) {
        self.shared.lock().auto_open_channel = enabled;
    }

    /// Make every following `open` fail with `reason` (or succeed again with `None`)
    pub fn set_open_failure(&self, reason: Option<&str>) {
        self.shared.lock().open_failure = reason.map(str::to_string);
    }

    /// Total peers ever opened
    pub fn peers_created(&self) -> usize {
        self.shared.lock().peers.len()
    }

    /// Peers not yet closed
    pub fn open_peers(&self) -> usize {
        self.shared.lock().peers.iter().filter(|p| p.open).count()
    }

    /// Messages sent on the newest peer's control channel
    pub fn sent(&self) -> Vec<String> {
        self.shared
            .lock()
            .peers
            .last()
            .map(|p| p.sent.clone())
            .unwrap_or_default()
    }

    /// `type` of every message sent on any peer, in order
    pub fn sent_kinds(&self) -> Vec<String> {
        self.shared
            .lock()
            .peers
            .iter()
            .flat_map(|p| p.sent.iter())
            .filter_map(|raw| {
                let value: serde_json::Value = serde_json::from_str(raw).ok()?;
                value.get("type")?.as_str().map(str::to_string)
            })
            .collect()
    }

    /// Tracks attached to the newest peer
    pub fn tracks(&self) -> Vec<AudioTrack> {
        self.shared
            .lock()
            .peers
            .last()
            .map(|p| p.tracks.clone())
            .unwrap_or_default()
    }

    /// Deliver an event from the newest open peer; false if there is none
    pub fn emit(&self, event: TransportEvent) -> bool {
        let shared = self.shared.lock();
        let Some(index) = shared.peers.iter().rposition(|p| p.open) else {
            return false;
        };
        shared.senders[index].send(event).is_ok()
    }

    pub fn signal(&self, signal: ConnectivitySignal) -> bool {
        self.emit(TransportEvent::Connectivity(signal))
    }

    /// Deliver a server event on the newest open peer's control channel
    pub fn server_event(&self, event: serde_json::Value) -> bool {
        self.emit(TransportEvent::ChannelMessage(event.to_string()))
    }
}

impl Default for Loopback {
    fn default() -> Self {
        Self::new()
    }
}

pub struct LoopbackConnector {
    shared: Arc<Mutex<PeerShared>>,
}

#[async_trait::async_trait]
impl PeerConnector for LoopbackConnector {
    async fn open(
        &self,
    ) -> Result<(Box<dyn PeerConnection>, mpsc::UnboundedReceiver<TransportEvent>)> {
        let mut shared = self.shared.lock();
        if let Some(reason) = &shared.open_failure {
            bail!("{}", reason);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        shared.peers.push(PeerRecord {
            open: true,
            ..Default::default()
        });
        shared.senders.push(tx);
        let index = shared.peers.len() - 1;
        debug!("Loopback peer {} opened", index);

        let peer = LoopbackPeer {
            shared: Arc::clone(&self.shared),
            index,
        };
        Ok((Box::new(peer), rx))
    }
}

pub struct LoopbackPeer {
    shared: Arc<Mutex<PeerShared>>,
    index: usize,
}

#[async_trait::async_trait]
impl PeerConnection for LoopbackPeer {
    fn add_track(&mut self, track: AudioTrack) -> Result<()> {
        let mut shared = self.shared.lock();
        let peer = &mut shared.peers[self.index];
        if !peer.open {
            bail!("peer connection is closed");
        }
        peer.tracks.push(track);
        Ok(())
    }

    fn open_control_channel(&mut self, label: &str) -> Result<()> {
        let mut shared = self.shared.lock();
        let peer = &mut shared.peers[self.index];
        if !peer.open {
            bail!("peer connection is closed");
        }
        peer.channel_label = Some(label.to_string());
        Ok(())
    }

    async fn create_offer(&mut self) -> Result<String> {
        Ok(format!(
            "v=0\r\no=- {} 0 IN IP4 127.0.0.1\r\ns=loopback\r\nt=0 0\r\n",
            self.index
        ))
    }

    async fn apply_answer(&mut self, _sdp: &str) -> Result<()> {
        let mut shared = self.shared.lock();
        let auto_open = shared.auto_open_channel;
        let peer = &mut shared.peers[self.index];
        if !peer.open {
            bail!("peer connection is closed");
        }
        if auto_open && peer.channel_label.is_some() {
            peer.channel_open = true;
            let _ = shared.senders[self.index].send(TransportEvent::ChannelOpen);
        }
        Ok(())
    }

    fn send(&mut self, text: &str) -> Result<()> {
        let mut shared = self.shared.lock();
        let peer = &mut shared.peers[self.index];
        if !peer.channel_open {
            bail!("control channel is not open");
        }
        peer.sent.push(text.to_string());
        Ok(())
    }

    fn is_channel_open(&self) -> bool {
        self.shared.lock().peers[self.index].channel_open
    }

    fn close(&mut self) {
        let mut shared = self.shared.lock();
        let peer = &mut shared.peers[self.index];
        if peer.open {
            debug!("Loopback peer {} closed", self.index);
        }
        peer.open = false;
        peer.channel_open = false;
    }
}

struct DeviceShared {
    devices: Vec<String>,
    deny_permission: bool,
    live: usize,
}

/// Fake audio inputs identified by name
#[derive(Clone)]
pub struct LoopbackDevices {
    shared: Arc<Mutex<DeviceShared>>,
}

impl LoopbackDevices {
    pub fn new<I, S>(devices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            shared: Arc::new(Mutex::new(DeviceShared {
                devices: devices.into_iter().map(Into::into).collect(),
                deny_permission: false,
                live: 0,
            })),
        }
    }

    pub fn set_deny_permission(&self, deny: bool) {
        self.shared.lock().deny_permission = deny;
    }

    /// Sources acquired and not yet stopped
    pub fn live_sources(&self) -> usize {
        self.shared.lock().live
    }
}

impl Default for LoopbackDevices {
    fn default() -> Self {
        Self::new(["default"])
    }
}

#[async_trait::async_trait]
impl MediaDevices for LoopbackDevices {
    async fn acquire(&self, device_id: Option<&str>) -> Result<Box<dyn MediaSource>, MediaError> {
        let mut shared = self.shared.lock();
        if shared.deny_permission {
            return Err(MediaError::PermissionDenied);
        }

        let device = match device_id {
            Some(id) => shared
                .devices
                .iter()
                .find(|d| d.as_str() == id)
                .cloned()
                .ok_or_else(|| MediaError::DeviceUnavailable(id.to_string()))?,
            None => shared
                .devices
                .first()
                .cloned()
                .ok_or_else(|| MediaError::DeviceUnavailable("no audio input".to_string()))?,
        };

        shared.live += 1;
        Ok(Box::new(LoopbackSource {
            shared: Arc::clone(&self.shared),
            track: AudioTrack {
                id: format!("{}-track", device),
                label: device,
                sample_rate: 48000,
                channels: 1,
            },
            live: true,
        }))
    }
}

pub struct LoopbackSource {
    shared: Arc<Mutex<DeviceShared>>,
    track: AudioTrack,
    live: bool,
}

impl MediaSource for LoopbackSource {
    fn tracks(&self) -> Vec<AudioTrack> {
        vec![self.track.clone()]
    }

    fn stop(&mut self) {
        if self.live {
            self.live = false;
            self.shared.lock().live -= 1;
        }
    }

    fn is_live(&self) -> bool {
        self.live
    }
}

/// Signaling endpoint that answers every offer locally
#[derive(Clone, Default)]
pub struct LoopbackSignaling {
    failure: Arc<Mutex<Option<(u16, String)>>>,
    exchanges: Arc<Mutex<usize>>,
}

impl LoopbackSignaling {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject following offers with `status` and `body` (or accept with `None`)
    pub fn set_failure(&self, failure: Option<(u16, &str)>) {
        *self.failure.lock() = failure.map(|(status, body)| (status, body.to_string()));
    }

    pub fn exchanges(&self) -> usize {
        *self.exchanges.lock()
    }
}

#[async_trait::async_trait]
impl SignalingClient for LoopbackSignaling {
    async fn exchange(
        &self,
        offer_sdp: &str,
        _credential: &EphemeralCredential,
    ) -> Result<String, SessionError> {
        *self.exchanges.lock() += 1;
        if let Some((status, body)) = self.failure.lock().clone() {
            return Err(SessionError::Signaling {
                status: Some(status),
                body,
            });
        }
        Ok(offer_sdp.replace("s=loopback", "s=loopback-answer"))
    }
}
