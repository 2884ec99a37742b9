//! Peer transport and media seams
//!
//! Codec handling, NAT traversal and transport security belong to the
//! underlying peer-connection implementation. The session only sees the
//! traits below:
//! - `MediaDevices` / `MediaSource`: audio input acquisition
//! - `PeerConnector` / `PeerConnection`: peer transport plus control channel
//! - `TransportEvent`: everything the transport reports back

pub mod loopback;
pub mod wav;

use crate::error::MediaError;
use anyhow::Result;
use std::fmt;
use tokio::sync::mpsc;

/// ICE-level connectivity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceState {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

/// Overall peer-connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// A connectivity report from either layer of the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivitySignal {
    Ice(IceState),
    Peer(PeerState),
}

impl fmt::Display for ConnectivitySignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectivitySignal::Ice(s) => format!("{:?}", s),
            ConnectivitySignal::Peer(s) => format!("{:?}", s),
        };
        f.write_str(&name.to_lowercase())
    }
}

/// Events emitted by an open peer connection
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connectivity(ConnectivitySignal),
    /// Control channel became operational
    ChannelOpen,
    /// One text message received on the control channel
    ChannelMessage(String),
    ChannelError(String),
    ChannelClosed,
}

/// Audio track handed from a media source to the peer transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTrack {
    pub id: String,
    pub label: String,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Captured audio input
pub trait MediaSource: Send {
    fn tracks(&self) -> Vec<AudioTrack>;

    /// Release the device; calling it twice is a no-op
    fn stop(&mut self);

    fn is_live(&self) -> bool;
}

/// Audio input provider
#[async_trait::async_trait]
pub trait MediaDevices: Send + Sync {
    /// Acquire an input, pinned to `device_id` when given
    async fn acquire(&self, device_id: Option<&str>) -> Result<Box<dyn MediaSource>, MediaError>;
}

/// An open peer connection with its control channel
#[async_trait::async_trait]
pub trait PeerConnection: Send {
    fn add_track(&mut self, track: AudioTrack) -> Result<()>;

    /// Create the ordered, reliable control channel
    fn open_control_channel(&mut self, label: &str) -> Result<()>;

    /// Produce and apply the local session description
    async fn create_offer(&mut self) -> Result<String>;

    /// Apply the remote answer
    async fn apply_answer(&mut self, sdp: &str) -> Result<()>;

    /// Send a text message on the control channel
    fn send(&mut self, text: &str) -> Result<()>;

    fn is_channel_open(&self) -> bool;

    /// Close the channel and the connection; already-closed is a no-op
    fn close(&mut self);
}

/// Factory for peer connections
#[async_trait::async_trait]
pub trait PeerConnector: Send + Sync {
    /// Open a peer connection and the stream of its events
    async fn open(
        &self,
    ) -> Result<(Box<dyn PeerConnection>, mpsc::UnboundedReceiver<TransportEvent>)>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_display() {
        assert_eq!(ConnectivitySignal::Ice(IceState::Completed).to_string(), "completed");
        assert_eq!(ConnectivitySignal::Peer(PeerState::Failed).to_string(), "failed");
    }
}
