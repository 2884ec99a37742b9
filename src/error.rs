use thiserror::Error;

/// Errors that abort a single connection attempt.
///
/// All of these are fatal to the attempt that produced them and are handed
/// back to the caller of `connect`, who decides whether to retry.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Token endpoint timed out or answered with a non-success status
    #[error("credential exchange failed: {0}")]
    Credential(String),

    /// Microphone permission denied or device unavailable
    #[error("media acquisition failed: {0}")]
    MediaAcquisition(#[from] MediaError),

    /// Offer/answer exchange rejected by the remote endpoint, or the local
    /// transport could not be set up (`status` is `None` in that case)
    #[error("signaling failed (status {status:?}): {body}")]
    Signaling { status: Option<u16>, body: String },

    /// Control channel did not open before the deadline, or errored while opening
    #[error("control channel not ready: {0}")]
    ChannelTimeout(String),

    /// A newer `connect` or `disconnect` replaced this attempt
    #[error("connection attempt superseded")]
    Superseded,

    /// The session actor is no longer running
    #[error("session manager has shut down")]
    Closed,
}

impl SessionError {
    pub(crate) fn local_transport(err: anyhow::Error) -> Self {
        SessionError::Signaling {
            status: None,
            body: format!("{:#}", err),
        }
    }
}

/// Why an audio input could not be acquired
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MediaError {
    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("{0}")]
    Other(String),
}
