use crate::api::{CredentialRequest, VadSettings};
use crate::diagnostics::DEFAULT_CAPACITY;
use std::fmt;
use std::time::Duration;

/// Instructions sent when the caller supplies none
pub const DEFAULT_INSTRUCTIONS: &str =
    "You are a helpful assistant. Respond in a natural, human-like tone. Keep answers clear and not too long.";

/// Parameters of one connection attempt.
///
/// Remembered verbatim for reconnects, never re-derived from the caller.
#[derive(Clone, Default, PartialEq)]
pub struct SessionParameters {
    /// Audio input to pin, or the default input when `None`
    pub device_id: Option<String>,

    /// Voice-activity-detection tuning forwarded to the credential endpoint
    pub vad: Option<VadSettings>,

    /// Behavioral instructions sent once the control channel opens
    pub system_instructions: Option<String>,

    /// Caller-supplied key material for the credential endpoint
    pub credential: Option<String>,
}

impl SessionParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn with_vad(mut self, vad: VadSettings) -> Self {
        self.vad = Some(vad);
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.system_instructions = Some(instructions.into());
        self
    }

    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    pub(crate) fn credential_request(&self) -> CredentialRequest {
        CredentialRequest {
            turn_detection: self.vad,
            api_key: self.credential.clone(),
        }
    }
}

impl fmt::Debug for SessionParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionParameters")
            .field("device_id", &self.device_id)
            .field("vad", &self.vad)
            .field(
                "system_instructions",
                &self.system_instructions.as_ref().map(|s| s.len()),
            )
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Options for `disconnect`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisconnectOptions {
    /// Also drop the transcript and reset state to idle
    pub clear_transcript: bool,
}

/// Configuration for a session manager
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Deadline for the control channel to open after the answer is applied
    pub channel_open_timeout: Duration,

    /// Delay before each reconnection attempt
    pub backoff: Vec<Duration>,

    /// Used when the caller passes no system instructions
    pub default_instructions: String,

    /// Diagnostics ring buffer size
    pub diagnostics_capacity: usize,

    /// Whether diagnostics start enabled
    pub diagnostics_enabled: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            channel_open_timeout: Duration::from_secs(8),
            backoff: [250, 500, 1000, 2000, 4000]
                .into_iter()
                .map(Duration::from_millis)
                .collect(),
            default_instructions: DEFAULT_INSTRUCTIONS.to_string(),
            diagnostics_capacity: DEFAULT_CAPACITY,
            diagnostics_enabled: true,
        }
    }
}
