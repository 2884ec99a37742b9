use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    Listening,
    Thinking,
    Responding,
    Reconnecting,
    Disconnected,
    Error,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Listening => "listening",
            SessionState::Thinking => "thinking",
            SessionState::Responding => "responding",
            SessionState::Reconnecting => "reconnecting",
            SessionState::Disconnected => "disconnected",
            SessionState::Error => "error",
        }
    }

    /// Short status label for display
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Connecting => "Connecting...",
            SessionState::Listening => "Listening",
            SessionState::Thinking => "Thinking...",
            SessionState::Responding => "Responding...",
            SessionState::Reconnecting => "Reconnecting...",
            SessionState::Disconnected => "Disconnected",
            SessionState::Error => "Error",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
