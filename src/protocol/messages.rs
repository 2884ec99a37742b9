use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Label of the ordered, reliable data channel carrying protocol events
pub const CONTROL_CHANNEL_LABEL: &str = "oai-events";

/// Events received from the realtime service
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Server-side VAD detected the start of user speech
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted,

    #[serde(rename = "conversation.item.input_audio_transcription.delta")]
    UserTranscriptDelta {
        #[serde(default)]
        delta: Option<String>,
    },

    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    UserTranscriptCompleted {
        #[serde(default)]
        transcript: Option<String>,
    },

    #[serde(rename = "response.text.delta")]
    AssistantTextDelta {
        #[serde(default)]
        delta: Option<String>,
    },

    #[serde(rename = "response.text.done")]
    AssistantTextDone,

    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        error: Option<RemoteError>,
    },

    /// Any type this client does not act on
    #[serde(other)]
    Unknown,
}

/// Error payload of a protocol-level `error` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteError {
    #[serde(default)]
    pub message: Option<String>,

    #[serde(rename = "type", default)]
    pub kind: Option<String>,

    #[serde(default)]
    pub code: Option<serde_json::Value>,
}

/// Events sent to the realtime service
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Override the remote session's behavioral instructions
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionUpdate },

    /// Ask the model to generate a response for the committed user turn
    #[serde(rename = "response.create")]
    ResponseCreate { response: ResponseOptions },

    /// Cancel the in-flight response
    #[serde(rename = "response.cancel")]
    ResponseCancel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionUpdate {
    pub instructions: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseOptions {
    pub modalities: Vec<String>,
}

impl Default for ResponseOptions {
    fn default() -> Self {
        Self {
            modalities: vec!["text".to_string()],
        }
    }
}

impl ClientEvent {
    pub fn instructions(instructions: impl Into<String>) -> Self {
        ClientEvent::SessionUpdate {
            session: SessionUpdate {
                instructions: instructions.into(),
            },
        }
    }

    pub fn response_create() -> Self {
        ClientEvent::ResponseCreate {
            response: ResponseOptions::default(),
        }
    }

    /// Wire type string
    pub fn kind(&self) -> &'static str {
        match self {
            ClientEvent::SessionUpdate { .. } => "session.update",
            ClientEvent::ResponseCreate { .. } => "response.create",
            ClientEvent::ResponseCancel => "response.cancel",
        }
    }

    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("message is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message has no string `type` field")]
    MissingType,
}

/// A decoded inbound message
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Wire type string, kept for unknown events
    pub kind: String,
    pub event: ServerEvent,
    pub raw: serde_json::Value,
}

impl InboundMessage {
    /// Short detail for the diagnostics log
    pub fn summary(&self) -> Option<String> {
        match &self.event {
            ServerEvent::UserTranscriptDelta { delta } | ServerEvent::AssistantTextDelta { delta } => {
                Some(format!("+{} chars", delta.as_deref().unwrap_or("").chars().count()))
            }
            ServerEvent::UserTranscriptCompleted { transcript } => Some(format!(
                "{} chars",
                transcript.as_deref().unwrap_or("").chars().count()
            )),
            ServerEvent::Error { error } => Some(
                error
                    .as_ref()
                    .and_then(|e| e.message.clone())
                    .unwrap_or_else(|| "unknown".to_string()),
            ),
            ServerEvent::Unknown => Some("unhandled".to_string()),
            ServerEvent::SpeechStarted | ServerEvent::AssistantTextDone => None,
        }
    }
}

/// Decode one control-channel message
pub fn decode(raw: &str) -> Result<InboundMessage, DecodeError> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    let kind = value
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or(DecodeError::MissingType)?
        .to_string();
    let event = serde_json::from_value(value.clone())?;

    Ok(InboundMessage {
        kind,
        event,
        raw: value,
    })
}
