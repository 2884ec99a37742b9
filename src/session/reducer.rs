//! Conversation reducer
//!
//! Folds inbound protocol events into the transcript. The reducer never
//! talks to the transport itself: it returns [`Effect`]s that the session
//! actor executes in order, so a transcript change listed before an outbound
//! message is published before that message is sent.

use super::state::SessionState;
use crate::protocol::{ClientEvent, ServerEvent};
use crate::transcript::{Role, Transcript};

/// Prefix of transcript entries produced by protocol `error` events
pub const REMOTE_ERROR_PREFIX: &str = "⚠️ Realtime error: ";

/// Side effect requested by the reducer
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    SetState(SessionState),
    /// Publish the transcript as it stands now
    PublishTranscript,
    Send(ClientEvent),
}

/// Per-connection conversation bookkeeping
#[derive(Debug, Default)]
pub struct ConversationReducer {
    user_draft: String,
    assistant_draft: String,
    assistant_in_progress: bool,
    responding: bool,
}

impl ConversationReducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a response is being generated
    pub fn assistant_in_progress(&self) -> bool {
        self.assistant_in_progress
    }

    /// Drop drafts and in-flight bookkeeping; the transcript is untouched
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn apply(&mut self, event: &ServerEvent, transcript: &mut Transcript) -> Vec<Effect> {
        match event {
            ServerEvent::SpeechStarted => self.on_speech_started(transcript),
            ServerEvent::UserTranscriptDelta { delta } => {
                self.user_draft.push_str(delta.as_deref().unwrap_or(""));
                transcript.upsert_draft(Role::User, &self.user_draft);
                vec![Effect::PublishTranscript]
            }
            ServerEvent::UserTranscriptCompleted { transcript: text } => {
                self.on_user_completed(text.as_deref(), transcript)
            }
            ServerEvent::AssistantTextDelta { delta } => self.on_assistant_delta(delta.as_deref(), transcript),
            ServerEvent::AssistantTextDone => self.on_assistant_done(transcript),
            ServerEvent::Error { error } => {
                self.assistant_in_progress = false;
                self.responding = false;
                let message = error
                    .as_ref()
                    .and_then(|e| e.message.clone())
                    .or_else(|| error.as_ref().and_then(|e| serde_json::to_string(e).ok()))
                    .unwrap_or_else(|| "unknown error".to_string());
                transcript.push_notice(format!("{}{}", REMOTE_ERROR_PREFIX, message));
                vec![Effect::SetState(SessionState::Error), Effect::PublishTranscript]
            }
            ServerEvent::Unknown => Vec::new(),
        }
    }

    fn on_speech_started(&mut self, transcript: &mut Transcript) -> Vec<Effect> {
        let mut effects = vec![Effect::SetState(SessionState::Listening)];

        // Barge-in: the transcript records the interruption before the
        // cancel is sent, whether or not the cancel is ever acknowledged.
        if self.assistant_in_progress {
            transcript.mark_interrupted();
            effects.push(Effect::PublishTranscript);
            effects.push(Effect::Send(ClientEvent::ResponseCancel));
            self.assistant_in_progress = false;
            self.responding = false;
            self.assistant_draft.clear();
        }

        self.user_draft.clear();
        transcript.upsert_draft(Role::User, "");
        effects.push(Effect::PublishTranscript);
        effects
    }

    fn on_user_completed(&mut self, authoritative: Option<&str>, transcript: &mut Transcript) -> Vec<Effect> {
        let text = authoritative
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(&self.user_draft)
            .trim()
            .to_string();
        transcript.finalize_draft(Role::User, &text);

        self.user_draft.clear();
        self.assistant_draft.clear();
        self.assistant_in_progress = true;
        self.responding = false;

        vec![
            Effect::SetState(SessionState::Thinking),
            Effect::PublishTranscript,
            Effect::Send(ClientEvent::response_create()),
        ]
    }

    fn on_assistant_delta(&mut self, delta: Option<&str>, transcript: &mut Transcript) -> Vec<Effect> {
        // Late deltas of a cancelled or finished response.
        if !self.assistant_in_progress {
            return Vec::new();
        }

        let mut effects = Vec::new();
        if !self.responding {
            self.responding = true;
            effects.push(Effect::SetState(SessionState::Responding));
        }

        self.assistant_draft.push_str(delta.unwrap_or(""));
        transcript.upsert_draft(Role::Assistant, &self.assistant_draft);
        effects.push(Effect::PublishTranscript);
        effects
    }

    fn on_assistant_done(&mut self, transcript: &mut Transcript) -> Vec<Effect> {
        if !self.assistant_in_progress {
            return Vec::new();
        }

        let mut effects = Vec::new();
        if !self.assistant_draft.is_empty() {
            transcript.finalize_draft(Role::Assistant, &self.assistant_draft);
            effects.push(Effect::PublishTranscript);
        }

        self.assistant_draft.clear();
        self.assistant_in_progress = false;
        self.responding = false;
        effects.push(Effect::SetState(SessionState::Listening));
        effects
    }
}
