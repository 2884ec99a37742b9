use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const INTERRUPTED_SUFFIX: &str = "(interrupted)";

/// Who produced an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Speaker label used by export surfaces
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "You",
            Role::Assistant => "Assistant",
        }
    }
}

/// Lifecycle of an entry's text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    /// Still being extended by streaming deltas
    Draft,
    /// Authoritative text
    Final,
    /// Assistant output cut short by barge-in
    Interrupted,
}

/// A single line of the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: Role,

    /// Text without any draft framing
    pub text: String,

    /// When the entry was created
    pub timestamp: DateTime<Utc>,

    pub status: EntryStatus,
}

impl TranscriptEntry {
    fn new(role: Role, text: impl Into<String>, status: EntryStatus) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: Utc::now(),
            status,
        }
    }

    pub fn is_draft(&self) -> bool {
        self.status == EntryStatus::Draft
    }

    fn is_draft_of(&self, role: Role) -> bool {
        self.role == role && self.is_draft()
    }
}

/// Ordered transcript with draft bookkeeping
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&TranscriptEntry> {
        self.entries.last()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Replace the text of the trailing draft for `role`, or append a new draft.
    ///
    /// A new draft is appended when the trailing entry belongs to the other
    /// role or is already final. Any older draft of the same role is settled
    /// first so at most one draft per role exists.
    pub fn upsert_draft(&mut self, role: Role, text: &str) {
        if let Some(last) = self.entries.last_mut() {
            if last.is_draft_of(role) {
                last.text = text.to_string();
                return;
            }
        }

        self.settle_draft(role);
        self.entries
            .push(TranscriptEntry::new(role, text, EntryStatus::Draft));
    }

    /// Turn the trailing draft for `role` into a final entry, or append one
    pub fn finalize_draft(&mut self, role: Role, text: &str) {
        if let Some(last) = self.entries.last_mut() {
            if last.is_draft_of(role) {
                last.text = text.to_string();
                last.status = EntryStatus::Final;
                return;
            }
        }

        self.settle_draft(role);
        self.entries
            .push(TranscriptEntry::new(role, text, EntryStatus::Final));
    }

    /// Mark the in-flight assistant output as interrupted.
    ///
    /// A trailing assistant draft is finalized with the interrupted suffix;
    /// without one, a standalone interrupted placeholder is appended.
    pub fn mark_interrupted(&mut self) {
        if let Some(last) = self.entries.last_mut() {
            if last.is_draft_of(Role::Assistant) {
                let text = last.text.trim();
                last.text = if text.is_empty() {
                    INTERRUPTED_SUFFIX.to_string()
                } else {
                    format!("{} {}", text, INTERRUPTED_SUFFIX)
                };
                last.status = EntryStatus::Interrupted;
                last.timestamp = Utc::now();
                return;
            }
        }

        self.settle_draft(Role::Assistant);
        self.entries.push(TranscriptEntry::new(
            Role::Assistant,
            INTERRUPTED_SUFFIX,
            EntryStatus::Interrupted,
        ));
    }

    /// Append a status line that is final from creation
    pub fn push_notice(&mut self, text: impl Into<String>) {
        self.entries
            .push(TranscriptEntry::new(Role::Assistant, text, EntryStatus::Final));
    }

    /// Close out a non-trailing draft of `role`, keeping its text.
    ///
    /// Entries are never removed, so history only grows.
    fn settle_draft(&mut self, role: Role) {
        if let Some(entry) = self.entries.iter_mut().rev().find(|e| e.is_draft_of(role)) {
            entry.status = EntryStatus::Final;
        }
    }

    /// Number of draft entries for `role`
    pub fn draft_count(&self, role: Role) -> usize {
        self.entries.iter().filter(|e| e.is_draft_of(role)).count()
    }
}
