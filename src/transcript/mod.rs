//! Conversation transcript
//!
//! Ordered list of user/assistant entries. Entries are extended while they
//! are drafts and become immutable once finalized; the only later mutation
//! is marking an in-flight assistant entry as interrupted.

mod entry;
mod export;

pub use entry::{EntryStatus, Role, Transcript, TranscriptEntry, INTERRUPTED_SUFFIX};
pub use export::{to_clipboard_text, to_json, to_plain_text, ExportEntry};
