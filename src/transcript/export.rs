use super::entry::{Role, TranscriptEntry};
use serde::Serialize;

/// Exported form of a transcript entry
#[derive(Debug, Clone, Serialize)]
pub struct ExportEntry {
    /// Epoch milliseconds
    pub ts: i64,
    pub iso: String,
    pub role: Role,
    pub text: String,
}

impl From<&TranscriptEntry> for ExportEntry {
    fn from(entry: &TranscriptEntry) -> Self {
        Self {
            ts: entry.timestamp.timestamp_millis(),
            iso: entry.timestamp.to_rfc3339(),
            role: entry.role,
            text: entry.text.clone(),
        }
    }
}

/// Pretty-printed JSON array of entries
pub fn to_json(entries: &[TranscriptEntry]) -> serde_json::Result<String> {
    let export: Vec<ExportEntry> = entries.iter().map(ExportEntry::from).collect();
    serde_json::to_string_pretty(&export)
}

/// Timestamped plain-text blocks, one per entry
pub fn to_plain_text(entries: &[TranscriptEntry]) -> String {
    entries
        .iter()
        .map(|e| {
            format!(
                "[{}] {}:\n{}\n",
                e.timestamp.format("%Y-%m-%d %H:%M:%S"),
                e.role.label(),
                e.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Compact `Speaker: text` form for the clipboard
pub fn to_clipboard_text(entries: &[TranscriptEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("{}: {}", e.role.label(), e.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}
