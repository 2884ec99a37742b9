//! Bounded trace log shared by every session component
//!
//! All components append through one [`Diagnostics`] handle, so the log is a
//! single total order across negotiation, monitoring, reduction and recovery.

use crate::observable::{Observable, Subscription};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Default number of retained events
pub const DEFAULT_CAPACITY: usize = 200;

/// One trace entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticEvent {
    /// When the event was recorded
    pub timestamp: DateTime<Utc>,

    /// Event kind, either an inbound protocol type or a local label
    pub kind: String,

    /// Short human-readable detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// Raw payload, kept only for errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
}

impl fmt::Display for DiagnosticEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} | {}", self.timestamp.format("%H:%M:%S"), self.kind)?;
        if let Some(summary) = &self.summary {
            write!(f, " | {}", summary)?;
        }
        Ok(())
    }
}

/// FIFO ring buffer of diagnostic events
#[derive(Debug)]
pub struct DiagnosticsLog {
    events: VecDeque<DiagnosticEvent>,
    capacity: usize,
    enabled: bool,
}

impl DiagnosticsLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            enabled: true,
        }
    }

    /// Append an event, evicting the oldest one when full.
    ///
    /// Returns false when the log is disabled and nothing was stored.
    pub fn push(&mut self, event: DiagnosticEvent) -> bool {
        if !self.enabled || self.capacity == 0 {
            return false;
        }
        while self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
        true
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn snapshot(&self) -> Vec<DiagnosticEvent> {
        self.events.iter().cloned().collect()
    }
}

/// Shared, observable handle to the diagnostics log
#[derive(Clone)]
pub struct Diagnostics {
    log: Arc<Mutex<DiagnosticsLog>>,
    events: Observable<Vec<DiagnosticEvent>>,
}

impl Diagnostics {
    pub fn new(capacity: usize) -> Self {
        Self {
            log: Arc::new(Mutex::new(DiagnosticsLog::new(capacity))),
            events: Observable::new(Vec::new()),
        }
    }

    /// Record a bare event
    pub fn mark(&self, kind: &str) {
        self.push(kind, None, None);
    }

    /// Record an event with a summary
    pub fn record(&self, kind: &str, summary: impl Into<String>) {
        self.push(kind, Some(summary.into()), None);
    }

    /// Record an event carrying its raw payload
    pub fn record_raw(&self, kind: &str, summary: impl Into<String>, raw: serde_json::Value) {
        self.push(kind, Some(summary.into()), Some(raw));
    }

    fn push(&self, kind: &str, summary: Option<String>, raw: Option<serde_json::Value>) {
        debug!(kind, summary = summary.as_deref().unwrap_or(""), "diagnostic");

        let event = DiagnosticEvent {
            timestamp: Utc::now(),
            kind: kind.to_string(),
            summary,
            raw,
        };

        // Publish while holding the log lock so observers see appends in log order.
        let mut log = self.log.lock();
        if log.push(event) {
            self.events.set(log.snapshot());
        }
    }

    /// Suppress (or resume) future appends; history is kept
    pub fn set_enabled(&self, enabled: bool) {
        self.log.lock().set_enabled(enabled);
    }

    pub fn is_enabled(&self) -> bool {
        self.log.lock().is_enabled()
    }

    pub fn clear(&self) {
        let mut log = self.log.lock();
        log.clear();
        self.events.set(Vec::new());
    }

    pub fn snapshot(&self) -> Vec<DiagnosticEvent> {
        self.log.lock().snapshot()
    }

    pub fn subscribe(&self) -> Subscription<Vec<DiagnosticEvent>> {
        self.events.subscribe()
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Render events the way the copy-to-clipboard surface does
pub fn format_events(events: &[DiagnosticEvent]) -> String {
    events
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}
