//! Batch and summary record types.
//!
//! A batch keeps one entry per message so sender, subject and body can
//! never drift out of alignment. Each field is joined only when a record
//! is built.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::mail::{MailMessage, MessageId};

/// Separator between senders and between subjects in a record.
pub const FIELD_SEPARATOR: &str = "\n";

/// Separator between bodies in a record and between entries in the
/// summarizer input.
pub const BODY_SEPARATOR: &str = "\n\n";

/// One fetched message, tagged with the id it was listed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    pub id: MessageId,
    pub message: MailMessage,
}

impl BatchEntry {
    pub fn new(id: MessageId, message: MailMessage) -> Self {
        Self { id, message }
    }

    fn render(&self) -> String {
        format!(
            "Sender: {}\nSubject: {}\nBody: {}",
            self.message.sender, self.message.subject, self.message.body
        )
    }
}

/// The ordered unread messages captured at the start of one run.
#[derive(Debug, Clone)]
pub struct Batch {
    entries: Vec<BatchEntry>,
}

impl Batch {
    /// `None` for an empty list; an empty batch is never summarized.
    pub fn new(entries: Vec<BatchEntry>) -> Option<Self> {
        if entries.is_empty() {
            None
        } else {
            Some(Self { entries })
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[BatchEntry] {
        &self.entries
    }

    pub fn ids(&self) -> impl Iterator<Item = &MessageId> {
        self.entries.iter().map(|e| &e.id)
    }

    /// Text handed to the summarizer.
    pub fn combined_text(&self) -> String {
        self.entries
            .iter()
            .map(BatchEntry::render)
            .collect::<Vec<_>>()
            .join(BODY_SEPARATOR)
    }

    fn join_field<'a>(&'a self, field: impl Fn(&'a MailMessage) -> &'a str, sep: &str) -> String {
        self.entries
            .iter()
            .map(|e| field(&e.message))
            .collect::<Vec<_>>()
            .join(sep)
    }
}

/// One appended row: the run's messages plus their combined summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryRecord {
    pub timestamp: DateTime<Utc>,
    pub senders: String,
    pub subjects: String,
    pub bodies: String,
    pub summary: String,
}

impl SummaryRecord {
    pub fn from_batch(batch: &Batch, summary: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            senders: batch.join_field(|m| m.sender.as_str(), FIELD_SEPARATOR),
            subjects: batch.join_field(|m| m.subject.as_str(), FIELD_SEPARATOR),
            bodies: batch.join_field(|m| m.body.as_str(), BODY_SEPARATOR),
            summary: summary.into(),
        }
    }
}
