//! Pure view-model for the chat screen, kept free of egui types so it can be
//! tested without a UI context.

use chrono::{DateTime, Local, Utc};
use shared::{domain::ChatSession, protocol::MessageRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Sent,
    Received,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub kind: EntryKind,
    pub sender: String,
    pub content: String,
    pub time_label: String,
}

/// Classifies each message against the local identity and attaches a
/// local-time label. Content is carried verbatim; the widgets render it as
/// plain text and never interpret it, so markup typed by a participant stays
/// inert.
pub fn build_transcript(messages: &[MessageRecord], my_account: &str) -> Vec<TranscriptEntry> {
    messages
        .iter()
        .map(|message| TranscriptEntry {
            kind: if message.sender == my_account {
                EntryKind::Sent
            } else {
                EntryKind::Received
            },
            sender: message.sender.clone(),
            content: message.content.clone(),
            time_label: local_time_label(message.created_at),
        })
        .collect()
}

fn local_time_label(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M").to_string()
}

/// Chat screen header: the partner's name once known, otherwise a waiting
/// hint. The creator does not learn the joiner's name until a message
/// arrives.
pub fn chat_header(session: &ChatSession) -> (String, Option<String>) {
    match session.partner_account() {
        Some(partner) => (format!("Chat with {partner}"), None),
        None => (
            "Chat".to_string(),
            Some("Waiting for your partner to join".to_string()),
        ),
    }
}
