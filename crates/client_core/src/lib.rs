use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use shared::{
    domain::{ChatSession, SessionId},
    protocol::{MessageRecord, NewMessageRecord, NewSessionRecord, SessionRecord},
};
use thiserror::Error;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{info, warn};

pub mod keygen;
pub mod rest;

pub const MIN_DISPLAY_NAME_LEN: usize = 2;

/// The external managed data service, reduced to the five primitives this
/// client actually consumes. Persistence, query ordering and notification
/// delivery are the service's concern, not ours.
#[async_trait]
pub trait DataService: Send + Sync {
    async fn insert_session(&self, record: NewSessionRecord) -> Result<SessionId>;
    async fn find_session(
        &self,
        creator_account: &str,
        key: &str,
    ) -> Result<Option<SessionRecord>>;
    async fn insert_message(&self, record: NewMessageRecord) -> Result<()>;
    async fn list_messages(&self, session_id: SessionId) -> Result<Vec<MessageRecord>>;
    async fn open_message_feed(&self, session_id: SessionId) -> Result<Arc<dyn MessageFeed>>;
}

/// An established change-notification feed scoped to one session's message
/// inserts.
#[async_trait]
pub trait MessageFeed: Send + Sync {
    fn subscribe(&self) -> broadcast::Receiver<MessageRecord>;
    async fn close(&self);
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("display name must have at least {MIN_DISPLAY_NAME_LEN} characters")]
    TooShort,
}

/// Validates and canonicalizes a chosen display name. Surrounding whitespace
/// never counts toward the minimum length and is never persisted.
pub fn validate_display_name(raw: &str) -> Result<String, IdentityError> {
    let trimmed = raw.trim();
    if trimmed.chars().count() < MIN_DISPLAY_NAME_LEN {
        return Err(IdentityError::TooShort);
    }
    Ok(trimmed.to_string())
}

#[derive(Debug, Error)]
pub enum CreateSessionError {
    #[error("failed to create chat session: {0}")]
    Backend(anyhow::Error),
}

#[derive(Debug, Error)]
pub enum JoinSessionError {
    #[error("creator name and key are both required")]
    MissingField,
    /// Zero rows matched. An expected outcome, distinct from a failed query.
    #[error("no chat matches that account and key")]
    NotFound,
    #[error("chat lookup failed: {0}")]
    Backend(anyhow::Error),
}

#[derive(Debug, Error)]
pub enum SendMessageError {
    #[error("message content must not be empty")]
    EmptyContent,
    #[error("no active chat session")]
    NoActiveSession,
    #[error("failed to send message: {0}")]
    Backend(anyhow::Error),
}

#[derive(Debug, Error)]
#[error("failed to load transcript: {0}")]
pub struct TranscriptError(pub anyhow::Error);

/// Events broadcast to frontends. Transcript events carry the session id so
/// a view can drop refreshes that raced a session switch.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    SessionOpened(ChatSession),
    SessionClosed,
    TranscriptUpdated {
        session_id: SessionId,
        messages: Vec<MessageRecord>,
    },
    TranscriptFetchFailed {
        session_id: SessionId,
        reason: String,
    },
}

struct ActiveSubscription {
    session_id: SessionId,
    feed: Arc<dyn MessageFeed>,
    feed_task: JoinHandle<()>,
}

#[derive(Default)]
struct ClientState {
    active_session: Option<ChatSession>,
}

/// Client engine owning all mutable chat state: the active session and the
/// single live subscription. Frontends hold it behind an `Arc`, queue calls
/// from their own event loop and render from the broadcast stream.
pub struct ChatClient {
    data: Arc<dyn DataService>,
    inner: Mutex<ClientState>,
    subscription: Mutex<Option<ActiveSubscription>>,
    events: broadcast::Sender<ClientEvent>,
}

impl ChatClient {
    pub fn new(data: Arc<dyn DataService>) -> Arc<Self> {
        let (events, _) = broadcast::channel(1024);
        Arc::new(Self {
            data,
            inner: Mutex::new(ClientState::default()),
            subscription: Mutex::new(None),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub async fn active_session(&self) -> Option<ChatSession> {
        self.inner.lock().await.active_session.clone()
    }

    /// Creates a new session owned by `creator_name` and returns the local
    /// descriptor for it. Key collisions are left to the service's uniqueness
    /// constraint; there is no local retry loop.
    pub async fn create_session(
        &self,
        creator_name: &str,
    ) -> Result<ChatSession, CreateSessionError> {
        let key = keygen::generate_key(&mut rand::rng());
        let record = NewSessionRecord {
            key: key.clone(),
            creator_account: creator_name.to_string(),
            created_at: Utc::now(),
        };

        let id = self
            .data
            .insert_session(record)
            .await
            .map_err(CreateSessionError::Backend)?;

        info!(session_id = id.0, creator = creator_name, "chat session created");
        Ok(ChatSession {
            id,
            key,
            creator_account: creator_name.to_string(),
            my_account: creator_name.to_string(),
        })
    }

    /// Point lookup by (creator, key). The key compares case-insensitively.
    /// Zero matches is `NotFound`, a failed query is `Backend`; the UI words
    /// those two outcomes differently.
    pub async fn join_session(
        &self,
        creator_name: &str,
        raw_key: &str,
        my_account: &str,
    ) -> Result<ChatSession, JoinSessionError> {
        let creator = creator_name.trim();
        let key = keygen::normalize_key(raw_key);
        if creator.is_empty() || key.is_empty() {
            return Err(JoinSessionError::MissingField);
        }

        let record = self
            .data
            .find_session(creator, &key)
            .await
            .map_err(JoinSessionError::Backend)?
            .ok_or(JoinSessionError::NotFound)?;

        Ok(ChatSession {
            id: record.id,
            key: record.key,
            creator_account: record.creator_account,
            my_account: my_account.to_string(),
        })
    }

    /// Makes `session` the active one: tears down the previous subscription,
    /// establishes the new scoped feed, then runs the initial transcript
    /// load. The feed task only ever triggers full re-fetches; deltas are
    /// never merged locally.
    pub async fn open_session(self: &Arc<Self>, session: ChatSession) -> Result<()> {
        self.close_subscription().await;
        let feed = self.data.open_message_feed(session.id).await?;
        self.inner.lock().await.active_session = Some(session.clone());

        let mut inserts = feed.subscribe();
        let client = Arc::clone(self);
        let session_id = session.id;
        let feed_task = tokio::spawn(async move {
            loop {
                match inserts.recv().await {
                    Ok(message) => {
                        if message.session_id != session_id {
                            continue;
                        }
                        client.refresh_transcript(session_id).await;
                    }
                    // A lagged feed lost notifications, not data: the next
                    // refresh re-reads the full transcript anyway.
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(session_id = session_id.0, skipped, "message feed lagged");
                        client.refresh_transcript(session_id).await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        *self.subscription.lock().await = Some(ActiveSubscription {
            session_id,
            feed,
            feed_task,
        });

        let _ = self.events.send(ClientEvent::SessionOpened(session));
        self.refresh_transcript(session_id).await;
        Ok(())
    }

    /// Leaves the active session, tearing the subscription down before
    /// returning.
    pub async fn close_session(&self) {
        self.close_subscription().await;
        self.inner.lock().await.active_session = None;
        let _ = self.events.send(ClientEvent::SessionClosed);
    }

    async fn close_subscription(&self) {
        let previous = self.subscription.lock().await.take();
        if let Some(active) = previous {
            active.feed_task.abort();
            active.feed.close().await;
            info!(session_id = active.session_id.0, "message subscription closed");
        }
    }

    /// Appends one message from the local participant to the active session.
    /// Blank content is rejected before any network traffic.
    pub async fn send_message(&self, content: &str) -> Result<(), SendMessageError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(SendMessageError::EmptyContent);
        }

        let session = self
            .inner
            .lock()
            .await
            .active_session
            .clone()
            .ok_or(SendMessageError::NoActiveSession)?;

        let record = NewMessageRecord {
            session_id: session.id,
            sender: session.my_account,
            content: content.to_string(),
            created_at: Utc::now(),
        };

        self.data
            .insert_message(record)
            .await
            .map_err(SendMessageError::Backend)?;
        Ok(())
    }

    /// Full transcript read, oldest first. Sorted locally by
    /// (created_at, id) so callers see a stable order regardless of how the
    /// service returned the rows.
    pub async fn fetch_transcript(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<MessageRecord>, TranscriptError> {
        let mut messages = self
            .data
            .list_messages(session_id)
            .await
            .map_err(TranscriptError)?;
        messages.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.0.cmp(&b.id.0))
        });
        Ok(messages)
    }

    /// Re-reads the transcript and broadcasts the outcome. Results for a
    /// session that is no longer active are discarded; a stale refresh must
    /// not repaint whatever replaced it.
    pub async fn refresh_transcript(&self, session_id: SessionId) {
        let outcome = self.fetch_transcript(session_id).await;

        let still_active =
            self.inner.lock().await.active_session.as_ref().map(|s| s.id) == Some(session_id);
        if !still_active {
            return;
        }

        match outcome {
            Ok(messages) => {
                let _ = self.events.send(ClientEvent::TranscriptUpdated {
                    session_id,
                    messages,
                });
            }
            Err(err) => {
                warn!(session_id = session_id.0, "transcript refresh failed: {err}");
                let _ = self.events.send(ClientEvent::TranscriptFetchFailed {
                    session_id,
                    reason: err.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
