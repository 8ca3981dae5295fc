use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{MessageId, SessionId},
    error::ApiError,
};

/// Row shape of the data service's `sessions` collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    pub key: String,
    pub creator_account: String,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for `sessions`; the service assigns the id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSessionRecord {
    pub key: String,
    pub creator_account: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedSessionResponse {
    pub id: SessionId,
}

/// Row shape of the data service's `messages` collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: MessageId,
    pub session_id: SessionId,
    pub sender: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for `messages`; timestamp is client-assigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessageRecord {
    pub session_id: SessionId,
    pub sender: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Frames sent by the client over the realtime socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum RealtimeRequest {
    Subscribe { session_id: SessionId },
}

/// Frames pushed by the data service over the realtime socket.
///
/// `MessageInserted` is only delivered for the session id named in the
/// preceding `Subscribe`; the client still filters by session id because a
/// frame may race a re-subscribe.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum RealtimeEvent {
    Subscribed { session_id: SessionId },
    MessageInserted { message: MessageRecord },
    Error(ApiError),
}
