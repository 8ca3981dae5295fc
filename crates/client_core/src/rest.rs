//! REST + WebSocket client for the hosted data service.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use reqwest::{Client, StatusCode};
use shared::{
    domain::SessionId,
    protocol::{
        CreatedSessionResponse, MessageRecord, NewMessageRecord, NewSessionRecord, RealtimeEvent,
        RealtimeRequest, SessionRecord,
    },
};
use tokio::{sync::broadcast, task::JoinHandle};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{info, warn};

use crate::{DataService, MessageFeed};

const FEED_CHANNEL_CAPACITY: usize = 256;

pub struct RestDataService {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl RestDataService {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: Client::new(),
            base_url,
            api_key,
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    fn realtime_url(&self) -> Result<String> {
        let ws_base = if self.base_url.starts_with("https://") {
            self.base_url.replacen("https://", "wss://", 1)
        } else if self.base_url.starts_with("http://") {
            self.base_url.replacen("http://", "ws://", 1)
        } else {
            return Err(anyhow!("backend url must start with http:// or https://"));
        };
        Ok(format!("{ws_base}/realtime"))
    }
}

#[async_trait]
impl DataService for RestDataService {
    async fn insert_session(&self, record: NewSessionRecord) -> Result<SessionId> {
        let response: CreatedSessionResponse = self
            .authorize(self.http.post(format!("{}/api/sessions", self.base_url)))
            .json(&record)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.id)
    }

    async fn find_session(
        &self,
        creator_account: &str,
        key: &str,
    ) -> Result<Option<SessionRecord>> {
        let response = self
            .authorize(self.http.get(format!("{}/api/sessions", self.base_url)))
            .query(&[("creator_account", creator_account), ("key", key)])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let record: SessionRecord = response.error_for_status()?.json().await?;
        Ok(Some(record))
    }

    async fn insert_message(&self, record: NewMessageRecord) -> Result<()> {
        self.authorize(self.http.post(format!("{}/api/messages", self.base_url)))
            .json(&record)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn list_messages(&self, session_id: SessionId) -> Result<Vec<MessageRecord>> {
        let messages: Vec<MessageRecord> = self
            .authorize(self.http.get(format!("{}/api/messages", self.base_url)))
            .query(&[("session_id", session_id.0)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(messages)
    }

    async fn open_message_feed(&self, session_id: SessionId) -> Result<Arc<dyn MessageFeed>> {
        let url = self.realtime_url()?;
        let (ws_stream, _) = connect_async(&url)
            .await
            .with_context(|| format!("failed to connect realtime socket: {url}"))?;
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        let subscribe = serde_json::to_string(&RealtimeRequest::Subscribe { session_id })?;
        ws_writer
            .send(Message::Text(subscribe))
            .await
            .context("failed to send realtime subscribe frame")?;

        // Block until the service confirms the scope, so an insert issued
        // right after this call cannot race the registration.
        loop {
            let frame = ws_reader
                .next()
                .await
                .ok_or_else(|| anyhow!("realtime socket closed before subscription ack"))??;
            match frame {
                Message::Text(text) => match serde_json::from_str::<RealtimeEvent>(&text)? {
                    RealtimeEvent::Subscribed { session_id: acked } if acked == session_id => {
                        info!(session_id = session_id.0, "realtime subscription confirmed");
                        break;
                    }
                    RealtimeEvent::Error(err) => {
                        return Err(anyhow!("realtime subscription rejected: {err}"));
                    }
                    other => {
                        warn!("unexpected frame before subscription ack: {other:?}");
                    }
                },
                Message::Close(_) => {
                    return Err(anyhow!("realtime socket closed before subscription ack"));
                }
                _ => {}
            }
        }

        let (inserts, _) = broadcast::channel(FEED_CHANNEL_CAPACITY);
        let sender = inserts.clone();
        let reader_task = tokio::spawn(async move {
            while let Some(frame) = ws_reader.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<RealtimeEvent>(&text) {
                        Ok(RealtimeEvent::MessageInserted { message }) => {
                            let _ = sender.send(message);
                        }
                        Ok(RealtimeEvent::Subscribed { session_id }) => {
                            info!(session_id = session_id.0, "duplicate subscription ack");
                        }
                        Ok(RealtimeEvent::Error(err)) => {
                            warn!("realtime error frame: {err}");
                        }
                        Err(err) => {
                            warn!("invalid realtime frame: {err}");
                        }
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        warn!("realtime socket receive failed: {err}");
                        break;
                    }
                }
            }
        });

        Ok(Arc::new(RestMessageFeed {
            inserts,
            reader_task,
        }))
    }
}

/// Feed handle backed by the websocket reader task. Closing aborts the
/// reader, which drops the socket.
struct RestMessageFeed {
    inserts: broadcast::Sender<MessageRecord>,
    reader_task: JoinHandle<()>,
}

#[async_trait]
impl MessageFeed for RestMessageFeed {
    fn subscribe(&self) -> broadcast::Receiver<MessageRecord> {
        self.inserts.subscribe()
    }

    async fn close(&self) {
        self.reader_task.abort();
    }
}
