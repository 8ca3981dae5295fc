use super::*;
use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering},
    time::Duration,
};

use anyhow::anyhow;
use chrono::{DateTime, TimeZone};
use shared::domain::MessageId;

use crate::rest::RestDataService;

struct FakeMessageFeed {
    session_id: SessionId,
    inserts: broadcast::Sender<MessageRecord>,
    closed: AtomicBool,
}

impl FakeMessageFeed {
    fn new(session_id: SessionId) -> Arc<Self> {
        let (inserts, _) = broadcast::channel(64);
        Arc::new(Self {
            session_id,
            inserts,
            closed: AtomicBool::new(false),
        })
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageFeed for FakeMessageFeed {
    fn subscribe(&self) -> broadcast::Receiver<MessageRecord> {
        self.inserts.subscribe()
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct FakeDataService {
    sessions: Mutex<Vec<SessionRecord>>,
    messages: Mutex<Vec<MessageRecord>>,
    feeds: Mutex<Vec<Arc<FakeMessageFeed>>>,
    next_id: AtomicI64,
    insert_message_calls: AtomicUsize,
    fail_with: Option<String>,
    fail_message_inserts: AtomicBool,
}

impl FakeDataService {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn failing(message: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            fail_with: Some(message.into()),
            ..Default::default()
        })
    }

    fn bail(&self) -> Result<()> {
        match &self.fail_with {
            Some(message) => Err(anyhow!(message.clone())),
            None => Ok(()),
        }
    }

    async fn seed_session(&self, id: i64, key: &str, creator: &str) {
        self.sessions.lock().await.push(SessionRecord {
            id: SessionId(id),
            key: key.to_string(),
            creator_account: creator.to_string(),
            created_at: timestamp(0),
        });
    }

    /// Simulates a write from the other participant: the row appears in the
    /// collection and every live feed for that session gets a notification.
    async fn insert_remote_message(&self, record: MessageRecord) {
        self.messages.lock().await.push(record.clone());
        for feed in self.feeds.lock().await.iter() {
            if feed.session_id == record.session_id && !feed.is_closed() {
                let _ = feed.inserts.send(record.clone());
            }
        }
    }
}

#[async_trait]
impl DataService for FakeDataService {
    async fn insert_session(&self, record: NewSessionRecord) -> Result<SessionId> {
        self.bail()?;
        let id = SessionId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.sessions.lock().await.push(SessionRecord {
            id,
            key: record.key,
            creator_account: record.creator_account,
            created_at: record.created_at,
        });
        Ok(id)
    }

    async fn find_session(
        &self,
        creator_account: &str,
        key: &str,
    ) -> Result<Option<SessionRecord>> {
        self.bail()?;
        Ok(self
            .sessions
            .lock()
            .await
            .iter()
            .find(|session| session.creator_account == creator_account && session.key == key)
            .cloned())
    }

    async fn insert_message(&self, record: NewMessageRecord) -> Result<()> {
        self.insert_message_calls.fetch_add(1, Ordering::SeqCst);
        self.bail()?;
        if self.fail_message_inserts.load(Ordering::SeqCst) {
            return Err(anyhow!("message insert rejected"));
        }
        let stored = MessageRecord {
            id: MessageId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1),
            session_id: record.session_id,
            sender: record.sender,
            content: record.content,
            created_at: record.created_at,
        };
        self.insert_remote_message(stored).await;
        Ok(())
    }

    async fn list_messages(&self, session_id: SessionId) -> Result<Vec<MessageRecord>> {
        self.bail()?;
        // Insertion order on purpose: callers are expected to sort.
        Ok(self
            .messages
            .lock()
            .await
            .iter()
            .filter(|message| message.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn open_message_feed(&self, session_id: SessionId) -> Result<Arc<dyn MessageFeed>> {
        self.bail()?;
        let feed = FakeMessageFeed::new(session_id);
        self.feeds.lock().await.push(Arc::clone(&feed));
        Ok(feed)
    }
}

fn timestamp(offset_secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap() + chrono::Duration::seconds(offset_secs)
}

fn message(
    id: i64,
    session_id: i64,
    sender: &str,
    content: &str,
    created_at: DateTime<Utc>,
) -> MessageRecord {
    MessageRecord {
        id: MessageId(id),
        session_id: SessionId(session_id),
        sender: sender.to_string(),
        content: content.to_string(),
        created_at,
    }
}

async fn recv_event(events: &mut broadcast::Receiver<ClientEvent>) -> ClientEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for client event")
        .expect("event channel closed")
}

#[test]
fn display_name_validation_trims_and_enforces_min_length() {
    for raw in ["", "   ", "a", " a ", "\tb\n"] {
        assert_eq!(
            validate_display_name(raw),
            Err(IdentityError::TooShort),
            "expected rejection for {raw:?}"
        );
    }

    assert_eq!(validate_display_name("ab").as_deref(), Ok("ab"));
    assert_eq!(validate_display_name("  bob  ").as_deref(), Ok("bob"));
    // Length counts characters, not bytes.
    assert_eq!(validate_display_name("黒木").as_deref(), Ok("黒木"));
}

#[tokio::test]
async fn create_session_writes_record_and_returns_descriptor() {
    let data = FakeDataService::new();
    let client = ChatClient::new(data.clone());

    let session = client.create_session("alice").await.expect("create");

    assert_eq!(session.key.len(), keygen::KEY_LEN);
    assert!(session
        .key
        .bytes()
        .all(|b| keygen::KEY_ALPHABET.contains(&b)));
    assert_eq!(session.creator_account, "alice");
    assert_eq!(session.my_account, "alice");

    let stored = data.sessions.lock().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, session.id);
    assert_eq!(stored[0].key, session.key);
}

#[tokio::test]
async fn create_session_surfaces_backend_failures() {
    let client = ChatClient::new(FakeDataService::failing("insert rejected"));
    let err = client.create_session("alice").await.expect_err("failure");
    assert!(matches!(err, CreateSessionError::Backend(_)));
}

#[tokio::test]
async fn join_matches_keys_case_insensitively() {
    let data = FakeDataService::new();
    data.seed_session(7, "ABCD2345", "alice").await;
    let client = ChatClient::new(data);

    let session = client
        .join_session("alice", "abcd2345", "bob")
        .await
        .expect("join");

    assert_eq!(session.id, SessionId(7));
    assert_eq!(session.key, "ABCD2345");
    assert_eq!(session.creator_account, "alice");
    assert_eq!(session.my_account, "bob");
}

#[tokio::test]
async fn join_distinguishes_not_found_from_backend_failure() {
    let data = FakeDataService::new();
    data.seed_session(7, "ABCD2345", "alice").await;
    let client = ChatClient::new(data);

    let err = client
        .join_session("bob", "ABCD2345", "carol")
        .await
        .expect_err("wrong creator");
    assert!(matches!(err, JoinSessionError::NotFound));

    let failing = ChatClient::new(FakeDataService::failing("connection reset"));
    let err = failing
        .join_session("alice", "ABCD2345", "bob")
        .await
        .expect_err("backend down");
    assert!(matches!(err, JoinSessionError::Backend(_)));
}

#[tokio::test]
async fn join_requires_both_fields() {
    let client = ChatClient::new(FakeDataService::new());

    for (creator, key) in [("", "ABCD2345"), ("alice", "   "), ("", "")] {
        let err = client
            .join_session(creator, key, "bob")
            .await
            .expect_err("missing field");
        assert!(matches!(err, JoinSessionError::MissingField));
    }
}

#[tokio::test]
async fn send_rejects_blank_content_without_contacting_backend() {
    let data = FakeDataService::new();
    let client = ChatClient::new(data.clone());

    for content in ["", "   ", "\n\t "] {
        let err = client.send_message(content).await.expect_err("blank");
        assert!(matches!(err, SendMessageError::EmptyContent));
    }

    assert_eq!(data.insert_message_calls.load(Ordering::SeqCst), 0);

    let err = client.send_message("hello").await.expect_err("no session");
    assert!(matches!(err, SendMessageError::NoActiveSession));
}

#[tokio::test]
async fn send_appends_message_with_local_sender() {
    let data = FakeDataService::new();
    data.seed_session(7, "ABCD2345", "alice").await;
    let client = ChatClient::new(data.clone());

    let session = client
        .join_session("alice", "ABCD2345", "bob")
        .await
        .expect("join");
    client.open_session(session).await.expect("open");

    client.send_message("  hi there  ").await.expect("send");

    let stored = data.messages.lock().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].session_id, SessionId(7));
    assert_eq!(stored[0].sender, "bob");
    assert_eq!(stored[0].content, "hi there");
}

#[tokio::test]
async fn send_surfaces_backend_failure_as_transient_error() {
    let data = FakeDataService::new();
    data.seed_session(7, "ABCD2345", "alice").await;
    let client = ChatClient::new(data.clone());
    let session = client
        .join_session("alice", "ABCD2345", "bob")
        .await
        .expect("join");
    client.open_session(session).await.expect("open");

    data.fail_message_inserts.store(true, Ordering::SeqCst);
    let err = client.send_message("hi").await.expect_err("insert fails");
    assert!(matches!(err, SendMessageError::Backend(_)));

    // The failure is transient: a user-initiated retry goes through.
    data.fail_message_inserts.store(false, Ordering::SeqCst);
    client.send_message("hi").await.expect("retry succeeds");
    assert_eq!(data.messages.lock().await.len(), 1);
}

#[tokio::test]
async fn transcript_is_ordered_by_timestamp_regardless_of_insertion_order() {
    let data = FakeDataService::new();
    data.insert_remote_message(message(3, 7, "alice", "third", timestamp(30)))
        .await;
    data.insert_remote_message(message(1, 7, "bob", "first", timestamp(10)))
        .await;
    data.insert_remote_message(message(2, 7, "alice", "second", timestamp(20)))
        .await;
    // A row for another session must never leak into the transcript.
    data.insert_remote_message(message(4, 8, "carol", "other chat", timestamp(5)))
        .await;

    let client = ChatClient::new(data);
    let transcript = client
        .fetch_transcript(SessionId(7))
        .await
        .expect("fetch");

    let contents: Vec<_> = transcript.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, ["first", "second", "third"]);
}

#[tokio::test]
async fn switching_sessions_replaces_the_live_subscription() {
    let data = FakeDataService::new();
    data.seed_session(1, "AAAA2222", "alice").await;
    data.seed_session(2, "BBBB3333", "carol").await;
    let client = ChatClient::new(data.clone());

    let session_a = client
        .join_session("alice", "AAAA2222", "bob")
        .await
        .expect("join a");
    let session_b = client
        .join_session("carol", "BBBB3333", "bob")
        .await
        .expect("join b");

    client.open_session(session_a).await.expect("open a");
    let mut events = client.subscribe_events();
    client.open_session(session_b).await.expect("open b");

    let feeds = data.feeds.lock().await.clone();
    assert_eq!(feeds.len(), 2, "one feed opened per session");
    assert!(feeds[0].is_closed(), "feed for session A must be torn down");
    assert!(!feeds[1].is_closed(), "feed for session B must stay live");

    // open b emitted SessionOpened + the initial (empty) transcript
    match recv_event(&mut events).await {
        ClientEvent::SessionOpened(session) => assert_eq!(session.id, SessionId(2)),
        other => panic!("unexpected event: {other:?}"),
    }
    match recv_event(&mut events).await {
        ClientEvent::TranscriptUpdated {
            session_id,
            messages,
        } => {
            assert_eq!(session_id, SessionId(2));
            assert!(messages.is_empty());
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // A late notification for A lands on the dead feed and must not trigger
    // any refresh; a notification for B still must.
    let _ = feeds[0]
        .inserts
        .send(message(10, 1, "alice", "stale", timestamp(40)));
    data.insert_remote_message(message(11, 2, "carol", "fresh", timestamp(50)))
        .await;

    match recv_event(&mut events).await {
        ClientEvent::TranscriptUpdated {
            session_id,
            messages,
        } => {
            assert_eq!(session_id, SessionId(2), "refresh must belong to session B");
            assert_eq!(messages.len(), 1);
            assert_eq!(messages[0].content, "fresh");
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn closing_the_session_tears_down_the_subscription() {
    let data = FakeDataService::new();
    data.seed_session(1, "AAAA2222", "alice").await;
    let client = ChatClient::new(data.clone());

    let session = client
        .join_session("alice", "AAAA2222", "bob")
        .await
        .expect("join");
    client.open_session(session).await.expect("open");
    client.close_session().await;

    let feeds = data.feeds.lock().await.clone();
    assert_eq!(feeds.len(), 1);
    assert!(feeds[0].is_closed());
    assert!(client.active_session().await.is_none());
}

#[tokio::test]
async fn stale_refreshes_are_dropped_and_fetch_errors_surface() {
    let data = FakeDataService::new();
    data.seed_session(1, "AAAA2222", "alice").await;
    let client = ChatClient::new(data.clone());
    let session = client
        .join_session("alice", "AAAA2222", "bob")
        .await
        .expect("join");
    client.open_session(session).await.expect("open");

    let mut events = client.subscribe_events();
    // Fetch against a session id that is not active: the refresh is dropped
    // silently rather than repainting the active view.
    client.refresh_transcript(SessionId(99)).await;

    let failing = ChatClient::new(FakeDataService::failing("query timeout"));
    let err = failing
        .fetch_transcript(SessionId(1))
        .await
        .expect_err("backend failure");
    assert!(err.to_string().contains("query timeout"));

    // Nothing may have been broadcast for the stale refresh.
    assert!(
        tokio::time::timeout(Duration::from_millis(200), events.recv())
            .await
            .is_err(),
        "stale refresh must not emit events"
    );
}

mod fake_service {
    use super::*;
    use axum::{
        extract::{
            ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
            Query, State,
        },
        http::StatusCode,
        response::IntoResponse,
        routing::{get, post},
        Json, Router,
    };
    use serde::Deserialize;
    use shared::protocol::{CreatedSessionResponse, RealtimeEvent, RealtimeRequest};
    use tokio::net::TcpListener;

    #[derive(Clone, Default)]
    pub struct ServiceState {
        sessions: Arc<Mutex<Vec<SessionRecord>>>,
        messages: Arc<Mutex<Vec<MessageRecord>>>,
        feeds: Arc<Mutex<HashMap<i64, broadcast::Sender<MessageRecord>>>>,
        next_id: Arc<AtomicI64>,
    }

    impl ServiceState {
        async fn feed_sender(&self, session_id: SessionId) -> broadcast::Sender<MessageRecord> {
            self.feeds
                .lock()
                .await
                .entry(session_id.0)
                .or_insert_with(|| broadcast::channel(64).0)
                .clone()
        }
    }

    #[derive(Deserialize)]
    struct SessionLookup {
        creator_account: String,
        key: String,
    }

    #[derive(Deserialize)]
    struct MessageListQuery {
        session_id: i64,
    }

    async fn create_session(
        State(state): State<ServiceState>,
        Json(record): Json<NewSessionRecord>,
    ) -> Json<CreatedSessionResponse> {
        let id = SessionId(state.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        state.sessions.lock().await.push(SessionRecord {
            id,
            key: record.key,
            creator_account: record.creator_account,
            created_at: record.created_at,
        });
        Json(CreatedSessionResponse { id })
    }

    async fn lookup_session(
        State(state): State<ServiceState>,
        Query(query): Query<SessionLookup>,
    ) -> Result<Json<SessionRecord>, StatusCode> {
        state
            .sessions
            .lock()
            .await
            .iter()
            .find(|session| {
                session.creator_account == query.creator_account && session.key == query.key
            })
            .cloned()
            .map(Json)
            .ok_or(StatusCode::NOT_FOUND)
    }

    async fn insert_message(
        State(state): State<ServiceState>,
        Json(record): Json<NewMessageRecord>,
    ) -> StatusCode {
        let stored = MessageRecord {
            id: MessageId(state.next_id.fetch_add(1, Ordering::SeqCst) + 1),
            session_id: record.session_id,
            sender: record.sender,
            content: record.content,
            created_at: record.created_at,
        };
        state.messages.lock().await.push(stored.clone());
        let _ = state.feed_sender(stored.session_id).await.send(stored);
        StatusCode::CREATED
    }

    async fn list_messages(
        State(state): State<ServiceState>,
        Query(query): Query<MessageListQuery>,
    ) -> Json<Vec<MessageRecord>> {
        let mut rows: Vec<_> = state
            .messages
            .lock()
            .await
            .iter()
            .filter(|message| message.session_id.0 == query.session_id)
            .cloned()
            .collect();
        rows.sort_by_key(|message| message.created_at);
        Json(rows)
    }

    async fn realtime(
        ws: WebSocketUpgrade,
        State(state): State<ServiceState>,
    ) -> impl IntoResponse {
        ws.on_upgrade(move |socket| handle_realtime(socket, state))
    }

    async fn handle_realtime(mut socket: WebSocket, state: ServiceState) {
        let Some(Ok(WsMessage::Text(text))) = socket.recv().await else {
            return;
        };
        let Ok(RealtimeRequest::Subscribe { session_id }) = serde_json::from_str(&text) else {
            return;
        };

        let mut feed = state.feed_sender(session_id).await.subscribe();
        let ack =
            serde_json::to_string(&RealtimeEvent::Subscribed { session_id }).expect("ack frame");
        if socket.send(WsMessage::Text(ack)).await.is_err() {
            return;
        }

        while let Ok(message) = feed.recv().await {
            let frame = serde_json::to_string(&RealtimeEvent::MessageInserted { message })
                .expect("event frame");
            if socket.send(WsMessage::Text(frame)).await.is_err() {
                break;
            }
        }
    }

    pub async fn spawn() -> Result<String> {
        std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let app = Router::new()
            .route("/api/sessions", post(create_session).get(lookup_session))
            .route("/api/messages", post(insert_message).get(list_messages))
            .route("/realtime", get(realtime))
            .with_state(ServiceState::default());

        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(format!("http://{addr}"))
    }
}

#[tokio::test]
async fn two_participants_exchange_messages_through_the_fake_service() {
    let server_url = fake_service::spawn().await.expect("fake service");

    let alice = ChatClient::new(Arc::new(RestDataService::new(server_url.clone(), None)));
    let created = alice.create_session("alice").await.expect("create");

    let bob = ChatClient::new(Arc::new(RestDataService::new(server_url, None)));

    let err = bob
        .join_session("mallory", &created.key, "bob")
        .await
        .expect_err("unknown creator");
    assert!(matches!(err, JoinSessionError::NotFound));

    let joined = bob
        .join_session("alice", &created.key.to_lowercase(), "bob")
        .await
        .expect("join with lowercase key");
    assert_eq!(joined.id, created.id);

    let mut bob_events = bob.subscribe_events();
    bob.open_session(joined).await.expect("open bob");

    match recv_event(&mut bob_events).await {
        ClientEvent::SessionOpened(session) => assert_eq!(session.my_account, "bob"),
        other => panic!("unexpected event: {other:?}"),
    }
    match recv_event(&mut bob_events).await {
        ClientEvent::TranscriptUpdated { messages, .. } => {
            assert!(messages.is_empty(), "fresh chat starts empty")
        }
        other => panic!("unexpected event: {other:?}"),
    }

    alice.open_session(created.clone()).await.expect("open alice");
    alice.send_message("hi").await.expect("send");

    loop {
        match recv_event(&mut bob_events).await {
            ClientEvent::TranscriptUpdated { messages, .. } if !messages.is_empty() => {
                assert_eq!(messages.len(), 1);
                assert_eq!(messages[0].sender, "alice");
                assert_eq!(messages[0].content, "hi");
                break;
            }
            _ => {}
        }
    }
}
