use super::*;
use shared::domain::SessionId;

fn sample_session(my_account: &str) -> ChatSession {
    ChatSession {
        id: SessionId(11),
        key: "ABCD2345".to_string(),
        creator_account: "alice".to_string(),
        my_account: my_account.to_string(),
    }
}

#[tokio::test]
async fn missing_entries_read_as_none() {
    let store = ProfileStore::new("sqlite::memory:").await.expect("db");
    assert_eq!(store.load_identity().await.expect("identity"), None);
    assert!(store.load_session().await.expect("session").is_none());
}

#[tokio::test]
async fn identity_round_trips_and_overwrites() {
    let store = ProfileStore::new("sqlite::memory:").await.expect("db");

    store.store_identity("alice").await.expect("store");
    assert_eq!(
        store.load_identity().await.expect("load"),
        Some("alice".to_string())
    );

    store.store_identity("alicia").await.expect("overwrite");
    assert_eq!(
        store.load_identity().await.expect("load"),
        Some("alicia".to_string())
    );
}

#[tokio::test]
async fn session_is_replaced_wholesale() {
    let store = ProfileStore::new("sqlite::memory:").await.expect("db");

    store
        .store_session(&sample_session("alice"))
        .await
        .expect("store");

    let replacement = ChatSession {
        id: SessionId(99),
        key: "ZZZZ9999".to_string(),
        creator_account: "carol".to_string(),
        my_account: "alice".to_string(),
    };
    store.store_session(&replacement).await.expect("replace");

    assert_eq!(
        store.load_session().await.expect("load"),
        Some(replacement)
    );
}

#[tokio::test]
async fn clear_profile_drops_both_entries() {
    let store = ProfileStore::new("sqlite::memory:").await.expect("db");
    store.store_identity("bob").await.expect("identity");
    store
        .store_session(&sample_session("bob"))
        .await
        .expect("session");

    store.clear_profile().await.expect("clear");

    assert_eq!(store.load_identity().await.expect("identity"), None);
    assert!(store.load_session().await.expect("session").is_none());
}

#[tokio::test]
async fn profile_survives_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let database_url = ProfileStore::sqlite_url_for_data_dir(dir.path());

    {
        let store = ProfileStore::new(&database_url).await.expect("db");
        store.store_identity("alice").await.expect("identity");
        store
            .store_session(&sample_session("alice"))
            .await
            .expect("session");
    }

    let reopened = ProfileStore::new(&database_url).await.expect("reopen");
    assert_eq!(
        reopened.load_identity().await.expect("identity"),
        Some("alice".to_string())
    );
    assert_eq!(
        reopened.load_session().await.expect("session"),
        Some(sample_session("alice"))
    );
}

#[tokio::test]
async fn creates_database_file_in_nested_dir() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("nested").join("profile.sqlite3");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let store = ProfileStore::new(&database_url).await.expect("db");
    store.health_check().await.expect("health check");
    drop(store);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );
}
