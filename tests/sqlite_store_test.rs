// tests/sqlite_store_test.rs — Integration test: SQLite-backed store through the actor

use std::sync::Arc;
use std::time::Duration;

use browserpilot::session::store::{spawn_store_server, SessionStore, SqliteKv};
use browserpilot::session::{HistoryItem, ResourcePool, SessionManager};

mod common;
use common::MockLauncher;

#[tokio::test]
async fn test_manager_over_sqlite_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sessions.db");

    let session_id = {
        let (handle, join) = spawn_store_server(SqliteKv::open(&path).unwrap());
        let sessions = SessionManager::new(
            Arc::new(handle),
            ResourcePool::new(Arc::new(MockLauncher::default())),
            Duration::from_secs(600),
        );
        let id = sessions.create().await.unwrap();
        sessions
            .append_history(
                &id,
                HistoryItem {
                    task: "open example.com".into(),
                    refined_task: "1. Go to example.com".into(),
                    external_answer: None,
                    result: "done".into(),
                    url: Some("https://example.com/".into()),
                },
            )
            .await
            .unwrap();
        drop(sessions);
        join.await.unwrap();
        id
    };

    let (handle, _join) = spawn_store_server(SqliteKv::open(&path).unwrap());
    let sessions = SessionManager::new(
        Arc::new(handle),
        ResourcePool::new(Arc::new(MockLauncher::default())),
        Duration::from_secs(600),
    );
    let record = sessions.get_data(&session_id).await.unwrap();
    assert!(!record.resource_id.is_empty());
    let history = sessions.get_history(&session_id, None).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].item.result, "done");
}

#[tokio::test]
async fn test_sqlite_expiry_hides_keys() {
    let (store, _join) = spawn_store_server(SqliteKv::in_memory().unwrap());

    store
        .hset("session:a", &[("k".into(), "v".into())])
        .await
        .unwrap();
    store.rpush("history:a", "e1".into()).await.unwrap();
    assert!(store.expire("session:a", Duration::from_millis(30)).await.unwrap());
    assert!(!store.expire("session:none", Duration::from_secs(1)).await.unwrap());

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(!store.exists("session:a").await.unwrap());
    assert!(store.hgetall("session:a").await.unwrap().is_empty());
    assert_eq!(store.keys("session:").await.unwrap(), Vec::<String>::new());
    assert_eq!(store.llen("history:a").await.unwrap(), 1);
}

#[tokio::test]
async fn test_sqlite_list_ranges_and_delete() {
    let (store, _join) = spawn_store_server(SqliteKv::in_memory().unwrap());
    for v in ["a", "b", "c", "d"] {
        store.rpush("history:x", v.into()).await.unwrap();
    }
    assert_eq!(store.lrange("history:x", -2, -1).await.unwrap(), vec!["c", "d"]);
    assert_eq!(store.lrange("history:x", 0, -1).await.unwrap().len(), 4);
    assert!(store.lrange("history:x", 10, 20).await.unwrap().is_empty());

    let removed = store
        .delete(&["history:x".to_string(), "session:x".to_string()])
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert_eq!(store.llen("history:x").await.unwrap(), 0);
}

#[tokio::test]
async fn test_sqlite_hset_existing_skips_absent_and_expired() {
    let (store, _join) = spawn_store_server(SqliteKv::in_memory().unwrap());
    let ttl = Duration::from_secs(60);
    let touch = [("last_active".to_string(), "now".to_string())];

    assert!(!store.hset_existing("session:a", &touch, ttl).await.unwrap());
    assert!(!store.exists("session:a").await.unwrap());

    store
        .hset("session:a", &[("created_at".into(), "then".into())])
        .await
        .unwrap();
    assert!(store.expire("session:a", Duration::from_millis(20)).await.unwrap());
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(!store.hset_existing("session:a", &touch, ttl).await.unwrap());
    assert!(store.hgetall("session:a").await.unwrap().is_empty());

    store
        .hset("session:b", &[("created_at".into(), "then".into())])
        .await
        .unwrap();
    assert!(store.hset_existing("session:b", &touch, ttl).await.unwrap());
    let fields = store.hgetall("session:b").await.unwrap();
    assert_eq!(fields.len(), 2);
    assert_eq!(fields["last_active"], "now");
}

#[tokio::test]
async fn test_sqlite_huge_ttl_saturates() {
    let kv = SqliteKv::in_memory().unwrap();
    kv.hset("session:a", &[("k".into(), "v".into())]).unwrap();
    assert!(kv.expire("session:a", Duration::MAX).unwrap());

    let at: i64 = kv
        .conn()
        .query_row(
            "SELECT expires_at FROM kv_expiry WHERE key = 'session:a'",
            (),
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(at, i64::MAX);
    assert!(kv.exists("session:a").unwrap());
}
