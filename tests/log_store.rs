//! Log Store Integration Tests
//!
//! Ordering, filtering and concurrent writers.

use std::sync::Arc;

use serde_json::json;
use synapse::core::{LogQuery, LogStore};
use synapse::domain::LogLevel;

#[test]
fn test_query_returns_all_newest_first() {
    let store = LogStore::new();
    let n = 200;
    for i in 0..n {
        store.append("dev_agent", "tick", json!({ "i": i }));
    }

    let entries = store.query(&LogQuery::latest(n));
    assert_eq!(entries.len(), n);
    assert!(entries
        .windows(2)
        .all(|pair| pair[0].timestamp >= pair[1].timestamp));
    assert_eq!(entries[0].data["i"], n - 1);
}

#[test]
fn test_filters_and_limit() {
    let store = LogStore::new();
    store.append("dev_agent", "a", json!({}));
    store.append_with_level("dev_agent", "b", json!({}), LogLevel::Error);
    store.append("devops_agent", "c", json!({}));
    store.append_with_level("devops_agent", "d", json!({}), LogLevel::Error);

    let dev = store.query(&LogQuery::default().agent("dev_agent"));
    assert_eq!(dev.len(), 2);

    let errors = store.query(&LogQuery::default().level(LogLevel::Error));
    let events: Vec<&str> = errors.iter().map(|e| e.event.as_str()).collect();
    assert_eq!(events, vec!["d", "b"]);

    let both = store.query(&LogQuery::latest(10).agent("dev_agent").level(LogLevel::Error));
    assert_eq!(both.len(), 1);

    assert_eq!(store.query(&LogQuery::latest(1)).len(), 1);
    assert!(store.query(&LogQuery::latest(0)).is_empty());
}

#[test]
fn test_clear_returns_count() {
    let store = LogStore::new();
    store.append("x", "one", json!(null));
    store.append("x", "two", json!(null));

    assert_eq!(store.clear(), 2);
    assert!(store.is_empty());
    assert_eq!(store.clear(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writers_lose_nothing() {
    let store = Arc::new(LogStore::new());
    let writers = 8;
    let per_writer = 250;

    let handles: Vec<_> = (0..writers)
        .map(|w| {
            let store = store.clone();
            tokio::spawn(async move {
                for i in 0..per_writer {
                    store.append(&format!("writer_{}", w), "write", json!({ "i": i }));
                    if i % 50 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(store.len(), writers * per_writer);
    let all = store.query(&LogQuery::latest(writers * per_writer));
    assert_eq!(all.len(), writers * per_writer);
    assert!(all.windows(2).all(|p| p[0].timestamp >= p[1].timestamp));

    let one = store.query(&LogQuery::latest(usize::MAX).agent("writer_3"));
    assert_eq!(one.len(), per_writer);
}
