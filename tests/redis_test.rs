//! Runs the primitives against a live server.
//!
//! ```sh
//! docker run --rm -p 6379:6379 redis:7
//! cargo test --test redis_test -- --ignored
//! ```

use std::sync::Arc;

use redq::config::{PoolOptions, QueueOptions, UniqueQueueOptions};
use redq::{Pool, Queue, RedisStore, Store, UniqueQueue};

fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379/15".to_string())
}

async fn test_store() -> Arc<RedisStore> {
    Arc::new(RedisStore::connect(&redis_url()).await.unwrap())
}

/// Key prefix unique to this test run.
fn scoped(name: &str) -> String {
    format!("redq-test-{}-{name}", std::process::id())
}

async fn flush_script_cache() {
    let client = redis::Client::open(redis_url()).unwrap();
    let mut conn = client.get_multiplexed_async_connection().await.unwrap();
    let _: () = redis::cmd("SCRIPT")
        .arg("FLUSH")
        .query_async(&mut conn)
        .await
        .unwrap();
}

#[tokio::test]
#[ignore] // Requires running Redis
async fn queue_round_trip() {
    let store = test_store().await;
    let queue = Queue::new(store.clone(), scoped("queue"), QueueOptions::default()).unwrap();
    queue.clear_queue().await.unwrap();

    queue.add_items(&["1", "2", "3", "1", "5", "6"]).await.unwrap();
    let items = queue.get_items(5).await.unwrap();
    assert_eq!(items, vec!["1", "2", "3", "1", "5"]);

    queue.ack_item("1").await.unwrap();
    queue.ack_items(&["2", "3"]).await.unwrap();
    assert_eq!(queue.reject_batch().await.unwrap(), 2);
    assert_eq!(
        store.lrange(queue.name(), 0, -1).await.unwrap(),
        vec!["6", "5", "1"]
    );

    queue.get_all_items().await.unwrap();
    assert_eq!(queue.re_enqueue_all_items().await.unwrap(), 3);
    queue.clear_queue().await.unwrap();
    assert_eq!(queue.count().await.unwrap(), 0);
}

#[tokio::test]
#[ignore] // Requires running Redis
async fn pipelined_scripts_recover_from_script_flush() {
    let store = test_store().await;
    let queue = Queue::new(store.clone(), scoped("noscript"), QueueOptions::default()).unwrap();
    queue.clear_queue().await.unwrap();

    queue.add_items(&["a", "b", "c"]).await.unwrap();
    let leased = queue.get_items(3).await.unwrap();
    flush_script_cache().await;
    queue.reject_items(&leased).await.unwrap();
    assert_eq!(queue.get_items(3).await.unwrap(), leased);

    queue.clear_queue().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires running Redis
async fn unique_queue_dedups() {
    let store = test_store().await;
    let queue =
        UniqueQueue::new(store, scoped("unique"), UniqueQueueOptions::default()).unwrap();
    queue.clear_queue().await.unwrap();

    queue.add_items(&["a", "b", "a"]).await.unwrap();
    assert_eq!(queue.count().await.unwrap(), 2);
    assert_eq!(queue.get_items(1).await.unwrap(), vec!["a"]);
    queue.add_item("a").await.unwrap();
    queue.reject_item("a").await.unwrap();
    assert_eq!(queue.count().await.unwrap(), 2);

    queue.clear_queue().await.unwrap();
    assert_eq!(queue.count().await.unwrap(), 0);
}

#[tokio::test]
#[ignore] // Requires running Redis
async fn pool_lease_and_ack() {
    let store = test_store().await;
    let pool = Pool::new(store.clone(), scoped("pool"), PoolOptions::default()).unwrap();
    pool.clear_pool().await.unwrap();

    pool.add_items(&["a", "b"]).await.unwrap();
    let leased = pool.get_items(2).await.unwrap();
    assert_eq!(leased.len(), 2);
    assert_eq!(pool.count_to_process().await.unwrap(), 0);

    pool.ack_items(&leased).await.unwrap();
    let score = store.zscore(pool.name(), "a").await.unwrap().unwrap();
    assert_eq!(score, score.floor());

    pool.clear_pool().await.unwrap();
    assert_eq!(pool.count().await.unwrap(), 0);
}

#[tokio::test]
#[ignore] // Requires running Redis
async fn wait_replicas_reports_count() {
    let store = test_store().await;
    // A standalone server has no replicas.
    assert_eq!(store.wait_replicas(0, 10).await.unwrap(), 0);
}
