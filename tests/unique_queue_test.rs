use std::sync::Arc;

use redq::config::{ReplicaSyncOptions, UniqueQueueOptions};
use redq::{Error, FixedClock, MemoryStore, Store, UniqueQueue};

const NOW: f64 = 1_444_223_059.5;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn queue_with(options: UniqueQueueOptions) -> (Arc<MemoryStore>, UniqueQueue) {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(FixedClock::new(NOW));
    let queue = UniqueQueue::with_clock(store.clone(), "test", options, clock).unwrap();
    (store, queue)
}

fn test_queue() -> (Arc<MemoryStore>, UniqueQueue) {
    queue_with(UniqueQueueOptions::default())
}

async fn list(store: &MemoryStore, key: &str) -> Vec<String> {
    store.lrange(key, 0, -1).await.unwrap()
}

async fn members(store: &MemoryStore, key: &str) -> Vec<String> {
    let mut members = store.smembers(key).await.unwrap();
    members.sort();
    members
}

async fn seed_leases(store: &MemoryStore, queue: &UniqueQueue) {
    let now = NOW as i64;
    for (list_name, items, age) in [
        ("list1", ["1", "5", "3"], 15),
        ("list2", ["1", "4", "6"], 10),
        ("list3", ["4", "7", "8"], 5),
    ] {
        store.lpush(list_name, &strings(&items)).await.unwrap();
        store
            .hset(queue.timeouts_hash_name(), list_name, &(now - age).to_string())
            .await
            .unwrap();
    }
}

#[test]
fn key_names_follow_options() {
    let options = UniqueQueueOptions {
        unique_suffix: ":set".to_string(),
        timeouts_suffix: ":timeouts".to_string(),
        ..UniqueQueueOptions::default()
    };
    let (_, queue) = queue_with(options);
    assert_eq!(queue.name(), "test");
    assert_eq!(queue.unique_set_name(), "test:set");
    assert_eq!(queue.timeouts_hash_name(), "test:timeouts");
    assert!(queue.processing_list_name().starts_with("test-processing-"));
}

#[tokio::test]
async fn add_item_skips_items_already_waiting() {
    let (store, queue) = test_queue();

    queue.add_item("a").await.unwrap();
    queue.add_item("a").await.unwrap();
    queue.add_item("b").await.unwrap();

    assert_eq!(queue.count().await.unwrap(), 2);
    assert_eq!(list(&store, "test").await, strings(&["b", "a"]));
    assert_eq!(members(&store, "test-unique").await, strings(&["a", "b"]));
}

#[tokio::test]
async fn add_items_dedups_through_a_cold_script_cache() {
    let (store, queue) = test_queue();

    queue.add_items(&["a", "b", "a", "c", "b"]).await.unwrap();
    assert_eq!(list(&store, "test").await, strings(&["c", "b", "a"]));
    assert_eq!(members(&store, "test-unique").await, strings(&["a", "b", "c"]));

    assert!(matches!(
        queue.add_items(&["d", ""]).await,
        Err(Error::InvalidArgument(_))
    ));
    assert_eq!(queue.count().await.unwrap(), 3);
}

#[tokio::test]
async fn leased_item_may_be_added_again() {
    let (store, queue) = test_queue();
    queue.add_items(&["a", "b"]).await.unwrap();

    assert_eq!(queue.get_items(1).await.unwrap(), strings(&["a"]));
    assert_eq!(members(&store, "test-unique").await, strings(&["b"]));

    queue.add_item("a").await.unwrap();
    assert_eq!(queue.count().await.unwrap(), 2);
}

#[tokio::test]
async fn reject_moves_fresh_copy_instead_of_duplicating() {
    let (store, queue) = test_queue();
    queue.add_items(&["a", "b"]).await.unwrap();
    queue.get_items(1).await.unwrap();
    queue.add_item("a").await.unwrap();
    assert_eq!(list(&store, "test").await, strings(&["a", "b"]));

    queue.reject_item("a").await.unwrap();
    assert_eq!(list(&store, "test").await, strings(&["b", "a"]));
    assert_eq!(members(&store, "test-unique").await, strings(&["a", "b"]));
    assert!(list(&store, queue.processing_list_name()).await.is_empty());

    assert_eq!(queue.get_items(1).await.unwrap(), strings(&["a"]));
}

#[tokio::test]
async fn reject_items_keeps_relative_order() {
    let (store, queue) = test_queue();
    queue.add_items(&["1", "2", "3"]).await.unwrap();
    let leased = queue.get_items(3).await.unwrap();
    assert_eq!(leased, strings(&["1", "2", "3"]));

    queue.reject_items(&leased).await.unwrap();
    assert_eq!(queue.get_items(3).await.unwrap(), leased);
    assert_eq!(queue.reject_batch().await.unwrap(), 3);
    assert_eq!(list(&store, "test").await, strings(&["3", "2", "1"]));
    assert_eq!(members(&store, "test-unique").await, strings(&["1", "2", "3"]));
}

#[tokio::test]
async fn ack_item_finishes_the_lease() {
    let (store, queue) = test_queue();
    queue.add_items(&["a", "b"]).await.unwrap();
    let leased = queue.get_items(2).await.unwrap();

    queue.ack_item("a").await.unwrap();
    assert_eq!(list(&store, queue.processing_list_name()).await, strings(&["b"]));
    queue.ack_items(&leased).await.unwrap();
    assert!(store.keys().is_empty());
}

#[tokio::test]
async fn re_enqueue_timed_out_items_skips_duplicates() {
    let (store, queue) = test_queue();
    seed_leases(&store, &queue).await;

    assert_eq!(queue.re_enqueue_timed_out_items(Some(7)).await.unwrap(), 6);
    assert_eq!(list(&store, "test").await, strings(&["6", "4", "3", "5", "1"]));
    assert_eq!(
        members(&store, "test-unique").await,
        strings(&["1", "3", "4", "5", "6"])
    );
    assert_eq!(list(&store, "list3").await, strings(&["8", "7", "4"]));
}

#[tokio::test]
async fn re_enqueue_all_items_skips_duplicates() {
    let (store, queue) = test_queue();
    seed_leases(&store, &queue).await;

    queue.re_enqueue_all_items().await.unwrap();
    assert_eq!(
        list(&store, "test").await,
        strings(&["8", "7", "6", "4", "3", "5", "1"])
    );
    assert_eq!(store.keys(), strings(&["test", "test-unique"]));
}

#[tokio::test]
async fn drop_items_leaves_backlog_alone() {
    let (store, queue) = test_queue();
    seed_leases(&store, &queue).await;
    queue.add_item("x").await.unwrap();

    assert_eq!(queue.drop_timed_out_items(Some(7)).await.unwrap(), 2);
    assert_eq!(queue.drop_all_items().await.unwrap(), 1);
    assert_eq!(store.keys(), strings(&["test", "test-unique"]));
}

#[tokio::test]
async fn clear_queue_drains_backlog_and_set() {
    let options = UniqueQueueOptions {
        del_max_chunk_size: 2,
        ..UniqueQueueOptions::default()
    };
    let (store, queue) = queue_with(options);
    seed_leases(&store, &queue).await;
    let items: Vec<String> = (0..7).map(|i| i.to_string()).collect();
    queue.add_items(&items).await.unwrap();

    queue.clear_queue().await.unwrap();
    assert!(store.keys().is_empty());
}

#[tokio::test]
async fn get_items_rejects_zero_size() {
    let (store, queue) = test_queue();
    assert!(matches!(queue.get_items(0).await, Err(Error::InvalidArgument(_))));
    assert!(store.keys().is_empty());
}

#[tokio::test]
async fn replica_shortfall_keeps_the_write() {
    let store = Arc::new(MemoryStore::new());
    let options = UniqueQueueOptions {
        replica_sync: ReplicaSyncOptions::required(1),
        ..UniqueQueueOptions::default()
    };
    let queue = UniqueQueue::new(store.clone(), "test", options).unwrap();

    let err = queue.add_item("a").await.unwrap_err();
    assert!(err.is_durability_warning());
    assert_eq!(queue.count().await.unwrap(), 1);
}

#[tokio::test]
async fn instances_in_one_process_keep_separate_leases() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(FixedClock::new(NOW));
    let options = UniqueQueueOptions::default();
    let a = UniqueQueue::with_clock(store.clone(), "test", options.clone(), clock.clone()).unwrap();
    let b = UniqueQueue::with_clock(store.clone(), "test", options, clock).unwrap();
    assert_ne!(a.processing_list_name(), b.processing_list_name());

    a.add_items(&["1", "2", "3"]).await.unwrap();
    assert_eq!(a.get_items(2).await.unwrap(), strings(&["1", "2"]));
    assert_eq!(b.get_items(2).await.unwrap(), strings(&["3"]));

    b.reject_item("1").await.unwrap();
    b.ack_items(&["2"]).await.unwrap();
    assert_eq!(list(&store, a.processing_list_name()).await, strings(&["2", "1"]));
    assert_eq!(b.count().await.unwrap(), 0);

    assert_eq!(b.reject_batch().await.unwrap(), 1);
    assert_eq!(list(&store, "test").await, strings(&["3"]));
    assert_eq!(list(&store, a.processing_list_name()).await, strings(&["2", "1"]));

    assert_eq!(a.reject_batch().await.unwrap(), 2);
    assert_eq!(list(&store, "test").await, strings(&["3", "2", "1"]));
    assert_eq!(members(&store, "test-unique").await, strings(&["1", "2", "3"]));
}
