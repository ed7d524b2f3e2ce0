//! FIFO queue with per-consumer leases.
//!
//! Producers push onto the head of the queue list. `get_items` moves items
//! from the tail into this instance's processing list and stamps the lease
//! time in the timeouts hash. Items stay there until acked, rejected or
//! reclaimed by some process calling one of the re-enqueue methods.

use std::cmp::Ordering;
use std::sync::Arc;

use opentelemetry::KeyValue;

use crate::batch::{chunk_steps, run_scripts};
use crate::clock::{Clock, SystemClock};
use crate::config::QueueOptions;
use crate::error::{Error, Result};
use crate::identity::ConsumerId;
use crate::script::ScriptCall;
use crate::store::{Pipeline, Store};
use crate::sync::wait_for_replicas;
use crate::telemetry::{metrics, reclaim};

pub struct Queue {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    name: String,
    processing: String,
    timeouts: String,
    options: QueueOptions,
}

impl Queue {
    pub fn new(store: Arc<dyn Store>, name: impl Into<String>, options: QueueOptions) -> Result<Self> {
        Self::with_clock(store, name, options, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn Store>,
        name: impl Into<String>,
        options: QueueOptions,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let name = require_name(name.into())?;
        options.validate()?;
        let consumer = ConsumerId::generate(clock.as_ref());
        Ok(Self {
            processing: format!("{name}{}-{consumer}", options.processing_suffix),
            timeouts: format!("{name}{}", options.timeouts_suffix),
            store,
            clock,
            name,
            options,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// This instance's lease list.
    pub fn processing_list_name(&self) -> &str {
        &self.processing
    }

    pub fn timeouts_hash_name(&self) -> &str {
        &self.timeouts
    }

    pub fn options(&self) -> &QueueOptions {
        &self.options
    }

    /// Items waiting in the backlog. Leased items are not counted.
    pub async fn count(&self) -> Result<u64> {
        self.store.llen(&self.name).await
    }

    pub async fn add_item(&self, item: &str) -> Result<()> {
        let item = require_item(item)?;
        self.store.lpush(&self.name, &[item]).await?;
        self.record("add", 1);
        self.sync().await
    }

    /// Every item is checked before anything is pushed.
    pub async fn add_items<S: AsRef<str>>(&self, items: &[S]) -> Result<()> {
        let items = require_items(items)?;
        let mut pipe = Pipeline::new();
        for chunk in items.chunks(self.options.add_max_chunk_size) {
            pipe.lpush(&self.name, chunk.to_vec());
        }
        self.store.execute(pipe).await?;
        self.record("add", items.len());
        self.sync().await
    }

    /// Leases up to `size` items, oldest first.
    pub async fn get_items(&self, size: usize) -> Result<Vec<String>> {
        if size == 0 {
            return Err(Error::InvalidArgument(
                "size must be an integer larger than zero".to_string(),
            ));
        }
        let mut leased = Vec::new();
        for step in chunk_steps(size, self.options.get_max_chunk_size) {
            let chunk = self.lease(step).await?;
            let exhausted = chunk.len() < step;
            leased.extend(chunk);
            if exhausted {
                break;
            }
        }
        self.record("get", leased.len());
        tracing::debug!(queue = %self.name, requested = size, leased = leased.len(), "leased items");
        Ok(leased)
    }

    /// Leases the whole backlog.
    pub async fn get_all_items(&self) -> Result<Vec<String>> {
        let max = self.options.get_max_chunk_size;
        let mut leased = Vec::new();
        loop {
            let chunk = self.lease(max).await?;
            let exhausted = chunk.len() < max;
            leased.extend(chunk);
            if exhausted {
                break;
            }
        }
        self.record("get", leased.len());
        Ok(leased)
    }

    async fn lease(&self, size: usize) -> Result<Vec<String>> {
        let call = ScriptCall::queue_get(
            &self.name,
            &self.processing,
            &self.timeouts,
            size,
            self.clock.precise_now(),
        );
        self.store.eval(&call).await?.into_items()
    }

    /// Removes the last occurrence of `item` from this instance's lease.
    pub async fn ack_item(&self, item: &str) -> Result<()> {
        self.store.eval(&self.ack_call(item)).await?;
        self.record("ack", 1);
        self.sync().await
    }

    pub async fn ack_items<S: AsRef<str>>(&self, items: &[S]) -> Result<()> {
        let calls: Vec<ScriptCall> = items.iter().map(|i| self.ack_call(i.as_ref())).collect();
        run_scripts(self.store.as_ref(), &calls).await?;
        self.record("ack", calls.len());
        self.sync().await
    }

    fn ack_call(&self, item: &str) -> ScriptCall {
        ScriptCall::queue_ack(&self.processing, &self.timeouts, item)
    }

    /// Returns `item` to the tail of the queue, so it is served next.
    ///
    /// Rejecting several items one by one loses their relative order; use
    /// [`Queue::reject_items`] or [`Queue::reject_batch`] to keep it.
    pub async fn reject_item(&self, item: &str) -> Result<()> {
        self.store.eval(&self.reject_call(item)).await?;
        self.record("reject", 1);
        self.sync().await
    }

    /// Rejects `items` keeping their relative order in the backlog.
    pub async fn reject_items<S: AsRef<str>>(&self, items: &[S]) -> Result<()> {
        let calls: Vec<ScriptCall> = items
            .iter()
            .rev()
            .map(|i| self.reject_call(i.as_ref()))
            .collect();
        run_scripts(self.store.as_ref(), &calls).await?;
        self.record("reject", calls.len());
        self.sync().await
    }

    fn reject_call(&self, item: &str) -> ScriptCall {
        ScriptCall::queue_reject(&self.name, &self.processing, &self.timeouts, item)
    }

    /// Returns the whole lease to the queue in its original order.
    pub async fn reject_batch(&self) -> Result<u64> {
        let call = ScriptCall::queue_re_enqueue(&self.name, &self.processing, &self.timeouts);
        let moved = self.store.eval(&call).await?.into_integer()?.max(0) as u64;
        self.record("reject_batch", moved as usize);
        self.sync().await?;
        Ok(moved)
    }

    /// Returns items of every lease older than `timeout` seconds (default:
    /// `processing_timeout`) to the queue. Returns how many items moved.
    pub async fn re_enqueue_timed_out_items(&self, timeout: Option<u64>) -> Result<u64> {
        let timeout = timeout.unwrap_or(self.options.processing_timeout);
        let lists = leased_lists(self.store.as_ref(), &self.timeouts).await?;
        let stale = timed_out(lists, timeout, self.clock.now());
        self.re_enqueue(stale, "timed_out").await
    }

    pub async fn re_enqueue_all_items(&self) -> Result<u64> {
        let lists = leased_lists(self.store.as_ref(), &self.timeouts).await?;
        self.re_enqueue(lists.into_iter().map(|(name, _)| name).collect(), "all")
            .await
    }

    async fn re_enqueue(&self, lists: Vec<String>, mode: &str) -> Result<u64> {
        let span = reclaim::start_reclaim_span("queue", &self.name, mode);
        reclaim::record_lists(&span, lists.len());
        let mut total = 0;
        for processing in &lists {
            let call = ScriptCall::queue_re_enqueue(&self.name, processing, &self.timeouts);
            let moved = self.store.eval(&call).await?.into_integer()?;
            reclaim::record_list(&span, processing, moved);
            total += moved.max(0) as u64;
        }
        self.record("re_enqueue", total as usize);
        self.sync().await?;
        Ok(total)
    }

    /// Deletes every lease older than `timeout` seconds without returning
    /// its items. Returns how many processing lists were dropped.
    pub async fn drop_timed_out_items(&self, timeout: Option<u64>) -> Result<u64> {
        let timeout = timeout.unwrap_or(self.options.processing_timeout);
        let lists = leased_lists(self.store.as_ref(), &self.timeouts).await?;
        let stale = timed_out(lists, timeout, self.clock.now());
        drop_lists(self.store.as_ref(), &self.timeouts, &stale).await?;
        self.sync().await?;
        Ok(stale.len() as u64)
    }

    pub async fn drop_all_items(&self) -> Result<u64> {
        let dropped = drop_all_lists(self.store.as_ref(), &self.timeouts).await?;
        self.sync().await?;
        Ok(dropped)
    }

    /// Drops every lease and empties the backlog.
    pub async fn clear_queue(&self) -> Result<()> {
        drop_all_lists(self.store.as_ref(), &self.timeouts).await?;
        loop {
            let mut pipe = Pipeline::new();
            for _ in 0..self.options.del_max_chunk_size {
                pipe.rpop(&self.name);
            }
            self.store.execute(pipe).await?;
            if self.store.rpop(&self.name).await?.is_none() {
                break;
            }
        }
        self.record("clear", 0);
        self.sync().await
    }

    async fn sync(&self) -> Result<()> {
        wait_for_replicas(self.store.as_ref(), &self.options.replica_sync).await
    }

    fn record(&self, operation: &'static str, items: usize) {
        let labels = [
            KeyValue::new("primitive", "queue"),
            KeyValue::new("operation", operation),
        ];
        metrics::operations().add(1, &labels);
        if items > 0 {
            metrics::items().add(items as u64, &labels);
        }
    }
}

pub(crate) fn require_name(name: String) -> Result<String> {
    if name.is_empty() {
        return Err(Error::InvalidArgument("name must not be empty".to_string()));
    }
    Ok(name)
}

pub(crate) fn require_item(item: &str) -> Result<String> {
    if item.is_empty() {
        return Err(Error::InvalidArgument("item must not be empty".to_string()));
    }
    Ok(item.to_string())
}

pub(crate) fn require_items<S: AsRef<str>>(items: &[S]) -> Result<Vec<String>> {
    items
        .iter()
        .map(|item| match item.as_ref() {
            "" => Err(Error::InvalidArgument(
                "items must not contain an empty item".to_string(),
            )),
            item => Ok(item.to_string()),
        })
        .collect()
}

/// Processing lists recorded in `timeouts`, most recent lease first.
///
/// Reclaim pushes onto the queue tail, so walking newest to oldest leaves
/// the oldest lease's items nearest the tail, to be served first.
pub(crate) async fn leased_lists(store: &dyn Store, timeouts: &str) -> Result<Vec<(String, f64)>> {
    let mut lists: Vec<(String, f64)> = store
        .hgetall(timeouts)
        .await?
        .into_iter()
        .map(|(processing, time)| {
            let time = time.parse().unwrap_or_else(|_| {
                tracing::warn!(%processing, %time, "unparsable lease time, treating as expired");
                0.0
            });
            (processing, time)
        })
        .collect();
    lists.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    Ok(lists)
}

/// Lists whose lease started more than `timeout` seconds before `now`.
pub(crate) fn timed_out(lists: Vec<(String, f64)>, timeout: u64, now: i64) -> Vec<String> {
    lists
        .into_iter()
        .filter(|(_, time)| time + (timeout as f64) < (now as f64))
        .map(|(name, _)| name)
        .collect()
}

pub(crate) async fn drop_lists(store: &dyn Store, timeouts: &str, lists: &[String]) -> Result<()> {
    if lists.is_empty() {
        return Ok(());
    }
    let mut pipe = Pipeline::new();
    for processing in lists {
        pipe.del(processing).hdel(timeouts, processing);
    }
    store.execute(pipe).await?;
    tracing::info!(timeouts, lists = lists.len(), "dropped processing lists");
    Ok(())
}

pub(crate) async fn drop_all_lists(store: &dyn Store, timeouts: &str) -> Result<u64> {
    let lists: Vec<String> = store
        .hgetall(timeouts)
        .await?
        .into_iter()
        .map(|(processing, _)| processing)
        .collect();
    drop_lists(store, timeouts, &lists).await?;
    Ok(lists.len() as u64)
}
