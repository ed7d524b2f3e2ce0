//! Queue that holds each item at most once.
//!
//! A companion set mirrors the backlog. Adding an item already in the set
//! is a no-op. Leasing removes the item from the set, so it may be added
//! again while a consumer still works on the earlier copy.

use std::sync::Arc;

use opentelemetry::KeyValue;

use crate::batch::{chunk_steps, run_scripts};
use crate::clock::{Clock, SystemClock};
use crate::config::UniqueQueueOptions;
use crate::error::{Error, Result};
use crate::identity::ConsumerId;
use crate::queue::{
    drop_all_lists, drop_lists, leased_lists, require_item, require_items, require_name, timed_out,
};
use crate::script::ScriptCall;
use crate::store::{Pipeline, Store};
use crate::sync::wait_for_replicas;
use crate::telemetry::{metrics, reclaim};

pub struct UniqueQueue {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    name: String,
    set: String,
    processing: String,
    timeouts: String,
    options: UniqueQueueOptions,
}

impl UniqueQueue {
    pub fn new(
        store: Arc<dyn Store>,
        name: impl Into<String>,
        options: UniqueQueueOptions,
    ) -> Result<Self> {
        Self::with_clock(store, name, options, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn Store>,
        name: impl Into<String>,
        options: UniqueQueueOptions,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let name = require_name(name.into())?;
        options.validate()?;
        let consumer = ConsumerId::generate(clock.as_ref());
        Ok(Self {
            set: format!("{name}{}", options.unique_suffix),
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

    pub fn unique_set_name(&self) -> &str {
        &self.set
    }

    pub fn processing_list_name(&self) -> &str {
        &self.processing
    }

    pub fn timeouts_hash_name(&self) -> &str {
        &self.timeouts
    }

    pub fn options(&self) -> &UniqueQueueOptions {
        &self.options
    }

    pub async fn count(&self) -> Result<u64> {
        self.store.llen(&self.name).await
    }

    /// Enqueues `item` unless it is already waiting in the backlog.
    pub async fn add_item(&self, item: &str) -> Result<()> {
        let item = require_item(item)?;
        self.store.eval(&self.add_call(&item)).await?;
        self.record("add", 1);
        self.sync().await
    }

    pub async fn add_items<S: AsRef<str>>(&self, items: &[S]) -> Result<()> {
        let items = require_items(items)?;
        let calls: Vec<ScriptCall> = items.iter().map(|i| self.add_call(i)).collect();
        run_scripts(self.store.as_ref(), &calls).await?;
        self.record("add", calls.len());
        self.sync().await
    }

    fn add_call(&self, item: &str) -> ScriptCall {
        ScriptCall::unique_queue_add(&self.name, &self.set, item)
    }

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
        let call = ScriptCall::unique_queue_get(
            &self.name,
            &self.set,
            &self.processing,
            &self.timeouts,
            size,
            self.clock.precise_now(),
        );
        self.store.eval(&call).await?.into_items()
    }

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

    /// Returns `item` to the tail of the queue. If a fresh copy was added
    /// meanwhile, that copy is moved to the tail instead of duplicating it.
    pub async fn reject_item(&self, item: &str) -> Result<()> {
        self.store.eval(&self.reject_call(item)).await?;
        self.record("reject", 1);
        self.sync().await
    }

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
        ScriptCall::unique_queue_reject(&self.name, &self.set, &self.processing, &self.timeouts, item)
    }

    pub async fn reject_batch(&self) -> Result<u64> {
        let moved = self.re_enqueue_list(&self.processing).await?;
        self.record("reject_batch", moved as usize);
        self.sync().await?;
        Ok(moved)
    }

    async fn re_enqueue_list(&self, processing: &str) -> Result<u64> {
        let call =
            ScriptCall::unique_queue_re_enqueue(&self.name, &self.set, processing, &self.timeouts);
        Ok(self.store.eval(&call).await?.into_integer()?.max(0) as u64)
    }

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
        let span = reclaim::start_reclaim_span("unique_queue", &self.name, mode);
        reclaim::record_lists(&span, lists.len());
        let mut total = 0;
        for processing in &lists {
            let moved = self.re_enqueue_list(processing).await?;
            reclaim::record_list(&span, processing, moved as i64);
            total += moved;
        }
        self.record("re_enqueue", total as usize);
        self.sync().await?;
        Ok(total)
    }

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

    /// Drops every lease, then drains the backlog and the set together.
    pub async fn clear_queue(&self) -> Result<()> {
        drop_all_lists(self.store.as_ref(), &self.timeouts).await?;
        loop {
            let mut pipe = Pipeline::new();
            for _ in 0..self.options.del_max_chunk_size {
                pipe.spop(&self.set).rpop(&self.name);
            }
            self.store.execute(pipe).await?;
            if self.store.spop(&self.set).await?.is_none()
                && self.store.rpop(&self.name).await?.is_none()
            {
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
            KeyValue::new("primitive", "unique_queue"),
            KeyValue::new("operation", operation),
        ];
        metrics::operations().add(1, &labels);
        if items > 0 {
            metrics::items().add(items as u64, &labels);
        }
    }
}
