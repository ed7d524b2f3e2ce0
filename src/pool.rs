//! Pool of items processed over and over.
//!
//! A single sorted set is both backlog and lease tracker: the score is the
//! next time an item is due. Leasing pushes the score `ack_ttl` seconds out
//! and tags it with a `.1` fraction; acking replaces it with an integral
//! `now + ack_valid_for`. An item whose lease is never acked simply becomes
//! due again, so no reclaim pass is needed.

use std::collections::HashSet;
use std::sync::Arc;

use opentelemetry::KeyValue;

use crate::batch::{chunk_steps, run_scripts};
use crate::clock::{Clock, SystemClock};
use crate::config::PoolOptions;
use crate::error::{Error, Result};
use crate::queue::{require_item, require_items, require_name};
use crate::script::ScriptCall;
use crate::store::{Pipeline, Store};
use crate::sync::wait_for_replicas;
use crate::telemetry::metrics;

pub struct Pool {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    name: String,
    options: PoolOptions,
}

impl Pool {
    pub fn new(store: Arc<dyn Store>, name: impl Into<String>, options: PoolOptions) -> Result<Self> {
        Self::with_clock(store, name, options, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn Store>,
        name: impl Into<String>,
        options: PoolOptions,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let name = require_name(name.into())?;
        options.validate()?;
        Ok(Self {
            store,
            clock,
            name,
            options,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &PoolOptions {
        &self.options
    }

    /// Latest score that counts as due.
    fn due_at(&self) -> i64 {
        self.clock.now() - self.options.process_time_offset as i64
    }

    /// All items, leased or not.
    pub async fn count(&self) -> Result<u64> {
        self.store.zcard(&self.name).await
    }

    pub async fn count_to_process(&self) -> Result<u64> {
        self.store
            .zcount(&self.name, f64::NEG_INFINITY, self.due_at() as f64)
            .await
    }

    pub async fn is_in_pool(&self, item: &str) -> Result<bool> {
        Ok(self.store.zscore(&self.name, item).await?.is_some())
    }

    /// Membership of each distinct item, in first-seen order, checked in
    /// one round trip.
    pub async fn is_in_pool_many<S: AsRef<str>>(&self, items: &[S]) -> Result<Vec<(String, bool)>> {
        let mut seen = HashSet::new();
        let distinct: Vec<String> = items
            .iter()
            .map(|i| i.as_ref().to_string())
            .filter(|i| seen.insert(i.clone()))
            .collect();
        let mut pipe = Pipeline::new();
        for item in &distinct {
            pipe.zscore(&self.name, item);
        }
        let replies = self.store.execute(pipe).await?;
        if replies.len() != distinct.len() {
            return Err(Error::Store(format!(
                "expected {} replies, got {}",
                distinct.len(),
                replies.len()
            )));
        }
        Ok(distinct
            .into_iter()
            .zip(replies)
            .map(|(item, reply)| (item, !reply.is_nil()))
            .collect())
    }

    /// Adds `item` due immediately. Re-adding resets its due time.
    pub async fn add_item(&self, item: &str) -> Result<()> {
        let item = require_item(item)?;
        self.store
            .zadd(&self.name, &[(self.clock.now() as f64, item)])
            .await?;
        self.record("add", 1);
        self.sync().await
    }

    pub async fn add_items<S: AsRef<str>>(&self, items: &[S]) -> Result<()> {
        let items = require_items(items)?;
        let now = self.clock.now() as f64;
        let mut seen = HashSet::new();
        let members: Vec<(f64, String)> = items
            .into_iter()
            .filter(|i| seen.insert(i.clone()))
            .map(|i| (now, i))
            .collect();
        let mut pipe = Pipeline::new();
        for chunk in members.chunks(self.options.add_max_chunk_size) {
            pipe.zadd(&self.name, chunk.to_vec());
        }
        self.store.execute(pipe).await?;
        self.record("add", members.len());
        self.sync().await
    }

    /// Leases up to `size` due items, earliest due first.
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
        tracing::debug!(pool = %self.name, requested = size, leased = leased.len(), "leased items");
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
        let call = ScriptCall::pool_get(&self.name, size, self.due_at(), self.options.ack_ttl);
        self.store.eval(&call).await?.into_items()
    }

    /// Marks a leased item done until `now + ack_valid_for`. Does nothing
    /// if the item is not leased at the moment.
    pub async fn ack_item(&self, item: &str) -> Result<()> {
        self.store.eval(&self.ack_call(item)).await?;
        self.record("ack", 1);
        self.sync().await
    }

    pub async fn ack_items<S: AsRef<str>>(&self, items: &[S]) -> Result<()> {
        let calls: Vec<ScriptCall> = items.iter().map(|i| self.ack_call(i.as_ref())).collect();
        for chunk in calls.chunks(self.options.ack_max_chunk_size) {
            run_scripts(self.store.as_ref(), chunk).await?;
            self.sync().await?;
        }
        self.record("ack", calls.len());
        Ok(())
    }

    fn ack_call(&self, item: &str) -> ScriptCall {
        let valid_until = self.clock.now() + self.options.ack_valid_for as i64;
        ScriptCall::pool_ack(&self.name, item, valid_until)
    }

    /// Removes a leased item. Does nothing if the item is not leased.
    pub async fn remove_item(&self, item: &str) -> Result<()> {
        self.store
            .eval(&ScriptCall::pool_remove(&self.name, item))
            .await?;
        self.record("remove", 1);
        self.sync().await
    }

    pub async fn remove_items<S: AsRef<str>>(&self, items: &[S]) -> Result<()> {
        let calls: Vec<ScriptCall> = items
            .iter()
            .map(|i| ScriptCall::pool_remove(&self.name, i.as_ref()))
            .collect();
        for chunk in calls.chunks(self.options.del_max_chunk_size) {
            run_scripts(self.store.as_ref(), chunk).await?;
            self.sync().await?;
        }
        self.record("remove", calls.len());
        Ok(())
    }

    /// Removes every item, lowest scores first.
    pub async fn clear_pool(&self) -> Result<()> {
        let stop = self.options.del_max_chunk_size as i64 - 1;
        while self.store.zremrangebyrank(&self.name, 0, stop).await? != 0 {}
        self.record("clear", 0);
        self.sync().await
    }

    async fn sync(&self) -> Result<()> {
        wait_for_replicas(self.store.as_ref(), &self.options.replica_sync).await
    }

    fn record(&self, operation: &'static str, items: usize) {
        let labels = [
            KeyValue::new("primitive", "pool"),
            KeyValue::new("operation", operation),
        ];
        metrics::operations().add(1, &labels);
        if items > 0 {
            metrics::items().add(items as u64, &labels);
        }
    }
}

/// Whether `score` carries the lease marker.
pub fn is_leased(score: f64) -> bool {
    score - score.floor() > 0.01
}
