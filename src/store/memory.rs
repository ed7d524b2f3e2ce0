//! In-process store.
//!
//! Implements the subset of Redis the primitives use, including every
//! atomic script, over a mutex-guarded map. Keys disappear once their
//! collection is empty, as on the server. The script cache starts cold so
//! pipelines exercise the same fallback path as a freshly started Redis.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::{Command, Pipeline, Reply, Store};
use crate::error::{Error, Result};
use crate::pool::is_leased;
use crate::script::{Script, ScriptCall};

#[derive(Debug, Clone)]
enum Entry {
    List(VecDeque<String>),
    Set(BTreeSet<String>),
    ZSet(BTreeMap<String, f64>),
    Hash(BTreeMap<String, String>),
}

impl Entry {
    fn is_empty(&self) -> bool {
        match self {
            Entry::List(l) => l.is_empty(),
            Entry::Set(s) => s.is_empty(),
            Entry::ZSet(z) => z.is_empty(),
            Entry::Hash(h) => h.is_empty(),
        }
    }
}

fn wrong_type() -> Error {
    Error::Store("WRONGTYPE Operation against a key holding the wrong kind of value".to_string())
}

/// Start/stop list indexes, negative counting from the end, clamped.
fn index_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

fn parse_num<T: std::str::FromStr>(value: &str, what: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Store(format!("ERR {what} is not a valid number: {value:?}")))
}

fn script_param<'a>(call: &ScriptCall, params: &'a [String], i: usize, what: &str) -> Result<&'a str> {
    params
        .get(i)
        .map(String::as_str)
        .ok_or_else(|| Error::Store(format!("ERR {} expects {what} #{}", call.script, i + 1)))
}

#[derive(Debug, Default)]
struct State {
    data: BTreeMap<String, Entry>,
}

impl State {
    fn prune(&mut self, key: &str) {
        if self.data.get(key).is_some_and(Entry::is_empty) {
            self.data.remove(key);
        }
    }

    fn list(&self, key: &str) -> Result<Option<&VecDeque<String>>> {
        match self.data.get(key) {
            None => Ok(None),
            Some(Entry::List(l)) => Ok(Some(l)),
            Some(_) => Err(wrong_type()),
        }
    }

    fn list_mut(&mut self, key: &str) -> Result<&mut VecDeque<String>> {
        match self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Entry::List(VecDeque::new()))
        {
            Entry::List(l) => Ok(l),
            _ => Err(wrong_type()),
        }
    }

    fn set(&self, key: &str) -> Result<Option<&BTreeSet<String>>> {
        match self.data.get(key) {
            None => Ok(None),
            Some(Entry::Set(s)) => Ok(Some(s)),
            Some(_) => Err(wrong_type()),
        }
    }

    fn set_mut(&mut self, key: &str) -> Result<&mut BTreeSet<String>> {
        match self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Entry::Set(BTreeSet::new()))
        {
            Entry::Set(s) => Ok(s),
            _ => Err(wrong_type()),
        }
    }

    fn zset(&self, key: &str) -> Result<Option<&BTreeMap<String, f64>>> {
        match self.data.get(key) {
            None => Ok(None),
            Some(Entry::ZSet(z)) => Ok(Some(z)),
            Some(_) => Err(wrong_type()),
        }
    }

    fn zset_mut(&mut self, key: &str) -> Result<&mut BTreeMap<String, f64>> {
        match self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Entry::ZSet(BTreeMap::new()))
        {
            Entry::ZSet(z) => Ok(z),
            _ => Err(wrong_type()),
        }
    }

    fn hash(&self, key: &str) -> Result<Option<&BTreeMap<String, String>>> {
        match self.data.get(key) {
            None => Ok(None),
            Some(Entry::Hash(h)) => Ok(Some(h)),
            Some(_) => Err(wrong_type()),
        }
    }

    fn hash_mut(&mut self, key: &str) -> Result<&mut BTreeMap<String, String>> {
        match self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Entry::Hash(BTreeMap::new()))
        {
            Entry::Hash(h) => Ok(h),
            _ => Err(wrong_type()),
        }
    }

    // Lists

    fn llen(&self, key: &str) -> Result<u64> {
        Ok(self.list(key)?.map_or(0, |l| l.len() as u64))
    }

    fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        let Some(list) = self.list(key)? else {
            return Ok(Vec::new());
        };
        Ok(match index_range(list.len(), start, stop) {
            Some((from, to)) => list.range(from..=to).cloned().collect(),
            None => Vec::new(),
        })
    }

    fn lpush(&mut self, key: &str, items: &[String]) -> Result<u64> {
        let list = self.list_mut(key)?;
        for item in items {
            list.push_front(item.clone());
        }
        let len = list.len() as u64;
        self.prune(key);
        Ok(len)
    }

    fn rpush(&mut self, key: &str, items: &[String]) -> Result<u64> {
        let list = self.list_mut(key)?;
        list.extend(items.iter().cloned());
        let len = list.len() as u64;
        self.prune(key);
        Ok(len)
    }

    fn lpop(&mut self, key: &str) -> Result<Option<String>> {
        if self.list(key)?.is_none() {
            return Ok(None);
        }
        let item = self.list_mut(key)?.pop_front();
        self.prune(key);
        Ok(item)
    }

    fn rpop(&mut self, key: &str) -> Result<Option<String>> {
        if self.list(key)?.is_none() {
            return Ok(None);
        }
        let item = self.list_mut(key)?.pop_back();
        self.prune(key);
        Ok(item)
    }

    fn rpoplpush(&mut self, source: &str, destination: &str) -> Result<Option<String>> {
        self.list(destination)?;
        let Some(item) = self.rpop(source)? else {
            return Ok(None);
        };
        self.list_mut(destination)?.push_front(item.clone());
        Ok(Some(item))
    }

    /// `LREM key -1 item`: drops the occurrence nearest the tail.
    fn lrem_last(&mut self, key: &str, item: &str) -> Result<u64> {
        if self.list(key)?.is_none() {
            return Ok(0);
        }
        let list = self.list_mut(key)?;
        let removed = match list.iter().rposition(|v| v == item) {
            Some(pos) => {
                list.remove(pos);
                1
            }
            None => 0,
        };
        self.prune(key);
        Ok(removed)
    }

    // Sets

    fn sadd(&mut self, key: &str, members: &[String]) -> Result<u64> {
        let set = self.set_mut(key)?;
        let added = members.iter().filter(|m| set.insert((*m).clone())).count();
        self.prune(key);
        Ok(added as u64)
    }

    fn srem(&mut self, key: &str, members: &[String]) -> Result<u64> {
        if self.set(key)?.is_none() {
            return Ok(0);
        }
        let set = self.set_mut(key)?;
        let removed = members.iter().filter(|m| set.remove(m.as_str())).count();
        self.prune(key);
        Ok(removed as u64)
    }

    fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        Ok(self.set(key)?.is_some_and(|s| s.contains(member)))
    }

    fn spop(&mut self, key: &str) -> Result<Option<String>> {
        if self.set(key)?.is_none() {
            return Ok(None);
        }
        let member = self.set_mut(key)?.pop_first();
        self.prune(key);
        Ok(member)
    }

    fn smembers(&self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .set(key)?
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    // Sorted sets

    fn zadd(&mut self, key: &str, members: &[(f64, String)]) -> Result<u64> {
        let zset = self.zset_mut(key)?;
        let mut added = 0;
        for (score, member) in members {
            if zset.insert(member.clone(), *score).is_none() {
                added += 1;
            }
        }
        self.prune(key);
        Ok(added)
    }

    fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>> {
        Ok(self.zset(key)?.and_then(|z| z.get(member).copied()))
    }

    fn zrem(&mut self, key: &str, members: &[String]) -> Result<u64> {
        if self.zset(key)?.is_none() {
            return Ok(0);
        }
        let zset = self.zset_mut(key)?;
        let removed = members.iter().filter(|m| zset.remove(m.as_str()).is_some()).count();
        self.prune(key);
        Ok(removed as u64)
    }

    fn zcard(&self, key: &str) -> Result<u64> {
        Ok(self.zset(key)?.map_or(0, |z| z.len() as u64))
    }

    /// Members ordered by score, then lexicographically.
    fn zsorted(&self, key: &str) -> Result<Vec<(String, f64)>> {
        let mut members: Vec<(String, f64)> = self
            .zset(key)?
            .map(|z| z.iter().map(|(m, s)| (m.clone(), *s)).collect())
            .unwrap_or_default();
        members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        Ok(members)
    }

    fn zcount(&self, key: &str, min: f64, max: f64) -> Result<u64> {
        Ok(self
            .zset(key)?
            .map_or(0, |z| z.values().filter(|s| **s >= min && **s <= max).count() as u64))
    }

    fn zrangebyscore(
        &self,
        key: &str,
        min: f64,
        max: f64,
        offset: usize,
        count: usize,
    ) -> Result<Vec<(String, f64)>> {
        Ok(self
            .zsorted(key)?
            .into_iter()
            .filter(|(_, s)| *s >= min && *s <= max)
            .skip(offset)
            .take(count)
            .collect())
    }

    fn zremrangebyrank(&mut self, key: &str, start: i64, stop: i64) -> Result<u64> {
        let sorted = self.zsorted(key)?;
        let Some((from, to)) = index_range(sorted.len(), start, stop) else {
            return Ok(0);
        };
        let doomed: Vec<String> = sorted[from..=to].iter().map(|(m, _)| m.clone()).collect();
        self.zrem(key, &doomed)
    }

    // Hashes

    fn hset(&mut self, key: &str, field: &str, value: &str) -> Result<bool> {
        let created = self
            .hash_mut(key)?
            .insert(field.to_string(), value.to_string())
            .is_none();
        Ok(created)
    }

    fn hdel(&mut self, key: &str, field: &str) -> Result<u64> {
        if self.hash(key)?.is_none() {
            return Ok(0);
        }
        let removed = self.hash_mut(key)?.remove(field).is_some();
        self.prune(key);
        Ok(u64::from(removed))
    }

    fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>> {
        Ok(self
            .hash(key)?
            .map(|h| h.iter().map(|(f, v)| (f.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    fn del(&mut self, keys: &[String]) -> u64 {
        keys.iter().filter(|k| self.data.remove(k.as_str()).is_some()).count() as u64
    }

    // Scripts

    fn run_script(&mut self, call: &ScriptCall) -> Result<Reply> {
        let key = |i: usize| script_param(call, &call.keys, i, "key");
        let arg = |i: usize| script_param(call, &call.args, i, "argument");

        match call.script {
            Script::QueueGet => {
                let size = parse_num(arg(0)?, "size")?;
                self.lease(key(0)?, None, key(1)?, key(2)?, size, arg(1)?)
            }
            Script::UniqueQueueGet => {
                let size = parse_num(arg(0)?, "size")?;
                self.lease(key(0)?, Some(key(1)?), key(2)?, key(3)?, size, arg(1)?)
            }
            Script::QueueAck => {
                let (processing, timeouts) = (key(0)?, key(1)?);
                self.lrem_last(processing, arg(0)?)?;
                self.forget_if_drained(processing, timeouts)?;
                Ok(Reply::Nil)
            }
            Script::QueueReject => {
                let (queue, processing, timeouts) = (key(0)?, key(1)?, key(2)?);
                let item = arg(0)?;
                if self.lrem_last(processing, item)? == 1 {
                    self.rpush(queue, &[item.to_string()])?;
                }
                self.forget_if_drained(processing, timeouts)?;
                Ok(Reply::Nil)
            }
            Script::UniqueQueueReject => {
                let (queue, set, processing, timeouts) = (key(0)?, key(1)?, key(2)?, key(3)?);
                let item = arg(0)?;
                if self.lrem_last(processing, item)? == 1 {
                    self.requeue_unique(queue, set, item)?;
                }
                self.forget_if_drained(processing, timeouts)?;
                Ok(Reply::Nil)
            }
            Script::QueueReEnqueue => {
                let (queue, processing, timeouts) = (key(0)?, key(1)?, key(2)?);
                let mut count = 0;
                while let Some(item) = self.lpop(processing)? {
                    self.rpush(queue, &[item])?;
                    count += 1;
                }
                self.hdel(timeouts, processing)?;
                Ok(Reply::Integer(count))
            }
            Script::UniqueQueueReEnqueue => {
                let (queue, set, processing, timeouts) = (key(0)?, key(1)?, key(2)?, key(3)?);
                let mut count = 0;
                while let Some(item) = self.lpop(processing)? {
                    self.requeue_unique(queue, set, &item)?;
                    count += 1;
                }
                self.hdel(timeouts, processing)?;
                Ok(Reply::Integer(count))
            }
            Script::UniqueQueueAdd => {
                let (queue, set) = (key(0)?, key(1)?);
                let item = arg(0)?.to_string();
                if !self.sismember(set, &item)? {
                    self.lpush(queue, std::slice::from_ref(&item))?;
                    self.sadd(set, &[item])?;
                }
                Ok(Reply::Nil)
            }
            Script::PoolGet => {
                let pool = key(0)?;
                let size: usize = parse_num(arg(0)?, "size")?;
                let time: f64 = parse_num(arg(1)?, "time")?;
                let ack_ttl: f64 = parse_num(arg(2)?, "ack TTL")?;
                let due = self.zrangebyscore(pool, f64::NEG_INFINITY, time, 0, size)?;
                let leased: Vec<(f64, String)> = due
                    .into_iter()
                    .map(|(item, score)| (score.floor() + ack_ttl + 0.1, item))
                    .collect();
                self.zadd(pool, &leased)?;
                Ok(Reply::Array(leased.into_iter().map(|(_, item)| item).collect()))
            }
            Script::PoolAck => {
                let pool = key(0)?;
                let item = arg(0)?;
                let valid_until: f64 = parse_num(arg(1)?, "valid-until")?;
                if self.zscore(pool, item)?.is_some_and(is_leased) {
                    self.zadd(pool, &[(valid_until, item.to_string())])?;
                }
                Ok(Reply::Nil)
            }
            Script::PoolRemove => {
                let pool = key(0)?;
                let item = arg(0)?;
                if self.zscore(pool, item)?.is_some_and(is_leased) {
                    self.zrem(pool, &[item.to_string()])?;
                }
                Ok(Reply::Nil)
            }
        }
    }

    fn lease(
        &mut self,
        queue: &str,
        set: Option<&str>,
        processing: &str,
        timeouts: &str,
        size: usize,
        time: &str,
    ) -> Result<Reply> {
        self.hset(timeouts, processing, time)?;
        let mut items = Vec::new();
        for _ in 0..size {
            let Some(item) = self.rpoplpush(queue, processing)? else {
                break;
            };
            if let Some(set) = set {
                self.srem(set, std::slice::from_ref(&item))?;
            }
            items.push(item);
        }
        Ok(Reply::Array(items))
    }

    fn requeue_unique(&mut self, queue: &str, set: &str, item: &str) -> Result<()> {
        let item = item.to_string();
        if self.sismember(set, &item)? {
            self.lrem_last(queue, &item)?;
            self.rpush(queue, &[item])?;
        } else {
            self.rpush(queue, std::slice::from_ref(&item))?;
            self.sadd(set, &[item])?;
        }
        Ok(())
    }

    fn forget_if_drained(&mut self, processing: &str, timeouts: &str) -> Result<()> {
        if self.llen(processing)? == 0 {
            self.hdel(timeouts, processing)?;
        }
        Ok(())
    }

    fn apply(&mut self, command: Command) -> Result<Reply> {
        Ok(match command {
            Command::LPush { key, items } => Reply::Integer(self.lpush(&key, &items)? as i64),
            Command::RPop { key } => self.rpop(&key)?.map_or(Reply::Nil, Reply::Data),
            Command::SPop { key } => self.spop(&key)?.map_or(Reply::Nil, Reply::Data),
            Command::Del { key } => Reply::Integer(self.del(&[key]) as i64),
            Command::HDel { key, field } => Reply::Integer(self.hdel(&key, &field)? as i64),
            Command::ZScore { key, member } => self
                .zscore(&key, &member)?
                .map_or(Reply::Nil, |s| Reply::Data(s.to_string())),
            Command::ZAdd { key, members } => Reply::Integer(self.zadd(&key, &members)? as i64),
            Command::Script(call) => self.run_script(&call)?,
        })
    }
}

/// Process-local [`Store`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    loaded: Mutex<HashSet<Script>>,
    replicas: u32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports `replicas` acknowledgements from every replica wait.
    pub fn with_replicas(replicas: u32) -> Self {
        Self {
            replicas,
            ..Self::default()
        }
    }

    /// Empties the script cache, as `SCRIPT FLUSH` does.
    pub fn flush_scripts(&self) {
        lock(&self.loaded).clear();
    }

    pub fn is_script_loaded(&self, script: Script) -> bool {
        lock(&self.loaded).contains(&script)
    }

    /// Every live key, sorted.
    pub fn keys(&self) -> Vec<String> {
        lock(&self.state).data.keys().cloned().collect()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl Store for MemoryStore {
    async fn llen(&self, key: &str) -> Result<u64> {
        lock(&self.state).llen(key)
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        lock(&self.state).lrange(key, start, stop)
    }

    async fn lpush(&self, key: &str, items: &[String]) -> Result<u64> {
        lock(&self.state).lpush(key, items)
    }

    async fn rpush(&self, key: &str, items: &[String]) -> Result<u64> {
        lock(&self.state).rpush(key, items)
    }

    async fn lpop(&self, key: &str) -> Result<Option<String>> {
        lock(&self.state).lpop(key)
    }

    async fn rpop(&self, key: &str) -> Result<Option<String>> {
        lock(&self.state).rpop(key)
    }

    async fn rpoplpush(&self, source: &str, destination: &str) -> Result<Option<String>> {
        lock(&self.state).rpoplpush(source, destination)
    }

    async fn sadd(&self, key: &str, members: &[String]) -> Result<u64> {
        lock(&self.state).sadd(key, members)
    }

    async fn srem(&self, key: &str, members: &[String]) -> Result<u64> {
        lock(&self.state).srem(key, members)
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        lock(&self.state).sismember(key, member)
    }

    async fn spop(&self, key: &str) -> Result<Option<String>> {
        lock(&self.state).spop(key)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        lock(&self.state).smembers(key)
    }

    async fn zadd(&self, key: &str, members: &[(f64, String)]) -> Result<u64> {
        lock(&self.state).zadd(key, members)
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>> {
        lock(&self.state).zscore(key, member)
    }

    async fn zrem(&self, key: &str, members: &[String]) -> Result<u64> {
        lock(&self.state).zrem(key, members)
    }

    async fn zcard(&self, key: &str) -> Result<u64> {
        lock(&self.state).zcard(key)
    }

    async fn zcount(&self, key: &str, min: f64, max: f64) -> Result<u64> {
        lock(&self.state).zcount(key, min, max)
    }

    async fn zrangebyscore_with_scores(
        &self,
        key: &str,
        min: f64,
        max: f64,
        offset: usize,
        count: usize,
    ) -> Result<Vec<(String, f64)>> {
        lock(&self.state).zrangebyscore(key, min, max, offset, count)
    }

    async fn zremrangebyrank(&self, key: &str, start: i64, stop: i64) -> Result<u64> {
        lock(&self.state).zremrangebyrank(key, start, stop)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<bool> {
        lock(&self.state).hset(key, field, value)
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<u64> {
        lock(&self.state).hdel(key, field)
    }

    async fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>> {
        lock(&self.state).hgetall(key)
    }

    async fn del(&self, keys: &[String]) -> Result<u64> {
        Ok(lock(&self.state).del(keys))
    }

    async fn eval(&self, call: &ScriptCall) -> Result<Reply> {
        lock(&self.loaded).insert(call.script);
        lock(&self.state).run_script(call)
    }

    async fn execute(&self, pipeline: Pipeline) -> Result<Vec<Reply>> {
        let loaded = lock(&self.loaded).clone();
        let mut state = lock(&self.state);
        let mut replies = Vec::with_capacity(pipeline.len());
        let mut first_error = None;
        for command in pipeline.into_commands() {
            if let Command::Script(call) = &command {
                if !loaded.contains(&call.script) {
                    first_error.get_or_insert_with(|| {
                        Error::ScriptNotLoaded(format!(
                            "NOSCRIPT No matching script for {}",
                            call.script
                        ))
                    });
                    continue;
                }
            }
            match state.apply(command) {
                Ok(reply) => replies.push(reply),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(replies),
        }
    }

    async fn wait_replicas(&self, _required: u32, _timeout_ms: u64) -> Result<u32> {
        Ok(self.replicas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &[&str]) -> Vec<String> {
        v.iter().map(|x| x.to_string()).collect()
    }

    #[tokio::test]
    async fn lpush_then_rpoplpush_is_fifo() {
        let store = MemoryStore::new();
        store.lpush("q", &s(&["1", "2", "3"])).await.unwrap();
        assert_eq!(store.lrange("q", 0, -1).await.unwrap(), s(&["3", "2", "1"]));
        assert_eq!(store.rpoplpush("q", "p").await.unwrap().as_deref(), Some("1"));
        assert_eq!(store.rpoplpush("q", "p").await.unwrap().as_deref(), Some("2"));
        assert_eq!(store.lrange("p", 0, -1).await.unwrap(), s(&["2", "1"]));
    }

    #[tokio::test]
    async fn empty_collections_vanish() {
        let store = MemoryStore::new();
        store.rpush("q", &s(&["a"])).await.unwrap();
        store.hset("h", "f", "1").await.unwrap();
        store.lpop("q").await.unwrap();
        store.hdel("h", "f").await.unwrap();
        assert!(store.keys().is_empty());
    }

    #[tokio::test]
    async fn wrong_type_is_an_error() {
        let store = MemoryStore::new();
        store.sadd("k", &s(&["a"])).await.unwrap();
        assert!(matches!(store.llen("k").await, Err(Error::Store(_))));
    }

    #[tokio::test]
    async fn zrange_orders_by_score_then_member() {
        let store = MemoryStore::new();
        store
            .zadd("z", &[(2.0, "b".into()), (1.0, "c".into()), (2.0, "a".into())])
            .await
            .unwrap();
        let all = store
            .zrangebyscore_with_scores("z", f64::NEG_INFINITY, 2.0, 0, 10)
            .await
            .unwrap();
        let names: Vec<&str> = all.iter().map(|(m, _)| m.as_str()).collect();
        assert_eq!(names, ["c", "a", "b"]);
        assert_eq!(store.zremrangebyrank("z", 0, 1).await.unwrap(), 2);
        assert_eq!(store.zcard("z").await.unwrap(), 1);
    }

    #[test]
    fn negative_indexes_count_from_the_tail() {
        assert_eq!(index_range(5, 0, -1), Some((0, 4)));
        assert_eq!(index_range(5, -2, -1), Some((3, 4)));
        assert_eq!(index_range(5, 3, 100), Some((3, 4)));
        assert_eq!(index_range(0, 0, -1), None);
        assert_eq!(index_range(5, 4, 2), None);
    }

    #[tokio::test]
    async fn pipelined_script_needs_a_warm_cache() {
        let store = MemoryStore::new();
        store.rpush("p", &s(&["x"])).await.unwrap();
        let mut pipe = Pipeline::new();
        pipe.script(ScriptCall::queue_ack("p", "t", "x"));
        let err = store.execute(pipe.clone()).await.unwrap_err();
        assert!(matches!(err, Error::ScriptNotLoaded(_)));
        assert_eq!(store.llen("p").await.unwrap(), 1);

        store.eval(&ScriptCall::queue_ack("p", "t", "nothing")).await.unwrap();
        assert!(store.is_script_loaded(Script::QueueAck));
        store.execute(pipe).await.unwrap();
        assert_eq!(store.llen("p").await.unwrap(), 0);

        store.flush_scripts();
        assert!(!store.is_script_loaded(Script::QueueAck));
    }

    #[tokio::test]
    async fn lrem_last_takes_the_tail_occurrence() {
        let store = MemoryStore::new();
        store.rpush("p", &s(&["a", "b", "a", "c"])).await.unwrap();
        store.eval(&ScriptCall::queue_ack("p", "t", "a")).await.unwrap();
        assert_eq!(store.lrange("p", 0, -1).await.unwrap(), s(&["a", "b", "c"]));
    }
}
