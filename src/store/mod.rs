//! Store adapter.
//!
//! The primitives only talk to the key-value store through [`Store`]:
//! plain list/set/sorted-set/hash commands, atomic scripts, pipelines and
//! the replica wait. [`redis::RedisStore`] is the production adapter,
//! [`memory::MemoryStore`] runs the same semantics in process.

pub mod memory;
pub mod redis;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::script::ScriptCall;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

#[async_trait]
pub trait Store: Send + Sync {
    // Lists

    async fn llen(&self, key: &str) -> Result<u64>;
    /// Inclusive range; negative indexes count from the tail.
    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>>;
    /// Pushes each item onto the head in turn. Returns the new length.
    async fn lpush(&self, key: &str, items: &[String]) -> Result<u64>;
    async fn rpush(&self, key: &str, items: &[String]) -> Result<u64>;
    async fn lpop(&self, key: &str) -> Result<Option<String>>;
    async fn rpop(&self, key: &str) -> Result<Option<String>>;
    /// Moves the tail of `source` to the head of `destination`.
    async fn rpoplpush(&self, source: &str, destination: &str) -> Result<Option<String>>;

    // Sets

    async fn sadd(&self, key: &str, members: &[String]) -> Result<u64>;
    async fn srem(&self, key: &str, members: &[String]) -> Result<u64>;
    async fn sismember(&self, key: &str, member: &str) -> Result<bool>;
    async fn spop(&self, key: &str) -> Result<Option<String>>;
    async fn smembers(&self, key: &str) -> Result<Vec<String>>;

    // Sorted sets

    async fn zadd(&self, key: &str, members: &[(f64, String)]) -> Result<u64>;
    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>>;
    async fn zrem(&self, key: &str, members: &[String]) -> Result<u64>;
    async fn zcard(&self, key: &str) -> Result<u64>;
    async fn zcount(&self, key: &str, min: f64, max: f64) -> Result<u64>;
    /// Members with `min <= score <= max`, lowest score first.
    async fn zrangebyscore_with_scores(
        &self,
        key: &str,
        min: f64,
        max: f64,
        offset: usize,
        count: usize,
    ) -> Result<Vec<(String, f64)>>;
    async fn zremrangebyrank(&self, key: &str, start: i64, stop: i64) -> Result<u64>;

    // Hashes

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<bool>;
    async fn hdel(&self, key: &str, field: &str) -> Result<u64>;
    async fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>>;

    // Keys

    async fn del(&self, keys: &[String]) -> Result<u64>;

    /// Runs a script, loading it into the store's script cache if needed.
    async fn eval(&self, call: &ScriptCall) -> Result<Reply>;

    /// Sends every command in one round trip. Scripts are invoked by digest
    /// only; a script the store has not cached fails the whole call with
    /// [`Error::ScriptNotLoaded`].
    async fn execute(&self, pipeline: Pipeline) -> Result<Vec<Reply>>;

    /// Blocks until `required` replicas acknowledged prior writes or
    /// `timeout_ms` elapsed. Returns the acknowledged count.
    async fn wait_replicas(&self, required: u32, timeout_ms: u64) -> Result<u32>;
}

/// A command that may be sent inside a [`Pipeline`].
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    LPush { key: String, items: Vec<String> },
    RPop { key: String },
    SPop { key: String },
    Del { key: String },
    HDel { key: String, field: String },
    ZScore { key: String, member: String },
    ZAdd { key: String, members: Vec<(f64, String)> },
    Script(ScriptCall),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    commands: Vec<Command>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lpush(&mut self, key: &str, items: Vec<String>) -> &mut Self {
        self.push(Command::LPush {
            key: key.to_string(),
            items,
        })
    }

    pub fn rpop(&mut self, key: &str) -> &mut Self {
        self.push(Command::RPop { key: key.to_string() })
    }

    pub fn spop(&mut self, key: &str) -> &mut Self {
        self.push(Command::SPop { key: key.to_string() })
    }

    pub fn del(&mut self, key: &str) -> &mut Self {
        self.push(Command::Del { key: key.to_string() })
    }

    pub fn hdel(&mut self, key: &str, field: &str) -> &mut Self {
        self.push(Command::HDel {
            key: key.to_string(),
            field: field.to_string(),
        })
    }

    pub fn zscore(&mut self, key: &str, member: &str) -> &mut Self {
        self.push(Command::ZScore {
            key: key.to_string(),
            member: member.to_string(),
        })
    }

    pub fn zadd(&mut self, key: &str, members: Vec<(f64, String)>) -> &mut Self {
        self.push(Command::ZAdd {
            key: key.to_string(),
            members,
        })
    }

    pub fn script(&mut self, call: ScriptCall) -> &mut Self {
        self.push(Command::Script(call))
    }

    pub fn push(&mut self, command: Command) -> &mut Self {
        self.commands.push(command);
        self
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn into_commands(self) -> Vec<Command> {
        self.commands
    }
}

/// A decoded store reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Nil,
    Integer(i64),
    Data(String),
    Array(Vec<String>),
    Okay,
}

impl Reply {
    pub fn is_nil(&self) -> bool {
        matches!(self, Reply::Nil)
    }

    /// Items returned by a lease script. A nil reply is an empty lease.
    pub fn into_items(self) -> Result<Vec<String>> {
        match self {
            Reply::Nil => Ok(Vec::new()),
            Reply::Array(items) => Ok(items),
            other => Err(Error::Store(format!("expected an item list, got {other:?}"))),
        }
    }

    pub fn into_integer(self) -> Result<i64> {
        match self {
            Reply::Nil => Ok(0),
            Reply::Integer(n) => Ok(n),
            Reply::Data(s) => s
                .parse()
                .map_err(|_| Error::Store(format!("expected an integer, got {s:?}"))),
            other => Err(Error::Store(format!("expected an integer, got {other:?}"))),
        }
    }
}
