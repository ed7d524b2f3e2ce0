//! Redis adapter.
//!
//! One multiplexed [`ConnectionManager`] is shared by every call; it
//! reconnects on its own after the server drops the link. Scripts go
//! through `EVALSHA`. Pipelined scripts are sent by digest only, so a cold
//! script cache surfaces as [`Error::ScriptNotLoaded`] to the caller.

use std::collections::HashMap;

use ::redis::aio::ConnectionManager;
use ::redis::{Client, Value};
use async_trait::async_trait;

use super::{Command, Pipeline, Reply, Store};
use crate::error::{Error, Result};
use crate::script::{Script, ScriptCall};

#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    scripts: HashMap<Script, ::redis::Script>,
}

impl RedisStore {
    /// Connect to `url` (e.g. `redis://127.0.0.1:6379/0`).
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        tracing::debug!("connected to redis");
        Ok(Self::from_manager(conn))
    }

    pub fn from_manager(conn: ConnectionManager) -> Self {
        let scripts = Script::ALL
            .iter()
            .map(|s| (*s, ::redis::Script::new(s.lua())))
            .collect();
        Self { conn, scripts }
    }

    fn script(&self, script: Script) -> Result<&::redis::Script> {
        self.scripts
            .get(&script)
            .ok_or_else(|| Error::Other(format!("script {script} is not registered")))
    }

    async fn query<T: ::redis::FromRedisValue>(&self, cmd: &::redis::Cmd) -> Result<T> {
        let mut conn = self.conn.clone();
        Ok(cmd.query_async(&mut conn).await?)
    }
}

fn cmd(name: &str) -> ::redis::Cmd {
    ::redis::cmd(name)
}

/// Score bounds the way the server spells them.
fn bound(score: f64) -> String {
    if score == f64::NEG_INFINITY {
        "-inf".to_string()
    } else if score == f64::INFINITY {
        "+inf".to_string()
    } else {
        score.to_string()
    }
}

fn to_reply(value: Value) -> Result<Reply> {
    Ok(match value {
        Value::Nil => Reply::Nil,
        Value::Int(n) => Reply::Integer(n),
        Value::Okay => Reply::Okay,
        Value::SimpleString(s) => Reply::Data(s),
        Value::BulkString(bytes) => Reply::Data(String::from_utf8(bytes).map_err(|e| {
            Error::Store(format!("reply is not valid UTF-8: {:?}", e.as_bytes()))
        })?),
        Value::Double(d) => Reply::Data(d.to_string()),
        Value::Array(values) => {
            let mut items = Vec::with_capacity(values.len());
            for value in values {
                match to_reply(value)? {
                    Reply::Data(s) => items.push(s),
                    Reply::Integer(n) => items.push(n.to_string()),
                    other => {
                        return Err(Error::Store(format!(
                            "unexpected nested reply {other:?}"
                        )));
                    }
                }
            }
            Reply::Array(items)
        }
        other => return Err(Error::Store(format!("unsupported reply {other:?}"))),
    })
}

#[async_trait]
impl Store for RedisStore {
    async fn llen(&self, key: &str) -> Result<u64> {
        self.query(cmd("LLEN").arg(key)).await
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        self.query(cmd("LRANGE").arg(key).arg(start).arg(stop)).await
    }

    async fn lpush(&self, key: &str, items: &[String]) -> Result<u64> {
        self.query(cmd("LPUSH").arg(key).arg(items)).await
    }

    async fn rpush(&self, key: &str, items: &[String]) -> Result<u64> {
        self.query(cmd("RPUSH").arg(key).arg(items)).await
    }

    async fn lpop(&self, key: &str) -> Result<Option<String>> {
        self.query(cmd("LPOP").arg(key)).await
    }

    async fn rpop(&self, key: &str) -> Result<Option<String>> {
        self.query(cmd("RPOP").arg(key)).await
    }

    async fn rpoplpush(&self, source: &str, destination: &str) -> Result<Option<String>> {
        self.query(cmd("RPOPLPUSH").arg(source).arg(destination))
            .await
    }

    async fn sadd(&self, key: &str, members: &[String]) -> Result<u64> {
        self.query(cmd("SADD").arg(key).arg(members)).await
    }

    async fn srem(&self, key: &str, members: &[String]) -> Result<u64> {
        self.query(cmd("SREM").arg(key).arg(members)).await
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        self.query(cmd("SISMEMBER").arg(key).arg(member)).await
    }

    async fn spop(&self, key: &str) -> Result<Option<String>> {
        self.query(cmd("SPOP").arg(key)).await
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        self.query(cmd("SMEMBERS").arg(key)).await
    }

    async fn zadd(&self, key: &str, members: &[(f64, String)]) -> Result<u64> {
        let mut c = cmd("ZADD");
        c.arg(key);
        for (score, member) in members {
            c.arg(bound(*score)).arg(member);
        }
        self.query(&c).await
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>> {
        self.query(cmd("ZSCORE").arg(key).arg(member)).await
    }

    async fn zrem(&self, key: &str, members: &[String]) -> Result<u64> {
        self.query(cmd("ZREM").arg(key).arg(members)).await
    }

    async fn zcard(&self, key: &str) -> Result<u64> {
        self.query(cmd("ZCARD").arg(key)).await
    }

    async fn zcount(&self, key: &str, min: f64, max: f64) -> Result<u64> {
        self.query(cmd("ZCOUNT").arg(key).arg(bound(min)).arg(bound(max)))
            .await
    }

    async fn zrangebyscore_with_scores(
        &self,
        key: &str,
        min: f64,
        max: f64,
        offset: usize,
        count: usize,
    ) -> Result<Vec<(String, f64)>> {
        self.query(
            cmd("ZRANGEBYSCORE")
                .arg(key)
                .arg(bound(min))
                .arg(bound(max))
                .arg("WITHSCORES")
                .arg("LIMIT")
                .arg(offset)
                .arg(count),
        )
        .await
    }

    async fn zremrangebyrank(&self, key: &str, start: i64, stop: i64) -> Result<u64> {
        self.query(cmd("ZREMRANGEBYRANK").arg(key).arg(start).arg(stop))
            .await
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<bool> {
        self.query(cmd("HSET").arg(key).arg(field).arg(value)).await
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<u64> {
        self.query(cmd("HDEL").arg(key).arg(field)).await
    }

    async fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>> {
        self.query(cmd("HGETALL").arg(key)).await
    }

    async fn del(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.query(cmd("DEL").arg(keys)).await
    }

    async fn eval(&self, call: &ScriptCall) -> Result<Reply> {
        let script = self.script(call.script)?;
        let mut invocation = script.prepare_invoke();
        for key in &call.keys {
            invocation.key(key);
        }
        for arg in &call.args {
            invocation.arg(arg);
        }
        let mut conn = self.conn.clone();
        let value: Value = invocation.invoke_async(&mut conn).await?;
        to_reply(value)
    }

    async fn execute(&self, pipeline: Pipeline) -> Result<Vec<Reply>> {
        if pipeline.is_empty() {
            return Ok(Vec::new());
        }
        let mut pipe = ::redis::pipe();
        for command in pipeline.into_commands() {
            match command {
                Command::LPush { key, items } => {
                    pipe.cmd("LPUSH").arg(key).arg(items);
                }
                Command::RPop { key } => {
                    pipe.cmd("RPOP").arg(key);
                }
                Command::SPop { key } => {
                    pipe.cmd("SPOP").arg(key);
                }
                Command::Del { key } => {
                    pipe.cmd("DEL").arg(key);
                }
                Command::HDel { key, field } => {
                    pipe.cmd("HDEL").arg(key).arg(field);
                }
                Command::ZScore { key, member } => {
                    pipe.cmd("ZSCORE").arg(key).arg(member);
                }
                Command::ZAdd { key, members } => {
                    let c = pipe.cmd("ZADD").arg(key);
                    for (score, member) in members {
                        c.arg(bound(score)).arg(member);
                    }
                }
                Command::Script(call) => {
                    let script = self.script(call.script)?;
                    pipe.cmd("EVALSHA")
                        .arg(script.get_hash())
                        .arg(call.keys.len())
                        .arg(call.keys)
                        .arg(call.args);
                }
            }
        }
        let mut conn = self.conn.clone();
        let values: Vec<Value> = pipe.query_async(&mut conn).await?;
        values.into_iter().map(to_reply).collect()
    }

    async fn wait_replicas(&self, required: u32, timeout_ms: u64) -> Result<u32> {
        let acked: i64 = self
            .query(cmd("WAIT").arg(required).arg(timeout_ms))
            .await?;
        Ok(u32::try_from(acked).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infinite_bounds_use_server_spelling() {
        assert_eq!(bound(f64::NEG_INFINITY), "-inf");
        assert_eq!(bound(f64::INFINITY), "+inf");
        assert_eq!(bound(1444222459.0), "1444222459");
        assert_eq!(bound(1444223059.1), "1444223059.1");
    }

    #[test]
    fn script_reply_arrays_flatten_to_items() {
        let value = Value::Array(vec![
            Value::BulkString(b"1".to_vec()),
            Value::BulkString(b"2".to_vec()),
        ]);
        assert_eq!(
            to_reply(value).unwrap(),
            Reply::Array(vec!["1".to_string(), "2".to_string()])
        );
        assert_eq!(to_reply(Value::Nil).unwrap(), Reply::Nil);
    }

    #[test]
    fn non_utf8_items_are_rejected_not_rewritten() {
        let value = Value::Array(vec![
            Value::BulkString(b"ok".to_vec()),
            Value::BulkString(vec![0xff, 1, 2]),
        ]);
        let err = to_reply(value).unwrap_err();
        assert!(matches!(err, Error::Store(_)), "{err}");
        assert!(to_reply(Value::BulkString(vec![0xc3])).is_err());
    }
}
