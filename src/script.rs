//! Server-side atomic procedures.
//!
//! Every step that must not interleave with other clients (lease, ack,
//! reject, re-enqueue, pool lease renewal) runs as one Lua script. The
//! store guarantees a script runs to completion before any other command.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Script {
    /// KEYS: queue, processing, timeouts. ARGV: size, time.
    QueueGet,
    /// KEYS: processing, timeouts. ARGV: item.
    QueueAck,
    /// KEYS: queue, processing, timeouts. ARGV: item.
    QueueReject,
    /// KEYS: queue, processing, timeouts. Returns the number of items moved.
    QueueReEnqueue,
    /// KEYS: queue, set. ARGV: item.
    UniqueQueueAdd,
    /// KEYS: queue, set, processing, timeouts. ARGV: size, time.
    UniqueQueueGet,
    /// KEYS: queue, set, processing, timeouts. ARGV: item.
    UniqueQueueReject,
    /// KEYS: queue, set, processing, timeouts. Returns the number of items moved.
    UniqueQueueReEnqueue,
    /// KEYS: pool. ARGV: size, time, ack TTL.
    PoolGet,
    /// KEYS: pool. ARGV: item, valid-until.
    PoolAck,
    /// KEYS: pool. ARGV: item.
    PoolRemove,
}

impl Script {
    pub const ALL: [Script; 11] = [
        Script::QueueGet,
        Script::QueueAck,
        Script::QueueReject,
        Script::QueueReEnqueue,
        Script::UniqueQueueAdd,
        Script::UniqueQueueGet,
        Script::UniqueQueueReject,
        Script::UniqueQueueReEnqueue,
        Script::PoolGet,
        Script::PoolAck,
        Script::PoolRemove,
    ];

    pub fn lua(self) -> &'static str {
        match self {
            Script::QueueGet => include_str!("script/queue_get.lua"),
            Script::QueueAck => include_str!("script/queue_ack.lua"),
            Script::QueueReject => include_str!("script/queue_reject.lua"),
            Script::QueueReEnqueue => include_str!("script/queue_re_enqueue.lua"),
            Script::UniqueQueueAdd => include_str!("script/unique_queue_add.lua"),
            Script::UniqueQueueGet => include_str!("script/unique_queue_get.lua"),
            Script::UniqueQueueReject => include_str!("script/unique_queue_reject.lua"),
            Script::UniqueQueueReEnqueue => include_str!("script/unique_queue_re_enqueue.lua"),
            Script::PoolGet => include_str!("script/pool_get.lua"),
            Script::PoolAck => include_str!("script/pool_ack.lua"),
            Script::PoolRemove => include_str!("script/pool_remove.lua"),
        }
    }

    pub fn key_count(self) -> usize {
        match self {
            Script::PoolGet | Script::PoolAck | Script::PoolRemove => 1,
            Script::QueueAck | Script::UniqueQueueAdd => 2,
            Script::QueueGet | Script::QueueReject | Script::QueueReEnqueue => 3,
            Script::UniqueQueueGet | Script::UniqueQueueReject | Script::UniqueQueueReEnqueue => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Script::QueueGet => "queue_get",
            Script::QueueAck => "queue_ack",
            Script::QueueReject => "queue_reject",
            Script::QueueReEnqueue => "queue_re_enqueue",
            Script::UniqueQueueAdd => "unique_queue_add",
            Script::UniqueQueueGet => "unique_queue_get",
            Script::UniqueQueueReject => "unique_queue_reject",
            Script::UniqueQueueReEnqueue => "unique_queue_re_enqueue",
            Script::PoolGet => "pool_get",
            Script::PoolAck => "pool_ack",
            Script::PoolRemove => "pool_remove",
        }
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One invocation of a [`Script`]: its key parameters and scalar arguments,
/// already rendered as strings.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptCall {
    pub script: Script,
    pub keys: Vec<String>,
    pub args: Vec<String>,
}

impl ScriptCall {
    fn new(script: Script, keys: &[&str], args: Vec<String>) -> Self {
        debug_assert_eq!(keys.len(), script.key_count());
        Self {
            script,
            keys: keys.iter().map(|k| k.to_string()).collect(),
            args,
        }
    }

    pub fn queue_get(queue: &str, processing: &str, timeouts: &str, size: usize, time: f64) -> Self {
        Self::new(
            Script::QueueGet,
            &[queue, processing, timeouts],
            vec![size.to_string(), time.to_string()],
        )
    }

    pub fn queue_ack(processing: &str, timeouts: &str, item: &str) -> Self {
        Self::new(Script::QueueAck, &[processing, timeouts], vec![item.to_string()])
    }

    pub fn queue_reject(queue: &str, processing: &str, timeouts: &str, item: &str) -> Self {
        Self::new(
            Script::QueueReject,
            &[queue, processing, timeouts],
            vec![item.to_string()],
        )
    }

    pub fn queue_re_enqueue(queue: &str, processing: &str, timeouts: &str) -> Self {
        Self::new(Script::QueueReEnqueue, &[queue, processing, timeouts], Vec::new())
    }

    pub fn unique_queue_add(queue: &str, set: &str, item: &str) -> Self {
        Self::new(Script::UniqueQueueAdd, &[queue, set], vec![item.to_string()])
    }

    pub fn unique_queue_get(
        queue: &str,
        set: &str,
        processing: &str,
        timeouts: &str,
        size: usize,
        time: f64,
    ) -> Self {
        Self::new(
            Script::UniqueQueueGet,
            &[queue, set, processing, timeouts],
            vec![size.to_string(), time.to_string()],
        )
    }

    pub fn unique_queue_reject(
        queue: &str,
        set: &str,
        processing: &str,
        timeouts: &str,
        item: &str,
    ) -> Self {
        Self::new(
            Script::UniqueQueueReject,
            &[queue, set, processing, timeouts],
            vec![item.to_string()],
        )
    }

    pub fn unique_queue_re_enqueue(queue: &str, set: &str, processing: &str, timeouts: &str) -> Self {
        Self::new(
            Script::UniqueQueueReEnqueue,
            &[queue, set, processing, timeouts],
            Vec::new(),
        )
    }

    pub fn pool_get(pool: &str, size: usize, time: i64, ack_ttl: u64) -> Self {
        Self::new(
            Script::PoolGet,
            &[pool],
            vec![size.to_string(), time.to_string(), ack_ttl.to_string()],
        )
    }

    pub fn pool_ack(pool: &str, item: &str, valid_until: i64) -> Self {
        Self::new(
            Script::PoolAck,
            &[pool],
            vec![item.to_string(), valid_until.to_string()],
        )
    }

    pub fn pool_remove(pool: &str, item: &str) -> Self {
        Self::new(Script::PoolRemove, &[pool], vec![item.to_string()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_script_declares_its_keys() {
        for script in Script::ALL {
            let lua = script.lua();
            for i in 1..=script.key_count() {
                assert!(lua.contains(&format!("KEYS[{i}]")), "{script} misses KEYS[{i}]");
            }
            let past = script.key_count() + 1;
            assert!(!lua.contains(&format!("KEYS[{past}]")), "{script} reads KEYS[{past}]");
        }
    }

    #[test]
    fn queue_get_renders_precise_time() {
        let call = ScriptCall::queue_get("q", "q-processing-h[1][2]", "q-timeouts", 5, 1_444_222_459.1847);
        assert_eq!(call.keys, vec!["q", "q-processing-h[1][2]", "q-timeouts"]);
        assert_eq!(call.args, vec!["5", "1444222459.1847"]);
    }

    #[test]
    fn pool_ack_renders_integral_deadline() {
        let call = ScriptCall::pool_ack("p", "7", 1_444_352_059);
        assert_eq!(call.script, Script::PoolAck);
        assert_eq!(call.args, vec!["7", "1444352059"]);
    }

    #[test]
    fn unique_scripts_put_set_second() {
        let call = ScriptCall::unique_queue_reject("q", "q-unique", "proc", "q-timeouts", "a");
        assert_eq!(call.keys[1], "q-unique");
        assert_eq!(call.script.key_count(), 4);
    }
}
