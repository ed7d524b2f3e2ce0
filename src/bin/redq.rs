//! redq CLI: operator interface to queues and pools in Redis.
//!
//! Items leased with `get` belong to this process's consumer identity and
//! stay leased until a reclaim command returns them.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use redq::config::{Config, ExposeSecret};
use redq::retry::{RetryObserver, RetryPolicy, with_retry};
use redq::telemetry::{TelemetryConfig, init_telemetry};
use redq::{Error, Pool, Queue, RedisStore, Store, UniqueQueue};

#[derive(Parser)]
#[command(name = "redq", about = "Inspect and operate redq queues and pools")]
struct Cli {
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// FIFO queue operations
    Queue {
        name: String,
        #[command(subcommand)]
        action: QueueAction,
    },
    /// Unique queue operations
    UniqueQueue {
        name: String,
        #[command(subcommand)]
        action: QueueAction,
    },
    /// Pool operations
    Pool {
        name: String,
        #[command(subcommand)]
        action: PoolAction,
    },
}

#[derive(Subcommand)]
enum QueueAction {
    /// Number of items waiting in the backlog
    Count,
    /// Enqueue items
    Add {
        #[arg(required = true)]
        items: Vec<String>,
    },
    /// Lease up to SIZE items to this process
    Get { size: usize },
    /// Return items of stale leases to the queue
    ReenqueueTimedOut {
        /// Lease age in seconds (defaults to the configured processing timeout)
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Return items of every lease to the queue
    ReenqueueAll,
    /// Delete stale leases without returning their items
    DropTimedOut {
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Delete every lease without returning its items
    DropAll,
    /// Delete every lease and the whole backlog
    Clear,
}

#[derive(Subcommand)]
enum PoolAction {
    /// Number of items in the pool
    Count,
    /// Number of items due now
    CountToProcess,
    /// Add items, due immediately
    Add {
        #[arg(required = true)]
        items: Vec<String>,
    },
    /// Lease up to SIZE due items
    Get { size: usize },
    /// Check membership of items
    Contains {
        #[arg(required = true)]
        items: Vec<String>,
    },
    /// Remove currently leased items
    Remove {
        #[arg(required = true)]
        items: Vec<String>,
    },
    /// Remove every item
    Clear,
}

impl QueueAction {
    /// Whether running the verb twice leaves the same state as once.
    ///
    /// A retry after a dropped connection may repeat a call the server
    /// already applied, so `add` and `get` are never retried.
    fn retry_safe(&self) -> bool {
        !matches!(self, QueueAction::Add { .. } | QueueAction::Get { .. })
    }
}

impl PoolAction {
    /// `add` only resets due times, so repeating it is harmless. `get`
    /// would lease a second batch.
    fn retry_safe(&self) -> bool {
        !matches!(self, PoolAction::Get { .. })
    }
}

/// Retries connection faults for verbs that tolerate repetition.
fn policy_for(retry_safe: bool) -> RetryPolicy {
    if retry_safe {
        RetryPolicy::default()
    } else {
        RetryPolicy::no_delay(1)
    }
}

enum Output {
    Count(u64),
    Items(Vec<String>),
    Moved(u64),
    Membership(Vec<(String, bool)>),
    Done,
}

struct LogRetries;

impl RetryObserver for LogRetries {
    fn on_failure(&self, attempt: u32, error: &Error) {
        if error.is_connection_fault() {
            tracing::warn!(attempt, %error, "store call failed");
        }
    }
}

/// Runs one call through the retry wrapper.
macro_rules! retried {
    ($policy:expr, $call:expr) => {
        with_retry($policy, &LogRetries, || $call).await?
    };
}

/// Queue and UniqueQueue share the same verbs.
macro_rules! run_queue_action {
    ($queue:expr, $action:expr, $policy:expr) => {{
        let queue = $queue;
        let policy = $policy;
        match $action {
            QueueAction::Count => Output::Count(retried!(policy, queue.count())),
            QueueAction::Add { items } => {
                retried!(policy, queue.add_items(&items));
                Output::Done
            }
            QueueAction::Get { size } => Output::Items(retried!(policy, queue.get_items(size))),
            QueueAction::ReenqueueTimedOut { timeout } => {
                Output::Moved(retried!(policy, queue.re_enqueue_timed_out_items(timeout)))
            }
            QueueAction::ReenqueueAll => {
                Output::Moved(retried!(policy, queue.re_enqueue_all_items()))
            }
            QueueAction::DropTimedOut { timeout } => {
                Output::Moved(retried!(policy, queue.drop_timed_out_items(timeout)))
            }
            QueueAction::DropAll => Output::Moved(retried!(policy, queue.drop_all_items())),
            QueueAction::Clear => {
                retried!(policy, queue.clear_queue());
                Output::Done
            }
        }
    }};
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::from_env()?;
    let _telemetry = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "redq".to_string(),
        log_level: config.log_level.clone(),
    })?;
    let options = config.load_options()?;
    let store: Arc<dyn Store> =
        Arc::new(RedisStore::connect(config.redis_url.expose_secret()).await?);

    let output = match cli.command {
        Command::Queue { name, action } => {
            let queue = Queue::new(store, name, options.queue)?;
            let policy = policy_for(action.retry_safe());
            run_queue_action!(&queue, action, &policy)
        }
        Command::UniqueQueue { name, action } => {
            let queue = UniqueQueue::new(store, name, options.unique_queue)?;
            let policy = policy_for(action.retry_safe());
            run_queue_action!(&queue, action, &policy)
        }
        Command::Pool { name, action } => {
            let pool = Pool::new(store, name, options.pool)?;
            let policy = policy_for(action.retry_safe());
            run_pool_action(&pool, action, &policy).await?
        }
    };

    print_output(output, cli.json)?;
    Ok(())
}

async fn run_pool_action(
    pool: &Pool,
    action: PoolAction,
    policy: &RetryPolicy,
) -> redq::Result<Output> {
    Ok(match action {
        PoolAction::Count => Output::Count(retried!(policy, pool.count())),
        PoolAction::CountToProcess => Output::Count(retried!(policy, pool.count_to_process())),
        PoolAction::Add { items } => {
            retried!(policy, pool.add_items(&items));
            Output::Done
        }
        PoolAction::Get { size } => Output::Items(retried!(policy, pool.get_items(size))),
        PoolAction::Contains { items } => {
            Output::Membership(retried!(policy, pool.is_in_pool_many(&items)))
        }
        PoolAction::Remove { items } => {
            retried!(policy, pool.remove_items(&items));
            Output::Done
        }
        PoolAction::Clear => {
            retried!(policy, pool.clear_pool());
            Output::Done
        }
    })
}

fn print_output(output: Output, json: bool) -> anyhow::Result<()> {
    if json {
        let value = match output {
            Output::Count(n) => serde_json::json!({ "count": n }),
            Output::Items(items) => serde_json::json!({ "items": items }),
            Output::Moved(n) => serde_json::json!({ "affected": n }),
            Output::Membership(members) => {
                let map: serde_json::Map<String, serde_json::Value> = members
                    .into_iter()
                    .map(|(item, present)| (item, serde_json::Value::Bool(present)))
                    .collect();
                serde_json::Value::Object(map)
            }
            Output::Done => serde_json::json!({ "ok": true }),
        };
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    match output {
        Output::Count(n) | Output::Moved(n) => println!("{n}"),
        Output::Items(items) => {
            for item in items {
                println!("{item}");
            }
        }
        Output::Membership(members) => {
            for (item, present) in members {
                println!("{item}\t{}", if present { "yes" } else { "no" });
            }
        }
        Output::Done => println!("ok"),
    }
    Ok(())
}
