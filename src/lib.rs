//! # redq
//!
//! Redis-backed work distribution for many concurrent consumers.
//!
//! Three primitives share one store: [`Queue`] (FIFO with per-consumer
//! leases and crash recovery), [`UniqueQueue`] (the same, holding each item
//! at most once) and [`Pool`] (items processed over and over, keyed by due
//! time). Every step that must not interleave with other clients runs as an
//! atomic server-side script.

pub mod batch;
pub mod clock;
pub mod config;
pub mod error;
pub mod identity;
pub mod pool;
pub mod queue;
pub mod retry;
pub mod script;
pub mod store;
pub mod sync;
pub mod telemetry;
pub mod unique_queue;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{Error, Result};
pub use pool::Pool;
pub use queue::Queue;
pub use store::{MemoryStore, RedisStore, Store};
pub use unique_queue::UniqueQueue;
