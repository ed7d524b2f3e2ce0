//! Per-primitive options.
//!
//! Building the structs in Rust rejects unknown fields at compile time.
//! Option files are TOML; any key outside the recognized set fails with
//! [`Error::UnknownOption`] before anything is constructed.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Wait-for-replicas policy applied after every mutating call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicaSyncOptions {
    pub enabled: bool,
    /// Replicas that must acknowledge a write.
    pub required_count: u32,
    /// How long WAIT may block, in milliseconds.
    pub timeout_ms: u64,
}

impl ReplicaSyncOptions {
    const KEYS: &'static [&'static str] = &["enabled", "required_count", "timeout_ms"];

    pub fn required(count: u32) -> Self {
        Self {
            enabled: true,
            required_count: count,
            ..Self::default()
        }
    }
}

impl Default for ReplicaSyncOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            required_count: 0,
            timeout_ms: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueOptions {
    pub add_max_chunk_size: usize,
    pub get_max_chunk_size: usize,
    pub del_max_chunk_size: usize,
    pub processing_suffix: String,
    /// Seconds a lease may stay untouched before it counts as timed out.
    pub processing_timeout: u64,
    pub timeouts_suffix: String,
    pub replica_sync: ReplicaSyncOptions,
}

impl QueueOptions {
    const KEYS: &'static [&'static str] = &[
        "add_max_chunk_size",
        "get_max_chunk_size",
        "del_max_chunk_size",
        "processing_suffix",
        "processing_timeout",
        "timeouts_suffix",
        "replica_sync",
    ];

    pub fn from_toml_str(s: &str) -> Result<Self> {
        Self::from_table(s.parse()?)
    }

    pub fn from_table(table: toml::Table) -> Result<Self> {
        let options: Self = parse_section(table, Self::KEYS)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        positive("add_max_chunk_size", self.add_max_chunk_size)?;
        positive("get_max_chunk_size", self.get_max_chunk_size)?;
        positive("del_max_chunk_size", self.del_max_chunk_size)
    }
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            add_max_chunk_size: 100,
            get_max_chunk_size: 100,
            del_max_chunk_size: 1000,
            processing_suffix: "-processing".to_string(),
            processing_timeout: 7200,
            timeouts_suffix: "-timeouts".to_string(),
            replica_sync: ReplicaSyncOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UniqueQueueOptions {
    pub get_max_chunk_size: usize,
    pub del_max_chunk_size: usize,
    pub unique_suffix: String,
    pub processing_suffix: String,
    pub processing_timeout: u64,
    pub timeouts_suffix: String,
    pub replica_sync: ReplicaSyncOptions,
}

impl UniqueQueueOptions {
    const KEYS: &'static [&'static str] = &[
        "get_max_chunk_size",
        "del_max_chunk_size",
        "unique_suffix",
        "processing_suffix",
        "processing_timeout",
        "timeouts_suffix",
        "replica_sync",
    ];

    pub fn from_toml_str(s: &str) -> Result<Self> {
        Self::from_table(s.parse()?)
    }

    pub fn from_table(table: toml::Table) -> Result<Self> {
        let options: Self = parse_section(table, Self::KEYS)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        positive("get_max_chunk_size", self.get_max_chunk_size)?;
        positive("del_max_chunk_size", self.del_max_chunk_size)
    }
}

impl Default for UniqueQueueOptions {
    fn default() -> Self {
        Self {
            get_max_chunk_size: 100,
            del_max_chunk_size: 1000,
            unique_suffix: "-unique".to_string(),
            processing_suffix: "-processing".to_string(),
            processing_timeout: 7200,
            timeouts_suffix: "-timeouts".to_string(),
            replica_sync: ReplicaSyncOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolOptions {
    pub add_max_chunk_size: usize,
    pub get_max_chunk_size: usize,
    pub ack_max_chunk_size: usize,
    pub del_max_chunk_size: usize,
    /// Seconds a leased item stays invisible before it is due again.
    pub ack_ttl: u64,
    /// Seconds an acknowledged item rests before its next processing.
    pub ack_valid_for: u64,
    /// Items count as due when their score is at most `now - offset`.
    pub process_time_offset: u64,
    pub replica_sync: ReplicaSyncOptions,
}

impl PoolOptions {
    const KEYS: &'static [&'static str] = &[
        "add_max_chunk_size",
        "get_max_chunk_size",
        "ack_max_chunk_size",
        "del_max_chunk_size",
        "ack_ttl",
        "ack_valid_for",
        "process_time_offset",
        "replica_sync",
    ];

    pub fn from_toml_str(s: &str) -> Result<Self> {
        Self::from_table(s.parse()?)
    }

    pub fn from_table(table: toml::Table) -> Result<Self> {
        let options: Self = parse_section(table, Self::KEYS)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        positive("add_max_chunk_size", self.add_max_chunk_size)?;
        positive("get_max_chunk_size", self.get_max_chunk_size)?;
        positive("ack_max_chunk_size", self.ack_max_chunk_size)?;
        positive("del_max_chunk_size", self.del_max_chunk_size)
    }
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            add_max_chunk_size: 100,
            get_max_chunk_size: 100,
            ack_max_chunk_size: 500,
            del_max_chunk_size: 100,
            ack_ttl: 600,
            ack_valid_for: 129_600,
            process_time_offset: 0,
            replica_sync: ReplicaSyncOptions::default(),
        }
    }
}

/// One options file covering all three primitives.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptionsFile {
    pub queue: QueueOptions,
    pub unique_queue: UniqueQueueOptions,
    pub pool: PoolOptions,
}

impl OptionsFile {
    const KEYS: &'static [&'static str] = &["queue", "unique_queue", "pool"];

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut table: toml::Table = s.parse()?;
        check_keys(&table, Self::KEYS)?;

        let mut file = Self::default();
        if let Some(section) = take_table(&mut table, "queue")? {
            file.queue = QueueOptions::from_table(section)?;
        }
        if let Some(section) = take_table(&mut table, "unique_queue")? {
            file.unique_queue = UniqueQueueOptions::from_table(section)?;
        }
        if let Some(section) = take_table(&mut table, "pool")? {
            file.pool = PoolOptions::from_table(section)?;
        }
        Ok(file)
    }
}

fn parse_section<T: DeserializeOwned>(table: toml::Table, keys: &[&str]) -> Result<T> {
    check_keys(&table, keys)?;
    if let Some(toml::Value::Table(sync)) = table.get("replica_sync") {
        check_keys(sync, ReplicaSyncOptions::KEYS)?;
    }
    Ok(toml::Value::Table(table).try_into()?)
}

fn check_keys(table: &toml::Table, known: &[&str]) -> Result<()> {
    match table.keys().find(|key| !known.contains(&key.as_str())) {
        Some(key) => Err(Error::UnknownOption(key.clone())),
        None => Ok(()),
    }
}

fn take_table(table: &mut toml::Table, key: &str) -> Result<Option<toml::Table>> {
    match table.remove(key) {
        None => Ok(None),
        Some(toml::Value::Table(section)) => Ok(Some(section)),
        Some(other) => Err(Error::Config(format!(
            "[{key}] must be a table, got {}",
            other.type_str()
        ))),
    }
}

fn positive(name: &str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(Error::InvalidArgument(format!("{name} must be larger than zero")));
    }
    Ok(())
}
