//! Error types for redq.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Caller input rejected before any store call (empty item, zero size).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unknown option: \"{0}\"")]
    UnknownOption(String),

    /// The write reached the primary but too few replicas acknowledged it
    /// in time. The mutation is not rolled back.
    #[error("Required: {required}, synced: {synced}")]
    NotEnoughReplicasSynced { required: u32, synced: u32 },

    /// The store has not cached the script yet (NOSCRIPT).
    #[error("script not loaded: {0}")]
    ScriptNotLoaded(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Transport-level faults, the only class worth retrying blindly.
    pub fn is_connection_fault(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// A replica-sync shortfall: the operation itself took effect.
    pub fn is_durability_warning(&self) -> bool {
        matches!(self, Error::NotEnoughReplicasSynced { .. })
    }
}

impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        if e.kind() == redis::ErrorKind::NoScriptError {
            Error::ScriptNotLoaded(e.to_string())
        } else if e.is_io_error()
            || e.is_connection_dropped()
            || e.is_connection_refusal()
            || e.is_timeout()
        {
            Error::Connection(e.to_string())
        } else {
            Error::Store(e.to_string())
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
