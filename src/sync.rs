//! Replica sync after writes.
//!
//! When enabled, every mutating primitive call ends with a WAIT for the
//! configured number of replicas. A short count is reported as
//! [`Error::NotEnoughReplicasSynced`]; the write itself has already been
//! applied on the primary and stays applied.

use opentelemetry::KeyValue;

use crate::config::ReplicaSyncOptions;
use crate::error::{Error, Result};
use crate::store::Store;
use crate::telemetry::metrics;

pub async fn wait_for_replicas(store: &dyn Store, options: &ReplicaSyncOptions) -> Result<()> {
    if !options.enabled {
        return Ok(());
    }
    let synced = store
        .wait_replicas(options.required_count, options.timeout_ms)
        .await?;
    if synced < options.required_count {
        tracing::warn!(
            required = options.required_count,
            synced,
            timeout_ms = options.timeout_ms,
            "not enough replicas acknowledged the write"
        );
        metrics::replica_sync_shortfalls().add(
            1,
            &[KeyValue::new("required", i64::from(options.required_count))],
        );
        return Err(Error::NotEnoughReplicasSynced {
            required: options.required_count,
            synced,
        });
    }
    Ok(())
}

/// Downgrades a replica-sync shortfall to a logged warning.
///
/// For callers that only need the write to reach the primary.
pub trait DurabilityExt<T> {
    fn warn_on_shortfall(self) -> Result<Option<T>>;
}

impl<T> DurabilityExt<T> for Result<T> {
    fn warn_on_shortfall(self) -> Result<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_durability_warning() => {
                tracing::warn!(error = %e, "write applied without replica confirmation");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn disabled_sync_never_waits() {
        let store = MemoryStore::with_replicas(0);
        let options = ReplicaSyncOptions {
            enabled: false,
            required_count: 5,
            timeout_ms: 10,
        };
        wait_for_replicas(&store, &options).await.unwrap();
    }

    #[tokio::test]
    async fn shortfall_reports_both_counts() {
        let store = MemoryStore::with_replicas(1);
        let err = wait_for_replicas(&store, &ReplicaSyncOptions::required(3))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::NotEnoughReplicasSynced {
                required: 3,
                synced: 1
            }
        ));
    }

    #[tokio::test]
    async fn enough_replicas_pass() {
        let store = MemoryStore::with_replicas(2);
        wait_for_replicas(&store, &ReplicaSyncOptions::required(2))
            .await
            .unwrap();
    }

    #[test]
    fn shortfall_downgrades_but_other_errors_do_not() {
        let short: Result<()> = Err(Error::NotEnoughReplicasSynced {
            required: 1,
            synced: 0,
        });
        assert_eq!(short.warn_on_shortfall().unwrap(), None);

        let ok: Result<u8> = Ok(4);
        assert_eq!(ok.warn_on_shortfall().unwrap(), Some(4));

        let broken: Result<()> = Err(Error::Connection("reset".into()));
        assert!(broken.warn_on_shortfall().is_err());
    }
}
