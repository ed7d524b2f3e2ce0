//! Chunked and pipelined dispatch shared by the primitives.

use opentelemetry::KeyValue;

use crate::error::{Error, Result};
use crate::script::ScriptCall;
use crate::store::{Pipeline, Store};
use crate::telemetry::metrics;

/// Splits a request for `size` items into calls of at most `max` items.
///
/// `chunk_steps(250, 100)` is `[100, 100, 50]`.
pub fn chunk_steps(size: usize, max: usize) -> Vec<usize> {
    if size == 0 || max == 0 {
        return Vec::new();
    }
    let mut steps = vec![max; size / max];
    if size % max != 0 {
        steps.push(size % max);
    }
    steps
}

/// Pipelines one script call per item.
///
/// A pipeline that hits a cold script cache is recovered by running the
/// first call alone through `eval`, which loads the script, then pipelining
/// the rest again. Any other failure is returned unchanged.
pub async fn run_scripts(store: &dyn Store, calls: &[ScriptCall]) -> Result<()> {
    let mut rest = calls;
    while let Some((first, tail)) = rest.split_first() {
        let mut pipe = Pipeline::new();
        for call in rest {
            pipe.script(call.clone());
        }
        match store.execute(pipe).await {
            Ok(_) => return Ok(()),
            Err(Error::ScriptNotLoaded(reason)) => {
                tracing::warn!(
                    script = first.script.name(),
                    remaining = tail.len(),
                    %reason,
                    "script not cached, running first call alone"
                );
                metrics::script_cache_misses()
                    .add(1, &[KeyValue::new("script", first.script.name())]);
                store.eval(first).await?;
                rest = tail;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
