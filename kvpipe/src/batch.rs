//! # Batch Pipeline Executor
//!
//! Splits a key sequence into partitions of at most `partition_size` keys.
//! Each partition costs one session and one round trip:
//!
//! ```text
//! keys ─► [p0][p1][p2] ...
//!          │
//!          ├─ acquire session, open pipeline
//!          ├─ issue(pipeline, key) for each key, in order
//!          ├─ sync (single round trip)
//!          ├─ resolve + decode each response
//!          └─ release session, merge into result
//! ```
//!
//! A failing partition is reported to the exception handler and contributes
//! nothing; the partitions after it still run. Callers that need every key
//! must compare the result's key set with their input.

use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::hash::Hash;

use kvpipe_client::Endpoint;
use tracing::{debug, warn};

use crate::error::{HelperError, HelperResult};
use crate::helper::KvHelper;
use crate::pipeline::{Pipeline, Response};
use crate::profiler::PIPELINE;
use crate::session::{Session, SessionPool};

impl<P: SessionPool> KvHelper<P> {
    /// Pipelines one command per key and maps each key to its reply.
    ///
    /// `issue` may return `None` to skip a key; skipped keys are absent from
    /// the result.
    pub fn pipeline<K, V, I, F>(&self, keys: I, issue: F) -> HashMap<K, V>
    where
        I: IntoIterator<Item = K>,
        K: Eq + Hash,
        F: FnMut(&mut Pipeline<'_, P::Session>, &K) -> Option<Response<V>>,
    {
        self.pipeline_with(keys, issue, Ok::<V, Infallible>)
    }

    /// Like `pipeline`, additionally running each reply through `decode`.
    /// A decode error fails the whole partition it belongs to.
    pub fn pipeline_with<K, V, T, E, I, F, D>(&self, keys: I, mut issue: F, mut decode: D) -> HashMap<K, T>
    where
        I: IntoIterator<Item = K>,
        K: Eq + Hash,
        F: FnMut(&mut Pipeline<'_, P::Session>, &K) -> Option<Response<V>>,
        D: FnMut(V) -> Result<T, E>,
        E: fmt::Display,
    {
        let mut keys = keys.into_iter();
        let mut result = HashMap::with_capacity(keys.size_hint().0);
        let partition_size = self.config.partition_size();

        let mut partition_index = 0usize;
        loop {
            let chunk: Vec<K> = keys.by_ref().take(partition_size).collect();
            if chunk.is_empty() {
                break;
            }

            let watch = self.config.watch_start(PIPELINE);
            let pool = self.pool();
            let mut endpoint = None;
            let chunk_len = chunk.len();

            match run_partition(&pool, &mut endpoint, chunk, &mut issue, &mut decode) {
                Ok(resolved) => {
                    debug!(partition = partition_index, keys = chunk_len, resolved = resolved.len(), "pipeline partition synced");
                    self.config.watch_stop(watch, PIPELINE, &pool, endpoint.as_ref(), None);
                    result.extend(resolved);
                }
                Err(err) => {
                    warn!(partition = partition_index, keys = chunk_len, error = %err, "pipeline partition dropped");
                    self.config.report(&pool, &err);
                    self.config.watch_stop(watch, PIPELINE, &pool, endpoint.as_ref(), Some(&err));
                }
            }
            partition_index += 1;
        }

        result
    }
}

/// Runs one partition start to finish on its own session.
fn run_partition<P, K, V, T, E, F, D>(
    pool: &P,
    endpoint: &mut Option<Endpoint>,
    chunk: Vec<K>,
    issue: &mut F,
    decode: &mut D,
) -> HelperResult<Vec<(K, T)>>
where
    P: SessionPool,
    F: FnMut(&mut Pipeline<'_, P::Session>, &K) -> Option<Response<V>>,
    D: FnMut(V) -> Result<T, E>,
    E: fmt::Display,
{
    let mut session = pool.acquire().map_err(HelperError::from_acquire)?;
    *endpoint = session.endpoint();

    let mut pipeline = session.pipelined();
    let mut pending = Vec::with_capacity(chunk.len());
    for key in chunk {
        if let Some(response) = issue(&mut pipeline, &key) {
            pending.push((key, response));
        }
    }
    pipeline.sync()?;

    pending
        .into_iter()
        .map(|(key, response)| {
            let value = response.get()?;
            let decoded = decode(value).map_err(|err| HelperError::Decode(err.to_string()))?;
            Ok((key, decoded))
        })
        .collect()
}
