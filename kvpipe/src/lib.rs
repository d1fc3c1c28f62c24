//! # kvpipe
//!
//! Purpose: A resilience and batching layer over a pooled key-value client.
//! Every operation checks a session out of the pool, uses it, and releases
//! it on every exit path, with failures reported to a configurable observer
//! and every operation timed for an optional profiler.
//!
//! ## Design Principles
//! 1. **RAII Sessions**: Release is tied to ownership, never to caller code.
//! 2. **Capability Surfaces**: Callers pick basic, text or binary commands;
//!    the session type stays hidden.
//! 3. **Partition Isolation**: Batches run in fixed-width partitions, one
//!    round trip each; a failed partition never takes its siblings down.
//! 4. **Lazy Iteration**: Cursor scans and bitmap iteration fetch on demand.
//!
//! ## Layout
//! - `session`: pool/session seams and their client implementations.
//! - `dispatcher`: single commands through `basic()`, `text()`, `binary()`.
//! - `pipeline` / `batch`: deferred responses and the partitioned executor.
//! - `scan`: cursor scan iterators.
//! - `bitmap`: the sharded bitmap index.
//! - `config` / `profiler` / `metrics`: builder, hooks and counters.

mod batch;
mod bitmap;
mod commands;
mod config;
mod dispatcher;
mod error;
mod helper;
mod metrics;
mod pipeline;
mod profiler;
mod scan;
mod session;

pub use bitmap::{decode_set_bits, SetBits, ShardLayout, ShardedBitmap};
pub use commands::{
    BasicCommands, BinaryCommands, CommandRunner, Expiry, ScoredMember, SetCondition, TextCommands,
    ALREADY_EXIST, LIMIT_INFINITY, MILLISECONDS, NEGATIVE_INF, NOT_EXIST, POSITIVE_INF, SECONDS,
    SETNX_KEY_NOT_SET, SETNX_KEY_SET,
};
pub use config::{ExceptionHandler, HelperBuilder, HelperConfig, HelperSettings, DEFAULT_PARTITION_SIZE};
pub use dispatcher::{Basic, Binary, Text};
pub use error::{HelperError, HelperResult};
pub use helper::KvHelper;
pub use metrics::{LatencyHistogram, LatencySnapshot, Metrics, MetricsSnapshot, DEFAULT_LATENCY_BUCKETS_US};
pub use pipeline::{Pipeline, Response};
pub use profiler::{Profiler, StopWatch, PIPELINE};
pub use scan::{CursorIter, ScanPage, SCAN_SENTINEL};
pub use session::{Session, SessionPool};

pub use kvpipe_client::{ClientError, ClientResult, Command, Endpoint, RespValue, ScanParams, ToArg};
