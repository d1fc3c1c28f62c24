//! # Helper Configuration
//!
//! The builder collects the pool factory, batching width, failure observer
//! and profiler, validates them once and freezes them into a `HelperConfig`
//! owned by the helper.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use kvpipe_client::Endpoint;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{HelperError, HelperResult};
use crate::helper::KvHelper;
use crate::profiler::{Profiler, StopWatch};
use crate::session::SessionPool;

/// Keys per pipelined round trip when nothing else is configured.
pub const DEFAULT_PARTITION_SIZE: usize = 100;

/// Side-channel observer of failures, called with the pool the failing
/// session came from. Its own errors are logged and dropped.
pub type ExceptionHandler<P> = Arc<dyn Fn(&P, &HelperError) -> anyhow::Result<()> + Send + Sync>;

/// Serializable part of the helper configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HelperSettings {
    /// Keys per pipelined round trip; zero falls back to the default.
    pub partition_size: usize,
}

impl Default for HelperSettings {
    fn default() -> Self {
        HelperSettings {
            partition_size: DEFAULT_PARTITION_SIZE,
        }
    }
}

impl HelperSettings {
    pub fn from_json(raw: &str) -> HelperResult<Self> {
        serde_json::from_str(raw).map_err(|err| HelperError::InvalidArgument(err.to_string()))
    }
}

/// An operation in flight: when it started and the profiler's token for it.
pub(crate) struct Watch {
    started: Instant,
    token: u64,
}

/// Validated, immutable configuration.
pub struct HelperConfig<P> {
    partition_size: usize,
    exception_handler: Option<ExceptionHandler<P>>,
    profiler: Option<Arc<dyn Profiler>>,
}

impl<P> fmt::Debug for HelperConfig<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HelperConfig")
            .field("partition_size", &self.partition_size)
            .field("exception_handler", &self.exception_handler.is_some())
            .field("profiler", &self.profiler.is_some())
            .finish()
    }
}

impl<P: fmt::Debug> HelperConfig<P> {
    pub fn partition_size(&self) -> usize {
        self.partition_size
    }

    /// Passes a failure to the exception handler, if one is configured.
    pub(crate) fn report(&self, pool: &P, err: &HelperError) {
        if let Some(handler) = &self.exception_handler {
            if let Err(handler_err) = handler(pool, err) {
                error!(pool = ?pool, error = %handler_err, "exception handler failed");
            }
        }
    }

    /// Marks the start of an instrumented operation.
    pub(crate) fn watch_start(&self, operation: &str) -> Watch {
        let token = match &self.profiler {
            Some(profiler) => profiler.start(operation),
            None => 0,
        };
        Watch {
            started: Instant::now(),
            token,
        }
    }

    /// Emits the instrumentation record for an operation.
    pub(crate) fn watch_stop(
        &self,
        watch: Watch,
        operation: &str,
        pool: &P,
        endpoint: Option<&Endpoint>,
        err: Option<&HelperError>,
    ) {
        if let Some(profiler) = &self.profiler {
            profiler.stop(&StopWatch {
                operation,
                token: watch.token,
                pool,
                endpoint,
                elapsed: watch.started.elapsed(),
                error: err,
            });
        }
    }
}

/// Builder for `KvHelper`.
pub struct HelperBuilder<P> {
    pool_factory: Box<dyn Fn() -> P + Send + Sync>,
    settings: HelperSettings,
    exception_handler: Option<ExceptionHandler<P>>,
    profiler: Option<Arc<dyn Profiler>>,
}

impl<P: SessionPool> HelperBuilder<P> {
    pub(crate) fn new(pool_factory: Box<dyn Fn() -> P + Send + Sync>) -> Self {
        HelperBuilder {
            pool_factory,
            settings: HelperSettings::default(),
            exception_handler: None,
            profiler: None,
        }
    }

    pub fn partition_size(mut self, size: usize) -> Self {
        self.settings.partition_size = size;
        self
    }

    pub fn settings(mut self, settings: HelperSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn exception_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&P, &HelperError) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.exception_handler = Some(Arc::new(handler));
        self
    }

    pub fn profiler(mut self, profiler: Arc<dyn Profiler>) -> Self {
        self.profiler = Some(profiler);
        self
    }

    pub fn build(self) -> KvHelper<P> {
        let partition_size = match self.settings.partition_size {
            0 => DEFAULT_PARTITION_SIZE,
            size => size,
        };
        debug!(partition_size, "built kv helper");
        let config = HelperConfig {
            partition_size,
            exception_handler: self.exception_handler,
            profiler: self.profiler,
        };
        KvHelper::from_parts(self.pool_factory, config)
    }
}
