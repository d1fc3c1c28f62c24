//! # KvHelper
//!
//! Purpose: One facade over a pooled store client that hides session
//! checkout, release, failure reporting and instrumentation from callers.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: Callers pick a capability, a batch call, a scan or
//!    the bitmap index; sessions never leak out.
//! 2. **Pool Factory**: The pool is fetched from a factory on every
//!    operation, so a caller can swap pools without rebuilding the helper.
//! 3. **Explicit State**: Configuration is owned by the instance and fixed
//!    at build time; nothing is process-global.
//!
//! The operations are spread over sibling modules as separate `impl` blocks:
//! `dispatcher` (single commands), `batch` (pipelined partitions), `scan`
//! (cursor iteration) and `bitmap` (sharded bit index).

use std::fmt;

use crate::config::{HelperBuilder, HelperConfig};
use crate::session::SessionPool;

pub struct KvHelper<P> {
    pool_factory: Box<dyn Fn() -> P + Send + Sync>,
    pub(crate) config: HelperConfig<P>,
}

impl<P> fmt::Debug for KvHelper<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KvHelper").field("config", &self.config).finish()
    }
}

impl<P: SessionPool> KvHelper<P> {
    /// Starts a builder around a pool factory.
    pub fn builder<F>(pool_factory: F) -> HelperBuilder<P>
    where
        F: Fn() -> P + Send + Sync + 'static,
    {
        HelperBuilder::new(Box::new(pool_factory))
    }

    /// Helper with default settings over a fixed pool handle.
    pub fn new(pool: P) -> Self
    where
        P: Clone + Send + Sync + 'static,
    {
        Self::builder(move || pool.clone()).build()
    }

    pub(crate) fn from_parts(pool_factory: Box<dyn Fn() -> P + Send + Sync>, config: HelperConfig<P>) -> Self {
        KvHelper { pool_factory, config }
    }

    pub fn config(&self) -> &HelperConfig<P> {
        &self.config
    }

    pub(crate) fn pool(&self) -> P {
        (self.pool_factory)()
    }
}
