//! # Instrumentation Hooks
//!
//! A `Profiler` is told when an operation starts and receives a `StopWatch`
//! record when it ends. The token returned by `start` comes back in that
//! record, so concurrent operations can be paired up. Operations are single dispatched commands (named
//! after the command), pipeline partitions (`"pipeline"`) and scan pages.
//! Nothing in the helper reads these records back.

use std::fmt;
use std::time::Duration;

use kvpipe_client::Endpoint;

use crate::error::HelperError;

/// Operation name reported for a pipeline partition.
pub const PIPELINE: &str = "pipeline";

/// Outcome of one instrumented operation.
pub struct StopWatch<'a> {
    pub operation: &'a str,
    /// Whatever `Profiler::start` returned for this operation.
    pub token: u64,
    /// The pool the session came from.
    pub pool: &'a dyn fmt::Debug,
    /// Remote identity of the session, when known before the failure.
    pub endpoint: Option<&'a Endpoint>,
    pub elapsed: Duration,
    pub error: Option<&'a HelperError>,
}

impl fmt::Debug for StopWatch<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StopWatch")
            .field("operation", &self.operation)
            .field("token", &self.token)
            .field("pool", self.pool)
            .field("endpoint", &self.endpoint)
            .field("elapsed", &self.elapsed)
            .field("error", &self.error)
            .finish()
    }
}

/// Start/stop callbacks around every instrumented operation.
pub trait Profiler: Send + Sync {
    fn start(&self, _operation: &str) -> u64 {
        0
    }

    fn stop(&self, watch: &StopWatch<'_>);
}

impl<F> Profiler for F
where
    F: Fn(&StopWatch<'_>) + Send + Sync,
{
    fn stop(&self, watch: &StopWatch<'_>) {
        self(watch)
    }
}
