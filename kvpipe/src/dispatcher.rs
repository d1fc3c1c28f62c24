//! # Command Dispatcher
//!
//! Routes every single-command call through the same sequence:
//!
//! ```text
//! start watch ─► fetch pool ─► acquire session ─► record endpoint
//!             ─► execute + decode ─► release (drop)
//!             ─► on error: exception handler ─► stop watch ─► return error
//! ```
//!
//! The exception handler only observes. The error always reaches the caller.
//!
//! Each capability gets its own thin adapter (`Basic`, `Text`, `Binary`) so a
//! caller chooses the command set, never the session type behind it.

use kvpipe_client::{ClientResult, Command, Endpoint, RespValue};
use tracing::debug;

use crate::commands::{BasicCommands, BinaryCommands, CommandRunner, TextCommands};
use crate::error::{HelperError, HelperResult};
use crate::helper::KvHelper;
use crate::session::{Session, SessionPool};

impl<P: SessionPool> KvHelper<P> {
    /// Basic admin commands (PING, DBSIZE, INFO...).
    pub fn basic(&self) -> Basic<'_, P> {
        Basic(self)
    }

    /// Commands over UTF-8 keys and values.
    pub fn text(&self) -> Text<'_, P> {
        Text(self)
    }

    /// Commands over raw byte keys and values.
    pub fn binary(&self) -> Binary<'_, P> {
        Binary(self)
    }

    /// Runs one command on a freshly checked-out session.
    pub(crate) fn dispatch<T>(
        &self,
        operation: &str,
        command: &Command,
        decode: impl FnOnce(RespValue) -> ClientResult<T>,
    ) -> HelperResult<T> {
        let watch = self.config.watch_start(operation);
        let pool = self.pool();
        let mut endpoint = None;

        let outcome = invoke(&pool, &mut endpoint, command, decode);
        match &outcome {
            Ok(_) => {
                debug!(operation, endpoint = ?endpoint, "dispatched command");
                self.config.watch_stop(watch, operation, &pool, endpoint.as_ref(), None);
            }
            Err(err) => {
                debug!(operation, endpoint = ?endpoint, error = %err, "command failed");
                self.config.report(&pool, err);
                self.config.watch_stop(watch, operation, &pool, endpoint.as_ref(), Some(err));
            }
        }
        outcome
    }
}

/// The session lives only inside this call, so it is released before the
/// failure hook or the instrumentation runs.
fn invoke<P: SessionPool, T>(
    pool: &P,
    endpoint: &mut Option<Endpoint>,
    command: &Command,
    decode: impl FnOnce(RespValue) -> ClientResult<T>,
) -> HelperResult<T> {
    let mut session = pool.acquire().map_err(HelperError::from_acquire)?;
    *endpoint = session.endpoint();
    let reply = session.execute(command).map_err(HelperError::from_client)?;
    decode(reply).map_err(HelperError::from_client)
}

/// Basic-command adapter.
pub struct Basic<'h, P>(&'h KvHelper<P>);

/// Text-command adapter.
pub struct Text<'h, P>(&'h KvHelper<P>);

/// Binary-command adapter.
pub struct Binary<'h, P>(&'h KvHelper<P>);

impl<P: SessionPool> CommandRunner for Basic<'_, P> {
    fn run<T>(&self, command: Command, decode: fn(RespValue) -> ClientResult<T>) -> HelperResult<T> {
        self.0.dispatch(command.name(), &command, decode)
    }
}

impl<P: SessionPool> CommandRunner for Text<'_, P> {
    fn run<T>(&self, command: Command, decode: fn(RespValue) -> ClientResult<T>) -> HelperResult<T> {
        self.0.dispatch(command.name(), &command, decode)
    }
}

impl<P: SessionPool> CommandRunner for Binary<'_, P> {
    fn run<T>(&self, command: Command, decode: fn(RespValue) -> ClientResult<T>) -> HelperResult<T> {
        self.0.dispatch(command.name(), &command, decode)
    }
}

impl<P: SessionPool> BasicCommands for Basic<'_, P> {}

impl<P: SessionPool> TextCommands for Text<'_, P> {}

impl<P: SessionPool> BinaryCommands for Binary<'_, P> {}
