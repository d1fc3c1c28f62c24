//! # Pipelines and Deferred Responses
//!
//! A `Pipeline` queues commands against one borrowed session and sends them
//! in a single round trip on `sync`. Every queued command hands back a
//! `Response<V>` right away; its value becomes readable once the pipeline
//! has been synced.
//!
//! ```text
//! issue ──► Response (empty slot) ──► sync (one round trip) ──► get() ──► V
//! ```
//!
//! The pipeline borrows its session mutably, so it cannot outlive it and no
//! other call can use the session while commands are queued.

use std::cell::OnceCell;
use std::fmt;
use std::rc::Rc;

use kvpipe_client::{ClientError, ClientResult, Command, RespValue, ToArg};

use crate::error::{HelperError, HelperResult};
use crate::session::Session;

type Slot = Rc<OnceCell<RespValue>>;

/// Placeholder for the reply to one pipelined command.
pub struct Response<V> {
    slot: Slot,
    decode: fn(RespValue) -> ClientResult<V>,
}

impl<V> Response<V> {
    /// Returns true once the owning pipeline has been synced.
    pub fn is_ready(&self) -> bool {
        self.slot.get().is_some()
    }

    /// Decodes the reply. Repeated calls decode the same reply again.
    pub fn get(&self) -> HelperResult<V> {
        let reply = self.slot.get().ok_or(HelperError::ResponseNotReady)?;
        (self.decode)(reply.clone()).map_err(HelperError::from_client)
    }
}

impl<V> fmt::Debug for Response<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response").field("reply", &self.slot.get()).finish()
    }
}

/// Ordered batch of not-yet-sent commands on one session.
pub struct Pipeline<'s, S: Session> {
    session: &'s mut S,
    queued: Vec<Command>,
    slots: Vec<Slot>,
}

impl<'s, S: Session> Pipeline<'s, S> {
    pub fn new(session: &'s mut S) -> Self {
        Pipeline {
            session,
            queued: Vec::new(),
            slots: Vec::new(),
        }
    }

    /// Queues a command and returns its deferred reply.
    pub fn issue<V>(&mut self, command: Command, decode: fn(RespValue) -> ClientResult<V>) -> Response<V> {
        let slot: Slot = Rc::new(OnceCell::new());
        self.queued.push(command);
        self.slots.push(Rc::clone(&slot));
        Response { slot, decode }
    }

    /// Number of commands waiting for the next sync.
    pub fn len(&self) -> usize {
        self.queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queued.is_empty()
    }

    /// Sends every queued command in one round trip and fills their slots.
    ///
    /// Per-command error replies land in their own slot and surface from
    /// `Response::get`; a transport failure fails the whole sync.
    pub fn sync(&mut self) -> HelperResult<()> {
        if self.queued.is_empty() {
            return Ok(());
        }
        let commands = std::mem::take(&mut self.queued);
        let slots = std::mem::take(&mut self.slots);
        let replies = self
            .session
            .execute_batch(&commands)
            .map_err(HelperError::from_client)?;
        if replies.len() != slots.len() {
            return Err(HelperError::RemoteCommand(ClientError::Protocol));
        }
        for (slot, reply) in slots.iter().zip(replies) {
            // Each slot is fresh per issue, so this set cannot collide.
            let _ = slot.set(reply);
        }
        Ok(())
    }

    pub fn get(&mut self, key: impl ToArg) -> Response<Option<String>> {
        self.issue(Command::keyed("GET", key), RespValue::into_string)
    }

    pub fn set(&mut self, key: impl ToArg, value: impl ToArg) -> Response<bool> {
        self.issue(Command::keyed("SET", key).arg(value), RespValue::into_ok)
    }

    pub fn del(&mut self, key: impl ToArg) -> Response<i64> {
        self.issue(Command::keyed("DEL", key), RespValue::into_integer)
    }

    pub fn exists(&mut self, key: impl ToArg) -> Response<bool> {
        self.issue(Command::keyed("EXISTS", key), RespValue::into_bool)
    }

    pub fn expire(&mut self, key: impl ToArg, seconds: u64) -> Response<bool> {
        self.issue(Command::keyed("EXPIRE", key).arg(seconds), RespValue::into_bool)
    }

    pub fn incr(&mut self, key: impl ToArg) -> Response<i64> {
        self.issue(Command::keyed("INCR", key), RespValue::into_integer)
    }

    pub fn getbit(&mut self, key: impl ToArg, offset: u64) -> Response<bool> {
        self.issue(Command::keyed("GETBIT", key).arg(offset), RespValue::into_bool)
    }

    /// Returns the bit's previous value once synced.
    pub fn setbit(&mut self, key: impl ToArg, offset: u64, value: bool) -> Response<bool> {
        self.issue(Command::keyed("SETBIT", key).arg(offset).arg(value), RespValue::into_bool)
    }

    pub fn bitcount(&mut self, key: impl ToArg) -> Response<i64> {
        self.issue(Command::keyed("BITCOUNT", key), RespValue::into_integer)
    }

    pub fn hget(&mut self, key: impl ToArg, field: impl ToArg) -> Response<Option<String>> {
        self.issue(Command::keyed("HGET", key).arg(field), RespValue::into_string)
    }

    pub fn hset(&mut self, key: impl ToArg, field: impl ToArg, value: impl ToArg) -> Response<i64> {
        self.issue(Command::keyed("HSET", key).arg(field).arg(value), RespValue::into_integer)
    }

    pub fn sadd(&mut self, key: impl ToArg, member: impl ToArg) -> Response<i64> {
        self.issue(Command::keyed("SADD", key).arg(member), RespValue::into_integer)
    }

    pub fn sismember(&mut self, key: impl ToArg, member: impl ToArg) -> Response<bool> {
        self.issue(Command::keyed("SISMEMBER", key).arg(member), RespValue::into_bool)
    }

    pub fn zadd(&mut self, key: impl ToArg, score: f64, member: impl ToArg) -> Response<i64> {
        self.issue(Command::keyed("ZADD", key).arg(score).arg(member), RespValue::into_integer)
    }

    pub fn zscore(&mut self, key: impl ToArg, member: impl ToArg) -> Response<Option<f64>> {
        self.issue(Command::keyed("ZSCORE", key).arg(member), RespValue::into_float)
    }
}
