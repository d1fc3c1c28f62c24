//! # Command Capabilities
//!
//! The single-command surface of the store, split by capability the way
//! callers select it: basic admin commands, text commands over UTF-8 keys,
//! and binary commands over raw bytes.
//!
//! Every capability is a trait whose methods are written once on top of
//! `CommandRunner::run`. Whatever implements `run` decides how a command
//! reaches the store; the helper's adapters route it through pool
//! acquisition, the failure hook and instrumentation.

use std::collections::HashMap;

use kvpipe_client::{ClientResult, Command, RespValue};

use crate::error::HelperResult;

pub const SETNX_KEY_NOT_SET: i64 = 0;
pub const SETNX_KEY_SET: i64 = 1;
pub const LIMIT_INFINITY: i64 = -1;
pub const POSITIVE_INF: &str = "+inf";
pub const NEGATIVE_INF: &str = "-inf";
pub const NOT_EXIST: &str = "NX";
pub const ALREADY_EXIST: &str = "XX";
pub const SECONDS: &str = "EX";
pub const MILLISECONDS: &str = "PX";

/// Sorted-set member with its score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMember {
    pub member: String,
    pub score: f64,
}

/// Write condition for `SET`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetCondition {
    /// Only set when the key does not exist (`NX`).
    NotExist,
    /// Only set when the key already exists (`XX`).
    AlreadyExist,
}

impl SetCondition {
    fn flag(self) -> &'static str {
        match self {
            SetCondition::NotExist => NOT_EXIST,
            SetCondition::AlreadyExist => ALREADY_EXIST,
        }
    }
}

/// Expiration attached to `SET`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    Seconds(u64),
    Millis(u64),
}

impl Expiry {
    fn unit(self) -> &'static str {
        match self {
            Expiry::Seconds(_) => SECONDS,
            Expiry::Millis(_) => MILLISECONDS,
        }
    }

    fn amount(self) -> u64 {
        match self {
            Expiry::Seconds(amount) | Expiry::Millis(amount) => amount,
        }
    }
}

/// Runs one command and decodes its reply.
pub trait CommandRunner {
    fn run<T>(&self, command: Command, decode: fn(RespValue) -> ClientResult<T>) -> HelperResult<T>;
}

/// Server-level commands that address no key.
pub trait BasicCommands: CommandRunner {
    fn ping(&self) -> HelperResult<String> {
        self.run(Command::keyless("PING"), RespValue::into_text)
    }

    fn echo(&self, message: &str) -> HelperResult<String> {
        self.run(Command::keyless("ECHO").arg(message), RespValue::into_text)
    }

    fn dbsize(&self) -> HelperResult<i64> {
        self.run(Command::keyless("DBSIZE"), RespValue::into_integer)
    }

    fn flushdb(&self) -> HelperResult<bool> {
        self.run(Command::keyless("FLUSHDB"), RespValue::into_ok)
    }

    fn info(&self) -> HelperResult<String> {
        self.run(Command::keyless("INFO"), RespValue::into_text)
    }
}

/// Commands over UTF-8 keys and values.
pub trait TextCommands: CommandRunner {
    fn get(&self, key: &str) -> HelperResult<Option<String>> {
        self.run(Command::keyed("GET", key), RespValue::into_string)
    }

    fn set(&self, key: &str, value: &str) -> HelperResult<bool> {
        self.run(Command::keyed("SET", key).arg(value), RespValue::into_ok)
    }

    /// `SET` with an optional `NX`/`XX` condition and expiry. Returns false
    /// when the condition prevented the write.
    fn set_with(
        &self,
        key: &str,
        value: &str,
        condition: Option<SetCondition>,
        expiry: Option<Expiry>,
    ) -> HelperResult<bool> {
        let command = Command::keyed("SET", key)
            .arg(value)
            .arg_opt(condition.map(SetCondition::flag))
            .arg_opt(expiry.map(Expiry::unit))
            .arg_opt(expiry.map(Expiry::amount));
        self.run(command, RespValue::into_ok)
    }

    /// Returns `SETNX_KEY_SET` or `SETNX_KEY_NOT_SET`.
    fn setnx(&self, key: &str, value: &str) -> HelperResult<i64> {
        self.run(Command::keyed("SETNX", key).arg(value), RespValue::into_integer)
    }

    fn del(&self, key: &str) -> HelperResult<i64> {
        self.run(Command::keyed("DEL", key), RespValue::into_integer)
    }

    fn exists(&self, key: &str) -> HelperResult<bool> {
        self.run(Command::keyed("EXISTS", key), RespValue::into_bool)
    }

    fn expire(&self, key: &str, seconds: u64) -> HelperResult<bool> {
        self.run(Command::keyed("EXPIRE", key).arg(seconds), RespValue::into_bool)
    }

    fn pexpire(&self, key: &str, millis: u64) -> HelperResult<bool> {
        self.run(Command::keyed("PEXPIRE", key).arg(millis), RespValue::into_bool)
    }

    /// Remaining seconds; -1 without expiry, -2 when missing.
    fn ttl(&self, key: &str) -> HelperResult<i64> {
        self.run(Command::keyed("TTL", key), RespValue::into_integer)
    }

    fn incr(&self, key: &str) -> HelperResult<i64> {
        self.run(Command::keyed("INCR", key), RespValue::into_integer)
    }

    fn incr_by(&self, key: &str, delta: i64) -> HelperResult<i64> {
        self.run(Command::keyed("INCRBY", key).arg(delta), RespValue::into_integer)
    }

    fn getbit(&self, key: &str, offset: u64) -> HelperResult<bool> {
        self.run(Command::keyed("GETBIT", key).arg(offset), RespValue::into_bool)
    }

    fn setbit(&self, key: &str, offset: u64, value: bool) -> HelperResult<bool> {
        self.run(Command::keyed("SETBIT", key).arg(offset).arg(value), RespValue::into_bool)
    }

    fn bitcount(&self, key: &str) -> HelperResult<i64> {
        self.run(Command::keyed("BITCOUNT", key), RespValue::into_integer)
    }

    fn hget(&self, key: &str, field: &str) -> HelperResult<Option<String>> {
        self.run(Command::keyed("HGET", key).arg(field), RespValue::into_string)
    }

    fn hset(&self, key: &str, field: &str, value: &str) -> HelperResult<i64> {
        self.run(Command::keyed("HSET", key).arg(field).arg(value), RespValue::into_integer)
    }

    fn hdel(&self, key: &str, field: &str) -> HelperResult<i64> {
        self.run(Command::keyed("HDEL", key).arg(field), RespValue::into_integer)
    }

    fn hgetall(&self, key: &str) -> HelperResult<HashMap<String, String>> {
        self.run(Command::keyed("HGETALL", key), decode_map)
    }

    fn hlen(&self, key: &str) -> HelperResult<i64> {
        self.run(Command::keyed("HLEN", key), RespValue::into_integer)
    }

    fn sadd(&self, key: &str, member: &str) -> HelperResult<i64> {
        self.run(Command::keyed("SADD", key).arg(member), RespValue::into_integer)
    }

    fn srem(&self, key: &str, member: &str) -> HelperResult<i64> {
        self.run(Command::keyed("SREM", key).arg(member), RespValue::into_integer)
    }

    fn smembers(&self, key: &str) -> HelperResult<Vec<String>> {
        self.run(Command::keyed("SMEMBERS", key), RespValue::into_strings)
    }

    fn sismember(&self, key: &str, member: &str) -> HelperResult<bool> {
        self.run(Command::keyed("SISMEMBER", key).arg(member), RespValue::into_bool)
    }

    fn scard(&self, key: &str) -> HelperResult<i64> {
        self.run(Command::keyed("SCARD", key), RespValue::into_integer)
    }

    fn zadd(&self, key: &str, score: f64, member: &str) -> HelperResult<i64> {
        self.run(Command::keyed("ZADD", key).arg(score).arg(member), RespValue::into_integer)
    }

    fn zrem(&self, key: &str, member: &str) -> HelperResult<i64> {
        self.run(Command::keyed("ZREM", key).arg(member), RespValue::into_integer)
    }

    fn zscore(&self, key: &str, member: &str) -> HelperResult<Option<f64>> {
        self.run(Command::keyed("ZSCORE", key).arg(member), RespValue::into_float)
    }

    fn zcard(&self, key: &str) -> HelperResult<i64> {
        self.run(Command::keyed("ZCARD", key), RespValue::into_integer)
    }

    /// Members with scores in `[min, max]`. Infinite bounds are sent as
    /// `POSITIVE_INF` / `NEGATIVE_INF`; `limit` is `(offset, count)` where a
    /// count of `LIMIT_INFINITY` means no cap.
    fn zrangebyscore_with_scores(
        &self,
        key: &str,
        min: f64,
        max: f64,
        limit: Option<(i64, i64)>,
    ) -> HelperResult<Vec<ScoredMember>> {
        let mut command = Command::keyed("ZRANGEBYSCORE", key)
            .arg(min)
            .arg(max)
            .arg("WITHSCORES");
        if let Some((offset, count)) = limit {
            command = command.arg("LIMIT").arg(offset).arg(count);
        }
        self.run(command, decode_scored_members)
    }
}

/// Commands over raw byte keys and values.
pub trait BinaryCommands: CommandRunner {
    fn get(&self, key: &[u8]) -> HelperResult<Option<Vec<u8>>> {
        self.run(Command::keyed("GET", key), RespValue::into_bytes)
    }

    fn set(&self, key: &[u8], value: &[u8]) -> HelperResult<bool> {
        self.run(Command::keyed("SET", key).arg(value), RespValue::into_ok)
    }

    fn del(&self, key: &[u8]) -> HelperResult<i64> {
        self.run(Command::keyed("DEL", key), RespValue::into_integer)
    }

    fn exists(&self, key: &[u8]) -> HelperResult<bool> {
        self.run(Command::keyed("EXISTS", key), RespValue::into_bool)
    }

    fn getbit(&self, key: &[u8], offset: u64) -> HelperResult<bool> {
        self.run(Command::keyed("GETBIT", key).arg(offset), RespValue::into_bool)
    }

    fn setbit(&self, key: &[u8], offset: u64, value: bool) -> HelperResult<bool> {
        self.run(Command::keyed("SETBIT", key).arg(offset).arg(value), RespValue::into_bool)
    }

    fn bitcount(&self, key: &[u8]) -> HelperResult<i64> {
        self.run(Command::keyed("BITCOUNT", key), RespValue::into_integer)
    }

    fn hget(&self, key: &[u8], field: &[u8]) -> HelperResult<Option<Vec<u8>>> {
        self.run(Command::keyed("HGET", key).arg(field), RespValue::into_bytes)
    }

    fn hset(&self, key: &[u8], field: &[u8], value: &[u8]) -> HelperResult<i64> {
        self.run(Command::keyed("HSET", key).arg(field).arg(value), RespValue::into_integer)
    }

    fn sadd(&self, key: &[u8], member: &[u8]) -> HelperResult<i64> {
        self.run(Command::keyed("SADD", key).arg(member), RespValue::into_integer)
    }

    fn smembers(&self, key: &[u8]) -> HelperResult<Vec<Vec<u8>>> {
        self.run(Command::keyed("SMEMBERS", key), RespValue::into_byte_strings)
    }
}

fn decode_map(reply: RespValue) -> ClientResult<HashMap<String, String>> {
    Ok(reply.into_string_pairs()?.into_iter().collect())
}

pub(crate) fn decode_scored_members(reply: RespValue) -> ClientResult<Vec<ScoredMember>> {
    Ok(reply
        .into_scored()?
        .into_iter()
        .map(|(member, score)| ScoredMember { member, score })
        .collect())
}
