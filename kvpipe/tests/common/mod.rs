#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::io;
use std::sync::Arc;

use kvpipe::{ClientError, ClientResult, Command, Endpoint, RespValue, Session, SessionPool};
use parking_lot::Mutex;

const DEFAULT_SCAN_PAGE: usize = 2;

#[derive(Default)]
struct Store {
    strings: BTreeMap<Vec<u8>, Vec<u8>>,
    hashes: BTreeMap<Vec<u8>, BTreeMap<String, String>>,
    sets: BTreeMap<Vec<u8>, BTreeSet<String>>,
    zsets: BTreeMap<Vec<u8>, BTreeMap<String, f64>>,
}

#[derive(Default)]
struct State {
    store: Store,
    acquired: usize,
    released: usize,
    batch_sizes: Vec<usize>,
    commands: Vec<String>,
    fail_batches: HashSet<usize>,
    fail_commands: HashSet<String>,
    fail_acquire: bool,
    scan_page: Option<usize>,
}

/// In-process store behind the session seams. Clones share one store.
#[derive(Clone, Default)]
pub struct MemoryPool {
    state: Arc<Mutex<State>>,
}

impl fmt::Debug for MemoryPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MemoryPool")
    }
}

impl MemoryPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the `ordinal`-th pipelined round trip (1-based) with an I/O error.
    pub fn fail_batch(&self, ordinal: usize) {
        self.state.lock().fail_batches.insert(ordinal);
    }

    /// Answers every `name` command with an error reply.
    pub fn fail_command(&self, name: &str) {
        self.state.lock().fail_commands.insert(name.to_string());
    }

    pub fn fail_acquire(&self, fail: bool) {
        self.state.lock().fail_acquire = fail;
    }

    pub fn set_scan_page(&self, size: usize) {
        self.state.lock().scan_page = Some(size);
    }

    pub fn acquired(&self) -> usize {
        self.state.lock().acquired
    }

    pub fn released(&self) -> usize {
        self.state.lock().released
    }

    /// Number of commands in each pipelined round trip, in order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.state.lock().batch_sizes.clone()
    }

    /// Names of every command executed, single or pipelined.
    pub fn commands(&self) -> Vec<String> {
        self.state.lock().commands.clone()
    }

    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.state.lock().store.strings.get(key.as_bytes()).cloned()
    }

    pub fn put_raw(&self, key: &str, value: &[u8]) {
        self.state.lock().store.strings.insert(key.as_bytes().to_vec(), value.to_vec());
    }
}

impl SessionPool for MemoryPool {
    type Session = MemorySession;

    fn acquire(&self) -> ClientResult<MemorySession> {
        let mut state = self.state.lock();
        if state.fail_acquire {
            return Err(ClientError::PoolExhausted);
        }
        state.acquired += 1;
        Ok(MemorySession {
            state: Arc::clone(&self.state),
        })
    }
}

pub struct MemorySession {
    state: Arc<Mutex<State>>,
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.state.lock().released += 1;
    }
}

impl Session for MemorySession {
    fn endpoint(&self) -> Option<Endpoint> {
        Some(Endpoint {
            host: "memory".to_string(),
            port: 6379,
        })
    }

    fn execute(&mut self, command: &Command) -> ClientResult<RespValue> {
        let mut state = self.state.lock();
        Ok(apply(&mut state, command))
    }

    fn execute_batch(&mut self, commands: &[Command]) -> ClientResult<Vec<RespValue>> {
        let mut state = self.state.lock();
        state.batch_sizes.push(commands.len());
        let ordinal = state.batch_sizes.len();
        if state.fail_batches.contains(&ordinal) {
            return Err(ClientError::Io(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "injected batch failure",
            )));
        }
        Ok(commands.iter().map(|command| apply(&mut state, command)).collect())
    }
}

fn text(arg: &[u8]) -> String {
    String::from_utf8_lossy(arg).into_owned()
}

fn number<T: std::str::FromStr + Default>(arg: Option<&[u8]>) -> T {
    arg.and_then(|raw| text(raw).parse().ok()).unwrap_or_default()
}

fn bulk(data: impl Into<Vec<u8>>) -> RespValue {
    RespValue::Bulk(Some(data.into()))
}

fn ok() -> RespValue {
    RespValue::Simple(b"OK".to_vec())
}

fn apply(state: &mut State, command: &Command) -> RespValue {
    let name = command.name();
    state.commands.push(name.to_string());
    if state.fail_commands.contains(name) {
        return RespValue::Error(b"ERR injected failure".to_vec());
    }

    let args: Vec<&[u8]> = command.args().iter().map(|arg| arg.as_ref()).collect();
    let key = args.get(1).map(|key| key.to_vec()).unwrap_or_default();
    let page = state.scan_page.unwrap_or(DEFAULT_SCAN_PAGE);
    let store = &mut state.store;

    match name {
        "PING" => RespValue::Simple(b"PONG".to_vec()),
        "GET" => RespValue::Bulk(store.strings.get(&key).cloned()),
        "SET" => {
            store.strings.insert(key, args[2].to_vec());
            ok()
        }
        "DEL" => {
            let removed = store.strings.remove(&key).is_some() as i64
                + store.hashes.remove(&key).is_some() as i64
                + store.sets.remove(&key).is_some() as i64
                + store.zsets.remove(&key).is_some() as i64;
            RespValue::Integer(removed)
        }
        "EXISTS" => RespValue::Integer(store.strings.contains_key(&key) as i64),
        "INCR" => {
            let current: i64 = number(store.strings.get(&key).map(Vec::as_slice));
            let next = current + 1;
            store.strings.insert(key, next.to_string().into_bytes());
            RespValue::Integer(next)
        }
        "GETBIT" => {
            let offset: usize = number(args.get(2).copied());
            let bit = store
                .strings
                .get(&key)
                .and_then(|payload| payload.get(offset / 8))
                .map(|byte| byte & (0x80 >> (offset % 8)) != 0)
                .unwrap_or(false);
            RespValue::Integer(bit as i64)
        }
        "SETBIT" => {
            let offset: usize = number(args.get(2).copied());
            let value = args.get(3).copied() == Some(b"1".as_slice());
            let payload = store.strings.entry(key).or_default();
            if payload.len() <= offset / 8 {
                payload.resize(offset / 8 + 1, 0);
            }
            let mask = 0x80u8 >> (offset % 8);
            let previous = payload[offset / 8] & mask != 0;
            if value {
                payload[offset / 8] |= mask;
            } else {
                payload[offset / 8] &= !mask;
            }
            RespValue::Integer(previous as i64)
        }
        "BITCOUNT" => {
            let count = store
                .strings
                .get(&key)
                .map(|payload| payload.iter().map(|byte| byte.count_ones() as i64).sum())
                .unwrap_or(0);
            RespValue::Integer(count)
        }
        "HSET" => {
            let added = store
                .hashes
                .entry(key)
                .or_default()
                .insert(text(args[2]), text(args[3]))
                .is_none();
            RespValue::Integer(added as i64)
        }
        "HGET" => RespValue::Bulk(
            store
                .hashes
                .get(&key)
                .and_then(|hash| hash.get(&text(args[2])))
                .map(|value| value.clone().into_bytes()),
        ),
        "SADD" => RespValue::Integer(store.sets.entry(key).or_default().insert(text(args[2])) as i64),
        "SISMEMBER" => RespValue::Integer(
            store.sets.get(&key).is_some_and(|set| set.contains(&text(args[2]))) as i64,
        ),
        "ZADD" => {
            let score: f64 = number(Some(args[2]));
            let added = store.zsets.entry(key).or_default().insert(text(args[3]), score).is_none();
            RespValue::Integer(added as i64)
        }
        "ZSCORE" => RespValue::Bulk(
            store
                .zsets
                .get(&key)
                .and_then(|zset| zset.get(&text(args[2])))
                .map(|score| score.to_string().into_bytes()),
        ),
        "SCAN" => {
            let keys: Vec<Vec<RespValue>> = store
                .strings
                .keys()
                .chain(store.hashes.keys())
                .chain(store.sets.keys())
                .chain(store.zsets.keys())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .filter(|key| matches_pattern(key, scan_option(&args[2..], b"MATCH")))
                .map(|key| vec![bulk(key.clone())])
                .collect();
            scan_page(keys, &args[1..], page)
        }
        "HSCAN" => {
            let entries: Vec<Vec<RespValue>> = store
                .hashes
                .get(&key)
                .map(|hash| {
                    hash.iter()
                        .map(|(field, value)| vec![bulk(field.clone()), bulk(value.clone())])
                        .collect()
                })
                .unwrap_or_default();
            scan_page(entries, &args[2..], page)
        }
        "SSCAN" => {
            let members: Vec<Vec<RespValue>> = store
                .sets
                .get(&key)
                .map(|set| set.iter().map(|member| vec![bulk(member.clone())]).collect())
                .unwrap_or_default();
            scan_page(members, &args[2..], page)
        }
        "ZSCAN" => {
            let members: Vec<Vec<RespValue>> = store
                .zsets
                .get(&key)
                .map(|zset| {
                    zset.iter()
                        .map(|(member, score)| vec![bulk(member.clone()), bulk(score.to_string())])
                        .collect()
                })
                .unwrap_or_default();
            scan_page(members, &args[2..], page)
        }
        other => RespValue::Error(format!("ERR unknown command '{other}'").into_bytes()),
    }
}

fn scan_option<'a>(args: &[&'a [u8]], name: &[u8]) -> Option<&'a [u8]> {
    args.iter().position(|arg| *arg == name).and_then(|idx| args.get(idx + 1).copied())
}

fn matches_pattern(key: &[u8], pattern: Option<&[u8]>) -> bool {
    match pattern {
        None => true,
        Some(pattern) => match pattern.strip_suffix(b"*") {
            Some(prefix) => key.starts_with(prefix),
            None => key == pattern,
        },
    }
}

/// `args` starts at the cursor. The cursor is an index into `items`; COUNT
/// overrides the default page size.
fn scan_page(items: Vec<Vec<RespValue>>, args: &[&[u8]], default_page: usize) -> RespValue {
    let start: usize = number(args.first().copied());
    let page: usize = scan_option(args, b"COUNT")
        .and_then(|raw| text(raw).parse().ok())
        .unwrap_or(default_page)
        .max(1);
    let end = (start + page).min(items.len());
    let next = if end >= items.len() { 0 } else { end };
    let elements = items
        .into_iter()
        .skip(start)
        .take(end.saturating_sub(start))
        .flatten()
        .collect();
    RespValue::Array(vec![bulk(next.to_string()), RespValue::Array(elements)])
}

/// Every (pool, error) pair the exception handler saw.
#[derive(Clone, Default)]
pub struct Reported(Arc<Mutex<Vec<String>>>);

impl Reported {
    pub fn handler(&self) -> impl Fn(&MemoryPool, &kvpipe::HelperError) -> anyhow::Result<()> + Send + Sync + 'static {
        let seen = Arc::clone(&self.0);
        move |pool: &MemoryPool, err: &kvpipe::HelperError| {
            seen.lock().push(format!("{pool:?}: {err}"));
            Ok(())
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}
