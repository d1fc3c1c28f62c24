//! # Connection Pool
//!
//! Purpose: Reuse TCP connections to reduce handshake latency and allocation
//! churn, and hand each caller an exclusively-owned session.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Keep a bounded set of reusable connections.
//! 2. **Minimal Locking**: Hold the mutex only while moving idle connections.
//! 3. **Fail Fast**: Exceeding the pool limit returns an error immediately.
//! 4. **RAII Release**: A `PooledConnection` goes back to the pool exactly once,
//!    when it is dropped, whatever path the caller leaves by.
//! 5. **Pipelining**: A batch is written in one go and its replies are read
//!    back in order, one round trip per batch.

use std::collections::VecDeque;
use std::fmt;
use std::io::{BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::command::Command;
use crate::error::{ClientError, ClientResult};
use crate::resp::{encode_command, read_response, RespValue};

/// Pool configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Server address, e.g. "127.0.0.1:6379".
    pub addr: String,
    /// Maximum number of idle connections to keep.
    pub max_idle: usize,
    /// Maximum total connections (idle + in-use).
    pub max_total: usize,
    /// Optional TCP read timeout.
    pub read_timeout: Option<Duration>,
    /// Optional TCP write timeout.
    pub write_timeout: Option<Duration>,
    /// Optional TCP connect timeout.
    pub connect_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            addr: "127.0.0.1:6379".to_string(),
            max_idle: 8,
            max_total: 16,
            read_timeout: None,
            write_timeout: None,
            connect_timeout: None,
        }
    }
}

impl PoolConfig {
    /// Creates a config for `addr` with default limits.
    pub fn with_addr(addr: impl Into<String>) -> Self {
        PoolConfig {
            addr: addr.into(),
            ..Default::default()
        }
    }

    /// Reads a config from JSON; missing fields keep their defaults.
    pub fn from_json(raw: &str) -> ClientResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Remote identity of a connection, reported to instrumentation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Endpoint {
            host: addr.ip().to_string(),
            port: addr.port(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

struct PoolState {
    idle: VecDeque<Connection>,
    total: usize,
}

struct PoolInner {
    config: PoolConfig,
    state: Mutex<PoolState>,
}

/// Connection pool handle.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("addr", &self.inner.config.addr)
            .finish()
    }
}

impl ConnectionPool {
    /// Creates a new connection pool with the provided configuration.
    pub fn new(config: PoolConfig) -> ClientResult<Self> {
        config
            .addr
            .parse::<SocketAddr>()
            .map_err(|_| ClientError::InvalidAddress(config.addr.clone()))?;
        let state = PoolState {
            idle: VecDeque::with_capacity(config.max_idle),
            total: 0,
        };
        Ok(ConnectionPool {
            inner: Arc::new(PoolInner {
                config,
                state: Mutex::new(state),
            }),
        })
    }

    /// Address this pool connects to.
    pub fn addr(&self) -> &str {
        &self.inner.config.addr
    }

    /// Acquires a connection from the pool.
    pub fn acquire(&self) -> ClientResult<PooledConnection> {
        if let Some(conn) = self.pop_idle() {
            return Ok(PooledConnection::new(self.clone(), conn));
        }

        if !self.try_reserve() {
            return Err(ClientError::PoolExhausted);
        }

        match Connection::connect(&self.inner.config) {
            Ok(conn) => {
                debug!(addr = %self.inner.config.addr, "opened pooled connection");
                Ok(PooledConnection::new(self.clone(), conn))
            }
            Err(err) => {
                self.release_slot();
                Err(err)
            }
        }
    }

    /// Number of connections currently idle in the pool.
    pub fn idle_count(&self) -> usize {
        self.inner.state.lock().idle.len()
    }

    fn pop_idle(&self) -> Option<Connection> {
        self.inner.state.lock().idle.pop_front()
    }

    fn try_reserve(&self) -> bool {
        let mut state = self.inner.state.lock();
        if state.total >= self.inner.config.max_total {
            return false;
        }
        state.total += 1;
        true
    }

    fn release_slot(&self) {
        let mut state = self.inner.state.lock();
        state.total = state.total.saturating_sub(1);
    }

    fn return_connection(&self, conn: Connection) {
        let mut state = self.inner.state.lock();
        if state.idle.len() < self.inner.config.max_idle {
            state.idle.push_back(conn);
        } else {
            state.total = state.total.saturating_sub(1);
        }
    }
}

/// RAII wrapper returning a connection to the pool on drop.
pub struct PooledConnection {
    pool: ConnectionPool,
    conn: Option<Connection>,
    valid: bool,
}

impl PooledConnection {
    fn new(pool: ConnectionPool, conn: Connection) -> Self {
        PooledConnection {
            pool,
            conn: Some(conn),
            valid: true,
        }
    }

    /// Remote address of the underlying socket.
    pub fn endpoint(&self) -> Option<Endpoint> {
        self.conn.as_ref().map(|conn| conn.endpoint.clone())
    }

    /// Executes one command and returns its raw reply.
    pub fn exec(&mut self, command: &Command) -> ClientResult<RespValue> {
        let mut replies = self.exec_batch(std::slice::from_ref(command))?;
        replies.pop().ok_or(ClientError::Protocol)
    }

    /// Writes every command, flushes once, then reads one reply per command.
    ///
    /// Error replies are returned in place; only transport and framing
    /// failures fail the whole batch.
    pub fn exec_batch(&mut self, commands: &[Command]) -> ClientResult<Vec<RespValue>> {
        let conn = self.conn.as_mut().ok_or(ClientError::Protocol)?;
        let response = conn.exec_batch(commands);
        if let Err(err) = &response {
            if err.poisons_connection() {
                // A half-read stream cannot be reused.
                self.valid = false;
            }
        }
        response
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => return,
        };

        if self.valid {
            self.pool.return_connection(conn);
        } else {
            self.pool.release_slot();
        }
    }
}

/// Single TCP connection with reusable buffers.
struct Connection {
    // Buffered reader reduces syscalls while still allowing direct writes.
    reader: BufReader<TcpStream>,
    line_buf: Vec<u8>,
    write_buf: Vec<u8>,
    endpoint: Endpoint,
}

impl Connection {
    fn connect(config: &PoolConfig) -> ClientResult<Self> {
        let stream = connect_stream(config)?;
        if let Some(timeout) = config.read_timeout {
            stream.set_read_timeout(Some(timeout))?;
        }
        if let Some(timeout) = config.write_timeout {
            stream.set_write_timeout(Some(timeout))?;
        }
        stream.set_nodelay(true)?;
        let endpoint = Endpoint::from(stream.peer_addr()?);

        Ok(Connection {
            reader: BufReader::new(stream),
            line_buf: Vec::with_capacity(128),
            write_buf: Vec::with_capacity(256),
            endpoint,
        })
    }

    fn exec_batch(&mut self, commands: &[Command]) -> ClientResult<Vec<RespValue>> {
        self.write_buf.clear();
        for command in commands {
            encode_command(command.args(), &mut self.write_buf);
        }

        let stream = self.reader.get_mut();
        stream.write_all(&self.write_buf)?;
        stream.flush()?;

        let mut replies = Vec::with_capacity(commands.len());
        for _ in commands {
            replies.push(read_response(&mut self.reader, &mut self.line_buf)?);
        }
        Ok(replies)
    }
}

fn connect_stream(config: &PoolConfig) -> ClientResult<TcpStream> {
    let addr: SocketAddr = config
        .addr
        .parse()
        .map_err(|_| ClientError::InvalidAddress(config.addr.clone()))?;
    let stream = match config.connect_timeout {
        Some(timeout) => TcpStream::connect_timeout(&addr, timeout)?,
        None => TcpStream::connect(addr)?,
    };
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_from_partial_json_keeps_defaults() {
        let config = PoolConfig::from_json(r#"{"addr":"10.0.0.1:6380","max_total":4}"#).unwrap();
        assert_eq!(config.addr, "10.0.0.1:6380");
        assert_eq!(config.max_total, 4);
        assert_eq!(config.max_idle, 8);
        assert_eq!(config.read_timeout, None);
    }

    #[test]
    fn rejects_unparseable_address() {
        let err = ConnectionPool::new(PoolConfig::with_addr("not-an-addr")).unwrap_err();
        assert!(matches!(err, ClientError::InvalidAddress(_)));
    }

    #[test]
    fn endpoint_displays_host_and_port() {
        let endpoint = Endpoint::from("127.0.0.1:6379".parse::<SocketAddr>().unwrap());
        assert_eq!(endpoint.to_string(), "127.0.0.1:6379");
    }
}
