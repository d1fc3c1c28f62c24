//! # kvpipe Client
//!
//! Purpose: Provide the synchronous, pooled, Redis-compatible client the
//! kvpipe helper layer sits on: RESP2 framing, commands, a bounded pool of
//! exclusively-owned connections, and a consistent-hash sharded pool.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Reuse TCP connections to avoid repeated connects.
//! 2. **RAII Sessions**: Dropping a checked-out connection releases it.
//! 3. **Minimal Allocation**: Reuse buffers for RESP framing and parsing.
//! 4. **Protocol Clarity**: Encode/parse RESP2 explicitly for correctness.

mod command;
mod error;
mod pool;
mod resp;
mod sharded;

pub use command::{Command, ScanParams, ToArg};
pub use error::{ClientError, ClientResult};
pub use pool::{ConnectionPool, Endpoint, PoolConfig, PooledConnection};
pub use resp::{encode_command, read_response, RespValue};
pub use sharded::{ShardedConnection, ShardedPool, ShardedPoolConfig};
