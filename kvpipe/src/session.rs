//! # Sessions and Pools
//!
//! The two seams the helper layer needs from a store client: a pool that
//! hands out exclusively-owned sessions, and a session that can run one
//! command or a pipelined batch.
//!
//! Release is tied to ownership. A session goes back to its pool when the
//! value is dropped, so every exit path of a helper operation (success,
//! decode failure, remote error, unwinding) releases exactly once.
//!
//! Two topologies implement the seams: a single-node `ConnectionPool` and a
//! consistent-hash `ShardedPool`.

use std::fmt;

use kvpipe_client::{
    ClientResult, Command, ConnectionPool, Endpoint, PooledConnection, RespValue,
    ShardedConnection, ShardedPool,
};

use crate::pipeline::Pipeline;

/// One checked-out store connection.
pub trait Session {
    /// Remote identity for instrumentation, when the topology has one.
    fn endpoint(&self) -> Option<Endpoint>;

    /// Runs a single command in its own round trip.
    fn execute(&mut self, command: &Command) -> ClientResult<RespValue>;

    /// Runs every command in one round trip, replies in issue order.
    fn execute_batch(&mut self, commands: &[Command]) -> ClientResult<Vec<RespValue>>;

    /// Opens a pipeline bound to this session.
    fn pipelined(&mut self) -> Pipeline<'_, Self>
    where
        Self: Sized,
    {
        Pipeline::new(self)
    }
}

/// Source of sessions.
pub trait SessionPool: fmt::Debug {
    type Session: Session;

    fn acquire(&self) -> ClientResult<Self::Session>;
}

impl Session for PooledConnection {
    fn endpoint(&self) -> Option<Endpoint> {
        PooledConnection::endpoint(self)
    }

    fn execute(&mut self, command: &Command) -> ClientResult<RespValue> {
        self.exec(command)
    }

    fn execute_batch(&mut self, commands: &[Command]) -> ClientResult<Vec<RespValue>> {
        self.exec_batch(commands)
    }
}

impl SessionPool for ConnectionPool {
    type Session = PooledConnection;

    fn acquire(&self) -> ClientResult<PooledConnection> {
        ConnectionPool::acquire(self)
    }
}

impl Session for ShardedConnection {
    // A sharded session spans several nodes and has no single identity.
    fn endpoint(&self) -> Option<Endpoint> {
        None
    }

    fn execute(&mut self, command: &Command) -> ClientResult<RespValue> {
        self.exec(command)
    }

    fn execute_batch(&mut self, commands: &[Command]) -> ClientResult<Vec<RespValue>> {
        self.exec_batch(commands)
    }
}

impl SessionPool for ShardedPool {
    type Session = ShardedConnection;

    fn acquire(&self) -> ClientResult<ShardedConnection> {
        ShardedPool::acquire(self)
    }
}
