//! # Sharded Pool
//!
//! Purpose: Spread keys over several single-node pools with a consistent-hash
//! ring, and present the set of per-node connections as one session.
//!
//! ## Design Principles
//! 1. **Consistent Hashing**: Each shard owns `VIRTUAL_NODES` points on a ring,
//!    so adding a node moves only a fraction of the keys.
//! 2. **Deterministic Routing**: Ring points and keys are hashed with XXH64
//!    (seed 0), whose output is fixed by its published definition. The same key
//!    maps to the same shard on every platform, build and process.
//! 3. **Lazy Checkout**: A sharded session takes a node's connection the first
//!    time a command routes there, so an unreachable node only fails the keys
//!    it owns.
//! 4. **Scatter/Gather Pipelines**: A batch is split into one sub-batch per
//!    shard and the replies are put back in issue order.
//! 5. **Keyed Only**: Commands without a key have no owner and are rejected.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh64::xxh64;

use crate::command::Command;
use crate::error::{ClientError, ClientResult};
use crate::pool::{ConnectionPool, PoolConfig, PooledConnection};
use crate::resp::RespValue;

/// Ring points per shard.
const VIRTUAL_NODES: usize = 160;

const RING_SEED: u64 = 0;

fn ring_hash(data: &[u8]) -> u64 {
    xxh64(data, RING_SEED)
}

/// Configuration for a sharded deployment: one pool config per node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardedPoolConfig {
    pub shards: Vec<PoolConfig>,
}

impl ShardedPoolConfig {
    pub fn from_json(raw: &str) -> ClientResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Pool handle over several nodes.
#[derive(Clone)]
pub struct ShardedPool {
    pools: Vec<ConnectionPool>,
    ring: BTreeMap<u64, usize>,
}

impl fmt::Debug for ShardedPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let addrs: Vec<&str> = self.pools.iter().map(ConnectionPool::addr).collect();
        f.debug_struct("ShardedPool").field("shards", &addrs).finish()
    }
}

impl ShardedPool {
    pub fn new(config: ShardedPoolConfig) -> ClientResult<Self> {
        if config.shards.is_empty() {
            return Err(ClientError::InvalidAddress("no shards configured".to_string()));
        }
        let pools = config
            .shards
            .into_iter()
            .map(ConnectionPool::new)
            .collect::<ClientResult<Vec<_>>>()?;

        let mut ring = BTreeMap::new();
        for shard in 0..pools.len() {
            for node in 0..VIRTUAL_NODES {
                let point = ring_hash(format!("SHARD-{shard}-NODE-{node}").as_bytes());
                ring.insert(point, shard);
            }
        }

        Ok(ShardedPool { pools, ring })
    }

    pub fn shard_count(&self) -> usize {
        self.pools.len()
    }

    /// Index of the shard owning `key`.
    pub fn shard_for(&self, key: &[u8]) -> usize {
        let point = ring_hash(key);
        self.ring
            .range(point..)
            .next()
            .or_else(|| self.ring.iter().next())
            .map(|(_, &shard)| shard)
            .unwrap_or(0)
    }

    /// Opens a sharded session. No node is contacted until a command routes
    /// to it.
    pub fn acquire(&self) -> ClientResult<ShardedConnection> {
        Ok(ShardedConnection {
            pool: self.clone(),
            conns: self.pools.iter().map(|_| None).collect(),
        })
    }
}

/// At most one connection per shard, each taken on first use and released
/// together on drop.
pub struct ShardedConnection {
    pool: ShardedPool,
    conns: Vec<Option<PooledConnection>>,
}

impl ShardedConnection {
    fn route(&self, command: &Command) -> ClientResult<usize> {
        command
            .key()
            .map(|key| self.pool.shard_for(key))
            .ok_or(ClientError::Unsupported("keyless command on a sharded session"))
    }

    /// Connection to `shard`, checked out of its pool on first use.
    fn conn(&mut self, shard: usize) -> ClientResult<&mut PooledConnection> {
        let slot = &mut self.conns[shard];
        if slot.is_none() {
            *slot = Some(self.pool.pools[shard].acquire()?);
        }
        slot.as_mut().ok_or(ClientError::PoolExhausted)
    }

    /// Number of shards this session currently holds a connection for.
    pub fn held(&self) -> usize {
        self.conns.iter().filter(|conn| conn.is_some()).count()
    }

    pub fn exec(&mut self, command: &Command) -> ClientResult<RespValue> {
        let shard = self.route(command)?;
        self.conn(shard)?.exec(command)
    }

    /// Runs one sub-batch per shard and returns replies in issue order.
    pub fn exec_batch(&mut self, commands: &[Command]) -> ClientResult<Vec<RespValue>> {
        let mut groups: Vec<Vec<usize>> = vec![Vec::new(); self.conns.len()];
        for (position, command) in commands.iter().enumerate() {
            groups[self.route(command)?].push(position);
        }

        let mut replies: Vec<Option<RespValue>> = vec![None; commands.len()];
        for (shard, positions) in groups.iter().enumerate() {
            if positions.is_empty() {
                continue;
            }
            let batch: Vec<Command> = positions.iter().map(|&pos| commands[pos].clone()).collect();
            let shard_replies = self.conn(shard)?.exec_batch(&batch)?;
            for (&pos, reply) in positions.iter().zip(shard_replies) {
                replies[pos] = Some(reply);
            }
        }

        replies
            .into_iter()
            .map(|reply| reply.ok_or(ClientError::Protocol))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(nodes: usize) -> ShardedPool {
        let shards = (0..nodes)
            .map(|idx| PoolConfig::with_addr(format!("127.0.0.1:{}", 7000 + idx)))
            .collect();
        ShardedPool::new(ShardedPoolConfig { shards }).unwrap()
    }

    #[test]
    fn ring_hash_matches_published_xxh64() {
        assert_eq!(ring_hash(b""), 0xef46_db37_51d8_e999);
        assert_eq!(ring_hash(b"abc"), 0x44bc_2cf5_ad77_0999);
        assert_eq!(
            ring_hash(b"Nobody inspects the spammish repetition"),
            0xfbce_a83c_8a37_8bf1
        );
    }

    #[test]
    fn shard_for_is_pinned() {
        let pool = pool(3);
        assert_eq!(pool.ring.len(), 3 * VIRTUAL_NODES);
        let owners: Vec<usize> = ["user:1", "user:3", "bits_2", "uv_42", "foobar"]
            .iter()
            .map(|key| pool.shard_for(key.as_bytes()))
            .collect();
        assert_eq!(owners, vec![2, 1, 0, 0, 1]);
    }

    #[test]
    fn routing_is_deterministic() {
        let first = pool(3);
        let second = pool(3);
        for idx in 0..100 {
            let key = format!("bits_{idx}");
            assert_eq!(first.shard_for(key.as_bytes()), second.shard_for(key.as_bytes()));
        }
    }

    #[test]
    fn keys_spread_over_every_shard() {
        let pool = pool(3);
        let mut seen = [false; 3];
        for idx in 0..1000 {
            seen[pool.shard_for(format!("key:{idx}").as_bytes())] = true;
        }
        assert!(seen.iter().all(|hit| *hit));
    }

    #[test]
    fn acquire_contacts_no_node() {
        // Nothing listens on these ports.
        let session = pool(3).acquire().unwrap();
        assert_eq!(session.held(), 0);
    }

    #[test]
    fn keyless_command_is_rejected_before_checkout() {
        let mut session = pool(2).acquire().unwrap();
        assert!(matches!(
            session.exec(&Command::keyless("PING")),
            Err(ClientError::Unsupported(_))
        ));
        assert_eq!(session.held(), 0);
    }

    #[test]
    fn empty_config_is_rejected() {
        assert!(ShardedPool::new(ShardedPoolConfig::default()).is_err());
    }
}
