//! # shardbit
//!
//! Purpose: Operate a sharded bitmap index from the command line.
//!
//! ```text
//! shardbit <config.json> <prefix> <hash_range> get   <id>...
//! shardbit <config.json> <prefix> <hash_range> set   <id>...
//! shardbit <config.json> <prefix> <hash_range> clear <id>...
//! shardbit <config.json> <prefix> <hash_range> count <start> <end>
//! shardbit <config.json> <prefix> <hash_range> iter  <start> <end>
//! shardbit <config.json> <prefix> <hash_range> del   <start> <end>
//! ```
//!
//! The config file holds either a single pool (`{"addr": ...}`) or a sharded
//! deployment (`{"shards": [...]}`), optionally with `"partition_size"`.
//! Logging follows `RUST_LOG`.

use std::collections::HashMap;
use std::env;
use std::fs;

use anyhow::{bail, Context, Result};
use kvpipe::{HelperSettings, KvHelper, SessionPool};
use kvpipe_client::{ConnectionPool, PoolConfig, ShardedPool, ShardedPoolConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const USAGE: &str =
    "usage: shardbit <config.json> <prefix> <hash_range> <get|set|clear|count|iter|del> [ids...|start end]";

#[derive(Debug, PartialEq)]
enum Action {
    Get(Vec<u64>),
    Set(Vec<u64>, bool),
    Count(u64, u64),
    Iter(u64, u64),
    Delete(u64, u64),
}

#[derive(Debug)]
struct CliArgs {
    config_path: String,
    prefix: String,
    hash_range: u64,
    action: Action,
}

impl CliArgs {
    /// Parses everything after the program name.
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut args = args.into_iter();
        let (Some(config_path), Some(prefix), Some(hash_range), Some(verb)) =
            (args.next(), args.next(), args.next(), args.next())
        else {
            bail!(USAGE);
        };
        let hash_range = parse_u64(&hash_range).context("hash_range")?;
        let rest: Vec<String> = args.collect();

        let action = match verb.as_str() {
            "get" => Action::Get(parse_ids(&rest)?),
            "set" => Action::Set(parse_ids(&rest)?, true),
            "clear" => Action::Set(parse_ids(&rest)?, false),
            "count" => {
                let (start, end) = parse_range(&rest)?;
                Action::Count(start, end)
            }
            "iter" => {
                let (start, end) = parse_range(&rest)?;
                Action::Iter(start, end)
            }
            "del" => {
                let (start, end) = parse_range(&rest)?;
                Action::Delete(start, end)
            }
            other => bail!("unknown action `{other}`\n{USAGE}"),
        };

        Ok(CliArgs {
            config_path,
            prefix,
            hash_range,
            action,
        })
    }
}

fn parse_u64(raw: &str) -> Result<u64> {
    raw.parse().with_context(|| format!("`{raw}` is not an unsigned integer"))
}

fn parse_ids(raw: &[String]) -> Result<Vec<u64>> {
    if raw.is_empty() {
        bail!("at least one id is required\n{USAGE}");
    }
    raw.iter().map(|id| parse_u64(id)).collect()
}

fn parse_range(raw: &[String]) -> Result<(u64, u64)> {
    match raw {
        [start, end] => Ok((parse_u64(start)?, parse_u64(end)?)),
        _ => bail!("expected <start> <end>\n{USAGE}"),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kvpipe=info,warn")))
        .init();

    let args = CliArgs::parse(env::args().skip(1))?;
    let raw = fs::read_to_string(&args.config_path)
        .with_context(|| format!("reading {}", args.config_path))?;
    let document: serde_json::Value = serde_json::from_str(&raw).context("parsing config")?;
    let settings = HelperSettings::from_json(&raw)?;

    if document.get("shards").is_some() {
        let pool = ShardedPool::new(ShardedPoolConfig::from_json(&raw)?)?;
        info!(shards = pool.shard_count(), "using sharded pool");
        run(pool, settings, &args)
    } else {
        let pool = ConnectionPool::new(PoolConfig::from_json(&raw)?)?;
        info!(addr = pool.addr(), "using single pool");
        run(pool, settings, &args)
    }
}

fn run<P>(pool: P, settings: HelperSettings, args: &CliArgs) -> Result<()>
where
    P: SessionPool + Clone + Send + Sync + 'static,
{
    let helper = KvHelper::builder(move || pool.clone())
        .settings(settings)
        .exception_handler(|pool, err| {
            warn!(pool = ?pool, error = %err, "operation failed");
            Ok(())
        })
        .build();
    let bitmap = helper.bitmap(args.prefix.as_str(), args.hash_range)?;

    match &args.action {
        Action::Get(ids) => {
            let bits = bitmap.get_bits(ids.iter().copied());
            for id in ids {
                println!("{id}\t{}", u8::from(bits.get(id).copied().unwrap_or(false)));
            }
        }
        Action::Set(ids, value) => {
            let previous = bitmap.set_bits(ids.iter().copied(), *value);
            for id in ids {
                match previous.get(id) {
                    Some(bit) => println!("{id}\t{}", u8::from(*bit)),
                    None => println!("{id}\tfailed"),
                }
            }
            check_written(ids, &previous)?;
        }
        Action::Count(start, end) => println!("{}", bitmap.count_bits(*start, *end)?),
        Action::Iter(start, end) => {
            for bit in bitmap.iterate_set_bits(*start, *end) {
                println!("{}", bit?);
            }
        }
        Action::Delete(start, end) => println!("{}", bitmap.delete_range(*start, *end)?),
    }
    Ok(())
}

/// Fails when any requested id has no previous value, i.e. its write was lost.
fn check_written(ids: &[u64], previous: &HashMap<u64, bool>) -> Result<()> {
    let missing = ids.iter().filter(|id| !previous.contains_key(*id)).count();
    if missing > 0 {
        bail!("{missing} of {} ids were not written", ids.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::time::Duration;

    use super::*;

    fn parse(line: &str) -> Result<CliArgs> {
        CliArgs::parse(line.split_whitespace().map(str::to_string))
    }

    #[test]
    fn parses_id_and_range_actions() {
        let args = parse("cfg.json uv 1000 set 1 2 3").unwrap();
        assert_eq!(args.config_path, "cfg.json");
        assert_eq!(args.prefix, "uv");
        assert_eq!(args.hash_range, 1000);
        assert_eq!(args.action, Action::Set(vec![1, 2, 3], true));

        assert_eq!(parse("c p 8 clear 4").unwrap().action, Action::Set(vec![4], false));
        assert_eq!(parse("c p 8 get 9").unwrap().action, Action::Get(vec![9]));
        assert_eq!(parse("c p 8 count 0 99").unwrap().action, Action::Count(0, 99));
        assert_eq!(parse("c p 8 iter 5 6").unwrap().action, Action::Iter(5, 6));
        assert_eq!(parse("c p 8 del 0 7").unwrap().action, Action::Delete(0, 7));
    }

    #[test]
    fn rejects_malformed_arguments() {
        assert!(parse("c p 8").is_err());
        assert!(parse("c p eight get 1").is_err());
        assert!(parse("c p 8 get").is_err());
        assert!(parse("c p 8 get x").is_err());
        assert!(parse("c p 8 count 1").is_err());
        assert!(parse("c p 8 count 1 2 3").is_err());
        let err = parse("c p 8 flip 1").unwrap_err();
        assert!(err.to_string().contains("unknown action `flip`"));
    }

    #[test]
    fn missing_previous_value_is_an_error() {
        let previous = HashMap::from([(1, false), (3, true)]);
        assert!(check_written(&[1, 3], &previous).is_ok());
        let err = check_written(&[1, 2, 3, 4], &previous).unwrap_err();
        assert_eq!(err.to_string(), "2 of 4 ids were not written");
    }

    #[test]
    fn set_against_unreachable_node_fails() {
        let dead = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().to_string()
        };
        let mut config = PoolConfig::with_addr(dead);
        config.connect_timeout = Some(Duration::from_millis(200));
        let pool = ConnectionPool::new(config).unwrap();
        let args = parse("unused.json uv 8 set 1 9").unwrap();

        let err = run(pool, HelperSettings::default(), &args).unwrap_err();
        assert_eq!(err.to_string(), "2 of 2 ids were not written");
    }
}
