use std::fmt::Debug;

use redis::{
    aio::MultiplexedConnection,
    cluster::ClusterClientBuilder,
    cluster_async::ClusterConnection,
    streams::{StreamReadOptions, StreamReadReply},
    AsyncCommands, Client, RedisResult,
};

/// Configuration for the Redis connection used by every worker in this
/// crate (assignment store, assignment listener, channel processors).
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// The `host:port` nodes to connect to, or full `redis://`/`rediss://`
    /// URLs — see `node_url()`. Only the first entry is used unless
    /// `cluster_mode` is set.
    pub nodes: Vec<String>,
    pub password: Option<String>,
    pub cluster_mode: bool,
}

/// A unified async Redis connection covering both single-node and cluster
/// deployments, exposing only the subset of commands this crate's
/// consumer runtime needs.
pub enum RedisConnection {
    Cluster(ClusterConnection),
    SingleNode(MultiplexedConnection),
}

impl Debug for RedisConnection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            RedisConnection::Cluster(_) => write!(f, "RedisConnection::Cluster"),
            RedisConnection::SingleNode(_) => write!(f, "RedisConnection::SingleNode"),
        }
    }
}

impl Clone for RedisConnection {
    fn clone(&self) -> Self {
        match self {
            RedisConnection::Cluster(conn) => RedisConnection::Cluster(conn.clone()),
            RedisConnection::SingleNode(conn) => RedisConnection::SingleNode(conn.clone()),
        }
    }
}

impl RedisConnection {
    /// `GET key`. Returns `None` if the key is absent, matching the
    /// Assignment Store's "absent means null" contract rather than the
    /// empty-string default some callers in this codebase's wider family
    /// use for offset tracking.
    pub async fn get(&mut self, key: &str) -> RedisResult<Option<String>> {
        match self {
            RedisConnection::Cluster(conn) => conn.get(key).await,
            RedisConnection::SingleNode(conn) => conn.get(key).await,
        }
    }

    /// `SET key value PX expire_ms`, unconditional overwrite.
    /// [Redis Docs](https://redis.io/commands/set)
    pub async fn set_px(&mut self, key: &str, value: &str, expire_ms: u64) -> RedisResult<()> {
        match self {
            RedisConnection::Cluster(conn) => conn.pset_ex(key, value, expire_ms).await,
            RedisConnection::SingleNode(conn) => conn.pset_ex(key, value, expire_ms).await,
        }
    }

    /// `XGROUP CREATE stream group id`. Does not pass `MKSTREAM` — per
    /// this crate's bootstrap contract, a missing stream is a distinct,
    /// recognized error that is handled by sleeping and retrying rather
    /// than by creating the stream out from under its producer.
    pub async fn xgroup_create(
        &mut self,
        stream: &str,
        group: &str,
        start_id: &str,
    ) -> RedisResult<()> {
        let mut cmd = redis::cmd("XGROUP");
        cmd.arg("CREATE").arg(stream).arg(group).arg(start_id);

        match self {
            RedisConnection::Cluster(conn) => cmd.query_async(conn).await,
            RedisConnection::SingleNode(conn) => cmd.query_async(conn).await,
        }
    }

    /// `XREADGROUP GROUP group consumer [BLOCK block_ms] STREAMS stream id`.
    /// `block_ms = None` performs a non-blocking read, used for draining
    /// the pending-entries list; `Some(ms)` performs a blocking read, used
    /// for the steady-state `>` read.
    pub async fn xreadgroup(
        &mut self,
        stream: &str,
        group: &str,
        consumer: &str,
        id: &str,
        count: usize,
        block_ms: Option<usize>,
    ) -> RedisResult<StreamReadReply> {
        let mut options = StreamReadOptions::default()
            .group(group, consumer)
            .count(count);
        if let Some(block_ms) = block_ms {
            options = options.block(block_ms);
        }

        match self {
            RedisConnection::Cluster(conn) => {
                conn.xread_options(&[stream], &[id], &options).await
            }
            RedisConnection::SingleNode(conn) => {
                conn.xread_options(&[stream], &[id], &options).await
            }
        }
    }

    /// `XACK stream group id`.
    /// [Redis Docs](https://redis.io/commands/xack)
    pub async fn xack(&mut self, stream: &str, group: &str, id: &str) -> RedisResult<i64> {
        match self {
            RedisConnection::Cluster(conn) => conn.xack(stream, group, &[id]).await,
            RedisConnection::SingleNode(conn) => conn.xack(stream, group, &[id]).await,
        }
    }
}

/// Normalizes one `servers` entry into a URL `redis::Client::open` accepts.
/// Spec §6 names `servers` as bare `host:port` tuples, but
/// `IntoConnectionInfo` only parses `redis://`/`rediss://` URLs — a node
/// already given as a full URL is passed through unchanged, and a bare
/// `host:port` has the scheme (and, for single-node connections, the
/// password) added.
fn node_url(node: &str, password: Option<&str>) -> String {
    if node.contains("://") {
        return node.to_string();
    }
    match password {
        Some(password) => format!("redis://:{password}@{node}"),
        None => format!("redis://{node}"),
    }
}

/// Opens a connection to a Redis cluster or single-node instance per the
/// supplied configuration.
pub async fn connect(config: &ConnectionConfig) -> RedisResult<RedisConnection> {
    if !config.cluster_mode {
        let url = node_url(&config.nodes[0], config.password.as_deref());
        let client = Client::open(url)?;
        return Ok(RedisConnection::SingleNode(
            client.get_multiplexed_async_connection().await?,
        ));
    }

    let nodes: Vec<String> = config
        .nodes
        .iter()
        .map(|node| node_url(node, None))
        .collect();
    let mut builder = ClusterClientBuilder::new(nodes).use_protocol(redis::ProtocolVersion::RESP3);
    if let Some(password) = config.password.clone() {
        builder = builder.password(password);
    }

    let client = builder.build()?;
    Ok(RedisConnection::Cluster(client.get_async_connection().await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_a_full_url_through_unchanged() {
        assert_eq!(
            node_url("redis://example:6379", None),
            "redis://example:6379"
        );
    }

    #[test]
    fn adds_the_redis_scheme_to_a_bare_host_port() {
        assert_eq!(node_url("127.0.0.1:6379", None), "redis://127.0.0.1:6379");
    }

    #[test]
    fn embeds_a_password_for_a_bare_host_port() {
        assert_eq!(
            node_url("127.0.0.1:6379", Some("hunter2")),
            "redis://:hunter2@127.0.0.1:6379"
        );
    }
}
