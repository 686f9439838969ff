use crate::env::EnvVars;
use crate::redis_conn::ConnectionConfig;

/// Configuration options recognized by this crate's consumer runtime
/// (spec §6). All fields beyond `servers` have the same defaults the
/// source implementation uses.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// `host:port` nodes to connect to, or full `redis://`/`rediss://`
    /// URLs. Only the first is used unless cluster mode is enabled. Bare
    /// `host:port` entries are normalized to a `redis://` URL by
    /// [`crate::redis_conn::connect`] before being handed to the `redis`
    /// crate, which only parses URLs.
    pub servers: Vec<String>,
    pub password: Option<String>,
    pub cluster_mode: bool,
    /// TTL for written assignments, in milliseconds.
    pub assignment_ttl_ms: u64,
    /// Listener poll period, in milliseconds.
    pub assignment_listener_interval_ms: u64,
    /// Group-bootstrap retry delay when the stream key does not yet
    /// exist, in milliseconds.
    pub sleep_when_key_missing_ms: u64,
    /// `XREADGROUP BLOCK` timeout, in milliseconds; the upper bound on
    /// `stop()` latency for a channel processor.
    pub block_stream_time_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            servers: vec!["redis://127.0.0.1:6379".to_string()],
            password: None,
            cluster_mode: false,
            assignment_ttl_ms: 30_000,
            assignment_listener_interval_ms: 5_000,
            sleep_when_key_missing_ms: 1_000,
            block_stream_time_ms: 5_000,
        }
    }
}

impl RuntimeConfig {
    /// Loads configuration from the environment, falling back to
    /// `RuntimeConfig::default()` for any variable that is unset or
    /// fails to parse, mirroring the `unwrap_or(...)` defaulting chain
    /// this crate's teacher uses when finalising a consumer's config.
    pub fn from_env(env: &dyn EnvVars) -> Self {
        let defaults = Self::default();

        let servers = env
            .var("REDIS_STREAM_CONSUMER_SERVERS")
            .ok()
            .map(|value| {
                value
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|servers| !servers.is_empty())
            .unwrap_or(defaults.servers);

        let password = env.var("REDIS_STREAM_CONSUMER_PASSWORD").ok();

        let cluster_mode = env
            .var("REDIS_STREAM_CONSUMER_CLUSTER_MODE")
            .ok()
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(defaults.cluster_mode);

        let assignment_ttl_ms = parse_env_u64(
            env,
            "REDIS_STREAM_CONSUMER_ASSIGNMENT_TTL_MS",
            defaults.assignment_ttl_ms,
        );
        let assignment_listener_interval_ms = parse_env_u64(
            env,
            "REDIS_STREAM_CONSUMER_ASSIGNMENT_LISTENER_INTERVAL_MS",
            defaults.assignment_listener_interval_ms,
        );
        let sleep_when_key_missing_ms = parse_env_u64(
            env,
            "REDIS_STREAM_CONSUMER_SLEEP_WHEN_KEY_MISSING_MS",
            defaults.sleep_when_key_missing_ms,
        );
        let block_stream_time_ms = parse_env_u64(
            env,
            "REDIS_STREAM_CONSUMER_BLOCK_STREAM_TIME_MS",
            defaults.block_stream_time_ms,
        );

        Self {
            servers,
            password,
            cluster_mode,
            assignment_ttl_ms,
            assignment_listener_interval_ms,
            sleep_when_key_missing_ms,
            block_stream_time_ms,
        }
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            nodes: self.servers.clone(),
            password: self.password.clone(),
            cluster_mode: self.cluster_mode,
        }
    }
}

fn parse_env_u64(env: &dyn EnvVars, key: &str, default: u64) -> u64 {
    env.var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}
