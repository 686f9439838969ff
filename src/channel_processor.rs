use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use redis::{streams::StreamId, FromRedisValue, Value};
use tokio::{sync::Notify, time::Duration};
use tracing::{debug, error, info, instrument, warn};

use crate::{errors::ConsumerError, handler::MessageHandler, redis_conn::RedisConnection, types::RedisMessage};

/// The number of records requested per `XREADGROUP` call. Not exposed as
/// configuration — spec §6 names no such option, and a single internal
/// default keeps pending-entries draining and steady-state reads from
/// needing to agree on a caller-supplied value.
const READ_COUNT: usize = 100;

/// Configuration for a single [`ChannelProcessor`].
#[derive(Debug, Clone)]
pub struct ChannelProcessorConfig {
    /// How long to sleep before retrying `XGROUP CREATE` when the stream
    /// key does not yet exist.
    pub sleep_when_key_missing_ms: u64,
    /// `XREADGROUP BLOCK` timeout for the steady-state read; the upper
    /// bound on `stop()` latency.
    pub block_stream_time_ms: u64,
}

/// One processor per (subscriber_id, channel) pair. Bootstraps a Redis
/// Streams consumer group, drains its pending-entries list, then enters
/// a long-poll read loop, acknowledging only on successful handler
/// return (spec §4.4).
///
/// Not reusable across start/stop cycles — a fresh processor must be
/// constructed for each `process()` call.
pub struct ChannelProcessor {
    subscriber_id: String,
    channel: String,
    handler: Arc<dyn MessageHandler + Send + Sync>,
    connection: RedisConnection,
    running: Arc<AtomicBool>,
    terminated: Arc<Notify>,
    config: ChannelProcessorConfig,
}

impl ChannelProcessor {
    /// `subscriber_id` must be stable across process restarts — it is
    /// both the Redis consumer-group member name and the key used to
    /// find the consumer's PEL on restart (spec §9's open question).
    pub fn new(
        subscriber_id: String,
        channel: String,
        handler: Arc<dyn MessageHandler + Send + Sync>,
        connection: RedisConnection,
        config: ChannelProcessorConfig,
    ) -> Self {
        Self {
            subscriber_id,
            channel,
            handler,
            connection,
            running: Arc::new(AtomicBool::new(false)),
            terminated: Arc::new(Notify::new()),
            config,
        }
    }

    /// Blocking entry point: `Idle -> EnsuringGroup -> DrainingPending ->
    /// Reading -> Terminated`. Returns once the processor has terminated,
    /// either because `stop()` was called or because a fatal error
    /// occurred.
    #[instrument(name = "channel_processor", skip(self), fields(channel = %self.channel, subscriber_id = %self.subscriber_id))]
    pub async fn process(&self) -> Result<(), ConsumerError> {
        self.running.store(true, Ordering::SeqCst);
        let result = self.run().await;
        self.terminated.notify_one();
        result
    }

    /// Requests a stop and awaits termination. The maximum latency is
    /// bounded by whichever blocking call is currently outstanding: the
    /// block timeout for `XREADGROUP`, or one group-bootstrap sleep
    /// interval.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.terminated.notified().await;
    }

    async fn run(&self) -> Result<(), ConsumerError> {
        let mut conn = self.connection.clone();

        if !self.ensure_group(&mut conn).await? {
            return Ok(());
        }
        if !self.drain_pending(&mut conn).await? {
            return Ok(());
        }
        self.read_steady_state(&mut conn).await
    }

    /// `XGROUP CREATE channel subscriber_id 0` in a loop while running.
    /// Returns `Ok(true)` once the group is confirmed to exist (created
    /// here or already present), `Ok(false)` if `stop()` was called
    /// before that happened.
    async fn ensure_group(&self, conn: &mut RedisConnection) -> Result<bool, ConsumerError> {
        while self.running.load(Ordering::SeqCst) {
            match conn.xgroup_create(&self.channel, &self.subscriber_id, "0").await {
                Ok(()) => return Ok(true),
                Err(err) => {
                    let message = err.to_string();
                    if message.contains("requires the key to exist") {
                        debug!(
                            "stream {} does not exist yet, sleeping before retry",
                            self.channel
                        );
                        tokio::time::sleep(Duration::from_millis(
                            self.config.sleep_when_key_missing_ms,
                        ))
                        .await;
                    } else if message.contains("Consumer Group name already exists") {
                        debug!("consumer group {} already exists", self.subscriber_id);
                        return Ok(true);
                    } else {
                        error!("failed to create consumer group: {message}");
                        return Err(err.into());
                    }
                }
            }
        }
        Ok(false)
    }

    /// `XREADGROUP ... STREAMS channel 0` in a loop while running, until
    /// an empty batch confirms the PEL for this consumer is drained.
    /// Returns `Ok(false)` if `stop()` was called mid-drain.
    async fn drain_pending(&self, conn: &mut RedisConnection) -> Result<bool, ConsumerError> {
        while self.running.load(Ordering::SeqCst) {
            let reply = conn
                .xreadgroup(
                    &self.channel,
                    &self.subscriber_id,
                    &self.subscriber_id,
                    "0",
                    READ_COUNT,
                    None,
                )
                .await?;

            let ids = stream_ids(&reply, &self.channel);
            if ids.is_empty() {
                debug!("pending-entries list drained for {}", self.subscriber_id);
                return Ok(true);
            }

            let count = ids.len();
            debug!("draining {count} pending entries from {}", self.channel);
            for id in ids {
                self.handle_record(conn, &id).await?;
            }
        }
        Ok(false)
    }

    /// `XREADGROUP ... BLOCK block_stream_time_ms STREAMS channel >` in a
    /// loop while running. A timeout returns an empty batch and the loop
    /// continues; this bounds `stop()` latency to one block period.
    async fn read_steady_state(&self, conn: &mut RedisConnection) -> Result<(), ConsumerError> {
        while self.running.load(Ordering::SeqCst) {
            let reply = conn
                .xreadgroup(
                    &self.channel,
                    &self.subscriber_id,
                    &self.subscriber_id,
                    ">",
                    READ_COUNT,
                    Some(self.config.block_stream_time_ms as usize),
                )
                .await?;

            let ids = stream_ids(&reply, &self.channel);
            if ids.is_empty() {
                continue;
            }

            for id in ids {
                self.handle_record(conn, &id).await?;
            }
        }
        info!("received stop request, exiting steady-state read loop");
        Ok(())
    }

    /// Iterates the field *values* of one record in map order, handing
    /// each to the handler and acking only on success. A handler failure
    /// is terminal for the processor: the record keeps its place in the
    /// PEL for the next run (spec §4.4.5, §4.4.6).
    async fn handle_record(
        &self,
        conn: &mut RedisConnection,
        stream_id: &StreamId,
    ) -> Result<(), ConsumerError> {
        for value in stream_id.map.values() {
            let payload = field_value_to_string(value)?;
            let message = RedisMessage {
                channel: self.channel.clone(),
                record_id: stream_id.id.clone(),
                payload,
            };

            match self.handler.handle(&message).await {
                Ok(()) => {
                    conn.xack(&self.channel, &self.subscriber_id, &stream_id.id)
                        .await?;
                }
                Err(err) => {
                    warn!(
                        "handler failed for record {} on {}: {err}",
                        stream_id.id, self.channel
                    );
                    return Err(ConsumerError::fatal(format!(
                        "handler failed for record {}: {err}",
                        stream_id.id
                    )));
                }
            }
        }
        Ok(())
    }
}

fn stream_ids(reply: &redis::streams::StreamReadReply, channel: &str) -> Vec<StreamId> {
    reply
        .keys
        .iter()
        .find(|key| key.key == channel)
        .map(|key| key.ids.clone())
        .unwrap_or_default()
}

fn field_value_to_string(value: &Value) -> Result<String, ConsumerError> {
    String::from_redis_value(value)
        .map_err(|err| ConsumerError::fatal(format!("stream field value was not a string: {err}")))
}
