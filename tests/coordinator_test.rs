use std::{
    error::Error as StdError,
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use redis::AsyncCommands;
use redis_stream_assignment_consumer::{
    channel_processor::ChannelProcessorConfig,
    config::RuntimeConfig,
    env::ProcessEnvVars,
    listener::AssignmentListenerConfig,
    redis_conn::{self, RedisConnection},
    AssignmentStore, Assignment, HandlerFactory, MessageHandler, RedisMessage,
    SubscriptionCoordinator,
};
use tokio::sync::mpsc::{self, Sender};

#[derive(Debug)]
struct RecordingHandler {
    tx: Sender<RedisMessage>,
}

#[async_trait]
impl MessageHandler for RecordingHandler {
    async fn handle(&self, message: &RedisMessage) -> Result<(), Box<dyn StdError + Send + Sync>> {
        let _ = self.tx.send(message.clone()).await;
        Ok(())
    }
}

#[test_log::test(tokio::test)]
async fn starts_a_processor_for_each_channel_in_the_assignment_and_stops_removed_ones() {
    let group_id = "coordinator-group".to_string();
    let member_id = "coordinator-member".to_string();
    let channel_a = "stream-coordinator-a";
    let channel_b = "stream-coordinator-b";

    let (tx, mut rx) = mpsc::channel::<RedisMessage>(20);
    let handler_factory: HandlerFactory = Arc::new(move |_channel: &str| {
        Arc::new(RecordingHandler { tx: tx.clone() }) as Arc<dyn MessageHandler + Send + Sync>
    });

    let coordinator = SubscriptionCoordinator::new(
        group_id.clone(),
        member_id.clone(),
        connect_from_env().await,
        handler_factory,
        ChannelProcessorConfig {
            sleep_when_key_missing_ms: 50,
            block_stream_time_ms: 200,
        },
    );

    let mut store = assignment_store_from_env().await;
    store
        .initialize(
            &group_id,
            &member_id,
            &Assignment::new([channel_a.to_string()]),
        )
        .await
        .expect("initialize must succeed");

    let listener = coordinator
        .start(
            assignment_store_from_env().await,
            AssignmentListenerConfig {
                poll_interval_ms: 50,
            },
        )
        .await
        .expect("coordinator must start");

    // Let the initial assignment reconcile and the consumer group bootstrap.
    tokio::time::sleep(Duration::from_millis(150)).await;
    add_message(channel_a, "a-1").await;

    let received = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("must receive a message from channel a before timing out")
        .expect("channel must not close");
    assert_eq!(received.channel, channel_a);

    // Reassign to channel_b only; the processor for channel_a must stop
    // and a new one for channel_b must start.
    store
        .save(
            &group_id,
            &member_id,
            &Assignment::new([channel_b.to_string()]),
        )
        .await
        .expect("save must succeed");

    tokio::time::sleep(Duration::from_millis(250)).await;
    add_message(channel_b, "b-1").await;

    let received = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("must receive a message from channel b before timing out")
        .expect("channel must not close");
    assert_eq!(received.channel, channel_b);

    // A message produced on the now-unassigned channel a must not be
    // delivered: its processor was stopped during reconciliation.
    add_message(channel_a, "a-2-should-not-arrive").await;
    let result = tokio::time::timeout(Duration::from_millis(500), rx.recv()).await;
    assert!(result.is_err(), "no further messages should arrive after reassignment");

    coordinator.shutdown(listener).await;
}

async fn add_message(stream: &str, payload: &str) {
    let mut connection = connect_from_env().await;
    match &mut connection {
        RedisConnection::SingleNode(inner) => {
            let _: String = inner
                .xadd(stream, "*", &[("payload", payload)])
                .await
                .expect("xadd must succeed");
        }
        RedisConnection::Cluster(inner) => {
            let _: String = inner
                .xadd(stream, "*", &[("payload", payload)])
                .await
                .expect("xadd must succeed");
        }
    }
}

async fn connect_from_env() -> RedisConnection {
    let config = RuntimeConfig::from_env(&ProcessEnvVars);
    redis_conn::connect(&config.connection_config())
        .await
        .expect("must be able to connect to redis for coordinator tests")
}

async fn assignment_store_from_env() -> AssignmentStore {
    let config = RuntimeConfig::from_env(&ProcessEnvVars);
    let connection = connect_from_env().await;
    AssignmentStore::new(connection, config.assignment_ttl_ms)
}
