use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use redis_stream_assignment_consumer::{
    config::RuntimeConfig, env::ProcessEnvVars, redis_conn, AssignmentListener,
    AssignmentListenerConfig, AssignmentStore, Assignment,
};
use tokio::sync::Mutex;

#[test_log::test(tokio::test)]
async fn fires_on_change_immediately_for_an_already_present_assignment() {
    let group_id = "listener-group".to_string();
    let member_id = "member-present-on-start".to_string();

    let mut bootstrap_store = assignment_store_from_env().await;
    let assignment = Assignment::new(["orders".to_string()]);
    bootstrap_store
        .initialize(&group_id, &member_id, &assignment)
        .await
        .expect("initialize must succeed");

    let received: Arc<Mutex<Vec<Assignment>>> = Arc::new(Mutex::new(Vec::new()));
    let received_for_callback = received.clone();
    let on_change = Arc::new(move |assignment: Assignment| {
        let received = received_for_callback.clone();
        tokio::spawn(async move {
            received.lock().await.push(assignment);
        });
    });

    let listener = AssignmentListener::start(
        assignment_store_from_env().await,
        group_id,
        member_id,
        AssignmentListenerConfig {
            poll_interval_ms: 50,
        },
        on_change,
        None,
    )
    .await
    .expect("listener must start");

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(received.lock().await.as_slice(), &[assignment]);

    listener.remove().await;
}

#[test_log::test(tokio::test)]
async fn detects_a_changed_assignment_on_a_later_poll() {
    let group_id = "listener-group".to_string();
    let member_id = "member-change-detection".to_string();

    let change_count = Arc::new(AtomicUsize::new(0));
    let change_count_for_callback = change_count.clone();
    let on_change = Arc::new(move |_assignment: Assignment| {
        change_count_for_callback.fetch_add(1, Ordering::SeqCst);
    });

    let listener = AssignmentListener::start(
        assignment_store_from_env().await,
        group_id.clone(),
        member_id.clone(),
        AssignmentListenerConfig {
            poll_interval_ms: 50,
        },
        on_change,
        None,
    )
    .await
    .expect("listener must start");

    assert_eq!(change_count.load(Ordering::SeqCst), 0);

    let mut store = assignment_store_from_env().await;
    store
        .save(
            &group_id,
            &member_id,
            &Assignment::new(["orders".to_string()]),
        )
        .await
        .expect("save must succeed");

    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    assert_eq!(change_count.load(Ordering::SeqCst), 1);

    listener.remove().await;
}

#[test_log::test(tokio::test)]
async fn invokes_on_removed_only_on_a_present_to_absent_transition() {
    let group_id = "listener-group".to_string();
    let member_id = "member-removed".to_string();

    let connection = connect_from_env().await;
    // Use a very short TTL so the key expires mid-test without a manual DEL.
    let mut ttl_store = AssignmentStore::new(connection, 150);
    ttl_store
        .initialize(&group_id, &member_id, &Assignment::new(["orders".to_string()]))
        .await
        .expect("initialize must succeed");

    let removed_count = Arc::new(AtomicUsize::new(0));
    let removed_count_for_callback = removed_count.clone();
    let on_removed = Arc::new(move || {
        removed_count_for_callback.fetch_add(1, Ordering::SeqCst);
    });

    let listener = AssignmentListener::start(
        assignment_store_from_env().await,
        group_id,
        member_id,
        AssignmentListenerConfig {
            poll_interval_ms: 50,
        },
        Arc::new(|_assignment: Assignment| {}),
        Some(on_removed),
    )
    .await
    .expect("listener must start");

    tokio::time::sleep(std::time::Duration::from_millis(400)).await;
    assert_eq!(removed_count.load(Ordering::SeqCst), 1);

    listener.remove().await;
}

async fn connect_from_env() -> redis_conn::RedisConnection {
    let config = RuntimeConfig::from_env(&ProcessEnvVars);
    redis_conn::connect(&config.connection_config())
        .await
        .expect("must be able to connect to redis for listener tests")
}

async fn assignment_store_from_env() -> AssignmentStore {
    let config = RuntimeConfig::from_env(&ProcessEnvVars);
    let connection = connect_from_env().await;
    AssignmentStore::new(connection, config.assignment_ttl_ms)
}
