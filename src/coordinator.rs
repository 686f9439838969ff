use std::{
    collections::{BTreeSet, HashMap},
    sync::{Arc, Mutex as StdMutex},
};

use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tracing::{error, info, instrument, warn};

use crate::{
    assignment_store::AssignmentStore,
    channel_processor::{ChannelProcessor, ChannelProcessorConfig},
    errors::ConsumerError,
    handler::MessageHandler,
    listener::{AssignmentListener, AssignmentListenerConfig},
    redis_conn::RedisConnection,
    types::Assignment,
};

/// Builds a handler for a given channel. Channels in the same assignment
/// may share a handler instance or each get their own — this crate does
/// not prescribe which, mirroring how handler registration is left to
/// the embedding application in the teacher's `MessageConsumer` trait.
pub type HandlerFactory =
    Arc<dyn Fn(&str) -> Arc<dyn MessageHandler + Send + Sync> + Send + Sync>;

struct RunningProcessor {
    processor: Arc<ChannelProcessor>,
    join_handle: JoinHandle<()>,
}

/// Composes an [`AssignmentListener`] and a dynamic pool of
/// [`ChannelProcessor`]s: reacts to assignment changes by starting and
/// stopping processors so that the running set always matches the
/// member's current assignment (spec §4.5).
pub struct SubscriptionCoordinator {
    group_id: String,
    member_id: String,
    connection: RedisConnection,
    handler_factory: HandlerFactory,
    processor_config: ChannelProcessorConfig,
    running: Mutex<HashMap<String, RunningProcessor>>,
    // Assignment changes are handed off here rather than reconciled from a
    // `tokio::spawn`ed task per callback: the listener invokes `on_change`
    // serially, but spawned tasks would race each other for `running` and
    // could apply an older assignment after a newer one, leaving the
    // running set out of sync. A single worker draining this channel in
    // order preserves the listener's delivery order.
    reconcile_tx: StdMutex<Option<mpsc::UnboundedSender<Assignment>>>,
    reconcile_worker: StdMutex<Option<JoinHandle<()>>>,
}

impl SubscriptionCoordinator {
    pub fn new(
        group_id: String,
        member_id: String,
        connection: RedisConnection,
        handler_factory: HandlerFactory,
        processor_config: ChannelProcessorConfig,
    ) -> Arc<Self> {
        let (reconcile_tx, reconcile_rx) = mpsc::unbounded_channel();
        let coordinator = Arc::new(Self {
            group_id,
            member_id,
            connection,
            handler_factory,
            processor_config,
            running: Mutex::new(HashMap::new()),
            reconcile_tx: StdMutex::new(Some(reconcile_tx)),
            reconcile_worker: StdMutex::new(None),
        });

        let worker_coordinator = coordinator.clone();
        let worker = tokio::spawn(async move {
            worker_coordinator.run_reconcile_worker(reconcile_rx).await;
        });
        *coordinator
            .reconcile_worker
            .lock()
            .expect("reconcile worker lock poisoned") = Some(worker);

        coordinator
    }

    /// Starts the assignment listener for (group_id, member_id) and
    /// begins reconciling the running processor set against each
    /// assignment change. The returned [`AssignmentListener`] should be
    /// passed to [`SubscriptionCoordinator::shutdown`] when the consumer
    /// is stopping.
    #[instrument(name = "subscription_coordinator", skip(self, store, listener_config), fields(group_id = %self.group_id, member_id = %self.member_id))]
    pub async fn start(
        self: &Arc<Self>,
        store: AssignmentStore,
        listener_config: AssignmentListenerConfig,
    ) -> Result<AssignmentListener, ConsumerError> {
        let coordinator = self.clone();
        let on_change: Arc<dyn Fn(Assignment) + Send + Sync> =
            Arc::new(move |assignment| coordinator.enqueue_reconcile(assignment));

        AssignmentListener::start(
            store,
            self.group_id.clone(),
            self.member_id.clone(),
            listener_config,
            on_change,
            None,
        )
        .await
    }

    /// Hands an assignment to the single reconcile worker, preserving the
    /// order the listener observed changes in.
    fn enqueue_reconcile(&self, assignment: Assignment) {
        let tx = self
            .reconcile_tx
            .lock()
            .expect("reconcile tx lock poisoned")
            .clone();
        match tx {
            Some(tx) => {
                if tx.send(assignment).is_err() {
                    error!("reconcile worker has stopped; dropping assignment change");
                }
            }
            None => warn!("coordinator is shutting down; dropping assignment change"),
        }
    }

    async fn run_reconcile_worker(&self, mut reconcile_rx: mpsc::UnboundedReceiver<Assignment>) {
        while let Some(assignment) = reconcile_rx.recv().await {
            self.reconcile(assignment).await;
        }
    }

    /// Diffs the channel set named in `assignment` against the currently
    /// running processors and starts/stops processors for the
    /// difference. Membership churn within an assignment (same channel
    /// set, different partitions) does not restart processors, since the
    /// diff is on channel names alone.
    async fn reconcile(&self, assignment: Assignment) {
        let desired: BTreeSet<String> = assignment.channels;
        let mut running = self.running.lock().await;
        let current: BTreeSet<String> = running.keys().cloned().collect();

        let to_add: Vec<String> = desired.difference(&current).cloned().collect();
        let to_remove: Vec<String> = current.difference(&desired).cloned().collect();

        for channel in to_add {
            info!("starting channel processor for newly assigned channel {channel}");
            self.start_processor(&mut running, channel).await;
        }

        let removed: Vec<RunningProcessor> = to_remove
            .into_iter()
            .filter_map(|channel| {
                info!("stopping channel processor for unassigned channel {channel}");
                running.remove(&channel)
            })
            .collect();
        drop(running);
        stop_all(removed).await;
    }

    async fn start_processor(
        &self,
        running: &mut HashMap<String, RunningProcessor>,
        channel: String,
    ) {
        let handler = (self.handler_factory)(&channel);
        let processor = Arc::new(ChannelProcessor::new(
            self.member_id.clone(),
            channel.clone(),
            handler,
            self.connection.clone(),
            self.processor_config.clone(),
        ));

        let processor_for_task = processor.clone();
        let channel_for_task = channel.clone();
        let join_handle = tokio::spawn(async move {
            if let Err(err) = processor_for_task.process().await {
                error!("channel processor for {channel_for_task} terminated: {err}");
            }
        });

        running.insert(
            channel,
            RunningProcessor {
                processor,
                join_handle,
            },
        );
    }

    /// Calls the listener's `remove()`, stops all running processors, and
    /// awaits their termination. Processors are stopped concurrently,
    /// matching how the teacher's worker pool is torn down via
    /// `futures::future::join_all` rather than one worker at a time.
    pub async fn shutdown(&self, listener: AssignmentListener) {
        listener.remove().await;

        // Dropping the sender closes the channel so the reconcile worker
        // exits after it finishes any assignment already queued ahead of
        // this shutdown.
        self.reconcile_tx
            .lock()
            .expect("reconcile tx lock poisoned")
            .take();
        let worker = self
            .reconcile_worker
            .lock()
            .expect("reconcile worker lock poisoned")
            .take();
        if let Some(worker) = worker {
            if let Err(err) = worker.await {
                error!("reconcile worker task panicked while stopping: {err}");
            }
        }

        let removed: Vec<RunningProcessor> = {
            let mut running = self.running.lock().await;
            running.drain().map(|(_, processor)| processor).collect()
        };
        stop_all(removed).await;
    }
}

async fn stop_all(processors: Vec<RunningProcessor>) {
    let stops = processors.into_iter().map(|running_processor| async move {
        running_processor.processor.stop().await;
        if let Err(err) = running_processor.join_handle.await {
            error!("channel processor task panicked while stopping: {err}");
        }
    });
    futures::future::join_all(stops).await;
}
