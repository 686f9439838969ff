use std::{sync::Arc, time::Duration};

use tokio::{sync::broadcast, task::JoinHandle, time};
use tracing::{debug, error, info_span, instrument, warn, Instrument};

use crate::{assignment_store::AssignmentStore, errors::ConsumerError, types::Assignment};

/// Configuration for an [`AssignmentListener`].
#[derive(Debug, Clone)]
pub struct AssignmentListenerConfig {
    /// How often to poll the assignment store, in milliseconds.
    pub poll_interval_ms: u64,
}

/// Periodically polls the assignment store for one (group, member) and
/// notifies a callback on change (spec §4.3).
///
/// Construction performs one synchronous read and fires the callback if a
/// value is present, before scheduling the recurring poll. A single
/// dedicated worker runs polls serially; polls never overlap.
pub struct AssignmentListener {
    shutdown_tx: broadcast::Sender<()>,
    join_handle: Option<JoinHandle<()>>,
}

impl AssignmentListener {
    /// Starts the listener. `on_change` is invoked synchronously on the
    /// listener's own task whenever the assignment changes and the new
    /// value is present — it therefore must not block for longer than
    /// `poll_interval_ms` without delaying subsequent polls, which is an
    /// accepted consequence per spec §4.3, not a bug to guard against.
    ///
    /// `on_removed`, when provided, is invoked (with no arguments, since
    /// the source behavior's callback signature carries only present
    /// values) when the assignment transitions from present to absent.
    /// Leaving it `None` reproduces the source behavior exactly: a
    /// consumer whose assignment key expires keeps running its
    /// last-known processors indefinitely (spec §9's open question).
    #[instrument(name = "assignment_listener", skip(store, on_change, on_removed))]
    pub async fn start(
        mut store: AssignmentStore,
        group_id: String,
        member_id: String,
        config: AssignmentListenerConfig,
        on_change: Arc<dyn Fn(Assignment) + Send + Sync>,
        on_removed: Option<Arc<dyn Fn() + Send + Sync>>,
    ) -> Result<Self, ConsumerError> {
        let mut last_assignment = store.read(&group_id, &member_id).await?;
        if let Some(assignment) = last_assignment.clone() {
            on_change(assignment);
        }

        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let poll_interval = Duration::from_millis(config.poll_interval_ms.max(1));

        let join_handle = tokio::spawn(
            async move {
                let mut interval = time::interval(poll_interval);
                // The first tick fires immediately; the synchronous read
                // above already covers that poll.
                interval.tick().await;

                loop {
                    tokio::select! {
                        _ = shutdown_rx.recv() => {
                            debug!("assignment listener received shutdown signal");
                            break;
                        }
                        _ = interval.tick() => {
                            match store.read(&group_id, &member_id).await {
                                Ok(new_assignment) => {
                                    if new_assignment != last_assignment {
                                        match &new_assignment {
                                            Some(assignment) => on_change(assignment.clone()),
                                            None => {
                                                debug!(
                                                    "assignment key expired or was deleted, \
                                                    not invoking change callback"
                                                );
                                                if let Some(on_removed) = &on_removed {
                                                    on_removed();
                                                }
                                            }
                                        }
                                        last_assignment = new_assignment;
                                    }
                                }
                                Err(err) => {
                                    error!("failed to poll assignment key: {err}");
                                }
                            }
                        }
                    }
                }
            }
            .instrument(info_span!("assignment_listener_poll_loop")),
        );

        Ok(Self {
            shutdown_tx,
            join_handle: Some(join_handle),
        })
    }

    /// Cancels the timer. Already-in-flight callbacks are allowed to
    /// complete; this waits for the poll loop task to observe the
    /// shutdown signal and exit.
    pub async fn remove(mut self) {
        if self.shutdown_tx.send(()).is_err() {
            warn!("assignment listener poll loop already stopped");
        }
        if let Some(handle) = self.join_handle.take() {
            if let Err(err) = handle.await {
                error!("assignment listener poll loop task panicked: {err}");
            }
        }
    }
}
