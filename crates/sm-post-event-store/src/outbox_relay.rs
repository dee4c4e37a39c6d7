//! Background task that republishes events left in the outbox.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::event_store::EventStore;

/// Handle to a running outbox relay.
#[derive(Debug)]
pub struct OutboxRelayHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl OutboxRelayHandle {
    /// Signals the relay to stop and waits for the current pass to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "outbox relay task ended abnormally");
        }
    }
}

/// Spawns a task that calls [`EventStore::republish_pending`] every
/// `interval`, starting immediately.
#[must_use]
pub fn spawn_outbox_relay(
    store: Arc<EventStore>,
    interval: Duration,
    batch_size: usize,
) -> OutboxRelayHandle {
    let (shutdown, mut stop) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = store.republish_pending(batch_size).await {
                        warn!(error = %e, "outbox relay pass failed");
                    }
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }

        debug!("outbox relay stopped");
    });

    OutboxRelayHandle { shutdown, task }
}
