//! In-process partitioned broker.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use sm_post_core::broker::{BrokerMessage, MessagePublisher, MessageSubscription};
use sm_post_core::error::DomainError;
use tokio::sync::Notify;
use tracing::debug;

#[derive(Debug, Clone)]
struct Record {
    key: Option<String>,
    payload: Vec<u8>,
}

#[derive(Debug, Default)]
struct BrokerState {
    topics: HashMap<String, Vec<Vec<Record>>>,
    committed: HashMap<(String, String, usize), i64>,
}

#[derive(Debug)]
struct Inner {
    partitions: usize,
    state: Mutex<BrokerState>,
    published: Notify,
}

impl Inner {
    fn lock(&self) -> Result<MutexGuard<'_, BrokerState>, DomainError> {
        self.state
            .lock()
            .map_err(|_| DomainError::Infrastructure("broker state lock poisoned".into()))
    }
}

/// A broker that keeps every topic in memory.
///
/// Each topic has a fixed number of partitions; a message goes to the
/// partition selected by its key, so messages with the same key are read in
/// publish order. Consumer groups commit offsets per partition, and a new
/// subscription resumes from the group's committed offsets. Messages read but
/// not committed are therefore redelivered to the next subscription.
#[derive(Debug, Clone)]
pub struct InMemoryBroker {
    inner: Arc<Inner>,
}

impl InMemoryBroker {
    /// Creates a broker whose topics have `partitions` partitions (at least
    /// one).
    #[must_use]
    pub fn new(partitions: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                partitions: partitions.max(1),
                state: Mutex::new(BrokerState::default()),
                published: Notify::new(),
            }),
        }
    }

    /// The partition a message with `key` is written to.
    #[must_use]
    pub fn partition_for(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        usize::try_from(hasher.finish() % self.inner.partitions as u64).unwrap_or(0)
    }

    /// Opens a subscription to `topic` for consumer group `group`, starting at
    /// the group's committed offsets.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the broker state is poisoned.
    pub fn subscribe(&self, topic: &str, group: &str) -> Result<InMemorySubscription, DomainError> {
        let state = self.inner.lock()?;
        let positions = (0..self.inner.partitions)
            .map(|partition| {
                state
                    .committed
                    .get(&(group.to_owned(), topic.to_owned(), partition))
                    .copied()
                    .unwrap_or(0)
            })
            .collect();
        drop(state);

        debug!(topic, group, "subscription opened");

        Ok(InMemorySubscription {
            inner: Arc::clone(&self.inner),
            topic: topic.to_owned(),
            group: group.to_owned(),
            positions,
            next_partition: 0,
        })
    }

    /// The offset `group` will resume from on `partition` of `topic`, if it
    /// committed anything there.
    #[must_use]
    pub fn committed_offset(&self, group: &str, topic: &str, partition: usize) -> Option<i64> {
        self.inner.lock().ok().and_then(|state| {
            state
                .committed
                .get(&(group.to_owned(), topic.to_owned(), partition))
                .copied()
        })
    }

    /// Number of messages ever published to `topic`.
    #[must_use]
    pub fn message_count(&self, topic: &str) -> usize {
        self.inner.lock().map_or(0, |state| {
            state
                .topics
                .get(topic)
                .map_or(0, |partitions| partitions.iter().map(Vec::len).sum())
        })
    }

    /// Payloads published to `topic`, partition by partition.
    #[must_use]
    pub fn payloads(&self, topic: &str) -> Vec<Vec<u8>> {
        self.inner.lock().map_or_else(
            |_| Vec::new(),
            |state| {
                state
                    .topics
                    .get(topic)
                    .map(|partitions| {
                        partitions
                            .iter()
                            .flatten()
                            .map(|record| record.payload.clone())
                            .collect()
                    })
                    .unwrap_or_default()
            },
        )
    }
}

#[async_trait]
impl MessagePublisher for InMemoryBroker {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), DomainError> {
        let partition = self.partition_for(key);
        {
            let mut state = self.inner.lock()?;
            let partitions = state
                .topics
                .entry(topic.to_owned())
                .or_insert_with(|| vec![Vec::new(); self.inner.partitions]);
            partitions[partition].push(Record {
                key: Some(key.to_owned()),
                payload: payload.to_vec(),
            });
        }
        self.inner.published.notify_waiters();
        Ok(())
    }
}

/// A consumer-group subscription on an [`InMemoryBroker`] topic.
#[derive(Debug)]
pub struct InMemorySubscription {
    inner: Arc<Inner>,
    topic: String,
    group: String,
    positions: Vec<i64>,
    next_partition: usize,
}

impl InMemorySubscription {
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    fn try_fetch(&mut self) -> Result<Option<BrokerMessage>, DomainError> {
        let state = self.inner.lock()?;
        let Some(partitions) = state.topics.get(&self.topic) else {
            return Ok(None);
        };

        let count = partitions.len();
        for step in 0..count {
            let partition = (self.next_partition + step) % count;
            let position = self.positions[partition];
            let Some(record) = usize::try_from(position)
                .ok()
                .and_then(|index| partitions[partition].get(index))
            else {
                continue;
            };

            let message = BrokerMessage {
                topic: self.topic.clone(),
                partition: partition as i32,
                offset: position,
                key: record.key.clone(),
                payload: record.payload.clone(),
            };
            self.positions[partition] = position + 1;
            self.next_partition = (partition + 1) % count;
            return Ok(Some(message));
        }

        Ok(None)
    }
}

#[async_trait]
impl MessageSubscription for InMemorySubscription {
    async fn poll(&mut self, timeout: Duration) -> Result<Option<BrokerMessage>, DomainError> {
        let deadline = tokio::time::Instant::now() + timeout;
        let inner = Arc::clone(&self.inner);

        loop {
            // Register interest before looking so a publish in between is not missed.
            let notified = inner.published.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(message) = self.try_fetch()? {
                return Ok(Some(message));
            }

            tokio::select! {
                () = &mut notified => {}
                () = tokio::time::sleep_until(deadline) => return Ok(None),
            }
        }
    }

    async fn commit(&mut self, message: &BrokerMessage) -> Result<(), DomainError> {
        let partition = usize::try_from(message.partition).map_err(|_| {
            DomainError::Infrastructure(format!("invalid partition {}", message.partition))
        })?;
        let mut state = self.inner.lock()?;
        let committed = state
            .committed
            .entry((self.group.clone(), message.topic.clone(), partition))
            .or_insert(0);
        *committed = (*committed).max(message.offset + 1);
        Ok(())
    }
}
