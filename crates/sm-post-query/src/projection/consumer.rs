//! The projector's consumer loop.
//!
//! `Idle -> Polling -> Handling -> Committing -> Polling ...` until shutdown or
//! an unrecoverable error. The offset of a message is committed only after it
//! was projected or dead-lettered, so a crash in between redelivers it.

use std::sync::Arc;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use sm_post_core::broker::{BrokerMessage, MessageSubscription};
use sm_post_core::clock::{Clock, SystemClock};
use sm_post_core::error::DomainError;
use sm_post_core::repository::StoredEvent;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::dead_letter::{DeadLetter, DeadLetterSink};
use super::event_handler::{PostProjector, ProjectionOutcome};

/// Tuning for the consumer loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerConfig {
    /// How long one poll waits for a message.
    pub poll_timeout: Duration,
    /// First retry delay for retryable failures.
    pub retry_min_delay: Duration,
    /// Upper bound of the retry delay.
    pub retry_max_delay: Duration,
    /// Retries before a message is dead-lettered.
    pub max_retries: usize,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_millis(500),
            retry_min_delay: Duration::from_millis(100),
            retry_max_delay: Duration::from_secs(5),
            max_retries: 5,
        }
    }
}

/// Where the consumer loop is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    /// Constructed, not running.
    Idle,
    /// Waiting for the next message.
    Polling,
    /// Projecting a message.
    Handling,
    /// Committing the offset of a handled message.
    Committing,
    /// Finished.
    Stopped,
}

/// Counters reported when the loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Messages received.
    pub received: u64,
    /// Events that changed the read side.
    pub applied: u64,
    /// Redelivered events that were skipped.
    pub duplicates: u64,
    /// Messages sent to the dead letter sink.
    pub dead_lettered: u64,
    /// Retries of retryable failures.
    pub retries: u64,
}

enum Handled {
    Finished,
    Interrupted,
}

/// Reads the event topic and drives the projector.
pub struct EventConsumer {
    subscription: Box<dyn MessageSubscription>,
    projector: Arc<PostProjector>,
    dead_letters: Arc<dyn DeadLetterSink>,
    config: ConsumerConfig,
    clock: Arc<dyn Clock>,
    state: ConsumerState,
    stats: ConsumerStats,
}

impl EventConsumer {
    /// Creates an idle consumer.
    pub fn new(
        subscription: Box<dyn MessageSubscription>,
        projector: Arc<PostProjector>,
        dead_letters: Arc<dyn DeadLetterSink>,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            subscription,
            projector,
            dead_letters,
            config,
            clock: Arc::new(SystemClock),
            state: ConsumerState::Idle,
            stats: ConsumerStats::default(),
        }
    }

    /// Replaces the clock used to timestamp dead letters.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Current loop state.
    #[must_use]
    pub fn state(&self) -> ConsumerState {
        self.state
    }

    /// Runs until `shutdown` becomes `true` (or its sender is dropped).
    ///
    /// # Errors
    ///
    /// Returns the sink's error if a message could not be dead-lettered. The
    /// message is left uncommitted.
    pub async fn run(
        mut self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<ConsumerStats, DomainError> {
        info!(config = ?self.config, "projector consumer started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.transition(ConsumerState::Polling);
            let polled = tokio::select! {
                polled = self.subscription.poll(self.config.poll_timeout) => Some(polled),
                _ = shutdown.changed() => None,
            };
            let Some(polled) = polled else {
                break;
            };

            let message = match polled {
                Ok(Some(message)) => message,
                Ok(None) => continue,
                Err(e) => {
                    warn!(error = %e, "poll failed");
                    if pause(self.config.retry_min_delay, &mut shutdown).await {
                        break;
                    }
                    continue;
                }
            };

            self.stats.received += 1;
            self.transition(ConsumerState::Handling);
            match self.handle(&message, &mut shutdown).await {
                Ok(Handled::Finished) => {}
                Ok(Handled::Interrupted) => break,
                Err(e) => {
                    error!(
                        error = %e,
                        partition = message.partition,
                        offset = message.offset,
                        "dead letter write failed, stopping without commit"
                    );
                    self.transition(ConsumerState::Stopped);
                    return Err(e);
                }
            }

            self.transition(ConsumerState::Committing);
            if let Err(e) = self.subscription.commit(&message).await {
                warn!(
                    error = %e,
                    partition = message.partition,
                    offset = message.offset,
                    "offset commit failed, message may be redelivered"
                );
            }
        }

        self.transition(ConsumerState::Stopped);
        info!(stats = ?self.stats, "projector consumer stopped");
        Ok(self.stats)
    }

    fn transition(&mut self, next: ConsumerState) {
        debug!(from = ?self.state, to = ?next, "consumer state");
        self.state = next;
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.config.retry_min_delay)
            .with_max_delay(self.config.retry_max_delay)
            .with_max_times(self.config.max_retries)
    }

    async fn handle(
        &mut self,
        message: &BrokerMessage,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<Handled, DomainError> {
        let envelope = match StoredEvent::from_message(&message.payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.dead_letter(message, None, &e, 1).await?;
                return Ok(Handled::Finished);
            }
        };

        let mut delays = self.backoff().build();
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            let err = match self.projector.project(&envelope).await {
                Ok(ProjectionOutcome::Applied) => {
                    self.stats.applied += 1;
                    return Ok(Handled::Finished);
                }
                Ok(ProjectionOutcome::Duplicate) => {
                    self.stats.duplicates += 1;
                    return Ok(Handled::Finished);
                }
                Err(e) => e,
            };

            let delay = if err.is_retryable() { delays.next() } else { None };
            if let Some(delay) = delay {
                self.stats.retries += 1;
                warn!(
                    error = %err,
                    aggregate_id = %envelope.aggregate_id,
                    version = envelope.version,
                    attempt = attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "projection failed, retrying"
                );
                if pause(delay, shutdown).await {
                    return Ok(Handled::Interrupted);
                }
                continue;
            }

            self.dead_letter(message, Some(&envelope), &err, attempts)
                .await?;
            return Ok(Handled::Finished);
        }
    }

    async fn dead_letter(
        &mut self,
        message: &BrokerMessage,
        envelope: Option<&StoredEvent>,
        err: &DomainError,
        attempts: u32,
    ) -> Result<(), DomainError> {
        let letter = DeadLetter::new(message, envelope, err, attempts, self.clock.now());
        self.dead_letters.send(&letter).await?;
        self.stats.dead_lettered += 1;
        warn!(
            error = %err,
            partition = message.partition,
            offset = message.offset,
            attempts,
            "message dead-lettered"
        );
        Ok(())
    }
}

/// Sleeps for `delay`. Returns `true` if shutdown was signalled meanwhile.
async fn pause(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        () = tokio::time::sleep(delay) => false,
        _ = shutdown.changed() => true,
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use sm_post_broker::InMemoryBroker;
    use sm_post_core::broker::MessagePublisher;
    use sm_post_core::repository::NewEvent;
    use sm_post_events::{
        POST_AGGREGATE_TYPE, PostCreated, PostEvent, PostEventKind, PostLiked,
    };
    use sm_post_test_support::FixedClock;
    use tokio::task::JoinHandle;
    use uuid::Uuid;

    use super::*;
    use crate::domain::entities::PostEntity;
    use crate::domain::repositories::PostRepository;
    use crate::infrastructure::InMemoryPostRepository;
    use crate::projection::dead_letter::InMemoryDeadLetterQueue;

    const TOPIC: &str = "post-events";
    const GROUP: &str = "projector";

    struct FailingSink;

    #[async_trait]
    impl DeadLetterSink for FailingSink {
        async fn send(&self, _letter: &DeadLetter) -> Result<(), DomainError> {
            Err(DomainError::Infrastructure("dead letter store down".into()))
        }
    }

    fn config() -> ConsumerConfig {
        ConsumerConfig {
            poll_timeout: Duration::from_millis(20),
            retry_min_delay: Duration::from_millis(5),
            retry_max_delay: Duration::from_millis(20),
            max_retries: 3,
        }
    }

    fn envelope(post_id: Uuid, version: i64, kind: PostEventKind) -> StoredEvent {
        let event = PostEvent::raise(post_id, Uuid::new_v4(), FixedClock::default_instant().0, kind);
        NewEvent::from_domain_event(POST_AGGREGATE_TYPE, &event).into_stored(version)
    }

    fn created(post_id: Uuid) -> StoredEvent {
        envelope(
            post_id,
            1,
            PostEventKind::PostCreated(PostCreated {
                post_id,
                author: "alice".to_owned(),
                message: "hello".to_owned(),
                date_posted: FixedClock::default_instant().0,
            }),
        )
    }

    fn liked(post_id: Uuid, version: i64) -> StoredEvent {
        envelope(post_id, version, PostEventKind::PostLiked(PostLiked { post_id }))
    }

    async fn publish(broker: &InMemoryBroker, event: &StoredEvent) {
        broker
            .publish(TOPIC, &event.aggregate_id.to_string(), &event.to_message().unwrap())
            .await
            .unwrap();
    }

    struct Harness {
        broker: InMemoryBroker,
        repository: Arc<InMemoryPostRepository>,
        dead_letters: Arc<InMemoryDeadLetterQueue>,
        shutdown: watch::Sender<bool>,
        task: JoinHandle<Result<ConsumerStats, DomainError>>,
    }

    impl Harness {
        fn start() -> Self {
            Self::start_with(config(), None)
        }

        fn start_with(config: ConsumerConfig, sink: Option<Arc<dyn DeadLetterSink>>) -> Self {
            let broker = InMemoryBroker::new(1);
            let repository = Arc::new(InMemoryPostRepository::new());
            let dead_letters = Arc::new(InMemoryDeadLetterQueue::new());
            let sink = sink.unwrap_or_else(|| dead_letters.clone() as Arc<dyn DeadLetterSink>);
            let consumer = EventConsumer::new(
                Box::new(broker.subscribe(TOPIC, GROUP).unwrap()),
                Arc::new(PostProjector::new(repository.clone())),
                sink,
                config,
            )
            .with_clock(Arc::new(FixedClock::default_instant()));
            let (shutdown, rx) = watch::channel(false);
            let task = tokio::spawn(consumer.run(rx));
            Self {
                broker,
                repository,
                dead_letters,
                shutdown,
                task,
            }
        }

        async fn wait_for_commit(&self, offset: i64) {
            tokio::time::timeout(Duration::from_secs(5), async {
                while self.broker.committed_offset(GROUP, TOPIC, 0) != Some(offset) {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
            .await
            .expect("consumer did not commit in time");
        }

        async fn stop(self) -> ConsumerStats {
            self.shutdown.send(true).unwrap();
            self.task.await.unwrap().unwrap()
        }
    }

    #[tokio::test]
    async fn test_projects_events_and_commits_offsets() {
        // Arrange
        let harness = Harness::start();
        let post_id = Uuid::new_v4();
        publish(&harness.broker, &created(post_id)).await;
        publish(&harness.broker, &liked(post_id, 2)).await;

        // Act
        harness.wait_for_commit(2).await;
        let repository = harness.repository.clone();
        let stats = harness.stop().await;

        // Assert
        assert_eq!(stats.received, 2);
        assert_eq!(stats.applied, 2);
        let view = repository.get_by_id(post_id).await.unwrap().unwrap();
        assert_eq!(view.likes, 1);
        assert_eq!(view.version, 2);
    }

    #[tokio::test]
    async fn test_redelivered_message_counts_as_duplicate() {
        // Arrange
        let harness = Harness::start();
        let post_id = Uuid::new_v4();
        let like = liked(post_id, 2);
        publish(&harness.broker, &created(post_id)).await;
        publish(&harness.broker, &like).await;
        publish(&harness.broker, &like).await;

        // Act
        harness.wait_for_commit(3).await;
        let repository = harness.repository.clone();
        let stats = harness.stop().await;

        // Assert
        assert_eq!(stats.applied, 2);
        assert_eq!(stats.duplicates, 1);
        let view = repository.get_by_id(post_id).await.unwrap().unwrap();
        assert_eq!(view.likes, 1);
    }

    #[tokio::test]
    async fn test_undecodable_message_is_dead_lettered_and_committed() {
        // Arrange
        let harness = Harness::start();
        harness
            .broker
            .publish(TOPIC, "garbage", b"not an envelope")
            .await
            .unwrap();

        // Act
        harness.wait_for_commit(1).await;
        let dead_letters = harness.dead_letters.clone();
        let stats = harness.stop().await;

        // Assert
        assert_eq!(stats.dead_lettered, 1);
        let letters = dead_letters.letters();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].payload, "not an envelope");
        assert_eq!(letters[0].attempts, 1);
        assert!(letters[0].aggregate_id.is_none());
    }

    #[tokio::test]
    async fn test_unknown_event_kind_is_dead_lettered_without_retry() {
        // Arrange
        let harness = Harness::start();
        let mut event = created(Uuid::new_v4());
        event.payload = serde_json::json!({ "type": "post.pinned" });
        publish(&harness.broker, &event).await;

        // Act
        harness.wait_for_commit(1).await;
        let dead_letters = harness.dead_letters.clone();
        let stats = harness.stop().await;

        // Assert
        assert_eq!(stats.retries, 0);
        assert_eq!(stats.dead_lettered, 1);
        assert!(dead_letters.letters()[0].error.contains("post.pinned"));
    }

    #[tokio::test]
    async fn test_pending_projection_is_dead_lettered_after_max_retries() {
        // Arrange
        let harness = Harness::start();
        let post_id = Uuid::new_v4();
        publish(&harness.broker, &liked(post_id, 2)).await;

        // Act
        harness.wait_for_commit(1).await;
        let dead_letters = harness.dead_letters.clone();
        let stats = harness.stop().await;

        // Assert
        assert_eq!(stats.retries, 3);
        assert_eq!(stats.dead_lettered, 1);
        let letter = &dead_letters.letters()[0];
        assert_eq!(letter.attempts, 4);
        assert_eq!(letter.aggregate_id, Some(post_id));
        assert_eq!(letter.version, Some(2));
    }

    #[tokio::test]
    async fn test_pending_projection_succeeds_once_view_appears() {
        // Arrange
        let patient = ConsumerConfig {
            retry_max_delay: Duration::from_millis(50),
            max_retries: 10,
            ..config()
        };
        let harness = Harness::start_with(patient, None);
        let post_id = Uuid::new_v4();
        let repository = harness.repository.clone();
        publish(&harness.broker, &liked(post_id, 2)).await;

        // Act
        tokio::time::sleep(Duration::from_millis(8)).await;
        repository
            .create(&PostEntity {
                post_id,
                author: "alice".to_owned(),
                message: "hello".to_owned(),
                date_posted: Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
                likes: 0,
                comments: Vec::new(),
                version: 1,
            })
            .await
            .unwrap();
        harness.wait_for_commit(1).await;
        let stats = harness.stop().await;

        // Assert
        assert_eq!(stats.applied, 1);
        assert_eq!(stats.dead_lettered, 0);
        let view = repository.get_by_id(post_id).await.unwrap().unwrap();
        assert_eq!(view.likes, 1);
    }

    #[tokio::test]
    async fn test_failed_dead_letter_write_stops_without_commit() {
        // Arrange
        let harness = Harness::start_with(config(), Some(Arc::new(FailingSink)));
        harness
            .broker
            .publish(TOPIC, "garbage", b"not an envelope")
            .await
            .unwrap();

        // Act
        let result = tokio::time::timeout(Duration::from_secs(5), harness.task)
            .await
            .unwrap()
            .unwrap();

        // Assert
        assert!(matches!(result, Err(DomainError::Infrastructure(_))));
        assert_eq!(harness.broker.committed_offset(GROUP, TOPIC, 0), None);
    }

    #[tokio::test]
    async fn test_shutdown_stops_idle_consumer() {
        // Arrange
        let harness = Harness::start();

        // Act
        let stats = harness.stop().await;

        // Assert
        assert_eq!(stats, ConsumerStats::default());
    }

    #[tokio::test]
    async fn test_new_consumer_is_idle() {
        // Arrange
        let broker = InMemoryBroker::new(1);
        let consumer = EventConsumer::new(
            Box::new(broker.subscribe(TOPIC, GROUP).unwrap()),
            Arc::new(PostProjector::new(Arc::new(InMemoryPostRepository::new()))),
            Arc::new(InMemoryDeadLetterQueue::new()),
            ConsumerConfig::default(),
        );

        // Act
        let state = consumer.state();

        // Assert
        assert_eq!(state, ConsumerState::Idle);
    }
}
