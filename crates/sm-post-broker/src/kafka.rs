//! Kafka adapters built on `rdkafka`.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::{Offset, TopicPartitionList};
use sm_post_core::broker::{BrokerMessage, MessagePublisher, MessageSubscription};
use sm_post_core::error::DomainError;
use tracing::{debug, info};

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

fn infrastructure(context: &str, e: &rdkafka::error::KafkaError) -> DomainError {
    DomainError::Infrastructure(format!("{context}: {e}"))
}

/// Publishes messages to Kafka.
pub struct KafkaPublisher {
    producer: FutureProducer,
}

impl KafkaPublisher {
    /// Connects a producer to `bootstrap_servers`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the producer cannot be created.
    pub fn new(bootstrap_servers: &str) -> Result<Self, DomainError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", bootstrap_servers)
            .set("message.timeout.ms", "5000")
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .create()
            .map_err(|e| infrastructure("failed to create Kafka producer", &e))?;

        info!(bootstrap_servers, "Kafka producer connected");

        Ok(Self { producer })
    }
}

#[async_trait]
impl MessagePublisher for KafkaPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), DomainError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        self.producer
            .send(record, SEND_TIMEOUT)
            .await
            .map_err(|(e, _)| infrastructure("failed to publish to Kafka", &e))?;

        debug!(topic, key, "published message to Kafka");
        Ok(())
    }
}

/// A Kafka consumer-group subscription with manual offset commit.
pub struct KafkaSubscription {
    consumer: StreamConsumer,
}

impl KafkaSubscription {
    /// Joins `group` and subscribes to `topic`. Offsets are only committed
    /// through [`MessageSubscription::commit`].
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the consumer cannot be created
    /// or subscribed.
    pub fn new(bootstrap_servers: &str, topic: &str, group: &str) -> Result<Self, DomainError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", bootstrap_servers)
            .set("group.id", group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .create()
            .map_err(|e| infrastructure("failed to create Kafka consumer", &e))?;

        consumer
            .subscribe(&[topic])
            .map_err(|e| infrastructure("failed to subscribe to Kafka topic", &e))?;

        info!(bootstrap_servers, topic, group, "Kafka consumer subscribed");

        Ok(Self { consumer })
    }
}

#[async_trait]
impl MessageSubscription for KafkaSubscription {
    async fn poll(&mut self, timeout: Duration) -> Result<Option<BrokerMessage>, DomainError> {
        match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Err(_) => Ok(None),
            Ok(Err(e)) => Err(infrastructure("failed to receive from Kafka", &e)),
            Ok(Ok(message)) => Ok(Some(BrokerMessage {
                topic: message.topic().to_owned(),
                partition: message.partition(),
                offset: message.offset(),
                key: message
                    .key()
                    .map(|key| String::from_utf8_lossy(key).into_owned()),
                payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            })),
        }
    }

    async fn commit(&mut self, message: &BrokerMessage) -> Result<(), DomainError> {
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(&message.topic, message.partition, Offset::Offset(message.offset + 1))
            .map_err(|e| infrastructure("failed to build Kafka offset list", &e))?;

        self.consumer
            .commit(&offsets, CommitMode::Sync)
            .map_err(|e| infrastructure("failed to commit Kafka offset", &e))
    }
}
