//! Process wiring: stores, broker, dispatchers and background tasks.

use std::sync::Arc;

use sm_post_broker::InMemoryBroker;
use sm_post_command::application::command_handlers::{
    PostCommandHandler, register_command_handlers,
};
use sm_post_core::broker::{MessagePublisher, MessageSubscription};
use sm_post_core::clock::SystemClock;
use sm_post_core::command::CommandDispatcher;
use sm_post_core::error::DomainError;
use sm_post_core::query::QueryDispatcher;
use sm_post_core::repository::EventRepository;
use sm_post_event_store::{
    EventStore, InMemoryEventRepository, OutboxRelayHandle, PgEventRepository,
    spawn_outbox_relay,
};
use sm_post_query::application::query_handlers::{PostQueryHandler, register_query_handlers};
use sm_post_query::domain::repositories::PostRepository;
use sm_post_query::infrastructure::{InMemoryPostRepository, PgPostRepository};
use sm_post_query::projection::{
    BrokerDeadLetterSink, ConsumerStats, EventConsumer, PostProjector,
};
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::{BrokerKind, Settings};
use crate::error::AppError;
use crate::state::AppState;

/// A wired process: request state plus the projector and outbox relay tasks.
pub struct Application {
    /// State handed to the router.
    pub state: AppState,
    projector_shutdown: watch::Sender<bool>,
    projector: JoinHandle<Result<ConsumerStats, DomainError>>,
    outbox_relay: OutboxRelayHandle,
}

impl Application {
    /// Stops the projector and the outbox relay and waits for both.
    pub async fn shutdown(self) {
        let _ = self.projector_shutdown.send(true);
        match self.projector.await {
            Ok(Ok(stats)) => info!(stats = ?stats, "projector stopped"),
            Ok(Err(e)) => error!(error = %e, "projector stopped with an error"),
            Err(e) => error!(error = %e, "projector task ended abnormally"),
        }
        self.outbox_relay.stop().await;
    }
}

type Stores = (Arc<dyn EventRepository>, Arc<dyn PostRepository>);
type Broker = (Arc<dyn MessagePublisher>, Box<dyn MessageSubscription>);

async fn stores(settings: &Settings) -> Result<Stores, AppError> {
    let Some(database_url) = settings.database_url.as_deref() else {
        warn!("DATABASE_URL not set, using in-memory stores");
        let events: Arc<dyn EventRepository> = Arc::new(InMemoryEventRepository::new());
        let posts: Arc<dyn PostRepository> = Arc::new(InMemoryPostRepository::new());
        return Ok((events, posts));
    };

    let pool = PgPoolOptions::new()
        .max_connections(settings.database_max_connections)
        .connect(database_url)
        .await?;
    sqlx::migrate!("../../migrations").run(&pool).await?;
    info!("database migrations applied");

    let events: Arc<dyn EventRepository> = Arc::new(PgEventRepository::new(pool.clone()));
    let posts: Arc<dyn PostRepository> = Arc::new(PgPostRepository::new(pool));
    Ok((events, posts))
}

fn broker(settings: &Settings) -> Result<Broker, AppError> {
    match settings.broker {
        BrokerKind::Memory => {
            let broker = InMemoryBroker::new(settings.broker_partitions);
            let subscription: Box<dyn MessageSubscription> = Box::new(
                broker.subscribe(&settings.event_topic, &settings.consumer_group_id)?,
            );
            let publisher: Arc<dyn MessagePublisher> = Arc::new(broker);
            Ok((publisher, subscription))
        }
        BrokerKind::Kafka => kafka_broker(settings),
    }
}

#[cfg(feature = "kafka")]
fn kafka_broker(settings: &Settings) -> Result<Broker, AppError> {
    use sm_post_broker::{KafkaPublisher, KafkaSubscription};

    let servers = settings.kafka_bootstrap_servers.as_deref().ok_or_else(|| {
        AppError::Config("KAFKA_BOOTSTRAP_SERVERS must be set when BROKER=kafka".into())
    })?;
    let publisher: Arc<dyn MessagePublisher> = Arc::new(KafkaPublisher::new(servers)?);
    let subscription: Box<dyn MessageSubscription> = Box::new(KafkaSubscription::new(
        servers,
        &settings.event_topic,
        &settings.consumer_group_id,
    )?);
    Ok((publisher, subscription))
}

#[cfg(not(feature = "kafka"))]
fn kafka_broker(_settings: &Settings) -> Result<Broker, AppError> {
    Err(AppError::Config(
        "BROKER=kafka requires building with the `kafka` feature".into(),
    ))
}

/// Builds every component and starts the projector and the outbox relay.
///
/// # Errors
///
/// Returns `AppError` if the database, the migrations or the broker cannot be
/// set up.
pub async fn bootstrap(settings: &Settings) -> Result<Application, AppError> {
    let (event_repository, post_repository) = stores(settings).await?;
    let (publisher, subscription) = broker(settings)?;

    let store = Arc::new(EventStore::new(
        event_repository,
        publisher.clone(),
        settings.event_topic.clone(),
    ));

    let mut commands = CommandDispatcher::new();
    register_command_handlers(
        &mut commands,
        Arc::new(PostCommandHandler::new(store.clone(), Arc::new(SystemClock))),
    )?;

    let mut queries = QueryDispatcher::new();
    register_query_handlers(
        &mut queries,
        Arc::new(PostQueryHandler::new(post_repository.clone())),
    )?;

    let consumer = EventConsumer::new(
        subscription,
        Arc::new(PostProjector::new(post_repository)),
        Arc::new(BrokerDeadLetterSink::new(publisher, &settings.event_topic)),
        settings.projector,
    );
    let (projector_shutdown, shutdown_rx) = watch::channel(false);
    let projector = tokio::spawn(consumer.run(shutdown_rx));

    let outbox_relay = spawn_outbox_relay(
        store,
        settings.outbox_relay_interval,
        settings.outbox_relay_batch_size,
    );

    info!(
        topic = %settings.event_topic,
        group = %settings.consumer_group_id,
        broker = ?settings.broker,
        "application wired"
    );

    Ok(Application {
        state: AppState::new(Arc::new(commands), Arc::new(queries)),
        projector_shutdown,
        projector,
        outbox_relay,
    })
}
