//! Command handlers for posts.
//!
//! Each handler loads the post's history, replays it, runs the command on the
//! aggregate and appends the new events at the version the post was loaded
//! at.

use std::sync::Arc;

use async_trait::async_trait;
use sm_post_core::aggregate::AggregateRoot;
use sm_post_core::clock::Clock;
use sm_post_core::command::{CommandDispatcher, CommandHandler};
use sm_post_core::error::DomainError;
use sm_post_core::repository::{NewEvent, StoredEvent};
use sm_post_event_store::EventStore;
use sm_post_events::{POST_AGGREGATE_TYPE, PostEvent};
use tracing::debug;
use uuid::Uuid;

use crate::domain::aggregates::PostAggregate;
use crate::domain::commands::{
    AddComment, DeletePost, EditComment, EditMessage, LikePost, NewPost, PostCommand,
    RemoveComment,
};

/// Reconstitutes a `PostAggregate` from stored events.
///
/// # Errors
///
/// Returns `DomainError::Serialization` or `DomainError::UnknownEventKind` if
/// a stored payload cannot be decoded.
pub(crate) fn reconstitute(
    post_id: Uuid,
    existing_events: &[StoredEvent],
) -> Result<PostAggregate, DomainError> {
    let mut post = PostAggregate::new(post_id);
    for stored in existing_events {
        let event = PostEvent::from_stored(stored)?;
        post.apply(&event);
    }
    Ok(post)
}

async fn load(post_id: Uuid, store: &EventStore) -> Result<PostAggregate, DomainError> {
    let existing_events = store.load(post_id).await?;
    reconstitute(post_id, &existing_events)
}

async fn persist(
    post: &mut PostAggregate,
    store: &EventStore,
) -> Result<Vec<StoredEvent>, DomainError> {
    let new_events: Vec<NewEvent> = post
        .uncommitted_events()
        .iter()
        .map(|event| NewEvent::from_domain_event(POST_AGGREGATE_TYPE, event))
        .collect();

    let stored = store
        .append(post.aggregate_id(), post.expected_version(), &new_events)
        .await?;
    post.clear_uncommitted_events();
    Ok(stored)
}

/// Handles `NewPost`: creates the post and appends `PostCreated` to a stream
/// that must not exist yet.
///
/// # Errors
///
/// Returns `DomainError::InvalidArgument` for a blank author or message and
/// `DomainError::ConcurrencyConflict` if the post id is taken.
pub async fn handle_new_post(
    command: &NewPost,
    clock: &dyn Clock,
    store: &EventStore,
) -> Result<Vec<StoredEvent>, DomainError> {
    let mut post = PostAggregate::new(command.post_id);
    post.create(&command.author, &command.message, command.correlation_id, clock)?;
    persist(&mut post, store).await
}

/// Handles `EditMessage`.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the post has no history, the
/// aggregate's rejection, or the store's error.
pub async fn handle_edit_message(
    command: &EditMessage,
    clock: &dyn Clock,
    store: &EventStore,
) -> Result<Vec<StoredEvent>, DomainError> {
    let mut post = load(command.post_id, store).await?;
    post.edit_message(&command.message, command.correlation_id, clock)?;
    persist(&mut post, store).await
}

/// Handles `LikePost`.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the post has no history, the
/// aggregate's rejection, or the store's error.
pub async fn handle_like_post(
    command: &LikePost,
    clock: &dyn Clock,
    store: &EventStore,
) -> Result<Vec<StoredEvent>, DomainError> {
    let mut post = load(command.post_id, store).await?;
    post.like(command.correlation_id, clock)?;
    persist(&mut post, store).await
}

/// Handles `AddComment`.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the post has no history, the
/// aggregate's rejection, or the store's error.
pub async fn handle_add_comment(
    command: &AddComment,
    clock: &dyn Clock,
    store: &EventStore,
) -> Result<Vec<StoredEvent>, DomainError> {
    let mut post = load(command.post_id, store).await?;
    post.add_comment(
        command.comment_id,
        &command.comment,
        &command.username,
        command.correlation_id,
        clock,
    )?;
    persist(&mut post, store).await
}

/// Handles `EditComment`.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the post has no history, the
/// aggregate's rejection, or the store's error.
pub async fn handle_edit_comment(
    command: &EditComment,
    clock: &dyn Clock,
    store: &EventStore,
) -> Result<Vec<StoredEvent>, DomainError> {
    let mut post = load(command.post_id, store).await?;
    post.edit_comment(
        command.comment_id,
        &command.comment,
        &command.username,
        command.correlation_id,
        clock,
    )?;
    persist(&mut post, store).await
}

/// Handles `RemoveComment`.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the post has no history, the
/// aggregate's rejection, or the store's error.
pub async fn handle_remove_comment(
    command: &RemoveComment,
    clock: &dyn Clock,
    store: &EventStore,
) -> Result<Vec<StoredEvent>, DomainError> {
    let mut post = load(command.post_id, store).await?;
    post.remove_comment(
        command.comment_id,
        &command.username,
        command.correlation_id,
        clock,
    )?;
    persist(&mut post, store).await
}

/// Handles `DeletePost`.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the post has no history, the
/// aggregate's rejection, or the store's error.
pub async fn handle_delete_post(
    command: &DeletePost,
    clock: &dyn Clock,
    store: &EventStore,
) -> Result<Vec<StoredEvent>, DomainError> {
    let mut post = load(command.post_id, store).await?;
    post.delete(&command.username, command.correlation_id, clock)?;
    persist(&mut post, store).await
}

/// Routes every `PostCommand` to its handler function.
pub struct PostCommandHandler {
    store: Arc<EventStore>,
    clock: Arc<dyn Clock>,
}

impl PostCommandHandler {
    /// Creates a handler writing through `store`.
    pub fn new(store: Arc<EventStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }
}

#[async_trait]
impl CommandHandler<PostCommand> for PostCommandHandler {
    async fn handle(&self, command: PostCommand) -> Result<Vec<StoredEvent>, DomainError> {
        let clock = self.clock.as_ref();
        let store = self.store.as_ref();
        let post_id = command.post_id();

        let result = match &command {
            PostCommand::NewPost(c) => handle_new_post(c, clock, store).await,
            PostCommand::EditMessage(c) => handle_edit_message(c, clock, store).await,
            PostCommand::LikePost(c) => handle_like_post(c, clock, store).await,
            PostCommand::AddComment(c) => handle_add_comment(c, clock, store).await,
            PostCommand::EditComment(c) => handle_edit_comment(c, clock, store).await,
            PostCommand::RemoveComment(c) => handle_remove_comment(c, clock, store).await,
            PostCommand::DeletePost(c) => handle_delete_post(c, clock, store).await,
        };

        if let Ok(events) = &result {
            debug!(post_id = %post_id, count = events.len(), "post command applied");
        }
        result
    }
}

/// Registers `handler` for every post command kind.
///
/// # Errors
///
/// Returns `DomainError::AlreadyRegistered` if any kind is taken.
pub fn register_command_handlers(
    dispatcher: &mut CommandDispatcher<PostCommand>,
    handler: Arc<PostCommandHandler>,
) -> Result<(), DomainError> {
    for kind in PostCommand::KINDS {
        dispatcher.register(kind, handler.clone())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use sm_post_core::broker::MessagePublisher;
    use sm_post_core::repository::{EventRepository, ExpectedVersion};
    use sm_post_event_store::InMemoryEventRepository;
    use sm_post_test_support::{
        EmptyEventRepository, FailingEventRepository, FixedClock, RecordingEventRepository,
        RecordingPublisher,
    };

    use super::*;

    fn store_over(repository: Arc<dyn EventRepository>) -> (EventStore, Arc<RecordingPublisher>) {
        let publisher = Arc::new(RecordingPublisher::new());
        let store = EventStore::new(
            repository,
            Arc::clone(&publisher) as Arc<dyn MessagePublisher>,
            "post-events",
        );
        (store, publisher)
    }

    fn history_of_new_post(post_id: Uuid, author: &str, clock: &FixedClock) -> Vec<StoredEvent> {
        let mut post = PostAggregate::new(post_id);
        post.create(author, "hello world", Uuid::new_v4(), clock)
            .unwrap();
        post.uncommitted_events()
            .iter()
            .zip(1..)
            .map(|(event, version)| {
                NewEvent::from_domain_event(POST_AGGREGATE_TYPE, event).into_stored(version)
            })
            .collect()
    }

    #[tokio::test]
    async fn test_handle_new_post_appends_post_created_to_new_stream() {
        // Arrange
        let post_id = Uuid::new_v4();
        let correlation_id = Uuid::new_v4();
        let clock = FixedClock::default_instant();
        let repo = Arc::new(RecordingEventRepository::new(Vec::new()));
        let (store, publisher) = store_over(repo.clone());
        let command = NewPost {
            correlation_id,
            post_id,
            author: "alice".into(),
            message: "hello world".into(),
        };

        // Act
        let stored = handle_new_post(&command, &clock, &store).await.unwrap();

        // Assert
        let appended = repo.appended_events();
        assert_eq!(appended.len(), 1);
        let (agg_id, expected_version, events) = &appended[0];
        assert_eq!(*agg_id, post_id);
        assert_eq!(*expected_version, ExpectedVersion::NoStream);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "post.created");
        assert_eq!(events[0].aggregate_type, "post");
        assert_eq!(events[0].correlation_id, correlation_id);
        assert_eq!(events[0].occurred_at, clock.0);
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].version, 1);
        assert_eq!(publisher.published_events(), stored);
    }

    #[tokio::test]
    async fn test_handle_new_post_with_blank_author_persists_nothing() {
        // Arrange
        let clock = FixedClock::default_instant();
        let repo = Arc::new(RecordingEventRepository::new(Vec::new()));
        let (store, publisher) = store_over(repo.clone());
        let command = NewPost {
            correlation_id: Uuid::new_v4(),
            post_id: Uuid::new_v4(),
            author: " ".into(),
            message: "hello".into(),
        };

        // Act
        let result = handle_new_post(&command, &clock, &store).await;

        // Assert
        assert!(matches!(result, Err(DomainError::InvalidArgument(_))));
        assert!(repo.appended_events().is_empty());
        assert!(publisher.messages().is_empty());
    }

    #[tokio::test]
    async fn test_handle_new_post_with_taken_id_is_concurrency_conflict() {
        // Arrange
        let clock = FixedClock::default_instant();
        let (store, _publisher) = store_over(Arc::new(InMemoryEventRepository::new()));
        let command = NewPost {
            correlation_id: Uuid::new_v4(),
            post_id: Uuid::new_v4(),
            author: "alice".into(),
            message: "hello".into(),
        };
        handle_new_post(&command, &clock, &store).await.unwrap();

        // Act
        let result = handle_new_post(&command, &clock, &store).await;

        // Assert
        assert!(matches!(
            result,
            Err(DomainError::ConcurrencyConflict { actual: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_handle_like_post_appends_at_loaded_version() {
        // Arrange
        let post_id = Uuid::new_v4();
        let clock = FixedClock::default_instant();
        let repo = Arc::new(RecordingEventRepository::new(history_of_new_post(
            post_id, "alice", &clock,
        )));
        let (store, _publisher) = store_over(repo.clone());
        let command = LikePost {
            correlation_id: Uuid::new_v4(),
            post_id,
        };

        // Act
        let stored = handle_like_post(&command, &clock, &store).await.unwrap();

        // Assert
        let appended = repo.appended_events();
        assert_eq!(appended.len(), 1);
        assert_eq!(appended[0].1, ExpectedVersion::Exact(1));
        assert_eq!(appended[0].2[0].event_type, "post.liked");
        assert_eq!(stored[0].version, 2);
    }

    #[tokio::test]
    async fn test_handle_like_post_on_missing_post_is_aggregate_not_found() {
        // Arrange
        let post_id = Uuid::new_v4();
        let clock = FixedClock::default_instant();
        let (store, _publisher) = store_over(Arc::new(EmptyEventRepository));
        let command = LikePost {
            correlation_id: Uuid::new_v4(),
            post_id,
        };

        // Act
        let result = handle_like_post(&command, &clock, &store).await;

        // Assert
        match result {
            Err(DomainError::AggregateNotFound(id)) => assert_eq!(id, post_id),
            other => panic!("expected AggregateNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_handle_delete_post_by_other_user_is_permission_denied() {
        // Arrange
        let post_id = Uuid::new_v4();
        let clock = FixedClock::default_instant();
        let repo = Arc::new(RecordingEventRepository::new(history_of_new_post(
            post_id, "alice", &clock,
        )));
        let (store, _publisher) = store_over(repo.clone());
        let command = DeletePost {
            correlation_id: Uuid::new_v4(),
            post_id,
            username: "bob".into(),
        };

        // Act
        let result = handle_delete_post(&command, &clock, &store).await;

        // Assert
        assert!(matches!(result, Err(DomainError::PermissionDenied(_))));
        assert!(repo.appended_events().is_empty());
    }

    #[tokio::test]
    async fn test_handle_edit_message_propagates_infrastructure_error() {
        // Arrange
        let clock = FixedClock::default_instant();
        let (store, _publisher) = store_over(Arc::new(FailingEventRepository));
        let command = EditMessage {
            correlation_id: Uuid::new_v4(),
            post_id: Uuid::new_v4(),
            message: "new text".into(),
        };

        // Act
        let result = handle_edit_message(&command, &clock, &store).await;

        // Assert
        match result {
            Err(DomainError::Infrastructure(msg)) => assert!(msg.contains("connection refused")),
            other => panic!("expected Infrastructure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_comment_lifecycle_through_in_memory_store() {
        // Arrange
        let post_id = Uuid::new_v4();
        let comment_id = Uuid::new_v4();
        let clock = FixedClock::default_instant();
        let (store, publisher) = store_over(Arc::new(InMemoryEventRepository::new()));
        handle_new_post(
            &NewPost {
                correlation_id: Uuid::new_v4(),
                post_id,
                author: "alice".into(),
                message: "hello".into(),
            },
            &clock,
            &store,
        )
        .await
        .unwrap();

        // Act
        handle_add_comment(
            &AddComment {
                correlation_id: Uuid::new_v4(),
                post_id,
                comment_id,
                comment: "hi".into(),
                username: "bob".into(),
            },
            &clock,
            &store,
        )
        .await
        .unwrap();
        handle_edit_comment(
            &EditComment {
                correlation_id: Uuid::new_v4(),
                post_id,
                comment_id,
                comment: "hi there".into(),
                username: "Bob".into(),
            },
            &clock,
            &store,
        )
        .await
        .unwrap();
        handle_remove_comment(
            &RemoveComment {
                correlation_id: Uuid::new_v4(),
                post_id,
                comment_id,
                username: "bob".into(),
            },
            &clock,
            &store,
        )
        .await
        .unwrap();

        // Assert
        let history = store.load(post_id).await.unwrap();
        let post = reconstitute(post_id, &history).unwrap();
        assert_eq!(post.version(), 4);
        assert!(post.comment(comment_id).is_none());
        let types: Vec<String> = publisher
            .published_events()
            .into_iter()
            .map(|e| e.event_type)
            .collect();
        assert_eq!(
            types,
            vec![
                "post.created",
                "post.comment_added",
                "post.comment_updated",
                "post.comment_removed"
            ]
        );
    }

    #[test]
    fn test_reconstitute_rejects_unknown_event_kind() {
        // Arrange
        let post_id = Uuid::new_v4();
        let clock = FixedClock::default_instant();
        let mut history = history_of_new_post(post_id, "alice", &clock);
        history[0].payload = serde_json::json!({"type": "post.pinned", "post_id": post_id});

        // Act
        let result = reconstitute(post_id, &history);

        // Assert
        assert!(matches!(result, Err(DomainError::UnknownEventKind(kind)) if kind == "post.pinned"));
    }

    #[tokio::test]
    async fn test_dispatcher_routes_every_post_command_kind() {
        // Arrange
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::default_instant());
        let (store, _publisher) = store_over(Arc::new(InMemoryEventRepository::new()));
        let handler = Arc::new(PostCommandHandler::new(Arc::new(store), clock));
        let mut dispatcher = CommandDispatcher::new();
        register_command_handlers(&mut dispatcher, handler).unwrap();
        let post_id = Uuid::new_v4();

        // Act
        let created = dispatcher
            .send(PostCommand::NewPost(NewPost {
                correlation_id: Uuid::new_v4(),
                post_id,
                author: "alice".into(),
                message: "hello".into(),
            }))
            .await
            .unwrap();
        let liked = dispatcher
            .send(PostCommand::LikePost(LikePost {
                correlation_id: Uuid::new_v4(),
                post_id,
            }))
            .await
            .unwrap();

        // Assert
        for kind in PostCommand::KINDS {
            assert!(dispatcher.is_registered(kind));
        }
        assert_eq!(created[0].version, 1);
        assert_eq!(liked[0].version, 2);
    }

    #[test]
    fn test_registering_twice_is_already_registered() {
        let (store, _publisher) = store_over(Arc::new(EmptyEventRepository));
        let handler = Arc::new(PostCommandHandler::new(
            Arc::new(store),
            Arc::new(FixedClock::default_instant()),
        ));
        let mut dispatcher = CommandDispatcher::new();
        register_command_handlers(&mut dispatcher, handler.clone()).unwrap();

        let result = register_command_handlers(&mut dispatcher, handler);

        assert!(matches!(result, Err(DomainError::AlreadyRegistered(_))));
    }
}
