//! Social media post service: post domain events.
//!
//! The event kinds form a closed set. Each payload carries its discriminator
//! in a `type` field equal to the stored event type, so a payload can be
//! routed without consulting the envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sm_post_core::error::DomainError;
use sm_post_core::event::{DomainEvent, EventMetadata};
use sm_post_core::repository::StoredEvent;
use uuid::Uuid;

/// Aggregate type recorded with every post event.
pub const POST_AGGREGATE_TYPE: &str = "post";

/// Discriminator of [`PostEventKind::PostCreated`].
pub const POST_CREATED: &str = "post.created";
/// Discriminator of [`PostEventKind::MessageUpdated`].
pub const MESSAGE_UPDATED: &str = "post.message_updated";
/// Discriminator of [`PostEventKind::PostLiked`].
pub const POST_LIKED: &str = "post.liked";
/// Discriminator of [`PostEventKind::CommentAdded`].
pub const COMMENT_ADDED: &str = "post.comment_added";
/// Discriminator of [`PostEventKind::CommentUpdated`].
pub const COMMENT_UPDATED: &str = "post.comment_updated";
/// Discriminator of [`PostEventKind::CommentRemoved`].
pub const COMMENT_REMOVED: &str = "post.comment_removed";
/// Discriminator of [`PostEventKind::PostRemoved`].
pub const POST_REMOVED: &str = "post.removed";

/// Every discriminator this build can decode.
pub const KNOWN_EVENT_TYPES: [&str; 7] = [
    POST_CREATED,
    MESSAGE_UPDATED,
    POST_LIKED,
    COMMENT_ADDED,
    COMMENT_UPDATED,
    COMMENT_REMOVED,
    POST_REMOVED,
];

/// Emitted when a post is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostCreated {
    /// The post identifier.
    pub post_id: Uuid,
    /// Username of the author.
    pub author: String,
    /// Post text.
    pub message: String,
    /// When the post was created.
    pub date_posted: DateTime<Utc>,
}

/// Emitted when the author replaces the post text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageUpdated {
    /// The post identifier.
    pub post_id: Uuid,
    /// New post text.
    pub message: String,
}

/// Emitted when a post receives a like.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostLiked {
    /// The post identifier.
    pub post_id: Uuid,
}

/// Emitted when a comment is added to a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentAdded {
    /// The post identifier.
    pub post_id: Uuid,
    /// The new comment's identifier.
    pub comment_id: Uuid,
    /// Comment text.
    pub comment: String,
    /// Username of the commenter.
    pub username: String,
    /// When the comment was written.
    pub comment_date: DateTime<Utc>,
}

/// Emitted when a commenter edits their comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentUpdated {
    /// The post identifier.
    pub post_id: Uuid,
    /// The edited comment's identifier.
    pub comment_id: Uuid,
    /// New comment text.
    pub comment: String,
    /// Username of the editor.
    pub username: String,
    /// When the edit happened.
    pub edit_date: DateTime<Utc>,
}

/// Emitted when a commenter removes their comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentRemoved {
    /// The post identifier.
    pub post_id: Uuid,
    /// The removed comment's identifier.
    pub comment_id: Uuid,
}

/// Emitted when the author deletes the post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRemoved {
    /// The post identifier.
    pub post_id: Uuid,
}

/// Event payload variants for posts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PostEventKind {
    /// A post was created.
    #[serde(rename = "post.created")]
    PostCreated(PostCreated),
    /// The post text was replaced.
    #[serde(rename = "post.message_updated")]
    MessageUpdated(MessageUpdated),
    /// The post was liked.
    #[serde(rename = "post.liked")]
    PostLiked(PostLiked),
    /// A comment was added.
    #[serde(rename = "post.comment_added")]
    CommentAdded(CommentAdded),
    /// A comment was edited.
    #[serde(rename = "post.comment_updated")]
    CommentUpdated(CommentUpdated),
    /// A comment was removed.
    #[serde(rename = "post.comment_removed")]
    CommentRemoved(CommentRemoved),
    /// The post was deleted.
    #[serde(rename = "post.removed")]
    PostRemoved(PostRemoved),
}

impl PostEventKind {
    /// Returns the discriminator for this kind.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::PostCreated(_) => POST_CREATED,
            Self::MessageUpdated(_) => MESSAGE_UPDATED,
            Self::PostLiked(_) => POST_LIKED,
            Self::CommentAdded(_) => COMMENT_ADDED,
            Self::CommentUpdated(_) => COMMENT_UPDATED,
            Self::CommentRemoved(_) => COMMENT_REMOVED,
            Self::PostRemoved(_) => POST_REMOVED,
        }
    }

    /// Returns the post the event belongs to.
    #[must_use]
    pub fn post_id(&self) -> Uuid {
        match self {
            Self::PostCreated(e) => e.post_id,
            Self::MessageUpdated(e) => e.post_id,
            Self::PostLiked(e) => e.post_id,
            Self::CommentAdded(e) => e.post_id,
            Self::CommentUpdated(e) => e.post_id,
            Self::CommentRemoved(e) => e.post_id,
            Self::PostRemoved(e) => e.post_id,
        }
    }
}

/// Decodes a payload by reading its discriminator first.
///
/// # Errors
///
/// Returns `DomainError::Serialization` if the payload has no string `type`
/// field or does not match the shape of its kind, and
/// `DomainError::UnknownEventKind` if the discriminator is not known.
pub fn decode_event_kind(payload: &serde_json::Value) -> Result<PostEventKind, DomainError> {
    let tag = payload
        .get("type")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| {
            DomainError::Serialization("event payload has no type discriminator".to_owned())
        })?;

    if !KNOWN_EVENT_TYPES.contains(&tag) {
        return Err(DomainError::UnknownEventKind(tag.to_owned()));
    }

    serde_json::from_value(payload.clone())
        .map_err(|e| DomainError::Serialization(format!("malformed {tag} payload: {e}")))
}

/// Domain event envelope for posts.
#[derive(Debug, Clone, PartialEq)]
pub struct PostEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: PostEventKind,
}

impl PostEvent {
    /// Builds a freshly raised event with a new event identifier.
    #[must_use]
    pub fn raise(
        post_id: Uuid,
        correlation_id: Uuid,
        occurred_at: DateTime<Utc>,
        kind: PostEventKind,
    ) -> Self {
        Self {
            metadata: EventMetadata::new(kind.event_type(), post_id, correlation_id, occurred_at),
            kind,
        }
    }

    /// Rebuilds an event from its stored record.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`decode_event_kind`].
    pub fn from_stored(stored: &StoredEvent) -> Result<Self, DomainError> {
        let kind = decode_event_kind(&stored.payload)?;
        Ok(Self {
            metadata: EventMetadata {
                event_id: stored.event_id,
                event_type: stored.event_type.clone(),
                aggregate_id: stored.aggregate_id,
                correlation_id: stored.correlation_id,
                causation_id: stored.causation_id,
                occurred_at: stored.occurred_at,
            },
            kind,
        })
    }
}

impl DomainEvent for PostEvent {
    fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    fn to_payload(&self) -> serde_json::Value {
        // Serialization of derived Serialize types to Value is infallible.
        serde_json::to_value(&self.kind).expect("PostEventKind serialization is infallible")
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}
