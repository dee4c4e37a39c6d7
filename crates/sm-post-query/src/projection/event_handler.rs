//! Idempotent projection of post events into post views.
//!
//! Each view remembers the version of the last event applied to it. An event
//! at or below that version is a redelivery and is skipped; an event more
//! than one version ahead means an earlier event has not been projected yet,
//! which is reported as `DomainError::ProjectionPending` so the consumer
//! retries it later. A removed post leaves a tombstone at the removal
//! version, so events redelivered after the view is gone are skipped too.

use std::sync::Arc;

use sm_post_core::error::DomainError;
use sm_post_core::repository::StoredEvent;
use sm_post_events::{
    CommentAdded, CommentRemoved, CommentUpdated, MessageUpdated, PostCreated, PostEventKind,
    decode_event_kind,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::entities::{CommentEntity, PostEntity};
use crate::domain::repositories::PostRepository;

/// What projecting one event did to the read side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionOutcome {
    /// The view changed.
    Applied,
    /// The event had been projected before; nothing changed.
    Duplicate,
}

/// Applies post events to the read repository.
pub struct PostProjector {
    repository: Arc<dyn PostRepository>,
}

impl PostProjector {
    /// Creates a projector writing to `repository`.
    pub fn new(repository: Arc<dyn PostRepository>) -> Self {
        Self { repository }
    }

    /// Projects one stored event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::UnknownEventKind` or `DomainError::Serialization`
    /// for payloads that cannot be decoded, `DomainError::ProjectionPending`
    /// when the event is ahead of its view, and repository errors unchanged.
    pub async fn project(&self, event: &StoredEvent) -> Result<ProjectionOutcome, DomainError> {
        let kind = decode_event_kind(&event.payload)?;
        let post_id = event.aggregate_id;
        let version = event.version;

        let removed = self.repository.removed_version(post_id).await?;
        if removed.is_some_and(|removed_at| version <= removed_at) {
            debug!(
                post_id = %post_id,
                version,
                event_type = %event.event_type,
                "event for removed post skipped"
            );
            return Ok(ProjectionOutcome::Duplicate);
        }

        let outcome = match kind {
            PostEventKind::PostCreated(created) => self.create_post(created, version).await?,
            PostEventKind::PostRemoved(_) => self.remove_post(post_id, version).await?,
            other => {
                let Some(mut post) = self.repository.get_by_id(post_id).await? else {
                    return Err(DomainError::ProjectionPending(format!(
                        "post {post_id} has no view yet for event version {version}"
                    )));
                };
                if version <= post.version {
                    ProjectionOutcome::Duplicate
                } else if version > post.version + 1 {
                    return Err(DomainError::ProjectionPending(format!(
                        "post {post_id} view is at version {}, event is at {version}",
                        post.version
                    )));
                } else {
                    mutate(&mut post, other);
                    post.version = version;
                    self.repository.update(&post).await?;
                    ProjectionOutcome::Applied
                }
            }
        };

        debug!(
            post_id = %post_id,
            version,
            event_type = %event.event_type,
            outcome = ?outcome,
            "event projected"
        );
        Ok(outcome)
    }

    async fn create_post(
        &self,
        created: PostCreated,
        version: i64,
    ) -> Result<ProjectionOutcome, DomainError> {
        if self.repository.get_by_id(created.post_id).await?.is_some() {
            return Ok(ProjectionOutcome::Duplicate);
        }
        self.repository
            .create(&PostEntity {
                post_id: created.post_id,
                author: created.author,
                message: created.message,
                date_posted: created.date_posted,
                likes: 0,
                comments: Vec::new(),
                version,
            })
            .await?;
        Ok(ProjectionOutcome::Applied)
    }

    async fn remove_post(
        &self,
        post_id: Uuid,
        version: i64,
    ) -> Result<ProjectionOutcome, DomainError> {
        let Some(post) = self.repository.get_by_id(post_id).await? else {
            return Ok(ProjectionOutcome::Duplicate);
        };
        if version <= post.version {
            return Ok(ProjectionOutcome::Duplicate);
        }
        if version > post.version + 1 {
            return Err(DomainError::ProjectionPending(format!(
                "post {post_id} view is at version {}, removal is at {version}",
                post.version
            )));
        }
        self.repository.delete(post_id, version).await?;
        Ok(ProjectionOutcome::Applied)
    }
}

fn mutate(post: &mut PostEntity, kind: PostEventKind) {
    match kind {
        PostEventKind::MessageUpdated(MessageUpdated { message, .. }) => post.message = message,
        PostEventKind::PostLiked(_) => post.likes = post.likes.saturating_add(1),
        PostEventKind::CommentAdded(CommentAdded {
            post_id,
            comment_id,
            comment,
            username,
            comment_date,
        }) => {
            if post.comments.iter().all(|c| c.comment_id != comment_id) {
                post.comments.push(CommentEntity {
                    comment_id,
                    post_id,
                    username,
                    comment,
                    comment_date,
                    is_edited: false,
                });
            }
        }
        PostEventKind::CommentUpdated(CommentUpdated {
            comment_id,
            comment,
            edit_date,
            ..
        }) => match post.comment_mut(comment_id) {
            Some(existing) => {
                existing.comment = comment;
                existing.comment_date = edit_date;
                existing.is_edited = true;
            }
            None => warn!(
                post_id = %post.post_id,
                comment_id = %comment_id,
                "edited comment missing from view"
            ),
        },
        PostEventKind::CommentRemoved(CommentRemoved { comment_id, .. }) => {
            post.comments.retain(|c| c.comment_id != comment_id);
        }
        PostEventKind::PostCreated(_) | PostEventKind::PostRemoved(_) => {}
    }
}
