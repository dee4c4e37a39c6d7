//! The post aggregate.

use std::collections::HashMap;

use sm_post_core::aggregate::AggregateRoot;
use sm_post_core::clock::Clock;
use sm_post_core::error::DomainError;
use sm_post_events::{
    CommentAdded, CommentRemoved, CommentUpdated, MessageUpdated, PostCreated, PostEvent,
    PostEventKind, PostLiked, PostRemoved,
};
use uuid::Uuid;

/// A comment as the aggregate tracks it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentState {
    /// Comment text.
    pub text: String,
    /// Username of the commenter.
    pub username: String,
}

/// The aggregate root for a post.
///
/// Command methods check, in order, the post state, the arguments, that the
/// referenced comment exists, and that the caller owns what it changes.
#[derive(Debug, PartialEq)]
pub struct PostAggregate {
    /// Aggregate identifier.
    pub id: Uuid,
    /// Version of the last persisted event replayed.
    pub(crate) version: i64,
    pub(crate) active: bool,
    pub(crate) author: String,
    pub(crate) comments: HashMap<Uuid, CommentState>,
    uncommitted_events: Vec<PostEvent>,
}

fn require_text(field: &str, value: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::InvalidArgument(format!(
            "the value of {field} cannot be blank"
        )));
    }
    Ok(())
}

fn same_user(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

impl PostAggregate {
    /// Creates an empty aggregate with no history.
    #[must_use]
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            version: 0,
            active: false,
            author: String::new(),
            comments: HashMap::new(),
            uncommitted_events: Vec::new(),
        }
    }

    /// Whether the post exists and has not been deleted.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Username of the author.
    #[must_use]
    pub fn author(&self) -> &str {
        &self.author
    }

    /// The current state of a comment, if it exists.
    #[must_use]
    pub fn comment(&self, comment_id: Uuid) -> Option<&CommentState> {
        self.comments.get(&comment_id)
    }

    /// Creates the post, producing `PostCreated`.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the post already exists, `InvalidArgument` if the
    /// author or the message is blank.
    pub fn create(
        &mut self,
        author: &str,
        message: &str,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        if self.active || self.version > 0 {
            return Err(DomainError::InvalidState(format!(
                "post {} already exists",
                self.id
            )));
        }
        require_text("author", author)?;
        require_text("message", message)?;

        let date_posted = clock.now();
        self.raise(
            correlation_id,
            clock,
            PostEventKind::PostCreated(PostCreated {
                post_id: self.id,
                author: author.to_owned(),
                message: message.to_owned(),
                date_posted,
            }),
        );
        Ok(())
    }

    /// Replaces the post text, producing `MessageUpdated`.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the post is not active, `InvalidArgument` if the
    /// message is blank.
    pub fn edit_message(
        &mut self,
        message: &str,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.require_active("edit the message of")?;
        require_text("message", message)?;

        self.raise(
            correlation_id,
            clock,
            PostEventKind::MessageUpdated(MessageUpdated {
                post_id: self.id,
                message: message.to_owned(),
            }),
        );
        Ok(())
    }

    /// Likes the post, producing `PostLiked`.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the post is not active.
    pub fn like(&mut self, correlation_id: Uuid, clock: &dyn Clock) -> Result<(), DomainError> {
        self.require_active("like")?;

        self.raise(
            correlation_id,
            clock,
            PostEventKind::PostLiked(PostLiked { post_id: self.id }),
        );
        Ok(())
    }

    /// Adds a comment, producing `CommentAdded`.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the post is not active or the comment id is taken,
    /// `InvalidArgument` if the comment or the username is blank.
    pub fn add_comment(
        &mut self,
        comment_id: Uuid,
        comment: &str,
        username: &str,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.require_active("comment on")?;
        require_text("comment", comment)?;
        require_text("username", username)?;
        if self.comments.contains_key(&comment_id) {
            return Err(DomainError::InvalidState(format!(
                "comment {comment_id} already exists"
            )));
        }

        let comment_date = clock.now();
        self.raise(
            correlation_id,
            clock,
            PostEventKind::CommentAdded(CommentAdded {
                post_id: self.id,
                comment_id,
                comment: comment.to_owned(),
                username: username.to_owned(),
                comment_date,
            }),
        );
        Ok(())
    }

    /// Edits a comment owned by `username`, producing `CommentUpdated`.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the post is not active, `InvalidArgument` if the
    /// comment or the username is blank, `NotFound` if the comment does not
    /// exist, `PermissionDenied` if another user wrote it.
    pub fn edit_comment(
        &mut self,
        comment_id: Uuid,
        comment: &str,
        username: &str,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.require_active("edit a comment on")?;
        require_text("comment", comment)?;
        require_text("username", username)?;
        self.require_comment_owner(comment_id, username, "edit")?;

        let edit_date = clock.now();
        self.raise(
            correlation_id,
            clock,
            PostEventKind::CommentUpdated(CommentUpdated {
                post_id: self.id,
                comment_id,
                comment: comment.to_owned(),
                username: username.to_owned(),
                edit_date,
            }),
        );
        Ok(())
    }

    /// Removes a comment owned by `username`, producing `CommentRemoved`.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the post is not active, `InvalidArgument` if the
    /// username is blank, `NotFound` if the comment does not exist,
    /// `PermissionDenied` if another user wrote it.
    pub fn remove_comment(
        &mut self,
        comment_id: Uuid,
        username: &str,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.require_active("remove a comment on")?;
        require_text("username", username)?;
        self.require_comment_owner(comment_id, username, "remove")?;

        self.raise(
            correlation_id,
            clock,
            PostEventKind::CommentRemoved(CommentRemoved {
                post_id: self.id,
                comment_id,
            }),
        );
        Ok(())
    }

    /// Deletes the post on behalf of its author, producing `PostRemoved`.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the post is not active, `InvalidArgument` if the
    /// username is blank, `PermissionDenied` if `username` is not the author.
    pub fn delete(
        &mut self,
        username: &str,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.require_active("delete")?;
        require_text("username", username)?;
        if !same_user(&self.author, username) {
            return Err(DomainError::PermissionDenied(
                "you cannot delete a post that was created by another user".to_owned(),
            ));
        }

        self.raise(
            correlation_id,
            clock,
            PostEventKind::PostRemoved(PostRemoved { post_id: self.id }),
        );
        Ok(())
    }

    fn require_active(&self, action: &str) -> Result<(), DomainError> {
        if self.active {
            Ok(())
        } else {
            Err(DomainError::InvalidState(format!(
                "you cannot {action} an inactive post"
            )))
        }
    }

    fn require_comment_owner(
        &self,
        comment_id: Uuid,
        username: &str,
        action: &str,
    ) -> Result<(), DomainError> {
        let existing = self
            .comments
            .get(&comment_id)
            .ok_or_else(|| DomainError::NotFound(format!("comment {comment_id} does not exist")))?;
        if !same_user(&existing.username, username) {
            return Err(DomainError::PermissionDenied(format!(
                "you cannot {action} a comment that was created by another user"
            )));
        }
        Ok(())
    }

    /// Records a new event and folds it into the in-memory state so that
    /// further commands on this instance see it.
    fn raise(&mut self, correlation_id: Uuid, clock: &dyn Clock, kind: PostEventKind) {
        let event = PostEvent::raise(self.id, correlation_id, clock.now(), kind);
        self.mutate(&event.kind);
        self.uncommitted_events.push(event);
    }

    fn mutate(&mut self, kind: &PostEventKind) {
        match kind {
            PostEventKind::PostCreated(e) => {
                self.active = true;
                self.author.clone_from(&e.author);
            }
            PostEventKind::CommentAdded(e) => {
                self.comments.insert(
                    e.comment_id,
                    CommentState {
                        text: e.comment.clone(),
                        username: e.username.clone(),
                    },
                );
            }
            PostEventKind::CommentUpdated(e) => {
                self.comments.insert(
                    e.comment_id,
                    CommentState {
                        text: e.comment.clone(),
                        username: e.username.clone(),
                    },
                );
            }
            PostEventKind::CommentRemoved(e) => {
                self.comments.remove(&e.comment_id);
            }
            PostEventKind::PostRemoved(_) => {
                self.active = false;
            }
            PostEventKind::MessageUpdated(_) | PostEventKind::PostLiked(_) => {}
        }
    }
}

impl AggregateRoot for PostAggregate {
    type Event = PostEvent;

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn apply(&mut self, event: &Self::Event) {
        self.mutate(&event.kind);
        self.version += 1;
    }

    fn uncommitted_events(&self) -> &[Self::Event] {
        &self.uncommitted_events
    }

    fn clear_uncommitted_events(&mut self) {
        self.uncommitted_events.clear();
    }
}
