//! Commands for posts.

use sm_post_core::command::Command;
use uuid::Uuid;

/// Command to publish a new post.
#[derive(Debug, Clone)]
pub struct NewPost {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Identifier for the new post.
    pub post_id: Uuid,
    /// Username of the author.
    pub author: String,
    /// Post text.
    pub message: String,
}

/// Command to replace the text of a post.
#[derive(Debug, Clone)]
pub struct EditMessage {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The post to edit.
    pub post_id: Uuid,
    /// New post text.
    pub message: String,
}

/// Command to like a post.
#[derive(Debug, Clone)]
pub struct LikePost {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The post to like.
    pub post_id: Uuid,
}

/// Command to comment on a post.
#[derive(Debug, Clone)]
pub struct AddComment {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The post to comment on.
    pub post_id: Uuid,
    /// Identifier for the new comment.
    pub comment_id: Uuid,
    /// Comment text.
    pub comment: String,
    /// Username of the commenter.
    pub username: String,
}

/// Command to edit an existing comment.
#[derive(Debug, Clone)]
pub struct EditComment {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The post the comment belongs to.
    pub post_id: Uuid,
    /// The comment to edit.
    pub comment_id: Uuid,
    /// New comment text.
    pub comment: String,
    /// Username of the caller; must own the comment.
    pub username: String,
}

/// Command to remove a comment.
#[derive(Debug, Clone)]
pub struct RemoveComment {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The post the comment belongs to.
    pub post_id: Uuid,
    /// The comment to remove.
    pub comment_id: Uuid,
    /// Username of the caller; must own the comment.
    pub username: String,
}

/// Command to delete a post.
#[derive(Debug, Clone)]
pub struct DeletePost {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The post to delete.
    pub post_id: Uuid,
    /// Username of the caller; must be the author.
    pub username: String,
}

/// Every command the post write side accepts.
#[derive(Debug, Clone)]
pub enum PostCommand {
    /// Publish a new post.
    NewPost(NewPost),
    /// Replace the text of a post.
    EditMessage(EditMessage),
    /// Like a post.
    LikePost(LikePost),
    /// Comment on a post.
    AddComment(AddComment),
    /// Edit a comment.
    EditComment(EditComment),
    /// Remove a comment.
    RemoveComment(RemoveComment),
    /// Delete a post.
    DeletePost(DeletePost),
}

impl PostCommand {
    /// Command kind names, as returned by [`Command::command_type`].
    pub const KINDS: [&'static str; 7] = [
        "NewPost",
        "EditMessage",
        "LikePost",
        "AddComment",
        "EditComment",
        "RemoveComment",
        "DeletePost",
    ];

    /// The post the command targets.
    #[must_use]
    pub fn post_id(&self) -> Uuid {
        match self {
            Self::NewPost(c) => c.post_id,
            Self::EditMessage(c) => c.post_id,
            Self::LikePost(c) => c.post_id,
            Self::AddComment(c) => c.post_id,
            Self::EditComment(c) => c.post_id,
            Self::RemoveComment(c) => c.post_id,
            Self::DeletePost(c) => c.post_id,
        }
    }
}

impl Command for PostCommand {
    fn command_type(&self) -> &'static str {
        match self {
            Self::NewPost(_) => "NewPost",
            Self::EditMessage(_) => "EditMessage",
            Self::LikePost(_) => "LikePost",
            Self::AddComment(_) => "AddComment",
            Self::EditComment(_) => "EditComment",
            Self::RemoveComment(_) => "RemoveComment",
            Self::DeletePost(_) => "DeletePost",
        }
    }

    fn correlation_id(&self) -> Uuid {
        match self {
            Self::NewPost(c) => c.correlation_id,
            Self::EditMessage(c) => c.correlation_id,
            Self::LikePost(c) => c.correlation_id,
            Self::AddComment(c) => c.correlation_id,
            Self::EditComment(c) => c.correlation_id,
            Self::RemoveComment(c) => c.correlation_id,
            Self::DeletePost(c) => c.correlation_id,
        }
    }
}
