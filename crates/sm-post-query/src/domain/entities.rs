//! Read entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Denormalized view of a post and its comments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostEntity {
    /// The post identifier.
    pub post_id: Uuid,
    /// Username of the author.
    pub author: String,
    /// Current post text.
    pub message: String,
    /// When the post was created.
    pub date_posted: DateTime<Utc>,
    /// Number of likes.
    pub likes: i32,
    /// Comments, oldest first.
    pub comments: Vec<CommentEntity>,
    /// Version of the last event projected into this view.
    pub version: i64,
}

impl PostEntity {
    /// Looks up a comment by id.
    pub fn comment_mut(&mut self, comment_id: Uuid) -> Option<&mut CommentEntity> {
        self.comments.iter_mut().find(|c| c.comment_id == comment_id)
    }

    /// Orders comments by date, then id.
    pub fn sort_comments(&mut self) {
        self.comments
            .sort_by(|a, b| (a.comment_date, a.comment_id).cmp(&(b.comment_date, b.comment_id)));
    }
}

/// A comment on a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentEntity {
    /// The comment identifier.
    pub comment_id: Uuid,
    /// The post the comment belongs to.
    pub post_id: Uuid,
    /// Username of the commenter.
    pub username: String,
    /// Current comment text.
    pub comment: String,
    /// When the comment was written or last edited.
    pub comment_date: DateTime<Utc>,
    /// Whether the comment was edited.
    pub is_edited: bool,
}
