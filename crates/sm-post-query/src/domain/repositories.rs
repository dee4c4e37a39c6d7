//! Read repository abstraction.

use async_trait::async_trait;
use sm_post_core::error::DomainError;
use uuid::Uuid;

use super::entities::PostEntity;

/// CRUD surface over post views. Only the projector writes through it.
///
/// Listing operations return posts ordered by `date_posted`, then `post_id`,
/// each with its comments.
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Inserts a new post view.
    ///
    /// Fails with `DomainError::InvalidState` if the post exists.
    async fn create(&self, post: &PostEntity) -> Result<(), DomainError>;

    /// Replaces a post view and its comments.
    async fn update(&self, post: &PostEntity) -> Result<(), DomainError>;

    /// Removes a post view and its comments, and records that the post was
    /// removed at `version`. Removing a missing post is not an error.
    async fn delete(&self, post_id: Uuid, version: i64) -> Result<(), DomainError>;

    /// Returns the version at which the post was removed, if it was. The
    /// record outlives the view so that redelivered events stay duplicates.
    async fn removed_version(&self, post_id: Uuid) -> Result<Option<i64>, DomainError>;

    /// Returns the post view, if projected.
    async fn get_by_id(&self, post_id: Uuid) -> Result<Option<PostEntity>, DomainError>;

    /// Returns every post view.
    async fn get_all(&self) -> Result<Vec<PostEntity>, DomainError>;

    /// Returns posts whose author contains `author`.
    async fn get_by_author(&self, author: &str) -> Result<Vec<PostEntity>, DomainError>;

    /// Returns posts with at least `likes` likes.
    async fn get_with_likes(&self, likes: i32) -> Result<Vec<PostEntity>, DomainError>;

    /// Returns posts that have at least one comment.
    async fn get_with_comments(&self) -> Result<Vec<PostEntity>, DomainError>;
}
