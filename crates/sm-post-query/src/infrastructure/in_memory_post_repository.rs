//! In-memory implementation of the `PostRepository` trait.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use sm_post_core::error::DomainError;
use uuid::Uuid;

use crate::domain::entities::PostEntity;
use crate::domain::repositories::PostRepository;

#[derive(Debug, Default)]
struct Views {
    posts: HashMap<Uuid, PostEntity>,
    removed: HashMap<Uuid, i64>,
}

/// Process-local read store.
#[derive(Debug, Default)]
pub struct InMemoryPostRepository {
    views: RwLock<Views>,
}

impl InMemoryPostRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Views>, DomainError> {
        self.views
            .read()
            .map_err(|_| DomainError::Infrastructure("read model lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Views>, DomainError> {
        self.views
            .write()
            .map_err(|_| DomainError::Infrastructure("read model lock poisoned".into()))
    }

    fn select(
        &self,
        predicate: impl Fn(&PostEntity) -> bool,
    ) -> Result<Vec<PostEntity>, DomainError> {
        let mut posts: Vec<PostEntity> = self
            .read()?
            .posts
            .values()
            .filter(|post| predicate(post))
            .cloned()
            .collect();
        posts.sort_by(|a, b| (a.date_posted, a.post_id).cmp(&(b.date_posted, b.post_id)));
        Ok(posts)
    }
}

#[async_trait]
impl PostRepository for InMemoryPostRepository {
    async fn create(&self, post: &PostEntity) -> Result<(), DomainError> {
        let mut views = self.write()?;
        if views.posts.contains_key(&post.post_id) {
            return Err(DomainError::InvalidState(format!(
                "post view {} already exists",
                post.post_id
            )));
        }
        let mut post = post.clone();
        post.sort_comments();
        views.posts.insert(post.post_id, post);
        Ok(())
    }

    async fn update(&self, post: &PostEntity) -> Result<(), DomainError> {
        let mut post = post.clone();
        post.sort_comments();
        self.write()?.posts.insert(post.post_id, post);
        Ok(())
    }

    async fn delete(&self, post_id: Uuid, version: i64) -> Result<(), DomainError> {
        let mut views = self.write()?;
        views.posts.remove(&post_id);
        let removed = views.removed.entry(post_id).or_insert(version);
        *removed = (*removed).max(version);
        Ok(())
    }

    async fn removed_version(&self, post_id: Uuid) -> Result<Option<i64>, DomainError> {
        Ok(self.read()?.removed.get(&post_id).copied())
    }

    async fn get_by_id(&self, post_id: Uuid) -> Result<Option<PostEntity>, DomainError> {
        Ok(self.read()?.posts.get(&post_id).cloned())
    }

    async fn get_all(&self) -> Result<Vec<PostEntity>, DomainError> {
        self.select(|_| true)
    }

    async fn get_by_author(&self, author: &str) -> Result<Vec<PostEntity>, DomainError> {
        self.select(|post| post.author.contains(author))
    }

    async fn get_with_likes(&self, likes: i32) -> Result<Vec<PostEntity>, DomainError> {
        self.select(|post| post.likes >= likes)
    }

    async fn get_with_comments(&self) -> Result<Vec<PostEntity>, DomainError> {
        self.select(|post| !post.comments.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use crate::domain::entities::CommentEntity;

    fn post(author: &str, minutes: i64, likes: i32) -> PostEntity {
        PostEntity {
            post_id: Uuid::new_v4(),
            author: author.to_owned(),
            message: format!("hello from {author}"),
            date_posted: Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
                + Duration::minutes(minutes),
            likes,
            comments: Vec::new(),
            version: 1,
        }
    }

    fn comment(post_id: Uuid, username: &str) -> CommentEntity {
        CommentEntity {
            comment_id: Uuid::new_v4(),
            post_id,
            username: username.to_owned(),
            comment: "nice".to_owned(),
            comment_date: Utc.with_ymd_and_hms(2026, 1, 15, 11, 0, 0).unwrap(),
            is_edited: false,
        }
    }

    #[tokio::test]
    async fn test_create_then_get_by_id_returns_the_post() {
        // Arrange
        let repo = InMemoryPostRepository::new();
        let alice = post("alice", 0, 0);

        // Act
        repo.create(&alice).await.unwrap();

        // Assert
        assert_eq!(repo.get_by_id(alice.post_id).await.unwrap(), Some(alice));
    }

    #[tokio::test]
    async fn test_create_existing_post_fails_with_invalid_state() {
        // Arrange
        let repo = InMemoryPostRepository::new();
        let alice = post("alice", 0, 0);
        repo.create(&alice).await.unwrap();

        // Act
        let result = repo.create(&alice).await;

        // Assert
        assert!(matches!(result, Err(DomainError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_update_replaces_post_and_comments() {
        // Arrange
        let repo = InMemoryPostRepository::new();
        let mut alice = post("alice", 0, 0);
        repo.create(&alice).await.unwrap();
        alice.likes = 3;
        alice.comments.push(comment(alice.post_id, "bob"));
        alice.version = 3;

        // Act
        repo.update(&alice).await.unwrap();

        // Assert
        let stored = repo.get_by_id(alice.post_id).await.unwrap().unwrap();
        assert_eq!(stored.likes, 3);
        assert_eq!(stored.comments.len(), 1);
        assert_eq!(stored.version, 3);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        // Arrange
        let repo = InMemoryPostRepository::new();
        let alice = post("alice", 0, 0);
        repo.create(&alice).await.unwrap();

        // Act
        repo.delete(alice.post_id, 2).await.unwrap();
        let second = repo.delete(alice.post_id, 2).await;

        // Assert
        assert!(second.is_ok());
        assert!(repo.get_by_id(alice.post_id).await.unwrap().is_none());
        assert_eq!(repo.removed_version(alice.post_id).await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_get_all_orders_by_date_posted() {
        // Arrange
        let repo = InMemoryPostRepository::new();
        let later = post("carol", 10, 0);
        let earlier = post("alice", 0, 0);
        repo.create(&later).await.unwrap();
        repo.create(&earlier).await.unwrap();

        // Act
        let posts = repo.get_all().await.unwrap();

        // Assert
        let authors: Vec<&str> = posts.iter().map(|p| p.author.as_str()).collect();
        assert_eq!(authors, vec!["alice", "carol"]);
    }

    #[tokio::test]
    async fn test_get_by_author_matches_substring_case_sensitively() {
        // Arrange
        let repo = InMemoryPostRepository::new();
        repo.create(&post("alice", 0, 0)).await.unwrap();
        repo.create(&post("malice", 1, 0)).await.unwrap();
        repo.create(&post("bob", 2, 0)).await.unwrap();

        // Act
        let matched = repo.get_by_author("lic").await.unwrap();
        let upper = repo.get_by_author("ALICE").await.unwrap();

        // Assert
        assert_eq!(matched.len(), 2);
        assert!(upper.is_empty());
    }

    #[tokio::test]
    async fn test_get_with_likes_is_inclusive() {
        // Arrange
        let repo = InMemoryPostRepository::new();
        repo.create(&post("alice", 0, 1)).await.unwrap();
        repo.create(&post("bob", 1, 2)).await.unwrap();
        repo.create(&post("carol", 2, 0)).await.unwrap();

        // Act
        let posts = repo.get_with_likes(1).await.unwrap();

        // Assert
        let authors: Vec<&str> = posts.iter().map(|p| p.author.as_str()).collect();
        assert_eq!(authors, vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn test_get_with_comments_skips_posts_without_comments() {
        // Arrange
        let repo = InMemoryPostRepository::new();
        let mut alice = post("alice", 0, 0);
        alice.comments.push(comment(alice.post_id, "bob"));
        repo.create(&alice).await.unwrap();
        repo.create(&post("carol", 1, 0)).await.unwrap();

        // Act
        let posts = repo.get_with_comments().await.unwrap();

        // Assert
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].post_id, alice.post_id);
    }
}
