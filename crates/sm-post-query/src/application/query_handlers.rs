//! Query handlers for post views.

use std::sync::Arc;

use async_trait::async_trait;
use sm_post_core::error::DomainError;
use sm_post_core::query::{QueryDispatcher, QueryHandler};
use tracing::debug;

use crate::domain::entities::PostEntity;
use crate::domain::queries::PostQuery;
use crate::domain::repositories::PostRepository;

/// Answers every `PostQuery` from the read repository.
pub struct PostQueryHandler {
    repository: Arc<dyn PostRepository>,
}

impl PostQueryHandler {
    /// Creates a handler reading from `repository`.
    pub fn new(repository: Arc<dyn PostRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl QueryHandler<PostQuery, PostEntity> for PostQueryHandler {
    async fn handle(&self, query: PostQuery) -> Result<Vec<PostEntity>, DomainError> {
        let posts = match &query {
            PostQuery::FindAllPosts => self.repository.get_all().await?,
            PostQuery::FindPostById(post_id) => self
                .repository
                .get_by_id(*post_id)
                .await?
                .into_iter()
                .collect(),
            PostQuery::FindPostsByAuthor(author) => {
                if author.trim().is_empty() {
                    return Err(DomainError::InvalidArgument(
                        "author must not be blank".into(),
                    ));
                }
                self.repository.get_by_author(author).await?
            }
            PostQuery::FindPostsWithLikes(likes) => {
                if *likes < 0 {
                    return Err(DomainError::InvalidArgument(format!(
                        "number of likes must not be negative, got {likes}"
                    )));
                }
                self.repository.get_with_likes(*likes).await?
            }
            PostQuery::FindPostsWithComments => self.repository.get_with_comments().await?,
        };

        debug!(query = ?query, count = posts.len(), "post query answered");
        Ok(posts)
    }
}

/// Registers `handler` for every post query kind.
///
/// # Errors
///
/// Returns `DomainError::AlreadyRegistered` if any kind is taken.
pub fn register_query_handlers(
    dispatcher: &mut QueryDispatcher<PostQuery, PostEntity>,
    handler: Arc<PostQueryHandler>,
) -> Result<(), DomainError> {
    for kind in PostQuery::KINDS {
        dispatcher.register(kind, handler.clone())?;
    }
    Ok(())
}
