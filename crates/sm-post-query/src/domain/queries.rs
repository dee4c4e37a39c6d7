//! Queries over post views.

use sm_post_core::query::Query;
use uuid::Uuid;

/// Every query the read side answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostQuery {
    /// All posts.
    FindAllPosts,
    /// The post with this id, if any.
    FindPostById(Uuid),
    /// Posts whose author contains this text.
    FindPostsByAuthor(String),
    /// Posts with at least this many likes.
    FindPostsWithLikes(i32),
    /// Posts with at least one comment.
    FindPostsWithComments,
}

impl PostQuery {
    /// Query kind names, as returned by [`Query::query_type`].
    pub const KINDS: [&'static str; 5] = [
        "FindAllPosts",
        "FindPostById",
        "FindPostsByAuthor",
        "FindPostsWithLikes",
        "FindPostsWithComments",
    ];
}

impl Query for PostQuery {
    fn query_type(&self) -> &'static str {
        match self {
            Self::FindAllPosts => "FindAllPosts",
            Self::FindPostById(_) => "FindPostById",
            Self::FindPostsByAuthor(_) => "FindPostsByAuthor",
            Self::FindPostsWithLikes(_) => "FindPostsWithLikes",
            Self::FindPostsWithComments => "FindPostsWithComments",
        }
    }
}
