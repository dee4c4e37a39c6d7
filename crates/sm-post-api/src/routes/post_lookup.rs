//! Query routes over the post read model.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use sm_post_query::domain::entities::PostEntity;
use sm_post_query::domain::queries::PostQuery;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Response body for every lookup. An empty list is a normal answer.
#[derive(Debug, Serialize)]
pub struct PostLookupResponse {
    /// Matching posts, oldest first.
    pub posts: Vec<PostEntity>,
}

async fn lookup(state: &AppState, query: PostQuery) -> Result<Json<PostLookupResponse>, ApiError> {
    let correlation_id = Uuid::new_v4();
    debug!(correlation_id = %correlation_id, query = ?query, "handling post lookup");
    let posts = state.queries.send(query).await?;
    Ok(Json(PostLookupResponse { posts }))
}

/// GET /
#[instrument(skip(state))]
async fn all_posts(State(state): State<AppState>) -> Result<Json<PostLookupResponse>, ApiError> {
    lookup(&state, PostQuery::FindAllPosts).await
}

/// GET /by-id/{post_id}
#[instrument(skip(state))]
async fn post_by_id(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
) -> Result<Json<PostLookupResponse>, ApiError> {
    lookup(&state, PostQuery::FindPostById(post_id)).await
}

/// GET /by-author/{author}
#[instrument(skip(state))]
async fn posts_by_author(
    State(state): State<AppState>,
    Path(author): Path<String>,
) -> Result<Json<PostLookupResponse>, ApiError> {
    lookup(&state, PostQuery::FindPostsByAuthor(author)).await
}

/// GET /with-comments
#[instrument(skip(state))]
async fn posts_with_comments(
    State(state): State<AppState>,
) -> Result<Json<PostLookupResponse>, ApiError> {
    lookup(&state, PostQuery::FindPostsWithComments).await
}

/// GET /with-likes/{likes}
#[instrument(skip(state))]
async fn posts_with_likes(
    State(state): State<AppState>,
    Path(likes): Path<i32>,
) -> Result<Json<PostLookupResponse>, ApiError> {
    lookup(&state, PostQuery::FindPostsWithLikes(likes)).await
}

/// Returns the router for post lookups.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(all_posts))
        .route("/by-id/{post_id}", get(post_by_id))
        .route("/by-author/{author}", get(posts_by_author))
        .route("/with-comments", get(posts_with_comments))
        .route("/with-likes/{likes}", get(posts_with_likes))
}
