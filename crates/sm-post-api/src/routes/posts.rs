//! Command routes for posts.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use sm_post_command::domain::commands::{
    AddComment, DeletePost, EditComment, EditMessage, LikePost, NewPost, PostCommand,
    RemoveComment,
};
use sm_post_core::repository::StoredEvent;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /.
#[derive(Debug, Deserialize)]
pub struct NewPostRequest {
    /// Username of the author.
    pub author: String,
    /// Post text.
    pub message: String,
}

/// Request body for PUT /{post_id}/message.
#[derive(Debug, Deserialize)]
pub struct EditMessageRequest {
    /// New post text.
    pub message: String,
}

/// Request body for comment creation and edits.
#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    /// Comment text.
    pub comment: String,
    /// Username of the commenter.
    pub username: String,
}

/// Request body for removals, naming the caller.
#[derive(Debug, Deserialize)]
pub struct UsernameRequest {
    /// Username of the caller.
    pub username: String,
}

/// Response body returned after a command is successfully handled.
#[derive(Debug, Serialize)]
pub struct CommandResponse {
    /// IDs of the domain events produced and persisted.
    pub event_ids: Vec<Uuid>,
}

/// Response body for POST /.
#[derive(Debug, Serialize)]
pub struct NewPostResponse {
    /// Identifier assigned to the post.
    pub post_id: Uuid,
    /// IDs of the domain events produced and persisted.
    pub event_ids: Vec<Uuid>,
}

/// Response body for POST /{post_id}/comments.
#[derive(Debug, Serialize)]
pub struct AddCommentResponse {
    /// Identifier assigned to the comment.
    pub comment_id: Uuid,
    /// IDs of the domain events produced and persisted.
    pub event_ids: Vec<Uuid>,
}

fn event_ids(stored_events: &[StoredEvent]) -> Vec<Uuid> {
    stored_events.iter().map(|e| e.event_id).collect()
}

/// POST /
#[instrument(skip(state, request), fields(author = %request.author))]
async fn new_post(
    State(state): State<AppState>,
    Json(request): Json<NewPostRequest>,
) -> Result<(StatusCode, Json<NewPostResponse>), ApiError> {
    let command = NewPost {
        correlation_id: Uuid::new_v4(),
        post_id: Uuid::new_v4(),
        author: request.author,
        message: request.message,
    };
    let post_id = command.post_id;

    info!(correlation_id = %command.correlation_id, post_id = %post_id, "handling new_post command");

    let stored_events = state.commands.send(PostCommand::NewPost(command)).await?;

    Ok((
        StatusCode::CREATED,
        Json(NewPostResponse {
            post_id,
            event_ids: event_ids(&stored_events),
        }),
    ))
}

/// PUT /{post_id}/message
#[instrument(skip(state, request), fields(post_id = %post_id))]
async fn edit_message(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Json(request): Json<EditMessageRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = EditMessage {
        correlation_id: Uuid::new_v4(),
        post_id,
        message: request.message,
    };

    info!(correlation_id = %command.correlation_id, "handling edit_message command");

    let stored_events = state
        .commands
        .send(PostCommand::EditMessage(command))
        .await?;

    Ok(Json(CommandResponse {
        event_ids: event_ids(&stored_events),
    }))
}

/// PUT /{post_id}/like
#[instrument(skip(state), fields(post_id = %post_id))]
async fn like_post(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = LikePost {
        correlation_id: Uuid::new_v4(),
        post_id,
    };

    info!(correlation_id = %command.correlation_id, "handling like_post command");

    let stored_events = state.commands.send(PostCommand::LikePost(command)).await?;

    Ok(Json(CommandResponse {
        event_ids: event_ids(&stored_events),
    }))
}

/// POST /{post_id}/comments
#[instrument(skip(state, request), fields(post_id = %post_id, username = %request.username))]
async fn add_comment(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Json(request): Json<CommentRequest>,
) -> Result<(StatusCode, Json<AddCommentResponse>), ApiError> {
    let command = AddComment {
        correlation_id: Uuid::new_v4(),
        post_id,
        comment_id: Uuid::new_v4(),
        comment: request.comment,
        username: request.username,
    };
    let comment_id = command.comment_id;

    info!(correlation_id = %command.correlation_id, comment_id = %comment_id, "handling add_comment command");

    let stored_events = state
        .commands
        .send(PostCommand::AddComment(command))
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(AddCommentResponse {
            comment_id,
            event_ids: event_ids(&stored_events),
        }),
    ))
}

/// PUT /{post_id}/comments/{comment_id}
#[instrument(skip(state, request), fields(post_id = %post_id, comment_id = %comment_id))]
async fn edit_comment(
    State(state): State<AppState>,
    Path((post_id, comment_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<CommentRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = EditComment {
        correlation_id: Uuid::new_v4(),
        post_id,
        comment_id,
        comment: request.comment,
        username: request.username,
    };

    info!(correlation_id = %command.correlation_id, "handling edit_comment command");

    let stored_events = state
        .commands
        .send(PostCommand::EditComment(command))
        .await?;

    Ok(Json(CommandResponse {
        event_ids: event_ids(&stored_events),
    }))
}

/// DELETE /{post_id}/comments/{comment_id}
#[instrument(skip(state, request), fields(post_id = %post_id, comment_id = %comment_id))]
async fn remove_comment(
    State(state): State<AppState>,
    Path((post_id, comment_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<UsernameRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = RemoveComment {
        correlation_id: Uuid::new_v4(),
        post_id,
        comment_id,
        username: request.username,
    };

    info!(correlation_id = %command.correlation_id, "handling remove_comment command");

    let stored_events = state
        .commands
        .send(PostCommand::RemoveComment(command))
        .await?;

    Ok(Json(CommandResponse {
        event_ids: event_ids(&stored_events),
    }))
}

/// DELETE /{post_id}
#[instrument(skip(state, request), fields(post_id = %post_id))]
async fn delete_post(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Json(request): Json<UsernameRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = DeletePost {
        correlation_id: Uuid::new_v4(),
        post_id,
        username: request.username,
    };

    info!(correlation_id = %command.correlation_id, "handling delete_post command");

    let stored_events = state
        .commands
        .send(PostCommand::DeletePost(command))
        .await?;

    Ok(Json(CommandResponse {
        event_ids: event_ids(&stored_events),
    }))
}

/// Returns the router for post commands.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(new_post))
        .route("/{post_id}", delete(delete_post))
        .route("/{post_id}/message", put(edit_message))
        .route("/{post_id}/like", put(like_post))
        .route("/{post_id}/comments", post(add_comment))
        .route(
            "/{post_id}/comments/{comment_id}",
            put(edit_comment).delete(remove_comment),
        )
}
