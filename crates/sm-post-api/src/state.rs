//! Shared application state.

use std::sync::Arc;

use sm_post_command::domain::commands::PostCommand;
use sm_post_core::command::CommandDispatcher;
use sm_post_core::query::QueryDispatcher;
use sm_post_query::domain::entities::PostEntity;
use sm_post_query::domain::queries::PostQuery;

/// Application state shared across all request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Routes post commands to the write side.
    pub commands: Arc<CommandDispatcher<PostCommand>>,
    /// Routes post queries to the read side.
    pub queries: Arc<QueryDispatcher<PostQuery, PostEntity>>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(
        commands: Arc<CommandDispatcher<PostCommand>>,
        queries: Arc<QueryDispatcher<PostQuery, PostEntity>>,
    ) -> Self {
        Self { commands, queries }
    }
}
