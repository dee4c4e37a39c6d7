//! Query abstractions and the query dispatcher.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::DomainError;

/// Trait that all queries implement.
pub trait Query: Send + Sync + std::fmt::Debug {
    /// The type name for this query (for logging/routing).
    fn query_type(&self) -> &'static str;
}

/// Handles one or more query kinds, returning read entities of type `R`.
#[async_trait]
pub trait QueryHandler<Q, R>: Send + Sync
where
    Q: Query + 'static,
    R: Send + 'static,
{
    /// Executes the query. An empty result is a valid outcome.
    async fn handle(&self, query: Q) -> Result<Vec<R>, DomainError>;
}

/// Routes each query to the single handler registered for its kind.
pub struct QueryDispatcher<Q, R>
where
    Q: Query + 'static,
    R: Send + 'static,
{
    handlers: HashMap<&'static str, Arc<dyn QueryHandler<Q, R>>>,
}

impl<Q, R> QueryDispatcher<Q, R>
where
    Q: Query + 'static,
    R: Send + 'static,
{
    /// Creates an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registers the handler for `query_type`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AlreadyRegistered` if a handler for the kind
    /// exists already.
    pub fn register(
        &mut self,
        query_type: &'static str,
        handler: Arc<dyn QueryHandler<Q, R>>,
    ) -> Result<(), DomainError> {
        if self.handlers.contains_key(query_type) {
            return Err(DomainError::AlreadyRegistered(query_type.to_owned()));
        }
        self.handlers.insert(query_type, handler);
        Ok(())
    }

    /// Sends the query to its handler.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::HandlerNotFound` if nothing is registered for
    /// the query's kind, otherwise whatever the handler returns.
    pub async fn send(&self, query: Q) -> Result<Vec<R>, DomainError> {
        let query_type = query.query_type();
        let handler = self
            .handlers
            .get(query_type)
            .cloned()
            .ok_or_else(|| DomainError::HandlerNotFound(query_type.to_owned()))?;

        debug!(query_type, "dispatching query");

        handler.handle(query).await
    }
}

impl<Q, R> Default for QueryDispatcher<Q, R>
where
    Q: Query + 'static,
    R: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<Q, R> fmt::Debug for QueryDispatcher<Q, R>
where
    Q: Query + 'static,
    R: Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.handlers.keys().collect();
        kinds.sort();
        f.debug_struct("QueryDispatcher")
            .field("registered", &kinds)
            .finish()
    }
}
