//! Command abstractions and the command dispatcher.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::error::DomainError;
use crate::repository::StoredEvent;

/// Trait that all commands implement.
pub trait Command: Send + Sync + std::fmt::Debug {
    /// The type name for this command (for logging/routing).
    fn command_type(&self) -> &'static str;

    /// Correlation ID to trace this command through the system.
    fn correlation_id(&self) -> Uuid;
}

/// Handles one or more command kinds.
#[async_trait]
pub trait CommandHandler<C>: Send + Sync
where
    C: Command + 'static,
{
    /// Executes the command and returns the events it persisted.
    async fn handle(&self, command: C) -> Result<Vec<StoredEvent>, DomainError>;
}

/// Routes each command to the single handler registered for its kind.
///
/// Built once at startup and shared; holds no domain logic.
pub struct CommandDispatcher<C>
where
    C: Command + 'static,
{
    handlers: HashMap<&'static str, Arc<dyn CommandHandler<C>>>,
}

impl<C> CommandDispatcher<C>
where
    C: Command + 'static,
{
    /// Creates an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registers the handler for `command_type`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AlreadyRegistered` if a handler for the kind
    /// exists already.
    pub fn register(
        &mut self,
        command_type: &'static str,
        handler: Arc<dyn CommandHandler<C>>,
    ) -> Result<(), DomainError> {
        if self.handlers.contains_key(command_type) {
            return Err(DomainError::AlreadyRegistered(command_type.to_owned()));
        }
        self.handlers.insert(command_type, handler);
        Ok(())
    }

    /// Returns `true` if a handler is registered for `command_type`.
    #[must_use]
    pub fn is_registered(&self, command_type: &str) -> bool {
        self.handlers.contains_key(command_type)
    }

    /// Sends the command to its handler.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::HandlerNotFound` if nothing is registered for
    /// the command's kind, otherwise whatever the handler returns.
    pub async fn send(&self, command: C) -> Result<Vec<StoredEvent>, DomainError> {
        let command_type = command.command_type();
        let handler = self
            .handlers
            .get(command_type)
            .cloned()
            .ok_or_else(|| DomainError::HandlerNotFound(command_type.to_owned()))?;

        debug!(
            command_type,
            correlation_id = %command.correlation_id(),
            "dispatching command"
        );

        handler.handle(command).await
    }
}

impl<C> Default for CommandDispatcher<C>
where
    C: Command + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for CommandDispatcher<C>
where
    C: Command + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.handlers.keys().collect();
        kinds.sort();
        f.debug_struct("CommandDispatcher")
            .field("registered", &kinds)
            .finish()
    }
}
