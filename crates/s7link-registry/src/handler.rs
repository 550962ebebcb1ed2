use std::fmt;
use std::sync::Arc;

use s7link_frame::Message;

use crate::error::HandlerError;

/// A decoded message bound to the logic of its kind.
pub trait MessageHandler: Send {
    /// The message this handler was created for.
    fn message(&self) -> &Message;

    /// `true` to run [`MessageHandler::handle`] on receipt, `false` to hand
    /// the message to the notification sink instead.
    fn handles_locally(&self) -> bool;

    /// Act on the message. Only called when `handles_locally` is true.
    fn handle(&mut self) -> Result<(), HandlerError>;
}

/// Handler for kinds that are only reported to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyOnly {
    message: Message,
}

impl NotifyOnly {
    pub fn new(message: Message) -> Self {
        Self { message }
    }
}

impl MessageHandler for NotifyOnly {
    fn message(&self) -> &Message {
        &self.message
    }

    fn handles_locally(&self) -> bool {
        false
    }

    fn handle(&mut self) -> Result<(), HandlerError> {
        Ok(())
    }
}

/// Shared closure run by [`LocalHandler`].
pub type LocalAction = Arc<dyn Fn(&Message) -> Result<(), HandlerError> + Send + Sync>;

/// Handler that runs a closure on receipt.
pub struct LocalHandler {
    message: Message,
    action: LocalAction,
}

impl LocalHandler {
    pub fn new(message: Message, action: LocalAction) -> Self {
        Self { message, action }
    }
}

impl MessageHandler for LocalHandler {
    fn message(&self) -> &Message {
        &self.message
    }

    fn handles_locally(&self) -> bool {
        true
    }

    fn handle(&mut self) -> Result<(), HandlerError> {
        (self.action)(&self.message)
    }
}

impl fmt::Debug for LocalHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalHandler")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}
