use std::fmt;
use std::sync::Arc;

use s7link_frame::Message;

use crate::error::HandlerError;
use crate::handler::{LocalAction, LocalHandler, MessageHandler, NotifyOnly};

/// Builds the handler for one decoded message.
pub type HandlerFactory = Arc<dyn Fn(Message) -> Box<dyn MessageHandler> + Send + Sync>;

/// A message kind: its type id and how to build its handler.
#[derive(Clone)]
pub struct MessageDescriptor {
    type_id: i32,
    factory: HandlerFactory,
}

impl MessageDescriptor {
    /// Describe a kind handled by a custom [`MessageHandler`] type.
    pub fn new<F, H>(type_id: i32, factory: F) -> Self
    where
        F: Fn(Message) -> H + Send + Sync + 'static,
        H: MessageHandler + 'static,
    {
        Self {
            type_id,
            factory: Arc::new(move |message| Box::new(factory(message)) as Box<dyn MessageHandler>),
        }
    }

    /// Describe a kind handled locally by a closure.
    pub fn local<F>(type_id: i32, action: F) -> Self
    where
        F: Fn(&Message) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let action: LocalAction = Arc::new(action);
        Self::new(type_id, move |message| {
            LocalHandler::new(message, Arc::clone(&action))
        })
    }

    /// Describe a kind that is only forwarded to the notification sink.
    pub fn notify(type_id: i32) -> Self {
        Self::new(type_id, NotifyOnly::new)
    }

    pub fn type_id(&self) -> i32 {
        self.type_id
    }

    /// Build a handler populated with `message`.
    pub fn instantiate(&self, message: Message) -> Box<dyn MessageHandler> {
        (self.factory)(message)
    }
}

impl fmt::Debug for MessageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageDescriptor")
            .field("type_id", &self.type_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_descriptor_builds_notify_only() {
        let descriptor = MessageDescriptor::notify(3);
        let handler = descriptor.instantiate(Message::new(3, 9, "p"));

        assert_eq!(descriptor.type_id(), 3);
        assert!(!handler.handles_locally());
        assert_eq!(handler.message().data_id, 9);
    }

    #[test]
    fn local_descriptor_shares_action_across_instances() {
        let descriptor = MessageDescriptor::local(5, |message| {
            if message.payload.len() == 3 {
                Ok(())
            } else {
                Err(HandlerError::InvalidPayload {
                    payload: message.payload.clone(),
                    reason: "expected three light states".to_string(),
                })
            }
        });

        let mut ok = descriptor.instantiate(Message::new(5, 0, "100"));
        let mut bad = descriptor.instantiate(Message::new(5, 0, "1"));

        assert!(ok.handles_locally());
        assert!(ok.handle().is_ok());
        assert!(matches!(
            bad.handle(),
            Err(HandlerError::InvalidPayload { .. })
        ));
    }
}
