use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use s7link_frame::Message;
use tracing::trace;

/// Result of offering a message to the outbound queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOutcome {
    /// Whether the message was queued.
    pub accepted: bool,
    /// Queue length after the call, for back-pressure decisions.
    pub queue_len: usize,
}

/// FIFO of messages waiting for the next write phase.
///
/// Unbounded. Callers watch [`SendOutcome::queue_len`] and slow down.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    messages: Mutex<VecDeque<Message>>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `message` if the link is up and its type id is valid.
    pub fn enqueue(&self, message: Message, link_up: bool) -> SendOutcome {
        let mut messages = self.lock();
        let accepted = link_up && message.is_sendable();
        if accepted {
            messages.push_back(message);
        } else {
            trace!(
                type_id = message.type_id,
                data_id = message.data_id,
                link_up,
                "message rejected"
            );
        }
        SendOutcome {
            accepted,
            queue_len: messages.len(),
        }
    }

    /// Remove up to `max` messages from the front, in order.
    pub fn dequeue_batch(&self, max: usize) -> Vec<Message> {
        let mut messages = self.lock();
        let count = max.min(messages.len());
        messages.drain(..count).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Message>> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
