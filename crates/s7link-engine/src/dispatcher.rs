use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{Sender, SyncSender, TrySendError};
use std::sync::Arc;

use s7link_frame::Message;
use s7link_registry::MessageRegistry;
use tracing::{debug, trace, warn};

/// Receives messages whose kind is not handled locally.
///
/// Called on the scheduler thread; implementations must not block.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, message: Message);
}

impl NotificationSink for Sender<Message> {
    fn notify(&self, message: Message) {
        if self.send(message).is_err() {
            trace!("notification receiver dropped");
        }
    }
}

/// Bounded channel: a full channel drops the message.
impl NotificationSink for SyncSender<Message> {
    fn notify(&self, message: Message) {
        match self.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(message)) => warn!(
                type_id = message.type_id,
                data_id = message.data_id,
                "notification channel full; message dropped"
            ),
            Err(TrySendError::Disconnected(_)) => trace!("notification receiver dropped"),
        }
    }
}

/// Adapts a closure into a [`NotificationSink`].
pub struct CallbackSink<F>(pub F);

impl<F> NotificationSink for CallbackSink<F>
where
    F: Fn(Message) + Send + Sync,
{
    fn notify(&self, message: Message) {
        (self.0)(message)
    }
}

impl<F> fmt::Debug for CallbackSink<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CallbackSink")
    }
}

/// What happened to a dispatched message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// A local handler ran successfully.
    Handled,
    /// The message was passed to the notification sink.
    Notified,
    /// A local handler returned an error or panicked.
    Failed,
}

/// Routes decoded messages to their handler or to the notification sink.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<MessageRegistry>,
    sink: Arc<dyn NotificationSink>,
}

impl Dispatcher {
    pub fn new(registry: Arc<MessageRegistry>, sink: Arc<dyn NotificationSink>) -> Self {
        Self { registry, sink }
    }

    pub fn registry(&self) -> &MessageRegistry {
        &self.registry
    }

    /// Instantiate the handler for `message` and run it or notify.
    ///
    /// Handler failures, panics included, are logged and never propagate.
    pub fn dispatch(&self, message: Message) -> Dispatched {
        let type_id = message.type_id;
        let data_id = message.data_id;
        let mut handler = self.registry.instantiate(message);

        if !handler.handles_locally() {
            trace!(type_id, data_id, "notifying");
            self.sink.notify(handler.message().clone());
            return Dispatched::Notified;
        }

        match panic::catch_unwind(AssertUnwindSafe(|| handler.handle())) {
            Ok(Ok(())) => {
                trace!(type_id, data_id, "handled locally");
                Dispatched::Handled
            }
            Ok(Err(err)) => {
                debug!(type_id, data_id, error = %err, "handler failed");
                Dispatched::Failed
            }
            Err(_) => {
                warn!(type_id, data_id, "handler panicked");
                Dispatched::Failed
            }
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    use s7link_registry::{HandlerError, MessageDescriptor};

    use super::*;

    fn dispatcher(
        descriptors: Vec<MessageDescriptor>,
    ) -> (Dispatcher, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel();
        let registry = MessageRegistry::build(descriptors).unwrap();
        (Dispatcher::new(Arc::new(registry), Arc::new(tx)), rx)
    }

    #[test]
    fn notify_kind_reaches_sink() {
        let (dispatcher, rx) = dispatcher(vec![MessageDescriptor::notify(4)]);

        let outcome = dispatcher.dispatch(Message::new(4, 3, "218"));

        assert_eq!(outcome, Dispatched::Notified);
        assert_eq!(rx.try_recv().unwrap(), Message::new(4, 3, "218"));
    }

    #[test]
    fn unknown_kind_is_notified() {
        let (dispatcher, rx) = dispatcher(vec![]);
        assert_eq!(dispatcher.dispatch(Message::new(77, 1, "x")), Dispatched::Notified);
        assert_eq!(rx.try_recv().unwrap().type_id, 77);
    }

    #[test]
    fn local_kind_runs_without_notifying() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let (dispatcher, rx) = dispatcher(vec![MessageDescriptor::local(1, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })]);

        assert_eq!(dispatcher.dispatch(Message::new(1, 1, "1")), Dispatched::Handled);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn handler_error_is_contained() {
        let (dispatcher, _rx) = dispatcher(vec![MessageDescriptor::local(2, |message| {
            Err(HandlerError::UnknownDataId(message.data_id))
        })]);
        assert_eq!(dispatcher.dispatch(Message::new(2, 9, "")), Dispatched::Failed);
    }

    #[test]
    fn handler_panic_is_contained() {
        let (dispatcher, _rx) = dispatcher(vec![MessageDescriptor::local(3, |_| {
            panic!("handler bug")
        })]);
        assert_eq!(dispatcher.dispatch(Message::new(3, 1, "")), Dispatched::Failed);
        // Still usable afterwards.
        assert_eq!(dispatcher.dispatch(Message::new(3, 2, "")), Dispatched::Failed);
    }

    #[test]
    fn bounded_sink_drops_when_full() {
        let (tx, rx) = mpsc::sync_channel(1);
        let dispatcher = Dispatcher::new(Arc::new(MessageRegistry::empty()), Arc::new(tx));

        dispatcher.dispatch(Message::new(5, 1, "a"));
        dispatcher.dispatch(Message::new(5, 2, "b"));

        assert_eq!(rx.try_recv().unwrap().data_id, 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn callback_sink_receives_messages() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let sink = CallbackSink(move |_message: Message| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        let dispatcher = Dispatcher::new(Arc::new(MessageRegistry::empty()), Arc::new(sink));

        dispatcher.dispatch(Message::new(8, 2, "1"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
