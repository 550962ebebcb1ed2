//! The controller link engine.
//!
//! An [`Engine`] listens on two TCP ports, one per direction, and runs a
//! single scheduler thread that alternates between draining outgoing
//! messages and reading incoming ones. Incoming messages are resolved through
//! the message registry and either handled in place or forwarded to a
//! [`NotificationSink`].
//!
//! Failures on the sockets never surface as errors: the engine retries and
//! reports its state through [`Engine::is_connected`] and
//! [`Engine::error_configuration`].

pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod queue;
mod scheduler;

pub use config::EngineConfig;
pub use dispatcher::{CallbackSink, Dispatched, Dispatcher, NotificationSink};
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use queue::{OutboundQueue, SendOutcome};
