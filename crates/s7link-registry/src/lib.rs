//! Message kinds and the registry that resolves them.
//!
//! Applications describe each message kind they understand with a
//! [`MessageDescriptor`]: a type id plus a factory producing a
//! [`MessageHandler`] for a decoded message. The [`MessageRegistry`] is built
//! once from an explicit list of descriptors and never changes afterwards.
//! Type ids nobody registered resolve to a notify-only fallback.
//!
//! Handlers that need shared state capture it in their factory closure,
//! typically as an `Arc`.

pub mod descriptor;
pub mod error;
pub mod handler;
pub mod registry;

pub use descriptor::{HandlerFactory, MessageDescriptor};
pub use error::{ConfigError, HandlerError, Result};
pub use handler::{LocalAction, LocalHandler, MessageHandler, NotifyOnly};
pub use registry::MessageRegistry;
