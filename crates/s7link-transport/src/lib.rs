//! Single-peer TCP listening channels.
//!
//! The controller opens two independent TCP connections towards us, one per
//! direction. Each direction is served by a [`ConnectionChannel`]: it binds a
//! listener, accepts peers forever and keeps only the most recent one as the
//! active peer.
//!
//! This is the lowest layer of s7link. The engine drives one accept loop per
//! channel on a dedicated thread and stops them through a [`ShutdownSignal`].

pub mod channel;
pub mod error;
pub mod shutdown;

pub use channel::{ChannelConfig, ConnectionChannel, Direction, PeerGuard};
pub use error::{Result, TransportError};
pub use shutdown::ShutdownSignal;
