//! Point-to-point message link to a Siemens S7 controller.
//!
//! The controller opens two TCP connections to us: one it writes messages
//! on, one it reads our messages from. Messages are small ASCII frames
//! (`^ST^type^ID^data^DT^payload^EN^`) carrying a type id, a data id and a
//! text payload.
//!
//! # Crate Structure
//!
//! - [`transport`]: single-peer TCP listening channels
//! - [`frame`]: the message type and the wire codec
//! - [`registry`]: message kinds and their handlers (behind `engine` feature)
//! - [`engine`]: the link engine itself (behind `engine` feature)

/// Re-export transport types.
pub mod transport {
    pub use s7link_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use s7link_frame::*;
}

/// Re-export registry types (requires `engine` feature).
#[cfg(feature = "engine")]
pub mod registry {
    pub use s7link_registry::*;
}

/// Re-export engine types (requires `engine` feature).
#[cfg(feature = "engine")]
pub mod engine {
    pub use s7link_engine::*;
}
