//! ASCII marker framing for the controller link.
//!
//! Every message travels as
//! `^ST^` typeId `^ID^` dataId `^DT^` payload `^EN^`, with the numbers in
//! decimal text. Outgoing batches carry a `##` prefix; incoming receive
//! chunks carry a 2-byte controller header and may contain null padding.
//!
//! [`decode`] is pure: it turns a text buffer into messages plus the
//! remainder to carry into the next read. [`FrameReader`] owns that
//! remainder across reads, [`FrameWriter`] sends batches.

pub mod codec;
pub mod error;
pub mod message;
pub mod reader;
pub mod writer;

pub use codec::{
    decode, encode, encode_batch, Decoded, DATA_MARKER, END_MARKER, ID_MARKER,
    MAX_CARRIED_FRAME_LEN, START_MARKER, TRANSPORT_PREFIX,
};
pub use error::{FrameError, Result};
pub use message::{Message, INVALID_TYPE_ID};
pub use reader::{FrameReader, CONTROLLER_HEADER_LEN};
pub use writer::FrameWriter;
