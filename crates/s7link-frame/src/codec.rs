use bytes::{BufMut, BytesMut};
use tracing::debug;

use crate::message::{Message, INVALID_TYPE_ID};

/// Opens a frame.
pub const START_MARKER: &str = "^ST^";
/// Separates the type id from the data id.
pub const ID_MARKER: &str = "^ID^";
/// Separates the data id from the payload.
pub const DATA_MARKER: &str = "^DT^";
/// Closes a frame.
pub const END_MARKER: &str = "^EN^";
/// Prepended once to every outgoing batch.
pub const TRANSPORT_PREFIX: &str = "##";
/// Longest unfinished frame carried into the next read. Anything longer is
/// treated as noise.
pub const MAX_CARRIED_FRAME_LEN: usize = 64 * 1024;

const FIELD_MARKERS: [&str; 3] = [ID_MARKER, DATA_MARKER, END_MARKER];

/// Result of decoding one text buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decoded {
    /// Complete messages, in the order they appeared.
    pub messages: Vec<Message>,
    /// Text to prepend to the next read.
    pub remainder: String,
}

/// Decode every complete frame in `buffer`.
///
/// Wire format:
/// ```text
/// ^ST^ <typeId> ^ID^ <dataId> ^DT^ <payload> ^EN^
/// ```
///
/// The buffer is split on `^ST^`. A fragment that lacks any of `^ID^`,
/// `^DT^` or `^EN^` is dropped. Otherwise it is split on those three markers
/// wherever they occur and the first three segments become type id, data id
/// and payload. Ids that do not parse as integers decode as `0`.
///
/// Only the last fragment contributes to the remainder: the text after its
/// first `^EN^`, or the unfinished frame itself when it has no `^EN^` yet.
/// An unfinished fragment followed by another `^ST^` is lost, and so is one
/// longer than [`MAX_CARRIED_FRAME_LEN`].
pub fn decode(buffer: &str) -> Decoded {
    let fragments: Vec<&str> = buffer.split(START_MARKER).collect();

    let messages = fragments
        .iter()
        .filter_map(|fragment| decode_fragment(fragment))
        .collect();

    Decoded {
        messages,
        remainder: remainder_of(&fragments),
    }
}

/// Encode one message as a frame (no transport prefix).
pub fn encode(message: &Message) -> String {
    let mut dst = BytesMut::new();
    encode_into(message, &mut dst);
    // Only ASCII is ever written.
    String::from_utf8_lossy(&dst).into_owned()
}

/// Encode a batch for a single send: `##` followed by each frame in order.
///
/// An empty batch encodes to nothing.
pub fn encode_batch(messages: &[Message], dst: &mut BytesMut) {
    if messages.is_empty() {
        return;
    }
    dst.put_slice(TRANSPORT_PREFIX.as_bytes());
    for message in messages {
        encode_into(message, dst);
    }
}

fn encode_into(message: &Message, dst: &mut BytesMut) {
    dst.reserve(START_MARKER.len() * 4 + message.payload.len() + 24);
    dst.put_slice(START_MARKER.as_bytes());
    dst.put_slice(message.type_id.to_string().as_bytes());
    dst.put_slice(ID_MARKER.as_bytes());
    dst.put_slice(message.data_id.to_string().as_bytes());
    dst.put_slice(DATA_MARKER.as_bytes());
    put_ascii(dst, &message.payload);
    dst.put_slice(END_MARKER.as_bytes());
}

/// Non-ASCII characters go out as `?`.
fn put_ascii(dst: &mut BytesMut, text: &str) {
    for ch in text.chars() {
        dst.put_u8(if ch.is_ascii() { ch as u8 } else { b'?' });
    }
}

fn decode_fragment(fragment: &str) -> Option<Message> {
    if !FIELD_MARKERS.iter().all(|marker| fragment.contains(marker)) {
        return None;
    }

    let segments = split_any(fragment, &FIELD_MARKERS);
    if segments.len() < 3 {
        return None;
    }

    Some(Message {
        type_id: parse_number(segments[0]),
        data_id: parse_number(segments[1]),
        payload: segments[2].to_string(),
    })
}

fn remainder_of(fragments: &[&str]) -> String {
    let Some(last) = fragments.last() else {
        return String::new();
    };

    match last.find(END_MARKER) {
        Some(index) => last[index + END_MARKER.len()..].to_string(),
        None if fragments.len() > 1 => {
            if START_MARKER.len() + last.len() > MAX_CARRIED_FRAME_LEN {
                debug!(len = last.len(), "unfinished frame too long; dropped");
                return partial_start_suffix(last).to_string();
            }
            format!("{START_MARKER}{last}")
        }
        None => partial_start_suffix(last).to_string(),
    }
}

/// Longest tail of `text` that could be the beginning of a split `^ST^`.
fn partial_start_suffix(text: &str) -> &str {
    (1..START_MARKER.len())
        .rev()
        .map(|len| &START_MARKER[..len])
        .find(|prefix| text.ends_with(prefix))
        .map_or("", |prefix| &text[text.len() - prefix.len()..])
}

/// Split on whichever separator occurs first at each position.
fn split_any<'a>(text: &'a str, separators: &[&str]) -> Vec<&'a str> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut pos = 0;

    while pos < text.len() {
        let rest = &text[pos..];
        match separators.iter().find(|sep| rest.starts_with(**sep)) {
            Some(sep) => {
                segments.push(&text[start..pos]);
                pos += sep.len();
                start = pos;
            }
            None => pos += rest.chars().next().map_or(1, char::len_utf8),
        }
    }
    segments.push(&text[start..]);
    segments
}

fn parse_number(text: &str) -> i32 {
    text.trim().parse().unwrap_or(INVALID_TYPE_ID)
}
