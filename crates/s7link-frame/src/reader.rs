use std::fmt;
use std::io::{ErrorKind, Read};

use tracing::trace;

use crate::codec::decode;
use crate::error::{FrameError, Result};
use crate::message::Message;

/// Bytes the controller prepends to every chunk it sends.
///
/// A chunk is everything available at the time of a read, however many
/// `read` calls it takes to drain.
pub const CONTROLLER_HEADER_LEN: usize = 2;

const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Decodes messages from a byte stream, carrying partial frames across reads.
///
/// Each receive chunk loses its controller header and any null bytes before
/// it is appended to the pending text and decoded.
pub struct FrameReader {
    pending: String,
    chunk: Box<[u8]>,
}

impl FrameReader {
    pub fn new() -> Self {
        Self {
            pending: String::new(),
            chunk: vec![0u8; READ_CHUNK_SIZE].into_boxed_slice(),
        }
    }

    /// Read one chunk from `src` and decode it.
    ///
    /// Returns `Ok(None)` when nothing is available right now (non-blocking
    /// sources or an expired read timeout) and
    /// `Err(FrameError::ConnectionClosed)` on EOF.
    pub fn read_from<R: Read>(&mut self, src: &mut R) -> Result<Option<Vec<Message>>> {
        loop {
            let read = match src.read(&mut self.chunk) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err)
                    if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                {
                    return Ok(None)
                }
                Err(err) => return Err(FrameError::Io(err)),
            };

            let text = if read < self.chunk.len() {
                chunk_text(&self.chunk[..read])
            } else {
                let received = self.drain_available(src);
                chunk_text(&received)
            };
            return Ok(Some(self.push_text(&text)));
        }
    }

    /// The read buffer came back full: keep reading until the source runs
    /// dry so the whole receive is decoded as one chunk.
    fn drain_available<R: Read>(&mut self, src: &mut R) -> Vec<u8> {
        let mut received = self.chunk.to_vec();
        loop {
            match src.read(&mut self.chunk) {
                Ok(0) => break,
                Ok(n) => {
                    received.extend_from_slice(&self.chunk[..n]);
                    if n < self.chunk.len() {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                // EOF and hard errors show up again on the next read.
                Err(_) => break,
            }
        }
        trace!(bytes = received.len(), "drained oversized receive");
        received
    }

    /// Decode one receive chunk as it came off the socket.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Message> {
        let text = chunk_text(chunk);
        self.push_text(&text)
    }

    /// Undecoded text carried into the next read.
    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// Forget any carried text.
    pub fn reset(&mut self) {
        self.pending.clear();
    }

    fn push_text(&mut self, text: &str) -> Vec<Message> {
        self.pending.push_str(text);
        let decoded = decode(&self.pending);
        self.pending = decoded.remainder;
        trace!(
            decoded = decoded.messages.len(),
            pending = self.pending.len(),
            "decoded chunk"
        );
        decoded.messages
    }
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FrameReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameReader")
            .field("pending", &self.pending)
            .finish()
    }
}

/// Header stripped, nulls removed, non-ASCII bytes read as `?`.
fn chunk_text(chunk: &[u8]) -> String {
    chunk
        .get(CONTROLLER_HEADER_LEN..)
        .unwrap_or_default()
        .iter()
        .filter(|byte| **byte != 0)
        .map(|byte| if byte.is_ascii() { *byte as char } else { '?' })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::codec::MAX_CARRIED_FRAME_LEN;

    #[test]
    fn feed_strips_header_and_nulls() {
        let mut reader = FrameReader::new();
        let messages = reader.feed(b"\x10\x20^ST^4^ID^1^DT^15\x003^EN^\x00\x00");

        assert_eq!(messages, vec![Message::new(4, 1, "153")]);
        assert_eq!(reader.pending(), "");
    }

    #[test]
    fn chunk_shorter_than_header_yields_nothing() {
        let mut reader = FrameReader::new();
        assert!(reader.feed(b"^").is_empty());
        assert!(reader.feed(b"").is_empty());
        assert_eq!(reader.pending(), "");
    }

    #[test]
    fn non_ascii_bytes_read_as_question_mark() {
        let mut reader = FrameReader::new();
        let messages = reader.feed(b"..^ST^7^ID^2^DT^a\xffb^EN^");
        assert_eq!(messages, vec![Message::new(7, 2, "a?b")]);
    }

    #[test]
    fn frame_split_across_chunks() {
        let mut reader = FrameReader::new();
        assert!(reader.feed(b"..^ST^2^ID^3^D").is_empty());
        assert_eq!(reader.pending(), "^ST^2^ID^3^D");

        let messages = reader.feed(b"..T^1^EN^^ST^5^ID^0^DT^010^EN^");
        assert_eq!(
            messages,
            vec![Message::new(2, 3, "1"), Message::new(5, 0, "010")]
        );
        assert_eq!(reader.pending(), "");
    }

    #[test]
    fn unterminated_frame_does_not_grow_pending() {
        let mut reader = FrameReader::new();
        let mut first = b"..^ST^1^ID^2^DT^".to_vec();
        first.extend(std::iter::repeat(b'x').take(1000));
        reader.feed(&first);

        let mut chunk = b"..".to_vec();
        chunk.extend(std::iter::repeat(b'x').take(1000));
        for _ in 0..200 {
            assert!(reader.feed(&chunk).is_empty());
            assert!(reader.pending().len() <= MAX_CARRIED_FRAME_LEN);
        }

        let messages = reader.feed(b"..^ST^3^ID^4^DT^5^EN^");
        assert_eq!(messages, vec![Message::new(3, 4, "5")]);
    }

    #[test]
    fn reset_drops_carried_text() {
        let mut reader = FrameReader::new();
        reader.feed(b"..^ST^2^ID");
        assert!(!reader.pending().is_empty());

        reader.reset();
        assert_eq!(reader.pending(), "");
        assert!(reader.feed(b"..^3^DT^1^EN^").is_empty());
    }

    #[test]
    fn read_from_decodes_one_chunk() {
        let mut reader = FrameReader::new();
        let mut src = Cursor::new(b"\x00\x00^ST^1^ID^1^DT^1^EN^".to_vec());

        let messages = reader.read_from(&mut src).unwrap().unwrap();
        assert_eq!(messages, vec![Message::new(1, 1, "1")]);
    }

    #[test]
    fn read_from_keeps_large_receive_in_one_chunk() {
        let payload = "y".repeat(70_000);
        let wire = format!("\x00\x00^ST^1^ID^1^DT^{payload}^EN^");
        let mut reader = FrameReader::new();
        let mut src = Cursor::new(wire.into_bytes());

        let messages = reader.read_from(&mut src).unwrap().unwrap();

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].payload.len(), 70_000);
        assert!(matches!(
            reader.read_from(&mut src),
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[test]
    fn read_from_stops_draining_when_source_would_block() {
        let mut full = b"\x00\x00^ST^8^ID^1^DT^".to_vec();
        full.resize(READ_CHUNK_SIZE, b'z');
        let mut src = Scripted::new(vec![
            Ok(full),
            Ok(b"z^EN^".to_vec()),
            Err(ErrorKind::WouldBlock),
        ]);
        let mut reader = FrameReader::new();

        let messages = reader.read_from(&mut src).unwrap().unwrap();

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].type_id, 8);
        assert!(reader.read_from(&mut src).unwrap().is_none());
    }

    #[test]
    fn read_from_reports_eof() {
        let mut reader = FrameReader::new();
        let err = reader.read_from(&mut Cursor::new(Vec::new())).unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn read_from_would_block_is_not_an_error() {
        let mut reader = FrameReader::new();
        let mut src = Scripted::new(vec![Err(ErrorKind::WouldBlock)]);
        assert!(reader.read_from(&mut src).unwrap().is_none());
    }

    #[test]
    fn read_from_retries_interrupted() {
        let mut reader = FrameReader::new();
        let mut src = Scripted::new(vec![
            Err(ErrorKind::Interrupted),
            Ok(b"##^ST^9^ID^9^DT^ok^EN^".to_vec()),
        ]);
        let messages = reader.read_from(&mut src).unwrap().unwrap();
        assert_eq!(messages, vec![Message::new(9, 9, "ok")]);
    }

    #[test]
    fn read_from_propagates_hard_errors() {
        let mut reader = FrameReader::new();
        let mut src = Scripted::new(vec![Err(ErrorKind::ConnectionReset)]);
        let err = reader.read_from(&mut src).unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::ConnectionReset));
    }

    struct Scripted {
        steps: Vec<std::result::Result<Vec<u8>, ErrorKind>>,
    }

    impl Scripted {
        fn new(mut steps: Vec<std::result::Result<Vec<u8>, ErrorKind>>) -> Self {
            steps.reverse();
            Self { steps }
        }
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.steps.pop() {
                Some(Ok(bytes)) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
                Some(Err(kind)) => Err(std::io::Error::from(kind)),
                None => Ok(0),
            }
        }
    }
}
