use std::io::{ErrorKind, Write};

use bytes::BytesMut;

use crate::codec::encode_batch;
use crate::error::{FrameError, Result};
use crate::message::Message;

const INITIAL_BUFFER_CAPACITY: usize = 1024;

/// Writes batches of messages, one send per batch.
#[derive(Debug)]
pub struct FrameWriter {
    buf: BytesMut,
}

impl FrameWriter {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Encode `messages` with the transport prefix and write them (blocking).
    ///
    /// Returns the number of bytes written; an empty batch writes nothing.
    /// A write timeout on the destination surfaces as `FrameError::Io`.
    pub fn write_batch<W: Write>(&mut self, dst: &mut W, messages: &[Message]) -> Result<usize> {
        self.buf.clear();
        encode_batch(messages, &mut self.buf);
        if self.buf.is_empty() {
            return Ok(0);
        }

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match dst.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        loop {
            match dst.flush() {
                Ok(()) => return Ok(self.buf.len()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }
}

impl Default for FrameWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode;

    #[test]
    fn writes_prefixed_batch() {
        let mut writer = FrameWriter::new();
        let mut wire = Vec::new();

        let written = writer
            .write_batch(
                &mut wire,
                &[Message::new(1, 1, "1"), Message::new(6, 0, "1")],
            )
            .unwrap();

        assert_eq!(wire, b"##^ST^1^ID^1^DT^1^EN^^ST^6^ID^0^DT^1^EN^");
        assert_eq!(written, wire.len());
    }

    #[test]
    fn empty_batch_writes_nothing() {
        let mut writer = FrameWriter::new();
        let mut wire = Vec::new();
        assert_eq!(writer.write_batch(&mut wire, &[]).unwrap(), 0);
        assert!(wire.is_empty());
    }

    #[test]
    fn partial_writes_complete_the_batch() {
        let mut writer = FrameWriter::new();
        let mut dst = Trickle {
            written: Vec::new(),
            interrupt_next: true,
        };
        let batch = vec![Message::new(2, 5, "0"), Message::new(4, 4, "218")];

        writer.write_batch(&mut dst, &batch).unwrap();

        let text = String::from_utf8(dst.written).unwrap();
        let decoded = decode(text.strip_prefix("##").unwrap());
        assert_eq!(decoded.messages, batch);
    }

    #[test]
    fn zero_length_write_is_connection_closed() {
        let mut writer = FrameWriter::new();
        let mut dst = Closed;
        let err = writer
            .write_batch(&mut dst, &[Message::new(1, 1, "1")])
            .unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn write_timeout_is_an_io_error() {
        let mut writer = FrameWriter::new();
        let mut dst = Stalled;
        let err = writer
            .write_batch(&mut dst, &[Message::new(1, 1, "1")])
            .unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::WouldBlock));
    }

    /// Accepts three bytes per call, interrupting every other call.
    struct Trickle {
        written: Vec<u8>,
        interrupt_next: bool,
    }

    impl Write for Trickle {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            let interrupt = self.interrupt_next;
            self.interrupt_next = !interrupt;
            if interrupt {
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            let n = buf.len().min(3);
            self.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct Closed;

    impl Write for Closed {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct Stalled;

    impl Write for Stalled {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::WouldBlock))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
