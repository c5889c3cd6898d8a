use bytes::{Bytes, BytesMut};
use thiserror::Error;

/// Upper bound on a single framed message unless overridden with
/// [`Framer::with_max_message_size`].
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// A frame function decodes a just-read segment of a message and returns how
/// many more bytes are needed, or 0 when the message is complete.
///
/// For a length-prefixed protocol the function is called once with the header
/// bytes and returns the body length; it is then called again with the body
/// bytes and returns 0. Multi-stage headers simply return nonzero more than
/// once. The segment is mutable so the function can decode in place.
pub type FrameFn = Box<dyn FnMut(&mut [u8]) -> usize + Send>;

/// Frame function that always reports a complete message.
///
/// [`Framing::fixed`] and [`Framing::sink`] are defined in terms of it.
pub fn null_frame(_: &mut [u8]) -> usize {
    0
}

/// Framing policy for a TCP byte stream, selected when I/O is started on a
/// connection.
pub enum Framing {
    /// Fixed-size header followed by a variable body sized by the frame
    /// function.
    Header {
        /// Bytes to read before the frame function is first consulted.
        header_size: usize,
        /// Application decoder, see [`FrameFn`].
        frame: FrameFn,
    },
    /// Messages delimited by a byte sequence; the delimiter is delivered as
    /// part of each message.
    Delimiter(Vec<u8>),
}

impl Framing {
    /// Fixed-header framing. Panics if `header_size` is zero.
    pub fn header(header_size: usize, frame: FrameFn) -> Self {
        assert!(header_size > 0, "header size must be nonzero");
        Framing::Header { header_size, frame }
    }

    /// Every message is exactly `read_size` bytes. Panics if zero.
    pub fn fixed(read_size: usize) -> Self {
        Framing::header(read_size, Box::new(null_frame))
    }

    /// Delimiter framing, e.g. `Framing::delimiter(b"\r\n".to_vec())`.
    /// Panics on an empty delimiter.
    pub fn delimiter(delim: impl Into<Vec<u8>>) -> Self {
        let delim = delim.into();
        assert!(!delim.is_empty(), "delimiter must be nonempty");
        Framing::Delimiter(delim)
    }

    /// Discard mode: one-byte messages, intended to be paired with a message
    /// handler that ignores its input.
    pub fn sink() -> Self {
        Framing::fixed(1)
    }
}

/// Error produced when a stream cannot be framed.
#[derive(Debug, Error)]
pub enum FrameError {
    /// A message grew past the configured maximum, either because the frame
    /// function requested too much body or a delimiter never arrived.
    #[error("framed message of {size} bytes exceeds maximum of {max}")]
    MessageTooLarge {
        /// Size the message would have reached.
        size: usize,
        /// Configured maximum.
        max: usize,
    },
}

/// Incremental message extractor over an accumulation buffer.
///
/// The owner appends raw bytes from the socket to a `BytesMut` and calls
/// [`next_message`](Framer::next_message) until it returns `Ok(None)`;
/// complete messages are split off the front of the buffer and returned
/// zero-copy.
pub struct Framer {
    framing: Framing,
    max_size: usize,
    // bytes of `acc` already validated as part of the in-progress message
    msg_len: usize,
    // bytes still needed to complete the current segment (header mode)
    need: usize,
    // resume point for delimiter scans
    scan_pos: usize,
}

impl Framer {
    /// Creates a framer with [`DEFAULT_MAX_MESSAGE_SIZE`].
    pub fn new(framing: Framing) -> Self {
        Self::with_max_message_size(framing, DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// Creates a framer with an explicit maximum message size.
    pub fn with_max_message_size(framing: Framing, max_size: usize) -> Self {
        let need = match &framing {
            Framing::Header { header_size, .. } => *header_size,
            Framing::Delimiter(_) => 0,
        };
        Self {
            framing,
            max_size,
            msg_len: 0,
            need,
            scan_pos: 0,
        }
    }

    /// Extracts the next complete message from the front of `acc`.
    ///
    /// Returns `Ok(None)` when more bytes are needed. The frame function of a
    /// header policy is invoked exactly once per completed segment, in stream
    /// order, regardless of how the bytes were chopped up by the transport.
    pub fn next_message(&mut self, acc: &mut BytesMut) -> Result<Option<Bytes>, FrameError> {
        match &mut self.framing {
            Framing::Header { header_size, frame } => loop {
                let want = self.msg_len + self.need;
                if want > self.max_size {
                    return Err(FrameError::MessageTooLarge {
                        size: want,
                        max: self.max_size,
                    });
                }
                if acc.len() < want {
                    return Ok(None);
                }
                let next = frame(&mut acc[self.msg_len..want]);
                self.msg_len = want;
                if next == 0 {
                    let msg = acc.split_to(self.msg_len).freeze();
                    self.msg_len = 0;
                    self.need = *header_size;
                    return Ok(Some(msg));
                }
                self.need = next;
            },
            Framing::Delimiter(delim) => {
                if let Some(end) = find_delimiter(acc, delim, self.scan_pos) {
                    self.scan_pos = 0;
                    return Ok(Some(acc.split_to(end).freeze()));
                }
                if acc.len() > self.max_size {
                    return Err(FrameError::MessageTooLarge {
                        size: acc.len(),
                        max: self.max_size,
                    });
                }
                // a partial delimiter may straddle the next read
                self.scan_pos = acc.len().saturating_sub(delim.len() - 1);
                Ok(None)
            }
        }
    }
}

// Returns the exclusive end of the first delimiter occurrence at or after
// `from`.
fn find_delimiter(acc: &[u8], delim: &[u8], from: usize) -> Option<usize> {
    if acc.len() < delim.len() {
        return None;
    }
    (from..=acc.len() - delim.len())
        .find(|&i| &acc[i..i + delim.len()] == delim)
        .map(|i| i + delim.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;

    fn be16_frame() -> FrameFn {
        Box::new(|hdr: &mut [u8]| u16::from_be_bytes([hdr[0], hdr[1]]) as usize)
    }

    fn drain(framer: &mut Framer, acc: &mut BytesMut) -> Vec<Bytes> {
        let mut out = Vec::new();
        while let Some(msg) = framer.next_message(acc).unwrap() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn header_framing_whole_message() {
        let mut framer = Framer::new(Framing::header(2, be16_frame()));
        let mut acc = BytesMut::new();
        acc.put_u16(3);
        acc.put_slice(b"abc");

        let msgs = drain(&mut framer, &mut acc);
        assert_eq!(msgs.len(), 1);
        assert_eq!(&msgs[0][..], &[0, 3, b'a', b'b', b'c']);
        assert!(acc.is_empty());
    }

    #[test]
    fn header_framing_across_split_reads() {
        let mut framer = Framer::new(Framing::header(2, be16_frame()));
        let mut acc = BytesMut::new();

        // header arrives one byte at a time
        acc.put_u8(0);
        assert!(framer.next_message(&mut acc).unwrap().is_none());
        acc.put_u8(4);
        assert!(framer.next_message(&mut acc).unwrap().is_none());

        // body in two pieces, second piece runs into the next header
        acc.put_slice(b"ab");
        assert!(framer.next_message(&mut acc).unwrap().is_none());
        acc.put_slice(b"cd\x00\x01x");

        let msgs = drain(&mut framer, &mut acc);
        assert_eq!(msgs.len(), 2);
        assert_eq!(&msgs[0][2..], b"abcd");
        assert_eq!(&msgs[1][..], &[0, 1, b'x']);
    }

    #[test]
    fn header_framing_empty_body() {
        let mut framer = Framer::new(Framing::header(2, be16_frame()));
        let mut acc = BytesMut::new();
        acc.put_u16(0);
        let msgs = drain(&mut framer, &mut acc);
        assert_eq!(msgs.len(), 1);
        assert_eq!(&msgs[0][..], &[0, 0]);
    }

    #[test]
    fn frame_fn_called_once_per_segment() {
        let mut calls = 0usize;
        let framing = Framing::header(
            1,
            Box::new(move |seg: &mut [u8]| {
                calls += 1;
                assert!(calls <= 2, "frame fn re-invoked on same segment");
                if seg.len() == 1 { seg[0] as usize } else { 0 }
            }),
        );
        let mut framer = Framer::new(framing);
        let mut acc = BytesMut::from(&[2u8][..]);
        assert!(framer.next_message(&mut acc).unwrap().is_none());
        // same bytes still pending, frame fn must not run again yet
        assert!(framer.next_message(&mut acc).unwrap().is_none());
        acc.put_slice(&[9, 9]);
        assert!(framer.next_message(&mut acc).unwrap().is_some());
    }

    #[test]
    fn fixed_framing() {
        let mut framer = Framer::new(Framing::fixed(4));
        let mut acc = BytesMut::from(&b"aaaabbbbcc"[..]);
        let msgs = drain(&mut framer, &mut acc);
        assert_eq!(msgs.len(), 2);
        assert_eq!(&msgs[0][..], b"aaaa");
        assert_eq!(&msgs[1][..], b"bbbb");
        assert_eq!(&acc[..], b"cc");
    }

    #[test]
    fn sink_framing_single_bytes() {
        let mut framer = Framer::new(Framing::sink());
        let mut acc = BytesMut::from(&b"xyz"[..]);
        assert_eq!(drain(&mut framer, &mut acc).len(), 3);
    }

    #[test]
    fn delimiter_framing() {
        let mut framer = Framer::new(Framing::delimiter(&b"\r\n"[..]));
        let mut acc = BytesMut::from(&b"one\r\ntwo\r\nthr"[..]);
        let msgs = drain(&mut framer, &mut acc);
        assert_eq!(msgs.len(), 2);
        assert_eq!(&msgs[0][..], b"one\r\n");
        assert_eq!(&msgs[1][..], b"two\r\n");
        assert_eq!(&acc[..], b"thr");

        // delimiter split across reads
        acc.put_u8(b'\r');
        assert!(framer.next_message(&mut acc).unwrap().is_none());
        acc.put_u8(b'\n');
        let msg = framer.next_message(&mut acc).unwrap().unwrap();
        assert_eq!(&msg[..], b"thr\r\n");
    }

    #[test]
    fn oversize_message_rejected() {
        let framing = Framing::header(2, be16_frame());
        let mut framer = Framer::with_max_message_size(framing, 16);
        let mut acc = BytesMut::new();
        acc.put_u16(1000);
        assert!(matches!(
            framer.next_message(&mut acc),
            Err(FrameError::MessageTooLarge { .. })
        ));
    }

    #[test]
    fn runaway_delimiter_stream_rejected() {
        let mut framer = Framer::with_max_message_size(Framing::delimiter(&b"\n"[..]), 8);
        let mut acc = BytesMut::from(&b"no newline here"[..]);
        assert!(matches!(
            framer.next_message(&mut acc),
            Err(FrameError::MessageTooLarge { .. })
        ));
    }
}
