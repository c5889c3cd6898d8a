//! # Hawser Codec - Byte-Stream Framing
//!
//! `hawser-codec` provides the framing policies used by the hawser networking
//! framework to split a TCP byte stream into discrete messages, without any
//! I/O dependencies.
//!
//! ## Framing policies
//!
//! - **Fixed header + variable body**: read a fixed-size header, let an
//!   application frame function decode it and request the body bytes
//! - **Delimiter**: split on a byte sequence such as `\r\n`, delimiter
//!   included in the delivered message
//! - **Fixed size**: every message is exactly N bytes
//! - **Sink**: discard mode, one byte at a time, used to keep a connection
//!   open while draining whatever the peer sends
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! hawser-codec = "0.2"
//! ```
//!
//! ## Framing a length-prefixed stream
//!
//! ```rust
//! use bytes::{BufMut, BytesMut};
//! use hawser_codec::{Framer, Framing};
//!
//! // 2-byte big-endian body length header
//! let framing = Framing::header(2, Box::new(|hdr: &mut [u8]| {
//!     u16::from_be_bytes([hdr[0], hdr[1]]) as usize
//! }));
//! let mut framer = Framer::new(framing);
//!
//! let mut acc = BytesMut::new();
//! acc.put_u16(5);
//! acc.put_slice(b"hello");
//!
//! let msg = framer.next_message(&mut acc).unwrap().unwrap();
//! assert_eq!(&msg[2..], b"hello");
//! assert!(framer.next_message(&mut acc).unwrap().is_none());
//! ```
//!
//! The framer is a pure state machine: feed it an accumulation buffer after
//! every socket read and pop complete messages until it returns `None`.

#![warn(rust_2018_idioms)]
#![warn(missing_docs)]

mod framer;

pub use framer::{FrameError, FrameFn, Framer, Framing, null_frame, DEFAULT_MAX_MESSAGE_SIZE};
