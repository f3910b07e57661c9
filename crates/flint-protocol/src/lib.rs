//! flint-protocol: RESP wire protocol implementation.
//!
//! Provides zero-copy parsing and direct-to-buffer serialization of the
//! RESP protocol used for client-server communication, plus the [`Request`]
//! token-array representation of outgoing commands.
//!
//! # quick start
//!
//! ```
//! use bytes::BytesMut;
//! use flint_protocol::{Frame, Request, parse_frame};
//!
//! // parse a reply
//! let input = b"+OK\r\n";
//! let (frame, consumed) = parse_frame(input).unwrap().unwrap();
//! assert_eq!(frame, Frame::Simple("OK".into()));
//! assert_eq!(consumed, 5);
//!
//! // encode a request
//! let mut buf = BytesMut::new();
//! Request::cmd("PING").serialize(&mut buf);
//! assert_eq!(&buf[..], b"*1\r\n$4\r\nPING\r\n");
//! ```

pub mod error;
pub mod parse;
pub mod request;
mod serialize;
pub mod types;

pub use error::ProtocolError;
pub use parse::{parse_frame, parse_frame_bytes};
pub use request::Request;
pub use serialize::serialize_tokens;
pub use types::Frame;
