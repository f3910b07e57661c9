//! RESP reply frame types.
//!
//! The [`Frame`] enum represents a single parsed RESP value as returned by a
//! server. Bulk payloads use `Bytes` for reference-counted storage that
//! avoids copies when replies move between tasks.

use bytes::Bytes;

/// A single RESP protocol frame.
///
/// Covers the reply surface of a key-value server: status strings, errors,
/// integers, bulk data, arrays, and the null reply (`$-1` / `*-1`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Simple string reply, e.g. `+OK\r\n`.
    /// Used for short, non-binary status replies.
    Simple(String),

    /// Error reply, e.g. `-ERR unknown command\r\n`.
    ///
    /// The first whitespace-delimited token classifies the error
    /// (`ERR`, `MOVED`, `ASK`, `WRONGTYPE`, ...).
    Error(String),

    /// 64-bit signed integer, e.g. `:42\r\n`.
    Integer(i64),

    /// Bulk (binary-safe) string, e.g. `$5\r\nhello\r\n`.
    Bulk(Bytes),

    /// Ordered array of frames, e.g. `*2\r\n+hello\r\n+world\r\n`.
    Array(Vec<Frame>),

    /// Null reply: `$-1\r\n`, `*-1\r\n`, or the RESP3 form `_\r\n`.
    Null,
}

impl Frame {
    /// Returns `true` if this frame is a null value.
    pub fn is_null(&self) -> bool {
        matches!(self, Frame::Null)
    }

    /// Returns the error text if this frame is an error reply.
    pub fn error_text(&self) -> Option<&str> {
        match self {
            Frame::Error(msg) => Some(msg),
            _ => None,
        }
    }

    /// Returns the integer value if this frame is an integer reply.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Frame::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the bulk payload if this frame is a bulk string.
    pub fn as_bulk(&self) -> Option<&Bytes> {
        match self {
            Frame::Bulk(data) => Some(data),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_equality() {
        assert_eq!(Frame::Simple("OK".into()), Frame::Simple("OK".into()));
        assert_ne!(Frame::Simple("OK".into()), Frame::Simple("ERR".into()));
        assert_eq!(Frame::Integer(42), Frame::Integer(42));
        assert_eq!(Frame::Null, Frame::Null);
    }

    #[test]
    fn is_null() {
        assert!(Frame::Null.is_null());
        assert!(!Frame::Simple("OK".into()).is_null());
        assert!(!Frame::Integer(0).is_null());
    }

    #[test]
    fn error_text_access() {
        let frame = Frame::Error("MOVED 7000 10.0.0.2:6379".into());
        assert_eq!(frame.error_text(), Some("MOVED 7000 10.0.0.2:6379"));
        assert_eq!(Frame::Simple("OK".into()).error_text(), None);
    }

    #[test]
    fn clone_bulk() {
        let frame = Frame::Bulk(Bytes::from_static(b"hello"));
        let cloned = frame.clone();
        assert_eq!(frame, cloned);
    }
}
