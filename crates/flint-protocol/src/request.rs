//! Client request representation.
//!
//! A request is an ordered list of opaque byte-string tokens — the command
//! name followed by its arguments. On the wire it is a RESP array of bulk
//! strings, which is the standard client → server format.

use bytes::{Bytes, BytesMut};

use crate::serialize_tokens;

/// A command to send to the server: name plus arguments, all binary-safe.
///
/// Built with [`Request::cmd`] and [`Request::arg`]:
///
/// ```
/// use flint_protocol::Request;
///
/// let req = Request::cmd("SET").arg("key").arg("value");
/// assert_eq!(req.name(), "set");
/// assert_eq!(req.token_count(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    tokens: Vec<Bytes>,
}

impl Request {
    /// Starts a request with the given command name.
    pub fn cmd(name: impl AsRef<[u8]>) -> Self {
        Self {
            tokens: vec![Bytes::copy_from_slice(name.as_ref())],
        }
    }

    /// Appends an argument token.
    pub fn arg(mut self, arg: impl AsRef<[u8]>) -> Self {
        self.tokens.push(Bytes::copy_from_slice(arg.as_ref()));
        self
    }

    /// Builds a request from pre-assembled tokens.
    ///
    /// The first token is the command name. An empty token list produces a
    /// request that no registry will recognize; callers should avoid it.
    pub fn from_tokens(tokens: Vec<Bytes>) -> Self {
        Self { tokens }
    }

    /// Returns the command name, ASCII-lowercased.
    ///
    /// Empty for a request with no tokens. Non-UTF-8 name bytes are replaced,
    /// which is fine for lookup purposes — no real command name contains them.
    pub fn name(&self) -> String {
        self.tokens
            .first()
            .map(|t| String::from_utf8_lossy(t).to_ascii_lowercase())
            .unwrap_or_default()
    }

    /// Returns the token at `index`, if present.
    pub fn token(&self, index: usize) -> Option<&Bytes> {
        self.tokens.get(index)
    }

    /// Returns all tokens in order.
    pub fn tokens(&self) -> &[Bytes] {
        &self.tokens
    }

    /// Returns the number of tokens (command name included).
    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    /// Returns a copy of this request truncated to its first token.
    pub fn name_only(&self) -> Request {
        Self {
            tokens: self.tokens.first().cloned().into_iter().collect(),
        }
    }

    /// Serializes this request as a RESP array of bulk strings.
    pub fn serialize(&self, dst: &mut BytesMut) {
        serialize_tokens(&self.tokens, dst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder() {
        let req = Request::cmd("GET").arg("mykey");
        assert_eq!(req.name(), "get");
        assert_eq!(req.token(1).unwrap().as_ref(), b"mykey");
        assert_eq!(req.token(2), None);
    }

    #[test]
    fn name_is_lowercased() {
        assert_eq!(Request::cmd("MsEt").name(), "mset");
    }

    #[test]
    fn binary_safe_args() {
        let req = Request::cmd("SET").arg(b"k\x00ey".as_slice()).arg([0xff, 0xfe]);
        assert_eq!(req.token(1).unwrap().as_ref(), b"k\x00ey");
        assert_eq!(req.token(2).unwrap().as_ref(), &[0xff, 0xfe][..]);
    }

    #[test]
    fn name_only_truncates() {
        let req = Request::cmd("MULTI").arg("pinkey");
        let cleaned = req.name_only();
        assert_eq!(cleaned.token_count(), 1);
        assert_eq!(cleaned.name(), "multi");
        // already-bare requests are unchanged
        assert_eq!(cleaned.name_only(), cleaned);
    }

    #[test]
    fn serializes_as_bulk_array() {
        let req = Request::cmd("GET").arg("k");
        let mut buf = BytesMut::new();
        req.serialize(&mut buf);
        assert_eq!(&buf[..], b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n");
    }

    #[test]
    fn empty_request() {
        let req = Request::from_tokens(vec![]);
        assert_eq!(req.name(), "");
        assert_eq!(req.token_count(), 0);
    }
}
