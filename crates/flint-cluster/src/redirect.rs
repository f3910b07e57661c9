//! MOVED/ASK redirect parsing.
//!
//! Cluster servers signal topology changes through error replies whose
//! first whitespace-delimited token is `MOVED` or `ASK`. Parsing is a
//! bounded token split, never a regex.

use flint_protocol::Frame;

/// A parsed cluster redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redirect {
    /// The slot has moved permanently. The payload is deliberately not
    /// carried: the correct response is a full topology refresh, after
    /// which routing consults the fresh map rather than the hint.
    Moved,

    /// One-shot redirect during slot migration: re-send this single
    /// request to `host:port`, prefixed by an `ASKING` hint.
    Ask { slot: u16, host: String, port: u16 },
}

impl Redirect {
    /// Parses a redirect out of a reply frame.
    ///
    /// Returns `None` for anything that is not an error frame carrying a
    /// well-formed redirect. A malformed `ASK` payload (missing address,
    /// non-decimal port) is treated as an ordinary server error and yields
    /// `None`, so the caller propagates the reply unchanged.
    pub fn parse(reply: &Frame) -> Option<Redirect> {
        let msg = reply.error_text()?;
        let mut parts = msg.split_ascii_whitespace();

        match parts.next()? {
            "MOVED" => Some(Redirect::Moved),
            "ASK" => {
                let slot: u16 = parts.next()?.parse().ok()?;
                let addr = parts.next()?;
                // anything after host:port makes the reply ambiguous
                if parts.next().is_some() {
                    return None;
                }
                let (host, port_str) = addr.rsplit_once(':')?;
                if host.is_empty() || !port_str.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                let port: u16 = port_str.parse().ok()?;
                Some(Redirect::Ask {
                    slot,
                    host: host.to_string(),
                    port,
                })
            }
            _ => None,
        }
    }
}
