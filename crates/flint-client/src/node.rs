//! Per-node connections.
//!
//! A [`NodeConnection`] owns one live transport exclusively, plus the
//! carry-over read buffer that lets the streaming frame parser resume
//! where the previous decode left off. All I/O on one connection is
//! serialized by the layer above; this type is not re-entrant.

use std::io;
use std::time::Duration;

use bytes::BytesMut;
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use flint_cluster::NodeId;
use flint_protocol::{parse_frame, Frame, Request};

use crate::error::Error;

/// Byte transport to one node. Anything async-readable and -writable works;
/// production uses TCP, tests use in-memory duplex pipes.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

/// Boxed transport, as produced by a [`Connector`].
pub type BoxTransport = Box<dyn Transport>;

/// Socket-opening callback, injected by the caller: `(host, port,
/// connect_timeout) -> transport`. Opening sockets is deliberately outside
/// the client core so deployments control dialing, TLS, and proxies.
pub type Connector =
    Arc<dyn Fn(String, u16, Option<Duration>) -> BoxFuture<'static, io::Result<BoxTransport>> + Send + Sync>;

/// Wraps a closure as a [`Connector`].
pub fn connector_fn<F>(f: F) -> Connector
where
    F: Fn(String, u16, Option<Duration>) -> BoxFuture<'static, io::Result<BoxTransport>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// The stock plain-TCP connector.
pub fn tcp_connector() -> Connector {
    connector_fn(|host, port, limit| {
        Box::pin(async move {
            let connect = TcpStream::connect((host.as_str(), port));
            let stream = match limit {
                Some(limit) => timeout(limit, connect)
                    .await
                    .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??,
                None => connect.await?,
            };
            Ok(Box::new(stream) as BoxTransport)
        })
    })
}

/// A connection to a single cluster node with read/write buffering.
pub struct NodeConnection {
    node_id: NodeId,
    transport: BoxTransport,
    /// Unparsed tail left over from the previous frame decode.
    read_buf: BytesMut,
    write_buf: BytesMut,
    deadline: Duration,
}

impl NodeConnection {
    /// Wraps an established transport.
    pub fn new(node_id: NodeId, transport: BoxTransport, deadline: Duration) -> Self {
        Self {
            node_id,
            transport,
            read_buf: BytesMut::with_capacity(4096),
            write_buf: BytesMut::with_capacity(4096),
            deadline,
        }
    }

    /// The id of the node this connection talks to.
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Sends a batch of requests and reads exactly one reply per request.
    ///
    /// Requests are cleaned (MULTI/EXEC routing pins stripped), serialized
    /// into one write, and the replies are read back in order, resuming
    /// from the carry-over buffer. The whole exchange is bounded by the
    /// connection's deadline; a node that blows it is treated as failed
    /// and the call returns [`Error::NoNode`].
    pub async fn request_node(&mut self, requests: &[Request]) -> Result<Vec<Frame>, Error> {
        let deadline = self.deadline;
        match timeout(deadline, self.exchange(requests)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    node = %self.node_id,
                    deadline_ms = deadline.as_millis() as u64,
                    "node exchange exceeded deadline"
                );
                Err(Error::NoNode)
            }
        }
    }

    async fn exchange(&mut self, requests: &[Request]) -> Result<Vec<Frame>, Error> {
        self.write_buf.clear();
        for request in requests {
            clean_request(request).serialize(&mut self.write_buf);
        }
        self.transport.write_all(&self.write_buf).await?;
        self.transport.flush().await?;

        let mut replies = Vec::with_capacity(requests.len());
        for _ in 0..requests.len() {
            replies.push(self.read_frame().await?);
        }
        Ok(replies)
    }

    /// Reads one complete frame, pulling more bytes from the transport as
    /// needed. The unconsumed tail stays in `read_buf` for the next call.
    async fn read_frame(&mut self) -> Result<Frame, Error> {
        loop {
            if !self.read_buf.is_empty() {
                match parse_frame(&self.read_buf) {
                    Ok(Some((frame, consumed))) => {
                        let _ = self.read_buf.split_to(consumed);
                        return Ok(frame);
                    }
                    Ok(None) => {
                        // incomplete — need more data
                    }
                    Err(e) => {
                        debug!(node = %self.node_id, error = %e, "frame parse failed");
                        return Err(Error::ConnectionClosed);
                    }
                }
            }

            let n = self.transport.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
        }
    }
}

/// Strips the routing pin from MULTI/EXEC before the request goes on the
/// wire. The extra token exists only so the router can slot a transaction;
/// the server expects the bare command.
pub(crate) fn clean_request(request: &Request) -> Request {
    match request.name().as_str() {
        "multi" | "exec" if request.token_count() > 1 => request.name_only(),
        _ => request.clone(),
    }
}
