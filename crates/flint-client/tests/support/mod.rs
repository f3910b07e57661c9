//! In-process mock cluster node for integration tests.
//!
//! Listens on a loopback port, parses incoming command arrays, logs them,
//! and answers through a scripted handler. Handlers get the token list and
//! a node-wide arrival counter, which makes reply ordering observable.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use flint_client::{Frame, Node, NodeId, Role};
use flint_protocol::parse_frame;

/// Scripted reply logic: `(request tokens, arrival index) -> reply`.
pub type Handler = Arc<dyn Fn(&[String], usize) -> Frame + Send + Sync>;

/// A running mock node.
pub struct MockNode {
    pub host: String,
    pub port: u16,
    /// Every request the node parsed, in arrival order.
    log: Arc<Mutex<Vec<Vec<String>>>>,
    arrivals: Arc<AtomicUsize>,
}

impl MockNode {
    /// Requests seen so far, as token lists.
    pub fn requests(&self) -> Vec<Vec<String>> {
        self.log.lock().unwrap().clone()
    }

    /// Number of requests seen so far.
    pub fn request_count(&self) -> usize {
        self.arrivals.load(Ordering::SeqCst)
    }

    /// A [`Node`] record pointing at this mock.
    pub fn node(&self, id: &str, role: Role) -> Node {
        Node {
            id: NodeId::new(id),
            role,
            host: self.host.clone(),
            port: self.port,
        }
    }
}

/// Starts a mock node with the given handler.
pub async fn spawn_node(handler: Handler) -> MockNode {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let log: Arc<Mutex<Vec<Vec<String>>>> = Arc::new(Mutex::new(Vec::new()));
    let arrivals = Arc::new(AtomicUsize::new(0));

    {
        let log = Arc::clone(&log);
        let arrivals = Arc::clone(&arrivals);
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let handler = Arc::clone(&handler);
                let log = Arc::clone(&log);
                let arrivals = Arc::clone(&arrivals);
                tokio::spawn(async move {
                    let mut buf = BytesMut::with_capacity(4096);
                    loop {
                        // drain every complete request currently buffered
                        loop {
                            match parse_frame(&buf) {
                                Ok(Some((frame, consumed))) => {
                                    let _ = buf.split_to(consumed);
                                    let tokens = tokens_of(&frame);
                                    log.lock().unwrap().push(tokens.clone());
                                    let n = arrivals.fetch_add(1, Ordering::SeqCst);
                                    let reply = handler(&tokens, n);
                                    let mut out = BytesMut::new();
                                    reply.serialize(&mut out);
                                    if stream.write_all(&out).await.is_err() {
                                        return;
                                    }
                                }
                                Ok(None) => break,
                                Err(_) => return,
                            }
                        }
                        match stream.read_buf(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(_) => {}
                        }
                    }
                });
            }
        });
    }

    MockNode {
        host: "127.0.0.1".into(),
        port,
        log,
        arrivals,
    }
}

/// Flattens a request frame (array of bulk strings) into lossy strings.
fn tokens_of(frame: &Frame) -> Vec<String> {
    match frame {
        Frame::Array(items) => items
            .iter()
            .map(|item| match item {
                Frame::Bulk(data) => String::from_utf8_lossy(data).into_owned(),
                Frame::Simple(s) => s.clone(),
                other => format!("{other:?}"),
            })
            .collect(),
        other => vec![format!("{other:?}")],
    }
}
