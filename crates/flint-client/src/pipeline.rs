//! Implicit pipelining.
//!
//! Submissions are buffered per connection and coalesced into per-node
//! batches that are flushed lazily: the first caller to inspect a reply
//! evaluates the whole pending batch, and everyone else reads from the
//! finished reply vector. A submission-time index ties each caller to its
//! own reply even though batching reorders requests across nodes.
//!
//! Two locks cooperate here. The connection's outer cell guards which
//! pipeline generation is current and is held only for constant-time
//! transitions (plus the in-line flush when the buffer is full). Each
//! generation's inner cell guards its `Pending` → `Executed` transition;
//! evaluation runs while holding it, which serializes flushes and makes
//! "at most one evaluation per pending batch" automatic.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::timeout;
use tracing::{debug, error, warn};

use flint_cluster::{NodeId, Redirect};
use flint_protocol::{Frame, Request};

use crate::connection::Core;
use crate::error::Error;
use crate::node::NodeConnection;
use crate::router::route;

/// How long a lock acquisition may stall before the holder is presumed
/// dead. Generous compared to the node deadline, so it only fires on a
/// genuinely wedged holder, not on a slow flush.
const LOCK_STALL_WINDOW: Duration = Duration::from_secs(30);

/// Acquires a pipeline lock, logging and raising if the holder never
/// releases it.
pub(crate) async fn guarded_lock<'a, T>(
    site: &'static str,
    lock: &'a Mutex<T>,
) -> Result<MutexGuard<'a, T>, Error> {
    match timeout(LOCK_STALL_WINDOW, lock.lock()).await {
        Ok(guard) => Ok(guard),
        Err(_) => {
            error!(site, "lock acquisition stalled; holder presumed dead");
            Err(Error::LockStalled(site))
        }
    }
}

/// One pipeline generation.
///
/// `Pending` buffers requests in submission order; `Executed` holds the
/// finished reply vector, oldest first. Once `Executed`, a generation
/// never goes back — late forcers just read their slot.
pub(crate) enum PipelineState {
    Pending(Vec<Request>),
    Executed(Arc<Vec<Frame>>),
}

/// Shared handle to one generation's state.
pub(crate) type StateCell = Arc<Mutex<PipelineState>>;

/// A routed request paired with its submission index so per-node batching
/// can reorder freely and assembly can sort back to submission order.
struct CompletedRequest {
    index: usize,
    request: Request,
    reply: Frame,
}

/// A reply that has not necessarily been produced yet.
///
/// Forcing is idempotent and safe from any task: the first force runs the
/// batch (performing I/O and possibly raising), every later force observes
/// the executed state and returns its own slot. Handles can be passed
/// between tasks freely.
pub struct DeferredReply {
    core: Arc<Core>,
    cell: StateCell,
    index: usize,
}

impl DeferredReply {
    /// Produces this submission's reply, flushing the batch that contains
    /// it if nobody has yet.
    ///
    /// Server error replies (other than handled redirections) come back as
    /// [`Frame::Error`] values. Routing and transport failures raise.
    pub async fn force(&self) -> Result<Frame, Error> {
        let mut state = guarded_lock("pipeline.state", &self.cell).await?;

        let replies = match &*state {
            PipelineState::Executed(replies) => Arc::clone(replies),
            PipelineState::Pending(requests) => {
                let requests = requests.clone();
                // evaluation failure leaves the batch pending: a later
                // force retries it from scratch
                let replies = Arc::new(self.core.evaluate(requests).await?);
                *state = PipelineState::Executed(Arc::clone(&replies));
                replies
            }
        };

        replies
            .get(self.index)
            .cloned()
            .ok_or(Error::ConnectionClosed)
    }

    /// The submission index of this reply within its pipeline generation.
    pub fn index(&self) -> usize {
        self.index
    }
}

impl Core {
    /// Buffers one request and returns the deferred handle to its reply.
    ///
    /// When the pending buffer has reached the flush threshold the batch
    /// is evaluated in-line (this request included) so the buffer cannot
    /// grow without bound; the returned handle then reads from the already
    /// executed generation.
    pub(crate) async fn submit(self: &Arc<Self>, request: Request) -> Result<DeferredReply, Error> {
        let mut current = guarded_lock("pipeline.cell", &self.pipeline).await?;
        let cell = Arc::clone(&*current);
        let mut state = guarded_lock("pipeline.state", &cell).await?;

        let (cell, index) = match &mut *state {
            PipelineState::Pending(pending)
                if pending.len() >= self.config.pipeline_flush_threshold =>
            {
                let mut requests = pending.clone();
                requests.push(request);
                let index = requests.len() - 1;
                debug!(buffered = index, "pipeline full, flushing in-line");
                // on failure the original pending batch stays intact and
                // this submission is not part of it
                let replies = Arc::new(self.evaluate(requests).await?);
                *state = PipelineState::Executed(replies);
                (Arc::clone(&cell), index)
            }
            PipelineState::Pending(pending) => {
                pending.push(request);
                (Arc::clone(&cell), pending.len() - 1)
            }
            PipelineState::Executed(_) => {
                // previous generation is finished: rotate in a fresh one
                let fresh: StateCell = Arc::new(Mutex::new(PipelineState::Pending(vec![request])));
                *current = Arc::clone(&fresh);
                (fresh, 0)
            }
        };

        Ok(DeferredReply {
            core: Arc::clone(self),
            cell,
            index,
        })
    }

    /// Runs a batch: route, group by node, dispatch, recover from
    /// redirections, and reassemble replies in submission order.
    pub(crate) async fn evaluate(self: &Arc<Self>, requests: Vec<Request>) -> Result<Vec<Frame>, Error> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        let map = self.snapshot().await;

        // group by target node, preserving relative order within each group
        let mut groups: Vec<(NodeId, Vec<(usize, Request)>)> = Vec::new();
        for (index, request) in requests.into_iter().enumerate() {
            let node_id = route(&map, &self.info, self.config.read_only, &request)?
                .id
                .clone();
            match groups.iter_mut().find(|(id, _)| *id == node_id) {
                Some((_, items)) => items.push((index, request)),
                None => groups.push((node_id, vec![(index, request)])),
            }
        }

        // distinct nodes proceed in parallel; each group is serialized on
        // its own connection
        let dispatches = groups.into_iter().map(|(node_id, items)| {
            let core = Arc::clone(self);
            async move { core.dispatch_group(node_id, items).await }
        });
        let mut completed = Vec::new();
        for result in join_all(dispatches).await {
            completed.extend(result?);
        }

        // any MOVED means the snapshot is stale; install a fresh map
        // before a single retry goes out
        if completed
            .iter()
            .any(|c| matches!(Redirect::parse(&c.reply), Some(Redirect::Moved)))
        {
            self.refresh_shard_map().await?;
        }

        let mut finished = Vec::with_capacity(completed.len());
        for item in completed {
            finished.push(self.retry_completed(item).await?);
        }

        finished.sort_by_key(|c| c.index);
        Ok(finished.into_iter().map(|c| c.reply).collect())
    }

    /// Sends one per-node group, falling back to an arbitrary other
    /// connection once if the node fails outright.
    async fn dispatch_group(
        &self,
        node_id: NodeId,
        items: Vec<(usize, Request)>,
    ) -> Result<Vec<CompletedRequest>, Error> {
        let requests: Vec<Request> = items.iter().map(|(_, r)| r.clone()).collect();

        let conn = self.conn_for(&node_id).await?;
        let replies = match self.request_on(&conn, &requests).await {
            Ok(replies) => replies,
            Err(first) => {
                warn!(node = %node_id, error = %first, "batch failed, retrying on an alternate node");
                let alternate = self.alternate_conn(&node_id).await.ok_or(Error::NoNode)?;
                match self.request_on(&alternate, &requests).await {
                    Ok(replies) => replies,
                    Err(second) => {
                        error!(node = %node_id, error = %second, "batch retry failed");
                        return Err(Error::NoNode);
                    }
                }
            }
        };

        Ok(items
            .into_iter()
            .zip(replies)
            .map(|((index, request), reply)| CompletedRequest {
                index,
                request,
                reply,
            })
            .collect())
    }

    /// Serialized exchange on one node connection.
    pub(crate) async fn request_on(
        &self,
        conn: &Arc<Mutex<NodeConnection>>,
        requests: &[Request],
    ) -> Result<Vec<Frame>, Error> {
        let mut nc = guarded_lock("node.connection", conn).await?;
        nc.request_node(requests).await
    }

    /// Applies redirect recovery to one completed request.
    ///
    /// Each original reply is inspected once. A MOVED re-routes against the
    /// (already refreshed) map and re-dispatches the single request; an ASK
    /// runs the `ASKING` mini-pipeline against the named node, refreshing
    /// the map once if that node is unknown. The reply of a re-dispatch is
    /// final — a MOVED earned by an ASK retry is an ordinary error for the
    /// next evaluation to deal with.
    async fn retry_completed(&self, completed: CompletedRequest) -> Result<CompletedRequest, Error> {
        let CompletedRequest {
            index,
            request,
            reply,
        } = completed;

        let mut refreshed_for_ask = false;
        loop {
            return match Redirect::parse(&reply) {
                Some(Redirect::Moved) => {
                    let map = self.snapshot().await;
                    let node_id = route(&map, &self.info, self.config.read_only, &request)?
                        .id
                        .clone();
                    debug!(node = %node_id, index, "re-dispatching after MOVED");
                    let conn = self.conn_for(&node_id).await?;
                    let mut replies = self.request_on(&conn, std::slice::from_ref(&request)).await?;
                    let reply = replies.pop().ok_or(Error::ConnectionClosed)?;
                    Ok(CompletedRequest {
                        index,
                        request,
                        reply,
                    })
                }
                Some(Redirect::Ask { slot, host, port }) => {
                    let map = self.snapshot().await;
                    match map.node_at(&host, port).map(|n| n.id.clone()) {
                        Some(node_id) => {
                            debug!(node = %node_id, slot, "following ASK redirect");
                            let conn = self.conn_for(&node_id).await?;
                            let batch = [Request::cmd("ASKING"), request.clone()];
                            let mut replies = self.request_on(&conn, &batch).await?;
                            // second reply answers the original request
                            let reply = replies.pop().ok_or(Error::ConnectionClosed)?;
                            Ok(CompletedRequest {
                                index,
                                request,
                                reply,
                            })
                        }
                        None if !refreshed_for_ask => {
                            debug!(host = %host, port, "ASK target unknown, refreshing topology");
                            self.refresh_shard_map().await?;
                            refreshed_for_ask = true;
                            continue;
                        }
                        None => {
                            warn!(host = %host, port, "ASK target still unknown after refresh");
                            Err(Error::MissingNode)
                        }
                    }
                }
                None => Ok(CompletedRequest {
                    index,
                    request,
                    reply,
                }),
            };
        }
    }
}
