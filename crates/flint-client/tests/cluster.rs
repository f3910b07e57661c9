//! Cluster behavior against scripted mock nodes: cross-slot rejection,
//! MOVED and ASK recovery, and master fan-out.

mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;

use flint_client::{
    refresher_fn, tcp_connector, ClientConfig, CommandSpec, Connection, Error, Frame, InfoMap,
    KeySpec, Refresher, Request, Role, Shard, ShardMap,
};
use support::spawn_node;

fn counting_refresher(map: ShardMap, count: Arc<AtomicUsize>) -> Refresher {
    refresher_fn(move |_nc| {
        count.fetch_add(1, Ordering::SeqCst);
        let map = map.clone();
        Box::pin(async move { Ok(map) })
    })
}

async fn connect(map: ShardMap, refresher: Refresher) -> Connection {
    Connection::connect(
        tcp_connector(),
        InfoMap::with_defaults(),
        map,
        ClientConfig::default(),
        refresher,
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn cross_slot_keys_fail_on_force() {
    let a = spawn_node(Arc::new(|_, _| Frame::Simple("OK".into()))).await;
    let b = spawn_node(Arc::new(|_, _| Frame::Simple("OK".into()))).await;

    // "a" → slot 15495 (upper half), "b" → slot 3300 (lower half)
    let map = ShardMap::from_ranges(vec![
        (0, 8191, Shard::new(a.node("m1", Role::Master), vec![])),
        (8192, 16383, Shard::new(b.node("m2", Role::Master), vec![])),
    ])
    .unwrap();

    let mut info = InfoMap::with_defaults();
    info.extend(vec![CommandSpec::new(
        "mset",
        KeySpec::Positions(vec![1, 3]),
        false,
    )]);

    let refreshes = Arc::new(AtomicUsize::new(0));
    let conn = Connection::connect(
        tcp_connector(),
        info,
        map.clone(),
        ClientConfig::default(),
        counting_refresher(map, Arc::clone(&refreshes)),
    )
    .await
    .unwrap();

    let handle = conn
        .request_pipelined(Request::cmd("MSET").arg("a").arg("1").arg("b").arg("2"))
        .await
        .unwrap();
    assert!(matches!(handle.force().await, Err(Error::CrossSlot)));

    // the batch stayed pending: forcing again re-evaluates and fails the
    // same way, and nothing ever reached a node
    assert!(matches!(handle.force().await, Err(Error::CrossSlot)));
    assert_eq!(a.request_count(), 0);
    assert_eq!(b.request_count(), 0);
}

#[tokio::test]
async fn moved_reply_refreshes_and_redispatches() {
    let a = spawn_node(Arc::new(|tokens, _| match tokens[0].as_str() {
        "GET" => Frame::Error("MOVED 7000 10.0.0.2:6379".into()),
        _ => Frame::Simple("OK".into()),
    }))
    .await;
    let b = spawn_node(Arc::new(|tokens, _| match tokens[0].as_str() {
        "GET" => Frame::Bulk(Bytes::from_static(b"42")),
        _ => Frame::Simple("OK".into()),
    }))
    .await;

    let before = ShardMap::single(Shard::new(a.node("m1", Role::Master), vec![]));
    let after = ShardMap::single(Shard::new(b.node("m2", Role::Master), vec![]));

    let refreshes = Arc::new(AtomicUsize::new(0));
    let conn = connect(before, counting_refresher(after, Arc::clone(&refreshes))).await;

    let handle = conn
        .request_pipelined(Request::cmd("GET").arg("x"))
        .await
        .unwrap();
    assert_eq!(
        handle.force().await.unwrap(),
        Frame::Bulk(Bytes::from_static(b"42"))
    );

    // one refresh, then a single-request re-dispatch to the new owner
    assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(a.requests(), vec![vec!["GET".to_string(), "x".to_string()]]);
    assert_eq!(b.requests(), vec![vec!["GET".to_string(), "x".to_string()]]);
}

#[tokio::test]
async fn ask_reply_runs_asking_pipeline_on_target() {
    let b = spawn_node(Arc::new(|tokens, _| match tokens[0].as_str() {
        "ASKING" => Frame::Simple("OK".into()),
        "GET" => Frame::Bulk(Bytes::from_static(b"v2")),
        _ => Frame::Simple("OK".into()),
    }))
    .await;

    let ask_target = format!("ASK 7000 127.0.0.1:{}", b.port);
    let a = spawn_node(Arc::new(move |tokens, _| match tokens[0].as_str() {
        "GET" => Frame::Error(ask_target.clone()),
        _ => Frame::Simple("OK".into()),
    }))
    .await;

    // the ASK target is already in the map (as a replica), so no refresh
    let map = ShardMap::single(Shard::new(
        a.node("m1", Role::Master),
        vec![b.node("r1", Role::Replica)],
    ));
    let refreshes = Arc::new(AtomicUsize::new(0));
    let conn = connect(map.clone(), counting_refresher(map, Arc::clone(&refreshes))).await;

    let handle = conn
        .request_pipelined(Request::cmd("GET").arg("x"))
        .await
        .unwrap();
    assert_eq!(
        handle.force().await.unwrap(),
        Frame::Bulk(Bytes::from_static(b"v2"))
    );

    assert_eq!(refreshes.load(Ordering::SeqCst), 0);
    assert_eq!(
        b.requests(),
        vec![
            vec!["ASKING".to_string()],
            vec!["GET".to_string(), "x".to_string()],
        ]
    );
}

#[tokio::test]
async fn unknown_ask_target_is_rescued_by_one_refresh() {
    let b = spawn_node(Arc::new(|tokens, _| match tokens[0].as_str() {
        "ASKING" => Frame::Simple("OK".into()),
        "GET" => Frame::Bulk(Bytes::from_static(b"rescued")),
        _ => Frame::Simple("OK".into()),
    }))
    .await;

    let ask_target = format!("ASK 7000 127.0.0.1:{}", b.port);
    let a = spawn_node(Arc::new(move |tokens, _| match tokens[0].as_str() {
        "GET" => Frame::Error(ask_target.clone()),
        _ => Frame::Simple("OK".into()),
    }))
    .await;

    // seed map doesn't know the ASK target; the refreshed map does
    let before = ShardMap::single(Shard::new(a.node("m1", Role::Master), vec![]));
    let after = ShardMap::single(Shard::new(
        a.node("m1", Role::Master),
        vec![b.node("r1", Role::Replica)],
    ));

    let refreshes = Arc::new(AtomicUsize::new(0));
    let conn = connect(before, counting_refresher(after, Arc::clone(&refreshes))).await;

    let handle = conn
        .request_pipelined(Request::cmd("GET").arg("x"))
        .await
        .unwrap();
    assert_eq!(
        handle.force().await.unwrap(),
        Frame::Bulk(Bytes::from_static(b"rescued"))
    );
    assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(b.request_count(), 2);
}

#[tokio::test]
async fn ask_target_missing_after_refresh_is_missing_node() {
    let a = spawn_node(Arc::new(|tokens, _| match tokens[0].as_str() {
        "GET" => Frame::Error("ASK 7000 127.0.0.1:1".into()),
        _ => Frame::Simple("OK".into()),
    }))
    .await;

    // neither the seed map nor the refreshed one knows 127.0.0.1:1
    let map = ShardMap::single(Shard::new(a.node("m1", Role::Master), vec![]));
    let refreshes = Arc::new(AtomicUsize::new(0));
    let conn = connect(map.clone(), counting_refresher(map, Arc::clone(&refreshes))).await;

    let handle = conn
        .request_pipelined(Request::cmd("GET").arg("x"))
        .await
        .unwrap();
    assert!(matches!(handle.force().await, Err(Error::MissingNode)));
    assert_eq!(refreshes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn malformed_ask_payload_passes_through_unchanged() {
    let a = spawn_node(Arc::new(|tokens, _| match tokens[0].as_str() {
        "GET" => Frame::Error("ASK 7000 nonsense".into()),
        _ => Frame::Simple("OK".into()),
    }))
    .await;

    let map = ShardMap::single(Shard::new(a.node("m1", Role::Master), vec![]));
    let refreshes = Arc::new(AtomicUsize::new(0));
    let conn = connect(map.clone(), counting_refresher(map, Arc::clone(&refreshes))).await;

    let handle = conn
        .request_pipelined(Request::cmd("GET").arg("x"))
        .await
        .unwrap();
    assert_eq!(
        handle.force().await.unwrap(),
        Frame::Error("ASK 7000 nonsense".into())
    );
    assert_eq!(refreshes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn requests_for_different_shards_batch_per_node() {
    let a = spawn_node(Arc::new(|_, n| Frame::Integer(n as i64))).await;
    let b = spawn_node(Arc::new(|_, n| Frame::Integer(100 + n as i64))).await;

    let map = ShardMap::from_ranges(vec![
        (0, 8191, Shard::new(a.node("m1", Role::Master), vec![])),
        (8192, 16383, Shard::new(b.node("m2", Role::Master), vec![])),
    ])
    .unwrap();
    let refreshes = Arc::new(AtomicUsize::new(0));
    let conn = connect(map.clone(), counting_refresher(map, Arc::clone(&refreshes))).await;

    // "b" → m1, "a" → m2, "foo" → m2 (slot 12182)
    let h1 = conn
        .request_pipelined(Request::cmd("GET").arg("b"))
        .await
        .unwrap();
    let h2 = conn
        .request_pipelined(Request::cmd("GET").arg("a"))
        .await
        .unwrap();
    let h3 = conn
        .request_pipelined(Request::cmd("GET").arg("foo"))
        .await
        .unwrap();

    let r1 = h1.force().await.unwrap();
    let r2 = h2.force().await.unwrap();
    let r3 = h3.force().await.unwrap();

    assert_eq!(r1, Frame::Integer(0));
    assert_eq!(r2, Frame::Integer(100));
    assert_eq!(r3, Frame::Integer(101));

    assert_eq!(a.requests(), vec![vec!["GET".to_string(), "b".to_string()]]);
    assert_eq!(
        b.requests(),
        vec![
            vec!["GET".to_string(), "a".to_string()],
            vec!["GET".to_string(), "foo".to_string()],
        ]
    );
}

#[tokio::test]
async fn master_fan_out_concatenates_replies() {
    let a = spawn_node(Arc::new(|_, _| Frame::Simple("PONG".into()))).await;
    let b = spawn_node(Arc::new(|_, _| Frame::Simple("PONG".into()))).await;

    let map = ShardMap::from_ranges(vec![
        (0, 8191, Shard::new(a.node("m1", Role::Master), vec![])),
        (8192, 16383, Shard::new(b.node("m2", Role::Master), vec![])),
    ])
    .unwrap();
    let refreshes = Arc::new(AtomicUsize::new(0));
    let conn = connect(map.clone(), counting_refresher(map, Arc::clone(&refreshes))).await;

    let replies = conn
        .request_master_nodes(&Request::cmd("PING"))
        .await
        .unwrap();
    assert_eq!(replies.len(), 2);
    assert!(replies.iter().all(|r| *r == Frame::Simple("PONG".into())));
    assert_eq!(a.requests(), vec![vec!["PING".to_string()]]);
    assert_eq!(b.requests(), vec![vec!["PING".to_string()]]);
}

#[tokio::test]
async fn connect_fails_with_no_reachable_node() {
    // port 1 on loopback refuses connections
    let unreachable = flint_client::Node {
        id: flint_client::NodeId::new("gone"),
        role: Role::Master,
        host: "127.0.0.1".into(),
        port: 1,
    };
    let map = ShardMap::single(Shard::new(unreachable, vec![]));
    let refreshes = Arc::new(AtomicUsize::new(0));

    let result = Connection::connect(
        tcp_connector(),
        InfoMap::with_defaults(),
        map.clone(),
        ClientConfig::default(),
        counting_refresher(map, Arc::clone(&refreshes)),
    )
    .await;
    assert!(matches!(result, Err(Error::NoNode)));
    assert_eq!(refreshes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn partially_reachable_seed_map_triggers_refresh() {
    let a = spawn_node(Arc::new(|_, _| Frame::Simple("OK".into()))).await;

    let unreachable = flint_client::Node {
        id: flint_client::NodeId::new("gone"),
        role: Role::Master,
        host: "127.0.0.1".into(),
        port: 1,
    };
    let seed = ShardMap::from_ranges(vec![
        (0, 8191, Shard::new(a.node("m1", Role::Master), vec![])),
        (8192, 16383, Shard::new(unreachable, vec![])),
    ])
    .unwrap();
    // the refreshed truth: m1 owns everything
    let truth = ShardMap::single(Shard::new(a.node("m1", Role::Master), vec![]));

    let refreshes = Arc::new(AtomicUsize::new(0));
    let conn = Connection::connect(
        tcp_connector(),
        InfoMap::with_defaults(),
        seed,
        ClientConfig::default(),
        counting_refresher(truth, Arc::clone(&refreshes)),
    )
    .await
    .unwrap();

    assert_eq!(refreshes.load(Ordering::SeqCst), 1);

    // the whole keyspace now routes to m1
    let handle = conn
        .request_pipelined(Request::cmd("GET").arg("a"))
        .await
        .unwrap();
    assert_eq!(handle.force().await.unwrap(), Frame::Simple("OK".into()));
}
