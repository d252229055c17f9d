//! Sessions talking through a `LocalEngine` via the client API.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use ipbus_core::{BusEngine, Resource, join, join_with_config};
use ipbus_types::config::{BusConfig, ReceiverConfig};
use ipbus_types::error::{JoinError, RecvError};
use ipbus_types::{BytesMessage, LabelOp, Object, Options, Selector, labels};

use crate::LocalEngine;

fn engine() -> Arc<dyn BusEngine> {
    Arc::new(LocalEngine::default())
}

fn fast_poll() -> BusConfig {
    BusConfig {
        receiver: ReceiverConfig {
            poll_interval_ms: 50,
        },
        ..BusConfig::default()
    }
}

#[tokio::test]
async fn unicast_message_reaches_matching_session() {
    let engine = engine();
    let a = join(engine.clone(), Options::new("solar.com", labels!("cc"), ""), None)
        .await
        .unwrap();
    let b = join(engine.clone(), Options::new("solar.com", labels!("dd"), ""), None)
        .await
        .unwrap();

    b.sender()
        .send(
            Selector::unicast(LabelOp::literal("cc")),
            BytesMessage::new(7, b"hello".to_vec()),
            vec![Resource::Object(Object::from_raw(11))],
        )
        .unwrap();

    let message = a.receiver().recv(None).await.unwrap();
    assert_eq!(message.payload.format, 7);
    assert_eq!(message.payload.data, b"hello");
    assert_eq!(message.objects[0].value(), 11);
    assert!(b.receiver().try_recv().unwrap().is_none());
}

#[tokio::test]
async fn attached_buffer_arrives_as_region() {
    let engine = engine();
    let a = join(engine.clone(), Options::new("solar.com", labels!("cc"), ""), None)
        .await
        .unwrap();
    let payload: Vec<u8> = (0..16).collect();

    a.sender()
        .send(
            Selector::unicast("cc"),
            BytesMessage::new(1, Vec::new()),
            vec![Resource::Buffer(payload)],
        )
        .unwrap();

    let message = a.receiver().recv(Some(Duration::from_secs(1))).await.unwrap();
    let region = &message.memory_regions[0];
    assert_eq!(region.map_sized(0, -1).unwrap().len(), 16);
    assert_eq!(&*region.map_sized(4, 4).unwrap(), &[4, 5, 6, 7]);
}

#[tokio::test]
async fn try_recv_then_recv_delivers_each_message_once() {
    let engine = engine();
    let session = join(engine, Options::new("solar.com", labels!("cc"), ""), None)
        .await
        .unwrap();
    let (tx, rx) = session.split();

    for format in [1, 2] {
        tx.send(Selector::unicast("cc"), BytesMessage::new(format, vec![]), vec![])
            .unwrap();
    }

    assert_eq!(rx.try_recv().unwrap().unwrap().payload.format, 1);
    assert_eq!(rx.recv(None).await.unwrap().payload.format, 2);
    assert_eq!(
        rx.recv(Some(Duration::from_millis(50))).await.unwrap_err(),
        RecvError::TimedOut
    );
}

#[tokio::test]
async fn close_resolves_pending_recv_within_a_poll_interval() {
    let engine = engine();
    let session = join_with_config(
        engine,
        Options::new("solar.com", labels!("cc"), ""),
        None,
        &fast_poll(),
    )
    .await
    .unwrap();
    let (_tx, rx) = session.split();
    let handle = rx.close_handle();

    let pending = tokio::spawn(async move { rx.recv(None).await });
    tokio::time::sleep(Duration::from_millis(120)).await;

    let start = Instant::now();
    handle.close();
    let result = pending.await.unwrap();

    assert_eq!(result.unwrap_err(), RecvError::Closed);
    assert!(start.elapsed() <= Duration::from_millis(500));
}

#[tokio::test]
async fn ttl_message_waits_for_late_joiner() {
    let engine = engine();
    let early = join(engine.clone(), Options::new("solar.com", labels!("early"), ""), None)
        .await
        .unwrap();

    early
        .sender()
        .send(
            Selector::multicast("late").with_ttl(5_000),
            BytesMessage::new(3, b"held".to_vec()),
            vec![],
        )
        .unwrap();

    let late = join(engine, Options::new("solar.com", labels!("late"), ""), None)
        .await
        .unwrap();
    let message = late.receiver().recv(Some(Duration::from_secs(1))).await.unwrap();
    assert_eq!(message.payload.data, b"held");
}

#[tokio::test]
async fn join_reports_token_mismatch() {
    let engine = engine();
    let _controller = join(engine.clone(), Options::new("solar.com", labels!("a"), "secret"), None)
        .await
        .unwrap();

    let err = join(engine, Options::new("solar.com", labels!("b"), "guess"), None)
        .await
        .unwrap_err();
    assert_eq!(err, JoinError::TokenMismatch);
}

#[tokio::test]
async fn stream_yields_until_closed() {
    let engine = engine();
    let session = join_with_config(
        engine,
        Options::new("solar.com", labels!("cc"), ""),
        None,
        &fast_poll(),
    )
    .await
    .unwrap();
    let (tx, rx) = session.split();
    let handle = rx.close_handle();

    for format in 0..3 {
        tx.send(Selector::unicast("cc"), BytesMessage::new(format, vec![]), vec![])
            .unwrap();
    }

    let mut stream = Box::pin(rx.into_stream());
    let mut formats = Vec::new();
    while formats.len() < 3 {
        formats.push(stream.next().await.unwrap().unwrap().payload.format);
    }
    handle.close();

    assert_eq!(formats, vec![0, 1, 2]);
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn dropped_sessions_are_forgotten_by_the_engine() {
    let local = Arc::new(LocalEngine::default());
    let engine: Arc<dyn BusEngine> = local.clone();
    let _controller = join(engine.clone(), Options::new("solar.com", labels!("a"), ""), None)
        .await
        .unwrap();

    for _ in 0..200 {
        let session = join(engine.clone(), Options::new("solar.com", labels!("b"), ""), None)
            .await
            .unwrap();
        drop(session);
    }
    assert_eq!(local.session_count(), 1);

    // A receiver closed early keeps its sender usable until the sender drops.
    let (tx, rx) = join(engine, Options::new("solar.com", labels!("c"), ""), None)
        .await
        .unwrap()
        .split();
    drop(rx);
    tx.send(Selector::unicast("a"), BytesMessage::new(1, vec![]), vec![])
        .unwrap();
    assert_eq!(local.session_count(), 2);
    drop(tx);
    assert_eq!(local.session_count(), 1);
}
