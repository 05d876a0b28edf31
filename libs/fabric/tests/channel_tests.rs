use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use courier_core::{Configuration, Format, Metadata, Persistence, Uri};
use courier_fabric::provider::{self, ChannelProvider, MemProvider, TcpProvider, UnixProvider};
use courier_fabric::transport::MemHub;
use courier_fabric::{BytesMessage, Channel, ChannelState, Error, Message, MessagePipeline, WorkerPool};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Reading {
    sensor: String,
    value: i64,
}

impl Message for Reading {}

fn mem_channel<M: Message>(hub: &MemHub, pool: &WorkerPool, uri: &str, format: Format) -> Arc<Channel<M>> {
    let uri = Uri::parse(uri).unwrap();
    let transport = hub.transport(uri.as_str(), 16);
    Arc::new(Channel::new(
        uri,
        Box::new(transport),
        MessagePipeline::new(format).unwrap(),
        Persistence::BestEffort,
        vec![Metadata::tag("test", "channel")],
        pool.clone(),
    ))
}

#[test]
fn channel_lifecycle_unopened_open_closed() {
    let pool = WorkerPool::new(1).unwrap();
    let hub = MemHub::new();
    let channel: Arc<Channel<Reading>> = mem_channel(&hub, &pool, "mem://life", Format::Json);

    assert_eq!(channel.state(), ChannelState::Unopened);
    pool.block_on(channel.open()).unwrap().unwrap();
    assert_eq!(channel.state(), ChannelState::Open);
    assert!(channel.is_open());

    pool.block_on(channel.close()).unwrap().unwrap();
    assert_eq!(channel.state(), ChannelState::Closed);
    assert!(matches!(
        pool.block_on(channel.open()).unwrap(),
        Err(Error::ConnectionClosed)
    ));
    pool.shutdown_now();
}

#[test]
fn typed_messages_cross_a_mem_topic() {
    let pool = WorkerPool::new(2).unwrap();
    let hub = MemHub::new();
    let left: Arc<Channel<Reading>> = mem_channel(&hub, &pool, "mem://readings", Format::Bincode);
    let right: Arc<Channel<Reading>> = mem_channel(&hub, &pool, "mem://readings", Format::Bincode);
    pool.block_on(async {
        left.open().await.unwrap();
        right.open().await.unwrap();
    })
    .unwrap();

    let reading = Reading {
        sensor: "t1".into(),
        value: 21,
    };
    let received = pool
        .block_on(async {
            left.send(&reading).await.unwrap();
            right.receive().await
        })
        .unwrap()
        .unwrap();
    assert_eq!(received, reading);
    assert_eq!(right.format(), Format::Bincode);
    assert_eq!(right.metadata().len(), 1);
    pool.shutdown_now();
}

#[test]
fn send_on_unopened_channel_fails() {
    let pool = WorkerPool::new(1).unwrap();
    let hub = MemHub::new();
    let channel: Arc<Channel<BytesMessage>> = mem_channel(&hub, &pool, "mem://early", Format::Bytes);
    let result = pool
        .block_on(channel.send(&BytesMessage::new(b"x".to_vec())))
        .unwrap();
    assert!(matches!(result, Err(Error::NotOpen(_))));
    pool.shutdown_now();
}

#[test]
fn subscribe_delivers_until_cancelled() {
    let pool = WorkerPool::new(2).unwrap();
    let hub = MemHub::new();
    let publisher: Arc<Channel<BytesMessage>> = mem_channel(&hub, &pool, "mem://sub", Format::Bytes);
    let subscriber: Arc<Channel<BytesMessage>> = mem_channel(&hub, &pool, "mem://sub", Format::Bytes);
    pool.block_on(async {
        publisher.open().await.unwrap();
        subscriber.open().await.unwrap();
    })
    .unwrap();

    let (tx, rx) = mpsc::channel();
    let subscription = subscriber
        .subscribe(move |message| {
            let _ = tx.send(message.map(BytesMessage::into_inner));
        })
        .unwrap();
    assert!(subscription.is_active());

    let (done_tx, done_rx) = mpsc::channel();
    publisher.publish(BytesMessage::new(b"one".to_vec()), move |result| {
        let _ = done_tx.send(result.is_ok());
    });
    assert!(done_rx.recv_timeout(Duration::from_secs(2)).unwrap());

    let got = rx.recv_timeout(Duration::from_secs(2)).unwrap().unwrap();
    assert_eq!(got, b"one");

    subscription.cancel();
    pool.shutdown_now();
}

#[test]
fn subscription_reports_close_and_stops() {
    let pool = WorkerPool::new(2).unwrap();
    let hub = MemHub::new();
    let channel: Arc<Channel<BytesMessage>> = mem_channel(&hub, &pool, "mem://closing", Format::Bytes);
    pool.block_on(channel.open()).unwrap().unwrap();

    let (tx, rx) = mpsc::channel();
    let _subscription = channel
        .subscribe(move |message| {
            let _ = tx.send(message.is_err());
        })
        .unwrap();

    std::thread::sleep(Duration::from_millis(50));
    pool.block_on(channel.close()).unwrap().unwrap();

    assert!(rx.recv_timeout(Duration::from_secs(2)).unwrap());
    pool.shutdown_now();
}

#[test]
fn publish_after_pool_shutdown_reports_failure() {
    let pool = WorkerPool::new(1).unwrap();
    let hub = MemHub::new();
    let channel: Arc<Channel<BytesMessage>> = mem_channel(&hub, &pool, "mem://late", Format::Bytes);
    pool.shutdown_now();

    let (tx, rx) = mpsc::channel();
    channel.publish(BytesMessage::default(), move |result| {
        let _ = tx.send(matches!(result, Err(Error::PoolShutdown)));
    });
    assert!(rx.recv_timeout(Duration::from_secs(1)).unwrap());
}

#[test]
fn providers_refuse_to_build_before_start() {
    let uri = Uri::parse("mem://x").unwrap();
    let mem = MemProvider::new();
    assert!(mem
        .build(&uri, Format::Bytes, Persistence::BestEffort, &[])
        .is_err());
}

#[test]
fn providers_build_unopened_transports_after_start() {
    let pool = WorkerPool::new(1).unwrap();
    let settings = Configuration::default().skip_env_vars().load().unwrap();

    let tcp = TcpProvider::new();
    tcp.start(pool.clone(), &settings);
    let transport = tcp
        .build(
            &Uri::parse("tcp://127.0.0.1:7000").unwrap(),
            Format::Json,
            Persistence::BestEffort,
            &[],
        )
        .unwrap();
    assert!(!transport.is_open());

    // no port
    assert!(tcp
        .build(&Uri::parse("tcp://localhost").unwrap(), Format::Json, Persistence::BestEffort, &[])
        .is_err());

    let unix = UnixProvider::new();
    unix.start(pool.clone(), &settings);
    assert!(unix
        .build(&Uri::parse("unix:///tmp/x.sock").unwrap(), Format::Json, Persistence::BestEffort, &[])
        .is_ok());

    tcp.stop();
    assert!(tcp
        .build(&Uri::parse("tcp://127.0.0.1:7000").unwrap(), Format::Json, Persistence::BestEffort, &[])
        .is_err());
    pool.shutdown_now();
}

#[test]
fn builtin_factories_cover_known_schemes() {
    let schemes: Vec<String> = provider::builtin()
        .iter()
        .map(|make| make().scheme().to_string())
        .collect();
    assert_eq!(schemes, vec!["mem", "tcp", "unix"]);
}
