use std::time::Duration;

use async_trait::async_trait;
use ethstats_protocol::{Block, Frame, Message, MessageType, NodeInfo, NodeStatus};
use ethstats_reporter::{
    ChainClient, Error, ProcessHealth, ReporterClient, ReporterOptions, Result, StaticProbe,
};
use ethstats_transport::{Connection, Listener, TransportError};
use ethstats_transport_memory::{MemoryListener, MemoryTransport};
use tokio::time::{Instant, timeout};
use tokio_util::sync::CancellationToken;
use url::Url;

const RELAY_URL: &str = "ws://relay.test/";

#[derive(Debug)]
struct FixedChain;

#[async_trait]
impl ChainClient for FixedChain {
    async fn peer_count(&self) -> Result<u64> {
        Ok(4)
    }

    async fn gas_price(&self) -> Result<u64> {
        Ok(1_000_000_000)
    }

    async fn syncing(&self) -> Result<bool> {
        Ok(false)
    }

    async fn latest_block(&self) -> Result<Block> {
        Ok(Block {
            number: 1234,
            hash: "0xbeef".to_string(),
            difficulty: 0,
            time: 1_700_000_000,
        })
    }

    async fn pending_transaction_count(&self) -> Result<u64> {
        Ok(3)
    }
}

/// Answers everything except the latest block.
#[derive(Debug)]
struct HeadlessChain;

#[async_trait]
impl ChainClient for HeadlessChain {
    async fn peer_count(&self) -> Result<u64> {
        FixedChain.peer_count().await
    }

    async fn gas_price(&self) -> Result<u64> {
        FixedChain.gas_price().await
    }

    async fn syncing(&self) -> Result<bool> {
        FixedChain.syncing().await
    }

    async fn latest_block(&self) -> Result<Block> {
        Err(Error::Rpc {
            code: -32000,
            message: "header not found".to_string(),
        })
    }

    async fn pending_transaction_count(&self) -> Result<u64> {
        FixedChain.pending_transaction_count().await
    }
}

type TestClient = ReporterClient<MemoryTransport, FixedChain, StaticProbe>;

fn client(chain_url: &str, health: ProcessHealth) -> (TestClient, MemoryListener) {
    let _ = tracing_subscriber::fmt::try_init();

    let transport = MemoryTransport::new();
    let server_url = Url::parse(RELAY_URL).unwrap();
    let listener = transport.listen(&server_url);

    let options = ReporterOptions::new(
        NodeInfo {
            id: "n1".to_string(),
            name: "n1".to_string(),
            ..NodeInfo::default()
        },
        "S".to_string(),
        server_url,
        Url::parse(chain_url).unwrap(),
    );

    let client =
        ReporterClient::new(options, transport, FixedChain, StaticProbe::new(health)).unwrap();
    (client, listener)
}

async fn accept(listener: &MemoryListener) -> Box<dyn Connection> {
    timeout(Duration::from_secs(60), listener.accept())
        .await
        .expect("reporter never connected")
        .unwrap()
}

async fn expect(relay: &dyn Connection) -> Message {
    let raw = timeout(Duration::from_secs(60), relay.recv())
        .await
        .expect("reporter went quiet")
        .unwrap();
    Frame::decode(&raw).unwrap().message().unwrap()
}

async fn reply(relay: &dyn Connection, message: Message) {
    relay.send(message.encode().unwrap()).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_ready_leads_to_stats() {
    let (client, listener) = client("http://10.0.0.5:8545", ProcessHealth::Healthy);
    let shutdown = CancellationToken::new();
    let run = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { client.run_once(&shutdown).await })
    };

    let relay = accept(&listener).await;
    match expect(relay.as_ref()).await {
        Message::Hello(hello) => {
            assert_eq!(hello.id, "n1");
            assert_eq!(hello.secret, "S");
        }
        other => panic!("expected hello, got {other:?}"),
    }
    reply(relay.as_ref(), Message::Ready).await;

    match expect(relay.as_ref()).await {
        Message::Stats(stats) => {
            assert!(stats.active);
            assert_eq!(stats.peer_count, 4);
            assert_eq!(stats.pending, 3);
            assert_eq!(stats.block.number, 1234);
            assert_eq!(stats.node_info.id, "n1");
        }
        other => panic!("expected stats, got {other:?}"),
    }

    shutdown.cancel();
    assert!(run.await.unwrap().is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_slow_ready_leads_to_latency() {
    let (client, listener) = client("http://10.0.0.5:8545", ProcessHealth::Unhealthy);
    let shutdown = CancellationToken::new();
    let run = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { client.run_once(&shutdown).await })
    };

    let relay = accept(&listener).await;
    assert_eq!(expect(relay.as_ref()).await.message_type(), MessageType::Hello);

    let started = Instant::now();
    let ping = match expect(relay.as_ref()).await {
        Message::NodePing(ping) => ping,
        other => panic!("expected node-ping, got {other:?}"),
    };
    assert!(started.elapsed() >= Duration::from_secs(2));
    assert_eq!(ping.id, "n1");
    // Remote chain endpoint, so the probe is not consulted
    assert_eq!(ping.node_status, NodeStatus::Running);

    tokio::time::advance(Duration::from_millis(250)).await;
    reply(relay.as_ref(), Message::NodePong("n1".to_string())).await;

    match expect(relay.as_ref()).await {
        Message::Latency(latency) => {
            assert_eq!(latency.id, "n1");
            let millis: u64 = latency.latency.parse().unwrap();
            assert!(millis >= 250);
        }
        other => panic!("expected latency, got {other:?}"),
    }

    shutdown.cancel();
    assert!(run.await.unwrap().is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_local_chain_reports_stopped_process() {
    let (client, listener) = client("http://127.0.0.1:8545", ProcessHealth::Unhealthy);
    let shutdown = CancellationToken::new();
    let _run = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { client.run_once(&shutdown).await })
    };

    let relay = accept(&listener).await;
    assert_eq!(expect(relay.as_ref()).await.message_type(), MessageType::Hello);

    match expect(relay.as_ref()).await {
        Message::NodePing(ping) => assert_eq!(ping.node_status, NodeStatus::Stopped),
        other => panic!("expected node-ping, got {other:?}"),
    }

    shutdown.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_pong_timeout_keeps_connection() {
    let (client, listener) = client("http://10.0.0.5:8545", ProcessHealth::Healthy);
    let shutdown = CancellationToken::new();
    let run = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { client.run_once(&shutdown).await })
    };

    let relay = accept(&listener).await;
    assert_eq!(expect(relay.as_ref()).await.message_type(), MessageType::Hello);
    assert_eq!(expect(relay.as_ref()).await.message_type(), MessageType::NodePing);

    // No pong: after the deadline the next tick logs in again on the same connection
    let started = Instant::now();
    assert_eq!(expect(relay.as_ref()).await.message_type(), MessageType::Hello);
    assert!(started.elapsed() >= Duration::from_secs(10));

    reply(relay.as_ref(), Message::Ready).await;
    assert_eq!(expect(relay.as_ref()).await.message_type(), MessageType::Stats);

    assert!(!run.is_finished());
    shutdown.cancel();
    assert!(run.await.unwrap().is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_unauthorized_ends_run() {
    let (client, listener) = client("http://10.0.0.5:8545", ProcessHealth::Healthy);
    let shutdown = CancellationToken::new();
    let run = tokio::spawn(async move { client.run_once(&shutdown).await });

    let relay = accept(&listener).await;
    assert_eq!(expect(relay.as_ref()).await.message_type(), MessageType::Hello);
    reply(
        relay.as_ref(),
        Message::Unauthorized("login secret error".to_string()),
    )
    .await;

    match run.await.unwrap() {
        Err(Error::Unauthorized(reason)) => assert_eq!(reason, "login secret error"),
        other => panic!("expected unauthorized, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_unexpected_frame_ends_run() {
    let (client, listener) = client("http://10.0.0.5:8545", ProcessHealth::Healthy);
    let shutdown = CancellationToken::new();
    let run = tokio::spawn(async move { client.run_once(&shutdown).await });

    let relay = accept(&listener).await;
    relay
        .send(bytes::Bytes::from_static(br#"{"emit":["history",[]]}"#))
        .await
        .unwrap();

    assert!(matches!(run.await.unwrap(), Err(Error::Protocol(_))));
}

#[tokio::test(start_paused = true)]
async fn test_dial_failure_ends_run() {
    let _ = tracing_subscriber::fmt::try_init();

    let options = ReporterOptions::new(
        NodeInfo::default(),
        "S".to_string(),
        Url::parse("ws://nobody.test/").unwrap(),
        Url::parse("http://10.0.0.5:8545").unwrap(),
    );
    let client = ReporterClient::new(
        options,
        MemoryTransport::new(),
        FixedChain,
        StaticProbe::new(ProcessHealth::Healthy),
    )
    .unwrap();

    let result = client.run_once(&CancellationToken::new()).await;
    assert!(matches!(
        result,
        Err(Error::Transport(TransportError::ConnectionFailed(_)))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_supervisor_restarts_after_delay() {
    let (client, listener) = client("http://10.0.0.5:8545", ProcessHealth::Healthy);
    let shutdown = CancellationToken::new();
    let supervisor = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { client.start(shutdown).await })
    };

    let first = accept(&listener).await;
    assert_eq!(expect(first.as_ref()).await.message_type(), MessageType::Hello);
    reply(first.as_ref(), Message::Unauthorized("no".to_string())).await;

    let rejected_at = Instant::now();
    let second = accept(&listener).await;
    assert!(rejected_at.elapsed() >= Duration::from_secs(5));
    assert_eq!(expect(second.as_ref()).await.message_type(), MessageType::Hello);

    shutdown.cancel();
    supervisor.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_closes_connection() {
    let (client, listener) = client("http://10.0.0.5:8545", ProcessHealth::Healthy);
    let shutdown = CancellationToken::new();
    let supervisor = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { client.start(shutdown).await })
    };

    let relay = accept(&listener).await;
    assert_eq!(expect(relay.as_ref()).await.message_type(), MessageType::Hello);

    shutdown.cancel();
    supervisor.await.unwrap();

    loop {
        match relay.recv().await {
            Ok(_) => {}
            Err(e) => {
                assert!(matches!(e, TransportError::ConnectionClosed));
                break;
            }
        }
    }
}

#[test]
fn test_zero_report_interval_is_rejected() {
    let mut options = ReporterOptions::new(
        NodeInfo::default(),
        "S".to_string(),
        Url::parse(RELAY_URL).unwrap(),
        Url::parse("http://10.0.0.5:8545").unwrap(),
    );
    options.report_interval = Duration::ZERO;

    let result = ReporterClient::new(
        options,
        MemoryTransport::new(),
        FixedChain,
        StaticProbe::new(ProcessHealth::Healthy),
    );
    assert!(matches!(result, Err(Error::InvalidInterval("report_interval"))));
}

#[tokio::test(start_paused = true)]
async fn test_stats_sent_with_zeroed_block_when_head_is_unreadable() {
    let _ = tracing_subscriber::fmt::try_init();

    let transport = MemoryTransport::new();
    let server_url = Url::parse(RELAY_URL).unwrap();
    let listener = transport.listen(&server_url);
    let options = ReporterOptions::new(
        NodeInfo {
            id: "n1".to_string(),
            ..NodeInfo::default()
        },
        "S".to_string(),
        server_url,
        Url::parse("http://10.0.0.5:8545").unwrap(),
    );
    let client = ReporterClient::new(
        options,
        transport,
        HeadlessChain,
        StaticProbe::new(ProcessHealth::Healthy),
    )
    .unwrap();

    let shutdown = CancellationToken::new();
    let run = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { client.run_once(&shutdown).await })
    };

    let relay = accept(&listener).await;
    assert_eq!(expect(relay.as_ref()).await.message_type(), MessageType::Hello);
    reply(relay.as_ref(), Message::Ready).await;

    match expect(relay.as_ref()).await {
        Message::Stats(stats) => {
            assert_eq!(stats.block, Block::default());
            assert_eq!(stats.peer_count, 4);
            assert_eq!(stats.pending, 3);
        }
        other => panic!("expected stats, got {other:?}"),
    }

    shutdown.cancel();
    assert!(run.await.unwrap().is_ok());
}
