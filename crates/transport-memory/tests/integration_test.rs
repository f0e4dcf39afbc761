//! Integration tests for memory transport

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use ethstats_transport::{Connection, Listener, Transport, TransportError};
use ethstats_transport_memory::MemoryTransport;
use tokio::time::timeout;
use tracing::info;
use url::Url;

#[tokio::test]
async fn test_memory_echo_server() {
    let _ = tracing_subscriber::fmt::try_init();

    let transport = MemoryTransport::new();
    let url = Url::parse("ws://relay.test/").unwrap();
    let listener = transport.listen(&url);

    // Start echo server
    let server_task = tokio::spawn(async move {
        let mut peers = HashSet::new();
        while let Ok(conn) = listener.accept().await {
            info!("Server accepted connection from {}", conn.remote_addr());
            peers.insert(conn.remote_addr());

            tokio::spawn(async move {
                while let Ok(data) = conn.recv().await {
                    if conn.send(data).await.is_err() {
                        break;
                    }
                }
            });

            if peers.len() == 3 {
                break;
            }
        }
        peers
    });

    for i in 0..3 {
        let client = transport.connect(&url).await.expect("Failed to connect");
        let msg = Bytes::from(format!(r#"{{"emit":["node-pong","n{i}"]}}"#));

        client.send(msg.clone()).await.expect("Failed to send");
        let response = timeout(Duration::from_secs(1), client.recv())
            .await
            .expect("Receive timeout")
            .expect("Failed to receive");
        assert_eq!(response, msg);

        client.close().await.unwrap();
    }

    let peers = timeout(Duration::from_secs(1), server_task)
        .await
        .expect("Server did not finish")
        .unwrap();
    assert_eq!(peers.len(), 3, "each connection gets its own address");
}

#[tokio::test]
async fn test_send_not_blocked_by_parked_recv() {
    let _ = tracing_subscriber::fmt::try_init();

    let transport = MemoryTransport::new();
    let url = Url::parse("ws://relay.test/").unwrap();
    let listener = transport.listen(&url);

    let client: Arc<dyn Connection> = Arc::from(transport.connect(&url).await.unwrap());
    let server = listener.accept().await.unwrap();

    let reader = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.recv().await })
    };
    tokio::task::yield_now().await;

    // The reader holds the read half; writing must still go through
    timeout(
        Duration::from_secs(1),
        client.send(Bytes::from_static(br#"{"emit":["ready"]}"#)),
    )
    .await
    .expect("send blocked by parked recv")
    .unwrap();
    assert_eq!(
        server.recv().await.unwrap(),
        Bytes::from_static(br#"{"emit":["ready"]}"#)
    );

    client.close().await.unwrap();
    assert!(matches!(
        reader.await.unwrap(),
        Err(TransportError::ConnectionClosed)
    ));
}
