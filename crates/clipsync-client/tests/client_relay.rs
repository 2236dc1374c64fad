//! Client against a real relay on loopback, with in-memory clipboards.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use clipsync_client::domain::ClientConfig;
use clipsync_client::infrastructure::clipboard::MemoryClipboard;
use clipsync_client::infrastructure::{run_client, ClientError};
use clipsync_relay::application::ConnectionRegistry;
use clipsync_relay::domain::RelayConfig;
use clipsync_relay::infrastructure::RelayServer;

const WAIT: Duration = Duration::from_secs(5);

struct Relay {
    addr: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    shutdown: CancellationToken,
    server: JoinHandle<()>,
}

impl Relay {
    async fn start(listen_addr: SocketAddr) -> Self {
        let server = RelayServer::bind(RelayConfig {
            listen_addr,
            ..RelayConfig::default()
        })
        .await
        .unwrap();
        let addr = server.local_addr();
        let registry = server.registry();
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let server = tokio::spawn(async move { server.serve(token).await });
        Self {
            addr,
            registry,
            shutdown,
            server,
        }
    }

    async fn stop(self) {
        self.shutdown.cancel();
        tokio::time::timeout(WAIT, self.server)
            .await
            .expect("relay must stop after shutdown")
            .unwrap();
    }
}

struct Peer {
    clipboard: Arc<MemoryClipboard>,
    shutdown: CancellationToken,
    task: JoinHandle<Result<(), ClientError>>,
}

impl Peer {
    fn start(addr: SocketAddr) -> Self {
        let config = ClientConfig {
            relay_url: format!("ws://{addr}/"),
            reconnect_interval: Duration::from_millis(100),
            ..ClientConfig::default()
        };
        let clipboard = Arc::new(MemoryClipboard::new());
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run_client(config, clipboard.clone(), shutdown.clone()));
        Self {
            clipboard,
            shutdown,
            task,
        }
    }

    async fn stop(self) {
        self.shutdown.cancel();
        let result = tokio::time::timeout(WAIT, self.task)
            .await
            .expect("client must stop after shutdown")
            .unwrap();
        assert!(result.is_ok(), "client failed: {result:?}");
    }
}

async fn wait_for_len(registry: &ConnectionRegistry, expected: usize) {
    tokio::time::timeout(WAIT, async {
        while registry.len() != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("relay never reached {expected} connections"));
}

async fn wait_for_applied(clipboard: &MemoryClipboard, expected: &[&str]) {
    tokio::time::timeout(WAIT, async {
        while clipboard.applied() != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| {
        panic!(
            "expected applied updates {expected:?}, got {:?}",
            clipboard.applied()
        )
    });
}

#[tokio::test]
async fn test_copy_on_one_machine_reaches_the_other() {
    // Arrange
    let relay = Relay::start("127.0.0.1:0".parse().unwrap()).await;
    let a = Peer::start(relay.addr);
    let b = Peer::start(relay.addr);
    wait_for_len(&relay.registry, 2).await;

    // Act
    a.clipboard.copy("hello 世界").unwrap();

    // Assert
    wait_for_applied(&b.clipboard, &["hello 世界"]).await;
    assert_eq!(b.clipboard.contents().as_deref(), Some("hello 世界"));

    a.stop().await;
    b.stop().await;
    relay.stop().await;
}

#[tokio::test]
async fn test_applied_update_is_not_echoed_back() {
    // Arrange
    let relay = Relay::start("127.0.0.1:0".parse().unwrap()).await;
    let a = Peer::start(relay.addr);
    let b = Peer::start(relay.addr);
    wait_for_len(&relay.registry, 2).await;

    // Act: B's write of A's text fires B's watcher like an OS clipboard would
    a.clipboard.copy("from a").unwrap();
    wait_for_applied(&b.clipboard, &["from a"]).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    // Assert: nothing came back to A
    assert!(a.clipboard.applied().is_empty());

    // Act: a fresh copy on B still goes out
    b.clipboard.copy("from b").unwrap();

    // Assert
    wait_for_applied(&a.clipboard, &["from b"]).await;
    assert_eq!(b.clipboard.applied(), vec!["from a".to_string()]);

    a.stop().await;
    b.stop().await;
    relay.stop().await;
}

#[tokio::test]
async fn test_client_reconnects_after_relay_restart() {
    // Arrange
    let relay = Relay::start("127.0.0.1:0".parse().unwrap()).await;
    let addr = relay.addr;
    let a = Peer::start(addr);
    let b = Peer::start(addr);
    wait_for_len(&relay.registry, 2).await;

    // Act: take the relay down and bring it back on the same port
    relay.stop().await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    let relay = Relay::start(addr).await;
    wait_for_len(&relay.registry, 2).await;
    a.clipboard.copy("after restart").unwrap();

    // Assert
    wait_for_applied(&b.clipboard, &["after restart"]).await;

    a.stop().await;
    b.stop().await;
    relay.stop().await;
}
