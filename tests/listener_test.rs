//! Integration tests for listener mode

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};

use gonc::{
    ConnectionRegistry, Listener, RelayError, ShutdownCoordinator, ShutdownEvent, Transport,
};

const WAIT: Duration = Duration::from_secs(5);

struct Harness {
    addr: String,
    registry: Arc<ConnectionRegistry>,
    input: DuplexStream,
    output: DuplexStream,
    server: JoinHandle<Result<ShutdownEvent, RelayError>>,
}

async fn start_listener(coordinator: Option<ShutdownCoordinator>) -> Harness {
    let mut listener = Listener::bind(Transport::Tcp, "127.0.0.1:0").await.unwrap();
    if let Some(coordinator) = coordinator {
        listener = listener.with_shutdown(coordinator);
    }
    let addr = listener.local_addr().to_string();
    let registry = listener.registry();

    let (input, input_rx) = tokio::io::duplex(64 * 1024);
    let (output_tx, output) = tokio::io::duplex(64 * 1024);
    let server = tokio::spawn(listener.serve(input_rx, output_tx));

    Harness {
        addr,
        registry,
        input,
        output,
        server,
    }
}

async fn wait_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    timeout(WAIT, async {
        while !condition() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn read_exactly(stream: &mut (impl AsyncRead + Unpin), n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    timeout(WAIT, stream.read_exact(&mut buf))
        .await
        .expect("read timed out")
        .unwrap();
    buf
}

#[tokio::test]
async fn test_hello_world_scenario() {
    let mut harness = start_listener(None).await;

    let mut client = TcpStream::connect(&harness.addr).await.unwrap();
    let client_addr = client.local_addr().unwrap().to_string();
    wait_until(|| harness.registry.contains(&client_addr)).await;

    harness.input.write_all(b"hello\n").await.unwrap();
    assert_eq!(read_exactly(&mut client, 6).await, b"hello\n");

    client.write_all(b"world\n").await.unwrap();
    assert_eq!(read_exactly(&mut harness.output, 6).await, b"world\n");

    drop(client);
    wait_until(|| !harness.registry.contains(&client_addr)).await;
    assert!(harness.registry.is_empty());
}

#[tokio::test]
async fn test_broadcast_reaches_every_peer() {
    let mut harness = start_listener(None).await;

    let mut peer_a = TcpStream::connect(&harness.addr).await.unwrap();
    let mut peer_b = TcpStream::connect(&harness.addr).await.unwrap();
    wait_until(|| harness.registry.len() == 2).await;

    harness.input.write_all(b"ping\n").await.unwrap();

    assert_eq!(read_exactly(&mut peer_a, 5).await, b"ping\n");
    assert_eq!(read_exactly(&mut peer_b, 5).await, b"ping\n");
}

#[tokio::test]
async fn test_disconnected_peer_is_dropped_from_broadcast() {
    let mut harness = start_listener(None).await;

    let peer_a = TcpStream::connect(&harness.addr).await.unwrap();
    let mut peer_b = TcpStream::connect(&harness.addr).await.unwrap();
    let addr_a = peer_a.local_addr().unwrap().to_string();
    let addr_b = peer_b.local_addr().unwrap().to_string();
    wait_until(|| harness.registry.len() == 2).await;

    drop(peer_a);
    wait_until(|| !harness.registry.contains(&addr_a)).await;

    let remaining: Vec<String> = harness
        .registry
        .snapshot()
        .iter()
        .map(|peer| peer.addr().to_string())
        .collect();
    assert_eq!(remaining, vec![addr_b]);

    harness.input.write_all(b"after\n").await.unwrap();
    assert_eq!(read_exactly(&mut peer_b, 6).await, b"after\n");
}

#[tokio::test]
async fn test_peer_output_reaches_local_output() {
    let mut harness = start_listener(None).await;

    let mut client = TcpStream::connect(&harness.addr).await.unwrap();
    wait_until(|| harness.registry.len() == 1).await;

    client.write_all(b"from the peer").await.unwrap();
    client.shutdown().await.unwrap();

    assert_eq!(read_exactly(&mut harness.output, 13).await, b"from the peer");
    wait_until(|| harness.registry.is_empty()).await;
}

#[tokio::test]
async fn test_input_eof_terminates_cleanly() {
    let coordinator = ShutdownCoordinator::new();
    let mut events = coordinator.subscribe();
    let harness = start_listener(Some(coordinator)).await;

    let _client = TcpStream::connect(&harness.addr).await.unwrap();
    wait_until(|| harness.registry.len() == 1).await;

    drop(harness.input);

    let event = timeout(WAIT, harness.server)
        .await
        .expect("listener did not stop")
        .unwrap()
        .unwrap();
    assert_eq!(event, ShutdownEvent::InputClosed);
    assert_eq!(event.exit_code(), 0);
    assert_eq!(events.recv().await.unwrap(), ShutdownEvent::InputClosed);
}

#[tokio::test]
async fn test_bind_conflict_is_fatal() {
    let first = Listener::bind(Transport::Tcp, "127.0.0.1:0").await.unwrap();

    let err = Listener::bind(Transport::Tcp, first.local_addr())
        .await
        .err()
        .expect("second bind should fail");
    assert!(matches!(err, RelayError::Bind { .. }));
    assert_eq!(ShutdownEvent::Fatal.exit_code(), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn test_unix_socket_listener() {
    use tokio::net::UnixStream;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gonc.sock");
    let path = path.to_str().unwrap();

    let listener = Listener::bind(Transport::Unix, path).await.unwrap();
    let registry = listener.registry();
    let (mut input, input_rx) = tokio::io::duplex(1024);
    let (output_tx, mut output) = tokio::io::duplex(1024);
    tokio::spawn(listener.serve(input_rx, output_tx));

    let mut first = UnixStream::connect(path).await.unwrap();
    let mut second = UnixStream::connect(path).await.unwrap();
    wait_until(|| registry.len() == 2).await;

    input.write_all(b"unix\n").await.unwrap();
    assert_eq!(read_exactly(&mut first, 5).await, b"unix\n");
    assert_eq!(read_exactly(&mut second, 5).await, b"unix\n");

    second.write_all(b"back\n").await.unwrap();
    assert_eq!(read_exactly(&mut output, 5).await, b"back\n");
}
