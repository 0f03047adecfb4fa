//! End-to-end scenarios: a real server on loopback with raw socket peers
//! and the line-driven client.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use relaychat::{framing, ChatClient, ChatServer, Config, Message};

const WAIT: Duration = Duration::from_secs(2);

async fn start_server(
    config: Config,
) -> (SocketAddr, CancellationToken, JoinHandle<anyhow::Result<()>>) {
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let server = ChatServer::bind(&[addr], &config).await.unwrap();
    let bound = server.local_addrs()[0];
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(server.run(shutdown.clone()));
    (bound, shutdown, handle)
}

async fn send(stream: &mut TcpStream, text: &str) {
    let frame = framing::encode(&Message::new(text.as_bytes().to_vec()).unwrap());
    stream.write_all(&frame).await.unwrap();
}

async fn recv(stream: &mut TcpStream) -> String {
    let msg = tokio::time::timeout(WAIT, framing::read_message(stream))
        .await
        .expect("Timed out waiting for frame")
        .expect("Frame read failed");
    String::from_utf8(msg.body().to_vec()).unwrap()
}

async fn next_printed(printed: &mut Lines<BufReader<DuplexStream>>) -> String {
    tokio::time::timeout(WAIT, printed.next_line())
        .await
        .expect("Timed out waiting for client output")
        .unwrap()
        .expect("Client output ended early")
}

#[tokio::test]
async fn test_hello_world_between_two_peers() {
    let (addr, shutdown, _server) = start_server(Config::default()).await;

    let mut a = TcpStream::connect(addr).await.unwrap();
    send(&mut a, "hello").await;
    assert_eq!(recv(&mut a).await, "hello");

    let mut b = TcpStream::connect(addr).await.unwrap();
    assert_eq!(recv(&mut b).await, "hello", "newcomer should get history");

    send(&mut a, "world").await;
    assert_eq!(recv(&mut a).await, "world");
    assert_eq!(recv(&mut b).await, "world");

    shutdown.cancel();
}

#[tokio::test]
async fn test_history_limit_from_config() {
    let config = Config {
        history_limit: 3,
        ..Config::default()
    };
    let (addr, shutdown, _server) = start_server(config).await;

    let mut a = TcpStream::connect(addr).await.unwrap();
    for i in 1..=5 {
        let text = format!("m{i}");
        send(&mut a, &text).await;
        assert_eq!(recv(&mut a).await, text);
    }

    let mut b = TcpStream::connect(addr).await.unwrap();
    for expected in ["m3", "m4", "m5"] {
        assert_eq!(recv(&mut b).await, expected);
    }
    send(&mut b, "live").await;
    assert_eq!(recv(&mut b).await, "live", "only the last three are replayed");

    shutdown.cancel();
}

#[tokio::test]
async fn test_line_client_round_trip_through_server() {
    let (addr, shutdown, server) = start_server(Config::default()).await;

    // Raw peer joins first so it sees everything the line client sends.
    let mut watcher = TcpStream::connect(addr).await.unwrap();
    send(&mut watcher, "watching").await;
    assert_eq!(recv(&mut watcher).await, "watching");

    let client = ChatClient::connect(addr).await.unwrap();
    let (mut input_tx, input_rx) = tokio::io::duplex(1024);
    let (output_tx, output_rx) = tokio::io::duplex(4096);
    let run = tokio::spawn(client.run(BufReader::new(input_rx), output_tx));
    let mut printed = BufReader::new(output_rx).lines();

    // History replay is printed first.
    assert_eq!(next_printed(&mut printed).await, "watching");

    input_tx.write_all(b"hi from the client\r\n").await.unwrap();
    assert_eq!(recv(&mut watcher).await, "hi from the client");
    assert_eq!(next_printed(&mut printed).await, "hi from the client");

    send(&mut watcher, "hi back").await;
    assert_eq!(recv(&mut watcher).await, "hi back");
    assert_eq!(next_printed(&mut printed).await, "hi back");

    // Closing input flushes and disconnects the client.
    input_tx.write_all(b"bye").await.unwrap();
    drop(input_tx);
    assert_eq!(recv(&mut watcher).await, "bye");
    tokio::time::timeout(WAIT, run)
        .await
        .expect("client should exit after input EOF")
        .unwrap()
        .unwrap();

    shutdown.cancel();
    tokio::time::timeout(WAIT, server)
        .await
        .expect("server should stop")
        .unwrap()
        .unwrap();
}
