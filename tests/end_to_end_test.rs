//! End-to-end tests: SOCKS5 client through both hops to a real origin
//!
//! The inter-hop transport runs in plaintext mode here; the negotiation
//! envelopes themselves are still encrypted.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use ruxy::envelope::{Envelope, SymmetricKey, TargetDescriptor};
use ruxy::{Config, LocalBroker, RemoteRelay};

const KEY: &str = "1b94f71484d0488681ef7c9a625a2069";

/// Spin up both hops on ephemeral ports and return the SOCKS5 address.
async fn start_tunnel() -> SocketAddr {
    let mut config = Config::default();
    config.general.key = KEY.into();
    config.remote.listen_addr = "127.0.0.1:0".parse().unwrap();
    config.relay.idle_timeout = Duration::from_secs(2);

    let remote = RemoteRelay::bind(Arc::new(config.clone())).await.unwrap();
    let remote_addr = remote.local_addr().unwrap();
    tokio::spawn(remote.run());

    config.local.listen_addr = "127.0.0.1:0".parse().unwrap();
    config.local.remote_host = "127.0.0.1".into();
    config.local.remote_port = remote_addr.port();
    let broker = LocalBroker::bind(Arc::new(config)).await.unwrap();
    let socks_addr = broker.local_addr().unwrap();
    tokio::spawn(broker.run());

    socks_addr
}

/// One-shot echo origin: accepts one connection, echoes everything it
/// reads, closes when the peer does.
async fn start_echo_origin() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Ok((mut stream, _)) = listener.accept().await {
            let mut buf = [0u8; 4096];
            while let Ok(n) = stream.read(&mut buf).await {
                if n == 0 || stream.write_all(&buf[..n]).await.is_err() {
                    break;
                }
            }
        }
    });
    addr
}

/// Greeting + userpass auth with the default test credentials.
async fn socks_authenticate(stream: &mut TcpStream) {
    stream.write_all(&[0x05, 0x01, 0x02]).await.unwrap();
    let mut reply = [0u8; 2];
    stream.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [0x05, 0x02]);

    stream.write_all(&[0x01, 0x08]).await.unwrap();
    stream.write_all(b"username").await.unwrap();
    stream.write_all(&[0x08]).await.unwrap();
    stream.write_all(b"password").await.unwrap();
    stream.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [0x01, 0x00]);
}

/// CONNECT request; returns (status, bind_addr_be32, bind_port).
async fn socks_connect(stream: &mut TcpStream, target: SocketAddr) -> (u8, u32, u16) {
    let SocketAddr::V4(v4) = target else {
        panic!("test targets are IPv4")
    };
    stream.write_all(&[0x05, 0x01, 0x00, 0x01]).await.unwrap();
    stream.write_all(&v4.ip().octets()).await.unwrap();
    stream.write_all(&v4.port().to_be_bytes()).await.unwrap();

    let mut reply = [0u8; 10];
    stream.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[0], 0x05);
    assert_eq!(reply[3], 0x01);
    let bind_addr = u32::from_be_bytes(reply[4..8].try_into().unwrap());
    let bind_port = u16::from_be_bytes(reply[8..10].try_into().unwrap());
    (reply[1], bind_addr, bind_port)
}

#[tokio::test]
async fn bytes_round_trip_through_both_hops() {
    let socks_addr = start_tunnel().await;
    let origin = start_echo_origin().await;

    let mut client = TcpStream::connect(socks_addr).await.unwrap();
    socks_authenticate(&mut client).await;
    let (status, bind_addr, bind_port) = socks_connect(&mut client, origin).await;
    assert_eq!(status, 0x00);
    assert_ne!(bind_addr, 0, "bind tuple must be populated on success");
    assert_ne!(bind_port, 0);

    let request = b"GET / HTTP/1.0\r\n\r\n";
    client.write_all(request).await.unwrap();

    let mut echoed = [0u8; 18];
    client.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, request);

    // Origin sees our close and closes in turn; the client-facing
    // connection follows.
    client.shutdown().await.unwrap();
    let mut rest = Vec::new();
    client.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());
}

#[tokio::test]
async fn domain_targets_resolve_on_the_remote_hop() {
    let socks_addr = start_tunnel().await;
    let origin = start_echo_origin().await;

    let mut client = TcpStream::connect(socks_addr).await.unwrap();
    socks_authenticate(&mut client).await;

    // CONNECT localhost:<origin port> by domain name.
    client.write_all(&[0x05, 0x01, 0x00, 0x03]).await.unwrap();
    client.write_all(&[9]).await.unwrap();
    client.write_all(b"localhost").await.unwrap();
    client.write_all(&origin.port().to_be_bytes()).await.unwrap();

    let mut reply = [0u8; 10];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[1], 0x00);

    client.write_all(b"over the domain path").await.unwrap();
    let mut echoed = [0u8; 20];
    client.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, b"over the domain path");
}

#[tokio::test]
async fn non_connect_commands_get_command_not_supported() {
    let socks_addr = start_tunnel().await;
    let origin = start_echo_origin().await;

    let mut client = TcpStream::connect(socks_addr).await.unwrap();
    socks_authenticate(&mut client).await;

    // BIND request against a reachable target; the broker still refuses
    // the command after negotiating.
    let SocketAddr::V4(v4) = origin else {
        panic!("test targets are IPv4")
    };
    client.write_all(&[0x05, 0x02, 0x00, 0x01]).await.unwrap();
    client.write_all(&v4.ip().octets()).await.unwrap();
    client.write_all(&v4.port().to_be_bytes()).await.unwrap();

    let mut reply = [0u8; 10];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[1], 0x07, "expected command-not-supported status");

    // The session ends there; nothing is relayed.
    let mut rest = Vec::new();
    client.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());
}

#[tokio::test]
async fn empty_target_envelope_is_dropped_without_a_response() {
    let mut config = Config::default();
    config.general.key = KEY.into();
    config.remote.listen_addr = "127.0.0.1:0".parse().unwrap();
    config.relay.idle_timeout = Duration::from_secs(2);
    let remote = RemoteRelay::bind(Arc::new(config)).await.unwrap();
    let remote_addr = remote.local_addr().unwrap();
    tokio::spawn(remote.run());

    // A well-formed envelope that names no destination at all. The
    // relay drops the session instead of answering with a bind tuple.
    let key = SymmetricKey::new(KEY).unwrap();
    let target = TargetDescriptor {
        ip: String::new(),
        domain: String::new(),
        port: 443,
    };
    let envelope = Envelope::new(&key, target.to_payload());

    let mut stream = TcpStream::connect(remote_addr).await.unwrap();
    stream.write_all(&envelope.seal(&key)).await.unwrap();
    stream.flush().await.unwrap();

    let mut rest = Vec::new();
    stream.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty(), "expected no response envelope");
}

#[tokio::test]
async fn unreachable_target_yields_refused_and_no_relay() {
    let socks_addr = start_tunnel().await;

    // A port that was just released: connecting to it is refused.
    let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = dead.local_addr().unwrap();
    drop(dead);

    let mut client = TcpStream::connect(socks_addr).await.unwrap();
    socks_authenticate(&mut client).await;
    let (status, bind_addr, bind_port) = socks_connect(&mut client, dead_addr).await;

    assert_eq!(status, 0x05, "expected connection-refused status");
    assert_eq!(bind_addr, 0);
    assert_eq!(bind_port, 0);

    // The broker aborts without relaying.
    let mut rest = Vec::new();
    client.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());
}

#[tokio::test]
async fn bad_credentials_are_rejected_by_the_broker() {
    let socks_addr = start_tunnel().await;

    let mut client = TcpStream::connect(socks_addr).await.unwrap();
    client.write_all(&[0x05, 0x01, 0x02]).await.unwrap();
    let mut reply = [0u8; 2];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [0x05, 0x02]);

    client.write_all(&[0x01, 0x08]).await.unwrap();
    client.write_all(b"username").await.unwrap();
    client.write_all(&[0x05]).await.unwrap();
    client.write_all(b"nope!").await.unwrap();
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [0x01, 0xFF]);

    let mut rest = Vec::new();
    client.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());
}
