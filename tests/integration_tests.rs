use netblast::client::{tcp_session, udp_session, UdpSessionParams};
use netblast::discovery::Listener;
use netblast::wire::{total_segments, PayloadHeader, Request, MAGIC_COOKIE};
use netblast::{Client, Config, Server, SessionReport};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time;

/// Test configuration that keeps offer broadcasts on loopback.
fn test_config() -> Config {
    Config::client(5000, 1, 1).with_broadcast_addr(Ipv4Addr::LOCALHOST)
}

/// Binds a server with the test configuration, spawns its dispatch loop,
/// and returns its transfer addresses.
async fn spawn_server(config: Config) -> (SocketAddr, SocketAddr) {
    let server = Server::bind(config).await.expect("server bind");
    let tcp = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), server.tcp_port());
    let udp = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), server.udp_port());
    tokio::spawn(server.run());
    (tcp, udp)
}

/// Fake UDP transfer server that answers one request, sending only the
/// segment indices `keep` selects. Used to simulate packet loss.
async fn spawn_lossy_udp_server(keep: fn(u64) -> bool, delay: Duration) -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.expect("bind");
    let addr = socket.local_addr().unwrap();

    tokio::spawn(async move {
        let mut buf = vec![0u8; 64];
        let (len, peer) = socket.recv_from(&mut buf).await.expect("request");
        let request = Request::decode(&buf[..len], MAGIC_COOKIE).expect("valid request");

        time::sleep(delay).await;

        let total = total_segments(request.size, 1024);
        let payload = vec![0u8; 1024];
        for index in 0..total {
            if !keep(index) {
                continue;
            }
            let len = (request.size - index * 1024).min(1024) as usize;
            let header = PayloadHeader {
                total_segments: total,
                segment_index: index,
            };
            let segment = header.encode_with(&payload[..len], MAGIC_COOKIE);
            socket.send_to(&segment, peer).await.expect("send");
        }
    });

    addr
}

#[tokio::test]
async fn test_tcp_transfer_exact_size() {
    let (tcp_addr, _) = spawn_server(test_config()).await;

    let report = tcp_session(tcp_addr, 5000, 1, 8192).await.expect("session");
    match report {
        SessionReport::Tcp(r) => {
            assert_eq!(r.bytes_received, 5000);
            assert_eq!(r.requested_bytes, 5000);
            assert!(r.bits_per_second > 0.0);
        }
        _ => panic!("expected a TCP report"),
    }
}

#[tokio::test]
async fn test_tcp_invalid_request_closes_connection() {
    let (tcp_addr, _) = spawn_server(test_config()).await;

    let mut stream = TcpStream::connect(tcp_addr).await.expect("connect");
    stream.write_all(b"not-a-number\n").await.expect("write");

    // The session is aborted: the server closes without sending anything.
    let mut buf = [0u8; 64];
    let read = time::timeout(Duration::from_secs(2), stream.read(&mut buf))
        .await
        .expect("server should close promptly")
        .expect("read");
    assert_eq!(read, 0);

    // Sibling sessions are unaffected.
    let report = tcp_session(tcp_addr, 1000, 2, 8192).await.expect("session");
    match report {
        SessionReport::Tcp(r) => assert_eq!(r.bytes_received, 1000),
        _ => panic!("expected a TCP report"),
    }
}

#[tokio::test]
async fn test_udp_transfer_complete() {
    let (_, udp_addr) = spawn_server(test_config()).await;
    let params = UdpSessionParams::from(&test_config());

    let report = udp_session(udp_addr, 1025, 1, params).await.expect("session");
    match report {
        SessionReport::Udp(r) => {
            assert_eq!(r.total_segments, 2);
            assert_eq!(r.segments_received, 2);
            assert_eq!(r.bytes_received, 1025);
            assert_eq!(r.completion_percent, 100.0);
            assert!(r.bits_per_second > 0.0);
        }
        _ => panic!("expected a UDP report"),
    }
}

#[tokio::test]
async fn test_udp_half_loss_reports_fifty_percent() {
    // 10 segments requested, only the even indices delivered.
    let server = spawn_lossy_udp_server(|i| i % 2 == 0, Duration::ZERO).await;
    let params = UdpSessionParams::from(&test_config());

    let report = udp_session(server, 10 * 1024, 1, params)
        .await
        .expect("session");
    match report {
        SessionReport::Udp(r) => {
            assert_eq!(r.total_segments, 10);
            assert_eq!(r.segments_received, 5);
            assert_eq!(r.bytes_received, 5 * 1024);
            assert!((r.completion_percent - 50.0).abs() < f64::EPSILON);
            // The loop must give up within the idle gap of the last segment.
            assert!(r.seconds < 1.5 + 0.5);
        }
        _ => panic!("expected a UDP report"),
    }
}

#[tokio::test]
async fn test_udp_initial_timeout_keeps_waiting() {
    // The server stays silent past the receive timeout before answering; an
    // initial timeout with zero segments must not end the session.
    let server = spawn_lossy_udp_server(|_| true, Duration::from_millis(500)).await;
    let params = UdpSessionParams::from(&test_config());

    let report = udp_session(server, 2048, 1, params).await.expect("session");
    match report {
        SessionReport::Udp(r) => {
            assert_eq!(r.segments_received, 2);
            assert_eq!(r.completion_percent, 100.0);
        }
        _ => panic!("expected a UDP report"),
    }
}

#[tokio::test]
async fn test_orchestrator_waits_for_every_session() {
    let config = Config::client(5000, 2, 2).with_broadcast_addr(Ipv4Addr::LOCALHOST);
    let (tcp_addr, udp_addr) = spawn_server(config.clone()).await;

    let client = Client::new(config).expect("client");
    let reports = client.run_transfers(tcp_addr, udp_addr).await;

    // The wait-all barrier: every session of the cycle produced a result.
    assert_eq!(reports.len(), 4);
    let tcp_count = reports
        .iter()
        .filter(|r| matches!(r, SessionReport::Tcp(_)))
        .count();
    assert_eq!(tcp_count, 2);
    for report in &reports {
        match report {
            SessionReport::Tcp(r) => assert_eq!(r.bytes_received, 5000),
            SessionReport::Udp(r) => assert_eq!(r.completion_percent, 100.0),
        }
    }
}

#[tokio::test]
async fn test_discovery_finds_running_server() {
    // Let the OS pick a discovery port, then point the server's broadcasts
    // at it over loopback.
    let probe = UdpSocket::bind("0.0.0.0:0").await.unwrap();
    let discovery_port = probe.local_addr().unwrap().port();
    drop(probe);

    let config = test_config()
        .with_discovery_port(discovery_port)
        .with_offer_interval(Duration::from_millis(50));

    let listener = Listener::bind(&config).await.expect("listener bind");

    let server = Server::bind(config.clone()).await.expect("server bind");
    let (tcp_port, udp_port) = (server.tcp_port(), server.udp_port());
    tokio::spawn(server.run());

    let (ip, offer) = time::timeout(Duration::from_secs(5), listener.wait_for_offer())
        .await
        .expect("offer within interval")
        .expect("offer");
    assert_eq!(ip, Ipv4Addr::LOCALHOST);
    assert_eq!(offer.tcp_port, tcp_port);
    assert_eq!(offer.udp_port, udp_port);

    // The advertised ports are usable end to end.
    let report = tcp_session(SocketAddr::new(ip, offer.tcp_port), 5000, 1, 8192)
        .await
        .expect("session");
    match report {
        SessionReport::Tcp(r) => assert_eq!(r.bytes_received, 5000),
        _ => panic!("expected a TCP report"),
    }
}
