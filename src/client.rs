use crate::config::Config;
use crate::discovery::Listener;
use crate::report::{SessionReport, TcpReport, UdpReport};
use crate::wire::{total_segments, PayloadHeader, Request};
use crate::{Error, Result};
use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::task::JoinSet;
use tokio::time;

/// Parameters one UDP session needs from the shared configuration.
#[derive(Debug, Clone, Copy)]
pub struct UdpSessionParams {
    pub magic_cookie: u32,
    pub segment_capacity: usize,
    pub recv_timeout: Duration,
    pub idle_gap: Duration,
}

impl From<&Config> for UdpSessionParams {
    fn from(config: &Config) -> Self {
        Self {
            magic_cookie: config.magic_cookie,
            segment_capacity: config.segment_capacity,
            recv_timeout: config.recv_timeout,
            idle_gap: config.idle_gap,
        }
    }
}

/// Tracks which segments of a UDP transfer have arrived.
///
/// Duplicate indices are counted once; bytes are accumulated only for the
/// first arrival of each index.
struct SegmentTracker {
    total: u64,
    seen: HashSet<u64>,
    bytes: u64,
}

impl SegmentTracker {
    fn new(total: u64) -> Self {
        Self {
            total,
            seen: HashSet::new(),
            bytes: 0,
        }
    }

    /// Records one received segment. Returns false for duplicates.
    fn record(&mut self, index: u64, payload_len: usize) -> bool {
        if self.seen.insert(index) {
            self.bytes += payload_len as u64;
            true
        } else {
            false
        }
    }

    fn is_complete(&self) -> bool {
        self.seen.len() as u64 >= self.total
    }

    fn segments_received(&self) -> u64 {
        self.seen.len() as u64
    }
}

/// Runs one TCP transfer session against the server's TCP port.
///
/// Sends the requested size as a decimal ASCII line, then reads until the
/// full size arrived or the peer closed early. A truncated or faulted
/// transfer still produces a report measured from the bytes actually
/// received; only a failure before the request is sent is an error.
pub async fn tcp_session(
    addr: SocketAddr,
    size: u64,
    session: usize,
    chunk_size: usize,
) -> Result<SessionReport> {
    let mut stream = TcpStream::connect(addr)
        .await
        .map_err(|e| Error::Connection(format!("tcp session #{}: connect failed: {}", session, e)))?;
    stream.write_all(format!("{}\n", size).as_bytes()).await?;

    let start = Instant::now();
    let mut buf = vec![0u8; chunk_size];
    let mut received = 0u64;
    while received < size {
        let want = (size - received).min(chunk_size as u64) as usize;
        match stream.read(&mut buf[..want]).await {
            Ok(0) => {
                debug!(
                    "tcp session #{}: peer closed after {} of {} bytes",
                    session, received, size
                );
                break;
            }
            Ok(n) => received += n as u64,
            Err(e) => {
                warn!(
                    "tcp session #{}: read failed after {} bytes: {}",
                    session, received, e
                );
                break;
            }
        }
    }

    Ok(SessionReport::Tcp(TcpReport::new(
        session,
        size,
        received,
        start.elapsed(),
    )))
}

/// Runs one UDP transfer session against the server's UDP port.
///
/// Sends a single request datagram, then receives segments until one of the
/// terminal conditions holds:
///
/// - every segment index has been seen;
/// - more than the idle gap elapsed since the last valid segment;
/// - a receive timeout fired after at least one segment arrived. A timeout
///   with zero segments keeps the loop waiting, so a transfer that is lost
///   in its entirety waits indefinitely.
pub async fn udp_session(
    addr: SocketAddr,
    size: u64,
    session: usize,
    params: UdpSessionParams,
) -> Result<SessionReport> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    let request = Request { size }.encode(params.magic_cookie);
    socket.send_to(&request, addr).await?;

    let start = Instant::now();
    let total = total_segments(size, params.segment_capacity as u64);
    let mut tracker = SegmentTracker::new(total);
    let mut last_segment = Instant::now();
    let mut buf = vec![0u8; PayloadHeader::SIZE + params.segment_capacity];

    loop {
        match time::timeout(params.recv_timeout, socket.recv_from(&mut buf)).await {
            Err(_) => {
                // Nothing arrived within the timeout. With segments already
                // in hand the burst is over; with none, keep waiting.
                if tracker.segments_received() > 0 {
                    break;
                }
            }
            Ok(Err(e)) => {
                warn!("udp session #{}: receive failed: {}", session, e);
                break;
            }
            Ok(Ok((len, from))) => {
                match PayloadHeader::decode(&buf[..len], params.magic_cookie) {
                    Ok((header, payload)) => {
                        last_segment = Instant::now();
                        tracker.record(header.segment_index, payload.len());
                        if tracker.is_complete() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!("udp session #{}: discarding datagram from {}: {}", session, from, e);
                    }
                }
                if last_segment.elapsed() >= params.idle_gap {
                    break;
                }
            }
        }
    }

    Ok(SessionReport::Udp(UdpReport::new(
        session,
        size,
        tracker.bytes,
        tracker.segments_received(),
        total,
        start.elapsed(),
    )))
}

/// Benchmarking client: discovers a server and measures transfer speed over
/// parallel TCP and UDP sessions.
///
/// # Examples
///
/// ```no_run
/// use netblast::{Client, Config};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::client(1024 * 1024, 4, 2);
/// let client = Client::new(config)?;
/// client.run().await?;
/// # Ok(())
/// # }
/// ```
pub struct Client {
    config: Config,
}

impl Client {
    /// Creates a client, validating the transfer parameters before any
    /// network action.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a zero transfer size or zero sessions.
    pub fn new(config: Config) -> Result<Self> {
        config.validate_client()?;
        Ok(Self { config })
    }

    /// Runs discovery cycles forever: wait for an offer, run every session
    /// to completion, report, repeat.
    pub async fn run(&self) -> Result<()> {
        let listener = Listener::bind(&self.config).await?;
        loop {
            info!("client started, listening for offers");
            let (server_ip, offer) = listener.wait_for_offer().await?;
            let tcp_addr = SocketAddr::new(server_ip, offer.tcp_port);
            let udp_addr = SocketAddr::new(server_ip, offer.udp_port);

            let reports = self.run_transfers(tcp_addr, udp_addr).await;
            for report in &reports {
                self.print_report(report)?;
            }
            info!("all transfers complete, listening for offers");
        }
    }

    /// Runs one full transfer cycle against known server addresses.
    ///
    /// Spawns every TCP and UDP session concurrently and waits until all of
    /// them finished; sessions share nothing and may complete in any order.
    /// A failed session is logged and omitted from the returned reports,
    /// without affecting its siblings.
    pub async fn run_transfers(
        &self,
        tcp_addr: SocketAddr,
        udp_addr: SocketAddr,
    ) -> Vec<SessionReport> {
        let mut sessions = JoinSet::new();
        let size = self.config.transfer_size;
        let chunk_size = self.config.chunk_size;
        let params = UdpSessionParams::from(&self.config);

        for i in 0..self.config.tcp_sessions {
            sessions.spawn(tcp_session(tcp_addr, size, i + 1, chunk_size));
        }
        for i in 0..self.config.udp_sessions {
            sessions.spawn(udp_session(udp_addr, size, i + 1, params));
        }

        let mut reports = Vec::with_capacity(self.config.tcp_sessions + self.config.udp_sessions);
        while let Some(joined) = sessions.join_next().await {
            match joined {
                Ok(Ok(report)) => reports.push(report),
                Ok(Err(e)) => error!("session failed: {}", e),
                Err(e) => error!("session task panicked: {}", e),
            }
        }
        reports
    }

    fn print_report(&self, report: &SessionReport) -> Result<()> {
        if self.config.json {
            println!("{}", serde_json::to_string(report)?);
        } else {
            println!("{}", report);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_counts_duplicates_once() {
        let mut tracker = SegmentTracker::new(3);
        assert!(tracker.record(0, 1024));
        assert!(tracker.record(1, 1024));
        assert!(!tracker.record(0, 1024));
        assert!(!tracker.record(1, 1024));

        assert_eq!(tracker.segments_received(), 2);
        assert_eq!(tracker.bytes, 2048);
        assert!(!tracker.is_complete());

        assert!(tracker.record(2, 512));
        assert!(tracker.is_complete());
        assert_eq!(tracker.bytes, 2560);
    }

    #[test]
    fn test_tracker_complete_on_distinct_indices() {
        let mut tracker = SegmentTracker::new(2);
        tracker.record(1, 1);
        assert!(!tracker.is_complete());
        tracker.record(0, 1024);
        assert!(tracker.is_complete());
    }

    #[test]
    fn test_client_rejects_invalid_config() {
        assert!(Client::new(Config::client(0, 1, 1)).is_err());
        assert!(Client::new(Config::client(1024, 0, 0)).is_err());
        assert!(Client::new(Config::client(1024, 1, 1)).is_ok());
    }

    #[tokio::test]
    async fn test_tcp_session_connect_refused_is_error() {
        // Port 9 (discard) is almost certainly closed.
        let addr: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let result = tcp_session(addr, 100, 1, 8192).await;
        assert!(matches!(result, Err(Error::Connection(_))));
    }
}
