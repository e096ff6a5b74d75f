use crate::config::Config;
use crate::discovery::Broadcaster;
use crate::report::ServerStats;
use crate::wire::{total_segments, PayloadHeader, Request};
use crate::{Error, Result};
use log::{debug, error, info};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::time;

/// Longest accepted TCP request line, including the terminating newline.
const MAX_REQUEST_LINE: usize = 32;

/// Bulk-data transfer server.
///
/// Allocates one free TCP and one free UDP port at startup, advertises them
/// through offer broadcasts, and serves transfers on both: TCP peers send a
/// decimal byte count terminated by a newline and receive exactly that many
/// bytes; UDP peers send a request datagram and receive the size split into
/// header-tagged segments.
///
/// Each accepted connection or received datagram is handled by its own task;
/// the dispatch loop never waits for handlers.
///
/// # Examples
///
/// ```no_run
/// use netblast::{Config, Server};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let server = Server::bind(Config::server()).await?;
/// println!("serving on tcp {} / udp {}", server.tcp_port(), server.udp_port());
/// server.run().await?;
/// # Ok(())
/// # }
/// ```
pub struct Server {
    config: Config,
    stats: ServerStats,
    tcp_listener: TcpListener,
    udp_socket: UdpSocket,
    tcp_port: u16,
    udp_port: u16,
}

impl Server {
    /// Allocates the server's port pair and binds both sockets.
    ///
    /// Ports are found by a linear scan over the configured range; the first
    /// successful bind of each protocol is kept, so there is no window where
    /// an advertised port could be taken by another process.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PortExhausted`] when no port in the range is free.
    /// This is fatal: a server without a port pair cannot start.
    pub async fn bind(config: Config) -> Result<Self> {
        let (lo, hi) = config.port_range;
        let tcp_listener = allocate_tcp_listener(lo, hi).await?;
        let udp_socket = allocate_udp_socket(lo, hi).await?;
        let tcp_port = tcp_listener.local_addr()?.port();
        let udp_port = udp_socket.local_addr()?.port();

        info!(
            "server bound: tcp port {}, udp port {}",
            tcp_port, udp_port
        );

        Ok(Self {
            config,
            stats: ServerStats::new(),
            tcp_listener,
            udp_socket,
            tcp_port,
            udp_port,
        })
    }

    /// The allocated TCP transfer port.
    pub fn tcp_port(&self) -> u16 {
        self.tcp_port
    }

    /// The allocated UDP transfer port.
    pub fn udp_port(&self) -> u16 {
        self.udp_port
    }

    /// A handle to the server's counters.
    pub fn stats(&self) -> ServerStats {
        self.stats.clone()
    }

    /// Starts the offer broadcaster and runs the dispatch loop forever.
    ///
    /// The dispatch loop multiplexes TCP accepts and UDP receives so neither
    /// channel starves the other, spawning a fire-and-forget handler task
    /// for every connection and datagram.
    pub async fn run(self) -> Result<()> {
        let broadcaster = Broadcaster::new(&self.config, self.udp_port, self.tcp_port).await?;
        tokio::spawn(broadcaster.run());

        let mut buf = vec![0u8; self.config.segment_capacity];
        loop {
            tokio::select! {
                accepted = self.tcp_listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        debug!("tcp connection from {}", addr);
                        let config = self.config.clone();
                        let stats = self.stats.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_tcp_session(stream, addr, config, stats).await {
                                error!("tcp session with {} failed: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => error!("error accepting tcp connection: {}", e),
                },
                received = self.udp_socket.recv_from(&mut buf) => match received {
                    Ok((len, addr)) => {
                        let datagram = buf[..len].to_vec();
                        let config = self.config.clone();
                        let stats = self.stats.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_udp_request(&datagram, addr, config, stats).await {
                                error!("udp transfer to {} failed: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => error!("error receiving udp datagram: {}", e),
                },
            }
        }
    }
}

/// Binds a TCP listener on the first free port in `lo..=hi`.
pub async fn allocate_tcp_listener(lo: u16, hi: u16) -> Result<TcpListener> {
    for port in lo..=hi {
        match TcpListener::bind(("0.0.0.0", port)).await {
            Ok(listener) => return Ok(listener),
            Err(_) => continue,
        }
    }
    Err(Error::PortExhausted {
        proto: "tcp",
        lo,
        hi,
    })
}

/// Binds a UDP socket on the first free port in `lo..=hi`.
pub async fn allocate_udp_socket(lo: u16, hi: u16) -> Result<UdpSocket> {
    for port in lo..=hi {
        match UdpSocket::bind(("0.0.0.0", port)).await {
            Ok(socket) => return Ok(socket),
            Err(_) => continue,
        }
    }
    Err(Error::PortExhausted {
        proto: "udp",
        lo,
        hi,
    })
}

/// Serves one TCP transfer: reads the requested byte count, then streams
/// exactly that many synthetic bytes in bounded chunks.
///
/// A non-numeric request aborts the session with [`Error::InvalidRequest`];
/// a mid-stream send failure aborts it silently. The connection is closed on
/// every exit path when the stream is dropped.
async fn handle_tcp_session(
    mut stream: TcpStream,
    addr: SocketAddr,
    config: Config,
    stats: ServerStats,
) -> Result<()> {
    let size = read_request_line(&mut stream, addr).await?;
    debug!("{} requested {} bytes over tcp", addr, size);

    let chunk = vec![0u8; config.chunk_size];
    let mut sent = 0u64;
    while sent < size {
        let n = (size - sent).min(config.chunk_size as u64) as usize;
        if let Err(e) = stream.write_all(&chunk[..n]).await {
            debug!("tcp send to {} aborted after {} bytes: {}", addr, sent, e);
            stats.record_tcp(sent);
            return Ok(());
        }
        sent += n as u64;
    }

    // Ignore flush errors: the peer may close as soon as it has its bytes.
    let _ = stream.flush().await;
    stats.record_tcp(sent);
    info!("tcp transfer to {} complete: {} bytes", addr, sent);
    Ok(())
}

/// Reads the decimal ASCII byte count terminating in a line break.
async fn read_request_line(stream: &mut TcpStream, addr: SocketAddr) -> Result<u64> {
    let mut line = Vec::with_capacity(MAX_REQUEST_LINE);
    let mut byte = [0u8; 1];
    loop {
        let n = stream.read(&mut byte).await?;
        if n == 0 || byte[0] == b'\n' {
            break;
        }
        if line.len() >= MAX_REQUEST_LINE {
            return Err(Error::InvalidRequest(format!(
                "request line from {} exceeds {} bytes",
                addr, MAX_REQUEST_LINE
            )));
        }
        line.push(byte[0]);
    }

    let text = std::str::from_utf8(&line)
        .map_err(|_| Error::InvalidRequest(format!("non-UTF-8 request from {}", addr)))?;
    text.trim().parse::<u64>().map_err(|_| {
        Error::InvalidRequest(format!("non-numeric size {:?} from {}", text.trim(), addr))
    })
}

/// Serves one UDP transfer: validates the request datagram and sends the
/// requested size as header-tagged segments in bursts.
///
/// An invalid request is discarded without a reply. The server keeps no
/// per-transfer state and never retransmits.
async fn handle_udp_request(
    datagram: &[u8],
    addr: SocketAddr,
    config: Config,
    stats: ServerStats,
) -> Result<()> {
    let request = match Request::decode(datagram, config.magic_cookie) {
        Ok(request) => request,
        Err(e) => {
            debug!("discarding udp datagram from {}: {}", addr, e);
            return Ok(());
        }
    };

    let capacity = config.segment_capacity as u64;
    let total = total_segments(request.size, capacity);
    debug!(
        "{} requested {} bytes over udp ({} segments)",
        addr, request.size, total
    );

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    let payload = vec![0u8; config.segment_capacity];
    let mut bytes_sent = 0u64;
    let mut index = 0u64;
    while index < total {
        let burst_end = (index + config.burst_size as u64).min(total);
        while index < burst_end {
            let len = (request.size - index * capacity).min(capacity) as usize;
            let header = PayloadHeader {
                total_segments: total,
                segment_index: index,
            };
            let segment = header.encode_with(&payload[..len], config.magic_cookie);
            socket.send_to(&segment, addr).await?;
            bytes_sent += len as u64;
            index += 1;
        }
        if index < total {
            time::sleep(config.burst_pause).await;
        }
    }

    stats.record_udp(total, bytes_sent);
    info!(
        "udp transfer to {} complete: {} segments, {} bytes",
        addr, total, bytes_sent
    );
    Ok(())
}
