//! Server discovery: periodic offer broadcasts and the matching listener.
//!
//! The server side ([`Broadcaster`]) advertises its allocated port pair to
//! the network broadcast address once per interval, forever, with no
//! acknowledgment. The client side ([`Listener`]) binds the well-known
//! discovery port and blocks until the first datagram that decodes as a
//! valid offer; everything else is logged and discarded.

use crate::config::Config;
use crate::wire::Offer;
use crate::Result;
use log::{debug, info, warn};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time;

/// Periodically broadcasts one fixed offer message.
///
/// The offer is encoded once at construction; the advertised ports are fixed
/// for the process lifetime.
pub struct Broadcaster {
    socket: UdpSocket,
    offer: [u8; Offer::SIZE],
    target: SocketAddr,
    interval: Duration,
}

impl Broadcaster {
    /// Creates a broadcaster advertising the given port pair.
    pub async fn new(config: &Config, udp_port: u16, tcp_port: u16) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.set_broadcast(true)?;

        let offer = Offer { udp_port, tcp_port }.encode(config.magic_cookie);
        let target = SocketAddr::new(IpAddr::V4(config.broadcast_addr), config.discovery_port);

        Ok(Self {
            socket,
            offer,
            target,
            interval: config.offer_interval,
        })
    }

    /// Broadcasts the offer once per interval, forever.
    ///
    /// A failed send is logged and the loop continues; there is no backoff
    /// and no other recovery.
    pub async fn run(self) {
        info!("broadcasting offers to {}", self.target);
        loop {
            if let Err(e) = self.socket.send_to(&self.offer, self.target).await {
                warn!("offer broadcast to {} failed: {}", self.target, e);
            }
            time::sleep(self.interval).await;
        }
    }
}

/// Waits for offer broadcasts on the well-known discovery port.
pub struct Listener {
    socket: UdpSocket,
    cookie: u32,
}

impl Listener {
    /// Binds the discovery port.
    pub async fn bind(config: &Config) -> Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", config.discovery_port)).await?;
        Ok(Self {
            socket,
            cookie: config.magic_cookie,
        })
    }

    /// The locally bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Blocks until a valid offer arrives and returns the sender's IP plus
    /// the advertised ports.
    ///
    /// Datagrams with the wrong cookie, wrong type, or a truncated header
    /// are logged and discarded; the wait has no timeout.
    pub async fn wait_for_offer(&self) -> Result<(IpAddr, Offer)> {
        let mut buf = [0u8; 64];
        loop {
            let (len, from) = self.socket.recv_from(&mut buf).await?;
            match Offer::decode(&buf[..len], self.cookie) {
                Ok(offer) => {
                    info!(
                        "received offer from {} (udp port {}, tcp port {})",
                        from.ip(),
                        offer.udp_port,
                        offer.tcp_port
                    );
                    return Ok((from.ip(), offer));
                }
                Err(e) => {
                    debug!("discarding datagram from {}: {}", from, e);
                }
            }
        }
    }
}
