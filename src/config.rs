use crate::wire::MAGIC_COOKIE;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::time::Duration;

/// Configuration for netblast servers and clients.
///
/// Every protocol constant (cookie, ports, segment size, burst parameters)
/// lives here and is passed into each component at construction rather than
/// read from global state. The defaults match the wire contract; override
/// them only when both ends agree.
///
/// # Examples
///
/// ## Server
///
/// ```
/// use netblast::Config;
///
/// let config = Config::server();
/// assert_eq!(config.discovery_port, 39457);
/// ```
///
/// ## Client requesting 1 MB over 4 TCP and 2 UDP sessions
///
/// ```
/// use netblast::Config;
///
/// let config = Config::client(1024 * 1024, 4, 2);
/// assert_eq!(config.tcp_sessions, 4);
/// assert_eq!(config.udp_sessions, 2);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Magic cookie prefixing every message.
    pub magic_cookie: u32,

    /// Well-known UDP port offers are broadcast to.
    pub discovery_port: u16,

    /// Address offers are sent to (the network broadcast address).
    pub broadcast_addr: Ipv4Addr,

    /// Interval between offer broadcasts.
    pub offer_interval: Duration,

    /// Capacity of one UDP payload segment in bytes.
    pub segment_capacity: usize,

    /// TCP send/receive chunk size in bytes (8 segment capacities).
    pub chunk_size: usize,

    /// Number of UDP segments sent back-to-back before pausing.
    pub burst_size: usize,

    /// Pause between segment bursts.
    pub burst_pause: Duration,

    /// UDP client per-receive timeout.
    pub recv_timeout: Duration,

    /// UDP client idle gap: time since the last received segment after
    /// which a transfer is considered over.
    pub idle_gap: Duration,

    /// Port range the server scans for free TCP/UDP ports at startup.
    pub port_range: (u16, u16),

    /// Transfer size in bytes requested by each client session.
    pub transfer_size: u64,

    /// Number of parallel TCP sessions per discovery cycle.
    pub tcp_sessions: usize,

    /// Number of parallel UDP sessions per discovery cycle.
    pub udp_sessions: usize,

    /// Output session reports as JSON instead of human-readable text.
    pub json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            magic_cookie: MAGIC_COOKIE,
            discovery_port: 39457,
            broadcast_addr: Ipv4Addr::BROADCAST,
            offer_interval: Duration::from_secs(1),
            segment_capacity: 1024,
            chunk_size: 8 * 1024,
            burst_size: 32,
            burst_pause: Duration::from_millis(1),
            recv_timeout: Duration::from_millis(300),
            idle_gap: Duration::from_millis(1500),
            port_range: (1025, 65535),
            transfer_size: 1024 * 1024,
            tcp_sessions: 1,
            udp_sessions: 1,
            json: false,
        }
    }
}

impl Config {
    /// Creates a server configuration with default protocol constants.
    pub fn server() -> Self {
        Self::default()
    }

    /// Creates a client configuration.
    ///
    /// # Arguments
    ///
    /// * `transfer_size` - Bytes requested by each session
    /// * `tcp_sessions` - Number of parallel TCP sessions
    /// * `udp_sessions` - Number of parallel UDP sessions
    pub fn client(transfer_size: u64, tcp_sessions: usize, udp_sessions: usize) -> Self {
        Self {
            transfer_size,
            tcp_sessions,
            udp_sessions,
            ..Default::default()
        }
    }

    /// Sets the discovery port offers are broadcast to and received on.
    pub fn with_discovery_port(mut self, port: u16) -> Self {
        self.discovery_port = port;
        self
    }

    /// Sets the address offers are broadcast to.
    pub fn with_broadcast_addr(mut self, addr: Ipv4Addr) -> Self {
        self.broadcast_addr = addr;
        self
    }

    /// Sets the interval between offer broadcasts.
    pub fn with_offer_interval(mut self, interval: Duration) -> Self {
        self.offer_interval = interval;
        self
    }

    /// Sets the port range the server scans at startup.
    pub fn with_port_range(mut self, lo: u16, hi: u16) -> Self {
        self.port_range = (lo, hi);
        self
    }

    /// Enables or disables JSON report output.
    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    /// Validates client parameters before any network action is attempted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the transfer size is zero or no sessions
    /// are configured.
    pub fn validate_client(&self) -> Result<()> {
        if self.transfer_size == 0 {
            return Err(Error::Config(
                "transfer size must be a positive number of bytes".to_string(),
            ));
        }
        if self.tcp_sessions == 0 && self.udp_sessions == 0 {
            return Err(Error::Config(
                "at least one TCP or UDP session is required".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_wire_contract() {
        let config = Config::default();
        assert_eq!(config.magic_cookie, 0xABCD_DCBA);
        assert_eq!(config.segment_capacity, 1024);
        assert_eq!(config.chunk_size, 8 * config.segment_capacity);
        assert_eq!(config.burst_size, 32);
        assert_eq!(config.burst_pause, Duration::from_millis(1));
        assert_eq!(config.offer_interval, Duration::from_secs(1));
        assert_eq!(config.recv_timeout, Duration::from_millis(300));
        assert_eq!(config.idle_gap, Duration::from_millis(1500));
    }

    #[test]
    fn test_builder() {
        let config = Config::client(5000, 2, 3)
            .with_discovery_port(40000)
            .with_broadcast_addr(Ipv4Addr::LOCALHOST)
            .with_json(true);

        assert_eq!(config.transfer_size, 5000);
        assert_eq!(config.tcp_sessions, 2);
        assert_eq!(config.udp_sessions, 3);
        assert_eq!(config.discovery_port, 40000);
        assert_eq!(config.broadcast_addr, Ipv4Addr::LOCALHOST);
        assert!(config.json);
    }

    #[test]
    fn test_zero_size_rejected() {
        let config = Config::client(0, 1, 1);
        assert!(config.validate_client().is_err());
    }

    #[test]
    fn test_zero_sessions_rejected() {
        let config = Config::client(1024, 0, 0);
        assert!(config.validate_client().is_err());
    }

    #[test]
    fn test_valid_client_config() {
        assert!(Config::client(1024, 1, 0).validate_client().is_ok());
        assert!(Config::client(1, 0, 1).validate_client().is_ok());
    }
}
