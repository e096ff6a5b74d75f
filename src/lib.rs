//! netblast - network throughput benchmarking with broadcast discovery
//!
//! A server advertises itself on the local network and serves bulk data on
//! demand; a client discovers a server and measures transfer speed over a
//! configurable number of simultaneous TCP and UDP sessions.
//!
//! # Features
//!
//! - Zero-configuration discovery via periodic offer broadcasts
//! - TCP byte-stream transfers of a client-requested size
//! - UDP segmented-datagram transfers with packet-loss accounting
//! - Parallel sessions per discovery cycle, reported independently
//! - Asynchronous I/O using tokio

pub mod client;
pub mod config;
pub mod discovery;
pub mod error;
pub mod report;
pub mod server;
pub mod wire;

pub use client::Client;
pub use config::Config;
pub use error::{Error, Result};
pub use report::{SessionReport, TcpReport, UdpReport};
pub use server::Server;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
