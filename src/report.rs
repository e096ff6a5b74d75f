//! Per-session transfer results and server-side counters.
//!
//! A session produces exactly one report when it reaches its terminal
//! condition, whether it completed fully or was cut short. Partial transfers
//! still yield a measured result computed from the bytes actually observed.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Throughput in bits per second from bytes observed over an elapsed time.
///
/// Returns 0.0 for a zero-length interval rather than dividing by zero.
pub fn bits_per_second(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        (bytes as f64 * 8.0) / secs
    } else {
        0.0
    }
}

/// Result of one TCP transfer session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpReport {
    /// Session number within the cycle, starting at 1.
    pub session: usize,
    pub requested_bytes: u64,
    pub bytes_received: u64,
    pub seconds: f64,
    pub bits_per_second: f64,
}

impl TcpReport {
    pub fn new(session: usize, requested_bytes: u64, bytes_received: u64, elapsed: Duration) -> Self {
        Self {
            session,
            requested_bytes,
            bytes_received,
            seconds: elapsed.as_secs_f64(),
            bits_per_second: bits_per_second(bytes_received, elapsed),
        }
    }
}

impl fmt::Display for TcpReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TCP transfer #{} finished: {} bytes in {:.2} seconds, speed {:.1} bits/second",
            self.session, self.bytes_received, self.seconds, self.bits_per_second
        )
    }
}

/// Result of one UDP transfer session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UdpReport {
    /// Session number within the cycle, starting at 1.
    pub session: usize,
    pub requested_bytes: u64,
    pub bytes_received: u64,
    pub segments_received: u64,
    pub total_segments: u64,
    pub seconds: f64,
    pub bits_per_second: f64,
    /// Distinct segments received over total segments, in percent [0, 100].
    pub completion_percent: f64,
}

impl UdpReport {
    pub fn new(
        session: usize,
        requested_bytes: u64,
        bytes_received: u64,
        segments_received: u64,
        total_segments: u64,
        elapsed: Duration,
    ) -> Self {
        let completion_percent = if total_segments > 0 {
            (segments_received as f64 / total_segments as f64) * 100.0
        } else {
            100.0
        };
        Self {
            session,
            requested_bytes,
            bytes_received,
            segments_received,
            total_segments,
            seconds: elapsed.as_secs_f64(),
            bits_per_second: bits_per_second(bytes_received, elapsed),
            completion_percent,
        }
    }
}

impl fmt::Display for UdpReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "UDP transfer #{} finished: {} bytes in {:.2} seconds, speed {:.1} bits/second, {:.0}% of segments received",
            self.session, self.bytes_received, self.seconds, self.bits_per_second, self.completion_percent
        )
    }
}

/// Unified session result consumed by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "protocol")]
pub enum SessionReport {
    Tcp(TcpReport),
    Udp(UdpReport),
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionReport::Tcp(r) => r.fmt(f),
            SessionReport::Udp(r) => r.fmt(f),
        }
    }
}

/// Snapshot of the counters a server has accumulated since startup.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub tcp_sessions: u64,
    pub udp_sessions: u64,
    pub bytes_sent: u64,
    pub segments_sent: u64,
}

#[derive(Default)]
struct StatsInner {
    snapshot: StatsSnapshot,
}

/// Thread-safe counters shared across server handler tasks.
///
/// Cloning is cheap; all clones share the same underlying counters.
#[derive(Clone, Default)]
pub struct ServerStats {
    inner: Arc<Mutex<StatsInner>>,
}

impl ServerStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one completed (possibly partial) TCP session.
    pub fn record_tcp(&self, bytes_sent: u64) {
        let mut inner = self.inner.lock();
        inner.snapshot.tcp_sessions += 1;
        inner.snapshot.bytes_sent += bytes_sent;
    }

    /// Records one completed UDP request.
    pub fn record_udp(&self, segments_sent: u64, bytes_sent: u64) {
        let mut inner = self.inner.lock();
        inner.snapshot.udp_sessions += 1;
        inner.snapshot.segments_sent += segments_sent;
        inner.snapshot.bytes_sent += bytes_sent;
    }

    /// Returns a copy of the current counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        self.inner.lock().snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_per_second() {
        assert_eq!(bits_per_second(1000, Duration::from_secs(1)), 8000.0);
        assert_eq!(bits_per_second(1000, Duration::ZERO), 0.0);
    }

    #[test]
    fn test_tcp_report_speed() {
        let report = TcpReport::new(1, 5000, 5000, Duration::from_millis(500));
        assert_eq!(report.bytes_received, 5000);
        assert!((report.bits_per_second - 80_000.0).abs() < 1e-6);
        assert!((report.seconds - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_udp_completion_bounds() {
        let full = UdpReport::new(1, 10 * 1024, 10 * 1024, 10, 10, Duration::from_secs(1));
        assert_eq!(full.completion_percent, 100.0);

        let half = UdpReport::new(1, 10 * 1024, 5 * 1024, 5, 10, Duration::from_secs(1));
        assert_eq!(half.completion_percent, 50.0);

        let none = UdpReport::new(1, 10 * 1024, 0, 0, 10, Duration::from_secs(1));
        assert_eq!(none.completion_percent, 0.0);
    }

    #[test]
    fn test_report_json_shape() {
        let report = SessionReport::Udp(UdpReport::new(2, 1025, 1025, 2, 2, Duration::from_secs(1)));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["protocol"], "Udp");
        assert_eq!(json["session"], 2);
        assert_eq!(json["total_segments"], 2);
    }

    #[test]
    fn test_server_stats_shared_across_clones() {
        let stats = ServerStats::new();
        let clone = stats.clone();

        stats.record_tcp(1000);
        clone.record_udp(4, 4096);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.tcp_sessions, 1);
        assert_eq!(snapshot.udp_sessions, 1);
        assert_eq!(snapshot.bytes_sent, 5096);
        assert_eq!(snapshot.segments_sent, 4);
    }
}
