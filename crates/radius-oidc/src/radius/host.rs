//! Upstream RADIUS host state and statistics

use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// Last known health of a host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HostHealth {
    /// Not probed yet
    Unknown,
    Healthy,
    Unhealthy,
}

impl HostHealth {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => HostHealth::Healthy,
            2 => HostHealth::Unhealthy,
            _ => HostHealth::Unknown,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            HostHealth::Unknown => 0,
            HostHealth::Healthy => 1,
            HostHealth::Unhealthy => 2,
        }
    }
}

/// Host statistics
#[derive(Debug, Default)]
pub struct HostStats {
    /// Total requests sent to this host
    pub requests_sent: AtomicU64,
    /// Total replies received from this host
    pub responses_received: AtomicU64,
    /// Total requests that went unanswered
    pub timeouts: AtomicU64,
}

impl HostStats {
    pub fn record_request(&self) {
        self.requests_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_response(&self) {
        self.responses_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }
}

/// One configured RADIUS host. Identity is its address; position in the
/// pool is its priority (0 = preferred).
#[derive(Debug)]
pub struct RadiusHost {
    pub address: SocketAddr,
    pub priority: usize,
    health: AtomicU8,
    stats: HostStats,
}

impl RadiusHost {
    pub fn new(address: SocketAddr, priority: usize) -> Self {
        RadiusHost {
            address,
            priority,
            health: AtomicU8::new(HostHealth::Unknown.as_u8()),
            stats: HostStats::default(),
        }
    }

    pub fn health(&self) -> HostHealth {
        HostHealth::from_u8(self.health.load(Ordering::Acquire))
    }

    pub fn set_health(&self, health: HostHealth) {
        self.health.store(health.as_u8(), Ordering::Release);
    }

    pub fn stats(&self) -> &HostStats {
        &self.stats
    }

    pub fn snapshot(&self, active: bool) -> HostSnapshot {
        HostSnapshot {
            address: self.address,
            priority: self.priority,
            active,
            health: self.health(),
            requests_sent: self.stats.requests_sent.load(Ordering::Relaxed),
            responses_received: self.stats.responses_received.load(Ordering::Relaxed),
            timeouts: self.stats.timeouts.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of a host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostSnapshot {
    pub address: SocketAddr,
    pub priority: usize,
    pub active: bool,
    pub health: HostHealth,
    pub requests_sent: u64,
    pub responses_received: u64,
    pub timeouts: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_host_is_unknown() {
        let host = RadiusHost::new("10.0.0.1:1812".parse().unwrap(), 0);
        assert_eq!(host.health(), HostHealth::Unknown);
        host.set_health(HostHealth::Unhealthy);
        assert_eq!(host.health(), HostHealth::Unhealthy);
    }

    #[test]
    fn test_snapshot_reflects_counters() {
        let host = RadiusHost::new("10.0.0.1:1812".parse().unwrap(), 1);
        host.stats().record_request();
        host.stats().record_request();
        host.stats().record_response();
        host.stats().record_timeout();

        let snap = host.snapshot(true);
        assert!(snap.active);
        assert_eq!(snap.priority, 1);
        assert_eq!(snap.requests_sent, 2);
        assert_eq!(snap.responses_received, 1);
        assert_eq!(snap.timeouts, 1);
    }
}
