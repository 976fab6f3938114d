//! Ordered RADIUS host pool with a single active host
//!
//! Every login goes to the active host. When it stops answering the pool
//! fails over to the next responsive host in configured order, falling back
//! to the first host when nothing responds. A periodic health check probes
//! all hosts and moves the active pointer back to the most preferred healthy
//! one.

use super::error::{RadiusError, RadiusResult};
use super::host::{HostHealth, HostSnapshot, RadiusHost};
use super::transport::exchange;
use crate::config::{ConfigError, RadiusConfig};
use crate::task::BackgroundTask;
use radius_proto::{AccessRequest, AccessResponse, RejectReason};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Credentials and timeout used by health probes
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub username: String,
    pub password: String,
    pub timeout: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        ProbeSettings {
            username: "radius-oidc-healthcheck".to_string(),
            password: "healthcheck".to_string(),
            timeout: Duration::from_secs(2),
        }
    }
}

pub struct HostPool {
    hosts: Vec<RadiusHost>,
    active: AtomicUsize,
    /// Serializes failover and health-check promotion
    failover_lock: Mutex<()>,
    secret: Vec<u8>,
    nas_ip: Ipv4Addr,
    probe: ProbeSettings,
}

impl HostPool {
    pub fn new(
        addresses: Vec<SocketAddr>,
        secret: impl Into<Vec<u8>>,
        nas_ip: Ipv4Addr,
        probe: ProbeSettings,
    ) -> RadiusResult<Self> {
        if addresses.is_empty() {
            return Err(RadiusError::NoHosts);
        }

        let hosts = addresses
            .into_iter()
            .enumerate()
            .map(|(priority, address)| RadiusHost::new(address, priority))
            .collect();

        Ok(HostPool {
            hosts,
            active: AtomicUsize::new(0),
            failover_lock: Mutex::new(()),
            secret: secret.into(),
            nas_ip,
            probe,
        })
    }

    pub fn from_config(config: &RadiusConfig) -> Result<Self, ConfigError> {
        let probe = ProbeSettings {
            username: config.health_check.username.clone(),
            password: config.health_check.password.clone(),
            timeout: Duration::from_secs(config.health_check.timeout),
        };
        Self::new(
            config.host_addrs()?,
            config.secret.as_bytes(),
            config.nas_ip,
            probe,
        )
        .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn hosts(&self) -> &[RadiusHost] {
        &self.hosts
    }

    pub fn secret(&self) -> &[u8] {
        &self.secret
    }

    pub fn nas_ip(&self) -> Ipv4Addr {
        self.nas_ip
    }

    pub fn active_index(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub fn active_host(&self) -> &RadiusHost {
        &self.hosts[self.active_index()]
    }

    /// Per-host counters and health, in priority order
    pub fn snapshot(&self) -> Vec<HostSnapshot> {
        let active = self.active_index();
        self.hosts
            .iter()
            .enumerate()
            .map(|(index, host)| host.snapshot(index == active))
            .collect()
    }

    /// Send `request` to the active host and return its reply datagram.
    ///
    /// On a transport failure the failover runs to completion before the
    /// error is returned; the failing request is not retried. The failover
    /// runs on its own task so it still completes if the caller gives up
    /// waiting.
    pub async fn send_to_active(
        self: &Arc<Self>,
        request: &AccessRequest,
        timeout: Duration,
    ) -> RadiusResult<Vec<u8>> {
        let index = self.active_index();
        let host = &self.hosts[index];
        host.stats().record_request();

        match exchange(host.address, request, timeout).await {
            Ok(reply) => {
                host.stats().record_response();
                Ok(reply)
            }
            Err(e) => {
                if matches!(e, RadiusError::Timeout(_)) {
                    host.stats().record_timeout();
                }
                if e.is_transport_failure() {
                    warn!(host = %host.address, error = %e, "RADIUS host failed, starting failover");
                    let pool = Arc::clone(self);
                    let failover = tokio::spawn(async move { pool.failover(index).await });
                    if let Err(join_err) = failover.await {
                        warn!(error = %join_err, "Failover task did not complete");
                    }
                }
                Err(e)
            }
        }
    }

    /// Move the active pointer off `failed`.
    ///
    /// Hosts are tried in priority order, skipping `failed`; a host the last
    /// probe found healthy is taken without probing again. If nothing
    /// responds the first host becomes active. A failover for a host that is
    /// no longer active is a no-op.
    pub async fn failover(&self, failed: usize) {
        let _guard = self.failover_lock.lock().await;
        if self.active_index() != failed {
            debug!(failed, active = self.active_index(), "Failover already handled");
            return;
        }

        self.hosts[failed].set_health(HostHealth::Unhealthy);

        let mut next = None;
        for (index, host) in self.hosts.iter().enumerate() {
            if index == failed {
                continue;
            }
            if host.health() == HostHealth::Healthy || self.probe(index).await == HostHealth::Healthy
            {
                next = Some(index);
                break;
            }
        }

        let next = next.unwrap_or_else(|| {
            warn!("No RADIUS host responded during failover, falling back to the first host");
            0
        });
        self.set_active(next, "failover");
    }

    /// Probe every host concurrently, then make the most preferred healthy
    /// host active (or the first host if none is healthy).
    pub async fn run_health_check(self: &Arc<Self>) {
        let mut probes = JoinSet::new();
        for index in 0..self.hosts.len() {
            let pool = Arc::clone(self);
            probes.spawn(async move { pool.probe(index).await });
        }
        while probes.join_next().await.is_some() {}

        let _guard = self.failover_lock.lock().await;
        let preferred = self
            .hosts
            .iter()
            .position(|host| host.health() == HostHealth::Healthy)
            .unwrap_or(0);
        self.set_active(preferred, "health check");
    }

    /// Send the dummy Access-Request to one host and record the result.
    ///
    /// Any verified Accept, Reject or Challenge means the host is alive; a
    /// reply that fails verification means the secret does not match and
    /// counts as unhealthy.
    pub async fn probe(&self, index: usize) -> HostHealth {
        let host = &self.hosts[index];

        let health = match AccessRequest::pap(
            &self.probe.username,
            self.probe.password.as_bytes(),
            self.nas_ip,
            &self.secret,
        ) {
            Ok(request) => {
                host.stats().record_request();
                match exchange(host.address, &request, self.probe.timeout).await {
                    Ok(reply) => {
                        host.stats().record_response();
                        match request.classify(&reply, &self.secret, false) {
                            Ok(AccessResponse::Accept(_))
                            | Ok(AccessResponse::Reject(
                                RejectReason::AccessReject | RejectReason::Challenge,
                            )) => HostHealth::Healthy,
                            Ok(AccessResponse::Reject(reason)) => {
                                warn!(host = %host.address, ?reason, "Probe reply failed verification");
                                HostHealth::Unhealthy
                            }
                            Err(e) => {
                                warn!(host = %host.address, error = %e, "Malformed probe reply");
                                HostHealth::Unhealthy
                            }
                        }
                    }
                    Err(e) => {
                        if matches!(e, RadiusError::Timeout(_)) {
                            host.stats().record_timeout();
                        }
                        debug!(host = %host.address, error = %e, "Probe failed");
                        HostHealth::Unhealthy
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Could not build probe request");
                HostHealth::Unhealthy
            }
        };

        let previous = host.health();
        host.set_health(health);
        if previous != health {
            info!(host = %host.address, ?previous, current = ?health, "RADIUS host health changed");
        }
        health
    }

    /// Run [`HostPool::run_health_check`] every `interval`
    pub fn start_health_checker(self: &Arc<Self>, interval: Duration) -> BackgroundTask {
        let pool = Arc::clone(self);
        info!(
            hosts = self.hosts.len(),
            interval_secs = interval.as_secs(),
            "Starting RADIUS health checker"
        );
        BackgroundTask::spawn_periodic("radius-health-check", interval, move || {
            let pool = Arc::clone(&pool);
            async move { pool.run_health_check().await }
        })
    }

    fn set_active(&self, index: usize, reason: &'static str) {
        let previous = self.active.swap(index, Ordering::AcqRel);
        if previous != index {
            info!(
                from = %self.hosts[previous].address,
                to = %self.hosts[index].address,
                reason,
                hosts = ?self.snapshot(),
                "Active RADIUS host changed"
            );
        }
    }
}
