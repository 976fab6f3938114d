//! Username/password authentication against the RADIUS host pool

use super::assignment::AssignmentAttribute;
use super::error::RadiusError;
use super::pool::HostPool;
use async_trait::async_trait;
use radius_proto::{AccessRequest, AccessResponse};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of one authentication attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadiusOutcome {
    /// Verified Access-Accept, with the assignment attribute if present
    Accepted { attribute_value: Option<String> },
    Rejected,
    Timeout,
    NetworkError,
}

/// Something that can check a username and password
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Authenticate once. `timeout` is a hard upper bound on the whole call,
    /// including any failover it triggers.
    async fn authenticate(&self, username: &str, password: &str, timeout: Duration)
        -> RadiusOutcome;
}

/// [`Authenticator`] backed by a [`HostPool`]
pub struct RadiusGateway {
    pool: Arc<HostPool>,
    assignment: AssignmentAttribute,
    require_message_authenticator: bool,
}

impl RadiusGateway {
    pub fn new(
        pool: Arc<HostPool>,
        assignment: AssignmentAttribute,
        require_message_authenticator: bool,
    ) -> Self {
        RadiusGateway {
            pool,
            assignment,
            require_message_authenticator,
        }
    }

    pub fn pool(&self) -> &Arc<HostPool> {
        &self.pool
    }
}

#[async_trait]
impl Authenticator for RadiusGateway {
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
        timeout: Duration,
    ) -> RadiusOutcome {
        let secret = self.pool.secret();
        let request =
            match AccessRequest::pap(username, password.as_bytes(), self.pool.nas_ip(), secret) {
                Ok(request) => request,
                Err(e) => {
                    warn!(username, error = %e, "Could not build Access-Request");
                    return RadiusOutcome::Rejected;
                }
            };

        // A failover started by this attempt keeps running on its own task
        // if the deadline cuts the wait short.
        let attempt = self.pool.send_to_active(&request, timeout);
        let reply = match tokio::time::timeout(timeout, attempt).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(RadiusError::Timeout(host))) => {
                warn!(username, host = %host, "RADIUS request timed out");
                return RadiusOutcome::Timeout;
            }
            Err(_) => {
                warn!(username, timeout = ?timeout, "RADIUS request exceeded its deadline");
                return RadiusOutcome::Timeout;
            }
            Ok(Err(e)) => {
                warn!(username, error = %e, "RADIUS request failed");
                return RadiusOutcome::NetworkError;
            }
        };

        match request.classify(&reply, secret, self.require_message_authenticator) {
            Ok(AccessResponse::Accept(packet)) => {
                let attribute_value = self.assignment.extract(&packet);
                info!(username, classes = ?attribute_value, "RADIUS accepted user");
                RadiusOutcome::Accepted { attribute_value }
            }
            Ok(AccessResponse::Reject(reason)) => {
                debug!(username, ?reason, "RADIUS rejected user");
                RadiusOutcome::Rejected
            }
            Err(e) => {
                warn!(username, error = %e, "Malformed RADIUS reply");
                RadiusOutcome::NetworkError
            }
        }
    }
}
