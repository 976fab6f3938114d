//! RADIUS side of the bridge: host pool, failover and the authentication
//! gateway

pub mod assignment;
pub mod error;
pub mod gateway;
pub mod host;
pub mod pool;
pub mod transport;

pub use assignment::AssignmentAttribute;
pub use error::{RadiusError, RadiusResult};
pub use gateway::{Authenticator, RadiusGateway, RadiusOutcome};
pub use host::{HostHealth, HostSnapshot, RadiusHost};
pub use pool::{HostPool, ProbeSettings};
