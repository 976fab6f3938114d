//! OAuth2 / OpenID Connect provider backed by RADIUS
//!
//! Users sign in with a username and password that are checked against an
//! ordered pool of RADIUS servers using PAP. An admitted login yields a
//! one-time authorization code that the relying party exchanges for signed
//! access and ID tokens.
//!
//! # Components
//!
//! - [`radius`]: host pool with failover and health checks, and the
//!   [`radius::Authenticator`] gateway built on it
//! - [`store`]: expiring one-time codes and rotating refresh tokens
//! - [`token`]: JWT issuance and verification, RS256 or HS256
//! - [`oauth`]: the authorization server itself
//! - [`http`]: axum routes over [`oauth::AuthorizationServer`]
//!
//! # Example
//!
//! ```rust,no_run
//! use radius_oidc::{
//!     AssignmentAttribute, AuthorizationServer, Config, HostPool, MemoryCredentialStore,
//!     RadiusGateway, TokenIssuer,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file("config.json")?;
//!
//!     let pool = Arc::new(HostPool::from_config(&config.radius)?);
//!     let assignment = AssignmentAttribute::from_config(&config.radius.assignment)?;
//!     let gateway = RadiusGateway::new(pool, assignment, false);
//!     let store = Arc::new(MemoryCredentialStore::new(config.oauth.max_entries));
//!     let issuer = Arc::new(TokenIssuer::new(
//!         config.signing.clone(),
//!         config.oauth.issuer.clone(),
//!         config.oauth.client_id.clone(),
//!     ));
//!
//!     let server = AuthorizationServer::new(
//!         config.oauth.clone(),
//!         Arc::new(gateway),
//!         store,
//!         issuer,
//!         config.radius.timeout(),
//!     );
//!     let app = radius_oidc::http::router(Arc::new(server));
//!
//!     let listener = tokio::net::TcpListener::bind(config.socket_addr()?).await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod http;
pub mod oauth;
pub mod radius;
pub mod store;
pub mod task;
pub mod token;

pub use config::{Config, ConfigError, OAuthConfig, RadiusConfig, SigningConfig};
pub use oauth::{AuthorizationServer, OAuthError, OAuthErrorCode};
pub use radius::{AssignmentAttribute, Authenticator, HostPool, RadiusGateway, RadiusOutcome};
pub use store::{start_sweeper, CredentialStore, MemoryCredentialStore, StoreError};
pub use task::BackgroundTask;
pub use token::{Claims, TokenError, TokenIssuer, TokenUse};
