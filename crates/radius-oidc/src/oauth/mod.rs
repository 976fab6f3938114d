//! OAuth2 authorization-code flow with OpenID Connect extensions

pub mod error;
pub mod pkce;
pub mod policy;
pub mod server;

pub use error::{OAuthError, OAuthErrorCode};
pub use pkce::PkceMethod;
pub use policy::{split_groups, ClassPolicy};
pub use server::{
    AuthorizationServer, AuthorizeOutcome, AuthorizeRequest, ClientCredentials, TokenRequest,
    TokenResponse, UserEmail, UserInfo, ValidatedAuthorization,
};
