//! OAuth2 error responses (RFC 6749 Section 5.2)

use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OAuthErrorCode {
    InvalidRequest,
    UnauthorizedClient,
    InvalidClient,
    InvalidGrant,
    UnsupportedGrantType,
    InvalidToken,
    /// Login refused; only ever sent back to the login page
    AccessDenied,
    /// Authentication backend unavailable
    TemporarilyUnavailable,
    ServerError,
}

impl OAuthErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            OAuthErrorCode::InvalidRequest => "invalid_request",
            OAuthErrorCode::UnauthorizedClient => "unauthorized_client",
            OAuthErrorCode::InvalidClient => "invalid_client",
            OAuthErrorCode::InvalidGrant => "invalid_grant",
            OAuthErrorCode::UnsupportedGrantType => "unsupported_grant_type",
            OAuthErrorCode::InvalidToken => "invalid_token",
            OAuthErrorCode::AccessDenied => "access_denied",
            OAuthErrorCode::TemporarilyUnavailable => "temporarily_unavailable",
            OAuthErrorCode::ServerError => "server_error",
        }
    }

    /// HTTP status for a JSON error response
    pub fn status(self) -> u16 {
        match self {
            OAuthErrorCode::InvalidRequest
            | OAuthErrorCode::InvalidGrant
            | OAuthErrorCode::UnsupportedGrantType => 400,
            OAuthErrorCode::UnauthorizedClient
            | OAuthErrorCode::InvalidClient
            | OAuthErrorCode::InvalidToken => 401,
            OAuthErrorCode::AccessDenied => 403,
            OAuthErrorCode::TemporarilyUnavailable => 503,
            OAuthErrorCode::ServerError => 500,
        }
    }
}

impl fmt::Display for OAuthErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error reported to the OAuth client
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{error}")]
pub struct OAuthError {
    pub error: OAuthErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl OAuthError {
    pub fn new(error: OAuthErrorCode) -> Self {
        OAuthError {
            error,
            error_description: None,
        }
    }

    pub fn with_description(error: OAuthErrorCode, description: impl Into<String>) -> Self {
        OAuthError {
            error,
            error_description: Some(description.into()),
        }
    }

    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::with_description(OAuthErrorCode::InvalidRequest, description)
    }

    pub fn invalid_client() -> Self {
        Self::new(OAuthErrorCode::InvalidClient)
    }

    pub fn invalid_grant() -> Self {
        Self::new(OAuthErrorCode::InvalidGrant)
    }

    pub fn invalid_token() -> Self {
        Self::new(OAuthErrorCode::InvalidToken)
    }

    pub fn status(&self) -> u16 {
        self.error.status()
    }
}
