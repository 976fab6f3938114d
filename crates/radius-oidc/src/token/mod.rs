//! JWT issuance and verification
//!
//! The signing key is resolved once per process, on first use or at
//! startup through [`TokenIssuer::init`]. RSA keys are loaded from disk, or
//! generated and written there, so tokens stay verifiable across restarts.

pub mod keys;

pub use keys::{JsonWebKey, JwkSet, SigningKey};

use crate::config::SigningConfig;
use jsonwebtoken::{decode, encode, Algorithm, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::debug;

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Key error: {0}")]
    Key(String),
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("Key task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Which of the two issued tokens a set of claims belongs to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenUse {
    #[default]
    Access,
    Id,
}

/// Claims carried by access and ID tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub iss: String,
    pub aud: String,
    pub scope: String,
    pub iat: i64,
    pub exp: i64,
    /// Echoed from the authorization request into ID tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(default)]
    pub token_use: TokenUse,
}

impl Claims {
    /// Claims for `username` with the email synthesized from `email_suffix`.
    /// Issuer, audience and timestamps are filled in by [`TokenIssuer::sign`].
    pub fn for_user(
        username: &str,
        groups: Vec<String>,
        role: Option<String>,
        scope: &str,
        email_suffix: &str,
    ) -> Self {
        Claims {
            sub: username.to_string(),
            name: username.to_string(),
            email: synthesize_email(username, email_suffix),
            groups,
            role,
            iss: String::new(),
            aud: String::new(),
            scope: scope.to_string(),
            iat: 0,
            exp: 0,
            nonce: None,
            token_use: TokenUse::Access,
        }
    }
}

/// `user@suffix`, unless the username already is an address
pub fn synthesize_email(username: &str, suffix: &str) -> String {
    if username.contains('@') {
        return username.to_string();
    }
    format!("{}@{}", username, suffix.trim_start_matches('@'))
}

pub struct TokenIssuer {
    signing: SigningConfig,
    key: OnceCell<SigningKey>,
    issuer: String,
    audience: String,
}

impl TokenIssuer {
    pub fn new(signing: SigningConfig, issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        TokenIssuer {
            signing,
            key: OnceCell::new(),
            issuer: issuer.into(),
            audience: audience.into(),
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Algorithm tokens are signed with; known without loading the key
    pub fn algorithm(&self) -> Algorithm {
        match self.signing {
            SigningConfig::Rsa { .. } => Algorithm::RS256,
            SigningConfig::SharedSecret { .. } => Algorithm::HS256,
        }
    }

    /// Load or generate the signing key now instead of on first use
    pub async fn init(&self) -> Result<(), TokenError> {
        self.key().await.map(|_| ())
    }

    async fn key(&self) -> Result<&SigningKey, TokenError> {
        self.key
            .get_or_try_init(|| async {
                match &self.signing {
                    SigningConfig::Rsa { key_path } => SigningKey::load_or_generate_rsa(key_path).await,
                    SigningConfig::SharedSecret { secret } => {
                        Ok(SigningKey::shared_secret(secret.as_bytes()))
                    }
                }
            })
            .await
    }

    /// Stamp issuer, audience and lifetime onto `claims` and sign them
    pub async fn sign(&self, mut claims: Claims, ttl: Duration) -> Result<String, TokenError> {
        let now = chrono::Utc::now().timestamp();
        claims.iss = self.issuer.clone();
        claims.aud = self.audience.clone();
        claims.iat = now;
        claims.exp = now + ttl.as_secs() as i64;
        self.sign_claims(&claims).await
    }

    /// Sign `claims` exactly as given
    pub async fn sign_claims(&self, claims: &Claims) -> Result<String, TokenError> {
        let key = self.key().await?;
        let mut header = Header::new(key.algorithm);
        header.kid = key.kid.clone();
        Ok(encode(&header, claims, &key.encoding)?)
    }

    /// Check signature, expiry, issuer, audience and required claims
    pub async fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let key = self.key().await?;

        let mut validation = Validation::new(key.algorithm);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "iat", "iss", "aud", "sub"]);

        decode::<Claims>(token, &key.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!(error = %e, "Token verification failed");
                TokenError::Jwt(e)
            })
    }

    /// Public keys for `/.well-known/jwks.json`
    pub async fn jwks(&self) -> Result<JwkSet, TokenError> {
        Ok(self.key().await?.jwks())
    }
}
