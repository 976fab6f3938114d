//! Proof Key for Code Exchange (RFC 7636)

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PkceMethod {
    Plain,
    S256,
}

impl PkceMethod {
    /// Parse `code_challenge_method`; absent means `plain` (RFC 7636 4.3)
    pub fn parse(method: Option<&str>) -> Option<Self> {
        match method {
            None | Some("plain") => Some(PkceMethod::Plain),
            Some("S256") => Some(PkceMethod::S256),
            Some(_) => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PkceMethod::Plain => "plain",
            PkceMethod::S256 => "S256",
        }
    }
}

/// BASE64URL(SHA256(verifier))
pub fn s256_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Whether `verifier` matches the stored challenge under `method`
pub fn verify(verifier: &str, challenge: &str, method: PkceMethod) -> bool {
    let computed = match method {
        PkceMethod::Plain => verifier.to_string(),
        PkceMethod::S256 => s256_challenge(verifier),
    };
    bool::from(computed.as_bytes().ct_eq(challenge.as_bytes()))
}
