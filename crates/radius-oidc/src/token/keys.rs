//! Signing key material: RSA (RS256) or shared secret (HS256)

use super::TokenError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rsa::rand_core::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Size of generated RSA keys
pub const RSA_KEY_BITS: usize = 2048;

/// Public RSA key in JWK form (RFC 7517)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonWebKey {
    pub kty: String,
    #[serde(rename = "use")]
    pub key_use: String,
    pub alg: String,
    pub kid: String,
    pub n: String,
    pub e: String,
}

/// JWKS document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<JsonWebKey>,
}

pub struct SigningKey {
    pub algorithm: Algorithm,
    /// Present for asymmetric keys
    pub kid: Option<String>,
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    public_jwk: Option<JsonWebKey>,
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("algorithm", &self.algorithm)
            .field("kid", &self.kid)
            .field("encoding", &"<EncodingKey>")
            .field("decoding", &"<DecodingKey>")
            .finish()
    }
}

impl SigningKey {
    pub fn shared_secret(secret: &[u8]) -> Self {
        SigningKey {
            algorithm: Algorithm::HS256,
            kid: None,
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            public_jwk: None,
        }
    }

    pub fn from_rsa(private: &RsaPrivateKey) -> Result<Self, TokenError> {
        let der = private
            .to_pkcs1_der()
            .map_err(|e| TokenError::Key(format!("Could not encode RSA key: {}", e)))?;
        let encoding = EncodingKey::from_rsa_der(der.as_bytes());

        let public = private.to_public_key();
        let n = URL_SAFE_NO_PAD.encode(public.n().to_bytes_be());
        let e = URL_SAFE_NO_PAD.encode(public.e().to_bytes_be());
        let decoding = DecodingKey::from_rsa_components(&n, &e)?;
        let kid = jwk_thumbprint(&n, &e);

        Ok(SigningKey {
            algorithm: Algorithm::RS256,
            kid: Some(kid.clone()),
            encoding,
            decoding,
            public_jwk: Some(JsonWebKey {
                kty: "RSA".to_string(),
                key_use: "sig".to_string(),
                alg: "RS256".to_string(),
                kid,
                n,
                e,
            }),
        })
    }

    /// Load the PKCS#8 PEM key at `path`, generating and persisting one if
    /// the file does not exist. Runs on the blocking pool.
    pub async fn load_or_generate_rsa(path: &Path) -> Result<Self, TokenError> {
        let path: PathBuf = path.to_path_buf();
        let private = tokio::task::spawn_blocking(move || load_or_generate(&path)).await??;
        Self::from_rsa(&private)
    }

    /// Published key set; empty for shared-secret keys
    pub fn jwks(&self) -> JwkSet {
        JwkSet {
            keys: self.public_jwk.iter().cloned().collect(),
        }
    }
}

fn load_or_generate(path: &Path) -> Result<RsaPrivateKey, TokenError> {
    if path.exists() {
        let pem = fs::read_to_string(path)?;
        let key = RsaPrivateKey::from_pkcs8_pem(&pem).map_err(|e| {
            TokenError::Key(format!("Invalid RSA key in {}: {}", path.display(), e))
        })?;
        info!(path = %path.display(), "Loaded RSA signing key");
        return Ok(key);
    }

    warn!(path = %path.display(), bits = RSA_KEY_BITS, "No signing key found, generating one");
    let key = RsaPrivateKey::new(&mut OsRng, RSA_KEY_BITS)
        .map_err(|e| TokenError::Key(format!("RSA key generation failed: {}", e)))?;
    let pem = key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| TokenError::Key(format!("Could not encode RSA key: {}", e)))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    write_private(path, pem.as_bytes())?;
    info!(path = %path.display(), "Persisted new RSA signing key");
    Ok(key)
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents)
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    fs::write(path, contents)
}

/// RFC 7638 SHA-256 thumbprint of an RSA public key
pub fn jwk_thumbprint(n: &str, e: &str) -> String {
    // Required members in lexicographic order, no whitespace
    let canonical = format!(r#"{{"e":"{}","kty":"RSA","n":"{}"}}"#, e, n);
    URL_SAFE_NO_PAD.encode(Sha256::digest(canonical.as_bytes()))
}
