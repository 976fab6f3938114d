use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Health probe settings for the RADIUS host pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Seconds between probe rounds
    #[serde(default = "default_health_interval")]
    pub interval: u64,
    /// Per-probe timeout in seconds
    #[serde(default = "default_health_timeout")]
    pub timeout: u64,
    /// Dummy credentials sent by probes; any verified reply counts as alive
    #[serde(default = "default_probe_username")]
    pub username: String,
    #[serde(default = "default_probe_password")]
    pub password: String,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        HealthCheckConfig {
            enabled: default_enabled(),
            interval: default_health_interval(),
            timeout: default_health_timeout(),
            username: default_probe_username(),
            password: default_probe_password(),
        }
    }
}

/// Which reply attribute carries the user's classes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssignmentConfig {
    /// A standard attribute, Class (25) by default
    Standard {
        #[serde(default = "default_assignment_attribute")]
        attribute_type: u8,
    },
    /// A Vendor-Specific sub-attribute, optionally narrowed with a regex.
    /// When the pattern has a capture group, group 1 is the value.
    VendorSpecific {
        vendor_id: u32,
        vendor_type: u8,
        #[serde(default)]
        pattern: Option<String>,
    },
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        AssignmentConfig::Standard {
            attribute_type: default_assignment_attribute(),
        }
    }
}

/// Upstream RADIUS settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadiusConfig {
    /// Hosts in failover priority order: "10.0.0.1" or "10.0.0.1:1812"
    pub hosts: Vec<String>,

    /// Port used for hosts given without one
    #[serde(default = "default_radius_port")]
    pub port: u16,

    pub secret: String,

    /// Sent as NAS-IP-Address
    #[serde(default = "default_nas_ip")]
    pub nas_ip: Ipv4Addr,

    /// Login timeout in seconds
    #[serde(default = "default_radius_timeout")]
    pub timeout: u64,

    /// Treat an Access-Accept without Message-Authenticator as a reject
    #[serde(default)]
    pub require_message_authenticator: bool,

    #[serde(default)]
    pub health_check: HealthCheckConfig,

    #[serde(default)]
    pub assignment: AssignmentConfig,
}

impl RadiusConfig {
    /// Resolve the configured hosts to socket addresses, in order
    pub fn host_addrs(&self) -> Result<Vec<SocketAddr>, ConfigError> {
        self.hosts
            .iter()
            .map(|host| {
                if let Ok(addr) = host.parse::<SocketAddr>() {
                    return Ok(addr);
                }
                if let Ok(ip) = host.parse::<IpAddr>() {
                    return Ok(SocketAddr::new(ip, self.port));
                }
                Err(ConfigError::Invalid(format!("Invalid RADIUS host: {}", host)))
            })
            .collect()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

/// OAuth2 client and token policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,

    /// Issuer URL, also the base of the advertised endpoints
    pub issuer: String,

    /// Exact-match allow-list; empty means same origin as the request
    #[serde(default)]
    pub redirect_uris: Vec<String>,

    /// Seconds
    #[serde(default = "default_code_ttl")]
    pub code_ttl: u64,
    #[serde(default = "default_access_token_ttl")]
    pub access_token_ttl: u64,
    #[serde(default = "default_refresh_token_ttl")]
    pub refresh_token_ttl: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: u64,

    /// Upper bound on live codes and on live refresh tokens (0 = unlimited)
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Classes allowed to log in; empty admits every authenticated user
    #[serde(default)]
    pub permitted_classes: Vec<String>,

    /// Classes that receive `admin_role`
    #[serde(default)]
    pub admin_classes: Vec<String>,

    #[serde(default = "default_admin_role")]
    pub admin_role: String,

    /// Domain appended to the username to form the email claim
    #[serde(default = "default_email_suffix")]
    pub email_suffix: String,

    #[serde(default = "default_scope")]
    pub default_scope: String,

    /// Take the request origin from `X-Forwarded-Host`/`X-Forwarded-Proto`.
    /// Only enable behind a proxy that overwrites both headers.
    #[serde(default)]
    pub trust_forwarded_headers: bool,
}

impl OAuthConfig {
    pub fn code_ttl(&self) -> Duration {
        Duration::from_secs(self.code_ttl)
    }

    pub fn access_token_ttl(&self) -> Duration {
        Duration::from_secs(self.access_token_ttl)
    }

    pub fn refresh_token_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_token_ttl)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval)
    }
}

/// Token signing key selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SigningConfig {
    /// RS256 with a PKCS#8 PEM key, generated on first use if missing
    Rsa {
        #[serde(default = "default_key_path")]
        key_path: PathBuf,
    },
    /// HS256 with a shared secret; no JWKS is published
    SharedSecret { secret: String },
}

impl Default for SigningConfig {
    fn default() -> Self {
        SigningConfig::Rsa {
            key_path: default_key_path(),
        }
    }
}

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP listen address
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Log level: "trace", "debug", "info", "warn", "error" (default: "info")
    #[serde(default)]
    pub log_level: Option<String>,

    pub radius: RadiusConfig,

    pub oauth: OAuthConfig,

    #[serde(default)]
    pub signing: SigningConfig,
}

/// Minimum HS256 secret length in bytes
pub const MIN_SHARED_SECRET_LENGTH: usize = 32;

fn default_enabled() -> bool {
    true
}

fn default_health_interval() -> u64 {
    30
}

fn default_health_timeout() -> u64 {
    2
}

fn default_probe_username() -> String {
    "radius-oidc-healthcheck".to_string()
}

fn default_probe_password() -> String {
    "healthcheck".to_string()
}

fn default_assignment_attribute() -> u8 {
    25 // Class
}

fn default_radius_port() -> u16 {
    1812
}

fn default_nas_ip() -> Ipv4Addr {
    Ipv4Addr::LOCALHOST
}

fn default_radius_timeout() -> u64 {
    5
}

fn default_code_ttl() -> u64 {
    60
}

fn default_access_token_ttl() -> u64 {
    3600
}

fn default_refresh_token_ttl() -> u64 {
    86400
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_max_entries() -> usize {
    100_000
}

fn default_admin_role() -> String {
    "Admin".to_string()
}

fn default_email_suffix() -> String {
    "example.com".to_string()
}

fn default_scope() -> String {
    "openid profile email".to_string()
}

fn default_key_path() -> PathBuf {
    PathBuf::from("signing_key.pem")
}

fn default_listen_address() -> String {
    "0.0.0.0:8080".to_string()
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Get socket address for the HTTP listener
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen_address.parse().map_err(|e| {
            ConfigError::Invalid(format!(
                "Invalid listen address '{}': {}",
                self.listen_address, e
            ))
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;

        if self.radius.hosts.is_empty() {
            return Err(ConfigError::Invalid(
                "At least one RADIUS host is required".to_string(),
            ));
        }
        self.radius.host_addrs()?;

        if self.radius.secret.is_empty() {
            return Err(ConfigError::Invalid(
                "RADIUS secret cannot be empty".to_string(),
            ));
        }
        if self.radius.timeout == 0 {
            return Err(ConfigError::Invalid(
                "RADIUS timeout cannot be 0".to_string(),
            ));
        }

        let health = &self.radius.health_check;
        if health.enabled && (health.interval == 0 || health.timeout == 0) {
            return Err(ConfigError::Invalid(
                "Health check interval and timeout cannot be 0".to_string(),
            ));
        }

        if let AssignmentConfig::VendorSpecific {
            pattern: Some(pattern),
            ..
        } = &self.radius.assignment
        {
            regex::Regex::new(pattern).map_err(|e| {
                ConfigError::Invalid(format!("Invalid assignment pattern '{}': {}", pattern, e))
            })?;
        }

        let oauth = &self.oauth;
        if oauth.client_id.is_empty() || oauth.client_secret.is_empty() {
            return Err(ConfigError::Invalid(
                "OAuth client_id and client_secret cannot be empty".to_string(),
            ));
        }
        Url::parse(&oauth.issuer).map_err(|e| {
            ConfigError::Invalid(format!("Invalid issuer URL '{}': {}", oauth.issuer, e))
        })?;
        for uri in &oauth.redirect_uris {
            Url::parse(uri).map_err(|e| {
                ConfigError::Invalid(format!("Invalid redirect URI '{}': {}", uri, e))
            })?;
        }
        if oauth.code_ttl == 0
            || oauth.access_token_ttl == 0
            || oauth.refresh_token_ttl == 0
            || oauth.sweep_interval == 0
        {
            return Err(ConfigError::Invalid(
                "OAuth TTLs and sweep interval cannot be 0".to_string(),
            ));
        }

        if let SigningConfig::SharedSecret { secret } = &self.signing {
            if secret.len() < MIN_SHARED_SECRET_LENGTH {
                return Err(ConfigError::Invalid(format!(
                    "Signing secret must be at least {} bytes",
                    MIN_SHARED_SECRET_LENGTH
                )));
            }
        }

        Ok(())
    }

    /// Create an example configuration
    pub fn example() -> Self {
        Config {
            listen_address: default_listen_address(),
            log_level: Some("info".to_string()),
            radius: RadiusConfig {
                hosts: vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()],
                port: default_radius_port(),
                secret: "testing123".to_string(),
                nas_ip: default_nas_ip(),
                timeout: default_radius_timeout(),
                require_message_authenticator: false,
                health_check: HealthCheckConfig::default(),
                assignment: AssignmentConfig::default(),
            },
            oauth: OAuthConfig {
                client_id: "grafana".to_string(),
                client_secret: "change-me".to_string(),
                issuer: "http://localhost:8080".to_string(),
                redirect_uris: vec!["http://localhost:3000/login/generic_oauth".to_string()],
                code_ttl: default_code_ttl(),
                access_token_ttl: default_access_token_ttl(),
                refresh_token_ttl: default_refresh_token_ttl(),
                sweep_interval: default_sweep_interval(),
                max_entries: default_max_entries(),
                permitted_classes: vec![],
                admin_classes: vec!["admins".to_string()],
                admin_role: default_admin_role(),
                email_suffix: default_email_suffix(),
                default_scope: default_scope(),
                trust_forwarded_headers: false,
            },
            signing: SigningConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_config_is_valid() {
        let config = Config::example();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults_from_minimal_json() {
        let json = r#"{
            "radius": { "hosts": ["10.0.0.1"], "secret": "s" },
            "oauth": { "client_id": "c", "client_secret": "x", "issuer": "https://sso.example.com" }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.radius.port, 1812);
        assert_eq!(config.radius.timeout, 5);
        assert_eq!(
            config.radius.assignment,
            AssignmentConfig::Standard { attribute_type: 25 }
        );
        assert_eq!(config.oauth.code_ttl, 60);
        assert_eq!(config.signing, SigningConfig::default());
    }

    #[test]
    fn test_host_addrs_apply_default_port() {
        let mut config = Config::example();
        config.radius.hosts = vec!["10.0.0.1".to_string(), "10.0.0.2:1645".to_string()];
        let addrs = config.radius.host_addrs().unwrap();
        assert_eq!(addrs[0], "10.0.0.1:1812".parse().unwrap());
        assert_eq!(addrs[1], "10.0.0.2:1645".parse().unwrap());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::example();
        config.radius.hosts.clear();
        assert!(config.validate().is_err());

        let mut config = Config::example();
        config.radius.hosts = vec!["not-an-ip".to_string()];
        assert!(config.validate().is_err());

        let mut config = Config::example();
        config.radius.secret.clear();
        assert!(config.validate().is_err());

        let mut config = Config::example();
        config.radius.timeout = 0;
        assert!(config.validate().is_err());

        let mut config = Config::example();
        config.oauth.client_secret.clear();
        assert!(config.validate().is_err());

        let mut config = Config::example();
        config.oauth.issuer = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_pattern_and_short_secret() {
        let mut config = Config::example();
        config.radius.assignment = AssignmentConfig::VendorSpecific {
            vendor_id: 9,
            vendor_type: 1,
            pattern: Some("roles=(".to_string()),
        };
        assert!(config.validate().is_err());

        let mut config = Config::example();
        config.signing = SigningConfig::SharedSecret {
            secret: "short".to_string(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tagged_enums_from_json() {
        let assignment: AssignmentConfig = serde_json::from_str(
            r#"{"type": "vendor_specific", "vendor_id": 9, "vendor_type": 1, "pattern": "roles=(\\w+)"}"#,
        )
        .unwrap();
        assert!(matches!(
            assignment,
            AssignmentConfig::VendorSpecific { vendor_id: 9, .. }
        ));

        let signing: SigningConfig =
            serde_json::from_str(r#"{"mode": "shared_secret", "secret": "abc"}"#).unwrap();
        assert_eq!(
            signing,
            SigningConfig::SharedSecret {
                secret: "abc".to_string()
            }
        );
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        Config::example().to_file(&path).unwrap();
        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.oauth.client_id, "grafana");
        assert_eq!(loaded.radius.hosts.len(), 2);
    }
}
