//! Authorization server: authorization requests, logins, token grants and
//! userinfo
//!
//! A flow moves Requested → Authenticating → Authorized → Redeemed, or ends
//! Rejected at validation or at login. Nothing is stored until a login is
//! admitted; the code is then the only state, and redeeming it removes it.

use super::error::{OAuthError, OAuthErrorCode};
use super::pkce::{self, PkceMethod};
use super::policy::{split_groups, ClassPolicy};
use crate::config::OAuthConfig;
use crate::radius::{Authenticator, RadiusOutcome};
use crate::store::{AuthorizationCode, CredentialStore, RefreshToken};
use crate::token::{Claims, JwkSet, TokenIssuer, TokenUse};
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;
use tracing::{error, info, warn};
use url::Url;

/// Length of generated codes and refresh tokens
const TOKEN_LENGTH: usize = 43;

/// Parameters of an authorization request, as received
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizeRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge_method: Option<String>,
}

/// An authorization request that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedAuthorization {
    pub redirect_uri: Url,
    pub scope: String,
    pub state: Option<String>,
    pub nonce: Option<String>,
    pub code_challenge: Option<(String, PkceMethod)>,
}

/// Result of a credential submission for a valid authorization request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizeOutcome {
    /// Send the browser to the client with `code` and `state`
    Issued { redirect: Url },
    /// Send the browser back to the login page with this error
    Denied(OAuthError),
}

/// Token endpoint form parameters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub grant_type: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub code_verifier: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub id_token: String,
    pub refresh_token: String,
    pub scope: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub sub: String,
    pub name: String,
    pub preferred_username: String,
    pub email: String,
    pub email_verified: bool,
    pub groups: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEmail {
    pub email: String,
    pub primary: bool,
    pub verified: bool,
}

pub struct AuthorizationServer {
    config: OAuthConfig,
    policy: ClassPolicy,
    authenticator: Arc<dyn Authenticator>,
    store: Arc<dyn CredentialStore>,
    issuer: Arc<TokenIssuer>,
    radius_timeout: Duration,
}

impl AuthorizationServer {
    pub fn new(
        config: OAuthConfig,
        authenticator: Arc<dyn Authenticator>,
        store: Arc<dyn CredentialStore>,
        issuer: Arc<TokenIssuer>,
        radius_timeout: Duration,
    ) -> Self {
        AuthorizationServer {
            policy: ClassPolicy::from_config(&config),
            config,
            authenticator,
            store,
            issuer,
            radius_timeout,
        }
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    pub fn token_issuer(&self) -> &Arc<TokenIssuer> {
        &self.issuer
    }

    /// Check an authorization request before any credentials are collected.
    ///
    /// `request_origin` is the scheme://host[:port] the request arrived on;
    /// it is only consulted when no redirect URIs are configured.
    pub fn validate_authorize(
        &self,
        request: &AuthorizeRequest,
        request_origin: Option<&str>,
    ) -> Result<ValidatedAuthorization, OAuthError> {
        match request.response_type.as_deref() {
            Some("code") => {}
            Some(other) => {
                return Err(OAuthError::invalid_request(format!(
                    "unsupported response_type '{}'",
                    other
                )))
            }
            None => return Err(OAuthError::invalid_request("response_type is required")),
        }

        let client_id = request
            .client_id
            .as_deref()
            .ok_or_else(|| OAuthError::invalid_request("client_id is required"))?;
        if client_id != self.config.client_id {
            warn!(client_id, "Authorization request for unknown client");
            return Err(OAuthError::with_description(
                OAuthErrorCode::UnauthorizedClient,
                "unknown client_id",
            ));
        }

        let raw_redirect = request
            .redirect_uri
            .as_deref()
            .ok_or_else(|| OAuthError::invalid_request("redirect_uri is required"))?;
        let redirect_uri = Url::parse(raw_redirect)
            .map_err(|_| OAuthError::invalid_request("redirect_uri is not a valid URL"))?;
        if !self.redirect_allowed(raw_redirect, &redirect_uri, request_origin) {
            warn!(redirect_uri = raw_redirect, "Rejected redirect_uri");
            return Err(OAuthError::invalid_request("redirect_uri is not allowed"));
        }

        let code_challenge = match request.code_challenge.as_deref() {
            Some(challenge) if !challenge.is_empty() => {
                let method = PkceMethod::parse(request.code_challenge_method.as_deref())
                    .ok_or_else(|| {
                        OAuthError::invalid_request("unsupported code_challenge_method")
                    })?;
                Some((challenge.to_string(), method))
            }
            _ => None,
        };

        let scope = request
            .scope
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| self.config.default_scope.clone());

        Ok(ValidatedAuthorization {
            redirect_uri,
            scope,
            state: request.state.clone(),
            nonce: request.nonce.clone(),
            code_challenge,
        })
    }

    fn redirect_allowed(&self, raw: &str, parsed: &Url, request_origin: Option<&str>) -> bool {
        if !self.config.redirect_uris.is_empty() {
            return self.config.redirect_uris.iter().any(|allowed| allowed == raw);
        }
        match request_origin {
            Some(origin) => parsed.origin().ascii_serialization() == origin,
            None => false,
        }
    }

    /// Handle a credential submission for `request`.
    ///
    /// An invalid authorization request is an `Err` and must not be
    /// redirected anywhere. A failed or refused login is
    /// [`AuthorizeOutcome::Denied`].
    pub async fn authorize(
        &self,
        request: &AuthorizeRequest,
        username: &str,
        password: &str,
        request_origin: Option<&str>,
    ) -> Result<AuthorizeOutcome, OAuthError> {
        let validated = self.validate_authorize(request, request_origin)?;

        if username.is_empty() || password.is_empty() {
            return Ok(AuthorizeOutcome::Denied(OAuthError::invalid_request(
                "username and password are required",
            )));
        }

        let attribute_value = match self
            .authenticator
            .authenticate(username, password, self.radius_timeout)
            .await
        {
            RadiusOutcome::Accepted { attribute_value } => attribute_value,
            RadiusOutcome::Rejected => {
                warn!(username, "Login rejected");
                return Ok(AuthorizeOutcome::Denied(OAuthError::with_description(
                    OAuthErrorCode::AccessDenied,
                    "Invalid username or password",
                )));
            }
            RadiusOutcome::Timeout | RadiusOutcome::NetworkError => {
                warn!(username, "Login failed: authentication service unavailable");
                return Ok(AuthorizeOutcome::Denied(OAuthError::with_description(
                    OAuthErrorCode::TemporarilyUnavailable,
                    "Authentication service unavailable, please try again",
                )));
            }
        };

        let groups = attribute_value
            .as_deref()
            .map(split_groups)
            .unwrap_or_default();
        if !self.policy.admits(&groups) {
            warn!(username, ?groups, "Login refused: no permitted class");
            return Ok(AuthorizeOutcome::Denied(OAuthError::with_description(
                OAuthErrorCode::AccessDenied,
                "User is not a member of a permitted class",
            )));
        }
        let role = self.policy.role_for(&groups);

        let code = random_token();
        let (code_challenge, code_challenge_method) = match validated.code_challenge {
            Some((challenge, method)) => (Some(challenge), Some(method)),
            None => (None, None),
        };
        let record = AuthorizationCode {
            code: code.clone(),
            username: username.to_string(),
            groups,
            role,
            scope: validated.scope,
            // Bound as sent; the token request must repeat it exactly
            redirect_uri: request.redirect_uri.clone().unwrap_or_default(),
            nonce: validated.nonce,
            code_challenge,
            code_challenge_method,
        };
        if let Err(e) = self.store.put_code(record, self.config.code_ttl()).await {
            error!(error = %e, "Could not store authorization code");
            return Ok(AuthorizeOutcome::Denied(OAuthError::with_description(
                OAuthErrorCode::TemporarilyUnavailable,
                "Too many pending logins, please try again",
            )));
        }

        let mut redirect = validated.redirect_uri;
        {
            let mut query = redirect.query_pairs_mut();
            query.append_pair("code", &code);
            if let Some(state) = &validated.state {
                query.append_pair("state", state);
            }
        }

        info!(username, "Issued authorization code");
        Ok(AuthorizeOutcome::Issued { redirect })
    }

    /// Token endpoint. `basic` carries HTTP Basic client credentials, which
    /// take precedence over any in the form.
    pub async fn token(
        &self,
        request: TokenRequest,
        basic: Option<ClientCredentials>,
    ) -> Result<TokenResponse, OAuthError> {
        self.authenticate_client(&request, basic)?;

        match request.grant_type.as_deref() {
            Some("authorization_code") => self.redeem_code(request).await,
            Some("refresh_token") => self.refresh(request).await,
            Some(other) => {
                warn!(grant_type = other, "Unsupported grant type");
                Err(OAuthError::new(OAuthErrorCode::UnsupportedGrantType))
            }
            None => Err(OAuthError::invalid_request("grant_type is required")),
        }
    }

    fn authenticate_client(
        &self,
        request: &TokenRequest,
        basic: Option<ClientCredentials>,
    ) -> Result<(), OAuthError> {
        let credentials = basic.or_else(|| {
            Some(ClientCredentials {
                client_id: request.client_id.clone()?,
                client_secret: request.client_secret.clone()?,
            })
        });
        let Some(credentials) = credentials else {
            return Err(OAuthError::invalid_client());
        };

        let id_ok = credentials
            .client_id
            .as_bytes()
            .ct_eq(self.config.client_id.as_bytes());
        let secret_ok = credentials
            .client_secret
            .as_bytes()
            .ct_eq(self.config.client_secret.as_bytes());
        if bool::from(id_ok & secret_ok) {
            Ok(())
        } else {
            warn!("Client authentication failed");
            Err(OAuthError::invalid_client())
        }
    }

    async fn redeem_code(&self, request: TokenRequest) -> Result<TokenResponse, OAuthError> {
        let code = request
            .code
            .as_deref()
            .ok_or_else(|| OAuthError::invalid_request("code is required"))?;

        let Some(record) = self.store.take_code(code).await else {
            warn!("Unknown, expired or reused authorization code");
            return Err(OAuthError::invalid_grant());
        };

        if request.redirect_uri.as_deref() != Some(record.redirect_uri.as_str()) {
            warn!(username = %record.username, "redirect_uri does not match the authorization request");
            return Err(OAuthError::invalid_grant());
        }

        if let (Some(challenge), Some(method)) = (&record.code_challenge, record.code_challenge_method)
        {
            let verified = request
                .code_verifier
                .as_deref()
                .is_some_and(|verifier| pkce::verify(verifier, challenge, method));
            if !verified {
                warn!(username = %record.username, "PKCE verification failed");
                return Err(OAuthError::invalid_grant());
            }
        }

        info!(username = %record.username, "Authorization code redeemed");
        self.issue_tokens(
            record.username,
            record.groups,
            record.role,
            record.scope,
            record.nonce,
        )
        .await
    }

    async fn refresh(&self, request: TokenRequest) -> Result<TokenResponse, OAuthError> {
        let token = request
            .refresh_token
            .as_deref()
            .ok_or_else(|| OAuthError::invalid_request("refresh_token is required"))?;

        let Some(record) = self.store.take_refresh_token(token).await else {
            warn!("Unknown, expired or reused refresh token");
            return Err(OAuthError::invalid_grant());
        };

        info!(username = %record.username, "Refresh token rotated");
        self.issue_tokens(record.username, record.groups, record.role, record.scope, None)
            .await
    }

    async fn issue_tokens(
        &self,
        username: String,
        groups: Vec<String>,
        role: Option<String>,
        scope: String,
        nonce: Option<String>,
    ) -> Result<TokenResponse, OAuthError> {
        let claims = Claims::for_user(
            &username,
            groups.clone(),
            role.clone(),
            &scope,
            &self.config.email_suffix,
        );
        let ttl = self.config.access_token_ttl();

        let access_token = self
            .issuer
            .sign(claims.clone(), ttl)
            .await
            .map_err(server_error)?;
        let id_token = self
            .issuer
            .sign(
                Claims {
                    nonce,
                    token_use: TokenUse::Id,
                    ..claims
                },
                ttl,
            )
            .await
            .map_err(server_error)?;

        let refresh_token = random_token();
        self.store
            .put_refresh_token(
                RefreshToken {
                    token: refresh_token.clone(),
                    username,
                    groups,
                    role,
                    scope: scope.clone(),
                },
                self.config.refresh_token_ttl(),
            )
            .await
            .map_err(server_error)?;

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: ttl.as_secs(),
            id_token,
            refresh_token,
            scope,
        })
    }

    async fn bearer_claims(&self, bearer: Option<&str>) -> Result<Claims, OAuthError> {
        let token = bearer.ok_or_else(OAuthError::invalid_token)?;
        let claims = self.issuer.verify(token).await.map_err(|e| {
            warn!(error = %e, "Rejected bearer token");
            OAuthError::invalid_token()
        })?;
        if claims.token_use != TokenUse::Access {
            warn!(sub = %claims.sub, "ID token presented as bearer token");
            return Err(OAuthError::invalid_token());
        }
        Ok(claims)
    }

    pub async fn userinfo(&self, bearer: Option<&str>) -> Result<UserInfo, OAuthError> {
        let claims = self.bearer_claims(bearer).await?;
        Ok(UserInfo {
            preferred_username: claims.sub.clone(),
            sub: claims.sub,
            name: claims.name,
            email: claims.email,
            email_verified: true,
            groups: claims.groups,
            role: claims.role,
        })
    }

    pub async fn emails(&self, bearer: Option<&str>) -> Result<Vec<UserEmail>, OAuthError> {
        let claims = self.bearer_claims(bearer).await?;
        Ok(vec![UserEmail {
            email: claims.email,
            primary: true,
            verified: true,
        }])
    }

    pub async fn jwks(&self) -> Result<JwkSet, OAuthError> {
        self.issuer.jwks().await.map_err(server_error)
    }

    /// OpenID Provider metadata
    pub fn discovery(&self) -> serde_json::Value {
        let base = self.config.issuer.trim_end_matches('/');
        serde_json::json!({
            "issuer": self.config.issuer,
            "authorization_endpoint": format!("{}/authorize", base),
            "token_endpoint": format!("{}/token", base),
            "userinfo_endpoint": format!("{}/userinfo", base),
            "jwks_uri": format!("{}/.well-known/jwks.json", base),
            "response_types_supported": ["code"],
            "grant_types_supported": ["authorization_code", "refresh_token"],
            "subject_types_supported": ["public"],
            "id_token_signing_alg_values_supported": [format!("{:?}", self.issuer.algorithm())],
            "token_endpoint_auth_methods_supported": ["client_secret_basic", "client_secret_post"],
            "code_challenge_methods_supported": ["S256", "plain"],
            "scopes_supported": ["openid", "profile", "email", "groups"],
            "claims_supported": [
                "sub", "name", "preferred_username", "email", "email_verified",
                "groups", "role", "iss", "aud", "iat", "exp", "nonce"
            ],
        })
    }
}

fn random_token() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

fn server_error(e: impl std::fmt::Display) -> OAuthError {
    error!(error = %e, "Token issuance failed");
    OAuthError::new(OAuthErrorCode::ServerError)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, SigningConfig};
    use crate::store::MemoryCredentialStore;
    use async_trait::async_trait;

    /// Accepts any user whose password is "password", with a fixed class value
    struct StaticAuthenticator {
        outcome_class: Option<String>,
        unavailable: bool,
    }

    #[async_trait]
    impl Authenticator for StaticAuthenticator {
        async fn authenticate(&self, _: &str, password: &str, _: Duration) -> RadiusOutcome {
            if self.unavailable {
                return RadiusOutcome::Timeout;
            }
            if password == "password" {
                RadiusOutcome::Accepted {
                    attribute_value: self.outcome_class.clone(),
                }
            } else {
                RadiusOutcome::Rejected
            }
        }
    }

    const REDIRECT: &str = "https://grafana.example.com/login/generic_oauth";

    fn server_with(
        class: Option<&str>,
        permitted: &[&str],
        unavailable: bool,
    ) -> (AuthorizationServer, Arc<MemoryCredentialStore>) {
        let mut config = Config::example().oauth;
        config.issuer = "https://sso.example.com".to_string();
        config.redirect_uris = vec![REDIRECT.to_string()];
        config.permitted_classes = permitted.iter().map(|s| s.to_string()).collect();
        config.admin_classes = vec!["admins".to_string()];

        let store = Arc::new(MemoryCredentialStore::default());
        let issuer = Arc::new(TokenIssuer::new(
            SigningConfig::SharedSecret {
                secret: "0123456789abcdef0123456789abcdef".to_string(),
            },
            config.issuer.clone(),
            config.client_id.clone(),
        ));
        let authenticator = Arc::new(StaticAuthenticator {
            outcome_class: class.map(str::to_string),
            unavailable,
        });

        let server = AuthorizationServer::new(
            config,
            authenticator,
            store.clone(),
            issuer,
            Duration::from_secs(1),
        );
        (server, store)
    }

    fn server() -> (AuthorizationServer, Arc<MemoryCredentialStore>) {
        server_with(Some("ops,admins"), &[], false)
    }

    fn authorize_request() -> AuthorizeRequest {
        AuthorizeRequest {
            response_type: Some("code".to_string()),
            client_id: Some("grafana".to_string()),
            redirect_uri: Some(REDIRECT.to_string()),
            scope: Some("openid email".to_string()),
            state: Some("xyz".to_string()),
            nonce: Some("n-0S6".to_string()),
            ..AuthorizeRequest::default()
        }
    }

    fn code_from(redirect: &Url) -> String {
        redirect
            .query_pairs()
            .find(|(k, _)| k == "code")
            .map(|(_, v)| v.into_owned())
            .unwrap()
    }

    fn basic() -> Option<ClientCredentials> {
        Some(ClientCredentials {
            client_id: "grafana".to_string(),
            client_secret: "change-me".to_string(),
        })
    }

    fn code_request(code: &str) -> TokenRequest {
        TokenRequest {
            grant_type: Some("authorization_code".to_string()),
            code: Some(code.to_string()),
            redirect_uri: Some(REDIRECT.to_string()),
            ..TokenRequest::default()
        }
    }

    async fn login(server: &AuthorizationServer, request: &AuthorizeRequest) -> Url {
        match server
            .authorize(request, "alice", "password", None)
            .await
            .unwrap()
        {
            AuthorizeOutcome::Issued { redirect } => redirect,
            AuthorizeOutcome::Denied(e) => panic!("login denied: {:?}", e),
        }
    }

    #[test]
    fn test_validate_rejects_bad_requests() {
        let (server, _) = server();

        let mut req = authorize_request();
        req.response_type = Some("token".to_string());
        assert_eq!(
            server.validate_authorize(&req, None).unwrap_err().error,
            OAuthErrorCode::InvalidRequest
        );

        let mut req = authorize_request();
        req.client_id = Some("someone".to_string());
        assert_eq!(
            server.validate_authorize(&req, None).unwrap_err().error,
            OAuthErrorCode::UnauthorizedClient
        );

        let mut req = authorize_request();
        req.redirect_uri = Some(format!("{}/extra", REDIRECT));
        assert_eq!(
            server.validate_authorize(&req, None).unwrap_err().error,
            OAuthErrorCode::InvalidRequest
        );

        let mut req = authorize_request();
        req.code_challenge = Some("abc".to_string());
        req.code_challenge_method = Some("S512".to_string());
        assert_eq!(
            server.validate_authorize(&req, None).unwrap_err().error,
            OAuthErrorCode::InvalidRequest
        );
    }

    #[test]
    fn test_empty_allow_list_requires_same_origin() {
        let (mut server, _) = server();
        server.config.redirect_uris.clear();

        let mut req = authorize_request();
        req.redirect_uri = Some("https://sso.example.com/callback".to_string());
        assert!(server
            .validate_authorize(&req, Some("https://sso.example.com"))
            .is_ok());
        assert!(server
            .validate_authorize(&req, Some("https://evil.example.com"))
            .is_err());
        assert!(server.validate_authorize(&req, None).is_err());
    }

    #[test]
    fn test_default_scope_applied() {
        let (server, _) = server();
        let mut req = authorize_request();
        req.scope = None;
        let validated = server.validate_authorize(&req, None).unwrap();
        assert_eq!(validated.scope, "openid profile email");
    }

    #[tokio::test]
    async fn test_full_code_flow() {
        let (server, _) = server();
        let redirect = login(&server, &authorize_request()).await;
        assert!(redirect.as_str().starts_with(REDIRECT));
        assert!(redirect.query_pairs().any(|(k, v)| k == "state" && v == "xyz"));

        let tokens = server
            .token(code_request(&code_from(&redirect)), basic())
            .await
            .unwrap();
        assert_eq!(tokens.token_type, "Bearer");
        assert_eq!(tokens.scope, "openid email");

        let claims = server.token_issuer().verify(&tokens.access_token).await.unwrap();
        assert_eq!(claims.groups, vec!["ops", "admins"]);
        assert_eq!(claims.role.as_deref(), Some("Admin"));
        assert_eq!(claims.nonce, None);

        let id = server.token_issuer().verify(&tokens.id_token).await.unwrap();
        assert_eq!(id.nonce.as_deref(), Some("n-0S6"));

        let info = server.userinfo(Some(tokens.access_token.as_str())).await.unwrap();
        assert_eq!(info.email, "alice@example.com");
        assert_eq!(info.preferred_username, "alice");
    }

    #[tokio::test]
    async fn test_code_is_single_use() {
        let (server, _) = server();
        let code = code_from(&login(&server, &authorize_request()).await);

        assert!(server.token(code_request(&code), basic()).await.is_ok());
        let err = server.token(code_request(&code), basic()).await.unwrap_err();
        assert_eq!(err.error, OAuthErrorCode::InvalidGrant);
    }

    #[tokio::test]
    async fn test_client_authentication() {
        let (server, _) = server();
        let code = code_from(&login(&server, &authorize_request()).await);

        let wrong = Some(ClientCredentials {
            client_id: "grafana".to_string(),
            client_secret: "nope".to_string(),
        });
        let err = server.token(code_request(&code), wrong).await.unwrap_err();
        assert_eq!(err.error, OAuthErrorCode::InvalidClient);

        let err = server.token(code_request(&code), None).await.unwrap_err();
        assert_eq!(err.error, OAuthErrorCode::InvalidClient);

        // Body credentials work too, and the code survived the failed attempts
        let mut req = code_request(&code);
        req.client_id = Some("grafana".to_string());
        req.client_secret = Some("change-me".to_string());
        assert!(server.token(req, None).await.is_ok());
    }

    #[tokio::test]
    async fn test_redirect_uri_must_match() {
        let (server, _) = server();
        let code = code_from(&login(&server, &authorize_request()).await);

        let mut req = code_request(&code);
        req.redirect_uri = Some("https://other.example.com/cb".to_string());
        let err = server.token(req, basic()).await.unwrap_err();
        assert_eq!(err.error, OAuthErrorCode::InvalidGrant);
    }

    #[tokio::test]
    async fn test_pkce_s256() {
        let (server, _) = server();
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        let mut request = authorize_request();
        request.code_challenge = Some(pkce::s256_challenge(verifier));
        request.code_challenge_method = Some("S256".to_string());

        let code = code_from(&login(&server, &request).await);
        let mut bad = code_request(&code);
        bad.code_verifier = Some("wrong-verifier".to_string());
        assert_eq!(
            server.token(bad, basic()).await.unwrap_err().error,
            OAuthErrorCode::InvalidGrant
        );

        let code = code_from(&login(&server, &request).await);
        let mut missing = code_request(&code);
        missing.code_verifier = None;
        assert_eq!(
            server.token(missing, basic()).await.unwrap_err().error,
            OAuthErrorCode::InvalidGrant
        );

        let code = code_from(&login(&server, &request).await);
        let mut good = code_request(&code);
        good.code_verifier = Some(verifier.to_string());
        assert!(server.token(good, basic()).await.is_ok());
    }

    #[tokio::test]
    async fn test_refresh_rotates() {
        let (server, _) = server();
        let code = code_from(&login(&server, &authorize_request()).await);
        let first = server.token(code_request(&code), basic()).await.unwrap();

        let refresh = |token: &str| TokenRequest {
            grant_type: Some("refresh_token".to_string()),
            refresh_token: Some(token.to_string()),
            ..TokenRequest::default()
        };

        let second = server.token(refresh(&first.refresh_token), basic()).await.unwrap();
        assert_ne!(second.refresh_token, first.refresh_token);
        let claims = server.token_issuer().verify(&second.access_token).await.unwrap();
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.groups, vec!["ops", "admins"]);

        let err = server
            .token(refresh(&first.refresh_token), basic())
            .await
            .unwrap_err();
        assert_eq!(err.error, OAuthErrorCode::InvalidGrant);

        assert!(server.token(refresh(&second.refresh_token), basic()).await.is_ok());
    }

    #[tokio::test]
    async fn test_grant_type_errors() {
        let (server, _) = server();
        let req = TokenRequest {
            grant_type: Some("password".to_string()),
            ..TokenRequest::default()
        };
        assert_eq!(
            server.token(req, basic()).await.unwrap_err().error,
            OAuthErrorCode::UnsupportedGrantType
        );
        assert_eq!(
            server
                .token(TokenRequest::default(), basic())
                .await
                .unwrap_err()
                .error,
            OAuthErrorCode::InvalidRequest
        );
    }

    #[tokio::test]
    async fn test_policy_denial_issues_no_code() {
        let (server, store) = server_with(Some("g3"), &["g1", "g2"], false);
        let outcome = server
            .authorize(&authorize_request(), "alice", "password", None)
            .await
            .unwrap();

        match outcome {
            AuthorizeOutcome::Denied(e) => {
                assert_eq!(e.error, OAuthErrorCode::AccessDenied);
                assert!(e.error_description.unwrap().contains("permitted class"));
            }
            other => panic!("expected denial, got {:?}", other),
        }
        assert!(store.codes().is_empty());
    }

    #[tokio::test]
    async fn test_bad_credentials_and_outage_are_denied() {
        let (server, store) = server();
        let outcome = server
            .authorize(&authorize_request(), "alice", "wrong", None)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            AuthorizeOutcome::Denied(OAuthError { error: OAuthErrorCode::AccessDenied, .. })
        ));

        let (down, _) = server_with(Some("ops"), &[], true);
        let outcome = down
            .authorize(&authorize_request(), "alice", "password", None)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            AuthorizeOutcome::Denied(OAuthError {
                error: OAuthErrorCode::TemporarilyUnavailable,
                ..
            })
        ));
        assert!(store.codes().is_empty());
    }

    #[tokio::test]
    async fn test_accept_without_class_has_no_groups() {
        let (server, _) = server_with(None, &[], false);
        let code = code_from(&login(&server, &authorize_request()).await);
        let tokens = server.token(code_request(&code), basic()).await.unwrap();
        let claims = server.token_issuer().verify(&tokens.access_token).await.unwrap();
        assert!(claims.groups.is_empty());
        assert!(claims.role.is_none());
    }

    #[tokio::test]
    async fn test_userinfo_requires_valid_token() {
        let (server, _) = server();
        assert_eq!(
            server.userinfo(None).await.unwrap_err().error,
            OAuthErrorCode::InvalidToken
        );
        assert_eq!(
            server.userinfo(Some("garbage")).await.unwrap_err().error,
            OAuthErrorCode::InvalidToken
        );
    }

    #[tokio::test]
    async fn test_id_token_is_not_a_bearer_token() {
        let (server, _) = server();
        let redirect = login(&server, &authorize_request()).await;
        let tokens = server
            .token(code_request(&code_from(&redirect)), basic())
            .await
            .unwrap();

        let id = server.token_issuer().verify(&tokens.id_token).await.unwrap();
        assert_eq!(id.token_use, TokenUse::Id);
        assert_eq!(
            server
                .userinfo(Some(tokens.id_token.as_str()))
                .await
                .unwrap_err()
                .error,
            OAuthErrorCode::InvalidToken
        );
        assert!(server.emails(Some(tokens.id_token.as_str())).await.is_err());
        assert!(server.userinfo(Some(tokens.access_token.as_str())).await.is_ok());
    }

    #[test]
    fn test_discovery_document() {
        let (server, _) = server();
        let doc = server.discovery();
        assert_eq!(doc["issuer"], "https://sso.example.com");
        assert_eq!(doc["token_endpoint"], "https://sso.example.com/token");
        assert_eq!(doc["jwks_uri"], "https://sso.example.com/.well-known/jwks.json");
        assert_eq!(doc["id_token_signing_alg_values_supported"][0], "HS256");
        assert_eq!(doc["response_types_supported"][0], "code");
    }
}
