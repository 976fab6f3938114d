//! HTTP surface for the authorization server
//!
//! Handlers only translate between HTTP and [`AuthorizationServer`]; every
//! decision is made there.

use crate::oauth::{
    AuthorizationServer, AuthorizeOutcome, AuthorizeRequest, ClientCredentials, OAuthError,
    OAuthErrorCode, TokenRequest,
};
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use url::form_urlencoded;

type AppState = Arc<AuthorizationServer>;

/// Build the router for all OAuth and OIDC endpoints
pub fn router(server: Arc<AuthorizationServer>) -> Router {
    Router::new()
        .route("/authorize", get(authorize_handler).post(login_post_handler))
        .route("/login", get(login_page_handler))
        .route("/token", post(token_handler))
        .route("/userinfo", get(userinfo_handler))
        .route("/userinfo/emails", get(emails_handler))
        .route("/.well-known/openid-configuration", get(discovery_handler))
        .route("/.well-known/jwks.json", get(jwks_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(server)
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let challenge = match self.error {
            OAuthErrorCode::InvalidToken => Some("Bearer error=\"invalid_token\""),
            OAuthErrorCode::InvalidClient => Some("Basic realm=\"token\""),
            _ => None,
        };

        let mut response = (status, Json(self)).into_response();
        if let Some(challenge) = challenge {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                header::HeaderValue::from_static(challenge),
            );
        }
        response
    }
}

/// Login form fields, also accepted as query parameters by `GET /login`
#[derive(Debug, Default, Deserialize)]
struct LoginForm {
    #[serde(default, alias = "username")]
    user: String,
    #[serde(default)]
    password: String,
    response_type: Option<String>,
    client_id: Option<String>,
    redirect_uri: Option<String>,
    scope: Option<String>,
    state: Option<String>,
    nonce: Option<String>,
    code_challenge: Option<String>,
    code_challenge_method: Option<String>,
    error_description: Option<String>,
}

impl LoginForm {
    fn authorize_request(&self) -> AuthorizeRequest {
        AuthorizeRequest {
            response_type: self
                .response_type
                .clone()
                .or_else(|| Some("code".to_string())),
            client_id: self.client_id.clone(),
            redirect_uri: self.redirect_uri.clone(),
            scope: self.scope.clone(),
            state: self.state.clone(),
            nonce: self.nonce.clone(),
            code_challenge: self.code_challenge.clone(),
            code_challenge_method: self.code_challenge_method.clone(),
        }
    }
}

async fn authorize_handler(
    State(server): State<AppState>,
    headers: HeaderMap,
    Query(request): Query<AuthorizeRequest>,
) -> Response {
    let origin = request_origin(&headers, server.config().trust_forwarded_headers);
    match server.validate_authorize(&request, origin.as_deref()) {
        Ok(_) => found(&login_location(&request, None)),
        Err(e) => e.into_response(),
    }
}

async fn login_page_handler(
    State(server): State<AppState>,
    headers: HeaderMap,
    Query(form): Query<LoginForm>,
) -> Response {
    let request = form.authorize_request();
    let origin = request_origin(&headers, server.config().trust_forwarded_headers);
    if let Err(e) = server.validate_authorize(&request, origin.as_deref()) {
        return e.into_response();
    }
    Html(render_login_page(&request, form.error_description.as_deref())).into_response()
}

async fn login_post_handler(
    State(server): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> Response {
    let request = form.authorize_request();
    let origin = request_origin(&headers, server.config().trust_forwarded_headers);
    let json = wants_json(&headers);

    match server
        .authorize(&request, &form.user, &form.password, origin.as_deref())
        .await
    {
        Ok(AuthorizeOutcome::Issued { redirect }) if json => {
            Json(serde_json::json!({ "redirect_uri": redirect.as_str() })).into_response()
        }
        Ok(AuthorizeOutcome::Issued { redirect }) => found(redirect.as_str()),
        Ok(AuthorizeOutcome::Denied(e)) if json => e.into_response(),
        Ok(AuthorizeOutcome::Denied(e)) => found(&login_location(&request, Some(&e))),
        Err(e) => e.into_response(),
    }
}

async fn token_handler(
    State(server): State<AppState>,
    headers: HeaderMap,
    Form(request): Form<TokenRequest>,
) -> Response {
    let no_store = [
        (header::CACHE_CONTROL, "no-store"),
        (header::PRAGMA, "no-cache"),
    ];
    match server.token(request, basic_credentials(&headers)).await {
        Ok(tokens) => (no_store, Json(tokens)).into_response(),
        Err(e) => (no_store, e).into_response(),
    }
}

async fn userinfo_handler(State(server): State<AppState>, headers: HeaderMap) -> Response {
    match server.userinfo(bearer_token(&headers)).await {
        Ok(info) => Json(info).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn emails_handler(State(server): State<AppState>, headers: HeaderMap) -> Response {
    match server.emails(bearer_token(&headers)).await {
        Ok(emails) => Json(emails).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn discovery_handler(State(server): State<AppState>) -> Response {
    Json(server.discovery()).into_response()
}

async fn jwks_handler(State(server): State<AppState>) -> Response {
    match server.jwks().await {
        Ok(jwks) => Json(jwks).into_response(),
        Err(e) => e.into_response(),
    }
}

fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

fn authorization_params(request: &AuthorizeRequest) -> [(&'static str, &Option<String>); 8] {
    [
        ("response_type", &request.response_type),
        ("client_id", &request.client_id),
        ("redirect_uri", &request.redirect_uri),
        ("scope", &request.scope),
        ("state", &request.state),
        ("nonce", &request.nonce),
        ("code_challenge", &request.code_challenge),
        ("code_challenge_method", &request.code_challenge_method),
    ]
}

/// `/login?...` carrying the authorization parameters and an optional error
fn login_location(request: &AuthorizeRequest, error: Option<&OAuthError>) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    for (name, value) in authorization_params(request) {
        if let Some(value) = value {
            query.append_pair(name, value);
        }
    }
    if let Some(error) = error {
        query.append_pair("error", error.error.as_str());
        if let Some(description) = &error.error_description {
            query.append_pair("error_description", description);
        }
    }
    format!("/login?{}", query.finish())
}

/// `scheme://host[:port]` of the incoming request. With `trust_forwarded` the
/// `X-Forwarded-Host` and `X-Forwarded-Proto` of a TLS-terminating proxy win
/// over `Host`; otherwise they are ignored.
fn request_origin(headers: &HeaderMap, trust_forwarded: bool) -> Option<String> {
    let forwarded = |name: &str| {
        headers
            .get(name)
            .filter(|_| trust_forwarded)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
    };
    let host = match forwarded("x-forwarded-host") {
        Some(host) => host,
        None => headers.get(header::HOST)?.to_str().ok()?,
    };
    let scheme = forwarded("x-forwarded-proto").unwrap_or("http");

    let url = url::Url::parse(&format!("{}://{}", scheme, host)).ok()?;
    Some(url.origin().ascii_serialization())
}

fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("application/json"))
}

fn basic_credentials(headers: &HeaderMap) -> Option<ClientCredentials> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = String::from_utf8(STANDARD.decode(encoded.trim()).ok()?).ok()?;
    let (id, secret) = decoded.split_once(':')?;

    // RFC 6749 2.3.1: both parts are form-urlencoded
    let unescape = |s: &str| -> String {
        form_urlencoded::parse(format!("v={}", s).as_bytes())
            .next()
            .map(|(_, v)| v.into_owned())
            .unwrap_or_default()
    };
    Some(ClientCredentials {
        client_id: unescape(id),
        client_secret: unescape(secret),
    })
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim())
        .filter(|t| !t.is_empty())
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn render_login_page(request: &AuthorizeRequest, error: Option<&str>) -> String {
    let hidden = authorization_params(request)
        .into_iter()
        .filter_map(|(name, value)| {
            value.as_ref().map(|v| {
                format!(
                    r#"<input type="hidden" name="{}" value="{}">"#,
                    name,
                    escape_html(v)
                )
            })
        })
        .collect::<Vec<_>>()
        .join("\n      ");

    let error = error
        .map(|e| format!(r#"<p class="error">{}</p>"#, escape_html(e)))
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html>
  <head><meta charset="utf-8"><title>Sign in</title></head>
  <body>
    <h1>Sign in</h1>
    {error}
    <form method="post" action="/authorize">
      {hidden}
      <label>Username <input type="text" name="user" autocomplete="username" required></label>
      <label>Password <input type="password" name="password" autocomplete="current-password" required></label>
      <button type="submit">Sign in</button>
    </form>
  </body>
</html>
"#
    )
}
