#![allow(dead_code)]

use aadapi::{
    auth::{AuthError, TokenValidator, User},
    config::Settings,
    openid::OpenIdError,
};
use axum::{
    async_trait,
    body::Body,
    http::{header, HeaderMap, Request, StatusCode},
    routing::get,
    Json, Router,
};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use std::{
    collections::HashMap,
    time::{SystemTime, UNIX_EPOCH},
};
use tower::ServiceExt;

pub const TENANT: &str = "test-tenant";
pub const CLIENT: &str = "api-client";
pub const ISSUER: &str = "https://login.microsoftonline.com/test-tenant/v2.0";
pub const SCOPE: &str = "api://api-client/user_impersonation";
pub const KID: &str = "idp-signing-key";
pub const JWKS: &str = include_str!("../fixtures/jwks.json");
pub const IDP_KEY: &str = include_str!("../fixtures/idp_key.pem");
pub const ROGUE_KEY: &str = include_str!("../fixtures/rogue_key.pem");
pub const WELL_KNOWN: &str = "test-tenant/v2.0/.well-known/openid-configuration";

/// Serves `routes(base_url)` on an ephemeral local port and returns the base url.
pub fn serve(routes: impl FnOnce(&str) -> Router) -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let server = axum::Server::from_tcp(listener)
        .unwrap()
        .serve(routes(&base).into_make_service());
    tokio::spawn(server);
    base
}

pub fn discovery(base: &str) -> Value {
    json!({
        "issuer": ISSUER,
        "authorization_endpoint": format!("{base}/{TENANT}/oauth2/v2.0/authorize"),
        "token_endpoint": format!("{base}/{TENANT}/oauth2/v2.0/token"),
        "jwks_uri": format!("{base}/{TENANT}/discovery/v2.0/keys"),
        "id_token_signing_alg_values_supported": ["RS256"],
    })
}

pub fn idp_routes(base: &str, jwks: &'static str) -> Router {
    let discovery = discovery(base);
    Router::new()
        .route(
            &format!("/{WELL_KNOWN}"),
            get(move || async move { Json(discovery) }),
        )
        .route(
            &format!("/{TENANT}/discovery/v2.0/keys"),
            get(move || async move { ([(header::CONTENT_TYPE, "application/json")], jwks) }),
        )
}

/// A local stand-in for the tenant's discovery and key endpoints.
pub fn spawn_idp() -> String {
    serve(|base| idp_routes(base, JWKS))
}

pub fn settings(vars: &[(&str, &str)]) -> Settings {
    let mut all: HashMap<String, String> = HashMap::from([
        ("TENANT_ID".to_string(), TENANT.to_string()),
        ("APP_CLIENT_ID".to_string(), CLIENT.to_string()),
        ("OPENAPI_CLIENT_ID".to_string(), "swagger-client".to_string()),
    ]);
    for (k, v) in vars {
        all.insert(k.to_string(), v.to_string());
    }
    Settings::from_lookup(|k| all.get(k).cloned()).unwrap()
}

pub fn idp_settings(base: &str) -> Settings {
    let url = format!("{base}/{WELL_KNOWN}");
    settings(&[("OPENID_CONFIG_URL", url.as_str())])
}

pub async fn app() -> Router {
    let base = spawn_idp();
    aadapi::app(idp_settings(&base)).await.unwrap()
}

pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

pub fn claims(scp: &str) -> Value {
    let now = now();
    json!({
        "aud": CLIENT,
        "iss": ISSUER,
        "iat": now,
        "nbf": now,
        "exp": now + 3600,
        "sub": "AAAAAAAAAAAAAAAAAAAAAIkzqFVrSaSaFHy782bbtaQ",
        "oid": "00000000-0000-0000-66f3-3332eca7ea81",
        "tid": TENANT,
        "name": "Ada Lovelace",
        "preferred_username": "ada@contoso.test",
        "scp": scp,
        "ver": "2.0",
        "azp": "swagger-client",
    })
}

pub fn sign(claims: &Value, pem: &str, kid: &str) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    encode(
        &header,
        claims,
        &EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap(),
    )
    .unwrap()
}

pub fn token(claims: &Value) -> String {
    sign(claims, IDP_KEY, KID)
}

pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, body)
}

pub async fn call(app: Router, uri: &str, authorization: Option<&str>) -> (StatusCode, HeaderMap, Value) {
    let mut request = Request::builder().method("GET").uri(uri);
    if let Some(value) = authorization {
        request = request.header(header::AUTHORIZATION, value);
    }
    send(app, request.body(Body::empty()).unwrap()).await
}

pub async fn get_with_token(app: Router, uri: &str, token: &str) -> (StatusCode, HeaderMap, Value) {
    call(app, uri, Some(&format!("Bearer {token}"))).await
}

/// Accepts exactly one token and one scope, without any provider.
pub struct StubValidator {
    pub token: String,
    pub scope: String,
    pub user: User,
}

impl StubValidator {
    pub fn new() -> Self {
        Self {
            token: "good".to_string(),
            scope: SCOPE.to_string(),
            user: serde_json::from_value(claims("user_impersonation")).unwrap(),
        }
    }
}

#[async_trait]
impl TokenValidator for StubValidator {
    async fn load_config(&self) -> Result<(), OpenIdError> {
        Ok(())
    }

    fn authenticate(&self, token: &str, required_scope: &str) -> Result<User, AuthError> {
        if token != self.token {
            Err(AuthError::InvalidToken)
        } else if required_scope != self.scope {
            Err(AuthError::InsufficientScope)
        } else {
            Ok(self.user.clone())
        }
    }
}
