use axum::{
    async_trait,
    extract::{
        rejection::TypedHeaderRejectionReason, FromRef, FromRequestParts, TypedHeader,
    },
    headers::{authorization::Bearer, Authorization},
    http::{header, request::Parts, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::{
    config::Settings,
    openid::{ConfigCache, OpenIdError},
    AppState,
};

/// Bearer token validation, as seen by the request handlers.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// Fetches the provider metadata. Must succeed before serving requests.
    async fn load_config(&self) -> Result<(), OpenIdError>;

    fn authenticate(&self, token: &str, required_scope: &str) -> Result<User, AuthError>;
}

/// Azure AD single-tenant bearer scheme.
pub struct AzureScheme {
    app_client_id: String,
    config_url: String,
    http: reqwest::Client,
    cache: ConfigCache,
}

impl AzureScheme {
    pub fn new(settings: &Settings) -> Result<Self, OpenIdError> {
        let http = reqwest::Client::builder()
            .connect_timeout(settings.openid_timeout)
            .timeout(settings.openid_timeout)
            .build()
            .map_err(|e| {
                tracing::error!("{}", e);
                OpenIdError::InternalServerError
            })?;
        Ok(Self {
            app_client_id: settings.app_client_id.clone(),
            config_url: settings.openid_config_url.clone(),
            http,
            cache: ConfigCache::default(),
        })
    }

    pub fn spawn_refresh(&self, interval: std::time::Duration) -> tokio::task::JoinHandle<()> {
        self.cache
            .spawn_refresh(self.http.clone(), self.config_url.clone(), interval)
    }

    fn validation(&self, issuer: &str) -> Validation {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[issuer]);
        // v2 access tokens carry the bare client id.
        validation.set_audience(&[&self.app_client_id]);
        validation.validate_nbf = true;
        validation
    }
}

#[async_trait]
impl TokenValidator for AzureScheme {
    async fn load_config(&self) -> Result<(), OpenIdError> {
        self.cache.load(&self.http, &self.config_url).await
    }

    fn authenticate(&self, token: &str, required_scope: &str) -> Result<User, AuthError> {
        let kid = decode_header(token)
            .map_err(|e| {
                tracing::debug!("{:?}", e);
                AuthError::InvalidToken
            })?
            .kid
            .ok_or(AuthError::InvalidToken)?;

        let user = self
            .cache
            .with(|config| {
                let config = config.ok_or_else(|| {
                    tracing::warn!("OpenID configuration not loaded");
                    AuthError::InvalidToken
                })?;
                let key = config.keys.get(&kid).ok_or_else(|| {
                    tracing::debug!("unknown kid {}", kid);
                    AuthError::InvalidToken
                })?;
                decode::<User>(token, key, &self.validation(&config.issuer))
                    .map(|data| data.claims)
                    .map_err(|e| {
                        tracing::debug!("{:?}", e);
                        AuthError::InvalidToken
                    })
            })
            .map_err(|_| AuthError::InternalServer)??;

        if !user.has_scope(required_scope) {
            tracing::debug!("token lacks scope {}", required_scope);
            return Err(AuthError::InsufficientScope);
        }
        Ok(user)
    }
}

/// Claims of a verified access token, exactly as the token carries them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct User {
    pub claims: serde_json::Map<String, serde_json::Value>,
}

impl User {
    fn str_claim(&self, name: &str) -> Option<&str> {
        self.claims.get(name).and_then(|v| v.as_str())
    }

    pub fn subject(&self) -> Option<&str> {
        self.str_claim("sub")
    }

    pub fn name(&self) -> Option<&str> {
        self.str_claim("name")
    }

    /// Delegated scopes from the space separated `scp` claim.
    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.str_claim("scp").unwrap_or_default().split_whitespace()
    }

    /// `api://<client>/<name>` is granted by either the full uri or `<name>`.
    ///
    /// `scp` names are not qualified by application, so a bare `<name>` only
    /// means this api because the audience was already checked against our
    /// client id during decoding.
    pub fn has_scope(&self, required: &str) -> bool {
        let short = required.rsplit('/').next().unwrap_or(required);
        self.scopes().any(|s| s == required || s == short)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for User
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|e| match e.reason() {
                    TypedHeaderRejectionReason::Missing => AuthError::MissingToken,
                    _ => AuthError::InvalidToken,
                })?;
        let state = AppState::from_ref(state);
        state
            .validator
            .authenticate(bearer.token(), &state.settings.scope_name())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("invalid token")]
    InvalidToken,
    #[error("insufficient scope")]
    InsufficientScope,
    #[error("internal server error")]
    InternalServer,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "Not authenticated"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid token"),
            AuthError::InsufficientScope => (StatusCode::FORBIDDEN, "Insufficient scope"),
            AuthError::InternalServer => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };
        tracing::debug!("{}, {}", status, error_message);

        let body = Json(json!({
            "error": error_message,
        }));
        let mut response = (status, body).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
