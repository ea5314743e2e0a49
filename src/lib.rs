use axum::{http::HeaderValue, Router};
use std::sync::Arc;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

pub mod auth;
pub mod config;
pub mod docs;
pub mod openid;
mod routes;

use auth::{AzureScheme, TokenValidator};
use config::Settings;
use openid::OpenIdError;

/// Shared by every request; cloning only bumps reference counts.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub validator: Arc<dyn TokenValidator>,
}

impl AppState {
    pub fn new(settings: Settings, validator: Arc<dyn TokenValidator>) -> Self {
        Self {
            settings: Arc::new(settings),
            validator,
        }
    }
}

/// Loads the OpenID configuration. No request can be served before this returns.
pub async fn init(settings: Settings) -> Result<AppState, OpenIdError> {
    if settings.tenant_id.is_empty() || settings.app_client_id.is_empty() {
        tracing::warn!("TENANT_ID or APP_CLIENT_ID is empty, no token will be accepted");
    }
    let scheme = AzureScheme::new(&settings)?;
    scheme.load_config().await?;
    if !settings.jwks_refresh_interval.is_zero() {
        scheme.spawn_refresh(settings.jwks_refresh_interval);
    }
    Ok(AppState::new(settings, Arc::new(scheme)))
}

pub fn router(state: AppState) -> Router {
    let cors = cors(&state.settings);
    let router = Router::new()
        .merge(routes::router())
        .merge(docs::router())
        .with_state(state)
        .layer(TraceLayer::new_for_http());
    match cors {
        Some(cors) => router.layer(cors),
        None => router,
    }
}

pub async fn app(settings: Settings) -> Result<Router, OpenIdError> {
    Ok(router(init(settings).await?))
}

fn cors(settings: &Settings) -> Option<CorsLayer> {
    if settings.cors_origins.is_empty() {
        return None;
    }
    let allow_origin = if settings.cors_origins.iter().any(|o| o == "*") {
        AllowOrigin::mirror_request()
    } else {
        AllowOrigin::list(settings.cors_origins.iter().filter_map(|origin| {
            HeaderValue::from_str(origin)
                .map_err(|_| tracing::warn!("ignoring CORS origin {:?}", origin))
                .ok()
        }))
    };
    Some(
        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_credentials(true)
            .allow_methods(AllowMethods::mirror_request())
            .allow_headers(AllowHeaders::mirror_request()),
    )
}
