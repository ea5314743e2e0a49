use std::{collections::HashMap, env, net::SocketAddr, time::Duration};

use thiserror::Error;

const DEFAULT_CORS_ORIGIN: &str = "http://localhost:8000";
const DEFAULT_SCOPE_DESCRIPTION: &str = "user_impersonation";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8000";
const DEFAULT_OPENID_TIMEOUT: Duration = Duration::from_secs(10);
const AUTHORITY: &str = "https://login.microsoftonline.com";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Process settings, read once at startup and shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct Settings {
    pub cors_origins: Vec<String>,
    pub openapi_client_id: String,
    pub app_client_id: String,
    pub tenant_id: String,
    pub scope_description: String,
    pub bind_addr: SocketAddr,
    pub openid_config_url: String,
    /// Zero disables refreshing of the signing keys after startup.
    pub jwks_refresh_interval: Duration,
    /// Applies to each request made to the identity provider.
    pub openid_timeout: Duration,
}

impl Settings {
    /// Reads `.env` (if any) and then the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!("loaded {}", path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => tracing::warn!("ignoring .env: {}", e),
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let cors_origins = match lookup("BACKEND_CORS_ORIGINS") {
            Some(raw) => parse_origins(&raw)?,
            None => vec![DEFAULT_CORS_ORIGIN.to_string()],
        };

        let tenant_id = lookup("TENANT_ID").unwrap_or_default();

        let bind_addr = lookup("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("BIND_ADDR"))?;

        let openid_config_url = lookup("OPENID_CONFIG_URL").unwrap_or_else(|| {
            format!("{AUTHORITY}/{tenant_id}/v2.0/.well-known/openid-configuration")
        });

        let jwks_refresh_interval = match lookup("JWKS_REFRESH_SECONDS") {
            Some(s) => Duration::from_secs(
                s.trim()
                    .parse()
                    .map_err(|_| ConfigError::Invalid("JWKS_REFRESH_SECONDS"))?,
            ),
            None => Duration::ZERO,
        };

        let openid_timeout = match lookup("OPENID_TIMEOUT_SECONDS") {
            Some(s) => match s.trim().parse() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => return Err(ConfigError::Invalid("OPENID_TIMEOUT_SECONDS")),
            },
            None => DEFAULT_OPENID_TIMEOUT,
        };

        Ok(Self {
            cors_origins,
            openapi_client_id: lookup("OPENAPI_CLIENT_ID").unwrap_or_default(),
            app_client_id: lookup("APP_CLIENT_ID").unwrap_or_default(),
            tenant_id,
            scope_description: lookup("SCOPE_DESCRIPTION")
                .unwrap_or_else(|| DEFAULT_SCOPE_DESCRIPTION.to_string()),
            bind_addr,
            openid_config_url,
            jwks_refresh_interval,
            openid_timeout,
        })
    }

    pub fn scope_name(&self) -> String {
        format!("api://{}/{}", self.app_client_id, self.scope_description)
    }

    pub fn scopes(&self) -> HashMap<String, String> {
        HashMap::from([(self.scope_name(), self.scope_description.clone())])
    }

    pub fn authorization_url(&self) -> String {
        format!("{AUTHORITY}/{}/oauth2/v2.0/authorize", self.tenant_id)
    }

    pub fn token_url(&self) -> String {
        format!("{AUTHORITY}/{}/oauth2/v2.0/token", self.tenant_id)
    }
}

/// Accepts a JSON array or a comma separated list.
fn parse_origins(raw: &str) -> Result<Vec<String>, ConfigError> {
    let raw = raw.trim();
    let origins: Vec<String> = if raw.starts_with('[') {
        serde_json::from_str(raw).map_err(|_| ConfigError::Invalid("BACKEND_CORS_ORIGINS"))?
    } else {
        raw.split(',').map(str::to_string).collect()
    };
    Ok(origins
        .iter()
        .map(|s| s.trim().trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .collect())
}
