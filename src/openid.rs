use jsonwebtoken::{jwk, jwk::AlgorithmParameters, DecodingKey};
use serde::Deserialize;
use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
    time::Duration,
};
use thiserror::Error;

pub type Keys = HashMap<String, DecodingKey>;

/// Provider metadata and signing keys, as published by the discovery document.
#[derive(Clone)]
pub struct OpenIdConfig {
    pub issuer: String,
    pub authorization_endpoint: Option<String>,
    pub token_endpoint: Option<String>,
    pub jwks_uri: String,
    pub keys: Keys,
}

impl std::fmt::Debug for OpenIdConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenIdConfig")
            .field("issuer", &self.issuer)
            .field("jwks_uri", &self.jwks_uri)
            .field("keys", &self.keys.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum OpenIdError {
    #[error("OpenID configuration could not be fetched")]
    InvalidWellKnownUri,
    #[error("JWKS could not be fetched")]
    InvalidJwksUri,
    #[error("malformed OpenID configuration")]
    MissingOpenIdConfiguration,
    #[error("malformed JWKS")]
    MissingJwksSet,
    #[error("JWKS contains no usable signing keys")]
    NoSigningKeys,
    #[error("internal server error")]
    InternalServerError,
}

#[derive(Deserialize)]
struct Oid {
    issuer: String,
    authorization_endpoint: Option<String>,
    token_endpoint: Option<String>,
    jwks_uri: String,
}

/// Process-wide cache of the provider metadata. Empty until the first load.
#[derive(Clone, Default)]
pub struct ConfigCache {
    inner: Arc<RwLock<Option<OpenIdConfig>>>,
}

impl ConfigCache {
    pub async fn load(&self, client: &reqwest::Client, uri: &str) -> Result<(), OpenIdError> {
        let config = fetch(client, uri).await?;
        tracing::info!(
            issuer = %config.issuer,
            keys = config.keys.len(),
            "OpenID configuration loaded"
        );
        let mut current = self
            .inner
            .write()
            .map_err(|_| OpenIdError::InternalServerError)?;
        *current = Some(config);
        Ok(())
    }

    /// Runs `f` against the cached configuration, `None` before the first load.
    pub fn with<T>(&self, f: impl FnOnce(Option<&OpenIdConfig>) -> T) -> Result<T, OpenIdError> {
        let current = self
            .inner
            .read()
            .map_err(|_| OpenIdError::InternalServerError)?;
        Ok(f(current.as_ref()))
    }

    /// Reloads the configuration every `interval`; failures keep the previous keys.
    pub fn spawn_refresh(
        &self,
        client: reqwest::Client,
        uri: String,
        interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                match cache.load(&client, &uri).await {
                    Ok(_) => tracing::debug!("jwks updated"),
                    Err(e) => tracing::error!("Jwks not updated: {:?}", e),
                };
            }
        })
    }
}

pub async fn fetch(client: &reqwest::Client, uri: &str) -> Result<OpenIdConfig, OpenIdError> {
    let oid = client
        .get(uri)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| {
            tracing::error!("{}: {}", uri, e);
            OpenIdError::InvalidWellKnownUri
        })?
        .json::<Oid>()
        .await
        .map_err(|e| {
            tracing::error!("{}: {}", uri, e);
            OpenIdError::MissingOpenIdConfiguration
        })?;
    let jwks = client
        .get(&oid.jwks_uri)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| {
            tracing::error!("{}: {}", oid.jwks_uri, e);
            OpenIdError::InvalidJwksUri
        })?
        .json::<jwk::JwkSet>()
        .await
        .map_err(|e| {
            tracing::error!("{}: {}", oid.jwks_uri, e);
            OpenIdError::MissingJwksSet
        })?;
    let keys = jwks_to_decoding_keys(&jwks);
    if keys.is_empty() {
        return Err(OpenIdError::NoSigningKeys);
    }
    Ok(OpenIdConfig {
        issuer: oid.issuer,
        authorization_endpoint: oid.authorization_endpoint,
        token_endpoint: oid.token_endpoint,
        jwks_uri: oid.jwks_uri,
        keys,
    })
}

fn jwks_to_decoding_keys(jwks: &jwk::JwkSet) -> Keys {
    let mut hm = HashMap::new();
    for jwk in &jwks.keys {
        if let AlgorithmParameters::RSA(ref rsa) = jwk.algorithm {
            if let Ok(decoding_key) = DecodingKey::from_rsa_components(&rsa.n, &rsa.e) {
                if let Some(kid) = jwk.common.key_id.clone() {
                    hm.insert(kid, decoding_key);
                }
            }
        }
    }
    hm
}
