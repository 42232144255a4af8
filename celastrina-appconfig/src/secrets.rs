use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use celastrina_core::error::CelastrinaError;
use celastrina_core::resources::ResourceManager;

use crate::client::{build_client, map_transport};

/// API version spoken to the secret store.
pub const SECRET_API_VERSION: &str = "7.1";

/// A secret-store reference as carried by a config-store value.
#[derive(Clone, Debug, Deserialize)]
pub struct KeyVaultReference {
    pub uri: String,
}

#[derive(Deserialize)]
struct SecretBundle {
    value: String,
}

/// Fetches secrets by URI with a bearer token scoped to the secret store's
/// origin.
pub struct SecretClient {
    client: reqwest::Client,
    resources: Arc<ResourceManager>,
    authorization_id: Option<String>,
}

impl SecretClient {
    pub fn new(
        timeout: Duration,
        resources: Arc<ResourceManager>,
        authorization_id: Option<String>,
    ) -> Result<Self, CelastrinaError> {
        Ok(Self {
            client: build_client(timeout)?,
            resources,
            authorization_id,
        })
    }

    /// Fetch `{uri}?api-version=7.1` and return the secret's `value`.
    pub async fn get_secret(&self, uri: &str) -> Result<String, CelastrinaError> {
        let parsed = url::Url::parse(uri).map_err(|e| {
            CelastrinaError::configuration(format!("invalid secret reference uri '{uri}'"))
                .with_cause(e)
        })?;
        let resource = parsed.origin().ascii_serialization();
        let token = self
            .resources
            .get_token(&resource, self.authorization_id.as_deref())
            .await?;

        let response = self
            .client
            .get(parsed)
            .query(&[("api-version", SECRET_API_VERSION)])
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| map_transport(e, "secret store"))?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(CelastrinaError::not_found(format!(
                "secret '{uri}' not found"
            )));
        }
        if !status.is_success() {
            return Err(CelastrinaError::configuration(format!(
                "secret store returned {status} for '{uri}'"
            ))
            .with_code(status.as_u16()));
        }

        let bundle: SecretBundle = response.json().await.map_err(|e| {
            CelastrinaError::configuration(format!(
                "secret store returned an invalid payload for '{uri}'"
            ))
            .with_cause(e)
        })?;
        Ok(bundle.value)
    }
}
