use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use celastrina_core::error::CelastrinaError;
use celastrina_core::resources::ResourceManager;

/// API version spoken to the config store.
pub const CONFIG_API_VERSION: &str = "1.0";

/// Content type marking a feature-flag key/value pair.
pub const FEATURE_FLAG_CONTENT_TYPE: &str = "application/vnd.microsoft.appconfig.ff+json";

/// Content type marking a secret-store reference.
pub const KEYVAULT_REF_CONTENT_TYPE: &str =
    "application/vnd.microsoft.appconfig.keyvaultref+json";

/// One key/value pair as returned by the config store.
#[derive(Clone, Debug, Deserialize)]
pub struct KeyValueItem {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    pub value: String,
}

pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client, CelastrinaError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| {
            CelastrinaError::configuration("failed to build the HTTP client").with_cause(e)
        })
}

pub(crate) fn map_transport(err: reqwest::Error, what: &str) -> CelastrinaError {
    if err.is_timeout() {
        CelastrinaError::transient(format!("{what} request timed out")).with_cause(err)
    } else {
        CelastrinaError::transient(format!("{what} unreachable")).with_cause(err)
    }
}

/// HTTP client for `GET {endpoint}/kv/{key}?label=...&api-version=1.0`
/// with a bearer token from the configured resource authorization.
pub struct AppConfigClient {
    endpoint: String,
    label: String,
    client: reqwest::Client,
    resources: Arc<ResourceManager>,
    authorization_id: Option<String>,
}

impl AppConfigClient {
    pub fn new(
        endpoint: impl Into<String>,
        label: impl Into<String>,
        timeout: Duration,
        resources: Arc<ResourceManager>,
        authorization_id: Option<String>,
    ) -> Result<Self, CelastrinaError> {
        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            label: label.into(),
            client: build_client(timeout)?,
            resources,
            authorization_id,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Fetch a key/value pair. `None` on a 404 from the store.
    pub async fn get_key_value(
        &self,
        key: &str,
    ) -> Result<Option<KeyValueItem>, CelastrinaError> {
        let token = self
            .resources
            .get_token(&self.endpoint, self.authorization_id.as_deref())
            .await?;

        let response = self
            .client
            .get(format!("{}/kv/{key}", self.endpoint))
            .query(&[
                ("label", self.label.as_str()),
                ("api-version", CONFIG_API_VERSION),
            ])
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| map_transport(e, "config store"))?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(CelastrinaError::configuration(format!(
                "config store returned {status} for key '{key}'"
            ))
            .with_code(status.as_u16()));
        }

        let item: KeyValueItem = response.json().await.map_err(|e| {
            CelastrinaError::configuration(format!(
                "config store returned an invalid payload for key '{key}'"
            ))
            .with_cause(e)
        })?;
        Ok(Some(item))
    }
}
