use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use celastrina_core::configuration::BootstrapConfig;
use celastrina_core::error::CelastrinaError;
use celastrina_core::identity::ManagedIdentityResolver;
use celastrina_core::properties::PropertyManager;
use celastrina_core::resources::{
    ResourceAuthorization, ResourceManager, MANAGED_IDENTITY_RESOURCE_ID,
};

use crate::client::{AppConfigClient, KEYVAULT_REF_CONTENT_TYPE};
use crate::config::AppConfigSettings;
use crate::secrets::{KeyVaultReference, SecretClient};

/// Property manager backed by a remote config store.
///
/// Key lookups hit `https://{store}.azconfig.io/kv/{key}` with the
/// configured label; secret references are resolved through the secret
/// store; feature flags and plain pairs return their raw value (the typed
/// accessors parse them). A 404 from the store falls back to the process
/// environment so locally-set keys keep working.
pub struct AppConfigPropertyManager {
    name: String,
    client: AppConfigClient,
    secrets: SecretClient,
    follow_key_vault_reference: bool,
    env_fallback: bool,
}

impl AppConfigPropertyManager {
    /// Build against the production store endpoint derived from the store
    /// name.
    pub fn new(
        settings: AppConfigSettings,
        resources: Arc<ResourceManager>,
    ) -> Result<Self, CelastrinaError> {
        let endpoint = format!("https://{}.azconfig.io", settings.store);
        Self::with_endpoint(settings, resources, endpoint)
    }

    /// Build against an explicit endpoint (sovereign clouds, tests).
    pub fn with_endpoint(
        settings: AppConfigSettings,
        resources: Arc<ResourceManager>,
        endpoint: impl Into<String>,
    ) -> Result<Self, CelastrinaError> {
        let timeout = Duration::from_millis(settings.timeout_ms);
        let client = AppConfigClient::new(
            endpoint,
            settings.label.clone(),
            timeout,
            resources.clone(),
            settings.resource_id.clone(),
        )?;
        let secrets = SecretClient::new(timeout, resources, settings.resource_id.clone())?;
        Ok(Self {
            name: format!("AppConfig({})", settings.store),
            client,
            secrets,
            follow_key_vault_reference: settings.follow_key_vault_reference,
            env_fallback: true,
        })
    }

    /// Build from the bootstrap snapshot: parses the
    /// `celastrinajs.core.property.appconfig.config` block and wires a
    /// resource manager around the host's managed identity.
    ///
    /// Returns `None` when the bootstrap carries no app-config block.
    pub fn from_bootstrap(
        bootstrap: &BootstrapConfig,
    ) -> Result<Option<Self>, CelastrinaError> {
        let Some(raw) = &bootstrap.appconfig_config else {
            return Ok(None);
        };
        let settings = AppConfigSettings::parse(raw)?;

        let (endpoint, header) = match (
            &bootstrap.identity_endpoint,
            &bootstrap.identity_header,
        ) {
            (Some(endpoint), Some(header)) => (endpoint, header),
            _ => {
                return Err(CelastrinaError::configuration(
                    "the app configuration store requires the host identity endpoint",
                ))
            }
        };
        let resolver = ManagedIdentityResolver::with_timeout(
            endpoint.as_str(),
            header.as_str(),
            Duration::from_millis(settings.timeout_ms),
        )?;
        let resources = ResourceManager::new();
        resources.add_resource(ResourceAuthorization::new(
            MANAGED_IDENTITY_RESOURCE_ID,
            Box::new(resolver),
        ));
        Self::new(settings, Arc::new(resources)).map(Some)
    }

    /// Disable the environment fallback taken on a 404 from the store.
    pub fn without_env_fallback(mut self) -> Self {
        self.env_fallback = false;
        self
    }
}

impl PropertyManager for AppConfigPropertyManager {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_property<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, CelastrinaError>> + Send + 'a>> {
        Box::pin(async move {
            let Some(item) = self.client.get_key_value(key).await? else {
                if self.env_fallback {
                    tracing::debug!(key, "config store miss, falling back to the environment");
                    return Ok(std::env::var(key).ok());
                }
                return Ok(None);
            };

            if item.content_type.as_deref() == Some(KEYVAULT_REF_CONTENT_TYPE)
                && self.follow_key_vault_reference
            {
                let reference: KeyVaultReference =
                    serde_json::from_str(&item.value).map_err(|e| {
                        CelastrinaError::configuration(format!(
                            "key '{key}' carries an invalid secret reference"
                        ))
                        .with_cause(e)
                    })?;
                return Ok(Some(self.secrets.get_secret(&reference.uri).await?));
            }

            // Feature flags and plain pairs return the raw value; the typed
            // accessors parse feature-flag objects.
            Ok(Some(item.value))
        })
    }
}
