//! Remote config-store property manager for celastrina.
//!
//! [`AppConfigPropertyManager`] implements the core
//! [`PropertyManager`](celastrina_core::properties::PropertyManager)
//! contract against a hosted key/value store, resolving secret references
//! through the secret store with bearer tokens from the configuration's
//! resource authorizations.
//!
//! ```ignore
//! let bootstrap = BootstrapConfig::from_env();
//! if let Some(manager) = AppConfigPropertyManager::from_bootstrap(&bootstrap)? {
//!     configuration.set_property_manager(Arc::new(manager));
//! }
//! ```

pub mod client;
pub mod config;
pub mod manager;
pub mod secrets;

pub use client::{
    AppConfigClient, KeyValueItem, CONFIG_API_VERSION, FEATURE_FLAG_CONTENT_TYPE,
    KEYVAULT_REF_CONTENT_TYPE,
};
pub use config::AppConfigSettings;
pub use manager::AppConfigPropertyManager;
pub use secrets::{KeyVaultReference, SecretClient, SECRET_API_VERSION};
