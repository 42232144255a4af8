use serde::Deserialize;

use celastrina_core::error::CelastrinaError;

/// The remote config-store block read from the
/// `celastrinajs.core.property.appconfig.config` environment key:
///
/// ```json
/// { "store": "my-store", "label": "production", "timeout": 2000,
///   "resource": "managed-identity", "followKeyVaultReference": true }
/// ```
///
/// `store` is the config-store subdomain; `resource` names the resource
/// authorization used for bearer tokens (the system managed identity when
/// omitted).
#[derive(Clone, Debug, Deserialize)]
pub struct AppConfigSettings {
    pub store: String,
    #[serde(default = "default_label")]
    pub label: String,
    #[serde(default = "default_timeout_ms", rename = "timeout")]
    pub timeout_ms: u64,
    #[serde(default, rename = "resource")]
    pub resource_id: Option<String>,
    #[serde(default = "default_follow", rename = "followKeyVaultReference")]
    pub follow_key_vault_reference: bool,
}

fn default_label() -> String {
    "development".to_string()
}

fn default_timeout_ms() -> u64 {
    2000
}

fn default_follow() -> bool {
    true
}

impl AppConfigSettings {
    pub fn new(store: impl Into<String>) -> Self {
        Self {
            store: store.into(),
            label: default_label(),
            timeout_ms: default_timeout_ms(),
            resource_id: None,
            follow_key_vault_reference: true,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Parse the JSON block. The store name must be non-empty.
    pub fn parse(raw: &str) -> Result<Self, CelastrinaError> {
        let settings: AppConfigSettings = serde_json::from_str(raw).map_err(|e| {
            CelastrinaError::configuration("invalid app configuration block").with_cause(e)
        })?;
        if settings.store.trim().is_empty() {
            return Err(CelastrinaError::validation(
                "app configuration store must not be empty",
                "store",
            ));
        }
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_with_defaults() {
        let settings = AppConfigSettings::parse(r#"{"store": "acme"}"#).unwrap();
        assert_eq!(settings.store, "acme");
        assert_eq!(settings.label, "development");
        assert_eq!(settings.timeout_ms, 2000);
        assert!(settings.resource_id.is_none());
        assert!(settings.follow_key_vault_reference);
    }

    #[test]
    fn parses_full_block() {
        let settings = AppConfigSettings::parse(
            r#"{"store": "acme", "label": "production", "timeout": 500,
                "resource": "app", "followKeyVaultReference": false}"#,
        )
        .unwrap();
        assert_eq!(settings.label, "production");
        assert_eq!(settings.timeout_ms, 500);
        assert_eq!(settings.resource_id.as_deref(), Some("app"));
        assert!(!settings.follow_key_vault_reference);
    }

    #[test]
    fn empty_store_fails() {
        let err = AppConfigSettings::parse(r#"{"store": "  "}"#).unwrap_err();
        assert_eq!(err.tag(), Some("store"));
    }
}
