pub mod cached;
pub mod typed;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, FixedOffset};

use crate::error::CelastrinaError;

pub use cached::{CacheConfig, CacheControl, CachedPropertyManager, TtlUnit};

/// A typed property value produced by
/// [`PropertyManager::get_typed_property`].
#[derive(Clone, Debug)]
pub enum PropertyValue {
    String(String),
    Number(f64),
    Boolean(bool),
    Date(DateTime<FixedOffset>),
    RegExp(regex::Regex),
    Object(serde_json::Value),
}

/// Validate a property key: trimmed, non-empty, no internal whitespace.
///
/// Returns the trimmed key.
pub fn validate_property_key(key: &str) -> Result<&str, CelastrinaError> {
    let key = key.trim();
    if key.is_empty() {
        return Err(CelastrinaError::validation(
            "property key must not be empty",
            "key",
        ));
    }
    if key.chars().any(char::is_whitespace) {
        return Err(CelastrinaError::validation(
            format!("property key '{key}' must not contain whitespace"),
            "key",
        ));
    }
    Ok(key)
}

/// Fetches typed properties by string key from a source (process
/// environment, remote configuration store, cache).
///
/// Only `get_property` is source-specific; the typed accessors fetch the raw
/// string and parse it. A parse failure on a non-null raw value is a
/// configuration error; a null raw value yields `None` and the caller's
/// default applies.
pub trait PropertyManager: Send + Sync {
    /// Source name for diagnostics.
    fn name(&self) -> &str;

    /// Fetch the raw string value for a key, or `None` when the source does
    /// not know the key.
    fn get_property<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, CelastrinaError>> + Send + 'a>>;

    /// Fetch a property, substituting a default for a null value.
    fn get_property_or<'a>(
        &'a self,
        key: &'a str,
        default: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, CelastrinaError>> + Send + 'a>> {
        Box::pin(async move {
            Ok(self
                .get_property(key)
                .await?
                .unwrap_or_else(|| default.to_string()))
        })
    }

    fn get_number<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<f64>, CelastrinaError>> + Send + 'a>> {
        Box::pin(async move {
            match self.get_property(key).await? {
                Some(raw) => Ok(Some(typed::parse_number(key, &raw)?)),
                None => Ok(None),
            }
        })
    }

    fn get_boolean<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<bool>, CelastrinaError>> + Send + 'a>> {
        Box::pin(async move {
            match self.get_property(key).await? {
                Some(raw) => Ok(Some(typed::parse_boolean(key, &raw)?)),
                None => Ok(None),
            }
        })
    }

    fn get_date<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<
        Box<
            dyn Future<Output = Result<Option<DateTime<FixedOffset>>, CelastrinaError>>
                + Send
                + 'a,
        >,
    > {
        Box::pin(async move {
            match self.get_property(key).await? {
                Some(raw) => Ok(Some(typed::parse_date(key, &raw)?)),
                None => Ok(None),
            }
        })
    }

    fn get_regexp<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<regex::Regex>, CelastrinaError>> + Send + 'a>>
    {
        Box::pin(async move {
            match self.get_property(key).await? {
                Some(raw) => Ok(Some(typed::parse_regexp(key, &raw)?)),
                None => Ok(None),
            }
        })
    }

    fn get_object<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<
        Box<dyn Future<Output = Result<Option<serde_json::Value>, CelastrinaError>> + Send + 'a>,
    > {
        Box::pin(async move {
            match self.get_property(key).await? {
                Some(raw) => Ok(Some(typed::parse_object(key, &raw)?)),
                None => Ok(None),
            }
        })
    }

    /// Dispatch on a type name: `property`/`string`, `number`, `boolean`,
    /// `date`, `regexp`, or `object`. An unknown type name fails validation.
    fn get_typed_property<'a>(
        &'a self,
        key: &'a str,
        type_name: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<PropertyValue>, CelastrinaError>> + Send + 'a>>
    {
        Box::pin(async move {
            match type_name {
                "property" | "string" => {
                    Ok(self.get_property(key).await?.map(PropertyValue::String))
                }
                "number" => Ok(self.get_number(key).await?.map(PropertyValue::Number)),
                "boolean" => Ok(self.get_boolean(key).await?.map(PropertyValue::Boolean)),
                "date" => Ok(self.get_date(key).await?.map(PropertyValue::Date)),
                "regexp" => Ok(self.get_regexp(key).await?.map(PropertyValue::RegExp)),
                "object" => Ok(self.get_object(key).await?.map(PropertyValue::Object)),
                other => Err(CelastrinaError::validation(
                    format!("unknown property type '{other}'"),
                    "type",
                )),
            }
        })
    }
}

/// Property manager backed by the process environment.
///
/// Lookup is synchronous at the boundary but exposed as async for
/// uniformity with the remote managers. An override map layered over the
/// environment supports tests and local development.
#[derive(Debug, Default)]
pub struct AppSettingsPropertyManager {
    overrides: HashMap<String, String>,
}

impl AppSettingsPropertyManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_override(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.insert(key.into(), value.into());
        self
    }
}

impl PropertyManager for AppSettingsPropertyManager {
    fn name(&self) -> &str {
        "AppSettings"
    }

    fn get_property<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, CelastrinaError>> + Send + 'a>> {
        Box::pin(async move {
            if let Some(value) = self.overrides.get(key) {
                return Ok(Some(value.clone()));
            }
            Ok(std::env::var(key).ok())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn overrides_shadow_environment() {
        let manager = AppSettingsPropertyManager::new().with_override("k", "from-override");
        assert_eq!(
            manager.get_property("k").await.unwrap(),
            Some("from-override".to_string())
        );
    }

    #[tokio::test]
    async fn environment_lookup() {
        unsafe { std::env::set_var("CELASTRINA_TEST_PROP", "v1") };
        let manager = AppSettingsPropertyManager::new();
        assert_eq!(
            manager.get_property("CELASTRINA_TEST_PROP").await.unwrap(),
            Some("v1".to_string())
        );
        unsafe { std::env::remove_var("CELASTRINA_TEST_PROP") };
    }

    #[tokio::test]
    async fn missing_key_yields_default() {
        let manager = AppSettingsPropertyManager::new();
        assert_eq!(
            manager
                .get_property_or("celastrina-missing-key", "fallback")
                .await
                .unwrap(),
            "fallback"
        );
    }

    #[tokio::test]
    async fn typed_dispatch() {
        let manager = AppSettingsPropertyManager::new()
            .with_override("n", "42")
            .with_override("b", "true");
        match manager.get_typed_property("n", "number").await.unwrap() {
            Some(PropertyValue::Number(n)) => assert_eq!(n, 42.0),
            other => panic!("expected number, got {other:?}"),
        }
        match manager.get_typed_property("b", "boolean").await.unwrap() {
            Some(PropertyValue::Boolean(b)) => assert!(b),
            other => panic!("expected boolean, got {other:?}"),
        }
        let err = manager
            .get_typed_property("n", "duration")
            .await
            .unwrap_err();
        assert_eq!(err.tag(), Some("type"));
    }

    #[test]
    fn key_validation() {
        assert_eq!(validate_property_key("  app.name  ").unwrap(), "app.name");
        assert!(validate_property_key("").is_err());
        assert!(validate_property_key("app name").is_err());
    }
}
