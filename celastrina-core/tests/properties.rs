use std::sync::Arc;

use celastrina_core::configuration::{BootstrapConfig, Configuration};
use celastrina_core::envelope::LocalEnvelope;
use celastrina_core::properties::{AppSettingsPropertyManager, PropertyManager, PropertyValue};

fn bootstrap_with_cache(block: &str) -> BootstrapConfig {
    BootstrapConfig {
        property_config: Some(block.to_string()),
        ..BootstrapConfig::default()
    }
}

#[tokio::test]
async fn cache_block_wraps_the_property_manager() {
    let mut config = Configuration::new("props-cache").unwrap();
    config.set_bootstrap(bootstrap_with_cache(
        r#"{"active": true, "ttl": 5, "unit": "minutes", "controls": []}"#,
    ));
    config.set_property_manager(Arc::new(
        AppSettingsPropertyManager::new().with_override("greeting", "hello"),
    ));
    let config = Arc::new(config);
    let envelope = LocalEnvelope::new();
    config.initialize(&envelope).await.unwrap();

    let properties = config.properties().unwrap();
    assert_eq!(properties.name(), "Cached(AppSettings)");
    assert_eq!(
        properties.get_property("greeting").await.unwrap(),
        Some("hello".to_string())
    );
}

#[tokio::test]
async fn inactive_cache_block_leaves_the_manager_bare() {
    let mut config = Configuration::new("props-no-cache").unwrap();
    config.set_bootstrap(bootstrap_with_cache(r#"{"active": false}"#));
    let config = Arc::new(config);
    let envelope = LocalEnvelope::new();
    config.initialize(&envelope).await.unwrap();

    assert_eq!(config.properties().unwrap().name(), "AppSettings");
}

#[tokio::test]
async fn malformed_cache_block_fails_initialization() {
    let mut config = Configuration::new("props-bad-cache").unwrap();
    config.set_bootstrap(bootstrap_with_cache("{not json"));
    let config = Arc::new(config);
    let envelope = LocalEnvelope::new();
    let err = config.initialize(&envelope).await.unwrap_err();
    assert!(err.to_string().contains("cache control block"));
}

#[tokio::test]
async fn local_development_forces_app_settings() {
    let mut config = Configuration::new("props-local-dev").unwrap();
    config.set_bootstrap(BootstrapConfig {
        local_development: true,
        ..BootstrapConfig::default()
    });
    // A custom manager is configured, but the override wins.
    config.set_property_manager(Arc::new(
        AppSettingsPropertyManager::new().with_override("who", "custom"),
    ));
    let config = Arc::new(config);
    let envelope = LocalEnvelope::new();
    config.initialize(&envelope).await.unwrap();

    let properties = config.properties().unwrap();
    assert_eq!(properties.name(), "AppSettings");
    assert_eq!(properties.get_property("who").await.unwrap(), None);
}

#[tokio::test]
async fn non_numeric_number_property_is_a_configuration_error() {
    let manager = AppSettingsPropertyManager::new().with_override("count", "a-few");
    let err = manager.get_number("count").await.unwrap_err();
    assert_eq!(err.code(), 500);
    assert!(err.to_string().contains("not a number"));
}

#[tokio::test]
async fn missing_typed_properties_yield_none() {
    let manager = AppSettingsPropertyManager::new();
    assert!(manager
        .get_number("celastrina.props.test.absent")
        .await
        .unwrap()
        .is_none());
    assert!(manager
        .get_typed_property("celastrina.props.test.absent", "object")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn date_and_regexp_accessors_parse() {
    let manager = AppSettingsPropertyManager::new()
        .with_override("starts", "2024-05-01T10:30:00Z")
        .with_override("pattern", r"^ord-\d+$");

    let date = manager.get_date("starts").await.unwrap().unwrap();
    assert_eq!(date.timestamp(), 1_714_559_400);

    let pattern = manager.get_regexp("pattern").await.unwrap().unwrap();
    assert!(pattern.is_match("ord-42"));
    assert!(!pattern.is_match("inv-42"));

    match manager
        .get_typed_property("pattern", "regexp")
        .await
        .unwrap()
    {
        Some(PropertyValue::RegExp(re)) => assert!(re.is_match("ord-1")),
        other => panic!("expected a regexp, got {other:?}"),
    }
}
