use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::configuration::BootstrapConfig;
use crate::error::CelastrinaError;
use crate::identity::{AppRegistrationResolver, ManagedIdentityResolver};
use crate::permission::{Permission, ValueMatch};
use crate::properties::{validate_property_key, PropertyManager};
use crate::resources::ResourceAuthorization;
use crate::sentry::{
    Authenticator, MappedRoleFactory, OpenAuthenticator, PrincipalMapping, RoleFactory,
};

/// Content-type family tagging configuration-document attributes.
pub const ATTRIBUTE_CONTENT_TYPE: &str = "application/vnd.celastrinajs.attribute+json";

const MAX_REFERENCE_DEPTH: u32 = 8;
const MAX_SPLICE_PASSES: u32 = 32;

/// A domain object materialized from a configuration-document attribute.
pub enum ParsedAttribute {
    Permission(Permission),
    Authorization(ResourceAuthorization),
    PrincipalMapping(PrincipalMapping),
    RoleFactory(Box<dyn RoleFactory>),
    Authenticator(Box<dyn Authenticator>),
    AddOnConfig {
        add_on: String,
        config: serde_json::Value,
    },
}

/// Ambient inputs available to attribute parsers.
pub struct ParserEnv<'a> {
    pub bootstrap: &'a BootstrapConfig,
    pub http_timeout: Duration,
}

/// Materializes one attribute kind into a domain object.
pub trait AttributeParser: Send + Sync {
    /// The `<Kind>` this parser accepts.
    fn kind(&self) -> &str;

    fn parse(
        &self,
        value: &serde_json::Value,
        env: &ParserEnv<'_>,
    ) -> Result<ParsedAttribute, CelastrinaError>;
}

/// Registry of attribute parsers keyed by kind. Unknown kinds are a hard
/// error; downstream crates extend the registry with their own kinds.
pub struct AttributeParserRegistry {
    parsers: HashMap<String, Box<dyn AttributeParser>>,
}

impl AttributeParserRegistry {
    pub fn new() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    /// A registry pre-loaded with the built-in kinds.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(PermissionParser));
        registry.register(Box::new(ManagedIdentityResourceParser));
        registry.register(Box::new(AppRegistrationResourceParser));
        registry.register(Box::new(PrincipalMappingParser));
        registry.register(Box::new(RoleFactoryParser));
        registry.register(Box::new(OpenAuthenticatorParser));
        registry.register(Box::new(AddOnParser));
        registry
    }

    pub fn register(&mut self, parser: Box<dyn AttributeParser>) {
        self.parsers.insert(parser.kind().to_string(), parser);
    }

    pub fn get(&self, kind: &str) -> Option<&dyn AttributeParser> {
        self.parsers.get(kind).map(|p| p.as_ref())
    }
}

impl Default for AttributeParserRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Extract the attribute kind from an object's `_content.type` tag.
///
/// Returns `None` when the value is not tagged with our content-type
/// family; a tag in the family without a kind is malformed.
pub fn attribute_kind(value: &serde_json::Value) -> Result<Option<&str>, CelastrinaError> {
    let Some(content) = value.get("_content") else {
        return Ok(None);
    };
    let type_tag = content
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| {
            CelastrinaError::configuration("attribute _content.type must be a string")
        })?;
    let mut parts = type_tag.splitn(2, ';');
    if parts.next().map(str::trim) != Some(ATTRIBUTE_CONTENT_TYPE) {
        return Ok(None);
    }
    match parts.next().map(str::trim).filter(|k| !k.is_empty()) {
        Some(kind) => Ok(Some(kind)),
        None => Err(CelastrinaError::configuration(format!(
            "attribute content type '{type_tag}' is missing its kind"
        ))),
    }
}

/// Walk the document and fail on any attribute tag with an unknown kind.
pub fn validate_attributes(
    value: &serde_json::Value,
    registry: &AttributeParserRegistry,
) -> Result<(), CelastrinaError> {
    match value {
        serde_json::Value::Object(map) => {
            if let Some(kind) = attribute_kind(value)? {
                if registry.get(kind).is_none() {
                    return Err(CelastrinaError::configuration(format!(
                        "unknown attribute kind '{kind}'"
                    )));
                }
            }
            for child in map.values() {
                validate_attributes(child, registry)?;
            }
            Ok(())
        }
        serde_json::Value::Array(items) => {
            for item in items {
                validate_attributes(item, registry)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// A string that is exactly one `${name}` reference.
fn whole_reference(value: &str) -> Option<&str> {
    value
        .trim()
        .strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
        .filter(|name| !name.contains("${") && !name.contains('}'))
}

/// Resolve `${property}` references in place, recursively.
///
/// A whole-string reference substitutes the property's parsed JSON (or the
/// raw string when it is not JSON) and is resolved again; references
/// embedded in larger strings splice as text. A reference that resolves to
/// null is a configuration error; reference names follow property-key
/// validation.
pub fn resolve_references<'a>(
    value: &'a mut serde_json::Value,
    properties: &'a dyn PropertyManager,
    depth: u32,
) -> Pin<Box<dyn Future<Output = Result<(), CelastrinaError>> + Send + 'a>> {
    Box::pin(async move {
        if depth > MAX_REFERENCE_DEPTH {
            return Err(CelastrinaError::configuration(
                "property reference depth exceeded",
            ));
        }
        match value {
            serde_json::Value::Object(map) => {
                for child in map.values_mut() {
                    resolve_references(child, properties, depth).await?;
                }
            }
            serde_json::Value::Array(items) => {
                for item in items.iter_mut() {
                    resolve_references(item, properties, depth).await?;
                }
            }
            serde_json::Value::String(s) => {
                if let Some(name) = whole_reference(s) {
                    let name = validate_property_key(name)?.to_string();
                    let raw = fetch_reference(&name, properties).await?;
                    let mut replacement = match serde_json::from_str::<serde_json::Value>(&raw)
                    {
                        Ok(parsed) => parsed,
                        Err(_) => serde_json::Value::String(raw),
                    };
                    resolve_references(&mut replacement, properties, depth + 1).await?;
                    *value = replacement;
                } else if s.contains("${") {
                    *value = serde_json::Value::String(splice_references(s, properties).await?);
                }
            }
            _ => {}
        }
        Ok(())
    })
}

async fn fetch_reference(
    name: &str,
    properties: &dyn PropertyManager,
) -> Result<String, CelastrinaError> {
    properties.get_property(name).await?.ok_or_else(|| {
        CelastrinaError::configuration(format!(
            "property '{name}' referenced by the configuration resolved to null"
        ))
    })
}

/// Splice `${name}` references embedded in a larger string.
async fn splice_references(
    value: &str,
    properties: &dyn PropertyManager,
) -> Result<String, CelastrinaError> {
    let mut result = value.to_string();
    let mut passes = 0;
    while let Some(start) = result.find("${") {
        passes += 1;
        if passes > MAX_SPLICE_PASSES {
            return Err(CelastrinaError::configuration(format!(
                "property reference expansion did not converge in: {value}"
            )));
        }
        let end = result[start..].find('}').ok_or_else(|| {
            CelastrinaError::configuration(format!("unclosed property reference in: {value}"))
        })? + start;
        let name = validate_property_key(&result[start + 2..end])?.to_string();
        let raw = fetch_reference(&name, properties).await?;
        result = format!("{}{}{}", &result[..start], raw, &result[end + 1..]);
    }
    Ok(result)
}

fn payload<T: DeserializeOwned>(
    kind: &str,
    value: &serde_json::Value,
) -> Result<T, CelastrinaError> {
    serde_json::from_value(value.clone()).map_err(|e| {
        CelastrinaError::configuration(format!("malformed {kind} attribute")).with_cause(e)
    })
}

// ── Built-in parsers ──────────────────────────────────────────────────────

struct PermissionParser;

#[derive(Deserialize)]
struct PermissionPayload {
    action: String,
    #[serde(default)]
    roles: Vec<String>,
    #[serde(rename = "match")]
    value_match: String,
}

impl AttributeParser for PermissionParser {
    fn kind(&self) -> &str {
        "Permission"
    }

    fn parse(
        &self,
        value: &serde_json::Value,
        _env: &ParserEnv<'_>,
    ) -> Result<ParsedAttribute, CelastrinaError> {
        let payload: PermissionPayload = payload(self.kind(), value)?;
        let permission = Permission::new(
            &payload.action,
            payload.roles,
            ValueMatch::parse(&payload.value_match)?,
        )?;
        Ok(ParsedAttribute::Permission(permission))
    }
}

struct ManagedIdentityResourceParser;

#[derive(Deserialize)]
struct ManagedIdentityResourcePayload {
    id: String,
    #[serde(default, rename = "principalId")]
    principal_id: Option<String>,
}

impl AttributeParser for ManagedIdentityResourceParser {
    fn kind(&self) -> &str {
        "ManagedIdentityResource"
    }

    fn parse(
        &self,
        value: &serde_json::Value,
        env: &ParserEnv<'_>,
    ) -> Result<ParsedAttribute, CelastrinaError> {
        let payload: ManagedIdentityResourcePayload = payload(self.kind(), value)?;
        let (endpoint, header) = match (
            &env.bootstrap.identity_endpoint,
            &env.bootstrap.identity_header,
        ) {
            (Some(endpoint), Some(header)) => (endpoint, header),
            _ => {
                return Err(CelastrinaError::configuration(format!(
                    "managed identity resource '{}' requires the host identity endpoint",
                    payload.id
                )))
            }
        };
        let mut resolver = ManagedIdentityResolver::with_timeout(
            endpoint.as_str(),
            header.as_str(),
            env.http_timeout,
        )?;
        if let Some(principal_id) = payload.principal_id {
            resolver = resolver.with_principal_id(principal_id);
        }
        Ok(ParsedAttribute::Authorization(ResourceAuthorization::new(
            payload.id,
            Box::new(resolver),
        )))
    }
}

struct AppRegistrationResourceParser;

#[derive(Deserialize)]
struct AppRegistrationResourcePayload {
    id: String,
    authority: String,
    tenant: String,
    #[serde(rename = "clientId")]
    client_id: String,
    secret: String,
}

impl AttributeParser for AppRegistrationResourceParser {
    fn kind(&self) -> &str {
        "AppRegistrationResource"
    }

    fn parse(
        &self,
        value: &serde_json::Value,
        env: &ParserEnv<'_>,
    ) -> Result<ParsedAttribute, CelastrinaError> {
        let payload: AppRegistrationResourcePayload = payload(self.kind(), value)?;
        let resolver = AppRegistrationResolver::with_timeout(
            payload.authority,
            payload.tenant,
            payload.client_id,
            payload.secret,
            env.http_timeout,
        )?;
        Ok(ParsedAttribute::Authorization(ResourceAuthorization::new(
            payload.id,
            Box::new(resolver),
        )))
    }
}

struct PrincipalMappingParser;

impl AttributeParser for PrincipalMappingParser {
    fn kind(&self) -> &str {
        "PrincipalMapping"
    }

    fn parse(
        &self,
        value: &serde_json::Value,
        _env: &ParserEnv<'_>,
    ) -> Result<ParsedAttribute, CelastrinaError> {
        let mapping: PrincipalMapping = payload(self.kind(), value)?;
        Ok(ParsedAttribute::PrincipalMapping(mapping))
    }
}

struct RoleFactoryParser;

#[derive(Deserialize)]
struct RoleFactoryPayload {
    #[serde(default)]
    mappings: Vec<PrincipalMapping>,
}

impl AttributeParser for RoleFactoryParser {
    fn kind(&self) -> &str {
        "RoleFactory"
    }

    fn parse(
        &self,
        value: &serde_json::Value,
        _env: &ParserEnv<'_>,
    ) -> Result<ParsedAttribute, CelastrinaError> {
        let payload: RoleFactoryPayload = payload(self.kind(), value)?;
        Ok(ParsedAttribute::RoleFactory(Box::new(
            MappedRoleFactory::from_mappings(payload.mappings),
        )))
    }
}

struct OpenAuthenticatorParser;

#[derive(Deserialize)]
struct OpenAuthenticatorPayload {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    assignments: Vec<String>,
}

impl AttributeParser for OpenAuthenticatorParser {
    fn kind(&self) -> &str {
        "OpenAuthenticator"
    }

    fn parse(
        &self,
        value: &serde_json::Value,
        _env: &ParserEnv<'_>,
    ) -> Result<ParsedAttribute, CelastrinaError> {
        let payload: OpenAuthenticatorPayload = payload(self.kind(), value)?;
        let mut authenticator = OpenAuthenticator::new();
        if let Some(name) = payload.name {
            authenticator = authenticator.with_name(name);
        }
        Ok(ParsedAttribute::Authenticator(Box::new(
            authenticator.with_assignments(payload.assignments),
        )))
    }
}

struct AddOnParser;

#[derive(Deserialize)]
struct AddOnPayload {
    #[serde(rename = "addOn")]
    add_on: String,
}

impl AttributeParser for AddOnParser {
    fn kind(&self) -> &str {
        "AddOn"
    }

    fn parse(
        &self,
        value: &serde_json::Value,
        _env: &ParserEnv<'_>,
    ) -> Result<ParsedAttribute, CelastrinaError> {
        let payload: AddOnPayload = payload(self.kind(), value)?;
        Ok(ParsedAttribute::AddOnConfig {
            add_on: payload.add_on,
            config: value.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::AppSettingsPropertyManager;

    fn attribute(kind: &str, mut body: serde_json::Value) -> serde_json::Value {
        body["_content"] = serde_json::json!({
            "type": format!("{ATTRIBUTE_CONTENT_TYPE};{kind}")
        });
        body
    }

    #[test]
    fn kind_extraction() {
        let value = attribute("Permission", serde_json::json!({}));
        assert_eq!(attribute_kind(&value).unwrap(), Some("Permission"));

        let plain = serde_json::json!({"a": 1});
        assert_eq!(attribute_kind(&plain).unwrap(), None);

        let foreign = serde_json::json!({
            "_content": {"type": "application/vnd.other+json;Permission"}
        });
        assert_eq!(attribute_kind(&foreign).unwrap(), None);

        let missing_kind = serde_json::json!({
            "_content": {"type": ATTRIBUTE_CONTENT_TYPE}
        });
        assert!(attribute_kind(&missing_kind).is_err());
    }

    #[test]
    fn unknown_kinds_fail_validation() {
        let registry = AttributeParserRegistry::with_builtins();
        let document = serde_json::json!({
            "nested": [attribute("Mystery", serde_json::json!({}))]
        });
        let err = validate_attributes(&document, &registry).unwrap_err();
        assert!(err.to_string().contains("Mystery"));

        let known = serde_json::json!({
            "permissions": [attribute("Permission", serde_json::json!({}))]
        });
        assert!(validate_attributes(&known, &registry).is_ok());
    }

    #[test]
    fn whole_reference_detection() {
        assert_eq!(whole_reference("${app.key}"), Some("app.key"));
        assert_eq!(whole_reference("  ${app.key} "), Some("app.key"));
        assert_eq!(whole_reference("${a}${b}"), None);
        assert_eq!(whole_reference("prefix ${a}"), None);
        assert_eq!(whole_reference("plain"), None);
    }

    #[tokio::test]
    async fn whole_references_substitute_parsed_json() {
        let properties = AppSettingsPropertyManager::new()
            .with_override("roles.admin", r#"["admin", "auditor"]"#)
            .with_override("greeting", "hello");
        let mut value = serde_json::json!({
            "roles": "${roles.admin}",
            "text": "${greeting}"
        });
        resolve_references(&mut value, &properties, 0).await.unwrap();
        assert_eq!(value["roles"], serde_json::json!(["admin", "auditor"]));
        assert_eq!(value["text"], serde_json::json!("hello"));
    }

    #[tokio::test]
    async fn embedded_references_splice_as_text() {
        let properties = AppSettingsPropertyManager::new()
            .with_override("store", "prod-store")
            .with_override("label", "prod");
        let mut value = serde_json::json!("https://${store}.example/kv?label=${label}");
        resolve_references(&mut value, &properties, 0).await.unwrap();
        assert_eq!(
            value,
            serde_json::json!("https://prod-store.example/kv?label=prod")
        );
    }

    #[tokio::test]
    async fn null_references_fail() {
        let properties = AppSettingsPropertyManager::new();
        let mut value = serde_json::json!("${celastrina.loader.test.missing}");
        let err = resolve_references(&mut value, &properties, 0)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("resolved to null"));
    }

    #[tokio::test]
    async fn whitespace_in_reference_names_fails() {
        let properties = AppSettingsPropertyManager::new();
        let mut value = serde_json::json!("${bad name}");
        let err = resolve_references(&mut value, &properties, 0)
            .await
            .unwrap_err();
        assert_eq!(err.tag(), Some("key"));
    }

    #[tokio::test]
    async fn nested_references_resolve_recursively() {
        let properties = AppSettingsPropertyManager::new()
            .with_override("outer", r#"{"inner": "${inner}"}"#)
            .with_override("inner", "42");
        let mut value = serde_json::json!("${outer}");
        resolve_references(&mut value, &properties, 0).await.unwrap();
        assert_eq!(value, serde_json::json!({"inner": 42}));
    }

    #[test]
    fn permission_parser_round_trip() {
        let registry = AttributeParserRegistry::with_builtins();
        let env_bootstrap = BootstrapConfig::default();
        let env = ParserEnv {
            bootstrap: &env_bootstrap,
            http_timeout: Duration::from_secs(2),
        };
        let value = attribute(
            "Permission",
            serde_json::json!({"action": "Process", "roles": ["r1"], "match": "MatchAny"}),
        );
        let parser = registry.get("Permission").unwrap();
        match parser.parse(&value, &env).unwrap() {
            ParsedAttribute::Permission(p) => {
                assert_eq!(p.action(), "process");
                assert!(p.roles().contains("r1"));
            }
            _ => panic!("expected a permission"),
        }
    }

    #[test]
    fn managed_identity_parser_requires_the_endpoint() {
        let registry = AttributeParserRegistry::with_builtins();
        let env_bootstrap = BootstrapConfig::default();
        let env = ParserEnv {
            bootstrap: &env_bootstrap,
            http_timeout: Duration::from_secs(2),
        };
        let value = attribute("ManagedIdentityResource", serde_json::json!({"id": "mi"}));
        let parser = registry.get("ManagedIdentityResource").unwrap();
        assert!(parser.parse(&value, &env).is_err());
    }
}
