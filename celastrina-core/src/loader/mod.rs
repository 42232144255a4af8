pub mod attributes;

use std::time::Duration;

use crate::configuration::{BootstrapConfig, Runtime};
use crate::error::CelastrinaError;

pub use attributes::{
    attribute_kind, resolve_references, validate_attributes, AttributeParser,
    AttributeParserRegistry, ParsedAttribute, ParserEnv, ATTRIBUTE_CONTENT_TYPE,
};

use attributes::ParsedAttribute as Attribute;

/// Loads the JSON configuration document named by a property key and
/// populates the configuration's managers from it.
///
/// The document is fetched through the property manager, `${property}`
/// references are resolved recursively, every attribute tag is checked
/// against the parser registry, and the recognized top-level keys (`name`,
/// `permissions`, `resources`, `roleFactory`, `authenticators`, `addOns`)
/// are applied. Unrecognized top-level keys land in the keyed value bag.
pub struct ConfigurationLoader {
    property_key: String,
    parsers: AttributeParserRegistry,
}

impl ConfigurationLoader {
    pub(crate) fn new(property_key: String, parsers: AttributeParserRegistry) -> Self {
        Self {
            property_key,
            parsers,
        }
    }

    pub(crate) async fn load(
        &self,
        name: &str,
        runtime: &mut Runtime,
        bootstrap: &BootstrapConfig,
        http_timeout: Duration,
    ) -> Result<(), CelastrinaError> {
        let properties = runtime.properties.clone();
        let raw = properties
            .get_property(&self.property_key)
            .await?
            .ok_or_else(|| {
                CelastrinaError::configuration(format!(
                    "configuration document property '{}' not found",
                    self.property_key
                ))
            })?;
        let mut document: serde_json::Value = serde_json::from_str(&raw).map_err(|e| {
            CelastrinaError::configuration(format!(
                "configuration document '{}' is not valid JSON",
                self.property_key
            ))
            .with_cause(e)
        })?;

        resolve_references(&mut document, properties.as_ref(), 0).await?;
        validate_attributes(&document, &self.parsers)?;

        let env = ParserEnv {
            bootstrap,
            http_timeout,
        };
        self.apply(name, document, runtime, &env)
    }

    fn apply(
        &self,
        name: &str,
        document: serde_json::Value,
        runtime: &mut Runtime,
        env: &ParserEnv<'_>,
    ) -> Result<(), CelastrinaError> {
        let serde_json::Value::Object(mut map) = document else {
            return Err(CelastrinaError::configuration(
                "configuration document must be a JSON object",
            ));
        };

        if let Some(document_name) = map.remove("name") {
            let document_name = document_name.as_str().map(str::trim).unwrap_or_default();
            if document_name.is_empty() {
                return Err(CelastrinaError::configuration(
                    "configuration document name must be a non-empty string",
                ));
            }
            if document_name != name {
                return Err(CelastrinaError::configuration(format!(
                    "configuration document is named '{document_name}' but the configuration is '{name}'"
                )));
            }
        }

        if let Some(permissions) = map.remove("permissions") {
            for item in Self::as_array("permissions", permissions)? {
                match self.parse_attribute(&item, env)? {
                    Attribute::Permission(permission) => {
                        runtime.permissions.add_permission(permission)
                    }
                    _ => {
                        return Err(CelastrinaError::configuration(
                            "the permissions key accepts only Permission attributes",
                        ))
                    }
                }
            }
        }

        if let Some(resources) = map.remove("resources") {
            for item in Self::as_array("resources", resources)? {
                match self.parse_attribute(&item, env)? {
                    Attribute::Authorization(authorization) => {
                        runtime.resources.add_resource(authorization)
                    }
                    _ => {
                        return Err(CelastrinaError::configuration(
                            "the resources key accepts only resource attributes",
                        ))
                    }
                }
            }
        }

        if let Some(role_factory) = map.remove("roleFactory") {
            match self.parse_attribute(&role_factory, env)? {
                Attribute::RoleFactory(factory) => runtime.sentry.set_role_factory(factory),
                _ => {
                    return Err(CelastrinaError::configuration(
                        "the roleFactory key accepts only a RoleFactory attribute",
                    ))
                }
            }
        }

        if let Some(authenticators) = map.remove("authenticators") {
            for item in Self::as_array("authenticators", authenticators)? {
                match self.parse_attribute(&item, env)? {
                    Attribute::Authenticator(authenticator) => {
                        runtime.sentry.add_authenticator(authenticator)
                    }
                    _ => {
                        return Err(CelastrinaError::configuration(
                            "the authenticators key accepts only authenticator attributes",
                        ))
                    }
                }
            }
        }

        if let Some(add_ons) = map.remove("addOns") {
            for item in Self::as_array("addOns", add_ons)? {
                match self.parse_attribute(&item, env)? {
                    Attribute::AddOnConfig { add_on, config } => {
                        let target = runtime.add_ons.get(&add_on).ok_or_else(|| {
                            CelastrinaError::configuration(format!(
                                "configuration document addresses unregistered add-on '{add_on}'"
                            ))
                        })?;
                        target.configure(&config)?;
                    }
                    _ => {
                        return Err(CelastrinaError::configuration(
                            "the addOns key accepts only AddOn attributes",
                        ))
                    }
                }
            }
        }

        // Whatever remains is free-form author data.
        for (key, value) in map {
            let trimmed = key.trim();
            if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
                tracing::warn!(key = %key, "skipping configuration document key with whitespace");
                continue;
            }
            runtime.values.insert(trimmed.to_string(), value);
        }
        Ok(())
    }

    fn parse_attribute(
        &self,
        value: &serde_json::Value,
        env: &ParserEnv<'_>,
    ) -> Result<ParsedAttribute, CelastrinaError> {
        let kind = attribute_kind(value)?.ok_or_else(|| {
            CelastrinaError::configuration(
                "expected an attribute object carrying a _content.type tag",
            )
        })?;
        let parser = self.parsers.get(kind).ok_or_else(|| {
            CelastrinaError::configuration(format!("unknown attribute kind '{kind}'"))
        })?;
        parser.parse(value, env)
    }

    fn as_array(
        key: &str,
        value: serde_json::Value,
    ) -> Result<Vec<serde_json::Value>, CelastrinaError> {
        match value {
            serde_json::Value::Array(items) => Ok(items),
            _ => Err(CelastrinaError::configuration(format!(
                "the {key} key must be an array"
            ))),
        }
    }
}
