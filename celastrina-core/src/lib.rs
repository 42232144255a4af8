//! Core runtime for the celastrina serverless framework.
//!
//! A function author declares a [`Configuration`] (permissions, resources,
//! authenticators, add-ons, property sources) and implements [`Function`];
//! the [`LifecycleRunner`] then assembles a request [`Context`] for every
//! host-dispatched invocation, authenticates a [`Subject`], authorizes it
//! against the declared action, and drives the author's business logic
//! through the fixed lifecycle. One configuration is shared read-only
//! across concurrent invocations once it has initialized.

pub mod addons;
pub mod asserter;
pub mod configuration;
pub mod context;
pub mod envelope;
pub mod error;
pub mod identity;
pub mod lifecycle;
pub mod loader;
pub mod permission;
pub mod prelude;
pub mod properties;
pub mod resources;
pub mod sentry;
pub mod subject;
pub mod telemetry;

pub use addons::{AddOn, AddOnManager, LifecycleEvent};
pub use asserter::{Asserter, Assertion};
pub use configuration::{
    BootstrapConfig, Configuration, ENV_APPCONFIG_CONFIG, ENV_IDENTITY_ENDPOINT,
    ENV_IDENTITY_HEADER, ENV_LOCAL_DEVELOPMENT, ENV_PROPERTY_CONFIG,
};
pub use context::{Context, DEFAULT_ACTION};
pub use envelope::{Completion, Envelope, LocalEnvelope, LogLevel};
pub use error::CelastrinaError;
pub use identity::{
    AppRegistrationResolver, ManagedIdentityResolver, DEFAULT_HTTP_TIMEOUT,
    IDENTITY_API_VERSION, IDENTITY_HEADER_NAME,
};
pub use lifecycle::{Function, LifecycleRunner, LifecycleState};
pub use loader::{
    AttributeParser, AttributeParserRegistry, ConfigurationLoader, ParsedAttribute, ParserEnv,
    ATTRIBUTE_CONTENT_TYPE,
};
pub use permission::{Permission, PermissionManager, ValueMatch};
pub use properties::{
    AppSettingsPropertyManager, CacheConfig, CacheControl, CachedPropertyManager,
    PropertyManager, PropertyValue, TtlUnit,
};
pub use resources::{
    AccessToken, ResourceAuthorization, ResourceManager, Token, TokenCredential, TokenResolver,
    DEFAULT_TOKEN_SKEW_SECS, MANAGED_IDENTITY_RESOURCE_ID,
};
pub use sentry::{
    Authenticator, DefaultRoleFactory, MappedRoleFactory, OpenAuthenticator, PrincipalMapping,
    RoleFactory, Sentry,
};
pub use subject::Subject;
pub use telemetry::init_tracing;
