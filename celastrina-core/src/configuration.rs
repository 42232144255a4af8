use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::OnceCell;

use crate::addons::{AddOn, AddOnManager};
use crate::envelope::{Envelope, LogLevel};
use crate::error::CelastrinaError;
use crate::identity::{ManagedIdentityResolver, DEFAULT_HTTP_TIMEOUT};
use crate::loader::{AttributeParser, AttributeParserRegistry, ConfigurationLoader};
use crate::permission::{Permission, PermissionManager};
use crate::properties::{
    validate_property_key, AppSettingsPropertyManager, CacheConfig, CachedPropertyManager,
    PropertyManager,
};
use crate::resources::{ResourceAuthorization, ResourceManager, MANAGED_IDENTITY_RESOURCE_ID};
use crate::sentry::{Authenticator, RoleFactory, Sentry};

pub const ENV_IDENTITY_ENDPOINT: &str = "IDENTITY_ENDPOINT";
pub const ENV_IDENTITY_HEADER: &str = "IDENTITY_HEADER";

/// Environment key carrying the property-cache control block.
pub const ENV_PROPERTY_CONFIG: &str = "celastrinajs.core.property.config";

/// Environment key carrying the remote config-store block.
pub const ENV_APPCONFIG_CONFIG: &str = "celastrinajs.core.property.appconfig.config";

/// Environment key forcing the environment-backed property manager.
/// Deployed environments depend on the historical "celastringjs" spelling.
pub const ENV_LOCAL_DEVELOPMENT: &str =
    "celastringjs.core.property.deployment.local.development";

/// Read-only snapshot of the process-wide bootstrap inputs.
///
/// Read once at [`Configuration::initialize`] and passed explicitly; no
/// component reads these environment keys behind the configuration's back.
#[derive(Clone, Debug, Default)]
pub struct BootstrapConfig {
    pub identity_endpoint: Option<String>,
    pub identity_header: Option<String>,
    pub property_config: Option<String>,
    pub appconfig_config: Option<String>,
    pub local_development: bool,
}

impl BootstrapConfig {
    pub fn from_env() -> Self {
        Self {
            identity_endpoint: std::env::var(ENV_IDENTITY_ENDPOINT).ok(),
            identity_header: std::env::var(ENV_IDENTITY_HEADER).ok(),
            property_config: std::env::var(ENV_PROPERTY_CONFIG).ok(),
            appconfig_config: std::env::var(ENV_APPCONFIG_CONFIG).ok(),
            local_development: std::env::var(ENV_LOCAL_DEVELOPMENT)
                .map(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
                .unwrap_or(false),
        }
    }
}

/// Author-registered parts, consumed when the runtime is built.
struct Setup {
    optimistic: bool,
    values: HashMap<String, serde_json::Value>,
    permissions: Vec<Permission>,
    authorizations: Vec<ResourceAuthorization>,
    authenticators: Vec<Box<dyn Authenticator>>,
    role_factory: Option<Box<dyn RoleFactory>>,
    add_ons: Vec<Box<dyn AddOn>>,
    property_manager: Option<Arc<dyn PropertyManager>>,
    config_property: Option<String>,
    parsers: AttributeParserRegistry,
    bootstrap: Option<BootstrapConfig>,
    http_timeout: Duration,
    consumed: bool,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            optimistic: false,
            values: HashMap::new(),
            permissions: Vec::new(),
            authorizations: Vec::new(),
            authenticators: Vec::new(),
            role_factory: None,
            add_ons: Vec::new(),
            property_manager: None,
            config_property: None,
            parsers: AttributeParserRegistry::with_builtins(),
            bootstrap: None,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            consumed: false,
        }
    }
}

/// The read-only slots shared across invocations once `ready` has run.
pub(crate) struct Runtime {
    pub(crate) values: HashMap<String, serde_json::Value>,
    pub(crate) properties: Arc<dyn PropertyManager>,
    pub(crate) resources: Arc<ResourceManager>,
    pub(crate) permissions: PermissionManager,
    pub(crate) sentry: Sentry,
    pub(crate) add_ons: AddOnManager,
    pub(crate) optimistic: bool,
}

/// Process-scoped owner of the framework's singleton collaborators.
///
/// Authors register permissions, resources, authenticators, add-ons, and
/// property sources before the first invocation; `initialize` then builds
/// the runtime exactly once (later callers await the first), and
/// `bootstrapped` installs the configured add-ons exactly once. After that
/// the configuration is shared read-only across concurrent invocations.
pub struct Configuration {
    name: String,
    setup: Mutex<Setup>,
    runtime: OnceCell<Runtime>,
    installed: OnceCell<()>,
    loaded: AtomicBool,
}

impl std::fmt::Debug for Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Configuration")
            .field("name", &self.name)
            .field("loaded", &self.loaded)
            .finish()
    }
}

impl Configuration {
    /// Create a configuration. The name is trimmed and must be non-empty.
    pub fn new(name: impl AsRef<str>) -> Result<Self, CelastrinaError> {
        let name = name.as_ref().trim().to_string();
        if name.is_empty() {
            return Err(CelastrinaError::validation(
                "configuration name must not be empty",
                "name",
            ));
        }
        Ok(Self {
            name,
            setup: Mutex::new(Setup::default()),
            runtime: OnceCell::new(),
            installed: OnceCell::new(),
            loaded: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the configuration has fully initialized.
    pub fn loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    pub fn optimistic(&self) -> bool {
        match self.runtime.get() {
            Some(runtime) => runtime.optimistic,
            None => self.setup_ref(|s| s.optimistic),
        }
    }

    // ── Pre-initialize registration ──────────────────────────────────────

    fn setup_mut(&mut self) -> &mut Setup {
        self.setup.get_mut().unwrap_or_else(|e| e.into_inner())
    }

    fn setup_ref<T>(&self, read: impl FnOnce(&Setup) -> T) -> T {
        read(&self.setup.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Put a value in the keyed bag. Keys are trimmed and must not contain
    /// internal whitespace.
    pub fn set_value(
        &mut self,
        key: &str,
        value: serde_json::Value,
    ) -> Result<&mut Self, CelastrinaError> {
        let key = validate_property_key(key)?.to_string();
        self.setup_mut().values.insert(key, value);
        Ok(self)
    }

    pub fn add_permission(&mut self, permission: Permission) -> &mut Self {
        self.setup_mut().permissions.push(permission);
        self
    }

    pub fn add_resource(&mut self, authorization: ResourceAuthorization) -> &mut Self {
        self.setup_mut().authorizations.push(authorization);
        self
    }

    pub fn add_authenticator(&mut self, authenticator: Box<dyn Authenticator>) -> &mut Self {
        self.setup_mut().authenticators.push(authenticator);
        self
    }

    pub fn set_role_factory(&mut self, role_factory: Box<dyn RoleFactory>) -> &mut Self {
        self.setup_mut().role_factory = Some(role_factory);
        self
    }

    pub fn add_add_on(&mut self, add_on: Box<dyn AddOn>) -> &mut Self {
        self.setup_mut().add_ons.push(add_on);
        self
    }

    pub fn set_property_manager(&mut self, manager: Arc<dyn PropertyManager>) -> &mut Self {
        self.setup_mut().property_manager = Some(manager);
        self
    }

    /// Name the property that holds the JSON configuration document; the
    /// loader walks it during initialization.
    pub fn set_config_property(&mut self, key: &str) -> Result<&mut Self, CelastrinaError> {
        let key = validate_property_key(key)?.to_string();
        self.setup_mut().config_property = Some(key);
        Ok(self)
    }

    /// Register an additional attribute parser for the configuration
    /// document.
    pub fn register_attribute_parser(&mut self, parser: Box<dyn AttributeParser>) -> &mut Self {
        self.setup_mut().parsers.register(parser);
        self
    }

    /// Permit actions that have no declared permission.
    pub fn set_optimistic(&mut self, optimistic: bool) -> &mut Self {
        self.setup_mut().optimistic = optimistic;
        self
    }

    /// Supply the bootstrap snapshot explicitly (tests, embedded hosts).
    /// Without this, the process environment is read at `initialize`.
    pub fn set_bootstrap(&mut self, bootstrap: BootstrapConfig) -> &mut Self {
        self.setup_mut().bootstrap = Some(bootstrap);
        self
    }

    pub fn set_http_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.setup_mut().http_timeout = timeout;
        self
    }

    // ── Initialization ───────────────────────────────────────────────────

    /// Build the runtime exactly once; callers beyond the first await the
    /// first's completion and observe the same post-initialize state.
    pub async fn initialize(&self, envelope: &dyn Envelope) -> Result<(), CelastrinaError> {
        self.runtime
            .get_or_try_init(|| self.build_runtime(envelope))
            .await
            .map(|_| ())
    }

    /// Install and initialize the configured add-ons exactly once.
    /// Idempotent under re-entry.
    pub async fn bootstrapped(&self, envelope: &dyn Envelope) -> Result<(), CelastrinaError> {
        let runtime = self.runtime_ref()?;
        self.installed
            .get_or_try_init(|| async {
                runtime.add_ons.install(envelope).await?;
                runtime.add_ons.initialize(envelope, self).await
            })
            .await
            .map(|_| ())
    }

    async fn build_runtime(&self, envelope: &dyn Envelope) -> Result<Runtime, CelastrinaError> {
        let setup = {
            let mut guard = self.setup.lock().unwrap_or_else(|e| e.into_inner());
            if guard.consumed {
                return Err(CelastrinaError::configuration(format!(
                    "configuration '{}' setup was consumed by a failed initialization",
                    self.name
                )));
            }
            let taken = std::mem::take(&mut *guard);
            guard.consumed = true;
            taken
        };

        let bootstrap = setup
            .bootstrap
            .clone()
            .unwrap_or_else(BootstrapConfig::from_env);
        envelope.log(
            LogLevel::Info,
            &format!("initializing configuration '{}'", self.name),
        );

        // Property source: local development forces the environment-backed
        // manager, the cache control block wraps whatever was selected.
        let base: Arc<dyn PropertyManager> = if bootstrap.local_development {
            if setup.property_manager.is_some() {
                tracing::warn!(
                    configuration = %self.name,
                    "local development override active, using app settings properties"
                );
            }
            Arc::new(AppSettingsPropertyManager::new())
        } else {
            setup
                .property_manager
                .unwrap_or_else(|| Arc::new(AppSettingsPropertyManager::new()))
        };
        let properties: Arc<dyn PropertyManager> = match &bootstrap.property_config {
            Some(raw) => {
                let cache: CacheConfig = serde_json::from_str(raw).map_err(|e| {
                    CelastrinaError::configuration(format!(
                        "invalid cache control block in '{ENV_PROPERTY_CONFIG}'"
                    ))
                    .with_cause(e)
                })?;
                if cache.active {
                    Arc::new(CachedPropertyManager::new(base, &cache))
                } else {
                    base
                }
            }
            None => base,
        };

        // Resources: the host identity endpoint defaults in a system
        // managed identity.
        let resources = ResourceManager::new();
        match (&bootstrap.identity_endpoint, &bootstrap.identity_header) {
            (Some(endpoint), Some(header)) => {
                let resolver = ManagedIdentityResolver::with_timeout(
                    endpoint.as_str(),
                    header.as_str(),
                    setup.http_timeout,
                )?;
                resources.add_resource(ResourceAuthorization::new(
                    MANAGED_IDENTITY_RESOURCE_ID,
                    Box::new(resolver),
                ));
            }
            (Some(_), None) => tracing::warn!(
                "IDENTITY_ENDPOINT set without IDENTITY_HEADER, skipping the system managed identity"
            ),
            _ => {}
        }
        for authorization in setup.authorizations {
            resources.add_resource(authorization);
        }

        let mut permissions = PermissionManager::new();
        for permission in setup.permissions {
            permissions.add_permission(permission);
        }

        let mut sentry = Sentry::new();
        for authenticator in setup.authenticators {
            sentry.add_authenticator(authenticator);
        }
        if let Some(role_factory) = setup.role_factory {
            sentry.set_role_factory(role_factory);
        }

        let mut add_ons = AddOnManager::new();
        for add_on in setup.add_ons {
            add_ons.add(add_on);
        }

        let mut runtime = Runtime {
            values: setup.values,
            properties,
            resources: Arc::new(resources),
            permissions,
            sentry,
            add_ons,
            optimistic: setup.optimistic,
        };

        if let Some(config_property) = setup.config_property {
            let loader = ConfigurationLoader::new(config_property, setup.parsers);
            loader
                .load(&self.name, &mut runtime, &bootstrap, setup.http_timeout)
                .await?;
        }

        self.loaded.store(true, Ordering::SeqCst);
        tracing::info!(configuration = %self.name, "configuration ready");
        Ok(runtime)
    }

    // ── Post-initialize access ───────────────────────────────────────────

    fn runtime_ref(&self) -> Result<&Runtime, CelastrinaError> {
        self.runtime.get().ok_or_else(|| {
            CelastrinaError::configuration(format!(
                "configuration '{}' is not initialized",
                self.name
            ))
        })
    }

    pub fn permissions(&self) -> Result<&PermissionManager, CelastrinaError> {
        Ok(&self.runtime_ref()?.permissions)
    }

    pub fn sentry(&self) -> Result<&Sentry, CelastrinaError> {
        Ok(&self.runtime_ref()?.sentry)
    }

    pub fn properties(&self) -> Result<Arc<dyn PropertyManager>, CelastrinaError> {
        Ok(self.runtime_ref()?.properties.clone())
    }

    pub fn resources(&self) -> Result<Arc<ResourceManager>, CelastrinaError> {
        Ok(self.runtime_ref()?.resources.clone())
    }

    pub fn add_ons(&self) -> Result<&AddOnManager, CelastrinaError> {
        Ok(&self.runtime_ref()?.add_ons)
    }

    /// Read a value from the keyed bag.
    pub fn get_value(&self, key: &str) -> Option<serde_json::Value> {
        match self.runtime.get() {
            Some(runtime) => runtime.values.get(key.trim()).cloned(),
            None => self.setup_ref(|s| s.values.get(key.trim()).cloned()),
        }
    }
}
