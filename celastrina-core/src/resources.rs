use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::error::CelastrinaError;

/// Registry id of the system managed identity defaulted in when the host
/// exposes an identity endpoint.
pub const MANAGED_IDENTITY_RESOURCE_ID: &str = "managed-identity";

/// Default refresh skew in seconds: tokens refresh two minutes early.
pub const DEFAULT_TOKEN_SKEW_SECS: i64 = -120;

/// A bearer credential scoped to one resource, with an absolute expiry.
#[derive(Clone, Debug)]
pub struct Token {
    resource: String,
    token: String,
    expires: DateTime<Utc>,
}

impl Token {
    pub fn new(
        resource: impl Into<String>,
        token: impl Into<String>,
        expires: DateTime<Utc>,
    ) -> Self {
        Self {
            resource: resource.into(),
            token: token.into(),
            expires,
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn expires(&self) -> DateTime<Utc> {
        self.expires
    }

    /// Whether the token must be refreshed. The skew is non-positive, so a
    /// token is invalidated slightly before its true expiry.
    pub fn expired(&self, skew: ChronoDuration) -> bool {
        Utc::now() >= self.expires + skew
    }
}

/// Variant-specific token acquisition (the managed-identity endpoint or an
/// app-registration client-credentials flow).
pub trait TokenResolver: Send + Sync {
    fn resolve<'a>(
        &'a self,
        resource: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Token, CelastrinaError>> + Send + 'a>>;
}

/// Acquires and caches bearer tokens scoped to resources.
///
/// Each resource holds at most one cached token; concurrent callers that
/// miss (or find an expired token) share a single resolver call through a
/// per-resource flight lock. Readers on the fast path only touch the
/// concurrent map.
pub struct ResourceAuthorization {
    id: String,
    resolver: Box<dyn TokenResolver>,
    skew: ChronoDuration,
    tokens: DashMap<String, Token>,
    flights: DashMap<String, Arc<Mutex<()>>>,
}

impl std::fmt::Debug for ResourceAuthorization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceAuthorization")
            .field("id", &self.id)
            .field("skew", &self.skew)
            .finish()
    }
}

impl ResourceAuthorization {
    pub fn new(id: impl Into<String>, resolver: Box<dyn TokenResolver>) -> Self {
        Self {
            id: id.into(),
            resolver,
            skew: ChronoDuration::seconds(DEFAULT_TOKEN_SKEW_SECS),
            tokens: DashMap::new(),
            flights: DashMap::new(),
        }
    }

    /// Override the refresh skew. The skew must be non-positive.
    pub fn with_skew(mut self, skew_secs: i64) -> Result<Self, CelastrinaError> {
        if skew_secs > 0 {
            return Err(CelastrinaError::validation(
                "token skew must be non-positive",
                "skew",
            ));
        }
        self.skew = ChronoDuration::seconds(skew_secs);
        Ok(self)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The bearer token for a resource, resolving and caching as needed.
    pub async fn get_token(&self, resource: &str) -> Result<String, CelastrinaError> {
        Ok(self.token(resource).await?.token)
    }

    /// The full cached token entry for a resource.
    pub async fn token(&self, resource: &str) -> Result<Token, CelastrinaError> {
        if let Some(token) = self.tokens.get(resource) {
            if !token.expired(self.skew) {
                return Ok(token.clone());
            }
        }

        // One in-flight resolve per (authorization, resource); latecomers
        // wait and re-check.
        let flight = self
            .flights
            .entry(resource.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = flight.lock().await;

        if let Some(token) = self.tokens.get(resource) {
            if !token.expired(self.skew) {
                return Ok(token.clone());
            }
        }

        tracing::debug!(
            authorization = %self.id,
            resource,
            "resolving bearer token"
        );
        let token = self.resolver.resolve(resource).await?;
        self.tokens.insert(resource.to_string(), token.clone());
        Ok(token)
    }
}

/// Registry of [`ResourceAuthorization`]s keyed by id.
#[derive(Default)]
pub struct ResourceManager {
    authorizations: DashMap<String, Arc<ResourceAuthorization>>,
}

impl ResourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_resource(&self, authorization: ResourceAuthorization) {
        self.authorizations
            .insert(authorization.id().to_string(), Arc::new(authorization));
    }

    /// Look up an authorization; `None` id means the system managed
    /// identity. Unknown ids yield `None`.
    pub fn get_resource(&self, id: Option<&str>) -> Option<Arc<ResourceAuthorization>> {
        let id = id.unwrap_or(MANAGED_IDENTITY_RESOURCE_ID);
        self.authorizations.get(id).map(|entry| entry.value().clone())
    }

    /// Resolve a token through the identified authorization.
    pub async fn get_token(
        &self,
        resource: &str,
        id: Option<&str>,
    ) -> Result<String, CelastrinaError> {
        let authorization = self.get_resource(id).ok_or_else(|| {
            CelastrinaError::configuration(format!(
                "no resource authorization '{}' registered",
                id.unwrap_or(MANAGED_IDENTITY_RESOURCE_ID)
            ))
        })?;
        authorization.get_token(resource).await
    }

    /// A credential handle for downstream SDKs.
    pub fn get_token_credential(&self, id: Option<&str>) -> Option<TokenCredential> {
        self.get_resource(id)
            .map(|authorization| TokenCredential { authorization })
    }

    pub fn ids(&self) -> Vec<String> {
        self.authorizations
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.authorizations.is_empty()
    }
}

/// An access token as exposed to downstream SDKs.
#[derive(Clone, Debug)]
pub struct AccessToken {
    pub token: String,
    pub expires_on: DateTime<Utc>,
}

/// Credential object bridging a [`ResourceAuthorization`] to SDKs that
/// expect a `get_token(scopes)` shape. The first scope names the resource.
#[derive(Clone)]
pub struct TokenCredential {
    authorization: Arc<ResourceAuthorization>,
}

impl TokenCredential {
    pub async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken, CelastrinaError> {
        let scope = scopes.first().ok_or_else(|| {
            CelastrinaError::validation("at least one scope is required", "scopes")
        })?;
        let token = self.authorization.token(scope).await?;
        Ok(AccessToken {
            token: token.token().to_string(),
            expires_on: token.expires(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingResolver {
        calls: AtomicUsize,
        ttl_secs: i64,
        delay: Duration,
    }

    impl CountingResolver {
        fn new(ttl_secs: i64) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                ttl_secs,
                delay: Duration::ZERO,
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    impl TokenResolver for CountingResolver {
        fn resolve<'a>(
            &'a self,
            resource: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<Token, CelastrinaError>> + Send + 'a>> {
            Box::pin(async move {
                let call = self.calls.fetch_add(1, Ordering::SeqCst);
                if !self.delay.is_zero() {
                    tokio::time::sleep(self.delay).await;
                }
                Ok(Token::new(
                    resource,
                    format!("T{}", call + 1),
                    Utc::now() + ChronoDuration::seconds(self.ttl_secs),
                ))
            })
        }
    }

    #[test]
    fn expiry_honors_negative_skew() {
        // Expires in 60s: fresh against a zero skew, already stale against
        // a -120s skew.
        let token = Token::new("r", "t", Utc::now() + ChronoDuration::seconds(60));
        assert!(!token.expired(ChronoDuration::seconds(0)));
        assert!(token.expired(ChronoDuration::seconds(DEFAULT_TOKEN_SKEW_SECS)));
    }

    #[test]
    fn positive_skew_is_rejected() {
        let authorization =
            ResourceAuthorization::new("a", Box::new(CountingResolver::new(3600)));
        let err = authorization.with_skew(30).unwrap_err();
        assert_eq!(err.tag(), Some("skew"));
    }

    #[tokio::test]
    async fn tokens_are_cached_per_resource() {
        let authorization =
            ResourceAuthorization::new("a", Box::new(CountingResolver::new(3600)));
        assert_eq!(authorization.get_token("r1").await.unwrap(), "T1");
        assert_eq!(authorization.get_token("r1").await.unwrap(), "T1");
        assert_eq!(authorization.get_token("r2").await.unwrap(), "T2");
    }

    #[tokio::test]
    async fn expired_tokens_refresh() {
        // TTL shorter than the skew window, so every call refreshes.
        let authorization =
            ResourceAuthorization::new("a", Box::new(CountingResolver::new(30)));
        assert_eq!(authorization.get_token("r").await.unwrap(), "T1");
        assert_eq!(authorization.get_token("r").await.unwrap(), "T2");
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_resolve() {
        let authorization = Arc::new(ResourceAuthorization::new(
            "a",
            Box::new(CountingResolver::new(3600).with_delay(Duration::from_millis(50))),
        ));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let authorization = authorization.clone();
            handles.push(tokio::spawn(async move {
                authorization.get_token("r").await.unwrap()
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), "T1");
        }
    }

    #[tokio::test]
    async fn manager_lookup_and_defaults() {
        let manager = ResourceManager::new();
        manager.add_resource(ResourceAuthorization::new(
            MANAGED_IDENTITY_RESOURCE_ID,
            Box::new(CountingResolver::new(3600)),
        ));
        manager.add_resource(ResourceAuthorization::new(
            "app",
            Box::new(CountingResolver::new(3600)),
        ));

        assert!(manager.get_resource(None).is_some());
        assert!(manager.get_resource(Some("app")).is_some());
        assert!(manager.get_resource(Some("ghost")).is_none());

        assert_eq!(manager.get_token("r", Some("app")).await.unwrap(), "T1");
        assert!(manager.get_token("r", Some("ghost")).await.is_err());
    }

    #[tokio::test]
    async fn credential_uses_first_scope() {
        let manager = ResourceManager::new();
        manager.add_resource(ResourceAuthorization::new(
            "app",
            Box::new(CountingResolver::new(3600)),
        ));
        let credential = manager.get_token_credential(Some("app")).unwrap();
        let access = credential
            .get_token(&["https://vault.example/.default"])
            .await
            .unwrap();
        assert_eq!(access.token, "T1");
        assert!(access.expires_on > Utc::now());

        let err = credential.get_token(&[]).await.unwrap_err();
        assert_eq!(err.tag(), Some("scopes"));
    }
}
