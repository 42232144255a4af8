use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::error::CelastrinaError;

use super::PropertyManager;

/// TTL unit accepted by the cache control block.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TtlUnit {
    #[default]
    Seconds,
    Minutes,
    Hours,
}

impl TtlUnit {
    pub fn duration(self, ttl: u64) -> Duration {
        match self {
            TtlUnit::Seconds => Duration::from_secs(ttl),
            TtlUnit::Minutes => Duration::from_secs(ttl * 60),
            TtlUnit::Hours => Duration::from_secs(ttl * 3600),
        }
    }
}

/// Per-key cache override from the control block.
#[derive(Clone, Debug, Deserialize)]
pub struct CacheControl {
    pub key: String,
    #[serde(default)]
    pub ttl: Option<u64>,
    #[serde(default)]
    pub unit: Option<TtlUnit>,
    #[serde(default, rename = "noCache")]
    pub no_cache: bool,
    #[serde(default, rename = "noExpire")]
    pub no_expire: bool,
}

/// The JSON cache control block read from the
/// `celastrinajs.core.property.config` environment key:
///
/// ```json
/// { "active": true, "ttl": 300, "unit": "seconds",
///   "controls": [ {"key": "secret", "noCache": true} ] }
/// ```
#[derive(Clone, Debug, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default = "default_ttl")]
    pub ttl: u64,
    #[serde(default)]
    pub unit: TtlUnit,
    #[serde(default)]
    pub controls: Vec<CacheControl>,
}

fn default_active() -> bool {
    true
}

fn default_ttl() -> u64 {
    300
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            active: true,
            ttl: default_ttl(),
            unit: TtlUnit::Seconds,
            controls: Vec::new(),
        }
    }
}

struct CachedEntry {
    value: Option<String>,
    #[allow(dead_code)]
    last_updated: Instant,
    expires: Instant,
    no_expire: bool,
}

impl CachedEntry {
    /// A cached null is treated as expired so that missing keys are
    /// re-queried rather than negatively cached.
    fn is_fresh(&self, now: Instant) -> bool {
        self.value.is_some() && (self.no_expire || now < self.expires)
    }
}

/// Wraps any [`PropertyManager`] with a per-key TTL cache.
///
/// Lookups hit the delegate only when the key is absent or its entry has
/// expired; concurrent misses for one key coalesce into a single delegate
/// call. Per-key TTL, `noCache`, and `noExpire` overrides come from the
/// [`CacheConfig`] control block.
pub struct CachedPropertyManager {
    name: String,
    inner: Arc<dyn PropertyManager>,
    default_ttl: Duration,
    default_unit: TtlUnit,
    controls: HashMap<String, CacheControl>,
    entries: DashMap<String, CachedEntry>,
    flights: DashMap<String, Arc<Mutex<()>>>,
}

impl CachedPropertyManager {
    pub fn new(inner: Arc<dyn PropertyManager>, config: &CacheConfig) -> Self {
        let controls = config
            .controls
            .iter()
            .map(|c| (c.key.clone(), c.clone()))
            .collect();
        Self {
            name: format!("Cached({})", inner.name()),
            default_ttl: config.unit.duration(config.ttl),
            default_unit: config.unit,
            inner,
            controls,
            entries: DashMap::new(),
            flights: DashMap::new(),
        }
    }

    pub fn with_defaults(inner: Arc<dyn PropertyManager>) -> Self {
        Self::new(inner, &CacheConfig::default())
    }

    /// Register or replace a per-key control at runtime.
    pub fn set_control(&mut self, control: CacheControl) {
        self.controls.insert(control.key.clone(), control);
    }

    /// Whether the key currently holds a fresh cache entry.
    pub fn is_cached(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .map(|e| e.is_fresh(Instant::now()))
            .unwrap_or(false)
    }

    /// Drop every cache entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Drop expired cache entries.
    pub fn evict_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.is_fresh(now));
    }

    fn ttl_for(&self, control: Option<&CacheControl>) -> Duration {
        match control {
            Some(c) => match c.ttl {
                Some(ttl) => c.unit.unwrap_or(self.default_unit).duration(ttl),
                None => self.default_ttl,
            },
            None => self.default_ttl,
        }
    }
}

impl PropertyManager for CachedPropertyManager {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_property<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, CelastrinaError>> + Send + 'a>> {
        Box::pin(async move {
            let control = self.controls.get(key);
            if control.map(|c| c.no_cache).unwrap_or(false) {
                return self.inner.get_property(key).await;
            }

            if let Some(entry) = self.entries.get(key) {
                if entry.is_fresh(Instant::now()) {
                    return Ok(entry.value.clone());
                }
            }

            // Single flight: one delegate call per key, concurrent misses
            // wait for it.
            let flight = self
                .flights
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone();
            let _guard = flight.lock().await;

            if let Some(entry) = self.entries.get(key) {
                if entry.is_fresh(Instant::now()) {
                    return Ok(entry.value.clone());
                }
            }

            let value = self.inner.get_property(key).await?;
            let now = Instant::now();
            self.entries.insert(
                key.to_string(),
                CachedEntry {
                    value: value.clone(),
                    last_updated: now,
                    expires: now + self.ttl_for(control),
                    no_expire: control.map(|c| c.no_expire).unwrap_or(false),
                },
            );
            Ok(value)
        })
    }
}
