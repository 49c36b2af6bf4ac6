use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, SystemTime};

/// A cached value together with its metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry<V> {
    pub value: V,
    /// Absolute point in time after which the entry is stale.
    pub expires_at: Option<SystemTime>,
    /// Version tag; a read with a different version treats the entry as a miss.
    pub version: Option<String>,
}

impl<V> Entry<V> {
    /// Create an entry that never expires.
    pub fn new(value: V) -> Self {
        Self {
            value,
            expires_at: None,
            version: None,
        }
    }

    /// Build an entry from a value, applying `expires_in` and `version` from `options`.
    pub fn with_options(value: V, options: &CacheOptions) -> Self {
        Self {
            value,
            expires_at: options.expires_in.map(|ttl| SystemTime::now() + ttl),
            version: options.version.clone(),
        }
    }

    /// Set an expiry relative to now.
    pub fn expires_in(mut self, ttl: Duration) -> Self {
        self.expires_at = Some(SystemTime::now() + ttl);
        self
    }

    /// Set the version tag.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Returns true if the entry has an expiry that is in the past.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(SystemTime::now())
    }

    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Returns true if the entry does not satisfy the version requested in `options`.
    pub fn mismatched(&self, options: &CacheOptions) -> bool {
        match (&options.version, &self.version) {
            (Some(wanted), Some(have)) => wanted != have,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    pub fn into_value(self) -> V {
        self.value
    }
}

/// Backend-specific hints passed along with every operation.
///
/// The canary facade never interprets these; it forwards the same bag to every
/// store it calls. Backends pick what they understand and ignore the rest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheOptions {
    pub expires_in: Option<Duration>,
    pub namespace: Option<String>,
    pub version: Option<String>,
    pub extra: BTreeMap<String, String>,
}

impl CacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expires_in(mut self, ttl: Duration) -> Self {
        self.expires_in = Some(ttl);
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Attach a free-form hint for a specific backend.
    pub fn hint(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }

    /// Prefix `key` with the namespace, if one is set.
    pub fn namespaced_key(&self, key: &str) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}:{key}"),
            None => key.to_string(),
        }
    }
}

/// Key selector for [`delete_matched`](crate::CacheStore::delete_matched).
#[derive(Clone)]
pub enum Matcher {
    Prefix(String),
    Pattern(regex::Regex),
}

impl Matcher {
    /// Compile a regular expression matcher.
    pub fn pattern(pattern: &str) -> crate::Result<Self> {
        regex::Regex::new(pattern)
            .map(Matcher::Pattern)
            .map_err(|e| crate::Error::InvalidValue(format!("invalid matcher pattern: {e}")))
    }

    pub fn matches(&self, key: &str) -> bool {
        match self {
            Matcher::Prefix(prefix) => key.starts_with(prefix.as_str()),
            Matcher::Pattern(re) => re.is_match(key),
        }
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Prefix(p) => f.debug_tuple("Prefix").field(p).finish(),
            Matcher::Pattern(re) => f.debug_tuple("Pattern").field(&re.as_str()).finish(),
        }
    }
}

impl PartialEq for Matcher {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Matcher::Prefix(a), Matcher::Prefix(b)) => a == b,
            (Matcher::Pattern(a), Matcher::Pattern(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

impl Eq for Matcher {}
