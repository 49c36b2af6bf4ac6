use crate::{CacheStore, Error, Result};
use std::collections::{BTreeMap, HashMap};
use std::fmt::{self, Debug, Display};
use std::str::FromStr;

/// Arguments handed to a backend constructor.
///
/// Positional arguments are typically connection strings; named parameters
/// carry tuning knobs such as sizes. Both are plain strings, parsed by the
/// constructor that consumes them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendArgs {
    positional: Vec<String>,
    named: BTreeMap<String, String>,
}

impl BackendArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl Into<String>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Set a named parameter.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.named.insert(name.into(), value.into());
        self
    }

    pub fn positional(&self) -> &[String] {
        &self.positional
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.named.get(name).map(String::as_str)
    }

    /// Parse a named parameter. Missing parameters are `Ok(None)`.
    pub fn parse<T>(&self, name: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.get(name)
            .map(|raw| {
                raw.parse::<T>().map_err(|e| {
                    Error::Configuration(format!("invalid value `{raw}` for `{name}`: {e}"))
                })
            })
            .transpose()
    }
}

/// A function that builds a store from [`BackendArgs`].
pub type Constructor<S> = Box<dyn Fn(BackendArgs) -> Result<S> + Send + Sync>;

/// Maps backend identifiers to constructors.
///
/// Resolution is a plain table lookup; an identifier that was never
/// registered is a [`Error::Configuration`].
pub struct BackendRegistry<S: CacheStore> {
    constructors: HashMap<String, Constructor<S>>,
}

impl<S: CacheStore> BackendRegistry<S> {
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Register a constructor, replacing any previous one for `id`.
    pub fn register<F>(&mut self, id: impl Into<String>, constructor: F) -> &mut Self
    where
        F: Fn(BackendArgs) -> Result<S> + Send + Sync + 'static,
    {
        let id = id.into();
        if self.constructors.insert(id.clone(), Box::new(constructor)).is_some() {
            tracing::debug!(backend = %id, "Replaced backend constructor");
        }
        self
    }

    pub fn contains(&self, id: &str) -> bool {
        self.constructors.contains_key(id)
    }

    /// Registered identifiers, sorted.
    pub fn identifiers(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Look up the constructor for `id` without invoking it.
    pub fn lookup(&self, id: &str) -> Result<&Constructor<S>> {
        if id.trim().is_empty() {
            return Err(Error::Configuration(
                "backend identifier must not be empty".to_string(),
            ));
        }
        self.constructors
            .get(id)
            .ok_or_else(|| Error::Configuration(format!("unknown cache backend `{id}`")))
    }

    /// Construct a store with the backend registered under `id`.
    pub fn construct(&self, id: &str, args: BackendArgs) -> Result<S> {
        let constructor = self.lookup(id)?;
        constructor(args)
    }
}

impl<S: CacheStore> Default for BackendRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: CacheStore> Debug for BackendRegistry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.identifiers())
            .finish()
    }
}
