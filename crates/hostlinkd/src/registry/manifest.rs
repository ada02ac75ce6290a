//! Declarative handler manifests.
//!
//! A manifest is a JSON document that binds public method names to handlers
//! compiled into a [`HandlerCatalog`]:
//!
//! ```json
//! {
//!   "methods": [
//!     { "name": "say", "handler": "echo" },
//!     { "name": "status", "handler": "ping", "affinity": "any" }
//!   ]
//! }
//! ```
//!
//! [`ManifestModule`] re-reads the file on every load, so editing the manifest
//! and calling `reload_handlers` re-points method names without restarting
//! the process.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use super::handler::{Affinity, Handler, HandlerBinding, HandlerModule, ModuleError};

/// Named handler implementations that manifests may refer to.
#[derive(Clone, Default)]
pub struct HandlerCatalog {
    entries: HashMap<String, (Affinity, Arc<dyn Handler>)>,
}

impl HandlerCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a handler under `key` with its default affinity.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, affinity: Affinity, handler: impl Handler) -> Self {
        self.insert(key, affinity, handler);
        self
    }

    /// Adds or replaces a handler under `key`.
    pub fn insert(&mut self, key: impl Into<String>, affinity: Affinity, handler: impl Handler) {
        self.entries
            .insert(key.into(), (affinity, Arc::new(handler)));
    }

    /// Catalogued handler keys.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    fn bind(&self, entry: &ManifestEntry) -> Result<HandlerBinding, ManifestError> {
        let (default_affinity, handler) =
            self.entries
                .get(&entry.handler)
                .ok_or_else(|| ManifestError::UnknownHandler {
                    method: entry.name.clone(),
                    handler: entry.handler.clone(),
                })?;
        Ok(HandlerBinding::with_affinity(
            entry.name.clone(),
            entry.affinity.unwrap_or(*default_affinity),
            Arc::clone(handler),
        ))
    }
}

impl fmt::Debug for HandlerCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.keys().collect();
        keys.sort_unstable();
        f.debug_struct("HandlerCatalog").field("keys", &keys).finish()
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestDocument {
    #[serde(default)]
    methods: Vec<ManifestEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestEntry {
    name: String,
    handler: String,
    #[serde(default)]
    affinity: Option<Affinity>,
}

/// Failures raised while reading or applying a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest file could not be read.
    #[error("failed to read handler manifest {path}: {source}")]
    Read {
        /// Manifest path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The manifest was not valid JSON for the expected schema.
    #[error("failed to parse handler manifest {path}: {source}")]
    Parse {
        /// Manifest path.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A method referred to a handler missing from the catalog.
    #[error("method '{method}' refers to unknown handler '{handler}'")]
    UnknownHandler {
        /// Method being bound.
        method: String,
        /// Catalog key that was not found.
        handler: String,
    },

    /// The manifest bound the same method twice.
    #[error("method '{method}' is declared more than once")]
    DuplicateMethod {
        /// Repeated method name.
        method: String,
    },

    /// A method name was empty.
    #[error("manifest contains a method with an empty name")]
    EmptyMethod,
}

/// A [`HandlerModule`] whose bindings come from a manifest on disk.
#[derive(Debug)]
pub struct ManifestModule {
    name: String,
    path: PathBuf,
    catalog: HandlerCatalog,
}

impl ManifestModule {
    /// Creates a module reading `path` against `catalog`.
    pub fn new(path: impl Into<PathBuf>, catalog: HandlerCatalog) -> Self {
        let path = path.into();
        Self {
            name: format!("manifest:{}", path.display()),
            path,
            catalog,
        }
    }

    /// Manifest path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads and resolves the manifest.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError`] when the file is unreadable, malformed, or
    /// names handlers the catalog does not provide.
    pub fn read_bindings(&self) -> Result<Vec<HandlerBinding>, ManifestError> {
        let raw = fs::read_to_string(&self.path).map_err(|source| ManifestError::Read {
            path: self.path.clone(),
            source,
        })?;
        let document: ManifestDocument =
            serde_json::from_str(&raw).map_err(|source| ManifestError::Parse {
                path: self.path.clone(),
                source,
            })?;

        let mut seen = HashSet::new();
        let mut bindings = Vec::with_capacity(document.methods.len());
        for entry in &document.methods {
            if entry.name.is_empty() {
                return Err(ManifestError::EmptyMethod);
            }
            if !seen.insert(entry.name.as_str()) {
                return Err(ManifestError::DuplicateMethod {
                    method: entry.name.clone(),
                });
            }
            bindings.push(self.catalog.bind(entry)?);
        }
        Ok(bindings)
    }
}

impl HandlerModule for ManifestModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Result<Vec<HandlerBinding>, ModuleError> {
        self.read_bindings()
            .map_err(|error| ModuleError::new(error.to_string()))
    }
}
