//! Method-name to handler registry with atomic hot reload.
//!
//! The registry holds an immutable table behind a read-write lock and swaps
//! the whole table on [`HandlerRegistry::reload`]. Readers therefore always
//! observe either the pre-reload or the post-reload mapping, never a mix.
//! Every module is loaded before anything is published, so a failing module
//! leaves the previous table serving in full.

mod errors;
mod handler;
mod manifest;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock, Weak};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

pub use self::errors::RegistryError;
pub use self::handler::{
    Affinity, Handler, HandlerBinding, HandlerError, HandlerModule, ModuleError,
};
pub use self::manifest::{HandlerCatalog, ManifestError, ManifestModule};

/// Tracing target for registry operations.
pub(crate) const REGISTRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::registry");

/// Reserved method that triggers [`HandlerRegistry::reload`].
pub const RELOAD_METHOD: &str = "reload_handlers";

/// A resolved registry entry.
#[derive(Clone)]
pub struct HandlerEntry {
    name: Arc<str>,
    affinity: Affinity,
    generation: u64,
    handler: Arc<dyn Handler>,
}

impl HandlerEntry {
    fn from_binding(binding: HandlerBinding, generation: u64) -> Self {
        Self {
            name: Arc::from(binding.name),
            affinity: binding.affinity,
            generation,
            handler: binding.handler,
        }
    }

    /// Method name the entry is registered under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Thread requirement of the handler.
    #[must_use]
    pub fn affinity(&self) -> Affinity {
        self.affinity
    }

    /// Table generation the entry was resolved from.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Runs the handler on the current thread.
    ///
    /// # Errors
    ///
    /// Propagates the handler's own failure.
    pub fn invoke(&self, params: Value) -> Result<Value, HandlerError> {
        self.handler.call(params)
    }
}

impl fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("name", &self.name)
            .field("affinity", &self.affinity)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// Result of a successful reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadSummary {
    /// Number of modules re-derived.
    pub reloaded_count: usize,
    /// Number of methods served after the swap.
    pub method_count: usize,
}

struct Table {
    generation: u64,
    entries: HashMap<String, HandlerEntry>,
}

/// Mapping from method name to handler, shared by every session.
pub struct HandlerRegistry {
    modules: Vec<Box<dyn HandlerModule>>,
    table: RwLock<Arc<Table>>,
    manual: Mutex<Vec<HandlerBinding>>,
    this: Weak<HandlerRegistry>,
}

impl HandlerRegistry {
    /// Builds a registry from `modules` and loads them immediately.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ModuleLoad`] if any module fails its initial
    /// load, or [`RegistryError::Reserved`] if a module claims the reload
    /// method.
    pub fn new(modules: Vec<Box<dyn HandlerModule>>) -> Result<Arc<Self>, RegistryError> {
        let entries = load_modules(&modules, &[], 1)?;
        let method_count = entries.len();
        let registry = Arc::new_cyclic(|this: &Weak<Self>| Self {
            modules,
            table: RwLock::new(Arc::new(Table {
                generation: 1,
                entries,
            })),
            manual: Mutex::new(Vec::new()),
            this: this.clone(),
        });
        registry.install_reload_entry()?;
        info!(
            target: REGISTRY_TARGET,
            modules = registry.modules.len(),
            methods = method_count,
            "handler registry initialised"
        );
        Ok(registry)
    }

    /// Builds a registry with only the reserved reload method.
    #[must_use]
    pub fn empty() -> Arc<Self> {
        let registry = Arc::new_cyclic(|this: &Weak<Self>| Self {
            modules: Vec::new(),
            table: RwLock::new(Arc::new(Table {
                generation: 1,
                entries: HashMap::new(),
            })),
            manual: Mutex::new(Vec::new()),
            this: this.clone(),
        });
        if let Err(error) = registry.install_reload_entry() {
            warn!(target: REGISTRY_TARGET, %error, "failed to install reload method");
        }
        registry
    }

    /// Registers a single handler outside any module.
    ///
    /// Manually registered handlers survive reloads and replace any module
    /// binding of the same name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Reserved`] for the reload method name, or
    /// [`RegistryError::Poisoned`] if a previous writer panicked.
    pub fn register(&self, binding: HandlerBinding) -> Result<(), RegistryError> {
        if binding.name == RELOAD_METHOD {
            return Err(RegistryError::Reserved {
                method: binding.name,
            });
        }
        let mut manual = self.manual.lock().map_err(|_| RegistryError::Poisoned)?;
        manual.retain(|existing| existing.name != binding.name);
        manual.push(binding.clone());

        let mut guard = self.table.write().map_err(|_| RegistryError::Poisoned)?;
        let generation = guard.generation;
        let mut entries = guard.entries.clone();
        debug!(
            target: REGISTRY_TARGET,
            method = binding.name.as_str(),
            affinity = %binding.affinity,
            "registered handler"
        );
        entries.insert(
            binding.name.clone(),
            HandlerEntry::from_binding(binding, generation),
        );
        *guard = Arc::new(Table {
            generation,
            entries,
        });
        Ok(())
    }

    /// Looks up the handler for `method`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] when no handler is registered.
    pub fn resolve(&self, method: &str) -> Result<HandlerEntry, RegistryError> {
        let table = self.snapshot()?;
        table
            .entries
            .get(method)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound {
                method: method.to_owned(),
            })
    }

    /// Re-derives the mapping from every module and swaps it in atomically.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ModuleLoad`] if any module fails. The previous
    /// table stays in service unchanged.
    pub fn reload(&self) -> Result<ReloadSummary, RegistryError> {
        let manual = self.manual.lock().map_err(|_| RegistryError::Poisoned)?;
        let generation = self.generation()? + 1;
        let mut entries = match load_modules(&self.modules, &manual, generation) {
            Ok(entries) => entries,
            Err(error) => {
                warn!(target: REGISTRY_TARGET, %error, "handler reload failed; keeping previous table");
                return Err(error);
            }
        };
        entries.insert(RELOAD_METHOD.to_owned(), self.reload_entry(generation));
        let method_count = entries.len();

        let mut guard = self.table.write().map_err(|_| RegistryError::Poisoned)?;
        *guard = Arc::new(Table {
            generation,
            entries,
        });
        drop(guard);
        drop(manual);

        info!(
            target: REGISTRY_TARGET,
            generation,
            modules = self.modules.len(),
            methods = method_count,
            "handler table reloaded"
        );
        Ok(ReloadSummary {
            reloaded_count: self.modules.len(),
            method_count,
        })
    }

    /// Registered method names in lexical order.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Poisoned`] if a writer panicked.
    pub fn method_names(&self) -> Result<Vec<String>, RegistryError> {
        let table = self.snapshot()?;
        let mut names: Vec<String> = table.entries.keys().cloned().collect();
        names.sort_unstable();
        Ok(names)
    }

    /// Number of registered methods, including the reload method.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Poisoned`] if a writer panicked.
    pub fn len(&self) -> Result<usize, RegistryError> {
        Ok(self.snapshot()?.entries.len())
    }

    /// Current table generation; starts at one and grows on each reload.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Poisoned`] if a writer panicked.
    pub fn generation(&self) -> Result<u64, RegistryError> {
        Ok(self.snapshot()?.generation)
    }

    fn snapshot(&self) -> Result<Arc<Table>, RegistryError> {
        self.table
            .read()
            .map(|guard| Arc::clone(&*guard))
            .map_err(|_| RegistryError::Poisoned)
    }

    fn install_reload_entry(&self) -> Result<(), RegistryError> {
        let mut guard = self.table.write().map_err(|_| RegistryError::Poisoned)?;
        let generation = guard.generation;
        let mut entries = guard.entries.clone();
        entries.insert(RELOAD_METHOD.to_owned(), self.reload_entry(generation));
        *guard = Arc::new(Table {
            generation,
            entries,
        });
        Ok(())
    }

    fn reload_entry(&self, generation: u64) -> HandlerEntry {
        let registry = self.this.clone();
        let handler = move |_params: Value| -> Result<Value, HandlerError> {
            let registry = registry
                .upgrade()
                .ok_or_else(|| HandlerError::new("handler registry is no longer available"))?;
            let summary = registry
                .reload()
                .map_err(|error| HandlerError::new(error.to_string()))?;
            serde_json::to_value(summary).map_err(|error| HandlerError::new(error.to_string()))
        };
        HandlerEntry::from_binding(
            HandlerBinding::with_affinity(RELOAD_METHOD, Affinity::Host, Arc::new(handler)),
            generation,
        )
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let modules: Vec<&str> = self.modules.iter().map(|module| module.name()).collect();
        f.debug_struct("HandlerRegistry")
            .field("modules", &modules)
            .finish_non_exhaustive()
    }
}

fn load_modules(
    modules: &[Box<dyn HandlerModule>],
    manual: &[HandlerBinding],
    generation: u64,
) -> Result<HashMap<String, HandlerEntry>, RegistryError> {
    let mut entries = HashMap::new();
    for module in modules {
        let bindings = module.load().map_err(|source| RegistryError::ModuleLoad {
            module: module.name().to_owned(),
            source,
        })?;
        debug!(
            target: REGISTRY_TARGET,
            module = module.name(),
            bindings = bindings.len(),
            "module loaded"
        );
        for binding in bindings {
            if binding.name == RELOAD_METHOD {
                return Err(RegistryError::Reserved {
                    method: binding.name,
                });
            }
            if entries.contains_key(&binding.name) {
                warn!(
                    target: REGISTRY_TARGET,
                    module = module.name(),
                    method = binding.name.as_str(),
                    "method bound twice; later binding wins"
                );
            }
            entries.insert(
                binding.name.clone(),
                HandlerEntry::from_binding(binding, generation),
            );
        }
    }
    for binding in manual {
        entries.insert(
            binding.name.clone(),
            HandlerEntry::from_binding(binding.clone(), generation),
        );
    }
    Ok(entries)
}
