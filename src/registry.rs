//! Registry owning the cached index, contract queries, and instantiation.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use glob::Pattern;

use crate::backend::ModuleBackend;
use crate::descriptor::{PluginInstance, TypeDescriptor};
use crate::dylib::DylibBackend;
use crate::error::{DiscoveryReport, PluginError};
use crate::index::PluginIndex;
use crate::loader::ModuleLoader;

/// Turns a resolved implementation into a live instance. The default strategy
/// invokes the descriptor's own constructor.
pub type InstantiationStrategy =
    Arc<dyn Fn(&TypeDescriptor) -> Result<PluginInstance, PluginError> + Send + Sync>;

/// Owns the contract-to-implementation index as explicit, lock-guarded state.
///
/// A registry starts empty; [`discover_plugins`](Self::discover_plugins)
/// populates it and every later pass fully replaces the cache. Queries read
/// either the old or the new index, never a partially built one. Multiple
/// independent registries per process are fine.
pub struct PluginRegistry {
    pattern: Pattern,
    root: Option<PathBuf>,
    loader: ModuleLoader,
    cache: RwLock<Option<PluginIndex>>,
    strategy: RwLock<InstantiationStrategy>,
}

fn default_pattern() -> String {
    format!("*.plugin.{}", std::env::consts::DLL_EXTENSION)
}

fn executable_dir() -> Result<PathBuf, PluginError> {
    let exe = std::env::current_exe()?;
    exe.parent().map(Path::to_path_buf).ok_or_else(|| {
        PluginError::Io(std::io::Error::other(
            "executable path has no parent directory",
        ))
    })
}

impl PluginRegistry {
    /// Registry over the running executable's directory with the platform
    /// default pattern (`*.plugin.so` / `*.plugin.dll` / `*.plugin.dylib`)
    /// and the dynamic-library backend.
    pub fn new() -> Self {
        let pattern =
            Pattern::new(&default_pattern()).expect("default search pattern is a valid glob");
        Self::from_parts(pattern, None, Arc::new(DylibBackend::new()))
    }

    /// Like [`new`](Self::new) with a custom file-name pattern.
    pub fn with_pattern(pattern: &str) -> Result<Self, PluginError> {
        let pattern = parse_pattern(pattern)?;
        Ok(Self::from_parts(pattern, None, Arc::new(DylibBackend::new())))
    }

    /// Registry with an explicit scan root and module backend.
    pub fn with_backend(
        pattern: &str,
        root: impl Into<PathBuf>,
        backend: Arc<dyn ModuleBackend>,
    ) -> Result<Self, PluginError> {
        let pattern = parse_pattern(pattern)?;
        Ok(Self::from_parts(pattern, Some(root.into()), backend))
    }

    fn from_parts(pattern: Pattern, root: Option<PathBuf>, backend: Arc<dyn ModuleBackend>) -> Self {
        Self {
            pattern,
            root,
            loader: ModuleLoader::new(backend),
            cache: RwLock::new(None),
            strategy: RwLock::new(Arc::new(|descriptor: &TypeDescriptor| descriptor.construct())),
        }
    }

    /// Replace how implementations are turned into instances, e.g. to route
    /// construction through a dependency-injection container or to hand out
    /// shared singletons.
    pub fn set_instantiation_strategy<F>(&self, strategy: F)
    where
        F: Fn(&TypeDescriptor) -> Result<PluginInstance, PluginError> + Send + Sync + 'static,
    {
        *self.strategy.write().unwrap() = Arc::new(strategy);
    }

    /// Run one discovery pass and publish the resulting index, replacing any
    /// previous one. Must run at least once before [`find`](Self::find) or
    /// [`load`](Self::load).
    ///
    /// A pass with per-module failures is not an error: the report carries
    /// them and the index built from the modules that did load is published
    /// regardless, even if it is empty.
    ///
    /// # Safety
    ///
    /// Matching files are loaded into the process; see
    /// [`ModuleBackend::load`]. With [`crate::StaticBackend`] no foreign code
    /// runs and the obligation is trivial.
    pub unsafe fn discover_plugins(&self) -> Result<DiscoveryReport, PluginError> {
        let root = match &self.root {
            Some(root) => root.clone(),
            None => executable_dir()?,
        };
        // SAFETY: forwarded from the caller.
        let (index, report) = unsafe { self.loader.discover(&root, &self.pattern) };

        // The new index is complete before the swap, so concurrent readers
        // see old or new, never partial.
        *self.cache.write().unwrap() = Some(index);
        Ok(report)
    }

    /// Resolve every implementation discovered for `contract`, in discovery
    /// order. An identity that can no longer be resolved yields `None` in
    /// place; filtering those out is the caller's call. An unknown contract
    /// is an empty result, not an error.
    pub fn find(&self, contract: &str) -> Result<Vec<Option<TypeDescriptor>>, PluginError> {
        let cache = self.cache.read().unwrap();
        let index = cache.as_ref().ok_or(PluginError::NotInitialized)?;

        if contract.is_empty() {
            return Err(PluginError::InvalidContract);
        }
        Ok(index
            .implementations(contract)
            .iter()
            .map(|id| index.resolve(id).cloned())
            .collect())
    }

    /// Lazily instantiate every resolvable implementation of `contract`.
    ///
    /// Nothing is constructed until the iterator is pulled, and elements the
    /// caller never pulls are never constructed. A failing element yields
    /// `Err` and iteration continues with the next one. The registry lock is
    /// not held while the caller drives the iterator, so a concurrent
    /// discovery pass is never blocked by slow consumption.
    pub fn load(&self, contract: &str) -> Result<Instances, PluginError> {
        let descriptors: Vec<TypeDescriptor> =
            self.find(contract)?.into_iter().flatten().collect();
        let strategy = Arc::clone(&self.strategy.read().unwrap());
        Ok(Instances {
            descriptors: descriptors.into_iter(),
            strategy,
        })
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cache = self.cache.read().unwrap();
        f.debug_struct("PluginRegistry")
            .field("pattern", &self.pattern.as_str())
            .field("initialized", &cache.is_some())
            .field(
                "contracts",
                &cache.as_ref().map(PluginIndex::contract_count),
            )
            .finish()
    }
}

fn parse_pattern(pattern: &str) -> Result<Pattern, PluginError> {
    Pattern::new(pattern).map_err(|e| PluginError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// Lazy instance sequence returned by [`PluginRegistry::load`].
pub struct Instances {
    descriptors: std::vec::IntoIter<TypeDescriptor>,
    strategy: InstantiationStrategy,
}

impl Iterator for Instances {
    type Item = Result<PluginInstance, PluginError>;

    fn next(&mut self) -> Option<Self::Item> {
        let descriptor = self.descriptors.next()?;
        Some((self.strategy)(&descriptor))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.descriptors.size_hint()
    }
}

impl fmt::Debug for Instances {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instances")
            .field("remaining", &self.descriptors.len())
            .finish()
    }
}
