//! The module-loading boundary.
//!
//! [`ModuleBackend`] is the seam between the discovery pipeline and the host
//! primitive that actually brings module code into the process. The crate
//! ships two implementations: [`crate::dylib::DylibBackend`] for shared
//! libraries, and [`StaticBackend`], a compile-time registration table for
//! hosts that trade runtime loading for safety (and for tests).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::descriptor::TypeDescriptor;
use crate::error::PluginError;

/// A module brought into the process, with its exported types.
#[derive(Debug, Clone)]
pub struct LoadedModule {
    path: PathBuf,
    types: Vec<TypeDescriptor>,
}

impl LoadedModule {
    pub fn new(path: impl Into<PathBuf>, types: Vec<TypeDescriptor>) -> Self {
        Self {
            path: path.into(),
            types,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exported_types(&self) -> &[TypeDescriptor] {
        &self.types
    }
}

/// Host primitive that loads one candidate file as a module.
pub trait ModuleBackend: Send + Sync {
    /// Make `dir` available when resolving dependent modules. Plugin modules
    /// commonly ship private dependency files colocated with them; the loader
    /// registers each module's own directory before attempting its load.
    fn add_resolution_path(&self, dir: &Path);

    /// Load the file at `path` and enumerate its exported types.
    ///
    /// # Safety
    ///
    /// Loading a module may execute arbitrary initialization code from it.
    /// The caller must ensure every candidate the backend is asked to load is
    /// a trusted deployment artifact. Backends that run no foreign code, such
    /// as [`StaticBackend`], satisfy this trivially.
    unsafe fn load(&self, path: &Path) -> Result<LoadedModule, PluginError>;
}

/// Registration-table backend: candidate paths map to exported type sets
/// declared ahead of time in the host binary. Asking it to load a path with
/// no registration is a per-module load failure, like any other bad module.
#[derive(Default)]
pub struct StaticBackend {
    modules: Mutex<HashMap<PathBuf, Vec<TypeDescriptor>>>,
    resolution_paths: Mutex<Vec<PathBuf>>,
}

impl StaticBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the types exported by the module at `path`.
    pub fn register(&self, path: impl Into<PathBuf>, types: Vec<TypeDescriptor>) {
        self.modules.lock().unwrap().insert(path.into(), types);
    }

    /// Remove a registration. Returns whether one existed.
    pub fn unregister(&self, path: &Path) -> bool {
        self.modules.lock().unwrap().remove(path).is_some()
    }

    /// Directories registered for dependent-module resolution so far.
    pub fn resolution_paths(&self) -> Vec<PathBuf> {
        self.resolution_paths.lock().unwrap().clone()
    }
}

impl ModuleBackend for StaticBackend {
    fn add_resolution_path(&self, dir: &Path) {
        let mut paths = self.resolution_paths.lock().unwrap();
        if !paths.iter().any(|p| p == dir) {
            paths.push(dir.to_path_buf());
        }
    }

    unsafe fn load(&self, path: &Path) -> Result<LoadedModule, PluginError> {
        self.modules
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .map(|types| LoadedModule::new(path, types))
            .ok_or_else(|| PluginError::ModuleLoad {
                path: path.to_path_buf(),
                reason: "no module registered for this path".into(),
            })
    }
}
