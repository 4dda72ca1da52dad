//! Scan-and-index pass: turn a file-name pattern into a [`PluginIndex`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use glob::Pattern;

use crate::backend::ModuleBackend;
use crate::error::{DiscoveryFailure, DiscoveryReport, PluginError};
use crate::index::PluginIndex;

/// Runs discovery passes against a [`ModuleBackend`].
///
/// One pass enumerates every file under a root directory (recursively) whose
/// name matches the pattern, loads each as a module, and indexes the
/// contracts implemented by its concrete exported types. A failure while
/// processing one file is recorded and the pass moves on; one bad module
/// never blocks the rest.
pub struct ModuleLoader {
    backend: Arc<dyn ModuleBackend>,
}

impl ModuleLoader {
    pub fn new(backend: Arc<dyn ModuleBackend>) -> Self {
        Self { backend }
    }

    /// Run one discovery pass over `root`.
    ///
    /// Directory entries are visited in lexicographic order, so discovery
    /// order is deterministic for a given tree. Unreadable directories are
    /// recorded as failures and skipped, and directory symlinks are not
    /// followed.
    ///
    /// # Safety
    ///
    /// Every matching file is handed to [`ModuleBackend::load`]; see its
    /// safety contract.
    pub unsafe fn discover(&self, root: &Path, pattern: &Pattern) -> (PluginIndex, DiscoveryReport) {
        let mut index = PluginIndex::new();
        let mut report = DiscoveryReport::default();

        let mut candidates = Vec::new();
        collect_candidates(root, pattern, &mut candidates, &mut report.failures);

        for path in candidates {
            // SAFETY: forwarded from the caller.
            match unsafe { self.load_module(&path, &mut index) } {
                Ok(indexed) => {
                    report.modules_loaded += 1;
                    tracing::debug!(path = %path.display(), types = indexed, "Indexed plugin module");
                }
                Err(error) => {
                    tracing::warn!(path = %path.display(), error = %error, "Skipping plugin module");
                    report.failures.push(DiscoveryFailure { path, error });
                }
            }
        }

        tracing::debug!(
            modules = report.modules_loaded,
            contracts = index.contract_count(),
            failures = report.failures.len(),
            "Discovery pass complete"
        );
        (index, report)
    }

    /// Load one module and index its concrete exported types. Returns how
    /// many types were indexed.
    unsafe fn load_module(&self, path: &Path, index: &mut PluginIndex) -> Result<usize, PluginError> {
        // Modules commonly ship private dependencies colocated with them;
        // their directory must be resolvable before the load is attempted.
        if let Some(dir) = path.parent() {
            self.backend.add_resolution_path(dir);
        }

        // SAFETY: forwarded from the caller.
        let module = unsafe { self.backend.load(path)? };

        let mut indexed = 0;
        for ty in module.exported_types() {
            if !ty.is_concrete() {
                continue;
            }
            index.register_type(ty.clone());
            for contract in ty.contracts() {
                index.record(contract, ty.id());
            }
            indexed += 1;
        }
        Ok(indexed)
    }
}

fn collect_candidates(
    dir: &Path,
    pattern: &Pattern,
    out: &mut Vec<PathBuf>,
    failures: &mut Vec<DiscoveryFailure>,
) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(error) => {
            failures.push(DiscoveryFailure {
                path: dir.to_path_buf(),
                error: error.into(),
            });
            return;
        }
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    paths.sort();

    for path in paths {
        // symlink_metadata does not follow links: a directory symlink is not
        // recursed into, so a link cycle under the root cannot loop the scan.
        let file_type = match std::fs::symlink_metadata(&path) {
            Ok(metadata) => metadata.file_type(),
            Err(error) => {
                failures.push(DiscoveryFailure {
                    path,
                    error: error.into(),
                });
                continue;
            }
        };
        if file_type.is_dir() {
            collect_candidates(&path, pattern, out, failures);
        } else if matches_file_name(&path, pattern) {
            out.push(path);
        }
    }
}

fn matches_file_name(path: &Path, pattern: &Pattern) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| pattern.matches(name))
}
