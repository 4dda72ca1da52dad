use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("Plugin index is not initialized: run discover_plugins() before querying")]
    NotInitialized,

    #[error("Contract identity must not be empty")]
    InvalidContract,

    #[error("Invalid search pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Failed to load module {path}: {reason}")]
    ModuleLoad { path: PathBuf, reason: String },

    #[error("Module {path} does not export the '{symbol}' entry point")]
    MissingEntryPoint {
        path: PathBuf,
        symbol: &'static str,
    },

    #[error("Module {path} returned a null descriptor")]
    NullDescriptor { path: PathBuf },

    #[error("Module {path} ABI mismatch: expected {expected}, got {actual}")]
    AbiMismatch {
        path: PathBuf,
        expected: u32,
        actual: u32,
    },

    #[error("Invalid module descriptor in {path}: {reason}")]
    InvalidDescriptor { path: PathBuf, reason: String },

    #[error("Implementation '{implementation}' is not constructible")]
    NotConstructible { implementation: String },

    #[error("Failed to construct '{implementation}': {reason}")]
    Instantiation {
        implementation: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One candidate file that could not be loaded and indexed. Recorded during a
/// discovery pass without stopping it.
#[derive(Debug, thiserror::Error)]
#[error("{path}: {error}")]
pub struct DiscoveryFailure {
    pub path: PathBuf,
    pub error: PluginError,
}

/// Outcome of one discovery pass. A non-empty failure list does not invalidate
/// the index built from the modules that did load; whether partial success is
/// acceptable is the caller's call.
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    /// Number of modules successfully loaded and indexed.
    pub modules_loaded: usize,
    /// Per-file failures, attributed to the file (or directory) that caused them.
    pub failures: Vec<DiscoveryFailure>,
}

impl DiscoveryReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}
