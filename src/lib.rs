//! # plugin-host
//!
//! Runtime plugin discovery and contract registry.
//!
//! A discovery pass scans the host executable's directory (recursively) for
//! files matching a name pattern, loads each as an extension module,
//! introspects its exported types, and indexes which abstract contracts each
//! concrete type implements. The [`PluginRegistry`] caches that index and
//! answers queries by contract identity, instantiating implementations on
//! demand without the caller naming concrete types ahead of time. One broken
//! module never blocks the rest of a pass; its failure is attributed to its
//! file and reported alongside the partial index.
//!
//! ## Host side
//!
//! ```rust,no_run
//! use plugin_host::PluginRegistry;
//!
//! # fn main() -> Result<(), plugin_host::PluginError> {
//! let registry = PluginRegistry::new();
//! // SAFETY: modules deployed next to the executable are trusted artifacts.
//! let report = unsafe { registry.discover_plugins() }?;
//! for failure in &report.failures {
//!     eprintln!("skipped plugin: {failure}");
//! }
//!
//! for descriptor in registry.find("acme::Codec")?.into_iter().flatten() {
//!     println!("implementation: {}", descriptor.id());
//! }
//! for instance in registry.load("acme::Codec")? {
//!     let _codec = instance?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Plugin side
//!
//! A plugin is a `cdylib` crate exporting a module descriptor:
//!
//! ```rust,ignore
//! use plugin_host::export_plugin_module;
//!
//! #[derive(Default)]
//! struct JsonCodec;
//!
//! export_plugin_module! {
//!     "acme::JsonCodec" implements ["acme::Codec"] =>
//!         || Box::new(JsonCodec::default()),
//! }
//! ```
//!
//! Hosts that prefer compile-time registration over dynamic loading use
//! [`StaticBackend`] instead; the query surface is identical.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod backend;
pub mod descriptor;
pub mod dylib;
pub mod error;
pub mod index;
pub mod loader;
pub mod registry;

// Re-exports for convenience
pub use backend::{LoadedModule, ModuleBackend, StaticBackend};
pub use descriptor::{PluginInstance, TypeDescriptor};
pub use dylib::{DylibBackend, PLUGIN_ABI_VERSION};
pub use error::{DiscoveryFailure, DiscoveryReport, PluginError};
pub use index::PluginIndex;
pub use loader::ModuleLoader;
pub use registry::{InstantiationStrategy, Instances, PluginRegistry};
