//! Contract-to-implementation index built by a discovery pass.

use std::collections::HashMap;

use crate::descriptor::TypeDescriptor;

/// Mapping from contract identity to the implementation identities discovered
/// for it, in discovery order and with duplicates across modules preserved,
/// plus a type table for resolving identities back to live descriptors.
///
/// Built fresh on every pass and published whole; an index is never mutated
/// after publication. Empty implementation lists are never stored: a missing
/// key means "no implementations".
#[derive(Debug, Default, Clone)]
pub struct PluginIndex {
    by_contract: HashMap<String, Vec<String>>,
    types: HashMap<String, TypeDescriptor>,
}

impl PluginIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an implementation identity under a contract identity.
    pub fn record(&mut self, contract: &str, implementation: &str) {
        self.by_contract
            .entry(contract.to_string())
            .or_default()
            .push(implementation.to_string());
    }

    /// Register a descriptor so its identity can be resolved later. A repeated
    /// identity replaces the earlier registration.
    pub fn register_type(&mut self, descriptor: TypeDescriptor) {
        self.types.insert(descriptor.id().to_string(), descriptor);
    }

    /// Implementation identities recorded for a contract, empty if unknown.
    pub fn implementations(&self, contract: &str) -> &[String] {
        self.by_contract
            .get(contract)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Resolve an implementation identity back to its descriptor. `None` when
    /// the identity has no registered type (e.g. it vanished out of band).
    pub fn resolve(&self, implementation: &str) -> Option<&TypeDescriptor> {
        self.types.get(implementation)
    }

    pub fn contracts(&self) -> impl Iterator<Item = &str> {
        self.by_contract.keys().map(String::as_str)
    }

    pub fn contract_count(&self) -> usize {
        self.by_contract.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_contract.is_empty()
    }
}
