//! Safe data model for exported plugin types.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::PluginError;

/// A live, type-erased plugin instance. Callers downcast it to the concrete
/// type they expect, or wrap it behind their own contract trait.
pub type PluginInstance = Box<dyn Any + Send + Sync>;

pub(crate) type Constructor =
    Arc<dyn Fn() -> Result<PluginInstance, PluginError> + Send + Sync>;

/// Handle for one type exported by a loaded module: its stable implementation
/// identity, the contract identities it implements, and (for concrete types)
/// a constructor.
///
/// For dynamically loaded modules the constructor closure owns the library
/// handle, so a descriptor keeps its module loaded for as long as it lives.
#[derive(Clone)]
pub struct TypeDescriptor {
    id: String,
    contracts: Vec<String>,
    constructor: Option<Constructor>,
}

impl TypeDescriptor {
    /// Describe a concrete type with a default constructor.
    pub fn concrete<I, S, F>(id: impl Into<String>, contracts: I, constructor: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn() -> PluginInstance + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            contracts: contracts.into_iter().map(Into::into).collect(),
            constructor: Some(Arc::new(move || Ok(constructor()))),
        }
    }

    /// Describe an abstract or interface-only type. It is never indexed as an
    /// implementation and cannot be constructed.
    pub fn abstract_type<I, S>(id: impl Into<String>, contracts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            contracts: contracts.into_iter().map(Into::into).collect(),
            constructor: None,
        }
    }

    pub(crate) fn with_constructor(
        id: String,
        contracts: Vec<String>,
        constructor: Constructor,
    ) -> Self {
        Self {
            id,
            contracts,
            constructor: Some(constructor),
        }
    }

    /// The implementation identity.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Contract identities this type implements.
    pub fn contracts(&self) -> &[String] {
        &self.contracts
    }

    /// Whether the type is independently constructible.
    pub fn is_concrete(&self) -> bool {
        self.constructor.is_some()
    }

    /// Default-construct an instance of this type.
    pub fn construct(&self) -> Result<PluginInstance, PluginError> {
        match &self.constructor {
            Some(constructor) => constructor(),
            None => Err(PluginError::NotConstructible {
                implementation: self.id.clone(),
            }),
        }
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("id", &self.id)
            .field("contracts", &self.contracts)
            .field("concrete", &self.is_concrete())
            .finish()
    }
}
