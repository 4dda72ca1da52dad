//! Dynamic-library module backend and the C-compatible descriptor ABI.
//!
//! A plugin module is a shared library exporting one entry point,
//! [`ENTRY_POINT`], that returns a static [`RawModuleDescriptor`]: the ABI
//! version plus a table of exported types, each carrying its implementation
//! identity, the contract identities it implements, and an `extern "C"`
//! constructor returning a type-erased instance. The
//! [`export_plugin_module!`](crate::export_plugin_module) macro generates the
//! whole descriptor for plugin authors.

use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use libloading::{Library, Symbol};

use crate::backend::{LoadedModule, ModuleBackend};
use crate::descriptor::{PluginInstance, TypeDescriptor};
use crate::error::PluginError;

/// Current descriptor ABI version. Modules built against a different version
/// are rejected at load time.
pub const PLUGIN_ABI_VERSION: u32 = 1;

/// Symbol every plugin module must export.
pub const ENTRY_POINT: &str = "plugin_host_module_descriptor";
const ENTRY_POINT_SYMBOL: &[u8] = b"plugin_host_module_descriptor\0";

type ModuleEntryPoint = unsafe extern "C" fn() -> *const RawModuleDescriptor;

/// Borrowed UTF-8 string with C-compatible layout (pointer + length).
#[repr(C)]
pub struct RawStr {
    ptr: *const u8,
    len: usize,
}

// SAFETY: RawStr is a pointer to immutable static string data.
unsafe impl Send for RawStr {}
unsafe impl Sync for RawStr {}

impl RawStr {
    pub const fn new(s: &'static str) -> Self {
        Self {
            ptr: s.as_ptr(),
            len: s.len(),
        }
    }

    /// Read the string back.
    ///
    /// # Safety
    ///
    /// `ptr` must point to `len` initialized bytes that outlive the returned
    /// reference.
    pub unsafe fn as_str(&self) -> Result<&str, &'static str> {
        if self.ptr.is_null() {
            return Err("string pointer is null");
        }
        // SAFETY: caller guarantees ptr/len describe a live allocation.
        let bytes = unsafe { std::slice::from_raw_parts(self.ptr, self.len) };
        std::str::from_utf8(bytes).map_err(|_| "string is not valid UTF-8")
    }
}

/// Borrowed array of [`RawStr`] with C-compatible layout.
#[repr(C)]
pub struct RawStrList {
    ptr: *const RawStr,
    len: usize,
}

// SAFETY: RawStrList points to immutable static descriptor data.
unsafe impl Send for RawStrList {}
unsafe impl Sync for RawStrList {}

impl RawStrList {
    pub const fn new(items: &'static [RawStr]) -> Self {
        Self {
            ptr: items.as_ptr(),
            len: items.len(),
        }
    }

    /// # Safety
    ///
    /// `ptr` must point to `len` valid items outliving the returned slice.
    pub unsafe fn as_slice(&self) -> &[RawStr] {
        if self.ptr.is_null() || self.len == 0 {
            &[]
        } else {
            // SAFETY: caller guarantees ptr/len describe a live array.
            unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
        }
    }
}

/// Constructor exported per concrete type. Returns a pointer produced by
/// [`instance_to_raw`], or null on failure.
pub type CreateInstanceFn = unsafe extern "C" fn() -> *mut c_void;

/// One exported type in a module descriptor.
#[repr(C)]
pub struct RawTypeDescriptor {
    /// Implementation identity.
    pub id: RawStr,
    /// Contract identities this type implements.
    pub contracts: RawStrList,
    /// Non-zero for concrete (constructible) types.
    pub concrete: u8,
    /// Constructor; must be present when `concrete` is non-zero.
    pub create: Option<CreateInstanceFn>,
}

// SAFETY: RawTypeDescriptor holds only pointers to static data and function
// pointers.
unsafe impl Send for RawTypeDescriptor {}
unsafe impl Sync for RawTypeDescriptor {}

/// Descriptor returned by a module's entry point.
#[repr(C)]
pub struct RawModuleDescriptor {
    /// Must equal [`PLUGIN_ABI_VERSION`].
    pub abi_version: u32,
    types: *const RawTypeDescriptor,
    types_len: usize,
}

// SAFETY: RawModuleDescriptor holds only pointers to static data.
unsafe impl Send for RawModuleDescriptor {}
unsafe impl Sync for RawModuleDescriptor {}

impl RawModuleDescriptor {
    pub const fn new(abi_version: u32, types: &'static [RawTypeDescriptor]) -> Self {
        Self {
            abi_version,
            types: types.as_ptr(),
            types_len: types.len(),
        }
    }

    /// # Safety
    ///
    /// `types` must point to `types_len` valid descriptors outliving the
    /// returned slice.
    pub unsafe fn types(&self) -> &[RawTypeDescriptor] {
        if self.types.is_null() || self.types_len == 0 {
            &[]
        } else {
            // SAFETY: caller guarantees the descriptor table is live.
            unsafe { std::slice::from_raw_parts(self.types, self.types_len) }
        }
    }
}

/// Convert an instance into a raw pointer for the C ABI. Used by generated
/// constructors inside plugin modules.
pub fn instance_to_raw(instance: PluginInstance) -> *mut c_void {
    // Double-box so the fat trait-object pointer travels behind a thin one.
    let boxed: Box<PluginInstance> = Box::new(instance);
    Box::into_raw(boxed) as *mut c_void
}

/// Convert a raw pointer back into an instance.
///
/// # Safety
///
/// The pointer must have been produced by [`instance_to_raw`] and not yet
/// consumed.
pub unsafe fn instance_from_raw(ptr: *mut c_void) -> PluginInstance {
    // SAFETY: caller guarantees ptr came from instance_to_raw.
    let boxed: Box<PluginInstance> = unsafe { Box::from_raw(ptr as *mut PluginInstance) };
    *boxed
}

/// [`ModuleBackend`] backed by `libloading`.
///
/// Loaded libraries are never unloaded: each concrete [`TypeDescriptor`]
/// built from a module keeps the library handle alive through its
/// constructor closure.
#[derive(Default)]
pub struct DylibBackend {
    resolution_paths: Mutex<Vec<PathBuf>>,
}

impl DylibBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absolute and existing paths load as given; bare names are tried
    /// against the registered resolution paths. OS-level resolution of a
    /// library's own dependencies still follows the platform loader's rules.
    fn resolve_candidate(&self, path: &Path) -> PathBuf {
        if path.is_absolute() || path.exists() {
            return path.to_path_buf();
        }
        for dir in self.resolution_paths.lock().unwrap().iter() {
            let candidate = dir.join(path);
            if candidate.exists() {
                return candidate;
            }
        }
        path.to_path_buf()
    }
}

impl ModuleBackend for DylibBackend {
    fn add_resolution_path(&self, dir: &Path) {
        let mut paths = self.resolution_paths.lock().unwrap();
        if !paths.iter().any(|p| p == dir) {
            paths.push(dir.to_path_buf());
        }
    }

    unsafe fn load(&self, path: &Path) -> Result<LoadedModule, PluginError> {
        let target = self.resolve_candidate(path);

        // SAFETY: caller upholds the trait contract that the module is a
        // trusted artifact; its initializers may run here.
        let library = unsafe { Library::new(&target) }.map_err(|e| PluginError::ModuleLoad {
            path: target.clone(),
            reason: e.to_string(),
        })?;

        let descriptor: *const RawModuleDescriptor = {
            // SAFETY: the library was just loaded; the symbol type matches the
            // exported entry point's signature.
            let entry: Symbol<'_, ModuleEntryPoint> =
                unsafe { library.get(ENTRY_POINT_SYMBOL) }.map_err(|_| {
                    PluginError::MissingEntryPoint {
                        path: target.clone(),
                        symbol: ENTRY_POINT,
                    }
                })?;
            // SAFETY: the entry point is a plain descriptor getter per the ABI.
            unsafe { entry() }
        };

        if descriptor.is_null() {
            return Err(PluginError::NullDescriptor { path: target });
        }
        // SAFETY: non-null and, per the ABI contract, points to a static
        // descriptor that lives as long as the library.
        let descriptor = unsafe { &*descriptor };

        if descriptor.abi_version != PLUGIN_ABI_VERSION {
            return Err(PluginError::AbiMismatch {
                path: target,
                expected: PLUGIN_ABI_VERSION,
                actual: descriptor.abi_version,
            });
        }

        let invalid = |reason: String| PluginError::InvalidDescriptor {
            path: target.clone(),
            reason,
        };

        let library = Arc::new(library);
        let mut types = Vec::new();
        // SAFETY: descriptor validated above; the type table is static module
        // data kept alive by `library`.
        for raw in unsafe { descriptor.types() } {
            let id = unsafe { raw.id.as_str() }
                .map_err(|reason| invalid(format!("type identity: {reason}")))?
                .to_string();
            let mut contracts = Vec::new();
            for contract in unsafe { raw.contracts.as_slice() } {
                let contract = unsafe { contract.as_str() }
                    .map_err(|reason| invalid(format!("contract of '{id}': {reason}")))?;
                contracts.push(contract.to_string());
            }

            if raw.concrete == 0 {
                types.push(TypeDescriptor::abstract_type(id, contracts));
                continue;
            }

            let Some(create) = raw.create else {
                return Err(invalid(format!("concrete type '{id}' has no constructor")));
            };
            let keep_alive = Arc::clone(&library);
            let implementation = id.clone();
            types.push(TypeDescriptor::with_constructor(
                id,
                contracts,
                Arc::new(move || {
                    let _library = &keep_alive;
                    // SAFETY: `create` was exported by the module `_library`
                    // keeps loaded and returns an instance_to_raw pointer or
                    // null.
                    let ptr = unsafe { create() };
                    if ptr.is_null() {
                        Err(PluginError::Instantiation {
                            implementation: implementation.clone(),
                            reason: "constructor returned null".into(),
                        })
                    } else {
                        // SAFETY: non-null pointers from `create` come from
                        // instance_to_raw.
                        Ok(unsafe { instance_from_raw(ptr) })
                    }
                }),
            ));
        }

        Ok(LoadedModule::new(target, types))
    }
}

/// Export a module descriptor from a `cdylib` plugin crate.
///
/// Each entry names one concrete exported type: its implementation identity,
/// the contract identities it implements, and a non-capturing constructor
/// closure returning a boxed instance.
///
/// ```ignore
/// use plugin_host::export_plugin_module;
///
/// #[derive(Default)]
/// struct JsonCodec;
///
/// export_plugin_module! {
///     "acme::JsonCodec" implements ["acme::Codec", "acme::Named"] =>
///         || Box::new(JsonCodec::default()),
/// }
/// ```
#[macro_export]
macro_rules! export_plugin_module {
    ($($id:literal implements [$($contract:literal),+ $(,)?] => $ctor:expr),+ $(,)?) => {
        #[unsafe(no_mangle)]
        pub extern "C" fn plugin_host_module_descriptor()
            -> *const $crate::dylib::RawModuleDescriptor
        {
            const TYPES: &[$crate::dylib::RawTypeDescriptor] = &[
                $(
                    $crate::dylib::RawTypeDescriptor {
                        id: $crate::dylib::RawStr::new($id),
                        contracts: $crate::dylib::RawStrList::new(&[
                            $($crate::dylib::RawStr::new($contract)),+
                        ]),
                        concrete: 1,
                        create: {
                            unsafe extern "C" fn create() -> *mut ::std::ffi::c_void {
                                let constructor: fn() -> $crate::PluginInstance = $ctor;
                                $crate::dylib::instance_to_raw(constructor())
                            }
                            Some(create as $crate::dylib::CreateInstanceFn)
                        },
                    }
                ),+
            ];
            static MODULE: $crate::dylib::RawModuleDescriptor =
                $crate::dylib::RawModuleDescriptor::new($crate::dylib::PLUGIN_ABI_VERSION, TYPES);
            &MODULE
        }
    };
}
