//! End-to-end discovery and query scenarios over a registration-table backend.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};
use std::sync::atomic::{AtomicBool, Ordering};

use plugin_host::{PluginRegistry, StaticBackend, TypeDescriptor};
use tempfile::tempdir;
use tracing_subscriber::EnvFilter;

/// Route discovery-pass logs through the test harness; `RUST_LOG=debug`
/// shows the per-module load decisions.
fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

const WIDGET: &str = "widgets::Widget";
const DISPOSABLE: &str = "core::Disposable";

#[derive(Debug, Default, PartialEq)]
struct Foo;

#[derive(Debug, Default, PartialEq)]
struct Bar;

fn touch(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"").unwrap();
    path
}

fn registry_over(dir: &Path, backend: Arc<StaticBackend>) -> PluginRegistry {
    init_tracing();
    PluginRegistry::with_backend("*.plugin.so", dir, backend).unwrap()
}

#[test]
fn two_modules_implementing_one_contract() {
    let dir = tempdir().unwrap();
    let module_a = touch(dir.path(), "a.plugin.so");
    let module_b = touch(dir.path(), "b.plugin.so");

    let backend = Arc::new(StaticBackend::new());
    backend.register(
        &module_a,
        vec![TypeDescriptor::concrete("widgets::Foo", [WIDGET], || {
            Box::new(Foo)
        })],
    );
    backend.register(
        &module_b,
        vec![TypeDescriptor::concrete("widgets::Bar", [WIDGET], || {
            Box::new(Bar)
        })],
    );

    let registry = registry_over(dir.path(), backend);
    let report = unsafe { registry.discover_plugins() }.unwrap();
    assert!(report.is_clean());
    assert_eq!(report.modules_loaded, 2);

    // Discovery order follows file enumeration order.
    let found = registry.find(WIDGET).unwrap();
    let ids: Vec<&str> = found
        .iter()
        .map(|d| d.as_ref().unwrap().id())
        .collect();
    assert_eq!(ids, ["widgets::Foo", "widgets::Bar"]);

    let mut instances = registry.load(WIDGET).unwrap();
    let first = instances.next().unwrap().unwrap();
    let second = instances.next().unwrap().unwrap();
    assert!(instances.next().is_none());
    assert_eq!(*first.downcast::<Foo>().unwrap(), Foo);
    assert_eq!(*second.downcast::<Bar>().unwrap(), Bar);
}

#[test]
fn singleton_instantiation_strategy_is_honored() {
    let dir = tempdir().unwrap();
    let module_a = touch(dir.path(), "a.plugin.so");
    let module_b = touch(dir.path(), "b.plugin.so");

    let backend = Arc::new(StaticBackend::new());
    backend.register(
        &module_a,
        vec![TypeDescriptor::concrete("widgets::Foo", [WIDGET], || {
            Box::new(Foo)
        })],
    );
    backend.register(
        &module_b,
        vec![TypeDescriptor::concrete("widgets::Bar", [WIDGET], || {
            Box::new(Bar)
        })],
    );

    let registry = registry_over(dir.path(), backend);
    unsafe { registry.discover_plugins() }.unwrap();

    let singleton: Arc<str> = Arc::from("the one and only");
    let shared = Arc::clone(&singleton);
    registry.set_instantiation_strategy(move |_| Ok(Box::new(Arc::clone(&shared))));

    let instances: Vec<_> = registry
        .load(WIDGET)
        .unwrap()
        .map(|r| r.unwrap().downcast::<Arc<str>>().unwrap())
        .collect();
    assert_eq!(instances.len(), 2);
    for instance in instances {
        assert!(Arc::ptr_eq(&instance, &singleton));
    }
}

#[test]
fn rediscovery_fully_replaces_the_index() {
    let dir = tempdir().unwrap();
    let module_a = touch(dir.path(), "a.plugin.so");
    let module_b = touch(dir.path(), "b.plugin.so");

    let backend = Arc::new(StaticBackend::new());
    backend.register(
        &module_a,
        vec![TypeDescriptor::concrete("widgets::Foo", [WIDGET], || {
            Box::new(Foo)
        })],
    );
    backend.register(
        &module_b,
        vec![TypeDescriptor::concrete("widgets::Bar", [WIDGET], || {
            Box::new(Bar)
        })],
    );

    let registry = registry_over(dir.path(), backend);
    unsafe { registry.discover_plugins() }.unwrap();
    assert_eq!(registry.find(WIDGET).unwrap().len(), 2);

    // The module is removed between the two passes.
    std::fs::remove_file(&module_b).unwrap();
    unsafe { registry.discover_plugins() }.unwrap();

    let found = registry.find(WIDGET).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].as_ref().unwrap().id(), "widgets::Foo");
}

#[test]
fn bad_module_is_reported_and_does_not_block_others() {
    let dir = tempdir().unwrap();
    let module_a = touch(dir.path(), "a.plugin.so");
    let broken = touch(dir.path(), "broken.plugin.so");
    let module_c = touch(dir.path(), "c.plugin.so");

    let backend = Arc::new(StaticBackend::new());
    backend.register(
        &module_a,
        vec![TypeDescriptor::concrete("widgets::Foo", [WIDGET], || {
            Box::new(Foo)
        })],
    );
    // broken.plugin.so has no registration, so its load fails.
    backend.register(
        &module_c,
        vec![TypeDescriptor::concrete("widgets::Bar", [WIDGET], || {
            Box::new(Bar)
        })],
    );

    let registry = registry_over(dir.path(), backend);
    let report = unsafe { registry.discover_plugins() }.unwrap();

    assert_eq!(report.modules_loaded, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].path, broken);
    assert_eq!(registry.find(WIDGET).unwrap().len(), 2);
}

#[test]
fn many_implementations_of_a_shared_marker_contract() {
    let dir = tempdir().unwrap();
    let backend = Arc::new(StaticBackend::new());

    let count = 64;
    for i in 0..count {
        let path = touch(dir.path(), &format!("mod{i:03}.plugin.so"));
        let id = format!("widgets::Impl{i:03}");
        backend.register(
            &path,
            vec![TypeDescriptor::concrete(
                &id,
                [WIDGET, DISPOSABLE],
                || Box::new(Foo),
            )],
        );
    }

    let registry = registry_over(dir.path(), backend);
    let report = unsafe { registry.discover_plugins() }.unwrap();
    assert!(report.is_clean());
    assert_eq!(report.modules_loaded, count);

    for contract in [WIDGET, DISPOSABLE] {
        let found = registry.find(contract).unwrap();
        assert_eq!(found.len(), count);
        // All resolvable, in discovery order.
        for (i, descriptor) in found.iter().enumerate() {
            assert_eq!(
                descriptor.as_ref().unwrap().id(),
                format!("widgets::Impl{i:03}")
            );
        }
    }
}

#[test]
fn queries_during_rediscovery_see_old_or_new_index() {
    let dir = tempdir().unwrap();
    let module_a = touch(dir.path(), "a.plugin.so");

    let backend = Arc::new(StaticBackend::new());
    backend.register(
        &module_a,
        vec![TypeDescriptor::concrete("widgets::Foo", [WIDGET], || {
            Box::new(Foo)
        })],
    );

    let registry = Arc::new(registry_over(dir.path(), Arc::clone(&backend)));
    unsafe { registry.discover_plugins() }.unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let reader = {
        let registry = Arc::clone(&registry);
        let stop = Arc::clone(&stop);
        std::thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                let found = registry.find(WIDGET).unwrap();
                // Either the one-module or the two-module index, never a
                // partially built one.
                assert!(found.len() == 1 || found.len() == 2);
                assert!(found.iter().all(Option::is_some));
            }
        })
    };

    let module_b = touch(dir.path(), "b.plugin.so");
    backend.register(
        &module_b,
        vec![TypeDescriptor::concrete("widgets::Bar", [WIDGET], || {
            Box::new(Bar)
        })],
    );
    for _ in 0..50 {
        unsafe { registry.discover_plugins() }.unwrap();
    }

    stop.store(true, Ordering::Relaxed);
    reader.join().unwrap();
    assert_eq!(registry.find(WIDGET).unwrap().len(), 2);
}
