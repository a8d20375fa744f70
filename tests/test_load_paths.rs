//! Load Path Tests
//!
//! Every way a module reaches a context:
//! - Discovery through the trusted module list and probing paths
//! - In-memory buffers and streams
//! - The resolver facade, including type resolution

mod common;

use common::{image, image_bytes, write_image};
use modbind::{
    BinderConfig, BinderHost, ContextId, ErrorKind, ExportKind, Identity, LoadRequest, Origin,
    Requested, Stage, parse_identity,
};
use std::io::{self, Cursor, Read};
use std::sync::Arc;
use tempfile::TempDir;

// ===== Discovery =====

#[test]
fn test_name_discovered_through_trusted_list() {
    let dir = TempDir::new().unwrap();
    let path = write_image(dir.path(), "Core.modimg", "Core", "4.0");
    let host = BinderHost::new(BinderConfig::default().with_trusted_module(&path));
    let context = host.default_context();

    let record = context.load_from_name(&Identity::new("core")).unwrap();
    assert_eq!(record.identity().name, "Core");
    assert_eq!(context.trace().last().unwrap().stage, Stage::FreshLoad);

    // A later explicit load of the same file reuses the record.
    let again = context.load_from_path(&path).unwrap();
    assert!(Arc::ptr_eq(&record, &again));
}

#[test]
fn test_name_discovered_through_probing_path() {
    let dir = TempDir::new().unwrap();
    write_image(dir.path(), "Plugin.modimg", "Plugin", "1.2");
    let host = BinderHost::new(BinderConfig::default().with_probing_path(dir.path()));
    let context = host.default_context();

    let record = context
        .load_from_name(&Identity::parse("Plugin, Version=1.0").unwrap())
        .unwrap();
    assert!(matches!(record.origin(), Origin::Path(_)));

    let second = context.load_from_name(&Identity::new("Plugin")).unwrap();
    assert!(Arc::ptr_eq(&record, &second));
    assert_eq!(context.trace().count(Stage::FreshLoad), 1);
    assert_eq!(context.trace().count(Stage::AlreadyLoaded), 1);
}

#[test]
fn test_discovered_image_with_lower_version_is_not_found() {
    let dir = TempDir::new().unwrap();
    write_image(dir.path(), "Plugin.modimg", "Plugin", "1.2");
    let host = BinderHost::new(BinderConfig::default().with_probing_path(dir.path()));

    let err = host
        .default_context()
        .load_from_name(&Identity::parse("Plugin, Version=2.0").unwrap())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(host.default_context().modules().is_empty());
}

#[test]
fn test_unknown_name_is_not_found() {
    let host = BinderHost::default();
    let err = host
        .default_context()
        .load_from_name(&Identity::new("Nowhere"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.to_string().contains("Nowhere"));
    assert!(err.to_string().contains("Default"));
}

// ===== Buffers and streams =====

struct BrokenPipe;

impl Read for BrokenPipe {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "writer went away"))
    }
}

#[test]
fn test_bytes_round_trip_by_name() {
    let host = BinderHost::default();
    let context = host.default_context();
    let bytes = image_bytes("Dependency", "2.5");
    let identity = parse_identity(&bytes).unwrap();

    let loaded = context.load_from_bytes(bytes).unwrap();
    let found = context.load_from_name(&identity).unwrap();
    assert!(Arc::ptr_eq(&loaded, &found));
}

#[test]
fn test_stream_read_failure_is_io_failure() {
    let host = BinderHost::default();
    let context = host.default_context();

    let err = context.load_from_stream(BrokenPipe, "pipe").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IoFailure);
    assert!(err.to_string().starts_with("IOFailure"));

    let event = context.trace().last().cloned().unwrap();
    assert_eq!(event.error, Some(ErrorKind::IoFailure));
}

#[test]
fn test_stream_and_bytes_are_never_deduplicated() {
    let host = BinderHost::default();
    let context = host.default_context();
    let bytes = image_bytes("Dependency", "2.5");

    let a = context.load_from_bytes(bytes.clone()).unwrap();
    let b = context.load_from_stream(Cursor::new(bytes), "copy").unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(context.find_loaded("Dependency").len(), 2);
}

#[test]
fn test_modules_in_load_order() {
    let host = BinderHost::default();
    let context = host.default_context();
    for name in ["Zeta", "Alpha", "Mid"] {
        context.load_from_bytes(image_bytes(name, "1.0")).unwrap();
    }
    let names: Vec<String> = context
        .modules()
        .iter()
        .map(|r| r.identity().name.clone())
        .collect();
    assert_eq!(names, vec!["Zeta", "Alpha", "Mid"]);
}

// ===== Resolver =====

#[test]
fn test_resolver_dispatches_every_request_kind() {
    let dir = TempDir::new().unwrap();
    let path = write_image(dir.path(), "A.modimg", "A", "1.0");
    let host = BinderHost::default();
    let resolver = host.resolver();

    resolver
        .resolve(ContextId::DEFAULT, LoadRequest::Path(path))
        .unwrap();
    resolver
        .resolve(ContextId::DEFAULT, LoadRequest::Bytes(Arc::from(image_bytes("B", "1.0"))))
        .unwrap();
    resolver
        .resolve(
            ContextId::DEFAULT,
            LoadRequest::stream(Cursor::new(image_bytes("C", "1.0")), "c"),
        )
        .unwrap();
    resolver
        .resolve(ContextId::DEFAULT, LoadRequest::Name(Identity::new("b")))
        .unwrap();

    assert_eq!(host.default_context().trace().len(), 4);
    assert_eq!(host.default_context().modules().len(), 3);
}

#[test]
fn test_resolve_type_through_discovery() {
    let dir = TempDir::new().unwrap();
    write_image(dir.path(), "Dependency.modimg", "Dependency", "2.5");
    let host = BinderHost::new(BinderConfig::default().with_probing_path(dir.path()));

    let (record, export) = host
        .resolver()
        .resolve_type(ContextId::DEFAULT, "Dependency.Widget, Dependency, Version=2.0")
        .unwrap();
    assert_eq!(record.identity().name, "Dependency");
    assert_eq!(export.kind, ExportKind::Type);
    assert_eq!(
        Some(&export),
        image("Dependency", "2.5").find_export("Dependency.Widget")
    );

    let trace = host.default_context().trace();
    assert_eq!(trace.len(), 1);
    assert_eq!(trace.get(0).unwrap().stage, Stage::FreshLoad);
}

#[test]
fn test_resolve_missing_type() {
    let host = BinderHost::default();
    host.default_context()
        .load_from_bytes(image_bytes("Dependency", "2.5"))
        .unwrap();

    let err = host
        .resolver()
        .resolve_type(ContextId::DEFAULT, "Dependency.Gadget, Dependency")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.to_string().contains("Dependency.Gadget"));

    let trace = host.default_context().trace();
    assert_eq!(trace.len(), 2);
    let last = trace.last().unwrap();
    assert_eq!(last.stage, Stage::Failed);
    assert_eq!(last.error, Some(ErrorKind::NotFound));
    assert!(matches!(&last.requested, Requested::TypeName(name) if name.contains("Gadget")));
}
