//! # modbind
//!
//! Versioned module loading with isolated load contexts and traceable
//! resolution.
//!
//! This crate re-exports the two library crates of the workspace:
//!
//! - [`image`]: module identities and the image format
//! - [`binder`]: load contexts, version policy, discovery and tracing
//!
//! ## Usage
//!
//! ```rust
//! use modbind::{BinderHost, Identity, ModuleImage, Stage, Version};
//!
//! let host = BinderHost::default();
//! let context = host.default_context();
//!
//! let bytes = ModuleImage::builder("Dependency", Version::new(2, 5, 0, 0))
//!     .build()
//!     .to_bytes()
//!     .unwrap();
//! let loaded = context.load_from_bytes(bytes).unwrap();
//!
//! let request = Identity::parse("Dependency, Version=1.0").unwrap();
//! let found = context.load_from_name(&request).unwrap();
//! assert!(std::sync::Arc::ptr_eq(&loaded, &found));
//! assert_eq!(context.trace().last().unwrap().stage, Stage::AlreadyLoaded);
//! ```

pub use modbind_binder as binder;
pub use modbind_image as image;

pub use modbind_binder::{
    BindError, BindResult, BinderConfig, BinderHost, ContextId, ErrorKind, LoadContext,
    LoadRequest, ModuleProber, ModuleRecord, Origin, Requested, Resolver, ResolvingHandler,
    Stage, StandardProber, TraceEvent, TraceSnapshot,
};
pub use modbind_image::{
    ExportEntry, ExportKind, Identity, ImageError, ModuleImage, PublicKeyToken,
    QualifiedTypeName, Version, parse_identity,
};
