//! # modbind binder
//!
//! Versioned module loading into isolated load contexts.
//!
//! ## Architecture
//!
//! 1. **Host**: [`BinderHost`] owns the default context and the custom
//!    context registry, created once from a [`BinderConfig`]
//! 2. **Contexts**: [`LoadContext`] loads by path, name, bytes or stream,
//!    deduplicates and enforces the version policy
//! 3. **Policy**: explicit loads must match loaded versions exactly; by-name
//!    requests reuse any loaded version greater than or equal to the request
//! 4. **Discovery**: the default context finds unloaded modules through a
//!    [`ModuleProber`] (trusted list, then probing paths)
//! 5. **Tracing**: every load call appends one [`TraceEvent`]
//!
//! ## Usage
//!
//! ```rust,ignore
//! use modbind_binder::{BinderConfig, BinderHost};
//! use modbind_image::Identity;
//!
//! let host = BinderHost::new(BinderConfig::from_env());
//! let record = host.default_context().load_from_path("/app/Dependency.modimg")?;
//! let same = host.default_context().load_from_name(&Identity::parse("Dependency, Version=1.0")?)?;
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod host;
mod locks;
pub mod policy;
pub mod probe;
pub mod record;
pub mod resolver;
mod source;
pub mod trace;

pub use config::BinderConfig;
pub use context::{DEFAULT_CONTEXT_NAME, LoadContext, ResolvingHandler};
pub use error::{BindError, BindResult, ErrorKind};
pub use host::BinderHost;
pub use probe::{ModuleProber, StandardProber};
pub use record::{ContextId, ModuleRecord, Origin};
pub use resolver::{LoadRequest, Resolver};
pub use trace::{Requested, Stage, TraceEvent, TraceSnapshot};
