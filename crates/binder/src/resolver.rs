//! Request dispatch.
//!
//! The [`Resolver`] holds no state of its own: it finds the target context by
//! id and forwards the request, so every outcome is traced by that context.

use crate::context::LoadContext;
use crate::error::{BindError, BindResult};
use crate::host::BinderHost;
use crate::record::{ContextId, ModuleRecord};
use crate::trace::Requested;
use modbind_image::{ExportEntry, ExportKind, Identity, QualifiedTypeName};
use std::fmt;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// A load request, by identity or by origin.
pub enum LoadRequest {
    Name(Identity),
    Path(PathBuf),
    Bytes(Arc<[u8]>),
    Stream {
        reader: Box<dyn Read + Send>,
        description: String,
    },
}

impl LoadRequest {
    pub fn stream(reader: impl Read + Send + 'static, description: impl Into<String>) -> Self {
        LoadRequest::Stream {
            reader: Box::new(reader),
            description: description.into(),
        }
    }
}

impl fmt::Debug for LoadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadRequest::Name(identity) => f.debug_tuple("Name").field(identity).finish(),
            LoadRequest::Path(path) => f.debug_tuple("Path").field(path).finish(),
            LoadRequest::Bytes(bytes) => write!(f, "Bytes(<{} bytes>)", bytes.len()),
            LoadRequest::Stream { description, .. } => f
                .debug_struct("Stream")
                .field("description", description)
                .finish_non_exhaustive(),
        }
    }
}

pub struct Resolver<'h> {
    host: &'h BinderHost,
}

impl<'h> Resolver<'h> {
    pub fn new(host: &'h BinderHost) -> Self {
        Self { host }
    }

    /// Unknown or dropped context ids have no log to record into; they fail
    /// without a trace event.
    fn target(&self, id: ContextId) -> BindResult<Arc<LoadContext>> {
        self.host
            .context(id)
            .ok_or_else(|| BindError::InvalidRequest {
                reason: format!("unknown load context {}", id),
                context: id.to_string(),
            })
    }

    pub fn resolve(
        &self,
        context: ContextId,
        request: LoadRequest,
    ) -> BindResult<Arc<ModuleRecord>> {
        let context = self.target(context)?;
        match request {
            LoadRequest::Name(identity) => context.load_from_name(&identity),
            LoadRequest::Path(path) => context.load_from_path(&path),
            LoadRequest::Bytes(bytes) => context.load_from_bytes(bytes),
            LoadRequest::Stream {
                reader,
                description,
            } => context.load_from_stream(reader, description),
        }
    }

    /// Resolve an assembly-qualified type name such as
    /// `Ns.Widget, Dependency, Version=2.5` to its module and export entry.
    ///
    /// One trace event is recorded for the whole call, including a missing
    /// type export.
    pub fn resolve_type(
        &self,
        context: ContextId,
        qualified_name: &str,
    ) -> BindResult<(Arc<ModuleRecord>, ExportEntry)> {
        let context = self.target(context)?;
        let started = Instant::now();
        let requested = Requested::TypeName(qualified_name.to_string());

        let outcome = QualifiedTypeName::parse(qualified_name)
            .map_err(|e| BindError::InvalidRequest {
                reason: format!("invalid type name '{}': {}", qualified_name, e),
                context: context.name().to_string(),
            })
            .and_then(|qualified| {
                let resolved = context.name_load(&qualified.module)?;
                let entry = resolved
                    .record
                    .image()
                    .find_export(&qualified.type_name)
                    .filter(|entry| entry.kind == ExportKind::Type)
                    .cloned()
                    .ok_or_else(|| BindError::NotFound {
                        requested: qualified.to_string(),
                        context: context.name().to_string(),
                        note: Some(format!(
                            "'{}' does not export type '{}'",
                            resolved.record.identity(),
                            qualified.type_name
                        )),
                    })?;
                Ok((resolved, entry))
            });

        match outcome {
            Ok((resolved, entry)) => {
                let record = context.finish(requested, started, Ok(resolved))?;
                Ok((record, entry))
            }
            Err(err) => Err(context.reject(requested, started, err)),
        }
    }
}
