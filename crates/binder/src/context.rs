//! Load contexts.
//!
//! A [`LoadContext`] is an isolation boundary owning a set of module records.
//! Records are indexed twice: by lower-cased simple name (every record, in
//! load order) and by canonical path (records loaded from a file). Loads
//! serialize per path and per name through [`KeyedLocks`]; unrelated loads
//! run in parallel.
//!
//! Lock order is always path, then name. The resolving handler is called with
//! no lock held, so it may load into this or any other context.

use crate::config::BinderConfig;
use crate::error::{BindError, BindResult};
use crate::locks::KeyedLocks;
use crate::policy::{self, Lookup};
use crate::probe::ModuleProber;
use crate::record::{ContextId, ModuleRecord, Origin};
use crate::source;
use crate::trace::{Requested, Stage, TraceEmitter, TraceSnapshot};
use indexmap::IndexMap;
use modbind_image::{Identity, ModuleImage};
use parking_lot::RwLock;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

/// Name of the default context.
pub const DEFAULT_CONTEXT_NAME: &str = "Default";

/// User-supplied resolution for by-name requests a context cannot satisfy
/// from its own table.
///
/// The handler may load into `context` (or any other context) and return the
/// result. Returning `None` declines the request.
pub trait ResolvingHandler: Send + Sync {
    fn resolve(&self, context: &LoadContext, identity: &Identity) -> Option<Arc<ModuleRecord>>;
}

impl<F> ResolvingHandler for F
where
    F: Fn(&LoadContext, &Identity) -> Option<Arc<ModuleRecord>> + Send + Sync,
{
    fn resolve(&self, context: &LoadContext, identity: &Identity) -> Option<Arc<ModuleRecord>> {
        self(context, identity)
    }
}

/// A record and the stage that produced it.
pub(crate) struct Resolved {
    pub(crate) record: Arc<ModuleRecord>,
    pub(crate) stage: Stage,
}

impl Resolved {
    fn new(record: Arc<ModuleRecord>, stage: Stage) -> Self {
        Self { record, stage }
    }
}

type NameTable = IndexMap<String, SmallVec<[Arc<ModuleRecord>; 2]>>;

pub struct LoadContext {
    id: ContextId,
    name: Arc<str>,
    is_default: bool,
    config: Arc<BinderConfig>,
    ordinals: Arc<AtomicU64>,
    /// Where by-name requests go after this context and its handler miss
    parent: Option<Arc<LoadContext>>,
    /// Discovery for the default context
    prober: Option<Arc<dyn ModuleProber>>,
    self_ref: Weak<LoadContext>,

    records: RwLock<NameTable>,
    by_path: RwLock<HashMap<PathBuf, Arc<ModuleRecord>>>,
    path_locks: KeyedLocks<PathBuf>,
    name_locks: KeyedLocks<String>,

    handler: RwLock<Option<Arc<dyn ResolvingHandler>>>,
    trace: TraceEmitter,
}

impl LoadContext {
    pub(crate) fn new_default(
        config: Arc<BinderConfig>,
        ordinals: Arc<AtomicU64>,
        prober: Arc<dyn ModuleProber>,
    ) -> Arc<Self> {
        Self::build(
            ContextId::DEFAULT,
            Arc::from(DEFAULT_CONTEXT_NAME),
            config,
            ordinals,
            None,
            Some(prober),
        )
    }

    pub(crate) fn new_custom(
        id: ContextId,
        name: Arc<str>,
        config: Arc<BinderConfig>,
        ordinals: Arc<AtomicU64>,
        parent: Arc<LoadContext>,
    ) -> Arc<Self> {
        Self::build(id, name, config, ordinals, Some(parent), None)
    }

    fn build(
        id: ContextId,
        name: Arc<str>,
        config: Arc<BinderConfig>,
        ordinals: Arc<AtomicU64>,
        parent: Option<Arc<LoadContext>>,
        prober: Option<Arc<dyn ModuleProber>>,
    ) -> Arc<Self> {
        let trace = TraceEmitter::new(
            id,
            Arc::clone(&name),
            config.verbose_logging,
            config.trace_capacity_hint,
        );
        Arc::new_cyclic(|self_ref| Self {
            id,
            name,
            is_default: parent.is_none(),
            config,
            ordinals,
            parent,
            prober,
            self_ref: self_ref.clone(),
            records: RwLock::new(IndexMap::new()),
            by_path: RwLock::new(HashMap::new()),
            path_locks: KeyedLocks::new(),
            name_locks: KeyedLocks::new(),
            handler: RwLock::new(None),
            trace,
        })
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_default(&self) -> bool {
        self.is_default
    }

    pub fn parent(&self) -> Option<&Arc<LoadContext>> {
        self.parent.as_ref()
    }

    // =========================================================================
    // Resolving handler
    // =========================================================================

    pub fn set_resolving_handler(&self, handler: impl ResolvingHandler + 'static) {
        *self.handler.write() = Some(Arc::new(handler));
    }

    pub fn clear_resolving_handler(&self) {
        *self.handler.write() = None;
    }

    pub fn has_resolving_handler(&self) -> bool {
        self.handler.read().is_some()
    }

    // =========================================================================
    // Load operations
    // =========================================================================

    /// Load the module image at `path`, an absolute path.
    ///
    /// Loading the same file twice returns the same record. A different
    /// version of an already-loaded name is a `VersionConflict`.
    pub fn load_from_path(&self, path: impl AsRef<Path>) -> BindResult<Arc<ModuleRecord>> {
        let started = Instant::now();
        let path = path.as_ref();
        let outcome = self
            .check_path(path)
            .and_then(|()| self.path_load(path, None));
        self.finish(Requested::Path(path.to_path_buf()), started, outcome)
    }

    /// Resolve a module by identity: reuse, resolving handler, then the
    /// parent context (custom contexts) or discovery (the default context).
    pub fn load_from_name(&self, identity: &Identity) -> BindResult<Arc<ModuleRecord>> {
        let started = Instant::now();
        let outcome = if identity.name.trim().is_empty() {
            Err(self.invalid_request("empty module name"))
        } else {
            self.name_load(identity)
        };
        self.finish(Requested::Name(identity.clone()), started, outcome)
    }

    /// Load a module from an in-memory image. Always creates a new record.
    pub fn load_from_bytes(&self, bytes: impl Into<Arc<[u8]>>) -> BindResult<Arc<ModuleRecord>> {
        let started = Instant::now();
        let bytes = bytes.into();
        let requested = Requested::Bytes { len: bytes.len() };
        let outcome = self.bytes_load(&bytes, Origin::Bytes(Arc::clone(&bytes)));
        self.finish(requested, started, outcome)
    }

    /// Load a module by reading `reader` to completion. Always creates a new
    /// record.
    pub fn load_from_stream(
        &self,
        mut reader: impl Read,
        description: impl Into<String>,
    ) -> BindResult<Arc<ModuleRecord>> {
        let started = Instant::now();
        let description = description.into();
        let origin = Origin::Stream {
            description: description.clone(),
        };
        let outcome = source::read_stream(&mut reader)
            .map_err(|e| self.io_error(&origin, e))
            .and_then(|bytes| self.bytes_load(&bytes, origin));
        self.finish(Requested::Stream { description }, started, outcome)
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Every record visible in this context, in load order.
    pub fn modules(&self) -> Vec<Arc<ModuleRecord>> {
        let mut modules: Vec<_> = self
            .records
            .read()
            .values()
            .flat_map(|records| records.iter().cloned())
            .collect();
        modules.sort_by_key(|r| r.load_ordinal());
        modules
    }

    /// Records loaded under `name` (case-insensitive), in load order.
    pub fn find_loaded(&self, name: &str) -> Vec<Arc<ModuleRecord>> {
        self.records
            .read()
            .get(&name.to_ascii_lowercase())
            .map(|records| records.to_vec())
            .unwrap_or_default()
    }

    pub fn trace(&self) -> TraceSnapshot {
        self.trace.snapshot()
    }

    pub fn trace_len(&self) -> usize {
        self.trace.len()
    }

    // =========================================================================
    // Tracing
    // =========================================================================

    /// Append the trace event for a finished public call.
    pub(crate) fn finish(
        &self,
        requested: Requested,
        started: Instant,
        outcome: BindResult<Resolved>,
    ) -> BindResult<Arc<ModuleRecord>> {
        let elapsed = started.elapsed();
        match outcome {
            Ok(Resolved { record, stage }) => {
                self.trace.success(requested, stage, &record, elapsed);
                Ok(record)
            }
            Err(err) => {
                self.trace.failure(requested, &err, elapsed);
                Err(err)
            }
        }
    }

    /// Trace a failed call whose outcome is not a load result.
    pub(crate) fn reject(
        &self,
        requested: Requested,
        started: Instant,
        err: BindError,
    ) -> BindError {
        self.trace.failure(requested, &err, started.elapsed());
        err
    }

    // =========================================================================
    // Untraced loads
    // =========================================================================

    fn check_path(&self, path: &Path) -> BindResult<()> {
        if path.as_os_str().is_empty() {
            return Err(self.invalid_request("empty path"));
        }
        if !path.is_absolute() {
            return Err(self.invalid_request(format!(
                "path '{}' is not absolute",
                path.display()
            )));
        }
        Ok(())
    }

    /// Load by path. When `expect` is given the image must satisfy it, which
    /// is how discovered candidates are checked.
    fn path_load(&self, path: &Path, expect: Option<&Identity>) -> BindResult<Resolved> {
        let canonical = fs::canonicalize(path)
            .map_err(|e| self.io_error(&Origin::Path(path.to_path_buf()), e))?;

        let cached = self.by_path.read().get(&canonical).cloned();
        if let Some(record) = cached {
            return self.check_expected(expect, Resolved::new(record, Stage::AlreadyLoaded));
        }

        self.path_locks.with_lock(&canonical, || {
            // Another thread may have finished this load while we waited.
            let cached = self.by_path.read().get(&canonical).cloned();
            if let Some(record) = cached {
                return self.check_expected(expect, Resolved::new(record, Stage::AlreadyLoaded));
            }

            let origin = Origin::Path(canonical.clone());
            let bytes = source::read_path(&canonical, self.config.use_memory_mapping)
                .map_err(|e| self.io_error(&origin, e))?;
            let image = self.parse_image(&bytes, &origin)?;
            drop(bytes);

            if let Some(expect) = expect {
                if !policy::satisfies(expect, &image.identity) {
                    return Err(self.not_found(
                        expect,
                        Some(format!(
                            "{} holds '{}'",
                            origin.describe(),
                            image.identity
                        )),
                    ));
                }
            }

            let record = self.register_explicit(image, origin)?;
            self.by_path
                .write()
                .insert(canonical.clone(), Arc::clone(&record));
            Ok(Resolved::new(record, Stage::FreshLoad))
        })
    }

    fn bytes_load(&self, bytes: &[u8], origin: Origin) -> BindResult<Resolved> {
        let image = self.parse_image(bytes, &origin)?;
        let record = self.register_explicit(image, origin)?;
        Ok(Resolved::new(record, Stage::FreshLoad))
    }

    pub(crate) fn name_load(&self, identity: &Identity) -> BindResult<Resolved> {
        let incompatible = match self.lookup(identity) {
            Lookup::Hit(record) => return Ok(Resolved::new(record, Stage::AlreadyLoaded)),
            Lookup::Incompatible(record) => Some(record),
            Lookup::Absent => None,
        };

        if let Some(record) = self.invoke_handler(identity)? {
            return Ok(Resolved::new(record, Stage::CustomResolve));
        }

        if let Some(loaded) = incompatible {
            return Err(self.not_found(
                identity,
                Some(format!("'{}' is already loaded", loaded.identity())),
            ));
        }

        match &self.parent {
            Some(parent) => parent.name_load(identity).map_err(|err| match err {
                BindError::NotFound { note, .. } => self.not_found(
                    identity,
                    Some(match note {
                        Some(note) => format!("not in '{}' either: {}", parent.name(), note),
                        None => format!("not in '{}' either", parent.name()),
                    }),
                ),
                other => other,
            }),
            None => self.discover(identity),
        }
    }

    fn discover(&self, identity: &Identity) -> BindResult<Resolved> {
        let candidate = self
            .prober
            .as_ref()
            .and_then(|prober| prober.probe(identity))
            .ok_or_else(|| {
                self.not_found(
                    identity,
                    Some("no trusted module or probing path matched".to_string()),
                )
            })?;

        let candidate = std::path::absolute(&candidate)
            .map_err(|e| self.io_error(&Origin::Path(candidate.clone()), e))?;
        if self.config.verbose_logging {
            eprintln!(
                "[modbind] {}: probing '{}' for '{}'",
                self.name,
                candidate.display(),
                identity
            );
        }
        self.path_load(&candidate, Some(identity))
    }

    fn invoke_handler(&self, identity: &Identity) -> BindResult<Option<Arc<ModuleRecord>>> {
        // Cloned out so the handler runs without any of our locks held.
        let handler = self.handler.read().clone();
        let Some(handler) = handler else {
            return Ok(None);
        };
        let Some(record) = handler.resolve(self, identity) else {
            return Ok(None);
        };

        if !policy::satisfies(identity, record.identity()) {
            return Err(self.invalid_request(format!(
                "resolving handler returned '{}' for '{}'",
                record.identity(),
                identity
            )));
        }
        self.adopt(&record);
        Ok(Some(record))
    }

    // =========================================================================
    // Record table
    // =========================================================================

    fn lookup(&self, identity: &Identity) -> Lookup {
        match self.records.read().get(&identity.name_key()) {
            Some(records) => policy::lookup(records, identity),
            None => Lookup::Absent,
        }
    }

    /// Create and register a record for an explicitly loaded image.
    fn register_explicit(
        &self,
        image: ModuleImage,
        origin: Origin,
    ) -> BindResult<Arc<ModuleRecord>> {
        let key = image.identity.name_key();
        self.name_locks.with_lock(&key, || {
            let conflict = self
                .records
                .read()
                .get(&key)
                .and_then(|records| policy::find_conflict(records, &image.identity).cloned());
            if let Some(loaded) = conflict {
                return Err(BindError::VersionConflict {
                    requested: image.identity.clone(),
                    loaded: loaded.identity().clone(),
                    context: self.name.to_string(),
                });
            }

            let record = Arc::new(ModuleRecord::new(
                image,
                origin,
                self.self_ref.clone(),
                self.id,
                Arc::clone(&self.name),
                self.ordinals.fetch_add(1, Ordering::Relaxed),
            ));
            self.records
                .write()
                .entry(key.clone())
                .or_default()
                .push(Arc::clone(&record));
            Ok(record)
        })
    }

    /// Make a handler-supplied record visible here without changing its owner.
    fn adopt(&self, record: &Arc<ModuleRecord>) {
        let key = record.identity().name_key();
        self.name_locks.with_lock(&key, || {
            let mut records = self.records.write();
            let entry = records.entry(key.clone()).or_default();
            if !entry.iter().any(|r| Arc::ptr_eq(r, record)) {
                entry.push(Arc::clone(record));
            }
        });
    }

    // =========================================================================
    // Errors
    // =========================================================================

    fn parse_image(&self, bytes: &[u8], origin: &Origin) -> BindResult<ModuleImage> {
        ModuleImage::parse(bytes).map_err(|source| BindError::Malformed {
            origin: origin.describe(),
            context: self.name.to_string(),
            source,
        })
    }

    fn io_error(&self, origin: &Origin, source: io::Error) -> BindError {
        if source.kind() == io::ErrorKind::NotFound {
            return BindError::NotFound {
                requested: match origin {
                    Origin::Path(path) => path.display().to_string(),
                    other => other.describe(),
                },
                context: self.name.to_string(),
                note: Some("no such file".to_string()),
            };
        }
        BindError::Io {
            origin: origin.describe(),
            context: self.name.to_string(),
            source,
        }
    }

    fn not_found(&self, identity: &Identity, note: Option<String>) -> BindError {
        BindError::NotFound {
            requested: identity.to_string(),
            context: self.name.to_string(),
            note,
        }
    }

    fn invalid_request(&self, reason: impl Into<String>) -> BindError {
        BindError::InvalidRequest {
            reason: reason.into(),
            context: self.name.to_string(),
        }
    }

    fn check_expected(
        &self,
        expect: Option<&Identity>,
        resolved: Resolved,
    ) -> BindResult<Resolved> {
        match expect {
            Some(expect) if !policy::satisfies(expect, resolved.record.identity()) => {
                Err(self.not_found(
                    expect,
                    Some(format!("'{}' is loaded from that file", resolved.record.identity())),
                ))
            }
            _ => Ok(resolved),
        }
    }
}

impl fmt::Debug for LoadContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadContext")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("is_default", &self.is_default)
            .field("modules", &self.records.read().len())
            .finish()
    }
}
