//! Resolution trace events.
//!
//! Every public load operation on a [`LoadContext`](crate::LoadContext)
//! appends exactly one [`TraceEvent`], successful or not. The log is
//! append-only and unbounded; readers take a [`TraceSnapshot`] and iterate it
//! while writers keep appending.

use crate::error::{BindError, ErrorKind};
use crate::record::{ContextId, ModuleRecord};
use modbind_image::Identity;
use parking_lot::RwLock;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// How a resolution was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// An existing record was reused.
    AlreadyLoaded,
    /// The context's resolving handler supplied the record.
    CustomResolve,
    /// The module was read and a new record created.
    FreshLoad,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::AlreadyLoaded => "AlreadyLoaded",
            Stage::CustomResolve => "CustomResolve",
            Stage::FreshLoad => "FreshLoad",
            Stage::Failed => "Failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The input of a traced call, as the caller gave it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requested {
    Name(Identity),
    Path(PathBuf),
    Bytes { len: usize },
    Stream { description: String },
    TypeName(String),
}

impl fmt::Display for Requested {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requested::Name(identity) => write!(f, "name '{}'", identity),
            Requested::Path(path) => write!(f, "path '{}'", path.display()),
            Requested::Bytes { len } => write!(f, "bytes <{} bytes>", len),
            Requested::Stream { description } => write!(f, "stream '{}'", description),
            Requested::TypeName(name) => write!(f, "type '{}'", name),
        }
    }
}

/// One resolution decision.
#[derive(Debug, Clone)]
pub struct TraceEvent {
    /// Position in the owning context's log, starting at 0
    pub sequence: u64,
    pub context: ContextId,
    pub context_name: Arc<str>,
    pub requested: Requested,
    pub stage: Stage,
    /// Identity of the module involved, when one was read or chosen
    pub identity: Option<Identity>,
    pub result: Option<Arc<ModuleRecord>>,
    pub error: Option<ErrorKind>,
    pub message: Option<String>,
    pub elapsed: Duration,
}

impl TraceEvent {
    /// The requested identity for by-name calls.
    pub fn requested_identity(&self) -> Option<&Identity> {
        match &self.requested {
            Requested::Name(identity) => Some(identity),
            _ => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.stage == Stage::Failed
    }
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{} {} {} -> ",
            self.context_name, self.sequence, self.stage, self.requested
        )?;
        match (&self.result, &self.message) {
            (Some(record), _) => write!(f, "{}", record)?,
            (None, Some(message)) => f.write_str(message)?,
            (None, None) => f.write_str("<none>")?,
        }
        write!(f, " ({:?})", self.elapsed)
    }
}

/// Append-only event log of one load context.
pub(crate) struct TraceEmitter {
    context: ContextId,
    context_name: Arc<str>,
    verbose_logging: bool,
    events: RwLock<Vec<Arc<TraceEvent>>>,
}

impl TraceEmitter {
    pub(crate) fn new(
        context: ContextId,
        context_name: Arc<str>,
        verbose_logging: bool,
        capacity: usize,
    ) -> Self {
        Self {
            context,
            context_name,
            verbose_logging,
            events: RwLock::new(Vec::with_capacity(capacity)),
        }
    }

    pub(crate) fn success(
        &self,
        requested: Requested,
        stage: Stage,
        record: &Arc<ModuleRecord>,
        elapsed: Duration,
    ) -> Arc<TraceEvent> {
        self.emit(TraceEvent {
            sequence: 0,
            context: self.context,
            context_name: Arc::clone(&self.context_name),
            requested,
            stage,
            identity: Some(record.identity().clone()),
            result: Some(Arc::clone(record)),
            error: None,
            message: None,
            elapsed,
        })
    }

    pub(crate) fn failure(
        &self,
        requested: Requested,
        error: &BindError,
        elapsed: Duration,
    ) -> Arc<TraceEvent> {
        let identity = match (&requested, error.requested_identity()) {
            (_, Some(parsed)) => Some(parsed.clone()),
            (Requested::Name(identity), None) => Some(identity.clone()),
            _ => None,
        };
        self.emit(TraceEvent {
            sequence: 0,
            context: self.context,
            context_name: Arc::clone(&self.context_name),
            requested,
            stage: Stage::Failed,
            identity,
            result: None,
            error: Some(error.kind()),
            message: Some(error.to_string()),
            elapsed,
        })
    }

    fn emit(&self, mut event: TraceEvent) -> Arc<TraceEvent> {
        let event = {
            let mut events = self.events.write();
            event.sequence = events.len() as u64;
            let event = Arc::new(event);
            events.push(Arc::clone(&event));
            event
        };

        if self.verbose_logging {
            eprintln!("[modbind] {}", event);
        }
        event
    }

    pub(crate) fn snapshot(&self) -> TraceSnapshot {
        TraceSnapshot {
            events: self.events.read().clone(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.events.read().len()
    }
}

/// A point-in-time copy of a context's trace log.
///
/// Events appended after the snapshot was taken are not visible; take a new
/// snapshot to see them.
#[derive(Debug, Clone, Default)]
pub struct TraceSnapshot {
    events: Vec<Arc<TraceEvent>>,
}

impl TraceSnapshot {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<TraceEvent>> {
        self.events.iter()
    }

    pub fn last(&self) -> Option<&Arc<TraceEvent>> {
        self.events.last()
    }

    pub fn get(&self, sequence: u64) -> Option<&Arc<TraceEvent>> {
        usize::try_from(sequence).ok().and_then(|i| self.events.get(i))
    }

    /// Events with a sequence number at or after `sequence`.
    pub fn since(&self, sequence: u64) -> &[Arc<TraceEvent>] {
        let start = usize::try_from(sequence)
            .unwrap_or(usize::MAX)
            .min(self.events.len());
        &self.events[start..]
    }

    pub fn count(&self, stage: Stage) -> usize {
        self.events.iter().filter(|e| e.stage == stage).count()
    }
}

impl IntoIterator for TraceSnapshot {
    type Item = Arc<TraceEvent>;
    type IntoIter = std::vec::IntoIter<Arc<TraceEvent>>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

impl<'a> IntoIterator for &'a TraceSnapshot {
    type Item = &'a Arc<TraceEvent>;
    type IntoIter = std::slice::Iter<'a, Arc<TraceEvent>>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}
