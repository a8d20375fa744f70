//! Binder error types

use modbind_image::{Identity, ImageError};
use std::fmt;
use thiserror::Error;

/// The classification of a failed resolution, recorded in trace events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No matching module could be located or resolved.
    NotFound,
    /// An explicit load contradicts an already-loaded module of another version.
    VersionConflict,
    /// The module bytes are not a valid image.
    Malformed,
    /// The request itself is unusable (empty name, relative path, unknown context).
    InvalidRequest,
    /// Reading the underlying byte source failed.
    IoFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NotFound",
            ErrorKind::VersionConflict => "VersionConflict",
            ErrorKind::Malformed => "Malformed",
            ErrorKind::InvalidRequest => "InvalidRequest",
            ErrorKind::IoFailure => "IOFailure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum BindError {
    #[error(
        "NotFound: could not resolve '{requested}' in load context '{context}'{}",
        note_suffix(.note)
    )]
    NotFound {
        requested: String,
        context: String,
        note: Option<String>,
    },

    #[error(
        "VersionConflict: could not load '{requested}' into load context '{context}': \
         '{loaded}' is already loaded"
    )]
    VersionConflict {
        requested: Identity,
        loaded: Identity,
        context: String,
    },

    #[error("Malformed: {origin} is not a valid module image (load context '{context}'): {source}")]
    Malformed {
        origin: String,
        context: String,
        #[source]
        source: ImageError,
    },

    #[error("InvalidRequest: {reason} (load context '{context}')")]
    InvalidRequest { reason: String, context: String },

    #[error("IOFailure: could not read {origin} for load context '{context}': {source}")]
    Io {
        origin: String,
        context: String,
        #[source]
        source: std::io::Error,
    },
}

fn note_suffix(note: &Option<String>) -> String {
    note.as_ref().map(|n| format!(" ({})", n)).unwrap_or_default()
}

pub type BindResult<T> = Result<T, BindError>;

impl BindError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BindError::NotFound { .. } => ErrorKind::NotFound,
            BindError::VersionConflict { .. } => ErrorKind::VersionConflict,
            BindError::Malformed { .. } => ErrorKind::Malformed,
            BindError::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            BindError::Io { .. } => ErrorKind::IoFailure,
        }
    }

    /// Name of the load context the failure happened in.
    pub fn context(&self) -> &str {
        match self {
            BindError::NotFound { context, .. }
            | BindError::VersionConflict { context, .. }
            | BindError::Malformed { context, .. }
            | BindError::InvalidRequest { context, .. }
            | BindError::Io { context, .. } => context,
        }
    }

    /// The identity parsed from the rejected module, when the failure happened
    /// after its header was read.
    pub fn requested_identity(&self) -> Option<&Identity> {
        match self {
            BindError::VersionConflict { requested, .. } => Some(requested),
            _ => None,
        }
    }
}
