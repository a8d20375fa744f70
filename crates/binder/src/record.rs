//! Loaded module records

use crate::context::LoadContext;
use modbind_image::{Identity, ModuleImage};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Weak};

/// Identifies a load context within its host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub(crate) u32);

impl ContextId {
    /// The id of the default context.
    pub const DEFAULT: ContextId = ContextId(0);

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx{}", self.0)
    }
}

/// Where a record's bytes came from.
#[derive(Debug, Clone)]
pub enum Origin {
    Path(PathBuf),
    Bytes(Arc<[u8]>),
    Stream { description: String },
}

impl Origin {
    /// Human-readable description for diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Origin::Path(path) => format!("'{}'", path.display()),
            Origin::Bytes(bytes) => format!("<{} bytes in memory>", bytes.len()),
            Origin::Stream { description } => format!("stream '{}'", description),
        }
    }

    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Origin::Path(path) => Some(path),
            _ => None,
        }
    }
}

/// One loaded module.
///
/// Records are immutable once created and are shared by reference: two loads
/// that resolve to the same module hand out the same `Arc<ModuleRecord>`.
#[derive(Debug)]
pub struct ModuleRecord {
    image: ModuleImage,
    origin: Origin,
    owner: Weak<LoadContext>,
    owner_id: ContextId,
    owner_name: Arc<str>,
    load_ordinal: u64,
}

impl ModuleRecord {
    pub(crate) fn new(
        image: ModuleImage,
        origin: Origin,
        owner: Weak<LoadContext>,
        owner_id: ContextId,
        owner_name: Arc<str>,
        load_ordinal: u64,
    ) -> Self {
        Self {
            image,
            origin,
            owner,
            owner_id,
            owner_name,
            load_ordinal,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.image.identity
    }

    pub fn image(&self) -> &ModuleImage {
        &self.image
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// The owning context, if it is still alive.
    pub fn owner(&self) -> Option<Arc<LoadContext>> {
        self.owner.upgrade()
    }

    pub fn owner_id(&self) -> ContextId {
        self.owner_id
    }

    pub fn owner_name(&self) -> &str {
        &self.owner_name
    }

    /// Position of this load in the host-wide load order.
    pub fn load_ordinal(&self) -> u64 {
        self.load_ordinal
    }
}

impl fmt::Display for ModuleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} from {} in '{}' (#{})",
            self.identity(),
            self.origin.describe(),
            self.owner_name,
            self.load_ordinal
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modbind_image::Version;

    fn record(origin: Origin) -> ModuleRecord {
        let image = ModuleImage::builder("Dependency", Version::new(2, 5, 0, 0)).build();
        ModuleRecord::new(image, origin, Weak::new(), ContextId(3), Arc::from("plugins"), 7)
    }

    #[test]
    fn test_record_accessors() {
        let record = record(Origin::Path(PathBuf::from("/opt/app/Dependency.modimg")));
        assert_eq!(record.identity().name, "Dependency");
        assert_eq!(record.owner_id(), ContextId(3));
        assert_eq!(record.owner_name(), "plugins");
        assert_eq!(record.load_ordinal(), 7);
        assert!(record.owner().is_none());
        assert!(record.origin().path().is_some());
    }

    #[test]
    fn test_origin_describe() {
        let bytes: Arc<[u8]> = Arc::from(vec![0u8; 12]);
        assert_eq!(Origin::Bytes(bytes).describe(), "<12 bytes in memory>");
        assert_eq!(
            Origin::Stream {
                description: "upload".to_string()
            }
            .describe(),
            "stream 'upload'"
        );
    }

    #[test]
    fn test_record_display() {
        let record = record(Origin::Stream {
            description: "net".to_string(),
        });
        assert_eq!(
            record.to_string(),
            "Dependency, Version=2.5.0.0 from stream 'net' in 'plugins' (#7)"
        );
    }

    #[test]
    fn test_default_context_id() {
        assert_eq!(ContextId::DEFAULT.as_u32(), 0);
        assert_eq!(ContextId(4).to_string(), "ctx4");
    }
}
