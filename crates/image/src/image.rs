//! Module image layout and codec
//!
//! An image is laid out as:
//!
//! ```text
//! +--------+---------+------------+-----------------+------------------+
//! | "MODI" | format  | header len | header (bincode)| body (bincode)   |
//! | 4 bytes| u16 LE  | u32 LE     | Identity        | exports, refs,   |
//! |        |         |            |                 | payload          |
//! +--------+---------+------------+-----------------+------------------+
//! ```
//!
//! The header holds only the module identity so that a loader can learn what
//! it is about to load without decoding the rest of the image.

use crate::error::{ImageError, ImageResult};
use crate::identity::{Identity, PublicKeyToken, Version};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Magic bytes opening every module image.
pub const IMAGE_MAGIC: [u8; 4] = *b"MODI";
/// Current image format version.
pub const IMAGE_FORMAT_VERSION: u16 = 1;
/// File extension used when probing directories for images.
pub const IMAGE_EXTENSION: &str = "modimg";

/// Largest image accepted by the decoder.
pub const MAX_IMAGE_LEN: usize = 64 * 1024 * 1024;
/// Largest identity header accepted by the decoder.
pub const MAX_HEADER_LEN: usize = 64 * 1024;

const PREAMBLE_LEN: usize = 4 + 2 + 4;

// Length prefixes inside the bincode sections are untrusted; the limits keep
// the decoder from allocating past them.
fn header_config() -> impl bincode::config::Config {
    bincode::config::standard().with_limit::<MAX_HEADER_LEN>()
}

fn body_config() -> impl bincode::config::Config {
    bincode::config::standard().with_limit::<MAX_IMAGE_LEN>()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleImage {
    pub identity: Identity,
    pub exports: ExportTable,
    pub references: Vec<Identity>,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportTable {
    pub entries: IndexMap<String, ExportEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportEntry {
    pub name: String,
    pub kind: ExportKind,
    pub token: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExportKind {
    Type,
    Function,
    Global,
}

impl ExportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportKind::Type => "type",
            ExportKind::Function => "function",
            ExportKind::Global => "global",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "type" => Some(ExportKind::Type),
            "function" | "fn" => Some(ExportKind::Function),
            "global" => Some(ExportKind::Global),
            _ => None,
        }
    }
}

impl ExportTable {
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, name: &str) -> Option<&ExportEntry> {
        self.entries.get(name)
    }
}

impl ModuleImage {
    pub fn builder(name: impl Into<String>, version: Version) -> ModuleImageBuilder {
        ModuleImageBuilder::new(Identity::new(name).with_version(version))
    }

    /// Decode a complete image.
    pub fn parse(bytes: &[u8]) -> ImageResult<Self> {
        let (header, body) = split_sections(bytes)?;
        let identity = decode_identity(header)?;
        let ((exports, references, payload), _) = bincode::serde::decode_from_slice::<
            (ExportTable, Vec<Identity>, Vec<u8>),
            _,
        >(body, body_config())?;

        Ok(Self {
            identity,
            exports,
            references,
            payload,
        })
    }

    pub fn read_from(path: &Path) -> ImageResult<Self> {
        let bytes = fs::read(path)?;
        Self::parse(&bytes)
    }

    pub fn to_bytes(&self) -> ImageResult<Vec<u8>> {
        let config = bincode::config::standard();
        let identity = validate_identity(self.identity.clone())?;
        let header = bincode::serde::encode_to_vec(&identity, config)?;
        let body = bincode::serde::encode_to_vec(
            (&self.exports, &self.references, &self.payload),
            config,
        )?;

        let mut out = Vec::with_capacity(PREAMBLE_LEN + header.len() + body.len());
        out.extend_from_slice(&IMAGE_MAGIC);
        out.extend_from_slice(&IMAGE_FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&(header.len() as u32).to_le_bytes());
        out.extend_from_slice(&header);
        out.extend_from_slice(&body);
        if header.len() > MAX_HEADER_LEN || out.len() > MAX_IMAGE_LEN {
            return Err(ImageError::TooLarge {
                len: out.len(),
                limit: MAX_IMAGE_LEN,
            });
        }
        Ok(out)
    }

    pub fn write_to(&self, path: &Path) -> ImageResult<()> {
        fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    pub fn find_export(&self, name: &str) -> Option<&ExportEntry> {
        self.exports.get(name)
    }

    pub fn exports_of_kind(&self, kind: ExportKind) -> impl Iterator<Item = &ExportEntry> {
        self.exports.entries.values().filter(move |e| e.kind == kind)
    }
}

/// Read only the identity from an image header.
pub fn parse_identity(bytes: &[u8]) -> ImageResult<Identity> {
    let (header, _) = split_sections(bytes)?;
    decode_identity(header)
}

fn split_sections(bytes: &[u8]) -> ImageResult<(&[u8], &[u8])> {
    if bytes.len() < PREAMBLE_LEN {
        // Report a wrong magic in preference to truncation when we can.
        if bytes.len() >= 4 && bytes[..4] != IMAGE_MAGIC {
            let mut found = [0u8; 4];
            found.copy_from_slice(&bytes[..4]);
            return Err(ImageError::BadMagic { found });
        }
        return Err(ImageError::Truncated {
            needed: PREAMBLE_LEN,
            available: bytes.len(),
        });
    }

    if bytes.len() > MAX_IMAGE_LEN {
        return Err(ImageError::TooLarge {
            len: bytes.len(),
            limit: MAX_IMAGE_LEN,
        });
    }

    let mut magic = [0u8; 4];
    magic.copy_from_slice(&bytes[..4]);
    if magic != IMAGE_MAGIC {
        return Err(ImageError::BadMagic { found: magic });
    }

    let format = u16::from_le_bytes([bytes[4], bytes[5]]);
    if format != IMAGE_FORMAT_VERSION {
        return Err(ImageError::UnsupportedFormat {
            expected: IMAGE_FORMAT_VERSION,
            found: format,
        });
    }

    let header_len = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]) as usize;
    if header_len > MAX_HEADER_LEN {
        return Err(ImageError::TooLarge {
            len: header_len,
            limit: MAX_HEADER_LEN,
        });
    }
    let needed = PREAMBLE_LEN.saturating_add(header_len);
    if bytes.len() < needed {
        return Err(ImageError::Truncated {
            needed,
            available: bytes.len(),
        });
    }

    Ok((&bytes[PREAMBLE_LEN..needed], &bytes[needed..]))
}

fn decode_identity(header: &[u8]) -> ImageResult<Identity> {
    let (identity, _) =
        bincode::serde::decode_from_slice::<Identity, _>(header, header_config())?;
    validate_identity(identity)
}

fn validate_identity(mut identity: Identity) -> ImageResult<Identity> {
    if identity.name.trim().is_empty() {
        return Err(ImageError::InvalidIdentity("empty module name".to_string()));
    }
    match identity.version {
        Some(version) => identity.version = Some(version.normalized()),
        None => {
            return Err(ImageError::InvalidIdentity(format!(
                "module '{}' has no version",
                identity.name
            )));
        }
    }
    Ok(identity)
}

// =============================================================================
// Builder
// =============================================================================

pub struct ModuleImageBuilder {
    identity: Identity,
    exports: ExportTable,
    references: Vec<Identity>,
    payload: Vec<u8>,
    next_token: u32,
}

impl ModuleImageBuilder {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            exports: ExportTable::new(),
            references: Vec::new(),
            payload: Vec::new(),
            next_token: 1,
        }
    }

    pub fn culture(mut self, culture: impl Into<String>) -> Self {
        self.identity = self.identity.with_culture(culture);
        self
    }

    pub fn public_key_token(mut self, token: PublicKeyToken) -> Self {
        self.identity = self.identity.with_public_key_token(token);
        self
    }

    pub fn export(mut self, kind: ExportKind, name: impl Into<String>) -> Self {
        let name = name.into();
        let token = self.next_token;
        self.next_token += 1;
        self.exports
            .entries
            .insert(name.clone(), ExportEntry { name, kind, token });
        self
    }

    pub fn reference(mut self, identity: Identity) -> Self {
        self.references.push(identity);
        self
    }

    pub fn payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn build(self) -> ModuleImage {
        let mut identity = self.identity;
        identity.version = identity.version.map(Version::normalized);
        ModuleImage {
            identity,
            exports: self.exports,
            references: self.references,
            payload: self.payload,
        }
    }
}
