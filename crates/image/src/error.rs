//! Image and identity error types

use thiserror::Error;

/// Errors raised while decoding or encoding a module image.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Not a module image: bad magic {found:02x?}")]
    BadMagic { found: [u8; 4] },

    #[error("Unsupported image format version: expected {expected}, found {found}")]
    UnsupportedFormat { expected: u16, found: u16 },

    #[error("Image truncated: needed {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("Image section too large: {len} bytes exceeds the {limit} byte limit")]
    TooLarge { len: usize, limit: usize },

    #[error("Invalid identity in image header: {0}")]
    InvalidIdentity(String),

    #[error("Serialization encode error: {0}")]
    EncodeError(#[from] bincode::error::EncodeError),

    #[error("Serialization decode error: {0}")]
    DecodeError(#[from] bincode::error::DecodeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ImageResult<T> = Result<T, ImageError>;

/// Errors raised while parsing display names and qualified type names.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("Module name is empty")]
    EmptyName,

    #[error("Invalid version '{0}'")]
    InvalidVersion(String),

    #[error("Invalid public key token '{0}'")]
    InvalidPublicKeyToken(String),

    #[error("Unknown display name property '{0}'")]
    UnknownProperty(String),

    #[error("Duplicate display name property '{0}'")]
    DuplicateProperty(String),

    #[error("Malformed display name component '{0}'")]
    MalformedComponent(String),

    #[error("Type name '{0}' is not qualified with a module name")]
    UnqualifiedTypeName(String),
}

pub type IdentityResult<T> = Result<T, IdentityError>;
