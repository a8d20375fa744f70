//! # modbind image format
//!
//! Module images are the unit of loading for the modbind binder. This crate
//! defines:
//!
//! - [`Identity`], [`Version`] and [`PublicKeyToken`], with display-name
//!   parsing and formatting
//! - [`ModuleImage`], its export table and the binary codec
//! - [`parse_identity`], which reads just the identity from an image header
//!
//! ## Usage
//!
//! ```rust
//! use modbind_image::{ExportKind, ModuleImage, Version, parse_identity};
//!
//! let image = ModuleImage::builder("Dependency", Version::new(2, 5, 0, 0))
//!     .export(ExportKind::Type, "Dependency.Widget")
//!     .build();
//! let bytes = image.to_bytes().unwrap();
//! assert_eq!(parse_identity(&bytes).unwrap().name, "Dependency");
//! ```

pub mod error;
pub mod identity;
pub mod image;

pub use error::{IdentityError, IdentityResult, ImageError, ImageResult};
pub use identity::{Identity, PublicKeyToken, QualifiedTypeName, Version};
pub use image::{
    ExportEntry, ExportKind, ExportTable, IMAGE_EXTENSION, IMAGE_FORMAT_VERSION, IMAGE_MAGIC,
    MAX_HEADER_LEN, MAX_IMAGE_LEN, ModuleImage, ModuleImageBuilder, parse_identity,
};
