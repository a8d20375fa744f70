//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use modbind::{ExportKind, ModuleImage, Version};
use std::path::{Path, PathBuf};

pub fn image(name: &str, version: &str) -> ModuleImage {
    let version: Version = version.parse().unwrap();
    ModuleImage::builder(name, version)
        .export(ExportKind::Type, format!("{}.Widget", name))
        .export(ExportKind::Function, "describe")
        .build()
}

pub fn image_bytes(name: &str, version: &str) -> Vec<u8> {
    image(name, version).to_bytes().unwrap()
}

/// Write `name` at `version` to `dir/file`.
pub fn write_image(dir: &Path, file: &str, name: &str, version: &str) -> PathBuf {
    let path = dir.join(file);
    image(name, version).write_to(&path).unwrap();
    path
}
