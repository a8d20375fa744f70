//! Module discovery for by-name loads in the default context.
//!
//! Discovery maps a simple module name to a candidate image file:
//! - the trusted module list: explicit files matched by file stem
//! - probing paths: `<dir>/<name>.modimg`, searched in order
//!
//! The candidate is only a location. Whether the image found there actually
//! satisfies the request is decided by the context after reading its header.

use modbind_image::{IMAGE_EXTENSION, Identity};
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Trait for module locators
pub trait ModuleProber: Send + Sync {
    /// Locate a candidate image for `identity`, if any.
    fn probe(&self, identity: &Identity) -> Option<PathBuf>;

    /// Check if a candidate path exists and is a regular file
    fn candidate_exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// Trusted list first, then probing directories.
pub struct StandardProber {
    trusted_modules: Vec<PathBuf>,
    probing_paths: Vec<PathBuf>,
    trusted_index: OnceCell<HashMap<String, PathBuf>>,
}

impl StandardProber {
    pub fn new(trusted_modules: Vec<PathBuf>, probing_paths: Vec<PathBuf>) -> Self {
        Self {
            trusted_modules,
            probing_paths,
            trusted_index: OnceCell::new(),
        }
    }

    /// Lower-cased file stem to path; the first entry for a stem wins.
    fn trusted_index(&self) -> &HashMap<String, PathBuf> {
        self.trusted_index.get_or_init(|| {
            let mut index = HashMap::with_capacity(self.trusted_modules.len());
            for path in &self.trusted_modules {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    index
                        .entry(stem.to_ascii_lowercase())
                        .or_insert_with(|| path.clone());
                }
            }
            index
        })
    }

    fn file_name(identity: &Identity) -> PathBuf {
        PathBuf::from(format!("{}.{}", identity.name, IMAGE_EXTENSION))
    }
}

impl ModuleProber for StandardProber {
    fn probe(&self, identity: &Identity) -> Option<PathBuf> {
        // Names with separators could escape the probing directories.
        if identity.name.contains(['/', '\\']) || identity.name.starts_with('.') {
            return None;
        }

        if let Some(path) = self.trusted_index().get(&identity.name_key()) {
            return Some(path.clone());
        }

        let file_name = Self::file_name(identity);
        self.probing_paths
            .iter()
            .map(|dir| dir.join(&file_name))
            .find(|candidate| self.candidate_exists(candidate))
    }
}
