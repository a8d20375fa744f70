//! Binder configuration.

use std::env;
use std::path::PathBuf;

/// Environment variable holding the trusted module list (platform path list).
pub const ENV_TRUSTED_MODULES: &str = "MODBIND_TRUSTED_MODULES";
/// Environment variable holding the probing directories (platform path list).
pub const ENV_PROBING_PATHS: &str = "MODBIND_PROBING_PATHS";
/// Environment variable enabling memory-mapped reads.
pub const ENV_MMAP: &str = "MODBIND_MMAP";
/// Environment variable enabling verbose trace echo.
pub const ENV_VERBOSE: &str = "MODBIND_VERBOSE";

/// Configuration for a [`BinderHost`](crate::BinderHost).
///
/// Resolved once when the host is created and immutable afterwards.
#[derive(Debug, Clone)]
pub struct BinderConfig {
    /// Image files the default context may discover by simple name
    pub trusted_modules: Vec<PathBuf>,
    /// Directories searched for `<name>.modimg` after the trusted list
    pub probing_paths: Vec<PathBuf>,
    /// Read path origins through a memory map instead of `fs::read`
    pub use_memory_mapping: bool,
    /// Echo every trace event to stderr as it is recorded
    pub verbose_logging: bool,
    /// Initial capacity of each context's trace buffer
    pub trace_capacity_hint: usize,
}

impl Default for BinderConfig {
    fn default() -> Self {
        Self {
            trusted_modules: Vec::new(),
            probing_paths: Vec::new(),
            use_memory_mapping: false,
            verbose_logging: false, // Disabled by default to avoid spam
            trace_capacity_hint: 64,
        }
    }
}

impl BinderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults with `MODBIND_*` environment overrides applied.
    ///
    /// Path lists are appended to, flags only ever switch features on.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(list) = env::var_os(ENV_TRUSTED_MODULES) {
            config
                .trusted_modules
                .extend(env::split_paths(&list).filter(|p| !p.as_os_str().is_empty()));
        }
        if let Some(list) = env::var_os(ENV_PROBING_PATHS) {
            config
                .probing_paths
                .extend(env::split_paths(&list).filter(|p| !p.as_os_str().is_empty()));
        }
        config.use_memory_mapping |= Self::env_bool(ENV_MMAP);
        config.verbose_logging |= Self::env_bool(ENV_VERBOSE);

        config
    }

    pub fn with_trusted_module(mut self, path: impl Into<PathBuf>) -> Self {
        self.trusted_modules.push(path.into());
        self
    }

    pub fn with_trusted_modules<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.trusted_modules.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn with_probing_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.probing_paths.push(dir.into());
        self
    }

    pub fn with_probing_paths<I, P>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.probing_paths.extend(dirs.into_iter().map(Into::into));
        self
    }

    pub fn with_memory_mapping(mut self, enabled: bool) -> Self {
        self.use_memory_mapping = enabled;
        self
    }

    pub fn with_verbose_logging(mut self, enabled: bool) -> Self {
        self.verbose_logging = enabled;
        self
    }

    /// Check if an environment variable is set to a non-empty, truthy value.
    #[inline]
    fn env_bool(var: &str) -> bool {
        env::var(var)
            .map(|v| !v.is_empty() && v != "0" && !v.eq_ignore_ascii_case("false"))
            .unwrap_or(false)
    }
}
