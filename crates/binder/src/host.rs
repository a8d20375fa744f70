//! Process-scoped binder state.
//!
//! A [`BinderHost`] owns the default context and the registry of custom
//! contexts. Create one per process (or per test) and pass it by reference;
//! there is no hidden global.

use crate::config::BinderConfig;
use crate::context::LoadContext;
use crate::error::BindError;
use crate::probe::{ModuleProber, StandardProber};
use crate::record::ContextId;
use crate::resolver::Resolver;
use indexmap::IndexMap;
use parking_lot::RwLock;
use rayon::prelude::*;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

pub struct BinderHost {
    config: Arc<BinderConfig>,
    default_context: Arc<LoadContext>,
    contexts: RwLock<IndexMap<ContextId, Weak<LoadContext>>>,
    ordinals: Arc<AtomicU64>,
    next_context_id: AtomicU32,
}

impl BinderHost {
    /// Host whose default context discovers modules through the configured
    /// trusted list and probing paths.
    pub fn new(config: BinderConfig) -> Self {
        let prober = StandardProber::new(
            config.trusted_modules.clone(),
            config.probing_paths.clone(),
        );
        Self::with_prober(config, prober)
    }

    pub fn with_prober(config: BinderConfig, prober: impl ModuleProber + 'static) -> Self {
        let config = Arc::new(config);
        let ordinals = Arc::new(AtomicU64::new(1));
        let default_context =
            LoadContext::new_default(Arc::clone(&config), Arc::clone(&ordinals), Arc::new(prober));

        let mut contexts = IndexMap::new();
        contexts.insert(ContextId::DEFAULT, Arc::downgrade(&default_context));

        Self {
            config,
            default_context,
            contexts: RwLock::new(contexts),
            ordinals,
            next_context_id: AtomicU32::new(1),
        }
    }

    /// Host configured from `MODBIND_*` environment variables.
    pub fn from_env() -> Self {
        Self::new(BinderConfig::from_env())
    }

    pub fn config(&self) -> &BinderConfig {
        &self.config
    }

    pub fn default_context(&self) -> &Arc<LoadContext> {
        &self.default_context
    }

    /// Create a custom context. By-name requests it cannot satisfy fall back
    /// to the default context.
    ///
    /// The host keeps only a weak reference; the context lives as long as the
    /// returned `Arc` (and any record owned by it is kept alive).
    pub fn create_context(&self, name: impl Into<String>) -> Arc<LoadContext> {
        let id = ContextId(self.next_context_id.fetch_add(1, Ordering::Relaxed));
        let name: String = name.into();
        let context = LoadContext::new_custom(
            id,
            Arc::from(name),
            Arc::clone(&self.config),
            Arc::clone(&self.ordinals),
            Arc::clone(&self.default_context),
        );

        let mut contexts = self.contexts.write();
        contexts.retain(|_, weak| weak.strong_count() > 0);
        contexts.insert(id, Arc::downgrade(&context));
        context
    }

    /// Look up a live context by id.
    pub fn context(&self, id: ContextId) -> Option<Arc<LoadContext>> {
        if id == ContextId::DEFAULT {
            return Some(Arc::clone(&self.default_context));
        }
        self.contexts.read().get(&id).and_then(Weak::upgrade)
    }

    /// All live contexts, default first, in creation order.
    pub fn contexts(&self) -> Vec<Arc<LoadContext>> {
        self.contexts
            .read()
            .values()
            .filter_map(Weak::upgrade)
            .collect()
    }

    pub fn resolver(&self) -> Resolver<'_> {
        Resolver::new(self)
    }

    /// Load every trusted module into the default context in parallel.
    ///
    /// Each load appends its own trace event. Failures are collected rather
    /// than stopping the remaining loads.
    pub fn preload_trusted(&self) -> Vec<BindError> {
        let context = &self.default_context;
        self.config
            .trusted_modules
            .par_iter()
            .filter_map(|path| {
                let path = std::path::absolute(path).unwrap_or_else(|_| path.clone());
                context.load_from_path(&path).err()
            })
            .collect()
    }
}

impl Default for BinderHost {
    fn default() -> Self {
        Self::new(BinderConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::Stage;
    use modbind_image::{Identity, ModuleImage, Version};
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct FixedProber(PathBuf);

    impl ModuleProber for FixedProber {
        fn probe(&self, _identity: &Identity) -> Option<PathBuf> {
            Some(self.0.clone())
        }
    }

    fn write(dir: &TempDir, name: &str, major: u16) -> PathBuf {
        let path = dir.path().join(format!("{}.modimg", name));
        ModuleImage::builder(name, Version::new(major, 0, 0, 0))
            .build()
            .write_to(&path)
            .unwrap();
        path
    }

    #[test]
    fn test_context_registry() {
        let host = BinderHost::default();
        assert!(host.default_context().is_default());
        assert_eq!(host.default_context().name(), "Default");

        let plugins = host.create_context("plugins");
        let tools = host.create_context("tools");
        assert_ne!(plugins.id(), tools.id());
        assert!(!plugins.is_default());
        assert!(Arc::ptr_eq(plugins.parent().unwrap(), host.default_context()));
        assert!(Arc::ptr_eq(&host.context(plugins.id()).unwrap(), &plugins));
        assert_eq!(host.contexts().len(), 3);

        let tools_id = tools.id();
        drop(tools);
        assert!(host.context(tools_id).is_none());
        assert_eq!(host.contexts().len(), 2);
    }

    #[test]
    fn test_preload_trusted_in_parallel() {
        let dir = TempDir::new().unwrap();
        let paths: Vec<PathBuf> = (0..6).map(|i| write(&dir, &format!("Lib{}", i), 1)).collect();
        let host = BinderHost::new(BinderConfig::default().with_trusted_modules(paths));

        let errors = host.preload_trusted();
        assert!(errors.is_empty());
        let context = host.default_context();
        assert_eq!(context.modules().len(), 6);
        assert_eq!(context.trace().count(Stage::FreshLoad), 6);

        // Load ordinals are unique across the parallel loads.
        let mut ordinals: Vec<u64> = context.modules().iter().map(|r| r.load_ordinal()).collect();
        ordinals.dedup();
        assert_eq!(ordinals.len(), 6);
    }

    #[test]
    fn test_preload_collects_failures() {
        let dir = TempDir::new().unwrap();
        let good = write(&dir, "Good", 1);
        let missing = dir.path().join("Gone.modimg");
        let host = BinderHost::new(BinderConfig::default().with_trusted_modules([good, missing]));

        let errors = host.preload_trusted();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind(), crate::ErrorKind::NotFound);
        assert_eq!(host.default_context().modules().len(), 1);
    }

    #[test]
    fn test_custom_prober() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "Anything", 4);
        let host = BinderHost::with_prober(BinderConfig::default(), FixedProber(path));

        let record = host
            .default_context()
            .load_from_name(&Identity::new("anything"))
            .unwrap();
        assert_eq!(record.identity().version, Some(Version::new(4, 0, 0, 0)));
    }

    #[test]
    fn test_ordinals_shared_across_contexts() {
        let bytes = |name: &str| {
            ModuleImage::builder(name, Version::new(1, 0, 0, 0))
                .build()
                .to_bytes()
                .unwrap()
        };
        let host = BinderHost::default();
        let custom = host.create_context("custom");
        let a = host.default_context().load_from_bytes(bytes("A")).unwrap();
        let b = custom.load_from_bytes(bytes("B")).unwrap();
        assert_eq!(a.load_ordinal(), 1);
        assert_eq!(b.load_ordinal(), 2);
    }
}
