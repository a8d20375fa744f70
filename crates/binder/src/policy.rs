//! Version-compatibility rules.
//!
//! Two checks exist. A by-name request is *satisfied* by a loaded module of
//! the same name whose version is greater than or equal to the requested one,
//! with absent request fields matching anything. An explicit load (path, bytes
//! or stream) *conflicts* with any loaded module of the same name and culture
//! whose version differs strictly, or whose public key token differs.

use crate::record::ModuleRecord;
use modbind_image::Identity;
use std::sync::Arc;

/// Outcome of looking a by-name request up in one context's table.
pub(crate) enum Lookup {
    Hit(Arc<ModuleRecord>),
    /// Same name is loaded, but no record satisfies the request.
    Incompatible(Arc<ModuleRecord>),
    Absent,
}

/// Whether a module defined as `definition` satisfies `request`.
pub fn satisfies(request: &Identity, definition: &Identity) -> bool {
    if !request.name_eq(definition) || !request.culture_eq(definition) {
        return false;
    }
    if let Some(token) = &request.public_key_token {
        if definition.public_key_token.as_ref() != Some(token) {
            return false;
        }
    }
    match (&request.version, &definition.version) {
        (None, _) => true,
        (Some(requested), Some(loaded)) => requested.is_satisfied_by(loaded),
        (Some(_), None) => false,
    }
}

/// Whether an explicit load of `definition` contradicts `loaded`.
pub fn conflicts(definition: &Identity, loaded: &Identity) -> bool {
    if !definition.name_eq(loaded) || !definition.culture_eq(loaded) {
        return false;
    }
    !definition.strict_version().strict_eq(&loaded.strict_version())
        || definition.public_key_token != loaded.public_key_token
}

/// The first loaded record an explicit load of `definition` would conflict with.
pub(crate) fn find_conflict<'a>(
    records: &'a [Arc<ModuleRecord>],
    definition: &Identity,
) -> Option<&'a Arc<ModuleRecord>> {
    records.iter().find(|r| conflicts(definition, r.identity()))
}

/// Pick the record satisfying `request`, preferring the earliest load.
///
/// Records of another culture do not block the request.
pub(crate) fn lookup(records: &[Arc<ModuleRecord>], request: &Identity) -> Lookup {
    if let Some(hit) = records.iter().find(|r| satisfies(request, r.identity())) {
        return Lookup::Hit(Arc::clone(hit));
    }
    match records.iter().find(|r| request.culture_eq(r.identity())) {
        Some(first) => Lookup::Incompatible(Arc::clone(first)),
        None => Lookup::Absent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ContextId, Origin};
    use modbind_image::{PublicKeyToken, Version};
    use std::sync::Weak;

    fn def(name: &str, major: u16, minor: u16) -> Identity {
        Identity::new(name).with_version(Version::new(major, minor, 0, 0))
    }

    #[test]
    fn test_satisfies_lower_or_equal_version() {
        let loaded = def("Dependency", 2, 5);
        assert!(satisfies(&def("Dependency", 1, 0), &loaded));
        assert!(satisfies(&def("dependency", 2, 5), &loaded));
        assert!(!satisfies(&def("Dependency", 3, 0), &loaded));
        assert!(satisfies(&Identity::new("DEPENDENCY"), &loaded));
        assert!(!satisfies(&def("Other", 1, 0), &loaded));
    }

    #[test]
    fn test_satisfies_partial_version_wildcards() {
        let loaded = Identity::new("Dependency").with_version(Version::new(2, 5, 7, 1));
        let request = Identity::new("Dependency").with_version(Version::partial(2, 5));
        assert!(satisfies(&request, &loaded));
        let request = Identity::new("Dependency").with_version(Version::partial(2, 6));
        assert!(!satisfies(&request, &loaded));
    }

    #[test]
    fn test_satisfies_culture_and_token() {
        let token = PublicKeyToken([1, 2, 3, 4, 5, 6, 7, 8]);
        let loaded = def("Dependency", 2, 5).with_public_key_token(token);
        assert!(satisfies(&def("Dependency", 2, 0), &loaded));
        assert!(satisfies(&def("Dependency", 2, 0).with_public_key_token(token), &loaded));
        assert!(!satisfies(
            &def("Dependency", 2, 0).with_public_key_token(PublicKeyToken([0; 8])),
            &loaded
        ));
        assert!(!satisfies(&def("Dependency", 2, 0).with_culture("fr-FR"), &loaded));
    }

    #[test]
    fn test_conflicts_is_strict_in_both_directions() {
        let loaded = def("Dependency", 2, 5);
        assert!(conflicts(&def("Dependency", 1, 0), &loaded));
        assert!(conflicts(&def("Dependency", 3, 0), &loaded));
        assert!(!conflicts(&def("DEPENDENCY", 2, 5), &loaded));
        assert!(!conflicts(&def("Other", 1, 0), &loaded));
        // Satellite modules of another culture live side by side.
        assert!(!conflicts(&def("Dependency", 1, 0).with_culture("de"), &loaded));
    }

    fn record(identity: Identity) -> Arc<ModuleRecord> {
        let image = modbind_image::ModuleImageBuilder::new(identity).build();
        Arc::new(ModuleRecord::new(
            image,
            Origin::Bytes(Arc::from(Vec::new())),
            Weak::new(),
            ContextId::DEFAULT,
            Arc::from("Default"),
            1,
        ))
    }

    #[test]
    fn test_lookup_outcomes() {
        let records = vec![record(def("Dependency", 2, 5))];
        assert!(matches!(lookup(&records, &def("Dependency", 1, 0)), Lookup::Hit(_)));
        assert!(matches!(
            lookup(&records, &def("Dependency", 3, 0)),
            Lookup::Incompatible(_)
        ));
        assert!(matches!(lookup(&[], &def("Dependency", 1, 0)), Lookup::Absent));
    }

    #[test]
    fn test_lookup_ignores_other_cultures() {
        let records = vec![record(def("Dependency", 2, 5))];
        let satellite = def("Dependency", 1, 0).with_culture("de");
        assert!(matches!(lookup(&records, &satellite), Lookup::Absent));

        let records = vec![
            record(def("Dependency", 2, 5)),
            record(def("Dependency", 1, 0).with_culture("de")),
        ];
        assert!(matches!(
            lookup(&records, &def("Dependency", 3, 0).with_culture("DE")),
            Lookup::Incompatible(r) if r.identity().culture.is_some()
        ));
    }

    #[test]
    fn test_conflicts_on_token_mismatch() {
        let loaded = def("Dependency", 2, 5);
        let signed = def("Dependency", 2, 5).with_public_key_token(PublicKeyToken([9; 8]));
        assert!(conflicts(&signed, &loaded));
    }
}
