//! ---
//! macp_section: "03-security-access-control"
//! macp_subsection: "module"
//! macp_type: "source"
//! macp_scope: "code"
//! macp_description: "Role-based authorization core for management operations."
//! macp_version: "v0.0.0-prealpha"
//! macp_owner: "tbd"
//! ---
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use macp_common::config::AccessControlConfig;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::errors::AuthzError;
use crate::principal::{first_match, PrincipalMatcher};
use crate::standard::official_form;
use crate::Caller;

/// Which matcher bucket of a role mapping an operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchBucket {
    /// Principals granted the role.
    Include,
    /// Principals excluded from the role.
    Exclude,
}

/// A configured role mapping: a named bucket of include and exclude
/// principal matchers deciding membership for a caller.
///
/// Membership reads operate on immutable snapshots of the matcher sets;
/// mutations copy, modify, and atomically republish, so a reader started
/// before a mutation observes the pre-mutation set consistently.
#[derive(Debug)]
pub struct RoleMapping {
    name: String,
    include_all: AtomicBool,
    includes: RwLock<Arc<HashSet<PrincipalMatcher>>>,
    excludes: RwLock<Arc<HashSet<PrincipalMatcher>>>,
    mutation: Mutex<()>,
}

impl RoleMapping {
    /// Create an empty mapping. The name is stored in official form.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: official_form(name.as_ref()),
            include_all: AtomicBool::new(false),
            includes: RwLock::new(Arc::new(HashSet::new())),
            excludes: RwLock::new(Arc::new(HashSet::new())),
            mutation: Mutex::new(()),
        }
    }

    /// The role name, in official form.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether every caller with an authenticated identity is included.
    pub fn include_all(&self) -> bool {
        self.include_all.load(Ordering::Acquire)
    }

    /// Toggle the include-all flag.
    pub fn set_include_all(&self, include_all: bool) {
        self.include_all.store(include_all, Ordering::Release);
    }

    /// First include matcher satisfied by the caller, if any.
    pub fn is_included(&self, caller: &Caller) -> Option<PrincipalMatcher> {
        let snapshot = self.includes.read().clone();
        first_match(&snapshot, caller).cloned()
    }

    /// First exclude matcher satisfied by the caller, if any.
    pub fn is_excluded(&self, caller: &Caller) -> Option<PrincipalMatcher> {
        let snapshot = self.excludes.read().clone();
        first_match(&snapshot, caller).cloned()
    }

    /// Add a matcher to the given bucket using copy-on-write publication.
    /// Returns false when the matcher was already present.
    pub fn add_principal(&self, matcher: PrincipalMatcher, bucket: MatchBucket) -> bool {
        let _guard = self.mutation.lock();
        let slot = self.bucket(bucket);
        let current = slot.read().clone();
        if current.contains(&matcher) {
            return false;
        }
        let mut next = (*current).clone();
        next.insert(matcher);
        *slot.write() = Arc::new(next);
        true
    }

    /// Remove a matcher from the given bucket using copy-on-write
    /// publication. Returns false when the matcher was not present.
    pub fn remove_principal(&self, matcher: &PrincipalMatcher, bucket: MatchBucket) -> bool {
        let _guard = self.mutation.lock();
        let slot = self.bucket(bucket);
        let current = slot.read().clone();
        if !current.contains(matcher) {
            return false;
        }
        let mut next = (*current).clone();
        next.remove(matcher);
        *slot.write() = Arc::new(next);
        true
    }

    /// Add a matcher without copy-on-write. Only for boot-time bulk loading:
    /// exclusive access is enforced by `&mut self`, so no concurrent reader
    /// can exist yet.
    pub fn add_principal_immediate(&mut self, matcher: PrincipalMatcher, bucket: MatchBucket) -> bool {
        let slot = match bucket {
            MatchBucket::Include => self.includes.get_mut(),
            MatchBucket::Exclude => self.excludes.get_mut(),
        };
        Arc::make_mut(slot).insert(matcher)
    }

    fn bucket(&self, bucket: MatchBucket) -> &RwLock<Arc<HashSet<PrincipalMatcher>>> {
        match bucket {
            MatchBucket::Include => &self.includes,
            MatchBucket::Exclude => &self.excludes,
        }
    }
}

/// Live registry of configured role mappings, keyed by official role name.
///
/// Reads clone the current immutable snapshot; mutations serialize on one
/// lock and publish a fresh map.
#[derive(Debug, Default)]
pub struct RoleCatalog {
    inner: RwLock<Arc<HashMap<String, Arc<RoleMapping>>>>,
    mutation: Mutex<()>,
}

impl RoleCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from loaded configuration. This is the boot-time
    /// replay path: mappings are populated with the immediate variant
    /// before the catalog is published anywhere.
    pub fn from_config(config: &AccessControlConfig) -> Self {
        let mut mappings = HashMap::new();
        for (name, definition) in &config.role_mappings {
            let mut mapping = RoleMapping::new(name);
            mapping.set_include_all(definition.include_all);
            for entry in &definition.includes {
                mapping.add_principal_immediate(
                    PrincipalMatcher::from_entry(entry),
                    MatchBucket::Include,
                );
            }
            for entry in &definition.excludes {
                mapping.add_principal_immediate(
                    PrincipalMatcher::from_entry(entry),
                    MatchBucket::Exclude,
                );
            }
            mappings.insert(mapping.name().to_owned(), Arc::new(mapping));
        }
        debug!(mappings = mappings.len(), "role catalog loaded from configuration");
        Self {
            inner: RwLock::new(Arc::new(mappings)),
            mutation: Mutex::new(()),
        }
    }

    /// The current immutable snapshot of all mappings.
    pub fn snapshot(&self) -> Arc<HashMap<String, Arc<RoleMapping>>> {
        self.inner.read().clone()
    }

    /// Look up a mapping by role name (any case).
    pub fn get(&self, name: &str) -> Option<Arc<RoleMapping>> {
        self.inner.read().get(&official_form(name)).cloned()
    }

    /// Register a new mapping. Fails when the name is already taken.
    pub fn register(&self, mapping: RoleMapping) -> Result<Arc<RoleMapping>, AuthzError> {
        let _guard = self.mutation.lock();
        let current = self.inner.read().clone();
        let name = mapping.name().to_owned();
        if current.contains_key(&name) {
            return Err(AuthzError::DuplicateRole(name));
        }
        let mapping = Arc::new(mapping);
        let mut next = (*current).clone();
        next.insert(name, mapping.clone());
        *self.inner.write() = Arc::new(next);
        Ok(mapping)
    }

    /// Remove a mapping by name. Fails when no such mapping exists.
    pub fn remove(&self, name: &str) -> Result<Arc<RoleMapping>, AuthzError> {
        let _guard = self.mutation.lock();
        let official = official_form(name);
        let current = self.inner.read().clone();
        if !current.contains_key(&official) {
            return Err(AuthzError::UnknownRole(official));
        }
        let mut next = (*current).clone();
        let removed = next
            .remove(&official)
            .ok_or(AuthzError::UnknownRole(official))?;
        *self.inner.write() = Arc::new(next);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership_requires_included_and_not_excluded() {
        let mapping = RoleMapping::new("Deployer");
        assert_eq!(mapping.name(), "DEPLOYER");
        mapping.add_principal(PrincipalMatcher::group("deployers"), MatchBucket::Include);
        mapping.add_principal(PrincipalMatcher::user("mallory"), MatchBucket::Exclude);

        let anna = Caller::authenticated("anna").with_groups(["deployers"]);
        let mallory = Caller::authenticated("mallory").with_groups(["deployers"]);

        assert!(mapping.is_included(&anna).is_some());
        assert!(mapping.is_excluded(&anna).is_none());
        assert!(mapping.is_included(&mallory).is_some());
        assert!(mapping.is_excluded(&mallory).is_some());
    }

    #[test]
    fn add_then_remove_restores_membership() {
        let mapping = RoleMapping::new("Monitor");
        let matcher = PrincipalMatcher::user("anna");
        let caller = Caller::authenticated("anna");

        assert!(mapping.is_included(&caller).is_none());
        assert!(mapping.add_principal(matcher.clone(), MatchBucket::Include));
        assert!(!mapping.add_principal(matcher.clone(), MatchBucket::Include));
        assert!(mapping.is_included(&caller).is_some());
        assert!(mapping.remove_principal(&matcher, MatchBucket::Include));
        assert!(!mapping.remove_principal(&matcher, MatchBucket::Include));
        assert!(mapping.is_included(&caller).is_none());
    }

    #[test]
    fn reader_snapshot_is_stable_across_mutation() {
        let mapping = RoleMapping::new("Operator");
        mapping.add_principal(PrincipalMatcher::user("anna"), MatchBucket::Include);

        let snapshot = mapping.includes.read().clone();
        mapping.add_principal(PrincipalMatcher::user("bob"), MatchBucket::Include);

        // The pre-mutation snapshot still has exactly one entry.
        assert_eq!(snapshot.len(), 1);
        assert_eq!(mapping.includes.read().len(), 2);
    }

    #[test]
    fn immediate_variant_populates_without_publication() {
        let mut mapping = RoleMapping::new("Auditor");
        assert!(mapping.add_principal_immediate(PrincipalMatcher::group("audit"), MatchBucket::Include));
        assert!(!mapping.add_principal_immediate(PrincipalMatcher::group("audit"), MatchBucket::Include));
        let caller = Caller::authenticated("anna").with_groups(["audit"]);
        assert!(mapping.is_included(&caller).is_some());
    }

    #[test]
    fn catalog_registration_is_case_normalized() {
        let catalog = RoleCatalog::new();
        catalog.register(RoleMapping::new("Deployer")).unwrap();
        assert!(catalog.get("deployer").is_some());
        assert!(catalog.get("DEPLOYER").is_some());
        assert!(matches!(
            catalog.register(RoleMapping::new("DEPLOYER")),
            Err(AuthzError::DuplicateRole(_))
        ));
        catalog.remove("Deployer").unwrap();
        assert!(matches!(
            catalog.remove("Deployer"),
            Err(AuthzError::UnknownRole(_))
        ));
    }

    #[test]
    fn catalog_from_config_replays_definitions() {
        let raw = r#"
            [role_mappings.Maintainer]
            include_all = false
            includes = [{ type = "group", name = "ops" }]
            excludes = [{ type = "user", name = "mallory" }]

            [role_mappings.Monitor]
            include_all = true
        "#;
        let config: AccessControlConfig = raw.parse().unwrap();
        let catalog = RoleCatalog::from_config(&config);

        let maintainer = catalog.get("maintainer").unwrap();
        let anna = Caller::authenticated("anna").with_groups(["ops"]);
        assert!(maintainer.is_included(&anna).is_some());
        assert!(catalog.get("MONITOR").unwrap().include_all());
    }
}
