//! ---
//! macp_section: "03-security-access-control"
//! macp_subsection: "module"
//! macp_type: "source"
//! macp_scope: "code"
//! macp_description: "Role-based authorization core for management operations."
//! macp_version: "v0.0.0-prealpha"
//! macp_owner: "tbd"
//! ---
//! Role mapping strategies. A mapper turns an authenticated caller plus
//! the action context into the set of role names the caller holds. Three
//! strategies exist: the trivial superuser mapper, the production mapper
//! driven by the role catalog, and a run-as decorator layered over either.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::action::{ActionTarget, ManagementAction};
use crate::caller::{CallEnvironment, Caller};
use crate::errors::AuthzError;
use crate::metrics::AccessMetrics;
use crate::role::RoleCatalog;
use crate::standard::{official_form, StandardRole};

/// Ambient capability check gating unauthenticated in-VM calls. The host
/// process decides whether the calling context may assume the in-VM role;
/// this crate only consumes the verdict.
pub trait InVmCapabilityCheck: Send + Sync {
    /// Whether the ambient context holds the run-as-in-VM capability for
    /// the given role name.
    fn check(&self, role: &str) -> bool;
}

/// Capability check that grants every in-VM call. Suitable for embedded
/// and test processes that trust their own threads.
#[derive(Debug, Default)]
pub struct AllowInVmCalls;

impl InVmCapabilityCheck for AllowInVmCalls {
    fn check(&self, _role: &str) -> bool {
        true
    }
}

/// Capability check that denies every in-VM call.
#[derive(Debug, Default)]
pub struct DenyInVmCalls;

impl InVmCapabilityCheck for DenyInVmCalls {
    fn check(&self, _role: &str) -> bool {
        false
    }
}

/// Strategy mapping a caller to a set of role names (official form).
///
/// The result is never empty unless the caller genuinely holds no roles.
/// Mappers are stateless per call; registries they consult are updated
/// out-of-band with copy-on-write publication.
pub trait RoleMapper: Send + Sync {
    /// Map the caller to role names for the given action and target.
    fn map_roles(
        &self,
        caller: &Caller,
        environment: &CallEnvironment,
        action: &ManagementAction,
        target: &ActionTarget,
    ) -> Result<BTreeSet<String>, AuthzError>;
}

/// Mapper that assigns every caller the superuser role. Used at trust
/// boundaries where anything reaching this mapper is already fully
/// trusted, e.g. embedded or test mode.
#[derive(Debug, Default)]
pub struct SuperuserRoleMapper;

impl RoleMapper for SuperuserRoleMapper {
    fn map_roles(
        &self,
        _caller: &Caller,
        _environment: &CallEnvironment,
        _action: &ManagementAction,
        _target: &ActionTarget,
    ) -> Result<BTreeSet<String>, AuthzError> {
        let mut roles = BTreeSet::new();
        roles.insert(StandardRole::Superuser.official_name().to_owned());
        Ok(roles)
    }
}

/// The production mapper: resolves roles from the configured role catalog,
/// optionally folding in realm-supplied role names.
pub struct StandardRoleMapper {
    catalog: Arc<RoleCatalog>,
    use_realm_roles: bool,
    in_vm_check: Arc<dyn InVmCapabilityCheck>,
}

impl StandardRoleMapper {
    /// Build a mapper over the given catalog. Realm roles are honoured by
    /// default; in-VM calls are denied by default.
    pub fn new(catalog: Arc<RoleCatalog>) -> Self {
        Self {
            catalog,
            use_realm_roles: true,
            in_vm_check: Arc::new(DenyInVmCalls),
        }
    }

    /// Toggle whether realm-supplied role names participate in mapping.
    pub fn with_realm_roles(mut self, use_realm_roles: bool) -> Self {
        self.use_realm_roles = use_realm_roles;
        self
    }

    /// Install the ambient capability check for in-VM calls.
    pub fn with_in_vm_check(mut self, check: Arc<dyn InVmCapabilityCheck>) -> Self {
        self.in_vm_check = check;
        self
    }

    /// The catalog this mapper resolves against.
    pub fn catalog(&self) -> &Arc<RoleCatalog> {
        &self.catalog
    }
}

impl RoleMapper for StandardRoleMapper {
    fn map_roles(
        &self,
        caller: &Caller,
        environment: &CallEnvironment,
        action: &ManagementAction,
        _target: &ActionTarget,
    ) -> Result<BTreeSet<String>, AuthzError> {
        if !caller.has_authenticated_identity() {
            // In-VM call: either the ambient capability grants the fixed
            // in-VM role or the mapping fails. There is no unprivileged
            // fallback on this path.
            let in_vm_role = StandardRole::Superuser.official_name();
            if self.in_vm_check.check(in_vm_role) {
                trace!(
                    process = %environment.process_name,
                    operation = %action.operation(),
                    "in-vm call granted {}", in_vm_role
                );
                let mut roles = BTreeSet::new();
                roles.insert(in_vm_role.to_owned());
                return Ok(roles);
            }
            debug!(
                process = %environment.process_name,
                operation = %action.operation(),
                "in-vm call failed the ambient capability check"
            );
            return Err(AuthzError::InVmAccessDenied);
        }

        let mappings = self.catalog.snapshot();
        let mut result = BTreeSet::new();
        // Mapping names already resolved through realm roles; the generic
        // pass below only considers the remaining mappings. Collected into
        // a separate set so the catalog snapshot is never mutated.
        let mut consumed: HashSet<String> = HashSet::new();

        if self.use_realm_roles {
            for realm_role in caller.realm_role_names() {
                let name = official_form(realm_role);
                match mappings.get(&name) {
                    Some(mapping) => {
                        consumed.insert(name.clone());
                        if let Some(matcher) = mapping.is_excluded(caller) {
                            trace!(role = %name, matcher = ?matcher, "realm role dropped by exclusion");
                        } else {
                            trace!(role = %name, "realm role granted");
                            result.insert(name);
                        }
                    }
                    None => {
                        trace!(role = %name, "realm role granted, no mapping configured");
                        result.insert(name);
                    }
                }
            }
        }

        for (name, mapping) in mappings.iter() {
            if consumed.contains(name) {
                continue;
            }
            let included = if mapping.include_all() {
                trace!(role = %name, "caller included via include-all");
                true
            } else if let Some(matcher) = mapping.is_included(caller) {
                trace!(role = %name, matcher = ?matcher, "caller matched an inclusion");
                true
            } else {
                false
            };
            if !included {
                continue;
            }
            if let Some(matcher) = mapping.is_excluded(caller) {
                trace!(role = %name, matcher = ?matcher, "caller dropped by exclusion");
                continue;
            }
            result.insert(name.clone());
        }

        Ok(result)
    }
}

/// Decorator adding client-requested run-as substitution over a delegate
/// mapper. Escalation is strict least-privilege: a run-as request only
/// takes effect when the delegate already mapped the caller to superuser
/// and the requested role is in the known-roles registry; otherwise the
/// delegate's result is returned unchanged.
pub struct RunAsRoleMapper {
    delegate: Arc<dyn RoleMapper>,
    known_roles: RwLock<Arc<BTreeSet<String>>>,
    mutation: Mutex<()>,
    metrics: Option<AccessMetrics>,
}

impl RunAsRoleMapper {
    /// Wrap a delegate mapper. The known-roles registry starts out holding
    /// the standard role catalog.
    pub fn new(delegate: Arc<dyn RoleMapper>) -> Self {
        let known = StandardRole::ALL
            .iter()
            .map(|role| role.official_name().to_owned())
            .collect::<BTreeSet<_>>();
        Self {
            delegate,
            known_roles: RwLock::new(Arc::new(known)),
            mutation: Mutex::new(()),
            metrics: None,
        }
    }

    /// Record run-as grants and denials against the given metrics.
    pub fn with_metrics(mut self, metrics: AccessMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Register an additional role name callers may run as. Returns false
    /// when the name was already known.
    pub fn add_known_role(&self, name: impl AsRef<str>) -> bool {
        let _guard = self.mutation.lock();
        let official = official_form(name.as_ref());
        let current = self.known_roles.read().clone();
        if current.contains(&official) {
            return false;
        }
        let mut next = (*current).clone();
        next.insert(official);
        *self.known_roles.write() = Arc::new(next);
        true
    }

    /// Remove a role name from the known-roles registry. Returns false
    /// when the name was not known.
    pub fn remove_known_role(&self, name: impl AsRef<str>) -> bool {
        let _guard = self.mutation.lock();
        let official = official_form(name.as_ref());
        let current = self.known_roles.read().clone();
        if !current.contains(&official) {
            return false;
        }
        let mut next = (*current).clone();
        next.remove(&official);
        *self.known_roles.write() = Arc::new(next);
        true
    }

    /// The current known-roles snapshot.
    pub fn known_roles(&self) -> Arc<BTreeSet<String>> {
        self.known_roles.read().clone()
    }
}

impl RoleMapper for RunAsRoleMapper {
    fn map_roles(
        &self,
        caller: &Caller,
        environment: &CallEnvironment,
        action: &ManagementAction,
        target: &ActionTarget,
    ) -> Result<BTreeSet<String>, AuthzError> {
        let mapped = self
            .delegate
            .map_roles(caller, environment, action, target)?;
        let requested = action.run_as_roles();
        if requested.is_empty() {
            return Ok(mapped);
        }

        let is_superuser = mapped.contains(StandardRole::Superuser.official_name());
        let known = self.known_roles.read().clone();
        let mut granted = BTreeSet::new();
        for raw in requested {
            let name = match StandardRole::from_official(&raw) {
                Some(role) => role.official_name().to_owned(),
                None => official_form(&raw),
            };
            if is_superuser && known.contains(&name) {
                debug!(role = %name, operation = %action.operation(), "run-as grant");
                if let Some(metrics) = &self.metrics {
                    metrics.inc_run_as_grant();
                }
                granted.insert(name);
            } else {
                // Deliberately silent about whether the role exists: a
                // non-superuser probing for role names learns nothing.
                debug!(operation = %action.operation(), "run-as request ignored");
                if let Some(metrics) = &self.metrics {
                    metrics.inc_run_as_denial();
                }
            }
        }

        if granted.is_empty() {
            Ok(mapped)
        } else {
            // Replacement, not union: the caller sheds superuser for the
            // requested roles.
            Ok(granted)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ResourceAddress, TargetResource, ROLES_HEADER};
    use crate::role::{MatchBucket, RoleMapping};
    use crate::standard::ActionEffect;
    use crate::PrincipalMatcher;
    use serde_json::json;

    fn read_action() -> ManagementAction {
        ManagementAction::new("read-resource", [ActionEffect::ReadConfig])
    }

    fn root_target() -> ActionTarget {
        ActionTarget::Resource(TargetResource::new(ResourceAddress::root()))
    }

    fn mapper_with(catalog: RoleCatalog) -> StandardRoleMapper {
        StandardRoleMapper::new(Arc::new(catalog))
    }

    #[test]
    fn superuser_mapper_always_returns_superuser() {
        let mapper = SuperuserRoleMapper;
        let roles = mapper
            .map_roles(
                &Caller::in_vm(),
                &CallEnvironment::default(),
                &read_action(),
                &root_target(),
            )
            .unwrap();
        assert_eq!(roles.len(), 1);
        assert!(roles.contains("SUPERUSER"));
    }

    #[test]
    fn realm_role_without_mapping_is_granted() {
        // Scenario A: realm role "deployer", no configured mapping.
        let mapper = mapper_with(RoleCatalog::new());
        let caller = Caller::authenticated("anna").with_realm_roles(["deployer"]);
        let roles = mapper
            .map_roles(&caller, &CallEnvironment::default(), &read_action(), &root_target())
            .unwrap();
        assert_eq!(roles.into_iter().collect::<Vec<_>>(), vec!["DEPLOYER"]);
    }

    #[test]
    fn realm_role_dropped_by_exclusion() {
        // Scenario B: mapping with a matching exclusion consumes the realm role.
        let catalog = RoleCatalog::new();
        let mapping = RoleMapping::new("deployer");
        mapping.add_principal(PrincipalMatcher::user("anna"), MatchBucket::Exclude);
        catalog.register(mapping).unwrap();

        let mapper = mapper_with(catalog);
        let caller = Caller::authenticated("anna").with_realm_roles(["deployer"]);
        let roles = mapper
            .map_roles(&caller, &CallEnvironment::default(), &read_action(), &root_target())
            .unwrap();
        assert!(roles.is_empty());
    }

    #[test]
    fn consumed_mapping_is_skipped_by_generic_pass() {
        // The realm pass consumes DEPLOYER; the generic pass must not
        // re-grant it via include-all.
        let catalog = RoleCatalog::new();
        let mapping = RoleMapping::new("deployer");
        mapping.set_include_all(true);
        mapping.add_principal(PrincipalMatcher::user("anna"), MatchBucket::Exclude);
        catalog.register(mapping).unwrap();

        let mapper = mapper_with(catalog);
        let caller = Caller::authenticated("anna").with_realm_roles(["deployer"]);
        let roles = mapper
            .map_roles(&caller, &CallEnvironment::default(), &read_action(), &root_target())
            .unwrap();
        assert!(roles.is_empty());
    }

    #[test]
    fn generic_pass_grants_by_inclusion_and_include_all() {
        let catalog = RoleCatalog::new();
        let by_group = RoleMapping::new("maintainer");
        by_group.add_principal(PrincipalMatcher::group("ops"), MatchBucket::Include);
        catalog.register(by_group).unwrap();
        let everyone = RoleMapping::new("monitor");
        everyone.set_include_all(true);
        catalog.register(everyone).unwrap();
        let excluded = RoleMapping::new("administrator");
        excluded.set_include_all(true);
        excluded.add_principal(PrincipalMatcher::group("ops"), MatchBucket::Exclude);
        catalog.register(excluded).unwrap();

        let mapper = mapper_with(catalog);
        let caller = Caller::authenticated("anna").with_groups(["ops"]);
        let roles = mapper
            .map_roles(&caller, &CallEnvironment::default(), &read_action(), &root_target())
            .unwrap();
        assert!(roles.contains("MAINTAINER"));
        assert!(roles.contains("MONITOR"));
        assert!(!roles.contains("ADMINISTRATOR"));
    }

    #[test]
    fn disabled_realm_roles_only_run_generic_pass() {
        let catalog = RoleCatalog::new();
        let monitor = RoleMapping::new("monitor");
        monitor.set_include_all(true);
        catalog.register(monitor).unwrap();

        let mapper = mapper_with(catalog).with_realm_roles(false);
        let caller = Caller::authenticated("anna").with_realm_roles(["operator"]);
        let roles = mapper
            .map_roles(&caller, &CallEnvironment::default(), &read_action(), &root_target())
            .unwrap();
        assert_eq!(roles.into_iter().collect::<Vec<_>>(), vec!["MONITOR"]);
    }

    #[test]
    fn idempotent_for_unchanged_caller_and_configuration() {
        let catalog = RoleCatalog::new();
        let monitor = RoleMapping::new("monitor");
        monitor.set_include_all(true);
        catalog.register(monitor).unwrap();
        let mapper = mapper_with(catalog);
        let caller = Caller::authenticated("anna").with_realm_roles(["operator"]);

        let first = mapper
            .map_roles(&caller, &CallEnvironment::default(), &read_action(), &root_target())
            .unwrap();
        let second = mapper
            .map_roles(&caller, &CallEnvironment::default(), &read_action(), &root_target())
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn in_vm_call_granted_by_capability() {
        // Scenario C.
        let mapper =
            mapper_with(RoleCatalog::new()).with_in_vm_check(Arc::new(AllowInVmCalls));
        let roles = mapper
            .map_roles(
                &Caller::in_vm(),
                &CallEnvironment::default(),
                &read_action(),
                &root_target(),
            )
            .unwrap();
        assert_eq!(roles.into_iter().collect::<Vec<_>>(), vec!["SUPERUSER"]);
    }

    #[test]
    fn in_vm_call_denied_by_capability_fails() {
        // Scenario D.
        let mapper = mapper_with(RoleCatalog::new());
        let result = mapper.map_roles(
            &Caller::in_vm(),
            &CallEnvironment::default(),
            &read_action(),
            &root_target(),
        );
        assert!(matches!(result, Err(AuthzError::InVmAccessDenied)));
    }

    fn run_as_mapper() -> RunAsRoleMapper {
        RunAsRoleMapper::new(Arc::new(SuperuserRoleMapper))
    }

    #[test]
    fn run_as_replaces_superuser_result() {
        // Scenario E: superuser runs as monitor; result is replaced.
        let mapper = run_as_mapper();
        let action = read_action().with_header(ROLES_HEADER, json!("monitor"));
        let roles = mapper
            .map_roles(
                &Caller::authenticated("anna"),
                &CallEnvironment::default(),
                &action,
                &root_target(),
            )
            .unwrap();
        assert_eq!(roles.into_iter().collect::<Vec<_>>(), vec!["MONITOR"]);
    }

    #[test]
    fn run_as_denied_for_non_superuser() {
        // Scenario F: a monitor asking to run as administrator keeps its
        // own roles, silently.
        let catalog = RoleCatalog::new();
        let monitor = RoleMapping::new("monitor");
        monitor.set_include_all(true);
        catalog.register(monitor).unwrap();
        let delegate = Arc::new(mapper_with(catalog));
        let mapper = RunAsRoleMapper::new(delegate);

        let action = read_action().with_header(ROLES_HEADER, json!("administrator"));
        let roles = mapper
            .map_roles(
                &Caller::authenticated("anna"),
                &CallEnvironment::default(),
                &action,
                &root_target(),
            )
            .unwrap();
        assert_eq!(roles.into_iter().collect::<Vec<_>>(), vec!["MONITOR"]);
    }

    #[test]
    fn run_as_unknown_role_is_a_silent_no_op() {
        let mapper = run_as_mapper();
        let action = read_action().with_header(ROLES_HEADER, json!("mystery"));
        let roles = mapper
            .map_roles(
                &Caller::authenticated("anna"),
                &CallEnvironment::default(),
                &action,
                &root_target(),
            )
            .unwrap();
        assert_eq!(roles.into_iter().collect::<Vec<_>>(), vec!["SUPERUSER"]);
    }

    #[test]
    fn run_as_honours_extended_known_roles() {
        let mapper = run_as_mapper();
        assert!(mapper.add_known_role("primary-maintainer"));
        assert!(!mapper.add_known_role("Primary-Maintainer"));

        let action = read_action().with_header(ROLES_HEADER, json!(["primary-maintainer"]));
        let roles = mapper
            .map_roles(
                &Caller::authenticated("anna"),
                &CallEnvironment::default(),
                &action,
                &root_target(),
            )
            .unwrap();
        assert_eq!(
            roles.into_iter().collect::<Vec<_>>(),
            vec!["PRIMARY-MAINTAINER"]
        );

        assert!(mapper.remove_known_role("primary-maintainer"));
        assert!(!mapper.remove_known_role("primary-maintainer"));
    }

    #[test]
    fn run_as_grants_multiple_known_roles() {
        let mapper = run_as_mapper();
        let action = read_action().with_header(ROLES_HEADER, json!(["monitor", "operator"]));
        let roles = mapper
            .map_roles(
                &Caller::authenticated("anna"),
                &CallEnvironment::default(),
                &action,
                &root_target(),
            )
            .unwrap();
        assert_eq!(roles.len(), 2);
        assert!(roles.contains("MONITOR"));
        assert!(roles.contains("OPERATOR"));
    }
}
