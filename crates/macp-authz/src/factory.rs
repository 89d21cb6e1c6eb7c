//! ---
//! macp_section: "03-security-access-control"
//! macp_subsection: "module"
//! macp_type: "source"
//! macp_scope: "code"
//! macp_description: "Role-based authorization core for management operations."
//! macp_version: "v0.0.0-prealpha"
//! macp_owner: "tbd"
//! ---
//! The permission factory resolves a caller's granted permissions and an
//! action's required permissions against an immutable, lazily rebuilt
//! snapshot of the role catalog and constraint factory set.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use macp_common::config::AccessControlConfig;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::action::{ActionTarget, ManagementAction};
use crate::caller::{CallEnvironment, Caller};
use crate::constraint::{builtin_factories, ConstraintFactory, ScopedRoleConstraintFactory};
use crate::errors::AuthzError;
use crate::mapper::RoleMapper;
use crate::metrics::AccessMetrics;
use crate::permission::{
    CombinationPolicy, CombinedPermission, ManagementPermission, PermissionCollection,
    SimplePermission,
};
use crate::scoped::ScopedRole;
use crate::standard::{official_form, ActionEffect, StandardRole};

/// Immutable materialization of all role-to-permission mappings plus the
/// role-set decision cache. Published atomically; never mutated in place
/// apart from the interior memoization cache.
pub struct PermsHolder {
    permissions_by_role: HashMap<String, Arc<PermissionCollection>>,
    by_role_set: RwLock<HashMap<BTreeSet<String>, Arc<PermissionCollection>>>,
    ordered_factories: Vec<Arc<dyn ConstraintFactory>>,
    scoping_index: usize,
}

impl PermsHolder {
    /// The permission collection for one role name (official form).
    pub fn role_permissions(&self, name: &str) -> Option<Arc<PermissionCollection>> {
        self.permissions_by_role.get(name).cloned()
    }

    /// The constraint factories in their name-ordered slot positions.
    pub fn ordered_factories(&self) -> &[Arc<dyn ConstraintFactory>] {
        &self.ordered_factories
    }

    /// The slot index assigned to the scoping constraint factory.
    pub fn scoping_index(&self) -> usize {
        self.scoping_index
    }
}

/// Outcome of an authorization check. Denial is an ordinary value here,
/// not an error; errors signal configuration or policy problems.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionOutcome {
    /// The granted permissions imply every required permission.
    Granted,
    /// At least one required permission is not implied.
    Denied,
}

impl DecisionOutcome {
    /// Stable textual form used in logs and the audit trail.
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionOutcome::Granted => "granted",
            DecisionOutcome::Denied => "denied",
        }
    }
}

/// The result of [`PermissionFactory::check_authorization`].
#[derive(Debug, Clone)]
pub struct AccessDecision {
    /// Whether the request is authorized.
    pub outcome: DecisionOutcome,
    /// The role names the caller resolved to.
    pub roles: BTreeSet<String>,
}

impl AccessDecision {
    /// Whether the request is authorized.
    pub fn is_granted(&self) -> bool {
        self.outcome == DecisionOutcome::Granted
    }
}

/// Turns callers and actions into permission collections, caching per
/// exact role-name set inside the current snapshot.
///
/// Administrative mutations (scoped roles, constraint factories, policy)
/// serialize on one mutex and invalidate the snapshot; authorization reads
/// never take that mutex once a snapshot exists.
pub struct PermissionFactory {
    role_mapper: Arc<dyn RoleMapper>,
    policy: RwLock<CombinationPolicy>,
    factories: RwLock<Vec<Arc<dyn ConstraintFactory>>>,
    scoped_roles: RwLock<HashMap<String, ScopedRole>>,
    holder: RwLock<Option<Arc<PermsHolder>>>,
    mutation: Mutex<()>,
    metrics: Option<AccessMetrics>,
}

impl PermissionFactory {
    /// Build a factory over the given role mapper with the built-in
    /// constraint factories and the permissive combination policy.
    pub fn new(role_mapper: Arc<dyn RoleMapper>) -> Self {
        let mut factories = builtin_factories();
        factories.sort_by_key(|factory| factory.name());
        Self {
            role_mapper,
            policy: RwLock::new(CombinationPolicy::Permissive),
            factories: RwLock::new(factories),
            scoped_roles: RwLock::new(HashMap::new()),
            holder: RwLock::new(None),
            mutation: Mutex::new(()),
            metrics: None,
        }
    }

    /// Select the combination policy at construction time.
    pub fn with_policy(self, policy: CombinationPolicy) -> Self {
        *self.policy.write() = policy;
        self
    }

    /// Record factory activity against the given metrics.
    pub fn with_metrics(mut self, metrics: AccessMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build a factory from loaded configuration: combination policy plus
    /// host- and server-group-scoped role definitions.
    pub fn from_config(
        config: &AccessControlConfig,
        role_mapper: Arc<dyn RoleMapper>,
    ) -> Result<Self, AuthzError> {
        let factory = Self::new(role_mapper).with_policy(config.combination_policy);
        for (name, definition) in &config.host_scoped_roles {
            let base = StandardRole::from_official(&definition.base_role).ok_or_else(|| {
                AuthzError::UnknownBaseRole {
                    role: official_form(name),
                    base: definition.base_role.clone(),
                }
            })?;
            factory.scoped_role_added(ScopedRole::host_scoped(
                name,
                base,
                definition.scope.iter().cloned(),
            ))?;
        }
        for (name, definition) in &config.server_group_scoped_roles {
            let base = StandardRole::from_official(&definition.base_role).ok_or_else(|| {
                AuthzError::UnknownBaseRole {
                    role: official_form(name),
                    base: definition.base_role.clone(),
                }
            })?;
            factory.scoped_role_added(ScopedRole::server_group_scoped(
                name,
                base,
                definition.scope.iter().cloned(),
            ))?;
        }
        Ok(factory)
    }

    /// The active combination policy.
    pub fn combination_policy(&self) -> CombinationPolicy {
        *self.policy.read()
    }

    /// Change the combination policy. Invalidates the snapshot, since the
    /// role-set cache bakes the policy into its combined collections.
    pub fn set_combination_policy(&self, policy: CombinationPolicy) {
        let _guard = self.mutation.lock();
        *self.policy.write() = policy;
        self.invalidate();
    }

    /// Register an additional constraint factory. The factory is slotted
    /// into the name-ordered list; its index stays stable for the lifetime
    /// of each snapshot built after registration.
    pub fn register_constraint_factory(
        &self,
        factory: Arc<dyn ConstraintFactory>,
    ) -> Result<(), AuthzError> {
        let _guard = self.mutation.lock();
        {
            let mut factories = self.factories.write();
            if factories.iter().any(|f| f.name() == factory.name()) {
                return Err(AuthzError::DuplicateConstraintFactory(
                    factory.name().to_owned(),
                ));
            }
            factories.push(factory);
            factories.sort_by_key(|f| f.name());
        }
        self.invalidate();
        Ok(())
    }

    /// Register a scoped role. Fails on a name collision with a standard
    /// role or an existing scoped role.
    pub fn scoped_role_added(&self, scoped_role: ScopedRole) -> Result<(), AuthzError> {
        let _guard = self.mutation.lock();
        let name = scoped_role.name().to_owned();
        if StandardRole::from_official(&name).is_some() {
            return Err(AuthzError::DuplicateRole(name));
        }
        {
            let mut scoped = self.scoped_roles.write();
            if scoped.contains_key(&name) {
                return Err(AuthzError::DuplicateRole(name));
            }
            debug!(role = %name, base = %scoped_role.base().official_name(), "scoped role registered");
            scoped.insert(name, scoped_role);
        }
        self.invalidate();
        Ok(())
    }

    /// Remove a scoped role by name. Standard roles are not removable;
    /// removing an unregistered name is an error.
    pub fn scoped_role_removed(&self, name: &str) -> Result<ScopedRole, AuthzError> {
        let _guard = self.mutation.lock();
        let official = official_form(name);
        if StandardRole::from_official(&official).is_some() {
            return Err(AuthzError::StandardRoleImmutable(official));
        }
        let removed = self
            .scoped_roles
            .write()
            .remove(&official)
            .ok_or_else(|| AuthzError::UnknownRole(official.clone()))?;
        debug!(role = %official, "scoped role removed");
        self.invalidate();
        Ok(removed)
    }

    /// Look up a registered scoped role.
    pub fn scoped_role(&self, name: &str) -> Option<ScopedRole> {
        self.scoped_roles.read().get(&official_form(name)).cloned()
    }

    /// The permissions granted to the caller for this request: role
    /// mapping followed by cached role-set combination.
    pub fn user_permissions(
        &self,
        caller: &Caller,
        environment: &CallEnvironment,
        action: &ManagementAction,
        target: &ActionTarget,
    ) -> Result<Arc<PermissionCollection>, AuthzError> {
        let roles = self
            .role_mapper
            .map_roles(caller, environment, action, target)?;
        if let Some(metrics) = &self.metrics {
            metrics.inc_role_resolution();
        }
        self.permissions_for_role_set(&roles)
    }

    /// The permissions the action requires, one per declared effect, each
    /// bundling the required constraint from every factory in slot order.
    pub fn required_permissions(
        &self,
        action: &ManagementAction,
        target: &ActionTarget,
    ) -> PermissionCollection {
        let holder = self.current_holder();
        let mut collection = PermissionCollection::new();
        for effect in action.effects() {
            let constraints = holder
                .ordered_factories
                .iter()
                .map(|factory| factory.required_constraint(*effect, action, target))
                .collect();
            collection.insert(ManagementPermission::Simple(SimplePermission::new(
                *effect,
                constraints,
            )));
        }
        collection
    }

    /// Resolve and authorize in one step: map roles, resolve granted
    /// permissions, derive required permissions, and compare.
    pub fn check_authorization(
        &self,
        caller: &Caller,
        environment: &CallEnvironment,
        action: &ManagementAction,
        target: &ActionTarget,
    ) -> Result<AccessDecision, AuthzError> {
        let roles = self
            .role_mapper
            .map_roles(caller, environment, action, target)?;
        if let Some(metrics) = &self.metrics {
            metrics.inc_role_resolution();
        }
        let granted = self.permissions_for_role_set(&roles)?;
        let required = self.required_permissions(action, target);
        let outcome = if granted.implies_all(&required) {
            DecisionOutcome::Granted
        } else {
            if let Some(metrics) = &self.metrics {
                metrics.inc_access_denial();
            }
            debug!(
                caller = caller.display_name().unwrap_or("in-vm"),
                operation = %action.operation(),
                target = %target.describe(),
                "authorization denied"
            );
            DecisionOutcome::Denied
        };
        Ok(AccessDecision { outcome, roles })
    }

    /// Resolve the combined permission collection for an exact role-name
    /// set, consulting and populating the snapshot's role-set cache.
    pub fn permissions_for_role_set(
        &self,
        roles: &BTreeSet<String>,
    ) -> Result<Arc<PermissionCollection>, AuthzError> {
        let roles: BTreeSet<String> = roles.iter().map(|name| official_form(name)).collect();
        let holder = self.current_holder();
        if let Some(hit) = holder.by_role_set.read().get(&roles).cloned() {
            if let Some(metrics) = &self.metrics {
                metrics.inc_cache_hit();
            }
            return Ok(hit);
        }
        if let Some(metrics) = &self.metrics {
            metrics.inc_cache_miss();
        }
        let combined = self.combine(&holder, &roles)?;
        // Insert-if-absent: a racing thread may have computed the same
        // collection; first write wins and both results are equivalent.
        let mut cache = holder.by_role_set.write();
        let entry = cache.entry(roles).or_insert(combined);
        Ok(entry.clone())
    }

    fn combine(
        &self,
        holder: &PermsHolder,
        roles: &BTreeSet<String>,
    ) -> Result<Arc<PermissionCollection>, AuthzError> {
        if roles.is_empty() {
            return Ok(Arc::new(PermissionCollection::new()));
        }
        if roles.len() == 1 {
            let name = roles.iter().next().expect("non-empty role set");
            return holder
                .permissions_by_role
                .get(name)
                .cloned()
                .ok_or_else(|| AuthzError::UnknownRole(name.clone()));
        }
        match self.combination_policy() {
            CombinationPolicy::Rejecting => Err(AuthzError::MultipleRolesRejected(
                roles.iter().cloned().collect(),
            )),
            CombinationPolicy::Permissive => {
                let mut by_effect: BTreeMap<ActionEffect, CombinedPermission> = BTreeMap::new();
                for name in roles {
                    let collection = holder
                        .permissions_by_role
                        .get(name)
                        .ok_or_else(|| AuthzError::UnknownRole(name.clone()))?;
                    for permission in collection.iter() {
                        let slot = by_effect
                            .entry(permission.effect())
                            .or_insert_with(|| CombinedPermission::new(permission.effect()));
                        match permission {
                            ManagementPermission::Simple(simple) => slot.push(simple.clone()),
                            ManagementPermission::Combined(combined) => {
                                for simple in combined.underlying() {
                                    slot.push(simple.clone());
                                }
                            }
                        }
                    }
                }
                let mut collection = PermissionCollection::new();
                for combined in by_effect.into_values() {
                    collection.insert(ManagementPermission::Combined(combined));
                }
                Ok(Arc::new(collection))
            }
        }
    }

    /// The current snapshot, building it when stale. The fast path is a
    /// read-lock Arc clone; building serializes on the mutation mutex with
    /// a double-check so concurrent readers trigger one rebuild.
    fn current_holder(&self) -> Arc<PermsHolder> {
        if let Some(holder) = self.holder.read().clone() {
            return holder;
        }
        let _guard = self.mutation.lock();
        if let Some(holder) = self.holder.read().clone() {
            return holder;
        }
        let built = Arc::new(self.build_holder());
        *self.holder.write() = Some(built.clone());
        if let Some(metrics) = &self.metrics {
            metrics.inc_snapshot_rebuild();
        }
        built
    }

    fn invalidate(&self) {
        *self.holder.write() = None;
    }

    fn build_holder(&self) -> PermsHolder {
        let factories = self.factories.read().clone();
        let scoped = self.scoped_roles.read().clone();
        let scoping_index = factories
            .iter()
            .position(|factory| factory.name() == ScopedRoleConstraintFactory::NAME)
            .expect("scoping constraint factory registered at construction");

        let mut permissions_by_role: HashMap<String, Arc<PermissionCollection>> = HashMap::new();
        for role in StandardRole::ALL {
            let mut collection = PermissionCollection::new();
            for effect in role.allowed_effects() {
                let constraints = factories
                    .iter()
                    .map(|factory| factory.standard_user_constraint(role, *effect))
                    .collect();
                collection.insert(ManagementPermission::Simple(SimplePermission::new(
                    *effect,
                    constraints,
                )));
            }
            permissions_by_role.insert(role.official_name().to_owned(), Arc::new(collection));
        }

        // Scoped roles are synthesized after every standard role exists:
        // each effect combines the narrowed base permission with the
        // monitor-derived out-of-scope read fallback, any-grants.
        for (name, scoped_role) in &scoped {
            let base = permissions_by_role
                .get(scoped_role.base().official_name())
                .cloned()
                .expect("standard role collections built above");
            let monitor = permissions_by_role
                .get(StandardRole::Monitor.official_name())
                .cloned()
                .expect("standard role collections built above");
            let mut collection = PermissionCollection::new();
            for effect in scoped_role.base().allowed_effects() {
                let mut combined = CombinedPermission::new(*effect);
                if let Some(ManagementPermission::Simple(permission)) = base.get(*effect) {
                    combined.push(permission.with_constraint_at(
                        scoping_index,
                        Arc::new(scoped_role.constraint().clone()),
                    ));
                }
                if StandardRole::Monitor.allows(*effect) {
                    if let Some(ManagementPermission::Simple(permission)) = monitor.get(*effect) {
                        combined.push(permission.with_constraint_at(
                            scoping_index,
                            Arc::new(scoped_role.constraint().out_of_scope_read()),
                        ));
                    }
                }
                collection.insert(ManagementPermission::Combined(combined));
            }
            permissions_by_role.insert(name.clone(), Arc::new(collection));
        }

        debug!(
            roles = permissions_by_role.len(),
            factories = factories.len(),
            "permission snapshot rebuilt"
        );
        PermsHolder {
            permissions_by_role,
            by_role_set: RwLock::new(HashMap::new()),
            ordered_factories: factories,
            scoping_index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ResourceAddress, SensitivityClassification, TargetResource};
    use crate::mapper::SuperuserRoleMapper;

    fn factory() -> PermissionFactory {
        PermissionFactory::new(Arc::new(SuperuserRoleMapper))
    }

    fn roles(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    fn action(effects: &[ActionEffect]) -> ManagementAction {
        ManagementAction::new("test-operation", effects.iter().copied())
    }

    fn host_target(host: &str) -> ActionTarget {
        ActionTarget::Resource(TargetResource::new(ResourceAddress::new([
            ("host", host),
            ("subsystem", "datasources"),
        ])))
    }

    fn domain_target() -> ActionTarget {
        ActionTarget::Resource(TargetResource::new(ResourceAddress::new([(
            "subsystem",
            "datasources",
        )])))
    }

    fn is_implied(factory: &PermissionFactory, role_set: &BTreeSet<String>, action: &ManagementAction, target: &ActionTarget) -> bool {
        let granted = factory.permissions_for_role_set(role_set).unwrap();
        let required = factory.required_permissions(action, target);
        granted.implies_all(&required)
    }

    #[test]
    fn role_set_cache_returns_identical_collection() {
        let factory = factory();
        let first = factory.permissions_for_role_set(&roles(&["MONITOR"])).unwrap();
        let second = factory.permissions_for_role_set(&roles(&["monitor"])).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn unknown_role_is_a_hard_error() {
        let factory = factory();
        assert!(matches!(
            factory.permissions_for_role_set(&roles(&["GHOST"])),
            Err(AuthzError::UnknownRole(name)) if name == "GHOST"
        ));
        assert!(matches!(
            factory.permissions_for_role_set(&roles(&["MONITOR", "GHOST"])),
            Err(AuthzError::UnknownRole(_))
        ));
    }

    #[test]
    fn rejecting_policy_fails_any_multi_role_set() {
        let factory = factory().with_policy(CombinationPolicy::Rejecting);
        assert!(factory.permissions_for_role_set(&roles(&["MONITOR"])).is_ok());
        let result = factory.permissions_for_role_set(&roles(&["MONITOR", "OPERATOR"]));
        assert!(matches!(result, Err(AuthzError::MultipleRolesRejected(_))));
    }

    #[test]
    fn permissive_policy_unions_role_grants() {
        let factory = factory();
        let write_runtime = action(&[ActionEffect::WriteRuntime]);
        let target = domain_target();

        assert!(!is_implied(&factory, &roles(&["MONITOR"]), &write_runtime, &target));
        assert!(is_implied(&factory, &roles(&["OPERATOR"]), &write_runtime, &target));
        assert!(is_implied(
            &factory,
            &roles(&["MONITOR", "OPERATOR"]),
            &write_runtime,
            &target
        ));
    }

    #[test]
    fn empty_role_set_grants_nothing() {
        let factory = factory();
        let granted = factory.permissions_for_role_set(&BTreeSet::new()).unwrap();
        assert!(granted.is_empty());
        let required = factory.required_permissions(&action(&[ActionEffect::ReadConfig]), &domain_target());
        assert!(!granted.implies_all(&required));
    }

    #[test]
    fn sensitive_writes_require_administrator() {
        let factory = factory();
        let write = action(&[ActionEffect::WriteConfig]);
        let target = ActionTarget::Resource(
            TargetResource::new(ResourceAddress::new([("subsystem", "datasources")]))
                .with_sensitivity(SensitivityClassification::read_write("credential")),
        );

        assert!(!is_implied(&factory, &roles(&["MAINTAINER"]), &write, &target));
        assert!(is_implied(&factory, &roles(&["ADMINISTRATOR"]), &write, &target));
        assert!(is_implied(&factory, &roles(&["SUPERUSER"]), &write, &target));
    }

    #[test]
    fn deployer_writes_only_application_resources() {
        let factory = factory();
        let write = action(&[ActionEffect::WriteConfig]);
        let application = ActionTarget::Resource(
            TargetResource::new(ResourceAddress::new([("deployment", "app.war")]))
                .with_application(true),
        );

        assert!(is_implied(&factory, &roles(&["DEPLOYER"]), &write, &application));
        assert!(!is_implied(&factory, &roles(&["DEPLOYER"]), &write, &domain_target()));
        assert!(is_implied(&factory, &roles(&["MAINTAINER"]), &write, &domain_target()));
    }

    #[test]
    fn audit_resources_restricted_to_auditor() {
        let factory = factory();
        let read = action(&[ActionEffect::ReadConfig]);
        let target = ActionTarget::Resource(
            TargetResource::new(ResourceAddress::new([("core-service", "audit")]))
                .with_audit(true),
        );

        assert!(!is_implied(&factory, &roles(&["MONITOR"]), &read, &target));
        assert!(is_implied(&factory, &roles(&["AUDITOR"]), &read, &target));
    }

    #[test]
    fn scoped_role_narrows_writes_and_keeps_out_of_scope_reads() {
        let factory = factory();
        factory
            .scoped_role_added(ScopedRole::host_scoped(
                "primary-maintainer",
                StandardRole::Maintainer,
                ["primary"],
            ))
            .unwrap();
        let scoped = roles(&["PRIMARY-MAINTAINER"]);
        let write = action(&[ActionEffect::WriteConfig]);
        let read = action(&[ActionEffect::ReadConfig]);

        assert!(is_implied(&factory, &scoped, &write, &host_target("primary")));
        assert!(!is_implied(&factory, &scoped, &write, &host_target("backup")));
        assert!(!is_implied(&factory, &scoped, &write, &domain_target()));
        assert!(is_implied(&factory, &scoped, &read, &host_target("primary")));
        // Monitor-level fallback outside the scope.
        assert!(is_implied(&factory, &scoped, &read, &host_target("backup")));
        assert!(is_implied(&factory, &scoped, &read, &domain_target()));
    }

    #[test]
    fn scoped_role_lifecycle_errors() {
        let factory = factory();
        let scoped = ScopedRole::host_scoped("primary-ops", StandardRole::Operator, ["primary"]);
        factory.scoped_role_added(scoped.clone()).unwrap();

        assert!(matches!(
            factory.scoped_role_added(scoped.clone()),
            Err(AuthzError::DuplicateRole(_))
        ));
        assert!(matches!(
            factory.scoped_role_added(ScopedRole::host_scoped(
                "monitor",
                StandardRole::Monitor,
                ["primary"]
            )),
            Err(AuthzError::DuplicateRole(_))
        ));
        assert!(matches!(
            factory.scoped_role_removed("monitor"),
            Err(AuthzError::StandardRoleImmutable(_))
        ));
        assert!(matches!(
            factory.scoped_role_removed("nothing-here"),
            Err(AuthzError::UnknownRole(_))
        ));
        assert!(factory.scoped_role("primary-ops").is_some());
        factory.scoped_role_removed("primary-ops").unwrap();
        assert!(factory.scoped_role("primary-ops").is_none());
    }

    #[test]
    fn mutation_invalidates_the_snapshot() {
        let factory = factory();
        let before = factory.permissions_for_role_set(&roles(&["MONITOR"])).unwrap();
        factory
            .scoped_role_added(ScopedRole::host_scoped(
                "primary-monitor",
                StandardRole::Monitor,
                ["primary"],
            ))
            .unwrap();
        // New snapshot generation: the cached collection is rebuilt and the
        // newly registered role resolves.
        let after = factory.permissions_for_role_set(&roles(&["MONITOR"])).unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert!(factory
            .permissions_for_role_set(&roles(&["PRIMARY-MONITOR"]))
            .is_ok());
    }

    #[test]
    fn required_permissions_cover_declared_effects() {
        let factory = factory();
        let action = action(&[ActionEffect::ReadConfig, ActionEffect::WriteConfig]);
        let required = factory.required_permissions(&action, &domain_target());
        assert_eq!(required.len(), 2);
        assert!(required.get(ActionEffect::ReadConfig).is_some());
        assert!(required.get(ActionEffect::Access).is_none());
    }

    #[test]
    fn duplicate_constraint_factory_is_rejected() {
        let factory = factory();
        let result = factory.register_constraint_factory(Arc::new(ScopedRoleConstraintFactory));
        assert!(matches!(
            result,
            Err(AuthzError::DuplicateConstraintFactory(_))
        ));
    }

    #[test]
    fn check_authorization_maps_and_compares() {
        let factory = factory();
        let decision = factory
            .check_authorization(
                &Caller::authenticated("anna"),
                &CallEnvironment::default(),
                &action(&[ActionEffect::WriteConfig]),
                &domain_target(),
            )
            .unwrap();
        assert!(decision.is_granted());
        assert!(decision.roles.contains("SUPERUSER"));
        assert_eq!(decision.outcome.as_str(), "granted");
    }

    #[test]
    fn from_config_builds_scoped_roles_and_policy() {
        let raw = r#"
            combination_policy = "rejecting"

            [host_scoped_roles.primary-maintainer]
            base_role = "Maintainer"
            scope = ["primary"]

            [server_group_scoped_roles.main-group-ops]
            base_role = "Operator"
            scope = ["main-group"]
        "#;
        let config: AccessControlConfig = raw.parse().unwrap();
        let factory = PermissionFactory::from_config(&config, Arc::new(SuperuserRoleMapper)).unwrap();
        assert_eq!(factory.combination_policy(), CombinationPolicy::Rejecting);
        assert!(factory.scoped_role("primary-maintainer").is_some());
        assert!(factory.scoped_role("MAIN-GROUP-OPS").is_some());

        let raw = r#"
            [host_scoped_roles.broken]
            base_role = "Janitor"
            scope = ["primary"]
        "#;
        let config: AccessControlConfig = raw.parse().unwrap();
        let result = PermissionFactory::from_config(&config, Arc::new(SuperuserRoleMapper));
        assert!(matches!(result, Err(AuthzError::UnknownBaseRole { .. })));
    }

    #[test]
    fn policy_change_invalidates_cached_combinations() {
        let factory = factory();
        assert!(factory
            .permissions_for_role_set(&roles(&["MONITOR", "OPERATOR"]))
            .is_ok());
        factory.set_combination_policy(CombinationPolicy::Rejecting);
        assert!(matches!(
            factory.permissions_for_role_set(&roles(&["MONITOR", "OPERATOR"])),
            Err(AuthzError::MultipleRolesRejected(_))
        ));
    }
}
