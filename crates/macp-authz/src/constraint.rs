//! ---
//! macp_section: "03-security-access-control"
//! macp_subsection: "module"
//! macp_type: "source"
//! macp_scope: "code"
//! macp_description: "Role-based authorization core for management operations."
//! macp_version: "v0.0.0-prealpha"
//! macp_owner: "tbd"
//! ---
//! Constraint values narrow a permission's applicability beyond the
//! coarse action-effect table. Each registered [`ConstraintFactory`]
//! contributes one constraint slot per permission; slots are identified by
//! the factory's position in the name-ordered factory list, so the indices
//! stay stable for the lifetime of a permission snapshot.

use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::action::{ActionTarget, ManagementAction};
use crate::scoped::ScopingConstraint;
use crate::standard::{ActionEffect, StandardRole};

/// A single constraint value carried in one slot of a permission.
///
/// Constraints compare pairwise: the user-side constraint at slot `i` is
/// checked against the required-side constraint at slot `i`. A constraint
/// of a different concrete type never violates (the slot discipline makes
/// that case unreachable in practice).
pub trait Constraint: fmt::Debug + Send + Sync {
    /// Downcast support for pairwise comparison.
    fn as_any(&self) -> &dyn Any;

    /// Whether this user-side constraint forbids what `required` describes
    /// for the given effect.
    fn violates(&self, required: &dyn Constraint, effect: ActionEffect) -> bool;
}

/// Producer of constraint values for one concern (sensitivity, scoping,
/// audit, application typing). Factories are externally registered and
/// totally ordered by [`ConstraintFactory::name`].
pub trait ConstraintFactory: Send + Sync {
    /// Stable name; doubles as the total-order key assigning the factory
    /// its constraint slot.
    fn name(&self) -> &'static str;

    /// The constraint a standard role carries for the given effect.
    fn standard_user_constraint(
        &self,
        role: StandardRole,
        effect: ActionEffect,
    ) -> Arc<dyn Constraint>;

    /// The constraint a given action/target demands for the given effect.
    fn required_constraint(
        &self,
        effect: ActionEffect,
        action: &ManagementAction,
        target: &ActionTarget,
    ) -> Arc<dyn Constraint>;
}

/// Sensitive-data constraint: protects classified resources and attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensitivityConstraint {
    allows_sensitive: bool,
    is_sensitive: bool,
}

impl SensitivityConstraint {
    /// User-side value: whether the role may touch sensitive data.
    pub fn user(allows_sensitive: bool) -> Self {
        Self {
            allows_sensitive,
            is_sensitive: false,
        }
    }

    /// Required-side value: whether the target is sensitive for the effect.
    pub fn required(is_sensitive: bool) -> Self {
        Self {
            allows_sensitive: false,
            is_sensitive,
        }
    }
}

impl Constraint for SensitivityConstraint {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn violates(&self, required: &dyn Constraint, _effect: ActionEffect) -> bool {
        match required.as_any().downcast_ref::<SensitivityConstraint>() {
            Some(required) => required.is_sensitive && !self.allows_sensitive,
            None => false,
        }
    }
}

/// Factory for [`SensitivityConstraint`] values.
#[derive(Debug, Default)]
pub struct SensitivityConstraintFactory;

impl SensitivityConstraintFactory {
    /// Ordering name of this factory.
    pub const NAME: &'static str = "sensitivity";
}

impl ConstraintFactory for SensitivityConstraintFactory {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn standard_user_constraint(
        &self,
        role: StandardRole,
        effect: ActionEffect,
    ) -> Arc<dyn Constraint> {
        let allows = if effect.is_write() {
            matches!(role, StandardRole::Administrator | StandardRole::Superuser)
        } else {
            matches!(
                role,
                StandardRole::Administrator | StandardRole::Superuser | StandardRole::Auditor
            )
        };
        Arc::new(SensitivityConstraint::user(allows))
    }

    fn required_constraint(
        &self,
        effect: ActionEffect,
        _action: &ManagementAction,
        target: &ActionTarget,
    ) -> Arc<dyn Constraint> {
        let sensitive = target
            .effective_sensitivity()
            .map(|classification| {
                if effect.is_write() {
                    classification.sensitive_write
                } else {
                    classification.sensitive_read
                }
            })
            .unwrap_or(false);
        Arc::new(SensitivityConstraint::required(sensitive))
    }
}

/// Application-typing constraint: limits the deployer role's writes to
/// application resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationConstraint {
    applications_only: bool,
    is_application: bool,
}

impl ApplicationConstraint {
    /// User-side value: whether the role's writes are limited to
    /// application resources.
    pub fn user(applications_only: bool) -> Self {
        Self {
            applications_only,
            is_application: false,
        }
    }

    /// Required-side value: whether the target is an application resource.
    pub fn required(is_application: bool) -> Self {
        Self {
            applications_only: false,
            is_application,
        }
    }
}

impl Constraint for ApplicationConstraint {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn violates(&self, required: &dyn Constraint, _effect: ActionEffect) -> bool {
        match required.as_any().downcast_ref::<ApplicationConstraint>() {
            Some(required) => self.applications_only && !required.is_application,
            None => false,
        }
    }
}

/// Factory for [`ApplicationConstraint`] values.
#[derive(Debug, Default)]
pub struct ApplicationTypeConstraintFactory;

impl ApplicationTypeConstraintFactory {
    /// Ordering name of this factory.
    pub const NAME: &'static str = "application";
}

impl ConstraintFactory for ApplicationTypeConstraintFactory {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn standard_user_constraint(
        &self,
        role: StandardRole,
        effect: ActionEffect,
    ) -> Arc<dyn Constraint> {
        let applications_only = role == StandardRole::Deployer && effect.is_write();
        Arc::new(ApplicationConstraint::user(applications_only))
    }

    fn required_constraint(
        &self,
        _effect: ActionEffect,
        _action: &ManagementAction,
        target: &ActionTarget,
    ) -> Arc<dyn Constraint> {
        Arc::new(ApplicationConstraint::required(
            target.resource().is_application(),
        ))
    }
}

/// Audit-subsystem constraint: the audit configuration is visible and
/// writable only to the auditor and superuser roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditConstraint {
    allows_audit: bool,
    is_audit: bool,
}

impl AuditConstraint {
    /// User-side value: whether the role may touch the audit subsystem.
    pub fn user(allows_audit: bool) -> Self {
        Self {
            allows_audit,
            is_audit: false,
        }
    }

    /// Required-side value: whether the target is an audit resource.
    pub fn required(is_audit: bool) -> Self {
        Self {
            allows_audit: false,
            is_audit,
        }
    }
}

impl Constraint for AuditConstraint {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn violates(&self, required: &dyn Constraint, _effect: ActionEffect) -> bool {
        match required.as_any().downcast_ref::<AuditConstraint>() {
            Some(required) => required.is_audit && !self.allows_audit,
            None => false,
        }
    }
}

/// Factory for [`AuditConstraint`] values.
#[derive(Debug, Default)]
pub struct AuditConstraintFactory;

impl AuditConstraintFactory {
    /// Ordering name of this factory.
    pub const NAME: &'static str = "audit";
}

impl ConstraintFactory for AuditConstraintFactory {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn standard_user_constraint(
        &self,
        role: StandardRole,
        _effect: ActionEffect,
    ) -> Arc<dyn Constraint> {
        let allows = matches!(role, StandardRole::Auditor | StandardRole::Superuser);
        Arc::new(AuditConstraint::user(allows))
    }

    fn required_constraint(
        &self,
        _effect: ActionEffect,
        _action: &ManagementAction,
        target: &ActionTarget,
    ) -> Arc<dyn Constraint> {
        Arc::new(AuditConstraint::required(target.resource().is_audit()))
    }
}

/// Required-side scope coordinates: the hosts and server groups a target
/// address touches. Compared against [`ScopingConstraint`] user values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredScopeConstraint {
    hosts: BTreeSet<String>,
    server_groups: BTreeSet<String>,
}

impl RequiredScopeConstraint {
    /// Build from explicit coordinates.
    pub fn new(hosts: BTreeSet<String>, server_groups: BTreeSet<String>) -> Self {
        Self {
            hosts,
            server_groups,
        }
    }

    /// The host names the target touches.
    pub fn hosts(&self) -> &BTreeSet<String> {
        &self.hosts
    }

    /// The server group names the target touches.
    pub fn server_groups(&self) -> &BTreeSet<String> {
        &self.server_groups
    }
}

impl Constraint for RequiredScopeConstraint {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn violates(&self, _required: &dyn Constraint, _effect: ActionEffect) -> bool {
        // Required-side values only ever appear on the right-hand side.
        false
    }
}

/// Factory assigning the scoping slot. Standard roles are unscoped; scoped
/// roles substitute their [`ScopingConstraint`] into this factory's slot.
#[derive(Debug, Default)]
pub struct ScopedRoleConstraintFactory;

impl ScopedRoleConstraintFactory {
    /// Ordering name of this factory.
    pub const NAME: &'static str = "scope";

    /// Address path key naming a host.
    pub const HOST_KEY: &'static str = "host";
    /// Address path key naming a server group.
    pub const SERVER_GROUP_KEY: &'static str = "server-group";
}

impl ConstraintFactory for ScopedRoleConstraintFactory {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn standard_user_constraint(
        &self,
        _role: StandardRole,
        _effect: ActionEffect,
    ) -> Arc<dyn Constraint> {
        Arc::new(ScopingConstraint::unscoped())
    }

    fn required_constraint(
        &self,
        _effect: ActionEffect,
        _action: &ManagementAction,
        target: &ActionTarget,
    ) -> Arc<dyn Constraint> {
        let address = target.address();
        let hosts = address
            .values_of(Self::HOST_KEY)
            .into_iter()
            .map(str::to_owned)
            .collect();
        let server_groups = address
            .values_of(Self::SERVER_GROUP_KEY)
            .into_iter()
            .map(str::to_owned)
            .collect();
        Arc::new(RequiredScopeConstraint::new(hosts, server_groups))
    }
}

/// The built-in factory set, unordered. The permission factory sorts these
/// by name when building its snapshot.
pub fn builtin_factories() -> Vec<Arc<dyn ConstraintFactory>> {
    vec![
        Arc::new(SensitivityConstraintFactory),
        Arc::new(ScopedRoleConstraintFactory),
        Arc::new(AuditConstraintFactory),
        Arc::new(ApplicationTypeConstraintFactory),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ResourceAddress, SensitivityClassification, TargetResource};

    fn resource_target(resource: TargetResource) -> ActionTarget {
        ActionTarget::Resource(resource)
    }

    #[test]
    fn sensitivity_blocks_unprivileged_roles() {
        let factory = SensitivityConstraintFactory;
        let action = ManagementAction::new("write-attribute", [ActionEffect::WriteConfig]);
        let target = resource_target(
            TargetResource::new(ResourceAddress::root())
                .with_sensitivity(SensitivityClassification::read_write("credential")),
        );

        let required = factory.required_constraint(ActionEffect::WriteConfig, &action, &target);
        let maintainer =
            factory.standard_user_constraint(StandardRole::Maintainer, ActionEffect::WriteConfig);
        let administrator = factory
            .standard_user_constraint(StandardRole::Administrator, ActionEffect::WriteConfig);

        assert!(maintainer.violates(required.as_ref(), ActionEffect::WriteConfig));
        assert!(!administrator.violates(required.as_ref(), ActionEffect::WriteConfig));
    }

    #[test]
    fn auditor_may_read_sensitive_but_not_write() {
        let factory = SensitivityConstraintFactory;
        let read = factory.standard_user_constraint(StandardRole::Auditor, ActionEffect::ReadConfig);
        let write =
            factory.standard_user_constraint(StandardRole::Auditor, ActionEffect::WriteConfig);
        let required_read = SensitivityConstraint::required(true);
        let required_write = SensitivityConstraint::required(true);

        assert!(!read.violates(&required_read, ActionEffect::ReadConfig));
        assert!(write.violates(&required_write, ActionEffect::WriteConfig));
    }

    #[test]
    fn deployer_writes_are_application_only() {
        let factory = ApplicationTypeConstraintFactory;
        let deployer =
            factory.standard_user_constraint(StandardRole::Deployer, ActionEffect::WriteConfig);
        let app = ApplicationConstraint::required(true);
        let core = ApplicationConstraint::required(false);

        assert!(!deployer.violates(&app, ActionEffect::WriteConfig));
        assert!(deployer.violates(&core, ActionEffect::WriteConfig));

        let deployer_read =
            factory.standard_user_constraint(StandardRole::Deployer, ActionEffect::ReadConfig);
        assert!(!deployer_read.violates(&core, ActionEffect::ReadConfig));
    }

    #[test]
    fn audit_resources_are_hidden_from_non_auditors() {
        let factory = AuditConstraintFactory;
        let monitor =
            factory.standard_user_constraint(StandardRole::Monitor, ActionEffect::ReadConfig);
        let auditor =
            factory.standard_user_constraint(StandardRole::Auditor, ActionEffect::ReadConfig);
        let required = AuditConstraint::required(true);

        assert!(monitor.violates(&required, ActionEffect::ReadConfig));
        assert!(!auditor.violates(&required, ActionEffect::ReadConfig));
    }

    #[test]
    fn scope_factory_extracts_address_coordinates() {
        let factory = ScopedRoleConstraintFactory;
        let action = ManagementAction::new("read-resource", [ActionEffect::ReadConfig]);
        let target = resource_target(TargetResource::new(ResourceAddress::new([
            ("host", "primary"),
            ("server-config", "server-one"),
        ])));
        let required = factory.required_constraint(ActionEffect::ReadConfig, &action, &target);
        let required = required
            .as_any()
            .downcast_ref::<RequiredScopeConstraint>()
            .unwrap();
        assert!(required.hosts().contains("primary"));
        assert!(required.server_groups().is_empty());
    }

    #[test]
    fn mismatched_constraint_types_never_violate() {
        let sensitivity = SensitivityConstraint::user(false);
        let application = ApplicationConstraint::required(false);
        assert!(!sensitivity.violates(&application, ActionEffect::WriteConfig));
    }
}
