//! ---
//! macp_section: "03-security-access-control"
//! macp_subsection: "module"
//! macp_type: "source"
//! macp_scope: "code"
//! macp_description: "Role-based authorization core for management operations."
//! macp_version: "v0.0.0-prealpha"
//! macp_owner: "tbd"
//! ---
use thiserror::Error;

/// Errors raised during role mapping and permission resolution.
///
/// Everything in here is fatal to the request carrying it: either the
/// access control configuration is broken or the request violates the
/// combination policy. An ordinary authorization denial is *not* an error
/// and is reported through [`crate::factory::AccessDecision`] instead.
#[derive(Debug, Error)]
pub enum AuthzError {
    /// A role name was referenced that is not registered anywhere.
    #[error("unknown role '{0}'")]
    UnknownRole(String),
    /// A role registration collided with an existing role name.
    #[error("role '{0}' is already registered")]
    DuplicateRole(String),
    /// A scoped role definition named a base role that does not exist.
    #[error("scoped role '{role}' references unknown base role '{base}'")]
    UnknownBaseRole {
        /// Name of the scoped role being registered.
        role: String,
        /// The unresolvable base role name.
        base: String,
    },
    /// An attempt was made to remove a built-in standard role.
    #[error("role '{0}' is a standard role and cannot be removed")]
    StandardRoleImmutable(String),
    /// A constraint factory registration collided on its ordering name.
    #[error("constraint factory '{0}' is already registered")]
    DuplicateConstraintFactory(String),
    /// The caller resolved to more than one role under the rejecting policy.
    #[error("caller resolved to multiple roles {0:?} under the rejecting combination policy")]
    MultipleRolesRejected(Vec<String>),
    /// An in-VM call without an authenticated identity failed the ambient
    /// capability check for the in-VM role.
    #[error("in-vm call lacks the run-as-in-vm-role capability")]
    InVmAccessDenied,
}

impl AuthzError {
    /// Whether this error signals a combination-policy violation, as opposed
    /// to a broken configuration. The distinction matters to request
    /// handlers: policy violations indicate a disallowed usage pattern, not
    /// a setup bug.
    pub fn is_policy_violation(&self) -> bool {
        matches!(self, AuthzError::MultipleRolesRejected(_))
    }

    /// Whether this error signals broken access control configuration.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            AuthzError::UnknownRole(_)
                | AuthzError::DuplicateRole(_)
                | AuthzError::UnknownBaseRole { .. }
                | AuthzError::StandardRoleImmutable(_)
                | AuthzError::DuplicateConstraintFactory(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_is_disjoint() {
        let config = AuthzError::UnknownRole("GHOST".into());
        let policy = AuthzError::MultipleRolesRejected(vec!["MONITOR".into(), "OPERATOR".into()]);
        assert!(config.is_configuration_error());
        assert!(!config.is_policy_violation());
        assert!(policy.is_policy_violation());
        assert!(!policy.is_configuration_error());
        assert!(!AuthzError::InVmAccessDenied.is_configuration_error());
    }
}
