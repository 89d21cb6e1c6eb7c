//! ---
//! macp_section: "03-security-access-control"
//! macp_subsection: "module"
//! macp_type: "source"
//! macp_scope: "code"
//! macp_description: "Role-based authorization core for management operations."
//! macp_version: "v0.0.0-prealpha"
//! macp_owner: "tbd"
//! ---
use std::any::Any;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::constraint::{Constraint, RequiredScopeConstraint};
use crate::standard::{official_form, ActionEffect, StandardRole};

/// Which slice of the managed topology a scoped role is pinned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScopeKind {
    /// Scoped to one or more hosts.
    Host,
    /// Scoped to one or more server groups.
    ServerGroup,
}

impl ScopeKind {
    /// Stable textual form used in diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::Host => "host",
            ScopeKind::ServerGroup => "server-group",
        }
    }
}

/// User-side scoping constraint occupying the scoping factory's slot.
///
/// Standard roles carry the unscoped value, which never restricts
/// anything. Scoped roles substitute a value naming their hosts or server
/// groups; the out-of-scope read variant backs the monitor-level fallback
/// a scoped role retains outside its scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopingConstraint {
    kind: Option<ScopeKind>,
    scope: BTreeSet<String>,
    read_only: bool,
}

impl ScopingConstraint {
    /// The unscoped value carried by every standard role.
    pub fn unscoped() -> Self {
        Self {
            kind: None,
            scope: BTreeSet::new(),
            read_only: false,
        }
    }

    /// Scope to the given hosts.
    pub fn hosts<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: Some(ScopeKind::Host),
            scope: names.into_iter().map(Into::into).collect(),
            read_only: false,
        }
    }

    /// Scope to the given server groups.
    pub fn server_groups<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: Some(ScopeKind::ServerGroup),
            scope: names.into_iter().map(Into::into).collect(),
            read_only: false,
        }
    }

    /// The read-only variant granting monitor-level visibility outside the
    /// scope proper.
    pub fn out_of_scope_read(&self) -> Self {
        Self {
            kind: self.kind,
            scope: BTreeSet::new(),
            read_only: true,
        }
    }

    /// The scope kind, if the constraint is scoped at all.
    pub fn kind(&self) -> Option<ScopeKind> {
        self.kind
    }

    /// The host or server group names in scope.
    pub fn scope(&self) -> &BTreeSet<String> {
        &self.scope
    }
}

impl Constraint for ScopingConstraint {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn violates(&self, required: &dyn Constraint, effect: ActionEffect) -> bool {
        let Some(required) = required.as_any().downcast_ref::<RequiredScopeConstraint>() else {
            return false;
        };
        if self.read_only {
            // The fallback grants reads anywhere but never a write.
            return effect.is_write();
        }
        let Some(kind) = self.kind else {
            return false;
        };
        let touched = match kind {
            ScopeKind::Host => required.hosts(),
            ScopeKind::ServerGroup => required.server_groups(),
        };
        if touched.is_empty() {
            // The target sits outside any host/server-group, e.g. domain
            // wide configuration: out of scope for a scoped role.
            return true;
        }
        !touched.is_subset(&self.scope)
    }
}

/// A dynamically registered role deriving from a standard role, narrowed
/// to part of the managed topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedRole {
    name: String,
    base: StandardRole,
    constraint: ScopingConstraint,
}

impl ScopedRole {
    /// A role scoped to the given hosts.
    pub fn host_scoped<I, S>(name: impl AsRef<str>, base: StandardRole, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: official_form(name.as_ref()),
            base,
            constraint: ScopingConstraint::hosts(hosts),
        }
    }

    /// A role scoped to the given server groups.
    pub fn server_group_scoped<I, S>(name: impl AsRef<str>, base: StandardRole, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: official_form(name.as_ref()),
            base,
            constraint: ScopingConstraint::server_groups(groups),
        }
    }

    /// The scoped role's name, in official form.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The standard role this role derives from.
    pub fn base(&self) -> StandardRole {
        self.base
    }

    /// The scoping constraint narrowing the base role.
    pub fn constraint(&self) -> &ScopingConstraint {
        &self.constraint
    }
}
