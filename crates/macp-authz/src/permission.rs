//! ---
//! macp_section: "03-security-access-control"
//! macp_subsection: "module"
//! macp_type: "source"
//! macp_scope: "code"
//! macp_description: "Role-based authorization core for management operations."
//! macp_version: "v0.0.0-prealpha"
//! macp_owner: "tbd"
//! ---
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::constraint::Constraint;
use crate::standard::ActionEffect;

pub use macp_common::config::CombinationPolicy;

/// Permission for one action effect, carrying the ordered per-factory
/// constraint array. Index `i` holds the value contributed by the factory
/// at position `i` of the snapshot's name-ordered factory list.
#[derive(Clone)]
pub struct SimplePermission {
    effect: ActionEffect,
    constraints: Vec<Arc<dyn Constraint>>,
}

impl SimplePermission {
    /// Build a permission from its effect and constraint array.
    pub fn new(effect: ActionEffect, constraints: Vec<Arc<dyn Constraint>>) -> Self {
        Self {
            effect,
            constraints,
        }
    }

    /// The action effect this permission covers.
    pub fn effect(&self) -> ActionEffect {
        self.effect
    }

    /// The constraint array, ordered by factory index.
    pub fn constraints(&self) -> &[Arc<dyn Constraint>] {
        &self.constraints
    }

    /// Whether this (user-side) permission satisfies the required
    /// permission: same effect, and no constraint slot violates its
    /// required counterpart.
    pub fn implies(&self, required: &SimplePermission) -> bool {
        self.effect == required.effect
            && self
                .constraints
                .iter()
                .zip(required.constraints.iter())
                .all(|(user, req)| !user.violates(req.as_ref(), self.effect))
    }

    /// Copy of this permission with the constraint at `index` replaced.
    /// Used when deriving scoped-role permissions.
    pub(crate) fn with_constraint_at(
        &self,
        index: usize,
        constraint: Arc<dyn Constraint>,
    ) -> SimplePermission {
        let mut constraints = self.constraints.clone();
        constraints[index] = constraint;
        SimplePermission {
            effect: self.effect,
            constraints,
        }
    }
}

impl fmt::Debug for SimplePermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimplePermission")
            .field("effect", &self.effect)
            .field("constraints", &self.constraints.len())
            .finish()
    }
}

/// Aggregate permission for one effect, satisfied when any underlying
/// permission is satisfied. Produced for scoped roles and for multi-role
/// callers under the permissive combination policy.
#[derive(Debug, Clone)]
pub struct CombinedPermission {
    effect: ActionEffect,
    underlying: Vec<SimplePermission>,
}

impl CombinedPermission {
    /// An empty aggregate for the given effect.
    pub fn new(effect: ActionEffect) -> Self {
        Self {
            effect,
            underlying: Vec::new(),
        }
    }

    /// The action effect this permission covers.
    pub fn effect(&self) -> ActionEffect {
        self.effect
    }

    /// Add an underlying contribution.
    pub fn push(&mut self, permission: SimplePermission) {
        debug_assert_eq!(permission.effect(), self.effect);
        self.underlying.push(permission);
    }

    /// The underlying contributions.
    pub fn underlying(&self) -> &[SimplePermission] {
        &self.underlying
    }

    /// Whether any underlying permission implies the required one.
    pub fn implies(&self, required: &SimplePermission) -> bool {
        self.underlying
            .iter()
            .any(|permission| permission.implies(required))
    }
}

/// A permission granted for one action effect: either a single role's
/// direct permission or an any-grants aggregate.
#[derive(Debug, Clone)]
pub enum ManagementPermission {
    /// One role's direct permission.
    Simple(SimplePermission),
    /// Aggregate over several contributions.
    Combined(CombinedPermission),
}

impl ManagementPermission {
    /// The action effect this permission covers.
    pub fn effect(&self) -> ActionEffect {
        match self {
            ManagementPermission::Simple(permission) => permission.effect(),
            ManagementPermission::Combined(permission) => permission.effect(),
        }
    }

    /// Whether this permission satisfies the required one.
    pub fn implies(&self, required: &SimplePermission) -> bool {
        match self {
            ManagementPermission::Simple(permission) => permission.implies(required),
            ManagementPermission::Combined(permission) => permission.implies(required),
        }
    }
}

/// The permissions granted to (or required from) a caller, one entry per
/// action effect.
#[derive(Debug, Clone, Default)]
pub struct PermissionCollection {
    by_effect: BTreeMap<ActionEffect, ManagementPermission>,
}

impl PermissionCollection {
    /// An empty collection, granting nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a permission, replacing any previous entry for its effect.
    pub fn insert(&mut self, permission: ManagementPermission) {
        self.by_effect.insert(permission.effect(), permission);
    }

    /// The permission for the given effect, if present.
    pub fn get(&self, effect: ActionEffect) -> Option<&ManagementPermission> {
        self.by_effect.get(&effect)
    }

    /// Iterate permissions in canonical effect order.
    pub fn iter(&self) -> impl Iterator<Item = &ManagementPermission> {
        self.by_effect.values()
    }

    /// Number of effects covered.
    pub fn len(&self) -> usize {
        self.by_effect.len()
    }

    /// Whether the collection grants nothing at all.
    pub fn is_empty(&self) -> bool {
        self.by_effect.is_empty()
    }

    /// The standard allow/deny comparison: every permission in `required`
    /// must be implied by this collection's entry for the same effect.
    pub fn implies_all(&self, required: &PermissionCollection) -> bool {
        required.iter().all(|req| match req {
            ManagementPermission::Simple(simple) => self
                .get(simple.effect())
                .map(|granted| granted.implies(simple))
                .unwrap_or(false),
            // Required collections are built from simple permissions; an
            // aggregate on the required side must hold for each member.
            ManagementPermission::Combined(combined) => combined.underlying().iter().all(|simple| {
                self.get(simple.effect())
                    .map(|granted| granted.implies(simple))
                    .unwrap_or(false)
            }),
        })
    }
}
