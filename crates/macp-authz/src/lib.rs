//! ---
//! macp_section: "03-security-access-control"
//! macp_subsection: "module"
//! macp_type: "source"
//! macp_scope: "code"
//! macp_description: "Role-based authorization core for management operations."
//! macp_version: "v0.0.0-prealpha"
//! macp_owner: "tbd"
//! ---
//! Role-based authorization core for a management plane.
//!
//! An inbound management action carries a [`Caller`] and an
//! [`action::ActionTarget`]. A [`mapper::RoleMapper`] resolves the caller
//! to a set of role names; the [`factory::PermissionFactory`] resolves and
//! caches the permission collection for that exact role set, combining
//! per-role permissions under the configured combination policy, and
//! derives the action's required permissions from the registered
//! constraint factories. The caller is authorized iff the granted
//! collection implies every required permission.
#![warn(missing_docs)]

pub mod action;
pub mod audit;
pub mod caller;
pub mod constraint;
pub mod errors;
pub mod factory;
pub mod mapper;
pub mod metrics;
pub mod permission;
pub mod principal;
pub mod role;
pub mod scoped;
pub mod standard;

pub use action::{
    ActionTarget, ManagementAction, ResourceAddress, SensitivityClassification, TargetAttribute,
    TargetResource,
};
pub use audit::{DecisionLog, DecisionRecord};
pub use caller::{CallEnvironment, Caller};
pub use constraint::{Constraint, ConstraintFactory};
pub use errors::AuthzError;
pub use factory::{AccessDecision, DecisionOutcome, PermissionFactory, PermsHolder};
pub use mapper::{
    AllowInVmCalls, DenyInVmCalls, InVmCapabilityCheck, RoleMapper, RunAsRoleMapper,
    StandardRoleMapper, SuperuserRoleMapper,
};
pub use metrics::AccessMetrics;
pub use permission::{
    CombinationPolicy, CombinedPermission, ManagementPermission, PermissionCollection,
    SimplePermission,
};
pub use principal::{PrincipalKind, PrincipalMatcher};
pub use role::{MatchBucket, RoleCatalog, RoleMapping};
pub use scoped::{ScopeKind, ScopedRole, ScopingConstraint};
pub use standard::{official_form, ActionEffect, StandardRole};
