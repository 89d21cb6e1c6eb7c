//! ---
//! macp_section: "01-core-functionality"
//! macp_subsection: "module"
//! macp_type: "source"
//! macp_scope: "code"
//! macp_description: "Shared primitives and utilities for the access control plane."
//! macp_version: "v0.0.0-prealpha"
//! macp_owner: "tbd"
//! ---
//! Core shared primitives for the MACP workspace.
//! This crate exposes configuration loading and logging bootstrap
//! utilities consumed across the workspace.

pub mod config;
pub mod logging;

pub use config::{
    AccessControlConfig, CombinationPolicy, LoggingConfig, PrincipalEntry, PrincipalEntryKind,
    ProviderKind, RoleMappingConfig, ScopedRoleConfig,
};
pub use logging::{init_tracing, LogFormat};
