//! ---
//! macp_section: "03-security-access-control"
//! macp_subsection: "module"
//! macp_type: "source"
//! macp_scope: "code"
//! macp_description: "Role-based authorization core for management operations."
//! macp_version: "v0.0.0-prealpha"
//! macp_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};

/// One dimension of a management action's impact. Permissions are granted
/// and checked per effect.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum ActionEffect {
    /// Whether the target is addressable at all.
    Access,
    /// Reading persistent configuration.
    ReadConfig,
    /// Reading runtime state.
    ReadRuntime,
    /// Writing persistent configuration.
    WriteConfig,
    /// Writing runtime state.
    WriteRuntime,
}

impl ActionEffect {
    /// All effects, in canonical order.
    pub const ALL: [ActionEffect; 5] = [
        ActionEffect::Access,
        ActionEffect::ReadConfig,
        ActionEffect::ReadRuntime,
        ActionEffect::WriteConfig,
        ActionEffect::WriteRuntime,
    ];

    /// Stable textual form used in logs and the audit trail.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionEffect::Access => "access",
            ActionEffect::ReadConfig => "read-config",
            ActionEffect::ReadRuntime => "read-runtime",
            ActionEffect::WriteConfig => "write-config",
            ActionEffect::WriteRuntime => "write-runtime",
        }
    }

    /// Whether the effect mutates configuration or runtime state.
    pub fn is_write(&self) -> bool {
        matches!(self, ActionEffect::WriteConfig | ActionEffect::WriteRuntime)
    }
}

/// Built-in management roles. The catalog is fixed at compile time and
/// never reconfigured; scoped roles derive from these at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StandardRole {
    /// Read-only visibility into configuration and runtime state.
    Monitor,
    /// Monitor plus runtime mutations (restart, reload, deploy state).
    Operator,
    /// Operator plus persistent configuration changes.
    Maintainer,
    /// Maintainer powers restricted to application resources.
    Deployer,
    /// Full configuration authority including sensitive data.
    Administrator,
    /// Read access including sensitive data and the audit subsystem.
    Auditor,
    /// Unrestricted.
    Superuser,
}

impl StandardRole {
    /// All standard roles, in canonical order.
    pub const ALL: [StandardRole; 7] = [
        StandardRole::Monitor,
        StandardRole::Operator,
        StandardRole::Maintainer,
        StandardRole::Deployer,
        StandardRole::Administrator,
        StandardRole::Auditor,
        StandardRole::Superuser,
    ];

    /// The official (canonical) form of the role name.
    pub fn official_name(&self) -> &'static str {
        match self {
            StandardRole::Monitor => "MONITOR",
            StandardRole::Operator => "OPERATOR",
            StandardRole::Maintainer => "MAINTAINER",
            StandardRole::Deployer => "DEPLOYER",
            StandardRole::Administrator => "ADMINISTRATOR",
            StandardRole::Auditor => "AUDITOR",
            StandardRole::Superuser => "SUPERUSER",
        }
    }

    /// Resolve a role name against the catalog, ignoring case and
    /// surrounding whitespace.
    pub fn from_official(name: &str) -> Option<StandardRole> {
        let official = official_form(name);
        StandardRole::ALL
            .iter()
            .copied()
            .find(|role| role.official_name() == official)
    }

    /// The closed set of action effects this role may perform.
    /// [`ActionEffect::Access`] is part of every role's set.
    pub fn allowed_effects(&self) -> &'static [ActionEffect] {
        use ActionEffect::*;
        match self {
            StandardRole::Monitor | StandardRole::Auditor => {
                &[Access, ReadConfig, ReadRuntime]
            }
            StandardRole::Operator => &[Access, ReadConfig, ReadRuntime, WriteRuntime],
            StandardRole::Maintainer | StandardRole::Deployer => {
                &[Access, ReadConfig, ReadRuntime, WriteConfig, WriteRuntime]
            }
            StandardRole::Administrator | StandardRole::Superuser => &ActionEffect::ALL,
        }
    }

    /// Whether the role may perform the given effect at all.
    pub fn allows(&self, effect: ActionEffect) -> bool {
        self.allowed_effects().contains(&effect)
    }
}

/// Case-normalize a role name into its canonical ("official") form.
///
/// Every comparison, storage key, and lookup in this crate goes through
/// this normalization.
pub fn official_form(name: &str) -> String {
    name.trim().to_ascii_uppercase()
}
