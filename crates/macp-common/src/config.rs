//! ---
//! macp_section: "01-core-functionality"
//! macp_subsection: "module"
//! macp_type: "source"
//! macp_scope: "code"
//! macp_description: "Shared primitives and utilities for the access control plane."
//! macp_version: "v0.0.0-prealpha"
//! macp_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::logging::LogFormat;

fn default_provider() -> ProviderKind {
    ProviderKind::Rbac
}

fn default_policy() -> CombinationPolicy {
    CombinationPolicy::Permissive
}

fn default_use_realm_roles() -> bool {
    true
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

/// Primary configuration object for the access control plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessControlConfig {
    /// Authorization provider selection.
    #[serde(default = "default_provider")]
    pub provider: ProviderKind,
    /// How permissions combine when a caller resolves to multiple roles.
    #[serde(default = "default_policy")]
    pub combination_policy: CombinationPolicy,
    /// Whether realm-supplied role names participate in role mapping.
    #[serde(default = "default_use_realm_roles")]
    pub use_realm_roles: bool,
    /// Configured role mappings, keyed by role name.
    #[serde(default)]
    pub role_mappings: IndexMap<String, RoleMappingConfig>,
    /// Host-scoped role definitions, keyed by role name.
    #[serde(default)]
    pub host_scoped_roles: IndexMap<String, ScopedRoleConfig>,
    /// Server-group-scoped role definitions, keyed by role name.
    #[serde(default)]
    pub server_group_scoped_roles: IndexMap<String, ScopedRoleConfig>,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metadata describing where an [`AccessControlConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAccessControlConfig {
    pub config: AccessControlConfig,
    pub source: PathBuf,
}

impl AccessControlConfig {
    pub const ENV_CONFIG_PATH: &str = "MACP_CONFIG";

    /// Load configuration from disk, respecting the `MACP_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAccessControlConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAccessControlConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAccessControlConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: PathBuf) -> Result<Self> {
        debug!(config_path = %path.display(), "loading access control configuration");
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AccessControlConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Retrieve a role mapping definition by name.
    pub fn role_mapping(&self, role: &str) -> Option<&RoleMappingConfig> {
        self.role_mappings.get(role)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        for (name, mapping) in &self.role_mappings {
            if name.trim().is_empty() {
                return Err(anyhow!("role mapping with empty name"));
            }
            mapping.validate(name)?;
        }
        for (name, scoped) in self
            .host_scoped_roles
            .iter()
            .chain(self.server_group_scoped_roles.iter())
        {
            if name.trim().is_empty() {
                return Err(anyhow!("scoped role with empty name"));
            }
            scoped.validate(name)?;
        }
        Ok(())
    }
}

impl Default for AccessControlConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            combination_policy: default_policy(),
            use_realm_roles: default_use_realm_roles(),
            role_mappings: IndexMap::new(),
            host_scoped_roles: IndexMap::new(),
            server_group_scoped_roles: IndexMap::new(),
            logging: LoggingConfig::default(),
        }
    }
}

impl std::str::FromStr for AccessControlConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AccessControlConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Authorization provider selection.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Every authenticated caller is treated as a superuser.
    Simple,
    /// Full role-based access control.
    #[default]
    Rbac,
}

impl ProviderKind {
    pub fn is_rbac(&self) -> bool {
        matches!(self, ProviderKind::Rbac)
    }
}

/// Policy for combining permissions when a caller holds multiple roles.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum CombinationPolicy {
    /// Any role granting an action-effect grants it for the caller.
    #[default]
    Permissive,
    /// Callers resolving to more than one role are rejected outright.
    Rejecting,
}

impl std::str::FromStr for CombinationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "permissive" => Ok(CombinationPolicy::Permissive),
            "rejecting" => Ok(CombinationPolicy::Rejecting),
            other => Err(format!("unknown combination policy: {}", other)),
        }
    }
}

/// Configured mapping from identities onto one role name.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RoleMappingConfig {
    /// Grant the role to every caller with an authenticated identity.
    #[serde(default)]
    pub include_all: bool,
    /// Principals granted the role.
    #[serde(default)]
    pub includes: Vec<PrincipalEntry>,
    /// Principals excluded from the role even when otherwise included.
    #[serde(default)]
    pub excludes: Vec<PrincipalEntry>,
}

impl RoleMappingConfig {
    pub fn validate(&self, role: &str) -> Result<()> {
        for entry in self.includes.iter().chain(self.excludes.iter()) {
            if entry.name.trim().is_empty() {
                return Err(anyhow!(
                    "role mapping '{}' contains a principal with an empty name",
                    role
                ));
            }
        }
        Ok(())
    }
}

/// Identity criterion inside a role mapping definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrincipalEntry {
    /// Whether the entry names a user or a group.
    #[serde(rename = "type")]
    pub kind: PrincipalEntryKind,
    /// User or group name.
    pub name: String,
    /// Optional security realm restriction.
    #[serde(default)]
    pub realm: Option<String>,
}

/// Principal entry discriminator.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalEntryKind {
    User,
    Group,
}

/// Scoped role definition narrowing a base role to part of the topology.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScopedRoleConfig {
    /// Standard role the scoped role derives from.
    pub base_role: String,
    /// Hosts or server groups the role is scoped to.
    #[serde(default)]
    pub scope: Vec<String>,
}

impl ScopedRoleConfig {
    pub fn validate(&self, role: &str) -> Result<()> {
        if self.base_role.trim().is_empty() {
            return Err(anyhow!("scoped role '{}' must name a base role", role));
        }
        if self.scope.is_empty() {
            return Err(anyhow!(
                "scoped role '{}' must name at least one host or server group",
                role
            ));
        }
        Ok(())
    }
}

/// Logging settings shared by hosts embedding the library.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}
