//! ---
//! macp_section: "02-configuration"
//! macp_subsection: "module"
//! macp_type: "source"
//! macp_scope: "code"
//! macp_description: "Access control manifest persistence and loading."
//! macp_version: "v0.0.0-prealpha"
//! macp_owner: "tbd"
//! ---
//! Persistence layer for access control manifests. A manifest wraps a
//! validated [`AccessControlConfig`] with naming metadata and a content
//! hash so administrative changes are attributable and reloadable.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use macp_common::config::AccessControlConfig;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

/// Default directory where active access control state is stored.
pub const DEFAULT_CONFIG_ROOT: &str = "/etc/macp";
const MANIFESTS_DIR: &str = "manifests";
const CURRENT_LINK: &str = "current.toml";

/// Metadata describing an access control manifest stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManifestMetadata {
    /// Human-readable manifest name supplied by the administrator.
    pub name: String,
    /// Filesystem-safe slug generated from the manifest name.
    pub slug: String,
    /// Timestamp (UTC) when the manifest was first created.
    pub created_at: DateTime<Utc>,
    /// Timestamp (UTC) when the manifest was last persisted.
    pub updated_at: DateTime<Utc>,
    /// SHA-256 hash of the effective [`AccessControlConfig`] content.
    pub config_hash: String,
    /// Version of the tooling that produced the manifest.
    pub source_version: String,
}

/// Composite manifest that wraps [`AccessControlConfig`] with metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessControlManifest {
    pub manifest: ManifestMetadata,
    #[serde(flatten)]
    pub access_control: AccessControlConfig,
}

/// Result of persisting a manifest to disk.
#[derive(Debug, Clone)]
pub struct PersistedManifest {
    pub manifest: AccessControlManifest,
    pub manifest_path: PathBuf,
    pub current_path: PathBuf,
}

/// Convenience container describing canonical configuration paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    pub root: PathBuf,
    pub manifests_dir: PathBuf,
    pub current_symlink: PathBuf,
}

impl ConfigPaths {
    /// Construct a new [`ConfigPaths`] from an arbitrary root directory.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref().to_path_buf();
        let manifests_dir = root.join(MANIFESTS_DIR);
        let current_symlink = root.join(CURRENT_LINK);
        Self {
            root,
            manifests_dir,
            current_symlink,
        }
    }

    /// Ensure the manifests directory exists.
    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.manifests_dir).with_context(|| {
            format!(
                "unable to create manifests directory {}",
                self.manifests_dir.display()
            )
        })
    }
}

impl AccessControlManifest {
    /// Construct a new manifest from a human-readable name and validated config.
    pub fn new(name: impl Into<String>, access_control: AccessControlConfig) -> Result<Self> {
        let name = name.into().trim().to_owned();
        if name.is_empty() {
            return Err(anyhow!("manifest name cannot be empty"));
        }
        let slug = slugify_name(&name);
        if slug.is_empty() {
            return Err(anyhow!(
                "manifest name must contain at least one alphanumeric character"
            ));
        }
        access_control.validate()?;
        let mut manifest = Self {
            manifest: ManifestMetadata {
                name,
                slug,
                created_at: Utc::now(),
                updated_at: Utc::now(),
                config_hash: String::new(),
                source_version: env!("CARGO_PKG_VERSION").to_owned(),
            },
            access_control,
        };
        manifest.update_digest()?;
        Ok(manifest)
    }

    /// Return the filesystem-safe slug.
    pub fn slug(&self) -> &str {
        &self.manifest.slug
    }

    /// Recompute the deterministic configuration hash and update timestamps.
    pub fn update_digest(&mut self) -> Result<()> {
        self.manifest.config_hash = hash_access_control_config(&self.access_control)?;
        self.manifest.updated_at = Utc::now();
        Ok(())
    }

    /// Persist the manifest under the provided root directory and refresh the
    /// `current.toml` symlink.
    pub fn persist(mut self, root: impl AsRef<Path>) -> Result<PersistedManifest> {
        self.update_digest()?;
        let paths = ConfigPaths::new(root);
        paths.ensure_dirs()?;

        let filename = format!("{}.toml", self.manifest.slug);
        let manifest_path = paths.manifests_dir.join(filename);
        let serialized = toml::to_string_pretty(&self)
            .with_context(|| "failed to serialise access control manifest to TOML")?;
        fs::write(&manifest_path, serialized)
            .with_context(|| format!("unable to write manifest to {}", manifest_path.display()))?;

        create_symlink(&manifest_path, &paths.current_symlink)?;
        debug!(manifest = %manifest_path.display(), "access control manifest persisted");

        Ok(PersistedManifest {
            manifest: self,
            manifest_path,
            current_path: paths.current_symlink,
        })
    }
}

impl PersistedManifest {
    /// Convenience accessor for the manifest hash.
    pub fn config_hash(&self) -> &str {
        &self.manifest.manifest.config_hash
    }
}

/// Load a manifest from a concrete path on disk.
pub fn load_manifest(path: impl AsRef<Path>) -> Result<AccessControlManifest> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read manifest {}", path.display()))?;
    let manifest: AccessControlManifest = toml::from_str(&raw)
        .with_context(|| format!("failed to parse manifest {}", path.display()))?;
    manifest.access_control.validate()?;
    Ok(manifest)
}

/// Load the active manifest referenced by the `current.toml` symlink, if present.
pub fn load_active_manifest(root: impl AsRef<Path>) -> Result<Option<AccessControlManifest>> {
    let paths = ConfigPaths::new(root);
    if !paths.current_symlink.exists() {
        return Ok(None);
    }
    let target = fs::read_link(&paths.current_symlink).unwrap_or(paths.current_symlink.clone());
    let manifest = load_manifest(&target).with_context(|| {
        format!(
            "unable to load manifest referenced by {}",
            paths.current_symlink.display()
        )
    })?;
    Ok(Some(manifest))
}

/// Compute the SHA-256 hash of a validated [`AccessControlConfig`].
pub fn hash_access_control_config(config: &AccessControlConfig) -> Result<String> {
    let serialised = toml::to_string(&config)
        .with_context(|| "failed to serialise configuration for hashing")?;
    let mut hasher = Sha256::new();
    hasher.update(serialised.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// Produce a filesystem-safe slug from a human-friendly manifest name.
pub fn slugify_name(input: &str) -> String {
    let mut slug = String::new();
    let mut previous_dash = false;
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            previous_dash = false;
        } else if matches!(ch, ' ' | '-' | '_' | '.' | '/') && !previous_dash && !slug.is_empty() {
            slug.push('-');
            previous_dash = true;
        }
    }
    if slug.ends_with('-') {
        slug.pop();
    }
    slug
}

fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    if let Ok(meta) = fs::symlink_metadata(link) {
        if meta.is_dir() {
            return Err(anyhow!(
                "expected symlink or file at {} but found directory",
                link.display()
            ));
        }
        fs::remove_file(link)
            .with_context(|| format!("unable to remove existing link {}", link.display()))?;
    }
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, link).with_context(|| {
            format!(
                "unable to update symlink {} -> {}",
                link.display(),
                target.display()
            )
        })?;
    }
    #[cfg(windows)]
    {
        std::os::windows::fs::symlink_file(target, link).with_context(|| {
            format!(
                "unable to update symlink {} -> {}",
                link.display(),
                target.display()
            )
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_config() -> AccessControlConfig {
        let raw = r#"
            [role_mappings.Monitor]
            include_all = true

            [role_mappings.Administrator]
            includes = [{ type = "group", name = "ops" }]
        "#;
        raw.parse().unwrap()
    }

    #[test]
    fn slugify_flattens_names() {
        assert_eq!(slugify_name("Production Hosts"), "production-hosts");
        assert_eq!(slugify_name("  weird//name__1  "), "weird-name-1");
        assert_eq!(slugify_name("***"), "");
    }

    #[test]
    fn persist_and_reload_round_trip() {
        let dir = tempdir().unwrap();
        let manifest = AccessControlManifest::new("Primary Domain", sample_config()).unwrap();
        let hash = manifest.manifest.config_hash.clone();
        assert!(!hash.is_empty());

        let persisted = manifest.persist(dir.path()).unwrap();
        assert_eq!(persisted.config_hash(), hash);

        let active = load_active_manifest(dir.path()).unwrap().unwrap();
        assert_eq!(active.manifest.slug, "primary-domain");
        assert_eq!(active.manifest.config_hash, hash);
        assert!(active.access_control.role_mapping("Monitor").unwrap().include_all);
    }

    #[test]
    fn active_manifest_absent_is_none() {
        let dir = tempdir().unwrap();
        assert!(load_active_manifest(dir.path()).unwrap().is_none());
    }

    #[test]
    fn rejects_empty_manifest_name() {
        assert!(AccessControlManifest::new("   ", sample_config()).is_err());
    }
}
