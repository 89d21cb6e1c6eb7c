//! ---
//! macp_section: "03-security-access-control"
//! macp_subsection: "module"
//! macp_type: "source"
//! macp_scope: "code"
//! macp_description: "Role-based authorization core for management operations."
//! macp_version: "v0.0.0-prealpha"
//! macp_owner: "tbd"
//! ---
use std::collections::HashSet;

use macp_common::config::{PrincipalEntry, PrincipalEntryKind};
use serde::{Deserialize, Serialize};

use crate::caller::Caller;

/// Whether a matcher names a user or a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalKind {
    /// The matcher tests the caller's display name.
    User,
    /// The matcher tests the caller's group membership.
    Group,
}

/// A single identity criterion: a user or group name, optionally pinned to
/// one security realm.
///
/// Equality and hashing are structural over (kind, name, realm); two
/// matchers with `realm = None` compare equal when kind and name agree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrincipalMatcher {
    kind: PrincipalKind,
    name: String,
    realm: Option<String>,
}

impl PrincipalMatcher {
    /// Matcher for a user name.
    pub fn user(name: impl Into<String>) -> Self {
        Self {
            kind: PrincipalKind::User,
            name: name.into(),
            realm: None,
        }
    }

    /// Matcher for a group name.
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            kind: PrincipalKind::Group,
            name: name.into(),
            realm: None,
        }
    }

    /// Restrict the matcher to one security realm.
    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    /// Bridge from a configuration entry.
    pub fn from_entry(entry: &PrincipalEntry) -> Self {
        let matcher = match entry.kind {
            PrincipalEntryKind::User => PrincipalMatcher::user(entry.name.clone()),
            PrincipalEntryKind::Group => PrincipalMatcher::group(entry.name.clone()),
        };
        match &entry.realm {
            Some(realm) => matcher.with_realm(realm.clone()),
            None => matcher,
        }
    }

    /// The matcher kind.
    pub fn kind(&self) -> PrincipalKind {
        self.kind
    }

    /// The user or group name this matcher tests for.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The realm restriction, if any.
    pub fn realm(&self) -> Option<&str> {
        self.realm.as_deref()
    }

    /// Test whether the caller satisfies this criterion.
    pub fn matches(&self, caller: &Caller) -> bool {
        if let Some(realm) = &self.realm {
            if caller.home_realm() != Some(realm.as_str()) {
                return false;
            }
        }
        match self.kind {
            PrincipalKind::User => caller.display_name() == Some(self.name.as_str()),
            PrincipalKind::Group => caller.group_names().contains(&self.name),
        }
    }
}

/// First-match search over an unordered matcher set. When several matchers
/// match there is no guarantee which one is returned.
pub fn first_match<'a>(
    matchers: &'a HashSet<PrincipalMatcher>,
    caller: &Caller,
) -> Option<&'a PrincipalMatcher> {
    matchers.iter().find(|matcher| matcher.matches(caller))
}
