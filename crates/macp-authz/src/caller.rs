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

/// The identity attempting a management action.
///
/// Authentication happens before this crate runs; a `Caller` is either the
/// product of a successful authentication (name, realm, realm roles and
/// groups supplied by the security layer) or an in-VM invocation carrying
/// no identity at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    name: Option<String>,
    realm: Option<String>,
    realm_roles: HashSet<String>,
    groups: HashSet<String>,
    authenticated: bool,
}

impl Caller {
    /// An authenticated caller with the given display name.
    pub fn authenticated(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            realm: None,
            realm_roles: HashSet::new(),
            groups: HashSet::new(),
            authenticated: true,
        }
    }

    /// An in-VM invocation without an authenticated identity.
    pub fn in_vm() -> Self {
        Self {
            name: None,
            realm: None,
            realm_roles: HashSet::new(),
            groups: HashSet::new(),
            authenticated: false,
        }
    }

    /// Attach the caller's home security realm.
    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    /// Attach role names supplied by the caller's realm.
    pub fn with_realm_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.realm_roles = roles.into_iter().map(Into::into).collect();
        self
    }

    /// Attach group names associated with the caller.
    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    /// The caller's display name, if an identity is present.
    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The caller's home realm, if any.
    pub fn home_realm(&self) -> Option<&str> {
        self.realm.as_deref()
    }

    /// Whether the caller carries an authenticated identity, as opposed to
    /// being an in-VM call.
    pub fn has_authenticated_identity(&self) -> bool {
        self.authenticated
    }

    /// Role names the caller's realm associated with the identity.
    pub fn realm_role_names(&self) -> &HashSet<String> {
        &self.realm_roles
    }

    /// Group names associated with the identity.
    pub fn group_names(&self) -> &HashSet<String> {
        &self.groups
    }
}

/// Ambient facts about the process handling the request. Carried through
/// role mapping for diagnostics only; decisions never depend on it.
#[derive(Debug, Clone, Default)]
pub struct CallEnvironment {
    /// Name of the process evaluating the request.
    pub process_name: String,
}

impl CallEnvironment {
    /// Environment labelled with the given process name.
    pub fn new(process_name: impl Into<String>) -> Self {
        Self {
            process_name: process_name.into(),
        }
    }
}
