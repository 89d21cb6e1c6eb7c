//! ---
//! macp_section: "03-security-access-control"
//! macp_subsection: "module"
//! macp_type: "source"
//! macp_scope: "code"
//! macp_description: "Role-based authorization core for management operations."
//! macp_version: "v0.0.0-prealpha"
//! macp_owner: "tbd"
//! ---
use std::collections::BTreeSet;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::standard::ActionEffect;

/// Operation header key carrying a client-declared run-as directive.
pub const ROLES_HEADER: &str = "roles";

/// A requested management operation: its name, the action effects it
/// declares, and its operation headers.
#[derive(Debug, Clone)]
pub struct ManagementAction {
    operation: String,
    effects: BTreeSet<ActionEffect>,
    headers: IndexMap<String, serde_json::Value>,
}

impl ManagementAction {
    /// Construct an action declaring the given effects.
    pub fn new<I>(operation: impl Into<String>, effects: I) -> Self
    where
        I: IntoIterator<Item = ActionEffect>,
    {
        Self {
            operation: operation.into(),
            effects: effects.into_iter().collect(),
            headers: IndexMap::new(),
        }
    }

    /// Attach an operation header.
    pub fn with_header(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.headers.insert(key.into(), value);
        self
    }

    /// The operation name.
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// The declared action effects, in canonical order.
    pub fn effects(&self) -> &BTreeSet<ActionEffect> {
        &self.effects
    }

    /// Look up an operation header by key.
    pub fn header(&self, key: &str) -> Option<&serde_json::Value> {
        self.headers.get(key)
    }

    /// Role names requested through the `roles` operation header. The header
    /// value may be a single string or a list of strings; anything else is
    /// ignored.
    pub fn run_as_roles(&self) -> Vec<String> {
        match self.headers.get(ROLES_HEADER) {
            Some(serde_json::Value::String(role)) => vec![role.clone()],
            Some(serde_json::Value::Array(entries)) => entries
                .iter()
                .filter_map(|value| value.as_str().map(str::to_owned))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Address of a management resource as a sequence of key/value path pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceAddress(Vec<(String, String)>);

impl ResourceAddress {
    /// The empty (root) address.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Build an address from path pairs.
    pub fn new<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }

    /// All values recorded under the given path key.
    pub fn values_of(&self, key: &str) -> Vec<&str> {
        self.0
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// The path pairs in order.
    pub fn pairs(&self) -> &[(String, String)] {
        &self.0
    }
}

impl fmt::Display for ResourceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "/");
        }
        for (key, value) in &self.0 {
            write!(f, "/{}={}", key, value)?;
        }
        Ok(())
    }
}

/// Sensitivity classification attached to a resource or attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensitivityClassification {
    /// Classification name, for diagnostics.
    pub name: String,
    /// Whether reading the classified data requires sensitive-data access.
    pub sensitive_read: bool,
    /// Whether writing the classified data requires sensitive-data access.
    pub sensitive_write: bool,
}

impl SensitivityClassification {
    /// Classification that protects both reads and writes.
    pub fn read_write(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sensitive_read: true,
            sensitive_write: true,
        }
    }

    /// Classification that protects writes only.
    pub fn write_only(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sensitive_read: false,
            sensitive_write: true,
        }
    }
}

/// A whole management resource as the target of an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetResource {
    address: ResourceAddress,
    application: bool,
    audit: bool,
    sensitivity: Option<SensitivityClassification>,
}

impl TargetResource {
    /// Target the resource at the given address.
    pub fn new(address: ResourceAddress) -> Self {
        Self {
            address,
            application: false,
            audit: false,
            sensitivity: None,
        }
    }

    /// Mark the resource as an application resource (deployments and the
    /// resources belonging to them).
    pub fn with_application(mut self, application: bool) -> Self {
        self.application = application;
        self
    }

    /// Mark the resource as part of the audit subsystem.
    pub fn with_audit(mut self, audit: bool) -> Self {
        self.audit = audit;
        self
    }

    /// Attach a sensitivity classification.
    pub fn with_sensitivity(mut self, sensitivity: SensitivityClassification) -> Self {
        self.sensitivity = Some(sensitivity);
        self
    }

    /// The resource address.
    pub fn address(&self) -> &ResourceAddress {
        &self.address
    }

    /// Whether this is an application resource.
    pub fn is_application(&self) -> bool {
        self.application
    }

    /// Whether this resource belongs to the audit subsystem.
    pub fn is_audit(&self) -> bool {
        self.audit
    }

    /// The resource-level sensitivity classification, if any.
    pub fn sensitivity(&self) -> Option<&SensitivityClassification> {
        self.sensitivity.as_ref()
    }
}

/// A single attribute of a resource as the target of an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetAttribute {
    name: String,
    sensitivity: Option<SensitivityClassification>,
    resource: TargetResource,
}

impl TargetAttribute {
    /// Target the named attribute of the given resource.
    pub fn new(name: impl Into<String>, resource: TargetResource) -> Self {
        Self {
            name: name.into(),
            sensitivity: None,
            resource,
        }
    }

    /// Attach an attribute-level sensitivity classification, overriding the
    /// resource-level one.
    pub fn with_sensitivity(mut self, sensitivity: SensitivityClassification) -> Self {
        self.sensitivity = Some(sensitivity);
        self
    }

    /// The attribute name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The resource the attribute belongs to.
    pub fn resource(&self) -> &TargetResource {
        &self.resource
    }
}

/// The target of a management action: a whole resource or one attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionTarget {
    /// The action addresses a whole resource.
    Resource(TargetResource),
    /// The action addresses a single attribute.
    Attribute(TargetAttribute),
}

impl ActionTarget {
    /// The resource underlying the target.
    pub fn resource(&self) -> &TargetResource {
        match self {
            ActionTarget::Resource(resource) => resource,
            ActionTarget::Attribute(attribute) => attribute.resource(),
        }
    }

    /// The target address.
    pub fn address(&self) -> &ResourceAddress {
        self.resource().address()
    }

    /// The effective sensitivity classification: the attribute-level one
    /// when present, else the resource-level one.
    pub fn effective_sensitivity(&self) -> Option<&SensitivityClassification> {
        match self {
            ActionTarget::Resource(resource) => resource.sensitivity(),
            ActionTarget::Attribute(attribute) => attribute
                .sensitivity
                .as_ref()
                .or_else(|| attribute.resource().sensitivity()),
        }
    }

    /// Diagnostic description of the target.
    pub fn describe(&self) -> String {
        match self {
            ActionTarget::Resource(resource) => resource.address().to_string(),
            ActionTarget::Attribute(attribute) => {
                format!("{}#{}", attribute.resource().address(), attribute.name())
            }
        }
    }
}
