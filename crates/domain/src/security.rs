use std::str::FromStr;

use lattice_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::subject::{AttributeMap, PredicateContext};

/// Catalog key of the capability that lets a role manage other roles'
/// permissions. The only permission relevant to delegation-cycle checks.
pub const ROLE_MANAGE_PERMISSIONS_KEY: &str = "role:manage_permissions";

/// Effect attached to a role-permission binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    /// The binding grants the matched permission.
    Allow,
    /// The binding withholds the matched permission, overriding any allow.
    Deny,
}

impl Effect {
    /// Returns a stable storage value for this effect.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
        }
    }
}

impl FromStr for Effect {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "allow" => Ok(Self::Allow),
            "deny" => Ok(Self::Deny),
            _ => Err(AppError::Validation(format!(
                "unknown effect value '{value}'"
            ))),
        }
    }
}

/// A requested permission key in `resource:action` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionKey(String);

impl PermissionKey {
    /// Creates a validated permission key.
    ///
    /// Requested keys are always concrete: wildcards live in the catalog, not
    /// in requests.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        let valid = matches!(
            value.split_once(':'),
            Some((resource, action))
                if !resource.is_empty() && !action.is_empty() && resource != "*" && action != "*"
        );

        if !valid {
            return Err(AppError::Validation(format!(
                "invalid permission key '{value}': expected concrete 'resource:action'"
            )));
        }

        Ok(Self(value))
    }

    /// Returns the full key string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns the resource-type axis of the key.
    #[must_use]
    pub fn resource_type(&self) -> &str {
        self.0.split_once(':').map_or("", |(resource, _)| resource)
    }

    /// Returns the action axis of the key.
    #[must_use]
    pub fn action(&self) -> &str {
        self.0.split_once(':').map_or("", |(_, action)| action)
    }
}

impl std::fmt::Display for PermissionKey {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// One row of the permission catalog.
///
/// The key is either the literal wildcard `*` or `resource:action`, where
/// either axis may itself be `*` to match broadly along that axis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionEntry {
    /// Stable catalog identifier.
    pub permission_id: Uuid,
    /// Full catalog key.
    pub key: String,
    /// Resource-type axis, possibly `*`.
    pub resource_type: String,
    /// Action axis, possibly `*`.
    pub action: String,
    /// Human-readable description.
    pub description: Option<String>,
}

impl PermissionEntry {
    /// Returns whether this catalog entry matches a requested key.
    ///
    /// Matches on exact key equality, the literal `*` entry, or a wildcard on
    /// one axis with exact equality on the other. Entries whose key follows
    /// neither shape only ever match exactly.
    #[must_use]
    pub fn matches(&self, requested: &PermissionKey) -> bool {
        if self.key == requested.as_str() || self.key == "*" {
            return true;
        }

        if !self.key.contains(':') {
            return false;
        }

        let resource_matches =
            self.resource_type == "*" || self.resource_type == requested.resource_type();
        let action_matches = self.action == "*" || self.action == requested.action();

        resource_matches && action_matches
    }
}

/// An optional predicate gating a role-permission binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyConstraint {
    /// Stable constraint identifier.
    pub constraint_id: Uuid,
    /// Constraint name for administration.
    pub name: String,
    /// The structural predicate evaluated at decision time.
    pub predicate: PolicyPredicate,
}

/// Structural policy predicate, stored as data and interpreted at decision
/// time.
///
/// This is a deliberately minimal predicate language. Unknown shapes parse to
/// [`PolicyPredicate::Unrecognized`], which always evaluates false so that
/// malformed or newer predicate data fails closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyPredicate {
    /// Unconditionally true.
    Always,
    /// True iff every listed key equals the subject's resolved attribute.
    SubjectAttributeEquals(AttributeMap),
    /// Any predicate shape this interpreter does not understand.
    Unrecognized,
}

impl PolicyPredicate {
    /// Parses predicate data from its stored JSON representation.
    ///
    /// `null` parses to [`PolicyPredicate::Always`]: a constraint row without
    /// predicate data is unconditional.
    #[must_use]
    pub fn from_json(value: &Value) -> Self {
        if value.is_null() {
            return Self::Always;
        }

        if value.get("always").and_then(Value::as_bool) == Some(true) {
            return Self::Always;
        }

        if let Some(checks) = value
            .get("subject")
            .and_then(|subject| subject.get("attribute_equals"))
            .and_then(Value::as_object)
        {
            return Self::SubjectAttributeEquals(
                checks
                    .iter()
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect(),
            );
        }

        Self::Unrecognized
    }

    /// Evaluates this predicate against the decision context.
    #[must_use]
    pub fn evaluate(&self, context: &PredicateContext<'_>) -> bool {
        match self {
            Self::Always => true,
            Self::SubjectAttributeEquals(checks) => checks
                .iter()
                .all(|(key, expected)| context.subject.attributes.get(key) == Some(expected)),
            Self::Unrecognized => false,
        }
    }

    /// Returns whether this predicate shape was understood by the parser.
    #[must_use]
    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized)
    }
}
