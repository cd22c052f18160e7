use std::collections::BTreeMap;

use lattice_core::{UserId, WorkspaceId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Flat key-value attribute map resolved for a subject, resource, or request.
pub type AttributeMap = BTreeMap<String, Value>;

/// Collapses a JSON object into an attribute map.
///
/// Non-object values (including null) collapse to an empty map; attribute
/// storage only ever holds objects, so anything else carries no attributes.
#[must_use]
pub fn attribute_map_from_json(value: &Value) -> AttributeMap {
    match value {
        Value::Object(entries) => entries
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
        _ => AttributeMap::new(),
    }
}

/// Entity kinds that can carry attribute rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeEntityType {
    /// Attributes attached to a user record.
    User,
    /// Attributes attached to a workspace record.
    Workspace,
    /// Attributes attached to a team record.
    Team,
}

impl AttributeEntityType {
    /// Returns a stable storage value for this entity type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Workspace => "workspace",
            Self::Team => "team",
        }
    }
}

/// Convenience projection of the user record backing a subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectUser {
    /// Stable user identifier.
    pub id: UserId,
    /// User email address.
    pub email: String,
}

/// Convenience projection of the workspace membership backing a subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectMembership {
    /// Workspace the membership belongs to.
    pub workspace_id: WorkspaceId,
    /// Membership status, e.g. `active` or `suspended`.
    pub status: String,
}

/// The authenticated principal with its fully resolved attribute context.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubjectContext {
    /// Merged attributes from membership, assignments, and entity rows.
    pub attributes: AttributeMap,
    /// Backing user record, when it exists.
    pub user: Option<SubjectUser>,
    /// Backing workspace membership, when it exists.
    pub membership: Option<SubjectMembership>,
}

/// The resource a permission check targets.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourceContext {
    /// Resource identifier, when the check targets a concrete record.
    pub id: Option<Uuid>,
    /// Resource-level attributes.
    pub attributes: AttributeMap,
}

/// Full evaluation context handed to policy predicates.
#[derive(Debug, Clone, Copy)]
pub struct PredicateContext<'a> {
    /// The subject whose access is being decided.
    pub subject: &'a SubjectContext,
    /// The resource under evaluation, when provided by the caller.
    pub resource: Option<&'a ResourceContext>,
    /// Ambient request attributes, when provided by the caller.
    pub ambient: Option<&'a AttributeMap>,
}
