use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lattice_core::{AppResult, TeamId, UserId, WorkspaceId};
use lattice_domain::{AttributeEntityType, AttributeMap, Effect, PermissionEntry, PolicyConstraint};
use serde_json::Value;
use uuid::Uuid;

/// A role scoped to a workspace, optionally narrowed to one team.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleDefinitionRecord {
    /// Stable role identifier.
    pub role_id: Uuid,
    /// Workspace the role belongs to.
    pub workspace_id: WorkspaceId,
    /// Team scope, when the role is narrower than the workspace.
    pub team_id: Option<TeamId>,
    /// Unique role name within its scope.
    pub name: String,
    /// Whether the role is a built-in that cannot be deleted.
    pub is_system: bool,
    /// Role creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// An edge binding a user to a role within a workspace and optional team.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAssignmentRecord {
    /// The assigned user.
    pub user_id: UserId,
    /// The assigned role.
    pub role_id: Uuid,
    /// Workspace scope of the assignment.
    pub workspace_id: WorkspaceId,
    /// Team scope, when the assignment is team-level.
    pub team_id: Option<TeamId>,
    /// Assignment-level attributes merged into the subject context.
    pub attributes: AttributeMap,
    /// Assignment creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A role-permission binding joined with its catalog entry and optional
/// constraint, as returned by the store in no guaranteed order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionBindingRecord {
    /// The role holding the binding.
    pub role_id: Uuid,
    /// The bound catalog permission.
    pub permission_id: Uuid,
    /// Allow or deny.
    pub effect: Effect,
    /// Free-form binding attributes.
    pub attributes: AttributeMap,
    /// Joined catalog entry; absent when the catalog row was deleted.
    pub entry: Option<PermissionEntry>,
    /// Joined constraint; absent for unconditional bindings.
    pub constraint: Option<PolicyConstraint>,
}

/// Projection of a user record for subject context assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    /// Stable user identifier.
    pub user_id: UserId,
    /// User email address.
    pub email: String,
}

/// Projection of a workspace membership for subject context assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipRecord {
    /// The member user.
    pub user_id: UserId,
    /// The workspace joined.
    pub workspace_id: WorkspaceId,
    /// Membership status, e.g. `active` or `suspended`.
    pub status: String,
    /// Membership-level attributes.
    pub attributes: AttributeMap,
}

/// One `(key, value)` attribute row attached to an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityAttributeRecord {
    /// Attribute key.
    pub key: String,
    /// Attribute value.
    pub value: Value,
}

/// Repository port for permission catalog lookups.
#[async_trait]
pub trait PermissionCatalogRepository: Send + Sync {
    /// Finds a catalog entry by its exact key, including the literal `*`.
    async fn find_by_key(&self, key: &str) -> AppResult<Option<PermissionEntry>>;

    /// Finds a catalog entry by its identifier.
    async fn find_by_id(&self, permission_id: Uuid) -> AppResult<Option<PermissionEntry>>;
}

/// Repository port for role assignments and role-permission bindings.
#[async_trait]
pub trait PolicyBindingRepository: Send + Sync {
    /// Lists role assignments for a user in a workspace.
    ///
    /// `team_id` of `None` means workspace-level assignments only (null team
    /// scope); `Some` restricts to assignments scoped to exactly that team.
    async fn list_role_assignments(
        &self,
        user_id: UserId,
        workspace_id: WorkspaceId,
        team_id: Option<TeamId>,
    ) -> AppResult<Vec<RoleAssignmentRecord>>;

    /// Lists permission bindings for any of the given roles, joined with
    /// catalog entries and constraints.
    async fn list_permission_bindings(
        &self,
        role_ids: &[Uuid],
    ) -> AppResult<Vec<PermissionBindingRecord>>;

    /// Lists the distinct roles in a workspace that hold the catalog
    /// permission with the given exact key.
    async fn list_roles_holding_key(
        &self,
        workspace_id: WorkspaceId,
        key: &str,
    ) -> AppResult<Vec<Uuid>>;
}

/// Repository port for subject attribute aggregation.
#[async_trait]
pub trait AttributeRepository: Send + Sync {
    /// Finds the user record backing a subject.
    async fn find_user(&self, user_id: UserId) -> AppResult<Option<UserRecord>>;

    /// Finds a user's membership in a workspace.
    async fn find_membership(
        &self,
        user_id: UserId,
        workspace_id: WorkspaceId,
    ) -> AppResult<Option<MembershipRecord>>;

    /// Lists attribute rows attached to one entity.
    async fn list_entity_attributes(
        &self,
        entity_type: AttributeEntityType,
        entity_id: Uuid,
    ) -> AppResult<Vec<EntityAttributeRecord>>;
}
