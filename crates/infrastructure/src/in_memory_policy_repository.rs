use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use lattice_application::{
    AttributeRepository, EntityAttributeRecord, MembershipRecord, PermissionBindingRecord,
    PermissionCatalogRepository, PolicyBindingRepository, RoleAssignmentRecord,
    RoleDefinitionRecord, UserRecord,
};
use lattice_core::{AppError, AppResult, TeamId, UserId, WorkspaceId};
use lattice_domain::{AttributeEntityType, AttributeMap, PermissionEntry};
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory policy store implementation.
///
/// Backs the catalog, binding, and attribute ports with shared maps. Intended
/// for tests and local development; writes happen through the seeding methods
/// rather than a repository port.
#[derive(Debug, Default)]
pub struct InMemoryPolicyRepository {
    catalog: RwLock<HashMap<Uuid, PermissionEntry>>,
    roles: RwLock<HashMap<Uuid, RoleDefinitionRecord>>,
    assignments: RwLock<Vec<RoleAssignmentRecord>>,
    bindings: RwLock<Vec<PermissionBindingRecord>>,
    users: RwLock<HashMap<UserId, UserRecord>>,
    memberships: RwLock<HashMap<(UserId, WorkspaceId), MembershipRecord>>,
    entity_attributes: RwLock<HashMap<(AttributeEntityType, Uuid), Vec<EntityAttributeRecord>>>,
}

impl InMemoryPolicyRepository {
    /// Creates an empty in-memory policy store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a catalog entry, replacing any entry with the same id.
    pub async fn register_permission(&self, entry: PermissionEntry) {
        self.catalog
            .write()
            .await
            .insert(entry.permission_id, entry);
    }

    /// Creates a role in a workspace.
    ///
    /// Fails with `Conflict` when another role in the same scope already
    /// carries the name.
    pub async fn create_role(
        &self,
        role_id: Uuid,
        workspace_id: WorkspaceId,
        team_id: Option<TeamId>,
        name: &str,
    ) -> AppResult<()> {
        let mut roles = self.roles.write().await;

        let name_taken = roles.values().any(|role| {
            role.workspace_id == workspace_id && role.team_id == team_id && role.name == name
        });
        if name_taken {
            return Err(AppError::Conflict(format!(
                "role '{name}' already exists in workspace '{workspace_id}'"
            )));
        }

        roles.insert(
            role_id,
            RoleDefinitionRecord {
                role_id,
                workspace_id,
                team_id,
                name: name.to_owned(),
                is_system: false,
                created_at: Utc::now(),
            },
        );
        Ok(())
    }

    /// Assigns a role to a user within the role's workspace.
    ///
    /// Fails with `NotFound` when the role does not exist.
    pub async fn assign_role(
        &self,
        user_id: UserId,
        role_id: Uuid,
        team_id: Option<TeamId>,
        attributes: AttributeMap,
    ) -> AppResult<()> {
        let workspace_id = self
            .roles
            .read()
            .await
            .get(&role_id)
            .map(|role| role.workspace_id)
            .ok_or_else(|| AppError::NotFound(format!("role '{role_id}' not found")))?;

        self.assignments.write().await.push(RoleAssignmentRecord {
            user_id,
            role_id,
            workspace_id,
            team_id,
            attributes,
            created_at: Utc::now(),
        });
        Ok(())
    }

    /// Binds a catalog permission to a role, joined views included.
    pub async fn bind_permission(&self, binding: PermissionBindingRecord) {
        self.bindings.write().await.push(binding);
    }

    /// Inserts or replaces a user record.
    pub async fn upsert_user(&self, user: UserRecord) {
        self.users.write().await.insert(user.user_id, user);
    }

    /// Inserts or replaces a workspace membership.
    pub async fn upsert_membership(&self, membership: MembershipRecord) {
        self.memberships
            .write()
            .await
            .insert((membership.user_id, membership.workspace_id), membership);
    }

    /// Replaces the attribute rows attached to one entity.
    pub async fn set_entity_attributes(
        &self,
        entity_type: AttributeEntityType,
        entity_id: Uuid,
        rows: Vec<EntityAttributeRecord>,
    ) {
        self.entity_attributes
            .write()
            .await
            .insert((entity_type, entity_id), rows);
    }
}

#[async_trait]
impl PermissionCatalogRepository for InMemoryPolicyRepository {
    async fn find_by_key(&self, key: &str) -> AppResult<Option<PermissionEntry>> {
        Ok(self
            .catalog
            .read()
            .await
            .values()
            .find(|entry| entry.key == key)
            .cloned())
    }

    async fn find_by_id(&self, permission_id: Uuid) -> AppResult<Option<PermissionEntry>> {
        Ok(self.catalog.read().await.get(&permission_id).cloned())
    }
}

#[async_trait]
impl PolicyBindingRepository for InMemoryPolicyRepository {
    async fn list_role_assignments(
        &self,
        user_id: UserId,
        workspace_id: WorkspaceId,
        team_id: Option<TeamId>,
    ) -> AppResult<Vec<RoleAssignmentRecord>> {
        Ok(self
            .assignments
            .read()
            .await
            .iter()
            .filter(|assignment| {
                assignment.user_id == user_id
                    && assignment.workspace_id == workspace_id
                    && assignment.team_id == team_id
            })
            .cloned()
            .collect())
    }

    async fn list_permission_bindings(
        &self,
        role_ids: &[Uuid],
    ) -> AppResult<Vec<PermissionBindingRecord>> {
        Ok(self
            .bindings
            .read()
            .await
            .iter()
            .filter(|binding| role_ids.contains(&binding.role_id))
            .cloned()
            .collect())
    }

    async fn list_roles_holding_key(
        &self,
        workspace_id: WorkspaceId,
        key: &str,
    ) -> AppResult<Vec<Uuid>> {
        let roles = self.roles.read().await;
        let mut holding: Vec<Uuid> = self
            .bindings
            .read()
            .await
            .iter()
            .filter(|binding| {
                binding
                    .entry
                    .as_ref()
                    .is_some_and(|entry| entry.key == key)
                    && roles
                        .get(&binding.role_id)
                        .is_some_and(|role| role.workspace_id == workspace_id)
            })
            .map(|binding| binding.role_id)
            .collect();
        holding.sort();
        holding.dedup();
        Ok(holding)
    }
}

#[async_trait]
impl AttributeRepository for InMemoryPolicyRepository {
    async fn find_user(&self, user_id: UserId) -> AppResult<Option<UserRecord>> {
        Ok(self.users.read().await.get(&user_id).cloned())
    }

    async fn find_membership(
        &self,
        user_id: UserId,
        workspace_id: WorkspaceId,
    ) -> AppResult<Option<MembershipRecord>> {
        Ok(self
            .memberships
            .read()
            .await
            .get(&(user_id, workspace_id))
            .cloned())
    }

    async fn list_entity_attributes(
        &self,
        entity_type: AttributeEntityType,
        entity_id: Uuid,
    ) -> AppResult<Vec<EntityAttributeRecord>> {
        Ok(self
            .entity_attributes
            .read()
            .await
            .get(&(entity_type, entity_id))
            .cloned()
            .unwrap_or_default())
    }
}
