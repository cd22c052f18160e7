use std::sync::Arc;

use lattice_core::{AppResult, WorkspaceId};
use lattice_domain::ROLE_MANAGE_PERMISSIONS_KEY;
use uuid::Uuid;

use crate::policy_ports::{PermissionCatalogRepository, PolicyBindingRepository};

/// Prevents grants that would create a cycle in the "who can manage whose
/// permissions" graph.
///
/// The management model is flat: any role holding
/// `role:manage_permissions` can manage every other role in its workspace, so
/// two managing roles would manage each other. The guard is deliberately
/// conservative and admits at most one managing role per workspace; a
/// hierarchical model would need real graph traversal here.
#[derive(Clone)]
pub struct CycleGuard {
    catalog: Arc<dyn PermissionCatalogRepository>,
    bindings: Arc<dyn PolicyBindingRepository>,
}

impl CycleGuard {
    /// Creates a guard from repository implementations.
    #[must_use]
    pub fn new(
        catalog: Arc<dyn PermissionCatalogRepository>,
        bindings: Arc<dyn PolicyBindingRepository>,
    ) -> Self {
        Self { catalog, bindings }
    }

    /// Returns whether granting `new_permission_id` to `role_id` would create
    /// a management cycle in the workspace.
    ///
    /// Any permission other than `role:manage_permissions` can never create a
    /// cycle.
    pub async fn would_create_cycle(
        &self,
        role_id: Uuid,
        workspace_id: WorkspaceId,
        new_permission_id: Uuid,
    ) -> AppResult<bool> {
        let entry = self.catalog.find_by_id(new_permission_id).await?;
        let is_manage_permission = entry
            .as_ref()
            .is_some_and(|entry| entry.key == ROLE_MANAGE_PERMISSIONS_KEY);

        if !is_manage_permission {
            return Ok(false);
        }

        let managing_roles = self
            .bindings
            .list_roles_holding_key(workspace_id, ROLE_MANAGE_PERMISSIONS_KEY)
            .await?;

        // Granting again to a role that already manages is a self-cycle; a
        // second managing role would make the two manage each other.
        if managing_roles.contains(&role_id) {
            return Ok(true);
        }

        Ok(!managing_roles.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use lattice_core::WorkspaceId;
    use lattice_domain::{PermissionEntry, ROLE_MANAGE_PERMISSIONS_KEY};
    use serde_json::json;
    use uuid::Uuid;

    use crate::policy_ports::tests_support::FakePolicyRepository;
    use crate::policy_ports::PermissionBindingRecord;

    use super::CycleGuard;

    fn manage_entry() -> PermissionEntry {
        PermissionEntry {
            permission_id: Uuid::new_v4(),
            key: ROLE_MANAGE_PERMISSIONS_KEY.to_owned(),
            resource_type: "role".to_owned(),
            action: "manage_permissions".to_owned(),
            description: None,
        }
    }

    async fn bind(repository: &FakePolicyRepository, role_id: Uuid, entry: PermissionEntry) {
        repository
            .insert_binding(PermissionBindingRecord {
                role_id,
                permission_id: entry.permission_id,
                effect: lattice_domain::Effect::Allow,
                attributes: lattice_domain::attribute_map_from_json(&json!({})),
                entry: Some(entry),
                constraint: None,
            })
            .await;
    }

    #[tokio::test]
    async fn first_managing_role_in_workspace_is_allowed() {
        let workspace_id = WorkspaceId::new();
        let role_id = Uuid::new_v4();
        let repository = Arc::new(FakePolicyRepository::default());
        let entry = manage_entry();

        repository.insert_role(role_id, workspace_id, "admin").await;
        repository.insert_catalog_entry(entry.clone()).await;

        let guard = CycleGuard::new(repository.clone(), repository.clone());
        let cycle = guard
            .would_create_cycle(role_id, workspace_id, entry.permission_id)
            .await;
        assert!(!cycle.unwrap_or(true));
    }

    #[tokio::test]
    async fn regranting_to_the_managing_role_is_a_self_cycle() {
        let workspace_id = WorkspaceId::new();
        let role_id = Uuid::new_v4();
        let repository = Arc::new(FakePolicyRepository::default());
        let entry = manage_entry();

        repository.insert_role(role_id, workspace_id, "admin").await;
        repository.insert_catalog_entry(entry.clone()).await;
        bind(&repository, role_id, entry.clone()).await;

        let guard = CycleGuard::new(repository.clone(), repository.clone());
        let cycle = guard
            .would_create_cycle(role_id, workspace_id, entry.permission_id)
            .await;
        assert!(cycle.unwrap_or(false));
    }

    #[tokio::test]
    async fn second_managing_role_is_a_mutual_cycle() {
        let workspace_id = WorkspaceId::new();
        let first_role = Uuid::new_v4();
        let second_role = Uuid::new_v4();
        let repository = Arc::new(FakePolicyRepository::default());
        let entry = manage_entry();

        repository.insert_role(first_role, workspace_id, "admin").await;
        repository
            .insert_role(second_role, workspace_id, "operator")
            .await;
        repository.insert_catalog_entry(entry.clone()).await;
        bind(&repository, first_role, entry.clone()).await;

        let guard = CycleGuard::new(repository.clone(), repository.clone());
        let cycle = guard
            .would_create_cycle(second_role, workspace_id, entry.permission_id)
            .await;
        assert!(cycle.unwrap_or(false));
    }

    #[tokio::test]
    async fn managing_role_in_another_workspace_is_irrelevant() {
        let workspace_id = WorkspaceId::new();
        let other_workspace_id = WorkspaceId::new();
        let managing_role = Uuid::new_v4();
        let new_role = Uuid::new_v4();
        let repository = Arc::new(FakePolicyRepository::default());
        let entry = manage_entry();

        repository
            .insert_role(managing_role, other_workspace_id, "admin")
            .await;
        repository.insert_role(new_role, workspace_id, "admin").await;
        repository.insert_catalog_entry(entry.clone()).await;
        bind(&repository, managing_role, entry.clone()).await;

        let guard = CycleGuard::new(repository.clone(), repository.clone());
        let cycle = guard
            .would_create_cycle(new_role, workspace_id, entry.permission_id)
            .await;
        assert!(!cycle.unwrap_or(true));
    }

    #[tokio::test]
    async fn other_permissions_never_create_cycles() {
        let workspace_id = WorkspaceId::new();
        let role_id = Uuid::new_v4();
        let repository = Arc::new(FakePolicyRepository::default());
        let entry = PermissionEntry {
            permission_id: Uuid::new_v4(),
            key: "workspace:read".to_owned(),
            resource_type: "workspace".to_owned(),
            action: "read".to_owned(),
            description: None,
        };

        repository.insert_role(role_id, workspace_id, "viewer").await;
        repository.insert_catalog_entry(entry.clone()).await;

        let guard = CycleGuard::new(repository.clone(), repository.clone());
        let cycle = guard
            .would_create_cycle(role_id, workspace_id, entry.permission_id)
            .await;
        assert!(!cycle.unwrap_or(true));
    }
}
