use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lattice_application::{
    AttributeRepository, EntityAttributeRecord, MembershipRecord, PermissionBindingRecord,
    PermissionCatalogRepository, PolicyBindingRepository, RoleAssignmentRecord, UserRecord,
};
use lattice_core::{AppError, AppResult, TeamId, UserId, WorkspaceId};
use lattice_domain::{
    AttributeEntityType, Effect, PermissionEntry, PolicyConstraint, PolicyPredicate,
    attribute_map_from_json,
};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// PostgreSQL-backed repository for the permission catalog, role bindings,
/// and subject attributes.
#[derive(Clone)]
pub struct PostgresPolicyRepository {
    pool: PgPool,
}

impl PostgresPolicyRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct PermissionEntryRow {
    id: Uuid,
    key: String,
    resource_type: String,
    action: String,
    description: Option<String>,
}

impl PermissionEntryRow {
    fn into_entry(self) -> PermissionEntry {
        PermissionEntry {
            permission_id: self.id,
            key: self.key,
            resource_type: self.resource_type,
            action: self.action,
            description: self.description,
        }
    }
}

#[derive(Debug, FromRow)]
struct RoleAssignmentRow {
    user_id: Uuid,
    role_id: Uuid,
    workspace_id: Uuid,
    team_id: Option<Uuid>,
    attributes: Value,
    created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct PermissionBindingRow {
    role_id: Uuid,
    permission_id: Uuid,
    effect: String,
    attributes: Value,
    entry_key: Option<String>,
    entry_resource_type: Option<String>,
    entry_action: Option<String>,
    entry_description: Option<String>,
    constraint_id: Option<Uuid>,
    constraint_name: Option<String>,
    constraint_predicate: Option<Value>,
}

impl PermissionBindingRow {
    fn into_record(self) -> AppResult<PermissionBindingRecord> {
        let effect = Effect::from_str(self.effect.as_str()).map_err(|error| {
            AppError::Internal(format!(
                "failed to decode effect for role '{}': {error}",
                self.role_id
            ))
        })?;

        let entry = match (self.entry_key, self.entry_resource_type, self.entry_action) {
            (Some(key), Some(resource_type), Some(action)) => Some(PermissionEntry {
                permission_id: self.permission_id,
                key,
                resource_type,
                action,
                description: self.entry_description,
            }),
            _ => {
                tracing::warn!(
                    role_id = %self.role_id,
                    permission_id = %self.permission_id,
                    "permission binding references a missing catalog entry"
                );
                None
            }
        };

        let constraint = match (self.constraint_id, self.constraint_name) {
            (Some(constraint_id), Some(name)) => Some(PolicyConstraint {
                constraint_id,
                name,
                predicate: self
                    .constraint_predicate
                    .as_ref()
                    .map(PolicyPredicate::from_json)
                    .unwrap_or(PolicyPredicate::Always),
            }),
            _ => None,
        };

        Ok(PermissionBindingRecord {
            role_id: self.role_id,
            permission_id: self.permission_id,
            effect,
            attributes: attribute_map_from_json(&self.attributes),
            entry,
            constraint,
        })
    }
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
}

#[derive(Debug, FromRow)]
struct MembershipRow {
    user_id: Uuid,
    workspace_id: Uuid,
    status: String,
    attributes: Value,
}

#[derive(Debug, FromRow)]
struct EntityAttributeRow {
    key: String,
    value: Value,
}

#[derive(Debug, FromRow)]
struct RoleIdRow {
    role_id: Uuid,
}

#[async_trait]
impl PermissionCatalogRepository for PostgresPolicyRepository {
    async fn find_by_key(&self, key: &str) -> AppResult<Option<PermissionEntry>> {
        let row = sqlx::query_as::<_, PermissionEntryRow>(
            r#"
            SELECT id, key, resource_type, action, description
            FROM permissions_catalog
            WHERE key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to load catalog entry '{key}': {error}"))
        })?;

        Ok(row.map(PermissionEntryRow::into_entry))
    }

    async fn find_by_id(&self, permission_id: Uuid) -> AppResult<Option<PermissionEntry>> {
        let row = sqlx::query_as::<_, PermissionEntryRow>(
            r#"
            SELECT id, key, resource_type, action, description
            FROM permissions_catalog
            WHERE id = $1
            "#,
        )
        .bind(permission_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to load catalog entry '{permission_id}': {error}"
            ))
        })?;

        Ok(row.map(PermissionEntryRow::into_entry))
    }
}

#[async_trait]
impl PolicyBindingRepository for PostgresPolicyRepository {
    async fn list_role_assignments(
        &self,
        user_id: UserId,
        workspace_id: WorkspaceId,
        team_id: Option<TeamId>,
    ) -> AppResult<Vec<RoleAssignmentRecord>> {
        let rows = sqlx::query_as::<_, RoleAssignmentRow>(
            r#"
            SELECT user_id, role_id, workspace_id, team_id, attributes, created_at
            FROM role_assignments
            WHERE user_id = $1
                AND workspace_id = $2
                AND (($3::uuid IS NULL AND team_id IS NULL) OR team_id = $3)
            ORDER BY created_at ASC
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(workspace_id.as_uuid())
        .bind(team_id.map(|team_id| team_id.as_uuid()))
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to load role assignments for user '{user_id}' in workspace '{workspace_id}': {error}"
            ))
        })?;

        Ok(rows
            .into_iter()
            .map(|row| RoleAssignmentRecord {
                user_id: UserId::from_uuid(row.user_id),
                role_id: row.role_id,
                workspace_id: WorkspaceId::from_uuid(row.workspace_id),
                team_id: row.team_id.map(TeamId::from_uuid),
                attributes: attribute_map_from_json(&row.attributes),
                created_at: row.created_at,
            })
            .collect())
    }

    async fn list_permission_bindings(
        &self,
        role_ids: &[Uuid],
    ) -> AppResult<Vec<PermissionBindingRecord>> {
        let rows = sqlx::query_as::<_, PermissionBindingRow>(
            r#"
            SELECT
                bindings.role_id,
                bindings.permission_id,
                bindings.effect,
                bindings.attributes,
                catalog.key AS entry_key,
                catalog.resource_type AS entry_resource_type,
                catalog.action AS entry_action,
                catalog.description AS entry_description,
                constraints.id AS constraint_id,
                constraints.name AS constraint_name,
                constraints.predicate AS constraint_predicate
            FROM role_permissions AS bindings
            LEFT JOIN permissions_catalog AS catalog
                ON catalog.id = bindings.permission_id
            LEFT JOIN policy_constraints AS constraints
                ON constraints.id = bindings.constraint_id
            WHERE bindings.role_id = ANY($1)
            "#,
        )
        .bind(role_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to load permission bindings: {error}"))
        })?;

        rows.into_iter()
            .map(PermissionBindingRow::into_record)
            .collect()
    }

    async fn list_roles_holding_key(
        &self,
        workspace_id: WorkspaceId,
        key: &str,
    ) -> AppResult<Vec<Uuid>> {
        let rows = sqlx::query_as::<_, RoleIdRow>(
            r#"
            SELECT DISTINCT bindings.role_id
            FROM role_permissions AS bindings
            INNER JOIN permissions_catalog AS catalog
                ON catalog.id = bindings.permission_id
            INNER JOIN roles
                ON roles.id = bindings.role_id
            WHERE roles.workspace_id = $1
                AND catalog.key = $2
            ORDER BY bindings.role_id ASC
            "#,
        )
        .bind(workspace_id.as_uuid())
        .bind(key)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to load roles holding '{key}' in workspace '{workspace_id}': {error}"
            ))
        })?;

        Ok(rows.into_iter().map(|row| row.role_id).collect())
    }
}

#[async_trait]
impl AttributeRepository for PostgresPolicyRepository {
    async fn find_user(&self, user_id: UserId) -> AppResult<Option<UserRecord>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load user '{user_id}': {error}")))?;

        Ok(row.map(|row| UserRecord {
            user_id: UserId::from_uuid(row.id),
            email: row.email,
        }))
    }

    async fn find_membership(
        &self,
        user_id: UserId,
        workspace_id: WorkspaceId,
    ) -> AppResult<Option<MembershipRecord>> {
        let row = sqlx::query_as::<_, MembershipRow>(
            r#"
            SELECT user_id, workspace_id, status, attributes
            FROM workspace_memberships
            WHERE user_id = $1
                AND workspace_id = $2
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(workspace_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to load membership of user '{user_id}' in workspace '{workspace_id}': {error}"
            ))
        })?;

        Ok(row.map(|row| MembershipRecord {
            user_id: UserId::from_uuid(row.user_id),
            workspace_id: WorkspaceId::from_uuid(row.workspace_id),
            status: row.status,
            attributes: attribute_map_from_json(&row.attributes),
        }))
    }

    async fn list_entity_attributes(
        &self,
        entity_type: AttributeEntityType,
        entity_id: Uuid,
    ) -> AppResult<Vec<EntityAttributeRecord>> {
        let rows = sqlx::query_as::<_, EntityAttributeRow>(
            r#"
            SELECT key, value
            FROM entity_attributes
            WHERE entity_type = $1
                AND entity_id = $2
            ORDER BY key ASC
            "#,
        )
        .bind(entity_type.as_str())
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to load attributes of {} '{entity_id}': {error}",
                entity_type.as_str()
            ))
        })?;

        Ok(rows
            .into_iter()
            .map(|row| EntityAttributeRecord {
                key: row.key,
                value: row.value,
            })
            .collect())
    }
}
