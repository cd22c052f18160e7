use std::sync::Arc;

use lattice_core::{AppResult, TeamId, UserId, WorkspaceId};
use lattice_domain::{
    AttributeEntityType, AttributeMap, SubjectContext, SubjectMembership, SubjectUser,
};

use crate::policy_ports::{AttributeRepository, PolicyBindingRepository, RoleAssignmentRecord};

/// Aggregates attributes for a subject into one merged context.
///
/// Merge precedence, later sources overriding earlier ones on key collision:
/// workspace-membership attributes, role-assignment attributes (in the order
/// the store returns assignments, which is not deterministic across multiple
/// assignments), user entity attributes, workspace entity attributes, and
/// team entity attributes when a team scope is given.
#[derive(Clone)]
pub struct AttributeResolver {
    attributes: Arc<dyn AttributeRepository>,
    bindings: Arc<dyn PolicyBindingRepository>,
}

impl AttributeResolver {
    /// Creates a resolver from repository implementations.
    #[must_use]
    pub fn new(
        attributes: Arc<dyn AttributeRepository>,
        bindings: Arc<dyn PolicyBindingRepository>,
    ) -> Self {
        Self {
            attributes,
            bindings,
        }
    }

    /// Resolves the merged attribute map for a subject.
    pub async fn resolve(
        &self,
        user_id: UserId,
        workspace_id: WorkspaceId,
        team_id: Option<TeamId>,
    ) -> AppResult<AttributeMap> {
        let assignments = self
            .bindings
            .list_role_assignments(user_id, workspace_id, team_id)
            .await?;

        let subject = self
            .resolve_subject_with_assignments(user_id, workspace_id, team_id, &assignments)
            .await?;

        Ok(subject.attributes)
    }

    /// Resolves the full subject context, including the convenience user and
    /// membership projections, for a subject whose role assignments are
    /// already loaded.
    pub async fn resolve_subject_with_assignments(
        &self,
        user_id: UserId,
        workspace_id: WorkspaceId,
        team_id: Option<TeamId>,
        assignments: &[RoleAssignmentRecord],
    ) -> AppResult<SubjectContext> {
        let user = self.attributes.find_user(user_id).await?;
        let membership = self
            .attributes
            .find_membership(user_id, workspace_id)
            .await?;

        let mut attributes = AttributeMap::new();

        if let Some(membership) = &membership {
            attributes.extend(membership.attributes.clone());
        }

        for assignment in assignments {
            attributes.extend(assignment.attributes.clone());
        }

        self.merge_entity_attributes(&mut attributes, AttributeEntityType::User, user_id.as_uuid())
            .await?;
        self.merge_entity_attributes(
            &mut attributes,
            AttributeEntityType::Workspace,
            workspace_id.as_uuid(),
        )
        .await?;

        if let Some(team_id) = team_id {
            self.merge_entity_attributes(
                &mut attributes,
                AttributeEntityType::Team,
                team_id.as_uuid(),
            )
            .await?;
        }

        Ok(SubjectContext {
            attributes,
            user: user.map(|record| SubjectUser {
                id: record.user_id,
                email: record.email,
            }),
            membership: membership.map(|record| SubjectMembership {
                workspace_id: record.workspace_id,
                status: record.status,
            }),
        })
    }

    async fn merge_entity_attributes(
        &self,
        attributes: &mut AttributeMap,
        entity_type: AttributeEntityType,
        entity_id: uuid::Uuid,
    ) -> AppResult<()> {
        let rows = self
            .attributes
            .list_entity_attributes(entity_type, entity_id)
            .await?;

        for row in rows {
            attributes.insert(row.key, row.value);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use lattice_core::{TeamId, UserId, WorkspaceId};
    use serde_json::json;

    use crate::policy_ports::tests_support::FakePolicyRepository;

    use super::AttributeResolver;

    #[tokio::test]
    async fn precedence_later_sources_override_earlier() {
        let user_id = UserId::new();
        let workspace_id = WorkspaceId::new();
        let team_id = TeamId::new();
        let repository = Arc::new(FakePolicyRepository::default());

        repository
            .upsert_membership(user_id, workspace_id, "active", json!({"tier": "member", "region": "emea"}))
            .await;
        repository
            .set_entity_attributes(
                lattice_domain::AttributeEntityType::User,
                user_id.as_uuid(),
                json!({"tier": "staff"}),
            )
            .await;
        repository
            .set_entity_attributes(
                lattice_domain::AttributeEntityType::Workspace,
                workspace_id.as_uuid(),
                json!({"region": "apac"}),
            )
            .await;
        repository
            .set_entity_attributes(
                lattice_domain::AttributeEntityType::Team,
                team_id.as_uuid(),
                json!({"region": "emea-north"}),
            )
            .await;

        let resolver = AttributeResolver::new(repository.clone(), repository.clone());
        let attributes = resolver
            .resolve(user_id, workspace_id, Some(team_id))
            .await
            .unwrap_or_default();

        assert_eq!(attributes.get("tier"), Some(&json!("staff")));
        assert_eq!(attributes.get("region"), Some(&json!("emea-north")));
    }

    #[tokio::test]
    async fn team_attributes_are_skipped_without_team_scope() {
        let user_id = UserId::new();
        let workspace_id = WorkspaceId::new();
        let team_id = TeamId::new();
        let repository = Arc::new(FakePolicyRepository::default());

        repository
            .set_entity_attributes(
                lattice_domain::AttributeEntityType::Team,
                team_id.as_uuid(),
                json!({"region": "emea-north"}),
            )
            .await;

        let resolver = AttributeResolver::new(repository.clone(), repository.clone());
        let attributes = resolver
            .resolve(user_id, workspace_id, None)
            .await
            .unwrap_or_default();

        assert!(attributes.get("region").is_none());
    }
}
