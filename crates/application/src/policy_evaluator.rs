use std::sync::Arc;

use lattice_core::{AppResult, TeamId, UserId, WorkspaceId};
use lattice_domain::{
    AttributeMap, PermissionKey, PolicyPredicate, PredicateContext, ResourceContext,
};
use uuid::Uuid;

use crate::attribute_resolver::AttributeResolver;
use crate::policy_ports::PolicyBindingRepository;

/// One authorization question: may this subject perform this action here?
#[derive(Debug, Clone)]
pub struct AccessRequest {
    /// The subject whose access is being decided.
    pub user_id: UserId,
    /// Workspace scope of the check.
    pub workspace_id: WorkspaceId,
    /// Team scope; `None` restricts to workspace-level role assignments.
    pub team_id: Option<TeamId>,
    /// The concrete permission being requested.
    pub permission_key: PermissionKey,
    /// The resource under evaluation, when the check targets one.
    pub resource: Option<ResourceContext>,
    /// Ambient request attributes.
    pub ambient: Option<AttributeMap>,
}

/// Decides allow/deny for a subject, permission, and scope.
///
/// Candidate bindings are evaluated in whatever order the store returns them;
/// the decision is order-independent because a passing deny always
/// short-circuits to `false` and allows merely accumulate.
#[derive(Clone)]
pub struct PolicyEvaluator {
    bindings: Arc<dyn PolicyBindingRepository>,
    resolver: AttributeResolver,
}

impl PolicyEvaluator {
    /// Creates an evaluator from a binding repository and attribute resolver.
    #[must_use]
    pub fn new(bindings: Arc<dyn PolicyBindingRepository>, resolver: AttributeResolver) -> Self {
        Self { bindings, resolver }
    }

    /// Evaluates whether the request's subject holds the requested
    /// permission.
    ///
    /// `Ok(false)` is a normal decision outcome, never an error; store
    /// failures propagate as errors. Deny overrides allow, a subject with no
    /// role assignments in scope is denied by default, and a constraint whose
    /// predicate shape is unrecognized fails closed.
    pub async fn is_allowed(&self, request: &AccessRequest) -> AppResult<bool> {
        let assignments = self
            .bindings
            .list_role_assignments(request.user_id, request.workspace_id, request.team_id)
            .await?;

        if assignments.is_empty() {
            return Ok(false);
        }

        let mut role_ids: Vec<Uuid> = assignments
            .iter()
            .map(|assignment| assignment.role_id)
            .collect();
        role_ids.sort();
        role_ids.dedup();

        let bindings = self.bindings.list_permission_bindings(&role_ids).await?;
        let candidates: Vec<_> = bindings
            .into_iter()
            .filter(|binding| {
                binding
                    .entry
                    .as_ref()
                    .is_some_and(|entry| entry.matches(&request.permission_key))
            })
            .collect();

        if candidates.is_empty() {
            return Ok(false);
        }

        let subject = self
            .resolver
            .resolve_subject_with_assignments(
                request.user_id,
                request.workspace_id,
                request.team_id,
                &assignments,
            )
            .await?;

        let context = PredicateContext {
            subject: &subject,
            resource: request.resource.as_ref(),
            ambient: request.ambient.as_ref(),
        };

        let mut any_allow = false;
        for candidate in candidates {
            let predicate = candidate
                .constraint
                .as_ref()
                .map_or(&PolicyPredicate::Always, |constraint| &constraint.predicate);

            if !predicate.is_recognized() {
                tracing::warn!(
                    user_id = %request.user_id,
                    workspace_id = %request.workspace_id,
                    permission_key = %request.permission_key,
                    role_id = %candidate.role_id,
                    "unrecognized policy predicate shape, failing closed"
                );
            }

            if !predicate.evaluate(&context) {
                continue;
            }

            match candidate.effect {
                lattice_domain::Effect::Deny => return Ok(false),
                lattice_domain::Effect::Allow => any_allow = true,
            }
        }

        Ok(any_allow)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use lattice_core::{UserId, WorkspaceId};
    use lattice_domain::{
        AttributeMap, Effect, PermissionEntry, PermissionKey, PolicyConstraint, PolicyPredicate,
    };
    use serde_json::json;
    use uuid::Uuid;

    use crate::attribute_resolver::AttributeResolver;
    use crate::policy_ports::tests_support::FakePolicyRepository;
    use crate::policy_ports::PermissionBindingRecord;

    use super::{AccessRequest, PolicyEvaluator};

    fn entry(key: &str) -> PermissionEntry {
        let (resource_type, action) = match key.split_once(':') {
            Some((resource_type, action)) => (resource_type.to_owned(), action.to_owned()),
            None => (key.to_owned(), key.to_owned()),
        };
        PermissionEntry {
            permission_id: Uuid::new_v4(),
            key: key.to_owned(),
            resource_type,
            action,
            description: None,
        }
    }

    fn binding(
        role_id: Uuid,
        entry: PermissionEntry,
        effect: Effect,
        predicate: Option<PolicyPredicate>,
    ) -> PermissionBindingRecord {
        PermissionBindingRecord {
            role_id,
            permission_id: entry.permission_id,
            effect,
            attributes: AttributeMap::new(),
            entry: Some(entry),
            constraint: predicate.map(|predicate| PolicyConstraint {
                constraint_id: Uuid::new_v4(),
                name: "test constraint".to_owned(),
                predicate,
            }),
        }
    }

    fn request(user_id: UserId, workspace_id: WorkspaceId, key: &str) -> AccessRequest {
        AccessRequest {
            user_id,
            workspace_id,
            team_id: None,
            permission_key: PermissionKey::new(key)
                .unwrap_or_else(|_| panic!("invalid test permission key '{key}'")),
            resource: None,
            ambient: None,
        }
    }

    fn evaluator(repository: &Arc<FakePolicyRepository>) -> PolicyEvaluator {
        PolicyEvaluator::new(
            repository.clone(),
            AttributeResolver::new(repository.clone(), repository.clone()),
        )
    }

    #[tokio::test]
    async fn subject_without_assignments_is_denied_by_default() {
        let repository = Arc::new(FakePolicyRepository::default());
        let evaluator = evaluator(&repository);

        let decision = evaluator
            .is_allowed(&request(UserId::new(), WorkspaceId::new(), "workspace:read"))
            .await;
        assert!(!decision.unwrap_or(true));
    }

    #[tokio::test]
    async fn matching_allow_binding_grants_access() {
        let user_id = UserId::new();
        let workspace_id = WorkspaceId::new();
        let role_id = Uuid::new_v4();
        let repository = Arc::new(FakePolicyRepository::default());

        repository
            .insert_assignment(user_id, role_id, workspace_id, None, json!({}))
            .await;
        repository
            .insert_binding(binding(role_id, entry("workspace:read"), Effect::Allow, None))
            .await;

        let evaluator = evaluator(&repository);
        let decision = evaluator
            .is_allowed(&request(user_id, workspace_id, "workspace:read"))
            .await;
        assert!(decision.unwrap_or(false));
    }

    #[tokio::test]
    async fn deny_overrides_allow_regardless_of_binding_order() {
        let user_id = UserId::new();
        let workspace_id = WorkspaceId::new();
        let role_id = Uuid::new_v4();
        let repository = Arc::new(FakePolicyRepository::default());

        repository
            .insert_assignment(user_id, role_id, workspace_id, None, json!({}))
            .await;
        repository
            .insert_binding(binding(role_id, entry("workspace:read"), Effect::Allow, None))
            .await;
        repository
            .insert_binding(binding(role_id, entry("workspace:read"), Effect::Deny, None))
            .await;

        let evaluator = evaluator(&repository);
        let decision = evaluator
            .is_allowed(&request(user_id, workspace_id, "workspace:read"))
            .await;
        assert!(!decision.unwrap_or(true));
    }

    #[tokio::test]
    async fn wildcard_bindings_match_broadly() {
        let user_id = UserId::new();
        let workspace_id = WorkspaceId::new();
        let role_id = Uuid::new_v4();
        let repository = Arc::new(FakePolicyRepository::default());

        repository
            .insert_assignment(user_id, role_id, workspace_id, None, json!({}))
            .await;
        let mut global = entry("*");
        global.resource_type = "*".to_owned();
        global.action = "*".to_owned();
        repository
            .insert_binding(binding(role_id, global, Effect::Allow, None))
            .await;

        let evaluator = evaluator(&repository);
        for key in ["workspace:read", "issue:delete", "team:update"] {
            let decision = evaluator
                .is_allowed(&request(user_id, workspace_id, key))
                .await;
            assert!(decision.unwrap_or(false), "key {key} should match '*'");
        }
    }

    #[tokio::test]
    async fn axis_wildcard_binding_respects_the_concrete_axis() {
        let user_id = UserId::new();
        let workspace_id = WorkspaceId::new();
        let role_id = Uuid::new_v4();
        let repository = Arc::new(FakePolicyRepository::default());

        repository
            .insert_assignment(user_id, role_id, workspace_id, None, json!({}))
            .await;
        let mut workspace_any = entry("workspace:*");
        workspace_any.action = "*".to_owned();
        repository
            .insert_binding(binding(role_id, workspace_any, Effect::Allow, None))
            .await;

        let evaluator = evaluator(&repository);
        let read = evaluator
            .is_allowed(&request(user_id, workspace_id, "workspace:read"))
            .await;
        assert!(read.unwrap_or(false));

        let update = evaluator
            .is_allowed(&request(user_id, workspace_id, "workspace:update"))
            .await;
        assert!(update.unwrap_or(false));

        let team_read = evaluator
            .is_allowed(&request(user_id, workspace_id, "team:read"))
            .await;
        assert!(!team_read.unwrap_or(true));
    }

    #[tokio::test]
    async fn constraint_gates_on_subject_attributes() {
        let user_id = UserId::new();
        let workspace_id = WorkspaceId::new();
        let role_id = Uuid::new_v4();
        let repository = Arc::new(FakePolicyRepository::default());

        repository
            .insert_assignment(user_id, role_id, workspace_id, None, json!({}))
            .await;
        repository
            .upsert_membership(user_id, workspace_id, "active", json!({"department": "fraud"}))
            .await;
        repository
            .insert_binding(binding(
                role_id,
                entry("issue:delete"),
                Effect::Allow,
                Some(PolicyPredicate::from_json(&json!({
                    "subject": {"attribute_equals": {"department": "fraud"}}
                }))),
            ))
            .await;

        let evaluator = evaluator(&repository);
        let decision = evaluator
            .is_allowed(&request(user_id, workspace_id, "issue:delete"))
            .await;
        assert!(decision.unwrap_or(false));
    }

    #[tokio::test]
    async fn unrecognized_predicate_fails_closed() {
        let user_id = UserId::new();
        let workspace_id = WorkspaceId::new();
        let role_id = Uuid::new_v4();
        let repository = Arc::new(FakePolicyRepository::default());

        repository
            .insert_assignment(user_id, role_id, workspace_id, None, json!({}))
            .await;
        repository
            .insert_binding(binding(
                role_id,
                entry("issue:delete"),
                Effect::Allow,
                Some(PolicyPredicate::from_json(&json!({
                    "resource": {"owner_is_subject": true}
                }))),
            ))
            .await;

        let evaluator = evaluator(&repository);
        let decision = evaluator
            .is_allowed(&request(user_id, workspace_id, "issue:delete"))
            .await;
        assert!(!decision.unwrap_or(true));
    }

    #[tokio::test]
    async fn team_scoped_assignment_is_invisible_to_workspace_checks() {
        let user_id = UserId::new();
        let workspace_id = WorkspaceId::new();
        let team_id = lattice_core::TeamId::new();
        let role_id = Uuid::new_v4();
        let repository = Arc::new(FakePolicyRepository::default());

        repository
            .insert_assignment(user_id, role_id, workspace_id, Some(team_id), json!({}))
            .await;
        repository
            .insert_binding(binding(role_id, entry("workspace:read"), Effect::Allow, None))
            .await;

        let evaluator = evaluator(&repository);
        let workspace_level = evaluator
            .is_allowed(&request(user_id, workspace_id, "workspace:read"))
            .await;
        assert!(!workspace_level.unwrap_or(true));

        let mut team_request = request(user_id, workspace_id, "workspace:read");
        team_request.team_id = Some(team_id);
        let team_level = evaluator.is_allowed(&team_request).await;
        assert!(team_level.unwrap_or(false));
    }
}
