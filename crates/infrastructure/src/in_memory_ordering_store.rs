use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use lattice_application::{LockedItem, OrderingStore, OrderingTransaction};
use lattice_core::{AppError, AppResult};
use lattice_domain::{IssueId, Rank, RankedItem, ScopeId};
use tokio::sync::{Mutex, OwnedMutexGuard};

type ItemMap = HashMap<IssueId, (ScopeId, Rank)>;

/// In-memory ordering store implementation.
///
/// A transaction holds the store-wide lock for its whole lifetime, so
/// concurrent ordering operations fully serialize, mirroring the row-lock
/// discipline of the PostgreSQL adapter in the strongest possible form.
/// Writes buffer into a working copy and become visible on commit; dropping a
/// transaction without committing discards them.
#[derive(Debug, Default)]
pub struct InMemoryOrderingStore {
    items: Arc<Mutex<ItemMap>>,
}

impl InMemoryOrderingStore {
    /// Creates an empty in-memory ordering store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds one issue into a scope at the given rank.
    ///
    /// Fails with `Conflict` when the rank is already taken within the scope.
    pub async fn insert_issue(
        &self,
        issue_id: IssueId,
        scope_id: ScopeId,
        rank: Rank,
    ) -> AppResult<()> {
        let mut items = self.items.lock().await;
        ensure_rank_free(&items, issue_id, scope_id, &rank)?;
        items.insert(issue_id, (scope_id, rank));
        Ok(())
    }

    /// Returns the committed scope and rank of one issue.
    pub async fn find_issue(&self, issue_id: IssueId) -> Option<(ScopeId, Rank)> {
        self.items.lock().await.get(&issue_id).cloned()
    }

    /// Returns the committed items of a scope in ascending rank order.
    pub async fn list_issues(&self, scope_id: ScopeId) -> Vec<RankedItem> {
        let items = self.items.lock().await;
        let mut listed = collect_scope(&items, scope_id, None);
        listed.sort_by(|left, right| left.rank.cmp(&right.rank));
        listed
    }
}

#[async_trait]
impl OrderingStore for InMemoryOrderingStore {
    async fn begin(&self) -> AppResult<Box<dyn OrderingTransaction>> {
        let guard = self.items.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryOrderingTransaction { guard, working }))
    }
}

struct InMemoryOrderingTransaction {
    guard: OwnedMutexGuard<ItemMap>,
    working: ItemMap,
}

#[async_trait]
impl OrderingTransaction for InMemoryOrderingTransaction {
    async fn lock_item(&mut self, issue_id: IssueId) -> AppResult<LockedItem> {
        self.working
            .get(&issue_id)
            .map(|(scope_id, rank)| LockedItem {
                issue_id,
                scope_id: *scope_id,
                rank: rank.clone(),
            })
            .ok_or_else(|| AppError::NotFound(format!("issue '{issue_id}' not found")))
    }

    async fn list_scope(
        &mut self,
        scope_id: ScopeId,
        exclude: Option<IssueId>,
    ) -> AppResult<Vec<RankedItem>> {
        let mut listed = collect_scope(&self.working, scope_id, exclude);
        listed.sort_by(|left, right| left.rank.cmp(&right.rank));
        Ok(listed)
    }

    async fn update_item(
        &mut self,
        issue_id: IssueId,
        scope_id: ScopeId,
        rank: Rank,
    ) -> AppResult<()> {
        if !self.working.contains_key(&issue_id) {
            return Err(AppError::NotFound(format!("issue '{issue_id}' not found")));
        }

        ensure_rank_free(&self.working, issue_id, scope_id, &rank)?;
        self.working.insert(issue_id, (scope_id, rank));
        Ok(())
    }

    async fn rewrite_scope(&mut self, scope_id: ScopeId, items: Vec<RankedItem>) -> AppResult<()> {
        for item in items {
            if !self.working.contains_key(&item.issue_id) {
                return Err(AppError::NotFound(format!(
                    "issue '{}' not found",
                    item.issue_id
                )));
            }
            self.working.insert(item.issue_id, (scope_id, item.rank));
        }

        let ranks: Vec<&Rank> = self
            .working
            .values()
            .filter(|(item_scope, _)| *item_scope == scope_id)
            .map(|(_, rank)| rank)
            .collect();
        let mut deduped = ranks.clone();
        deduped.sort();
        deduped.dedup();
        if deduped.len() != ranks.len() {
            return Err(AppError::Conflict(format!(
                "scope '{scope_id}' rewrite produced duplicate ranks"
            )));
        }

        Ok(())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let InMemoryOrderingTransaction { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

fn collect_scope(items: &ItemMap, scope_id: ScopeId, exclude: Option<IssueId>) -> Vec<RankedItem> {
    items
        .iter()
        .filter(|(issue_id, (item_scope, _))| {
            *item_scope == scope_id && Some(**issue_id) != exclude
        })
        .map(|(issue_id, (_, rank))| RankedItem {
            issue_id: *issue_id,
            rank: rank.clone(),
        })
        .collect()
}

fn ensure_rank_free(
    items: &ItemMap,
    issue_id: IssueId,
    scope_id: ScopeId,
    rank: &Rank,
) -> AppResult<()> {
    let taken = items.iter().any(|(other_id, (other_scope, other_rank))| {
        *other_id != issue_id && *other_scope == scope_id && other_rank == rank
    });

    if taken {
        return Err(AppError::Conflict(format!(
            "rank '{rank}' is already taken in scope '{scope_id}'"
        )));
    }

    Ok(())
}
