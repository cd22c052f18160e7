use std::sync::Arc;

use lattice_core::{AppError, AppResult};
use lattice_domain::rank::{DEFAULT_GAP, REBALANCE_GAP, REBALANCE_THRESHOLD};
use lattice_domain::{IssueId, Rank, RankedItem, ScopeId, rank};

use crate::ordering_ports::OrderingStore;

/// Start value for ranks regenerated while recovering from exhaustion.
///
/// Kept one default gap above the floor so a retried move to the top of the
/// scope still has room below the first item.
const RECOVERY_START_VALUE: u16 = 100;

/// Where a moved or inserted item lands within its target scope.
#[derive(Debug, Clone, Copy)]
enum Placement {
    Start,
    End,
    Before(IssueId),
    After(IssueId),
}

/// Assigns and maintains ranks for issues within status-scoped collections.
///
/// Every rank-assigning operation carries a retry budget of exactly one: on
/// rank exhaustion the affected scope is rebalanced once and the operation
/// retried once, after which failure is permanent.
#[derive(Clone)]
pub struct OrderedCollectionService {
    store: Arc<dyn OrderingStore>,
}

impl OrderedCollectionService {
    /// Creates a service from a transactional store implementation.
    #[must_use]
    pub fn new(store: Arc<dyn OrderingStore>) -> Self {
        Self { store }
    }

    /// Computes the rank for a new issue appended to a scope.
    ///
    /// An empty scope yields the initial rank; otherwise the new rank lands
    /// one default gap after the current maximum.
    pub async fn insert(&self, scope_id: ScopeId) -> AppResult<Rank> {
        for attempt in 0..=1 {
            match self.try_insert(scope_id).await {
                Err(AppError::RankExhausted(reason)) => {
                    if attempt == 0 {
                        self.recovery_rebalance(scope_id).await?;
                        continue;
                    }
                    return Err(AppError::RankExhaustedAfterRebalance(reason));
                }
                outcome => return outcome,
            }
        }

        Err(AppError::Internal(
            "rank retry budget exhausted without an outcome".to_owned(),
        ))
    }

    /// Moves an issue to the first or last position of a scope.
    pub async fn move_to_edge(
        &self,
        issue_id: IssueId,
        scope_id: ScopeId,
        to_end: bool,
    ) -> AppResult<Rank> {
        let placement = if to_end {
            Placement::End
        } else {
            Placement::Start
        };
        self.move_item(issue_id, scope_id, placement).await
    }

    /// Moves an issue directly before or after a target issue in a scope.
    ///
    /// Moving an issue relative to itself is rejected.
    pub async fn move_relative(
        &self,
        issue_id: IssueId,
        scope_id: ScopeId,
        target_issue_id: IssueId,
        place_after: bool,
    ) -> AppResult<Rank> {
        if issue_id == target_issue_id {
            return Err(AppError::Validation(format!(
                "cannot move issue '{issue_id}' relative to itself"
            )));
        }

        let placement = if place_after {
            Placement::After(target_issue_id)
        } else {
            Placement::Before(target_issue_id)
        };
        self.move_item(issue_id, scope_id, placement).await
    }

    /// Regenerates evenly spaced ranks for a scope whose gaps fell below the
    /// rebalance threshold.
    ///
    /// Returns the number of items rewritten; a scope that does not need
    /// rebalancing is left untouched and reports zero.
    pub async fn rebalance(&self, scope_id: ScopeId) -> AppResult<usize> {
        let mut transaction = self.store.begin().await?;
        let items = transaction.list_scope(scope_id, None).await?;

        let ranks: Vec<Rank> = items.iter().map(|item| item.rank.clone()).collect();
        if !rank::needs_rebalancing(&ranks, REBALANCE_THRESHOLD) {
            return Ok(0);
        }

        let spaced = rank::evenly_spaced(items.len(), &Rank::initial(), REBALANCE_GAP)?;
        let rewritten = items.len();
        let assignments = items
            .into_iter()
            .zip(spaced)
            .map(|(item, rank)| RankedItem {
                issue_id: item.issue_id,
                rank,
            })
            .collect();

        transaction.rewrite_scope(scope_id, assignments).await?;
        transaction.commit().await?;

        tracing::info!(scope_id = %scope_id, items = rewritten, "rebalanced ordering scope");
        Ok(rewritten)
    }

    async fn move_item(
        &self,
        issue_id: IssueId,
        scope_id: ScopeId,
        placement: Placement,
    ) -> AppResult<Rank> {
        for attempt in 0..=1 {
            match self.try_move(issue_id, scope_id, placement).await {
                Err(AppError::RankExhausted(reason)) => {
                    if attempt == 0 {
                        self.recovery_rebalance(scope_id).await?;
                        continue;
                    }
                    return Err(AppError::RankExhaustedAfterRebalance(reason));
                }
                outcome => return outcome,
            }
        }

        Err(AppError::Internal(
            "rank retry budget exhausted without an outcome".to_owned(),
        ))
    }

    async fn try_insert(&self, scope_id: ScopeId) -> AppResult<Rank> {
        let mut transaction = self.store.begin().await?;
        let items = transaction.list_scope(scope_id, None).await?;
        let rank = Self::edge_rank_end(&items)?;
        transaction.commit().await?;
        Ok(rank)
    }

    async fn try_move(
        &self,
        issue_id: IssueId,
        scope_id: ScopeId,
        placement: Placement,
    ) -> AppResult<Rank> {
        let mut transaction = self.store.begin().await?;

        // Lock the moving row first so concurrent moves of the same issue
        // serialize.
        transaction.lock_item(issue_id).await?;

        let rank = match placement {
            Placement::Start => {
                let items = transaction.list_scope(scope_id, Some(issue_id)).await?;
                Self::edge_rank_start(&items)?
            }
            Placement::End => {
                let items = transaction.list_scope(scope_id, Some(issue_id)).await?;
                Self::edge_rank_end(&items)?
            }
            Placement::Before(target_issue_id) | Placement::After(target_issue_id) => {
                transaction.lock_item(target_issue_id).await?;
                let items = transaction.list_scope(scope_id, Some(issue_id)).await?;

                let position = items
                    .iter()
                    .position(|item| item.issue_id == target_issue_id)
                    .ok_or_else(|| {
                        AppError::NotFound(format!(
                            "target issue '{target_issue_id}' is not in scope '{scope_id}'"
                        ))
                    })?;

                let insert_index = match placement {
                    Placement::After(_) => position + 1,
                    _ => position,
                };

                if insert_index == 0 {
                    Self::edge_rank_start(&items)?
                } else if insert_index >= items.len() {
                    Self::edge_rank_end(&items)?
                } else {
                    rank::middle(&items[insert_index - 1].rank, &items[insert_index].rank)?
                }
            }
        };

        transaction
            .update_item(issue_id, scope_id, rank.clone())
            .await?;
        transaction.commit().await?;
        Ok(rank)
    }

    /// Rebalances a scope after a rank-exhaustion failure.
    ///
    /// Unlike the public `rebalance`, this always rewrites: the failed rank
    /// computation is already evidence the scope is too tight where it
    /// matters.
    async fn recovery_rebalance(&self, scope_id: ScopeId) -> AppResult<()> {
        let mut transaction = self.store.begin().await?;
        let items = transaction.list_scope(scope_id, None).await?;

        if items.is_empty() {
            return Ok(());
        }

        let start = Rank::from_value(RECOVERY_START_VALUE)?;
        let spaced =
            rank::evenly_spaced(items.len(), &start, REBALANCE_GAP).map_err(|error| match error {
                AppError::RankExhausted(reason) => AppError::RankExhaustedAfterRebalance(reason),
                other => other,
            })?;

        let rewritten = items.len();
        let assignments = items
            .into_iter()
            .zip(spaced)
            .map(|(item, rank)| RankedItem {
                issue_id: item.issue_id,
                rank,
            })
            .collect();

        transaction.rewrite_scope(scope_id, assignments).await?;
        transaction.commit().await?;

        tracing::info!(
            scope_id = %scope_id,
            items = rewritten,
            "rebalanced ordering scope after rank exhaustion"
        );
        Ok(())
    }

    fn edge_rank_start(items: &[RankedItem]) -> AppResult<Rank> {
        let Some(first) = items.first() else {
            return Ok(Rank::initial());
        };

        let candidate = rank::before(&first.rank, DEFAULT_GAP);
        if candidate == first.rank {
            return Err(AppError::RankExhausted(format!(
                "no room before first rank '{}'",
                first.rank
            )));
        }

        Ok(candidate)
    }

    fn edge_rank_end(items: &[RankedItem]) -> AppResult<Rank> {
        let Some(last) = items.last() else {
            return Ok(Rank::initial());
        };

        let candidate = rank::after(&last.rank, DEFAULT_GAP);
        if candidate == last.rank {
            return Err(AppError::RankExhausted(format!(
                "no room after last rank '{}'",
                last.rank
            )));
        }

        Ok(candidate)
    }
}
