use async_trait::async_trait;
use lattice_core::AppResult;
use lattice_domain::{IssueId, Rank, RankedItem, ScopeId};

/// An item row read under a row-level lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockedItem {
    /// The locked issue.
    pub issue_id: IssueId,
    /// The scope the issue currently belongs to.
    pub scope_id: ScopeId,
    /// The issue's current rank.
    pub rank: Rank,
}

/// One transaction against the ordering store.
///
/// All reads and writes of a single logical ordering operation happen through
/// one transaction; dropping a transaction without committing discards its
/// writes. Reads lock the rows they touch so that two concurrent moves in the
/// same scope serialize instead of computing overlapping ranks.
#[async_trait]
pub trait OrderingTransaction: Send {
    /// Reads one item under a row-level lock.
    ///
    /// Fails with `NotFound` when the item does not exist at lock time.
    async fn lock_item(&mut self, issue_id: IssueId) -> AppResult<LockedItem>;

    /// Lists a scope's items in ascending rank order, optionally excluding
    /// one item, locking the returned rows.
    async fn list_scope(
        &mut self,
        scope_id: ScopeId,
        exclude: Option<IssueId>,
    ) -> AppResult<Vec<RankedItem>>;

    /// Moves one item to a scope and rank.
    async fn update_item(
        &mut self,
        issue_id: IssueId,
        scope_id: ScopeId,
        rank: Rank,
    ) -> AppResult<()>;

    /// Reassigns the rank of every listed item within a scope.
    async fn rewrite_scope(&mut self, scope_id: ScopeId, items: Vec<RankedItem>) -> AppResult<()>;

    /// Commits the transaction, making its writes visible.
    async fn commit(self: Box<Self>) -> AppResult<()>;
}

/// Transactional store port for ordered, status-scoped issue collections.
///
/// The store must enforce rank uniqueness per scope, surfacing violations as
/// `Conflict`.
#[async_trait]
pub trait OrderingStore: Send + Sync {
    /// Begins a new transaction.
    async fn begin(&self) -> AppResult<Box<dyn OrderingTransaction>>;
}
