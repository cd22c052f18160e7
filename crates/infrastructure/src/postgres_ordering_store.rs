use async_trait::async_trait;
use lattice_application::{LockedItem, OrderingStore, OrderingTransaction};
use lattice_core::{AppError, AppResult};
use lattice_domain::{IssueId, Rank, RankedItem, ScopeId};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

/// PostgreSQL-backed store for ordered, status-scoped issue collections.
///
/// The unique index on `(status_id, sort_rank)` is declared deferrable, so
/// rank collisions between concurrent transactions and transient duplicates
/// during a scope rewrite both surface at commit.
#[derive(Clone)]
pub struct PostgresOrderingStore {
    pool: PgPool,
}

impl PostgresOrderingStore {
    /// Creates a store with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct IssueRankRow {
    id: Uuid,
    status_id: Uuid,
    sort_rank: String,
}

fn decode_rank(issue_id: Uuid, sort_rank: &str) -> AppResult<Rank> {
    Rank::parse(sort_rank).map_err(|error| {
        AppError::Internal(format!(
            "failed to decode rank '{sort_rank}' of issue '{issue_id}': {error}"
        ))
    })
}

fn map_write_error(error: sqlx::Error, context: &str) -> AppError {
    let unique_violation = error
        .as_database_error()
        .is_some_and(|database_error| database_error.is_unique_violation());

    if unique_violation {
        AppError::Conflict(format!("{context}: rank already taken"))
    } else {
        AppError::Internal(format!("{context}: {error}"))
    }
}

#[async_trait]
impl OrderingStore for PostgresOrderingStore {
    async fn begin(&self) -> AppResult<Box<dyn OrderingTransaction>> {
        let transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to start ordering transaction: {error}"))
        })?;

        Ok(Box::new(PostgresOrderingTransaction { transaction }))
    }
}

struct PostgresOrderingTransaction {
    transaction: Transaction<'static, Postgres>,
}

#[async_trait]
impl OrderingTransaction for PostgresOrderingTransaction {
    async fn lock_item(&mut self, issue_id: IssueId) -> AppResult<LockedItem> {
        let row = sqlx::query_as::<_, IssueRankRow>(
            r#"
            SELECT id, status_id, sort_rank
            FROM issues
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(issue_id.as_uuid())
        .fetch_optional(&mut *self.transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to lock issue '{issue_id}': {error}")))?
        .ok_or_else(|| AppError::NotFound(format!("issue '{issue_id}' not found")))?;

        Ok(LockedItem {
            issue_id: IssueId::from_uuid(row.id),
            scope_id: ScopeId::from_uuid(row.status_id),
            rank: decode_rank(row.id, row.sort_rank.as_str())?,
        })
    }

    async fn list_scope(
        &mut self,
        scope_id: ScopeId,
        exclude: Option<IssueId>,
    ) -> AppResult<Vec<RankedItem>> {
        let rows = sqlx::query_as::<_, IssueRankRow>(
            r#"
            SELECT id, status_id, sort_rank
            FROM issues
            WHERE status_id = $1
                AND ($2::uuid IS NULL OR id <> $2)
            ORDER BY sort_rank ASC
            FOR UPDATE
            "#,
        )
        .bind(scope_id.as_uuid())
        .bind(exclude.map(|issue_id| issue_id.as_uuid()))
        .fetch_all(&mut *self.transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to list scope '{scope_id}': {error}"))
        })?;

        rows.into_iter()
            .map(|row| {
                Ok(RankedItem {
                    issue_id: IssueId::from_uuid(row.id),
                    rank: decode_rank(row.id, row.sort_rank.as_str())?,
                })
            })
            .collect()
    }

    async fn update_item(
        &mut self,
        issue_id: IssueId,
        scope_id: ScopeId,
        rank: Rank,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE issues
            SET status_id = $2,
                sort_rank = $3,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(issue_id.as_uuid())
        .bind(scope_id.as_uuid())
        .bind(rank.as_str())
        .execute(&mut *self.transaction)
        .await
        .map_err(|error| {
            map_write_error(error, &format!("failed to move issue '{issue_id}'"))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("issue '{issue_id}' not found")));
        }

        Ok(())
    }

    async fn rewrite_scope(&mut self, scope_id: ScopeId, items: Vec<RankedItem>) -> AppResult<()> {
        if items.is_empty() {
            return Ok(());
        }

        let issue_ids: Vec<Uuid> = items.iter().map(|item| item.issue_id.as_uuid()).collect();
        let ranks: Vec<String> = items
            .iter()
            .map(|item| item.rank.as_str().to_owned())
            .collect();

        sqlx::query(
            r#"
            UPDATE issues
            SET sort_rank = new_ranks.sort_rank,
                updated_at = now()
            FROM (
                SELECT UNNEST($2::uuid[]) AS id, UNNEST($3::text[]) AS sort_rank
            ) AS new_ranks
            WHERE issues.id = new_ranks.id
                AND issues.status_id = $1
            "#,
        )
        .bind(scope_id.as_uuid())
        .bind(issue_ids)
        .bind(ranks)
        .execute(&mut *self.transaction)
        .await
        .map_err(|error| {
            map_write_error(error, &format!("failed to rewrite scope '{scope_id}'"))
        })?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.transaction.commit().await.map_err(|error| {
            let unique_violation = error
                .as_database_error()
                .is_some_and(|database_error| database_error.is_unique_violation());

            if unique_violation {
                AppError::Conflict("ordering commit produced duplicate ranks".to_owned())
            } else {
                AppError::Internal(format!("failed to commit ordering transaction: {error}"))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use lattice_application::{OrderedCollectionService, OrderingStore};
    use lattice_core::AppError;
    use lattice_domain::{IssueId, Rank, ScopeId};
    use sqlx::PgPool;
    use sqlx::migrate::Migrator;
    use sqlx::postgres::PgPoolOptions;
    use uuid::Uuid;

    use super::PostgresOrderingStore;

    static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

    async fn test_pool() -> Option<PgPool> {
        let Ok(database_url) = std::env::var("DATABASE_URL") else {
            return None;
        };

        let pool = match PgPoolOptions::new()
            .max_connections(2)
            .connect(database_url.as_str())
            .await
        {
            Ok(pool) => pool,
            Err(error) => panic!("failed to connect to DATABASE_URL in test: {error}"),
        };

        if let Err(error) = MIGRATOR.run(&pool).await {
            panic!("failed to run migrations for postgres ordering tests: {error}");
        }

        Some(pool)
    }

    async fn seed_issue(pool: &PgPool, issue_id: IssueId, scope_id: ScopeId, sort_rank: &str) {
        let insert = sqlx::query(
            r#"
            INSERT INTO issues (id, status_id, sort_rank)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(issue_id.as_uuid())
        .bind(scope_id.as_uuid())
        .bind(sort_rank)
        .execute(pool)
        .await;

        assert!(insert.is_ok());
    }

    async fn stored_rank(pool: &PgPool, issue_id: IssueId) -> String {
        sqlx::query_scalar::<_, String>("SELECT sort_rank FROM issues WHERE id = $1")
            .bind(issue_id.as_uuid())
            .fetch_one(pool)
            .await
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn moves_commit_new_ranks() {
        let Some(pool) = test_pool().await else {
            return;
        };

        let store = Arc::new(PostgresOrderingStore::new(pool.clone()));
        let scope_id = ScopeId::new();
        let first = IssueId::new();
        let last = IssueId::new();
        seed_issue(&pool, first, scope_id, "a00").await;
        seed_issue(&pool, last, scope_id, "b00").await;

        let service = OrderedCollectionService::new(store);
        let moved = service.move_relative(first, scope_id, last, true).await;
        assert_eq!(moved.as_ref().map(Rank::as_str).unwrap_or_default(), "c00");
        assert_eq!(stored_rank(&pool, first).await, "c00");
    }

    #[tokio::test]
    async fn uncommitted_transactions_roll_back() {
        let Some(pool) = test_pool().await else {
            return;
        };

        let store = PostgresOrderingStore::new(pool.clone());
        let scope_id = ScopeId::new();
        let issue_id = IssueId::new();
        seed_issue(&pool, issue_id, scope_id, "a00").await;

        {
            let Ok(mut transaction) = store.begin().await else {
                return;
            };
            let rank = Rank::parse("b00").unwrap_or_else(|_| Rank::initial());
            let updated = transaction.update_item(issue_id, scope_id, rank).await;
            assert!(updated.is_ok());
        }

        assert_eq!(stored_rank(&pool, issue_id).await, "a00");
    }

    #[tokio::test]
    async fn locking_a_missing_issue_is_not_found() {
        let Some(pool) = test_pool().await else {
            return;
        };

        let store = PostgresOrderingStore::new(pool);
        let Ok(mut transaction) = store.begin().await else {
            return;
        };
        let result = transaction.lock_item(IssueId::from_uuid(Uuid::new_v4())).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
