//! Shared primitives for all Rust crates in Lattice.

#![forbid(unsafe_code)]

/// Identifier newtypes shared across services.
pub mod ids;

use thiserror::Error;

pub use ids::{TeamId, UserId, WorkspaceId};

/// Result type used across Lattice crates.
pub type AppResult<T> = Result<T, AppError>;

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Write operation conflicts with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// User is not authenticated or not allowed to access a resource.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// User is authenticated but blocked by authorization policy.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A rank computation found no room between adjacent ranks. Recoverable
    /// by rebalancing the affected ordering scope.
    #[error("rank exhausted: {0}")]
    RankExhausted(String),

    /// A rank computation failed again after the single permitted rebalance.
    /// Fatal to the operation that triggered it.
    #[error("rank exhausted after rebalance: {0}")]
    RankExhaustedAfterRebalance(String),

    /// Internal unexpected error, including any store failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns whether this error is the recoverable rank-exhaustion case.
    #[must_use]
    pub fn is_rank_exhausted(&self) -> bool {
        matches!(self, Self::RankExhausted(_))
    }
}
