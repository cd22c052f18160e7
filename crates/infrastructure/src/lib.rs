//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod in_memory_ordering_store;
mod in_memory_policy_repository;
mod postgres_ordering_store;
mod postgres_policy_repository;

pub use in_memory_ordering_store::InMemoryOrderingStore;
pub use in_memory_policy_repository::InMemoryPolicyRepository;
pub use postgres_ordering_store::PostgresOrderingStore;
pub use postgres_policy_repository::PostgresPolicyRepository;
