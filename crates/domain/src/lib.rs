//! Domain entities and invariants for the tracker core.

#![forbid(unsafe_code)]

mod ordering;
pub mod rank;
mod security;
mod subject;

pub use ordering::{IssueId, RankedItem, ScopeId};
pub use rank::Rank;
pub use security::{
    Effect, PermissionEntry, PermissionKey, PolicyConstraint, PolicyPredicate,
    ROLE_MANAGE_PERMISSIONS_KEY,
};
pub use subject::{
    AttributeEntityType, AttributeMap, PredicateContext, ResourceContext, SubjectContext,
    SubjectMembership, SubjectUser, attribute_map_from_json,
};
