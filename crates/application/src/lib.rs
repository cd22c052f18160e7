//! Application services and ports for the tracker core.

#![forbid(unsafe_code)]

mod attribute_resolver;
mod cycle_guard;
mod ordered_collection_service;
mod ordering_ports;
mod policy_evaluator;
mod policy_ports;

pub use attribute_resolver::AttributeResolver;
pub use cycle_guard::CycleGuard;
pub use ordered_collection_service::OrderedCollectionService;
pub use ordering_ports::{LockedItem, OrderingStore, OrderingTransaction};
pub use policy_ports::{
    AttributeRepository, EntityAttributeRecord, MembershipRecord, PermissionBindingRecord,
    PermissionCatalogRepository, PolicyBindingRepository, RoleAssignmentRecord,
    RoleDefinitionRecord, UserRecord,
};
pub use policy_evaluator::{AccessRequest, PolicyEvaluator};
