//! Hierarchical tag/category taxonomy core.
//! Owns the reparent invariants: acyclic categories, exact child counters,
//! and a tree mirror that follows every persisted move.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod tree;

pub use config::{ConfigError, TaxonomyConfig};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::taxonomy::{
    normalize_name, Category, CategoryId, DropTarget, ItemRef, Parent, Tag, TagId,
    TaxonomyItem, TaxonomyValidationError,
};
pub use repo::taxonomy_repo::{
    RecordStore, ResetSummary, SqliteTaxonomyStore, StoreError, StoreResult,
};
pub use service::reparent::{
    MoveDecision, MoveOutcome, RejectReason, ReparentEngine, ReparentError,
};
pub use service::taxonomy_service::{SessionToken, TaxonomyService, TaxonomyServiceError};
pub use tree::guard::{is_descendant, is_descendant_loaded, is_descendant_stored, CycleCheckScope};
pub use tree::index::{TreeIndex, TreeIndexError, TreeNode};
pub use tree::order::compare_items;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
