//! Taxonomy domain model for tag/category editors.
//!
//! # Responsibility
//! - Define the Tag and Category records shared by store, engine and tree.
//! - Model placement (`Parent`, `DropTarget`) as sum types instead of flags.
//!
//! # Invariants
//! - Every item is identified by a stable v4 UUID.
//! - Category counters equal the sizes of their child sets once persisted.

pub mod taxonomy;
