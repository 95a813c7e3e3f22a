//! In-memory display mirror of the taxonomy.
//!
//! # Responsibility
//! - Keep a lazily fetched tree of tag/category nodes for redraws.
//! - Order siblings and answer descendant queries for move validation.
//!
//! # Invariants
//! - Each item is listed under at most one parent's fetched children.
//! - Parent links are ids, never owning references.

pub mod guard;
pub mod index;
pub mod order;
