//! Record store contracts and persistence implementations.
//!
//! # Responsibility
//! - Define the data access contract the reparent engine consumes.
//! - Isolate SQLite query details from engine and tree orchestration.
//!
//! # Invariants
//! - Write paths validate records before SQL mutations.
//! - Store APIs return semantic errors (`TagNotFound`, `StaleSnapshot`) in
//!   addition to DB transport errors.

pub mod taxonomy_repo;
