//! Core use-case services.
//!
//! # Responsibility
//! - Validate and execute reparent moves (`reparent`).
//! - Keep the tree index, store and drag session in step for editor callers
//!   (`taxonomy_service`).

pub mod reparent;
pub mod taxonomy_service;
