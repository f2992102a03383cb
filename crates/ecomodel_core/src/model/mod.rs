//! Revision and template object-graph model.
//!
//! # Responsibility
//! - Define revision keys, object shapes and the arena that owns them.
//! - Implement copy, template promotion and link maintenance rules.
//! - Rebuild revision lineages for display.
//!
//! # Invariants
//! - Storage ids and arena handles are separate identities.
//! - Policies (ordering, relinking) are passed explicitly, never global.

pub mod error;
pub mod graph;
pub mod links;
pub mod object;
pub mod ordering;
pub mod revision;
pub mod tree;
