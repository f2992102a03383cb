//! Canonical template storage.
//!
//! # Responsibility
//! - Keep reusable, structurally unique objects outside any concrete parent.
//!
//! # Invariants
//! - Pool entries are objects with `is_template = true` and no parent.

pub mod pool;
