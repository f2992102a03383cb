//! Persistence contracts and implementations.
//!
//! # Responsibility
//! - Define the `ModelStore` port and its flat record shape.
//! - Convert between arena objects and records.
//! - Provide the SQLite reference store.
//!
//! # Invariants
//! - Store APIs return semantic errors (`NotFound`) in addition to DB
//!   transport errors.

pub mod graph_io;
pub mod model_store;
pub mod sqlite_store;
