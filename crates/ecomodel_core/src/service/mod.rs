//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate store calls into whole-tree operations.
//! - Keep callers decoupled from storage details.

pub mod model_service;
