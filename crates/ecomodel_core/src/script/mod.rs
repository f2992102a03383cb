//! Scripting engine port used by validation.
//!
//! # Responsibility
//! - Let validation syntax-check attribute expressions and action scripts
//!   without linking a concrete interpreter into the core.
//!
//! # Invariants
//! - The engine is injected per call; the core holds no engine globally.

use crate::messages::MessageLog;

/// Syntax checker for model scripts.
pub trait ScriptEngine {
    /// False when no interpreter is available.
    fn has_engine(&self) -> bool;
    /// Parses `source`; reports problems into `log` and returns `false` on failure.
    fn parse_check(&mut self, source: &str, log: &mut MessageLog) -> bool;
    /// Drops any state left by earlier checks.
    fn clear(&mut self);
}

/// Engine stand-in for builds without an interpreter.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoScriptEngine;

impl ScriptEngine for NoScriptEngine {
    fn has_engine(&self) -> bool {
        false
    }

    fn parse_check(&mut self, _source: &str, _log: &mut MessageLog) -> bool {
        false
    }

    fn clear(&mut self) {}
}
