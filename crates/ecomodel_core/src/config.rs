//! Editor policy configuration.
//!
//! # Responsibility
//! - Group the tunable policies of the model core in one serde document.
//!
//! # Invariants
//! - Every field has a default, so partial documents are accepted.

use crate::model::links::LinkPolicy;
use crate::model::ordering::ListOrdering;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Default upper bound for `description` length, in characters.
pub const DEFAULT_MAX_DESCRIPTION_CHARS: usize = 255;

/// Tunable policies for ordering, relinking and validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelPolicy {
    pub ordering: ListOrdering,
    pub links: LinkPolicy,
    pub max_description_chars: usize,
}

impl Default for ModelPolicy {
    fn default() -> Self {
        Self {
            ordering: ListOrdering::default(),
            links: LinkPolicy::default(),
            max_description_chars: DEFAULT_MAX_DESCRIPTION_CHARS,
        }
    }
}

impl ModelPolicy {
    /// Parses a JSON policy document.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let policy: Self = serde_json::from_str(text).map_err(ConfigError::Parse)?;
        if policy.max_description_chars == 0 {
            return Err(ConfigError::Invalid(
                "max_description_chars must be positive".to_string(),
            ));
        }
        Ok(policy)
    }
}

/// Policy document errors.
#[derive(Debug)]
pub enum ConfigError {
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "invalid policy document: {err}"),
            Self::Invalid(message) => write!(f, "invalid policy: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}
