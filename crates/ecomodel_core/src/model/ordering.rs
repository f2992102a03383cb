//! List/tree presentation order.
//!
//! Objects have no natural order of their own; every sorted view goes
//! through `ListOrdering::compare`.

use crate::model::object::DomainObject;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Primary sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Name,
    Revision,
}

/// Flat list or revision tree presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presentation {
    #[default]
    List,
    Tree,
}

/// Active ordering policy: one of four sort-key/presentation modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ListOrdering {
    pub sort_key: SortKey,
    pub presentation: Presentation,
}

impl ListOrdering {
    pub fn new(sort_key: SortKey, presentation: Presentation) -> Self {
        Self {
            sort_key,
            presentation,
        }
    }

    /// Actions sort by subtype code first; then name or revision leads and
    /// the other breaks ties.
    pub fn compare(&self, left: &DomainObject, right: &DomainObject) -> Ordering {
        if let (Some(left_code), Some(right_code)) = (left.action_code(), right.action_code()) {
            let by_code = left_code.cmp(&right_code);
            if by_code != Ordering::Equal {
                return by_code;
            }
        }

        let by_name = compare_names(&left.header.short_name, &right.header.short_name);
        let by_revision = left.header.revision.compare(&right.header.revision);
        match self.sort_key {
            SortKey::Name => by_name.then(by_revision),
            SortKey::Revision => by_revision.then(by_name),
        }
    }
}

fn compare_names(left: &str, right: &str) -> Ordering {
    left.to_lowercase()
        .cmp(&right.to_lowercase())
        .then_with(|| left.cmp(right))
}
