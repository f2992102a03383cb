//! Persistence contract for model objects.
//!
//! # Responsibility
//! - Define the `ModelStore` port used by copy, pool and service code.
//! - Define the flat `ObjectRecord` exchanged with a store.
//! - Own revision allocation rules shared by store implementations.
//!
//! # Invariants
//! - Records reference children by storage id, never by arena handle.
//! - A broken link is persisted inline as a hollow record, not as an id.
//! - `next_revision` never returns a key already used for that kind.

use crate::db::DbError;
use crate::model::object::{
    ActionBody, AttributeBody, DayMonth, ObjectKind, ReportBody, SpatialBody, TrialBody,
};
use crate::model::revision::{RevisionKey, RevisionParseError};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Result type used by store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from store operations.
#[derive(Debug)]
pub enum StoreError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// No row for this kind/id.
    NotFound { kind: ObjectKind, id: i64 },
    /// Persisted data cannot be converted to a valid record.
    InvalidData(String),
    /// Store refused or failed the operation.
    Rejected(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { kind, id } => write!(f, "{} not found: {id}", kind.as_str()),
            Self::InvalidData(message) => write!(f, "invalid model data: {message}"),
            Self::Rejected(message) => write!(f, "store rejected operation: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::InvalidData(value.to_string())
    }
}

impl From<RevisionParseError> for StoreError {
    fn from(value: RevisionParseError) -> Self {
        Self::InvalidData(value.to_string())
    }
}

/// Link slot as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkRecord {
    /// Stored target id; the target kind follows from the slot.
    Id(i64),
    /// Hollow placeholder kept inline.
    Broken(Box<ObjectRecord>),
}

/// Kind payload as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordBody {
    ClassDef {
        elements: Vec<i64>,
        spatial: Option<i64>,
    },
    Element {
        attributes: Vec<i64>,
        actions: Vec<i64>,
        timesteps: Vec<i64>,
    },
    Attribute(AttributeBody),
    Action(ActionBody),
    Spatial(SpatialBody),
    Trial(TrialBody),
    Report(ReportBody),
    Timestep {
        start: DayMonth,
        end: DayMonth,
        action: Option<LinkRecord>,
        attribute: Option<LinkRecord>,
    },
}

impl RecordBody {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::ClassDef { .. } => ObjectKind::ClassDef,
            Self::Element { .. } => ObjectKind::Element,
            Self::Attribute(_) => ObjectKind::Attribute,
            Self::Action(_) => ObjectKind::Action,
            Self::Spatial(_) => ObjectKind::Spatial,
            Self::Trial(_) => ObjectKind::Trial,
            Self::Report(_) => ObjectKind::Report,
            Self::Timestep { .. } => ObjectKind::Timestep,
        }
    }

    /// Owned child ids with their kinds, in slot order.
    pub fn child_ids(&self) -> Vec<(ObjectKind, i64)> {
        match self {
            Self::ClassDef { elements, spatial } => elements
                .iter()
                .map(|id| (ObjectKind::Element, *id))
                .chain(spatial.iter().map(|id| (ObjectKind::Spatial, *id)))
                .collect(),
            Self::Element {
                attributes,
                actions,
                timesteps,
            } => attributes
                .iter()
                .map(|id| (ObjectKind::Attribute, *id))
                .chain(actions.iter().map(|id| (ObjectKind::Action, *id)))
                .chain(timesteps.iter().map(|id| (ObjectKind::Timestep, *id)))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Flat persisted form of one object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub is_template: bool,
    pub revision: RevisionKey,
    pub short_name: String,
    pub description: String,
    pub author: String,
    /// Epoch ms.
    pub created_at: i64,
    /// Epoch ms.
    pub modified_at: i64,
    pub locked: bool,
    pub display_position: i32,
    pub body: RecordBody,
}

impl ObjectRecord {
    pub fn kind(&self) -> ObjectKind {
        self.body.kind()
    }
}

/// Id and display label of one stored object, for pick lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSummary {
    pub id: i64,
    pub short_name: String,
    pub revision: RevisionKey,
}

impl StoredSummary {
    /// `short_name.revision`, or just `short_name` when unversioned.
    pub fn label(&self) -> String {
        if self.revision.is_empty() {
            self.short_name.clone()
        } else {
            format!("{}.{}", self.short_name, self.revision)
        }
    }
}

/// Persistence port for model objects.
///
/// Recursion over owned children is the caller's job; a store only moves
/// single records.
pub trait ModelStore {
    /// Loads one record by kind and id.
    fn load(&self, kind: ObjectKind, id: i64) -> StoreResult<Option<ObjectRecord>>;
    /// Inserts (`id <= 0`) or updates one record and returns its stored id.
    fn save(&mut self, record: &ObjectRecord) -> StoreResult<i64>;
    /// Deletes one record.
    fn delete(&mut self, kind: ObjectKind, id: i64) -> StoreResult<()>;
    /// Returns a revision key for a new revision derived from `current`.
    fn next_revision(&self, kind: ObjectKind, current: &str) -> StoreResult<String>;
    /// Loads every template of `kind`, optionally skipping one id.
    fn load_templates(
        &self,
        kind: ObjectKind,
        exclude_id: Option<i64>,
    ) -> StoreResult<Vec<ObjectRecord>>;
    /// Lists stored objects of `kind` other than `exclude_id`.
    fn list_other(&self, kind: ObjectKind, exclude_id: i64) -> StoreResult<Vec<StoredSummary>>;
    /// Lists non-template objects of `kind` without a parent.
    fn list_orphans(&self, kind: ObjectKind) -> StoreResult<Vec<StoredSummary>>;
}

/// Picks the first unused child key below `current`.
///
/// `current = "2"` with `2.1` and `2.2` already used yields `2.3`; an empty
/// `current` allocates the next unused top-level key.
pub fn allocate_child_revision<'a>(
    current: &RevisionKey,
    used: impl IntoIterator<Item = &'a RevisionKey>,
) -> RevisionKey {
    let taken = used
        .into_iter()
        .filter(|key| key.is_descendant_of(current, 1))
        .filter_map(RevisionKey::last)
        .max()
        .unwrap_or(0);
    current.child(taken + 1)
}

#[cfg(test)]
mod tests {
    use super::allocate_child_revision;
    use crate::model::revision::RevisionKey;

    fn keys(values: &[&str]) -> Vec<RevisionKey> {
        values
            .iter()
            .map(|value| RevisionKey::parse(value).unwrap())
            .collect()
    }

    #[test]
    fn allocates_after_highest_used_child() {
        let used = keys(&["1", "2", "2.1", "2.2", "2.2.1", "3"]);
        let current = RevisionKey::parse("2").unwrap();
        assert_eq!(allocate_child_revision(&current, &used).to_string(), "2.3");
    }

    #[test]
    fn allocates_first_child_when_unused() {
        let used = keys(&["1", "2"]);
        let current = RevisionKey::parse("1").unwrap();
        assert_eq!(allocate_child_revision(&current, &used).to_string(), "1.1");
    }

    #[test]
    fn unversioned_source_gets_next_top_level_key() {
        let used = keys(&["1", "4", "4.1"]);
        assert_eq!(
            allocate_child_revision(&RevisionKey::empty(), &used).to_string(),
            "5"
        );
    }
}
