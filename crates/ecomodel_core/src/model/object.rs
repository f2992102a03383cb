//! Domain object shapes shared by every model kind.
//!
//! # Responsibility
//! - Define the common header (identity, naming, lifecycle flags).
//! - Define one payload variant per kind (class, element, attribute, ...).
//! - Own the short-name grammar used as a save precondition.
//!
//! # Invariants
//! - `id == 0` means new/unsaved; `id == BROKEN_ID` means broken placeholder.
//! - A template has no `parent_id`.
//! - Child and link slots hold arena handles, never storage ids.
//! - Objects carry no natural ordering; list/tree views impose order.

use crate::model::graph::Handle;
use crate::model::revision::RevisionKey;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Storage id carried by hollow placeholders standing in for a broken link.
pub const BROKEN_ID: i64 = -1;

/// Storage id carried by objects that were never saved.
pub const NEW_ID: i64 = 0;

static SHORT_NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z](?:[A-Za-z0-9._]*[A-Za-z0-9])?$").expect("short name pattern compiles")
});

/// Returns whether `name` satisfies the short-name grammar.
///
/// Accepted names start with a letter, contain only letters, digits, `.` and
/// `_`, and do not end in `.` or `_`. The empty string is rejected.
pub fn test_valid_name(name: &str) -> bool {
    SHORT_NAME_PATTERN.is_match(name)
}

/// Current wall clock in epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}

/// Object kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    ClassDef,
    Element,
    Attribute,
    Action,
    Spatial,
    Trial,
    Report,
    Timestep,
}

impl ObjectKind {
    pub const ALL: [ObjectKind; 8] = [
        ObjectKind::ClassDef,
        ObjectKind::Element,
        ObjectKind::Attribute,
        ObjectKind::Action,
        ObjectKind::Spatial,
        ObjectKind::Trial,
        ObjectKind::Report,
        ObjectKind::Timestep,
    ];

    /// Stable string id used in storage columns.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClassDef => "class_def",
            Self::Element => "element",
            Self::Attribute => "attribute",
            Self::Action => "action",
            Self::Spatial => "spatial",
            Self::Trial => "trial",
            Self::Report => "report",
            Self::Timestep => "timestep",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value.trim())
    }
}

/// Action subtype. The code drives list ordering ahead of name/revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Initial,
    Iterative,
    Conditional,
    Final,
}

impl ActionType {
    pub fn code(self) -> u8 {
        match self {
            Self::Initial => 0,
            Self::Iterative => 1,
            Self::Conditional => 2,
            Self::Final => 3,
        }
    }
}

/// Calendar day inside a year without a year component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayMonth {
    pub day: u8,
    pub month: u8,
}

impl DayMonth {
    pub fn new(day: u8, month: u8) -> Self {
        Self { day, month }
    }

    /// Validates against a non-leap calendar.
    pub fn is_valid(self) -> bool {
        let days_in_month = match self.month {
            1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
            4 | 6 | 9 | 11 => 30,
            2 => 28,
            _ => return false,
        };
        (1..=days_in_month).contains(&self.day)
    }
}

impl Default for DayMonth {
    fn default() -> Self {
        Self { day: 1, month: 1 }
    }
}

/// Named 2-D polygon of a spatial layout.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Polygon {
    pub name: String,
    pub points: Vec<(f64, f64)>,
}

/// Fields shared by every kind.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectHeader {
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
}

impl ObjectHeader {
    pub fn new(short_name: impl Into<String>) -> Self {
        let now = now_epoch_ms();
        Self {
            id: NEW_ID,
            parent_id: None,
            is_template: false,
            revision: RevisionKey::empty(),
            short_name: short_name.into(),
            description: String::new(),
            author: String::new(),
            created_at: now,
            modified_at: now,
            locked: false,
            display_position: 0,
        }
    }

    /// Compares header fields; `superficial` keeps naming only.
    pub fn matches(&self, other: &Self, superficial: bool) -> bool {
        if self.short_name != other.short_name || self.description != other.description {
            return false;
        }
        if superficial {
            return true;
        }
        self.id == other.id
            && self.is_template == other.is_template
            && self.locked == other.locked
            && self.revision == other.revision
            && self.author == other.author
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClassDefBody {
    pub elements: Vec<Handle>,
    pub spatial: Option<Handle>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ElementBody {
    pub attributes: Vec<Handle>,
    pub actions: Vec<Handle>,
    pub timesteps: Vec<Handle>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AttributeBody {
    pub expression: String,
    pub units: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionBody {
    pub action_type: ActionType,
    pub script: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SpatialBody {
    pub polygons: Vec<Polygon>,
    /// Square, symmetric; side equals `polygons.len()`.
    pub overlap: Vec<Vec<f64>>,
}

impl SpatialBody {
    pub fn overlap_is_consistent(&self) -> bool {
        let side = self.polygons.len();
        if self.overlap.len() != side || self.overlap.iter().any(|row| row.len() != side) {
            return false;
        }
        (0..side).all(|row| (0..row).all(|col| self.overlap[row][col] == self.overlap[col][row]))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialBody {
    pub replicates: u32,
    pub years: u32,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportBody {
    pub columns: Vec<String>,
    pub frequency_days: u32,
}

/// Timestep payload. `action` and `attribute` are non-owning links that
/// normally alias children of the owning element.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimestepBody {
    pub start: DayMonth,
    pub end: DayMonth,
    pub action: Option<Handle>,
    pub attribute: Option<Handle>,
}

/// Kind-specific payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectBody {
    ClassDef(ClassDefBody),
    Element(ElementBody),
    Attribute(AttributeBody),
    Action(ActionBody),
    Spatial(SpatialBody),
    Trial(TrialBody),
    Report(ReportBody),
    Timestep(TimestepBody),
}

impl ObjectBody {
    /// Empty payload for `kind`.
    pub fn empty(kind: ObjectKind) -> Self {
        match kind {
            ObjectKind::ClassDef => Self::ClassDef(ClassDefBody::default()),
            ObjectKind::Element => Self::Element(ElementBody::default()),
            ObjectKind::Attribute => Self::Attribute(AttributeBody::default()),
            ObjectKind::Action => Self::Action(ActionBody {
                action_type: ActionType::Iterative,
                script: String::new(),
            }),
            ObjectKind::Spatial => Self::Spatial(SpatialBody::default()),
            ObjectKind::Trial => Self::Trial(TrialBody {
                replicates: 1,
                years: 1,
                seed: None,
            }),
            ObjectKind::Report => Self::Report(ReportBody {
                columns: Vec::new(),
                frequency_days: 1,
            }),
            ObjectKind::Timestep => Self::Timestep(TimestepBody::default()),
        }
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::ClassDef(_) => ObjectKind::ClassDef,
            Self::Element(_) => ObjectKind::Element,
            Self::Attribute(_) => ObjectKind::Attribute,
            Self::Action(_) => ObjectKind::Action,
            Self::Spatial(_) => ObjectKind::Spatial,
            Self::Trial(_) => ObjectKind::Trial,
            Self::Report(_) => ObjectKind::Report,
            Self::Timestep(_) => ObjectKind::Timestep,
        }
    }

    /// Compares payload fields that are not handles.
    pub fn payload_matches(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::ClassDef(_), Self::ClassDef(_)) => true,
            (Self::Element(_), Self::Element(_)) => true,
            (Self::Attribute(left), Self::Attribute(right)) => left == right,
            (Self::Action(left), Self::Action(right)) => left == right,
            (Self::Spatial(left), Self::Spatial(right)) => left == right,
            (Self::Trial(left), Self::Trial(right)) => left == right,
            (Self::Report(left), Self::Report(right)) => left == right,
            (Self::Timestep(left), Self::Timestep(right)) => {
                left.start == right.start && left.end == right.end
            }
            _ => false,
        }
    }
}

/// Which slot family a handle sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotRole {
    /// Owned child; copies recurse into it and deletes propagate.
    Owned,
    /// Non-owning cross reference.
    Link,
}

/// One model object: shared header plus kind payload.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainObject {
    pub header: ObjectHeader,
    pub body: ObjectBody,
}

impl DomainObject {
    /// Creates a new unsaved object with an empty payload.
    pub fn new(kind: ObjectKind, short_name: impl Into<String>) -> Self {
        Self {
            header: ObjectHeader::new(short_name),
            body: ObjectBody::empty(kind),
        }
    }

    pub fn with_body(short_name: impl Into<String>, body: ObjectBody) -> Self {
        Self {
            header: ObjectHeader::new(short_name),
            body,
        }
    }

    pub fn kind(&self) -> ObjectKind {
        self.body.kind()
    }

    pub fn id(&self) -> i64 {
        self.header.id
    }

    pub fn is_new(&self) -> bool {
        self.header.id == NEW_ID
    }

    pub fn is_broken(&self) -> bool {
        self.header.id == BROKEN_ID
    }

    pub fn is_template(&self) -> bool {
        self.header.is_template
    }

    /// `short_name.revision`, or just `short_name` when unversioned.
    pub fn display_name(&self) -> String {
        if self.header.revision.is_empty() {
            self.header.short_name.clone()
        } else {
            format!("{}.{}", self.header.short_name, self.header.revision)
        }
    }

    /// Refreshes the modified timestamp.
    pub fn touch(&mut self) {
        self.header.modified_at = now_epoch_ms();
    }

    /// Action subtype code, if this is an action.
    pub fn action_code(&self) -> Option<u8> {
        match &self.body {
            ObjectBody::Action(action) => Some(action.action_type.code()),
            _ => None,
        }
    }

    /// Handles of owned children in declaration order.
    pub fn owned_children(&self) -> Vec<Handle> {
        self.slots()
            .into_iter()
            .filter(|(role, _)| *role == SlotRole::Owned)
            .map(|(_, handle)| handle)
            .collect()
    }

    /// Handles of non-owning links in declaration order.
    pub fn links(&self) -> Vec<Handle> {
        self.slots()
            .into_iter()
            .filter(|(role, _)| *role == SlotRole::Link)
            .map(|(_, handle)| handle)
            .collect()
    }

    /// Every occupied slot, owned children first within each aggregate.
    pub fn slots(&self) -> Vec<(SlotRole, Handle)> {
        let owned = |handles: &[Handle]| {
            handles
                .iter()
                .map(|handle| (SlotRole::Owned, *handle))
                .collect::<Vec<_>>()
        };
        match &self.body {
            ObjectBody::ClassDef(body) => {
                let mut slots = owned(&body.elements);
                slots.extend(body.spatial.map(|handle| (SlotRole::Owned, handle)));
                slots
            }
            ObjectBody::Element(body) => {
                let mut slots = owned(&body.attributes);
                slots.extend(owned(&body.actions));
                slots.extend(owned(&body.timesteps));
                slots
            }
            ObjectBody::Timestep(body) => body
                .action
                .iter()
                .chain(body.attribute.iter())
                .map(|handle| (SlotRole::Link, *handle))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Rewrites every occupied slot through `map`.
    pub fn map_slots(&mut self, mut map: impl FnMut(SlotRole, Handle) -> Handle) {
        match &mut self.body {
            ObjectBody::ClassDef(body) => {
                for handle in body.elements.iter_mut() {
                    *handle = map(SlotRole::Owned, *handle);
                }
                if let Some(handle) = body.spatial.as_mut() {
                    *handle = map(SlotRole::Owned, *handle);
                }
            }
            ObjectBody::Element(body) => {
                for handle in body
                    .attributes
                    .iter_mut()
                    .chain(body.actions.iter_mut())
                    .chain(body.timesteps.iter_mut())
                {
                    *handle = map(SlotRole::Owned, *handle);
                }
            }
            ObjectBody::Timestep(body) => {
                for handle in body.action.iter_mut().chain(body.attribute.iter_mut()) {
                    *handle = map(SlotRole::Link, *handle);
                }
            }
            _ => {}
        }
    }

    /// Drops every child and link reference.
    pub fn clear_slots(&mut self) {
        match &mut self.body {
            ObjectBody::ClassDef(body) => {
                body.elements.clear();
                body.spatial = None;
            }
            ObjectBody::Element(body) => {
                body.attributes.clear();
                body.actions.clear();
                body.timesteps.clear();
            }
            ObjectBody::Timestep(body) => {
                body.action = None;
                body.attribute = None;
            }
            _ => {}
        }
    }
}
