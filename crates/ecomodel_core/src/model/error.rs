//! Errors raised by object-graph operations.

use crate::model::graph::Handle;
use crate::model::object::ObjectKind;
use crate::model::revision::RevisionParseError;
use crate::repo::model_store::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ModelResult<T> = Result<T, ModelError>;

/// Object-graph operation error.
#[derive(Debug)]
pub enum ModelError {
    /// Handle does not point at a live arena slot.
    UnknownHandle(Handle),
    /// Operation is not valid on a broken placeholder.
    BrokenObject(Handle),
    /// Object is already a template.
    AlreadyTemplate(Handle),
    /// Operation requires a template.
    NotTemplate(Handle),
    /// A named field failed validation; nothing was persisted.
    InvalidField {
        handle: Handle,
        field: &'static str,
        value: String,
    },
    /// A link points at an object that has no stored id yet.
    UnsavedLink(Handle),
    /// Persisted or allocated data has an unexpected kind.
    KindMismatch {
        expected: ObjectKind,
        actual: ObjectKind,
    },
    /// Revision text could not be parsed.
    Revision(RevisionParseError),
    /// External store failure.
    Store(StoreError),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownHandle(handle) => write!(f, "unknown object handle: {handle}"),
            Self::BrokenObject(handle) => write!(f, "object is a broken placeholder: {handle}"),
            Self::AlreadyTemplate(handle) => write!(f, "object is already a template: {handle}"),
            Self::NotTemplate(handle) => write!(f, "object is not a template: {handle}"),
            Self::InvalidField {
                handle,
                field,
                value,
            } => write!(f, "invalid {field} `{value}` on {handle}"),
            Self::UnsavedLink(handle) => write!(f, "linked object is not saved yet: {handle}"),
            Self::KindMismatch { expected, actual } => write!(
                f,
                "expected {} object, got {}",
                expected.as_str(),
                actual.as_str()
            ),
            Self::Revision(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ModelError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Revision(err) => Some(err),
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RevisionParseError> for ModelError {
    fn from(value: RevisionParseError) -> Self {
        Self::Revision(value)
    }
}

impl From<StoreError> for ModelError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}
