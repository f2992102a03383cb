//! Dotted multi-part revision identifiers.
//!
//! # Responsibility
//! - Parse/format revision text such as `2.3.6`.
//! - Provide the ordering and ancestry rules used by trees and revise copies.
//!
//! # Invariants
//! - The empty key means "unversioned" and sorts before every other key.
//! - Malformed components are rejected, never coerced to zero.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Ordered sequence of non-negative revision components.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RevisionKey {
    components: Vec<u32>,
}

/// Revision text could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevisionParseError {
    /// One dot-separated part is empty (`"2..3"`, `"2."`).
    EmptyComponent { text: String, position: usize },
    /// One dot-separated part is not a non-negative integer.
    InvalidComponent { text: String, component: String },
}

impl Display for RevisionParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyComponent { text, position } => write!(
                f,
                "revision `{text}` has an empty component at position {position}"
            ),
            Self::InvalidComponent { text, component } => write!(
                f,
                "revision `{text}` has non-numeric component `{component}`"
            ),
        }
    }
}

impl Error for RevisionParseError {}

impl RevisionKey {
    /// Returns the unversioned (empty) key.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_components(components: impl Into<Vec<u32>>) -> Self {
        Self {
            components: components.into(),
        }
    }

    /// Parses dot-separated revision text. Surrounding whitespace is ignored.
    ///
    /// # Errors
    /// - `EmptyComponent` for `"1..2"` style input.
    /// - `InvalidComponent` for anything that is not a `u32`.
    pub fn parse(text: &str) -> Result<Self, RevisionParseError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(Self::empty());
        }

        let mut components = Vec::new();
        for (position, part) in trimmed.split('.').enumerate() {
            if part.is_empty() {
                return Err(RevisionParseError::EmptyComponent {
                    text: trimmed.to_string(),
                    position,
                });
            }
            let value = part
                .parse::<u32>()
                .map_err(|_| RevisionParseError::InvalidComponent {
                    text: trimmed.to_string(),
                    component: part.to_string(),
                })?;
            components.push(value);
        }
        Ok(Self { components })
    }

    pub fn components(&self) -> &[u32] {
        &self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn last(&self) -> Option<u32> {
        self.components.last().copied()
    }

    /// Returns a key one generation deeper, e.g. `2.3` + `7` -> `2.3.7`.
    pub fn child(&self, component: u32) -> Self {
        let mut components = self.components.clone();
        components.push(component);
        Self { components }
    }

    /// Returns every component except the last one.
    pub fn parent_prefix(&self) -> &[u32] {
        match self.components.split_last() {
            Some((_, prefix)) => prefix,
            None => &[],
        }
    }

    /// Position-wise comparison; the shorter key wins a shared prefix.
    pub fn compare(&self, other: &Self) -> Ordering {
        if self.is_empty() || other.is_empty() {
            return self.len().min(1).cmp(&other.len().min(1));
        }
        for (left, right) in self.components.iter().zip(other.components.iter()) {
            match left.cmp(right) {
                Ordering::Equal => continue,
                decided => return decided,
            }
        }
        self.len().cmp(&other.len())
    }

    /// Returns whether `self` sits exactly `generation_gap` levels below `ancestor`.
    ///
    /// The empty ancestor has its own rule: it matches any key of exactly
    /// `generation_gap` components, so a gap of zero never matches there
    /// while the general rule treats gap zero as key equality.
    pub fn is_descendant_of(&self, ancestor: &RevisionKey, generation_gap: usize) -> bool {
        if ancestor.is_empty() {
            return generation_gap > 0 && self.len() == generation_gap;
        }

        if self.len() != ancestor.len() + generation_gap {
            return false;
        }
        self.components
            .iter()
            .zip(ancestor.components.iter())
            .all(|(mine, theirs)| mine == theirs)
    }

    /// Forces `self` strictly ahead of `other` by bumping `other`'s matching
    /// prefix, e.g. `2.3` after `2.5` -> `2.6`, `2` after `2.5` -> `3`.
    ///
    /// Returns `self` unchanged when either key is empty or `self` is longer.
    pub fn bump_minor_after(&self, other: &RevisionKey) -> RevisionKey {
        if self.is_empty() || other.is_empty() || self.len() > other.len() {
            return self.clone();
        }

        let mut components = other.components[..self.len()].to_vec();
        if let Some(last) = components.last_mut() {
            *last = last.saturating_add(1);
        }
        Self { components }
    }
}

impl Display for RevisionKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (index, component) in self.components.iter().enumerate() {
            if index > 0 {
                f.write_str(".")?;
            }
            write!(f, "{component}")?;
        }
        Ok(())
    }
}

impl FromStr for RevisionKey {
    type Err = RevisionParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl Serialize for RevisionKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for RevisionKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}
