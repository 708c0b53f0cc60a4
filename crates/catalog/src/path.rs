//! Category path parsing and normalization.

use serde::{Deserialize, Serialize};

use storefront_core::{DomainError, DomainResult};

/// Separators accepted in a delimited path, in priority order.
///
/// The first separator that occurs anywhere in the raw string is the one used
/// to split it; the others are then treated as ordinary characters.
pub const PATH_SEPARATORS: [char; 3] = ['>', '/', '|'];

/// A normalized, non-empty sequence of category names from root to leaf.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CategoryPath(Vec<String>);

impl CategoryPath {
    /// Parse a delimited path such as `"A>B>C"`, `"A/B/C"` or `"A|B|C"`.
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let segments: Vec<&str> = match PATH_SEPARATORS.iter().find(|sep| raw.contains(**sep)) {
            Some(sep) => raw.split(*sep).collect(),
            None => vec![raw],
        };
        Self::from_segments(segments)
    }

    /// Build a path from pre-split names. Names are trimmed and blanks dropped.
    pub fn from_segments<I, S>(segments: I) -> DomainResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<String> = segments
            .into_iter()
            .map(|s| s.as_ref().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if names.is_empty() {
            return Err(DomainError::invalid_path("category_path is required"));
        }

        Ok(Self(names))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn leaf(&self) -> &str {
        // Non-empty by construction.
        self.0.last().map(String::as_str).unwrap_or_default()
    }
}

impl core::fmt::Display for CategoryPath {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0.join(" > "))
    }
}

impl<'de> Deserialize<'de> for CategoryPath {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        CategoryPathInput::deserialize(deserializer)?
            .into_path()
            .map_err(serde::de::Error::custom)
    }
}

/// Wire form of a category path: a delimited string or an explicit list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CategoryPathInput {
    Delimited(String),
    Segments(Vec<String>),
}

impl CategoryPathInput {
    pub fn into_path(self) -> DomainResult<CategoryPath> {
        match self {
            CategoryPathInput::Delimited(raw) => CategoryPath::parse(&raw),
            CategoryPathInput::Segments(names) => CategoryPath::from_segments(names),
        }
    }
}

impl From<&str> for CategoryPathInput {
    fn from(value: &str) -> Self {
        CategoryPathInput::Delimited(value.to_string())
    }
}

impl From<Vec<String>> for CategoryPathInput {
    fn from(value: Vec<String>) -> Self {
        CategoryPathInput::Segments(value)
    }
}
