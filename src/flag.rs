// src/flag.rs
use serde::{Deserialize, Serialize};

/// A single named flag as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagEntry {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value")]
    pub value: String,
}

impl FlagEntry {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// An immutable, ordered collection of flags.
///
/// Equality is structural and order-sensitive, matching the wire format,
/// so two sets compare equal exactly when the remote source returned the
/// same body. A refresh always builds a new `FlagSet`; nothing mutates
/// one in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FlagSet {
    #[serde(rename = "FeatureFlags")]
    entries: Vec<FlagEntry>,
}

impl FlagSet {
    pub fn new(entries: Vec<FlagEntry>) -> Self {
        Self { entries }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Value of the first entry named `name`, if any. Uniqueness of names
    /// is assumed upstream, not enforced here.
    pub fn value_of(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.value.as_str())
    }

    pub fn entries(&self) -> &[FlagEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
