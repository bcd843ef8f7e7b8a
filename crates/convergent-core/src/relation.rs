//! Relation: the three edge lists a resource declares.

use serde::{Deserialize, Serialize};

/// Edge storage that resource kinds embed to satisfy the edge accessors of
/// [`Resource`](crate::Resource). Entries within a list are peers; no order
/// between them is implied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Relation {
    /// Resources applied before this one.
    pub requires: Vec<String>,
    /// Resources re-applied after this one changes.
    pub refreshes: Vec<String>,
    /// Resources notified after this one is applied.
    pub notifies: Vec<String>,
}

impl Relation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(mut self, name: impl Into<String>) -> Self {
        self.requires.push(name.into());
        self
    }

    pub fn refresh(mut self, name: impl Into<String>) -> Self {
        self.refreshes.push(name.into());
        self
    }

    pub fn notify(mut self, name: impl Into<String>) -> Self {
        self.notifies.push(name.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.requires.is_empty() && self.refreshes.is_empty() && self.notifies.is_empty()
    }
}
