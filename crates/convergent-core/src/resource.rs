//! The Resource trait: implement this to add a new kind of enforceable unit.
//!
//! A resource declares its edges by name and knows how to converge its own
//! state. The [`Module`](crate::Module) decides when.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Which edge list a reference came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Required,
    Notified,
    Refreshed,
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Required => write!(f, "Required"),
            Self::Notified => write!(f, "Notified"),
            Self::Refreshed => write!(f, "Refreshed"),
        }
    }
}

pub trait Resource {
    /// Resources that must be fully converged before this one.
    fn requires(&self) -> &[String];

    /// Resources interested in this one having been applied.
    fn notifies(&self) -> &[String];

    /// Resources to cascade to after this one reports a change.
    fn refreshes(&self) -> &[String];

    /// Bring real state toward desired state. Returns whether anything was
    /// mutated.
    fn converge(&self) -> Result<bool>;

    /// Lightweight side effect, distinct from convergence (e.g. restarting a
    /// process). Many kinds do nothing.
    fn refresh(&self) -> Result<()> {
        Ok(())
    }

    /// Short label used in logs and run reports.
    fn kind(&self) -> &str {
        "resource"
    }

    fn edges(&self, kind: EdgeKind) -> &[String] {
        match kind {
            EdgeKind::Required => self.requires(),
            EdgeKind::Notified => self.notifies(),
            EdgeKind::Refreshed => self.refreshes(),
        }
    }
}

/// Implements the three edge accessors of [`Resource`] by delegating to a
/// `relation: Relation` field.
#[macro_export]
macro_rules! relation_edges {
    () => {
        fn requires(&self) -> &[String] {
            &self.relation.requires
        }

        fn notifies(&self) -> &[String] {
            &self.relation.notifies
        }

        fn refreshes(&self) -> &[String] {
            &self.relation.refreshes
        }
    };
}

