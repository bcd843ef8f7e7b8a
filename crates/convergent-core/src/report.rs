//! Run report: what a successful run did, in order.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    Converged {
        name: String,
        kind: String,
        changed: bool,
    },
    Refreshed {
        name: String,
    },
}

impl RunEvent {
    pub fn name(&self) -> &str {
        match self {
            Self::Converged { name, .. } | Self::Refreshed { name } => name,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub events: Vec<RunEvent>,
}

impl RunReport {
    pub(crate) fn converged_one(&mut self, name: &str, kind: &str, changed: bool) {
        self.events.push(RunEvent::Converged {
            name: name.to_string(),
            kind: kind.to_string(),
            changed,
        });
    }

    pub(crate) fn refreshed_one(&mut self, name: &str) {
        self.events.push(RunEvent::Refreshed {
            name: name.to_string(),
        });
    }

    /// Names in convergence order.
    pub fn converged(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter(|e| matches!(e, RunEvent::Converged { .. }))
            .map(RunEvent::name)
            .collect()
    }

    /// Names whose convergence reported a change, in order.
    pub fn changed(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter(|e| matches!(e, RunEvent::Converged { changed: true, .. }))
            .map(RunEvent::name)
            .collect()
    }

    /// Names whose refresh hook ran, in order. A name may repeat.
    pub fn refreshed(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter(|e| matches!(e, RunEvent::Refreshed { .. }))
            .map(RunEvent::name)
            .collect()
    }

    pub fn was_changed(&self, name: &str) -> bool {
        self.changed().contains(&name)
    }

    /// Position of `name` in convergence order.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.converged().iter().position(|n| *n == name)
    }

    pub fn is_unchanged(&self) -> bool {
        self.changed().is_empty() && self.refreshed().is_empty()
    }
}
