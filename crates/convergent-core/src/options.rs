//! Engine behavior switches.

use serde::{Deserialize, Serialize};

/// When dangling edges and `requires` cycles are detected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Whole graph, before any resource is converged.
    #[default]
    Eager,
    /// Per resource, when it is first visited.
    Lazy,
}

/// What a change does to the resources listed in `refreshes`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CascadeMode {
    /// Apply the target (converging it if not yet done this run).
    #[default]
    Converge,
    /// Call the target's `refresh()` hook. A target not yet converged is
    /// applied first and only refreshed if that reported no change.
    Refresh,
}

/// What `notifies` edges do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyMode {
    /// Validated, otherwise ignored.
    #[default]
    Inert,
    /// Apply each notified resource after the notifier converges.
    Apply,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    pub validation: ValidationMode,
    pub cascade: CascadeMode,
    pub notify: NotifyMode,
}

impl EngineOptions {
    pub fn lazy(mut self) -> Self {
        self.validation = ValidationMode::Lazy;
        self
    }

    pub fn cascade(mut self, mode: CascadeMode) -> Self {
        self.cascade = mode;
        self
    }

    pub fn notify(mut self, mode: NotifyMode) -> Self {
        self.notify = mode;
        self
    }
}
