//! Error types for convergent

use std::time::Duration;
use thiserror::Error;

use crate::resource::EdgeKind;

/// Boxed error returned by deferred parameter evaluators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{edge} resource '{name}' not found in module (referenced by '{referenced_by}')")]
    MissingResource {
        name: String,
        referenced_by: String,
        edge: EdgeKind,
    },

    #[error("duplicate resource name: {0}")]
    DuplicateResource(String),

    #[error("dependency cycle detected: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("failed to evaluate {field}: {source}")]
    Evaluation {
        field: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("command '{command}' failed ({}): {stderr}", exit_label(.code))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("timeout after {waited:?} waiting for {what}")]
    Timeout { what: String, waited: Duration },

    #[error("service error: {name} - {message}")]
    Service { name: String, message: String },

    #[error("not supported on this platform: {0}")]
    Unsupported(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("resource '{name}': {source}")]
    Resource {
        name: String,
        #[source]
        source: Box<Error>,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("exit code {}", c),
        None => "terminated by signal".to_string(),
    }
}

impl Error {
    pub fn missing(
        name: impl Into<String>,
        referenced_by: impl Into<String>,
        edge: EdgeKind,
    ) -> Self {
        Self::MissingResource {
            name: name.into(),
            referenced_by: referenced_by.into(),
            edge,
        }
    }

    pub fn evaluation(field: &'static str, source: BoxError) -> Self {
        Self::Evaluation { field, source }
    }

    pub fn service(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Service {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Attach the failing resource's name. Already-wrapped errors are left alone
    /// so the innermost resource stays the one reported.
    pub fn in_resource(self, name: impl Into<String>) -> Self {
        match self {
            Self::Resource { .. } => self,
            other => Self::Resource {
                name: name.into(),
                source: Box::new(other),
            },
        }
    }

    /// The error with any `Resource` wrappers removed.
    pub fn root(&self) -> &Error {
        match self {
            Self::Resource { source, .. } => source.root(),
            other => other,
        }
    }

    /// True for graph configuration errors (dangling edges, duplicates, cycles).
    pub fn is_config_error(&self) -> bool {
        matches!(
            self.root(),
            Self::MissingResource { .. } | Self::DuplicateResource(_) | Self::Cycle { .. }
        )
    }
}
