//! convergent core - resource contract, graph, and convergence engine

pub mod error;
pub mod graph;
pub mod module;
pub mod options;
pub mod param;
pub mod relation;
pub mod report;
pub mod resource;

pub use error::{BoxError, Error, Result};
pub use graph::Graph;
pub use module::Module;
pub use options::{CascadeMode, EngineOptions, NotifyMode, ValidationMode};
pub use param::Param;
pub use relation::Relation;
pub use report::{RunEvent, RunReport};
pub use resource::{EdgeKind, Resource};
