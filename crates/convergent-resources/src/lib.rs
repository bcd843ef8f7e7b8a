//! convergent resources: concrete resource kinds
//!
//! Each kind implements `convergent_core::Resource` and lives in its own file:
//! `file` for local files, `exec` for command invocations, `service` for
//! service lifecycle through a pluggable platform backend.

/// Builder methods shared by every kind that stores a `relation: Relation`.
macro_rules! relation_builders {
    () => {
        pub fn with_relation(mut self, relation: convergent_core::Relation) -> Self {
            self.relation = relation;
            self
        }

        pub fn requiring(mut self, name: impl Into<String>) -> Self {
            self.relation.requires.push(name.into());
            self
        }

        pub fn refreshing(mut self, name: impl Into<String>) -> Self {
            self.relation.refreshes.push(name.into());
            self
        }

        pub fn notifying(mut self, name: impl Into<String>) -> Self {
            self.relation.notifies.push(name.into());
            self
        }
    };
}

pub mod exec;
pub mod file;
pub mod service;

pub use exec::Exec;
pub use file::File;
pub use service::{
    platform_manager, MemoryServiceManager, Scope, Service, ServiceDefinition, ServiceManager,
    ServiceStatus, SystemdManager, UnsupportedManager, WaitPolicy,
};
