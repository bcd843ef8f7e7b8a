//! Service resource: install, update, remove, start and stop a managed service
//!
//! Enforcement goes through a [`ServiceManager`] backend. `platform_manager()`
//! picks the backend for the build target: systemd on Linux, an always-failing
//! backend elsewhere. [`MemoryServiceManager`] keeps state in process.

pub mod memory;
pub mod systemd;
pub mod unsupported;

pub use memory::MemoryServiceManager;
pub use systemd::{Scope, SystemdManager};
pub use unsupported::UnsupportedManager;

use convergent_core::{relation_edges, BoxError, Error, Param, Relation, Resource, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::exec::command_line;

/// What the service manager should have on record for a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub name: String,
    pub path: String,
    pub args: Vec<String>,
    pub description: String,
}

impl ServiceDefinition {
    pub fn command_line(&self) -> String {
        command_line(&self.path, &self.args)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Running,
    Stopped,
    /// Between states (starting, stopping, reloading).
    Pending,
}

/// Platform service manager.
pub trait ServiceManager: Send + Sync {
    /// The installed definition, or `None` if the service is not installed.
    fn definition(&self, name: &str) -> Result<Option<ServiceDefinition>>;
    fn install(&self, definition: &ServiceDefinition) -> Result<()>;
    fn update(&self, definition: &ServiceDefinition) -> Result<()>;
    fn remove(&self, name: &str) -> Result<()>;
    fn status(&self, name: &str) -> Result<ServiceStatus>;
    fn start(&self, name: &str) -> Result<()>;
    fn stop(&self, name: &str) -> Result<()>;
    fn restart(&self, name: &str) -> Result<()>;
}

/// Bounded poll used while waiting for a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            interval: Duration::from_millis(300),
        }
    }
}

/// Backend for the current build target.
pub fn platform_manager(scope: Scope, unit_dir: Option<PathBuf>) -> Arc<dyn ServiceManager> {
    #[cfg(target_os = "linux")]
    {
        let manager = SystemdManager::new(scope);
        match unit_dir {
            Some(dir) => Arc::new(manager.with_unit_dir(dir)),
            None => Arc::new(manager),
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = (scope, unit_dir);
        Arc::new(UnsupportedManager)
    }
}

/// A service installed through a [`ServiceManager`].
///
/// `started` defaults to `true`; set it to `false` to keep an installed
/// service stopped. Backends are systemd, in-memory and unsupported. There is
/// no Windows service control, so non-Linux targets get `UnsupportedManager`.
pub struct Service {
    relation: Relation,
    manager: Arc<dyn ServiceManager>,
    wait: WaitPolicy,
    name: Param<String>,
    path: Param<String>,
    args: Param<Vec<String>>,
    description: Param<String>,
    started: Param<bool>,
    absent: Param<bool>,
}

impl Service {
    /// A service that should be installed and running, managed by `manager`.
    pub fn new(name: impl Into<String>, manager: Arc<dyn ServiceManager>) -> Self {
        Self {
            relation: Relation::default(),
            manager,
            wait: WaitPolicy::default(),
            name: Param::Literal(name.into()),
            path: Param::Literal(String::new()),
            args: Param::Literal(Vec::new()),
            description: Param::Literal(String::new()),
            started: Param::Literal(true),
            absent: Param::Literal(false),
        }
    }

    pub fn name_with<F>(mut self, f: F) -> Self
    where
        F: Fn() -> std::result::Result<String, BoxError> + Send + Sync + 'static,
    {
        self.name = Param::deferred(f);
        self
    }

    /// Binary the service runs.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Param::Literal(path.into());
        self
    }

    pub fn path_with<F>(mut self, f: F) -> Self
    where
        F: Fn() -> std::result::Result<String, BoxError> + Send + Sync + 'static,
    {
        self.path = Param::deferred(f);
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = Param::Literal(args.into_iter().map(Into::into).collect());
        self
    }

    pub fn args_with<F>(mut self, f: F) -> Self
    where
        F: Fn() -> std::result::Result<Vec<String>, BoxError> + Send + Sync + 'static,
    {
        self.args = Param::deferred(f);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Param::Literal(description.into());
        self
    }

    pub fn started(mut self, started: bool) -> Self {
        self.started = Param::Literal(started);
        self
    }

    pub fn started_with<F>(mut self, f: F) -> Self
    where
        F: Fn() -> std::result::Result<bool, BoxError> + Send + Sync + 'static,
    {
        self.started = Param::deferred(f);
        self
    }

    pub fn absent(mut self, absent: bool) -> Self {
        self.absent = Param::Literal(absent);
        self
    }

    pub fn absent_with<F>(mut self, f: F) -> Self
    where
        F: Fn() -> std::result::Result<bool, BoxError> + Send + Sync + 'static,
    {
        self.absent = Param::deferred(f);
        self
    }

    pub fn wait(mut self, wait: WaitPolicy) -> Self {
        self.wait = wait;
        self
    }

    relation_builders!();

    fn wait_for(&self, name: &str, target: ServiceStatus) -> Result<()> {
        let started = Instant::now();
        loop {
            let status = self.manager.status(name)?;
            if status == target {
                debug!(service = name, ?status, "service reached state");
                return Ok(());
            }
            let waited = started.elapsed();
            if waited >= self.wait.timeout {
                return Err(Error::Timeout {
                    what: format!("service '{}' to be {:?} (last seen {:?})", name, target, status),
                    waited,
                });
            }
            std::thread::sleep(self.wait.interval);
        }
    }

    fn stop_and_wait(&self, name: &str) -> Result<bool> {
        if self.manager.status(name)? == ServiceStatus::Stopped {
            return Ok(false);
        }
        self.manager.stop(name)?;
        self.wait_for(name, ServiceStatus::Stopped)?;
        info!(service = name, "stopped service");
        Ok(true)
    }
}

impl Resource for Service {
    relation_edges!();

    fn converge(&self) -> Result<bool> {
        let name = self.name.resolve("name")?;
        let absent = self.absent.resolve("absent")?;
        let installed = self.manager.definition(&name)?;

        if absent {
            if installed.is_none() {
                return Ok(false);
            }
            self.stop_and_wait(&name)?;
            self.manager.remove(&name)?;
            info!(service = name.as_str(), "removed service");
            return Ok(true);
        }

        let desired = ServiceDefinition {
            name: name.clone(),
            path: self.path.resolve("path")?,
            args: self.args.resolve("args")?,
            description: self.description.resolve("description")?,
        };
        let started = self.started.resolve("started")?;
        let mut changed = false;

        match installed {
            None => {
                self.manager.install(&desired)?;
                info!(
                    service = name.as_str(),
                    command = %desired.command_line(),
                    "installed service"
                );
                changed = true;
            }
            Some(current) if current != desired => {
                self.manager.update(&desired)?;
                info!(
                    service = name.as_str(),
                    command = %desired.command_line(),
                    "updated service"
                );
                changed = true;
            }
            Some(_) => debug!(service = name.as_str(), "definition up to date"),
        }

        if started {
            if self.manager.status(&name)? != ServiceStatus::Running {
                self.manager.start(&name)?;
                self.wait_for(&name, ServiceStatus::Running)?;
                info!(service = name.as_str(), "started service");
                changed = true;
            }
        } else if self.stop_and_wait(&name)? {
            changed = true;
        }

        Ok(changed)
    }

    /// Restart the service if it is meant to be running.
    fn refresh(&self) -> Result<()> {
        let name = self.name.resolve("name")?;
        if self.absent.resolve("absent")? || !self.started.resolve("started")? {
            return Ok(());
        }
        self.manager.restart(&name)?;
        self.wait_for(&name, ServiceStatus::Running)?;
        info!(service = name.as_str(), "restarted service");
        Ok(())
    }

    fn kind(&self) -> &str {
        "service"
    }
}
