//! In-process service manager.
//!
//! Keeps definitions and states in a map and records every mutating call.
//! Transitions can be made to take several status polls to settle, which
//! exercises the wait loop without a real service manager.

use convergent_core::{Error, Result};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{ServiceDefinition, ServiceManager, ServiceStatus};

#[derive(Debug)]
struct Entry {
    definition: ServiceDefinition,
    status: ServiceStatus,
    /// Target state and polls left until it is reached.
    pending: Option<(ServiceStatus, usize)>,
}

#[derive(Debug, Default)]
pub struct MemoryServiceManager {
    services: Mutex<HashMap<String, Entry>>,
    ops: Mutex<Vec<String>>,
    transition_polls: usize,
}

impl MemoryServiceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `status` calls a start/stop/restart takes to settle.
    pub fn with_transition_polls(mut self, polls: usize) -> Self {
        self.transition_polls = polls;
        self
    }

    /// Seed an installed service.
    pub fn insert(&self, definition: ServiceDefinition, status: ServiceStatus) {
        self.services().insert(
            definition.name.clone(),
            Entry {
                definition,
                status,
                pending: None,
            },
        );
    }

    /// Mutating calls so far, e.g. `"install web"`.
    pub fn ops(&self) -> Vec<String> {
        lock(&self.ops).clone()
    }

    /// Current state without advancing pending transitions.
    pub fn status_of(&self, name: &str) -> Option<ServiceStatus> {
        self.services().get(name).map(|e| e.status)
    }

    pub fn definition_of(&self, name: &str) -> Option<ServiceDefinition> {
        self.services().get(name).map(|e| e.definition.clone())
    }

    fn services(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        lock(&self.services)
    }

    fn record(&self, op: &str, name: &str) {
        lock(&self.ops).push(format!("{} {}", op, name));
    }

    fn transition(&self, op: &str, name: &str, target: ServiceStatus) -> Result<()> {
        let mut services = self.services();
        let entry = services
            .get_mut(name)
            .ok_or_else(|| Error::service(name, "not installed"))?;
        if self.transition_polls == 0 {
            entry.status = target;
            entry.pending = None;
        } else {
            entry.status = ServiceStatus::Pending;
            entry.pending = Some((target, self.transition_polls));
        }
        drop(services);
        self.record(op, name);
        Ok(())
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ServiceManager for MemoryServiceManager {
    fn definition(&self, name: &str) -> Result<Option<ServiceDefinition>> {
        Ok(self.definition_of(name))
    }

    fn install(&self, definition: &ServiceDefinition) -> Result<()> {
        let mut services = self.services();
        if services.contains_key(&definition.name) {
            return Err(Error::service(&definition.name, "already installed"));
        }
        services.insert(
            definition.name.clone(),
            Entry {
                definition: definition.clone(),
                status: ServiceStatus::Stopped,
                pending: None,
            },
        );
        drop(services);
        self.record("install", &definition.name);
        Ok(())
    }

    fn update(&self, definition: &ServiceDefinition) -> Result<()> {
        let mut services = self.services();
        let entry = services
            .get_mut(&definition.name)
            .ok_or_else(|| Error::service(&definition.name, "not installed"))?;
        entry.definition = definition.clone();
        drop(services);
        self.record("update", &definition.name);
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        if self.services().remove(name).is_none() {
            return Err(Error::service(name, "not installed"));
        }
        self.record("remove", name);
        Ok(())
    }

    fn status(&self, name: &str) -> Result<ServiceStatus> {
        let mut services = self.services();
        let entry = services
            .get_mut(name)
            .ok_or_else(|| Error::service(name, "not installed"))?;
        if let Some((target, left)) = entry.pending.as_mut() {
            *left = left.saturating_sub(1);
            if *left == 0 {
                entry.status = *target;
                entry.pending = None;
            }
        }
        Ok(entry.status)
    }

    fn start(&self, name: &str) -> Result<()> {
        self.transition("start", name, ServiceStatus::Running)
    }

    fn stop(&self, name: &str) -> Result<()> {
        self.transition("stop", name, ServiceStatus::Stopped)
    }

    fn restart(&self, name: &str) -> Result<()> {
        self.transition("restart", name, ServiceStatus::Running)
    }
}
