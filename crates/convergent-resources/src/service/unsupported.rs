//! Backend for platforms without service support. Every call fails.

use convergent_core::{Error, Result};

use super::{ServiceDefinition, ServiceManager, ServiceStatus};

#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedManager;

fn unsupported<T>(op: &str) -> Result<T> {
    Err(Error::Unsupported(format!("service {}", op)))
}

impl ServiceManager for UnsupportedManager {
    fn definition(&self, _name: &str) -> Result<Option<ServiceDefinition>> {
        unsupported("lookup")
    }

    fn install(&self, _definition: &ServiceDefinition) -> Result<()> {
        unsupported("install")
    }

    fn update(&self, _definition: &ServiceDefinition) -> Result<()> {
        unsupported("update")
    }

    fn remove(&self, _name: &str) -> Result<()> {
        unsupported("remove")
    }

    fn status(&self, _name: &str) -> Result<ServiceStatus> {
        unsupported("status")
    }

    fn start(&self, _name: &str) -> Result<()> {
        unsupported("start")
    }

    fn stop(&self, _name: &str) -> Result<()> {
        unsupported("stop")
    }

    fn restart(&self, _name: &str) -> Result<()> {
        unsupported("restart")
    }
}
