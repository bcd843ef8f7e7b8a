//! convergent: apply a TOML manifest of files, commands and services.
//!
//! The engine lives in `convergent-core`, the resource kinds in
//! `convergent-resources`. This crate loads settings and manifests and drives
//! the `convergent` binary.

pub mod config;
pub mod logging;
pub mod manifest;

pub use config::Settings;
pub use manifest::Manifest;

use anyhow::Result;
use convergent_core::Module;
use std::path::Path;

/// Load `manifest` and build a Module with the effective engine modes.
pub fn load_module(settings: &Settings, manifest: &Path) -> Result<Module> {
    let manifest = Manifest::load(manifest)?;
    let options = manifest.engine.apply(settings.engine);
    let graph = manifest.into_graph(settings.service.manager(), settings.service.wait_policy())?;
    Ok(Module::with_options(graph, options))
}
