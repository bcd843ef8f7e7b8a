//! convergent: converge files, commands and services to a declared state
//!
//! Usage:
//!   convergent apply site.toml         → converge every resource
//!   convergent apply site.toml --json  → same, report as JSON
//!   convergent check site.toml         → validate edges and cycles only
//!   convergent config                  → print effective settings

use clap::{Parser, Subcommand};
use convergent::{load_module, logging, Settings};
use convergent_core::{RunEvent, RunReport};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "convergent",
    version = env!("CARGO_PKG_VERSION"),
    about = "Converge files, commands and services to a declared state"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (TOML). Default: <config dir>/convergent/config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log as JSON lines
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Converge every resource in a manifest
    Apply {
        /// Manifest file (TOML)
        manifest: PathBuf,
        /// Print the run report as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Validate a manifest without converging anything
    Check {
        /// Manifest file (TOML)
        manifest: PathBuf,
    },
    /// Print the effective settings as TOML
    Config,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging depends on settings, so a bad settings file is reported after init.
    let loaded = match cli.config.clone().or_else(Settings::default_path) {
        Some(path) => Settings::try_load(&path),
        None => Ok(None),
    };
    let (settings, problem) = match loaded {
        Ok(settings) => (settings.unwrap_or_default(), None),
        Err(e) => (Settings::default(), Some(e)),
    };
    logging::init(&settings.log, cli.json_logs);
    if let Some(e) = problem {
        tracing::warn!("{:#}, using defaults", e);
    }

    match cli.command {
        Commands::Apply { manifest, json } => {
            let module = load_module(&settings, &manifest)?;
            let report = module.run()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
        Commands::Check { manifest } => {
            let module = load_module(&settings, &manifest)?;
            module.validate()?;
            println!(
                "{}: {} resources, ok",
                manifest.display(),
                module.graph().len()
            );
        }
        Commands::Config => {
            print!("{}", settings.to_toml());
        }
    }

    Ok(())
}

fn print_report(report: &RunReport) {
    for event in &report.events {
        match event {
            RunEvent::Converged {
                name,
                kind,
                changed,
            } => {
                let state = if *changed { "changed" } else { "ok" };
                println!("{:<9} {:<8} {}", state, kind, name);
            }
            RunEvent::Refreshed { name } => {
                println!("{:<9} {:<8} {}", "refreshed", "", name);
            }
        }
    }
    println!(
        "{} converged, {} changed, {} refreshed",
        report.converged().len(),
        report.changed().len(),
        report.refreshed().len()
    );
}
