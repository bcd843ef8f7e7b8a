//! Exec resource: run a command synchronously on every convergence

use convergent_core::{relation_edges, BoxError, Error, Param, Relation, Resource, Result};
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;

/// A local command invocation. There is no state check: every successful run
/// counts as a change.
#[derive(Debug, Clone)]
pub struct Exec {
    relation: Relation,
    command: Param<String>,
    args: Param<Vec<String>>,
    cwd: Option<PathBuf>,
}

impl Exec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            relation: Relation::default(),
            command: Param::Literal(command.into()),
            args: Param::Literal(Vec::new()),
            cwd: None,
        }
    }

    /// `sh -c <script>`.
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new("sh").args(["-c".to_string(), script.into()])
    }

    pub fn command_with<F>(mut self, f: F) -> Self
    where
        F: Fn() -> std::result::Result<String, BoxError> + Send + Sync + 'static,
    {
        self.command = Param::deferred(f);
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

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    relation_builders!();
}

impl Resource for Exec {
    relation_edges!();

    fn converge(&self) -> Result<bool> {
        let command = self.command.resolve("command")?;
        let args = self.args.resolve("args")?;
        let cmdline = command_line(&command, &args);
        debug!("exec: {}", cmdline.chars().take(120).collect::<String>());

        let mut cmd = Command::new(&command);
        cmd.args(&args);
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }

        let output = cmd.output()?;
        if !output.status.success() {
            return Err(Error::CommandFailed {
                command: cmdline,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            debug!("exec stdout: {}", stdout.trim_end());
        }
        Ok(true)
    }

    fn kind(&self) -> &str {
        "exec"
    }
}

pub(crate) fn command_line(command: &str, args: &[String]) -> String {
    std::iter::once(command)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}
