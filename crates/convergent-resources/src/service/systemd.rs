//! Systemd backend: unit files plus `systemctl`.

use convergent_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

use super::{ServiceDefinition, ServiceManager, ServiceStatus};

/// Which systemd instance manages the units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// `systemctl --user`, units under `~/.config/systemd/user`.
    #[default]
    User,
    /// System manager, units under `/etc/systemd/system`.
    System,
}

impl Scope {
    pub fn default_unit_dir(&self) -> PathBuf {
        match self {
            Self::User => dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join("systemd/user"),
            Self::System => PathBuf::from("/etc/systemd/system"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SystemdManager {
    scope: Scope,
    unit_dir: PathBuf,
}

impl SystemdManager {
    pub fn new(scope: Scope) -> Self {
        Self {
            scope,
            unit_dir: scope.default_unit_dir(),
        }
    }

    pub fn with_unit_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.unit_dir = dir.into();
        self
    }

    /// Unit file path for `name`. Fails for names systemd would not accept,
    /// so nothing is ever written outside the unit directory.
    pub fn unit_path(&self, name: &str) -> Result<PathBuf> {
        check_unit_name(name)?;
        Ok(self.unit_dir.join(format!("{}.service", name)))
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new("systemctl");
        if self.scope == Scope::User {
            cmd.arg("--user");
        }
        cmd
    }

    fn systemctl(&self, args: &[&str]) -> Result<String> {
        debug!("systemctl {}", args.join(" "));
        let output = self.command().args(args).output()?;
        if !output.status.success() {
            return Err(Error::CommandFailed {
                command: format!("systemctl {}", args.join(" ")),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn write_unit(&self, definition: &ServiceDefinition) -> Result<()> {
        let path = self.unit_path(&definition.name)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, render_unit(definition))?;
        debug!("wrote unit file {}", path.display());
        Ok(())
    }
}

impl ServiceManager for SystemdManager {
    fn definition(&self, name: &str) -> Result<Option<ServiceDefinition>> {
        read_unit(&self.unit_path(name)?, name)
    }

    fn install(&self, definition: &ServiceDefinition) -> Result<()> {
        check_unit_name(&definition.name)?;
        self.write_unit(definition)?;
        self.systemctl(&["daemon-reload"])?;
        self.systemctl(&["enable", &definition.name])?;
        Ok(())
    }

    fn update(&self, definition: &ServiceDefinition) -> Result<()> {
        self.write_unit(definition)?;
        self.systemctl(&["daemon-reload"])?;
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        let path = self.unit_path(name)?;
        self.systemctl(&["disable", name])?;
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        self.systemctl(&["daemon-reload"])?;
        Ok(())
    }

    fn status(&self, name: &str) -> Result<ServiceStatus> {
        check_unit_name(name)?;
        // is-active exits non-zero for inactive units, so read stdout directly.
        let output = self.command().args(["is-active", name]).output()?;
        Ok(parse_active_state(&String::from_utf8_lossy(&output.stdout)))
    }

    fn start(&self, name: &str) -> Result<()> {
        check_unit_name(name)?;
        self.systemctl(&["start", name]).map(|_| ())
    }

    fn stop(&self, name: &str) -> Result<()> {
        check_unit_name(name)?;
        self.systemctl(&["stop", name]).map(|_| ())
    }

    fn restart(&self, name: &str) -> Result<()> {
        check_unit_name(name)?;
        self.systemctl(&["restart", name]).map(|_| ())
    }
}

/// Unit names are ASCII alphanumerics plus `:-_.\@`, without `..` and
/// without a leading `-` that `systemctl` would read as a flag.
pub fn check_unit_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= 255
        && !name.starts_with('-')
        && !name.contains("..")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || ":-_.\\@".contains(c));
    if valid {
        Ok(())
    } else {
        Err(Error::service(name, "invalid unit name"))
    }
}

/// Map `systemctl is-active` output to a status.
pub fn parse_active_state(output: &str) -> ServiceStatus {
    match output.trim() {
        "active" => ServiceStatus::Running,
        "activating" | "deactivating" | "reloading" | "refreshing" => ServiceStatus::Pending,
        _ => ServiceStatus::Stopped,
    }
}

pub fn render_unit(definition: &ServiceDefinition) -> String {
    let exec = std::iter::once(definition.path.as_str())
        .chain(definition.args.iter().map(String::as_str))
        .map(quote_word)
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        r#"[Unit]
Description={description}
After=network.target

[Service]
Type=simple
ExecStart={exec}
Restart=on-failure
RestartSec=5

[Install]
WantedBy=default.target
"#,
        description = definition.description,
    )
}

/// Recover a definition from unit file text. Only `Description=` and
/// `ExecStart=` are read.
pub fn parse_unit(name: &str, text: &str) -> Option<ServiceDefinition> {
    let mut description = String::new();
    let mut exec = None;
    for line in text.lines().map(str::trim) {
        if let Some(v) = line.strip_prefix("Description=") {
            description = v.to_string();
        } else if let Some(v) = line.strip_prefix("ExecStart=") {
            exec = Some(split_words(v));
        }
    }
    let mut words = exec?.into_iter();
    let path = words.next()?;
    Some(ServiceDefinition {
        name: name.to_string(),
        path,
        args: words.collect(),
        description,
    })
}

fn read_unit(path: &Path, name: &str) -> Result<Option<ServiceDefinition>> {
    match std::fs::read_to_string(path) {
        Ok(text) => parse_unit(name, &text).map(Some).ok_or_else(|| {
            Error::service(name, format!("unreadable unit file {}", path.display()))
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn quote_word(word: &str) -> String {
    if !word.is_empty() && !word.contains(|c: char| c.is_whitespace() || c == '"') {
        return word.to_string();
    }
    format!("\"{}\"", word.replace('\\', "\\\\").replace('"', "\\\""))
}

fn split_words(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut in_word = false;
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' if quoted => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '"' => {
                quoted = !quoted;
                in_word = true;
            }
            c if c.is_whitespace() && !quoted => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(args: &[&str]) -> ServiceDefinition {
        ServiceDefinition {
            name: "web".into(),
            path: "/usr/bin/web".into(),
            args: args.iter().map(|s| s.to_string()).collect(),
            description: "Web server".into(),
        }
    }

    #[test]
    fn unit_names_that_leave_the_unit_dir_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let units = tmp.path().join("units");
        let mgr = SystemdManager::new(Scope::System).with_unit_dir(&units);

        for name in ["../escaped", "a/b", "", "-now", "x\0y", "sp ace"] {
            let mut bad = def(&[]);
            bad.name = name.to_string();
            let err = mgr.write_unit(&bad).unwrap_err();
            assert!(matches!(err, Error::Service { .. }), "{name:?}: {err}");
            assert!(mgr.definition(name).is_err());
        }
        assert!(!tmp.path().join("escaped.service").exists());
        assert!(!units.exists());
    }

    #[test]
    fn ordinary_unit_names_are_accepted() {
        for name in ["web", "app-conf", "getty@tty1", "my_svc.v2"] {
            assert!(check_unit_name(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn unit_text_survives_a_read_back() {
        let original = def(&["--root", "/srv/my site", "", "say \"hi\""]);
        let text = render_unit(&original);
        assert!(text.contains("Description=Web server"));
        assert_eq!(parse_unit("web", &text), Some(original));
    }

    #[test]
    fn unit_without_exec_start_is_unreadable() {
        assert!(parse_unit("web", "[Unit]\nDescription=x\n").is_none());
    }

    #[test]
    fn active_states() {
        assert_eq!(parse_active_state("active\n"), ServiceStatus::Running);
        assert_eq!(parse_active_state("activating"), ServiceStatus::Pending);
        assert_eq!(parse_active_state("inactive"), ServiceStatus::Stopped);
        assert_eq!(parse_active_state("failed"), ServiceStatus::Stopped);
        assert_eq!(parse_active_state(""), ServiceStatus::Stopped);
    }

    #[test]
    fn missing_unit_file_means_not_installed() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = SystemdManager::new(Scope::User).with_unit_dir(tmp.path());
        assert!(mgr.definition("web").unwrap().is_none());
    }

    #[test]
    fn written_unit_is_read_back_as_definition() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = SystemdManager::new(Scope::System).with_unit_dir(tmp.path());
        mgr.write_unit(&def(&["--port", "80"])).unwrap();
        assert!(tmp.path().join("web.service").exists());
        assert_eq!(mgr.definition("web").unwrap(), Some(def(&["--port", "80"])));
    }
}
