//! File resource: presence, permission bits, and content of a local file

use convergent_core::{relation_edges, BoxError, Param, Relation, Resource, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A regular file to enforce on the local filesystem.
///
/// `absent` wins over everything else. `content` and `mode` are only
/// enforced when set.
#[derive(Debug, Clone)]
pub struct File {
    relation: Relation,
    path: Param<PathBuf>,
    absent: Param<bool>,
    content: Param<Option<Vec<u8>>>,
    mode: Param<Option<u32>>,
}

impl File {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            relation: Relation::default(),
            path: Param::Literal(path.into()),
            absent: Param::Literal(false),
            content: Param::Literal(None),
            mode: Param::Literal(None),
        }
    }

    /// Path computed at convergence time.
    pub fn path_with<F>(mut self, f: F) -> Self
    where
        F: Fn() -> std::result::Result<PathBuf, BoxError> + Send + Sync + 'static,
    {
        self.path = Param::deferred(f);
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

    pub fn content(mut self, content: impl Into<Vec<u8>>) -> Self {
        self.content = Param::Literal(Some(content.into()));
        self
    }

    pub fn content_with<F>(mut self, f: F) -> Self
    where
        F: Fn() -> std::result::Result<Vec<u8>, BoxError> + Send + Sync + 'static,
    {
        self.content = Param::deferred(move || f().map(Some));
        self
    }

    /// Unix permission bits, e.g. `0o644`.
    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = Param::Literal(Some(mode));
        self
    }

    pub fn mode_with<F>(mut self, f: F) -> Self
    where
        F: Fn() -> std::result::Result<u32, BoxError> + Send + Sync + 'static,
    {
        self.mode = Param::deferred(move || f().map(Some));
        self
    }

    relation_builders!();
}

impl Resource for File {
    relation_edges!();

    fn converge(&self) -> Result<bool> {
        let path = self.path.resolve("path")?;
        let absent = self.absent.resolve("absent")?;

        let exists = match fs::symlink_metadata(&path) {
            Ok(_) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };

        if absent {
            if !exists {
                return Ok(false);
            }
            fs::remove_file(&path)?;
            info!("removed {}", path.display());
            return Ok(true);
        }

        let mode = self.mode.resolve("mode")?;
        let content = self.content.resolve("content")?;
        let mut changed = false;

        if !exists {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, b"")?;
            info!("created {}", path.display());
            changed = true;
        }

        if let Some(mode) = mode {
            if set_mode(&path, mode)? {
                info!("set mode {:o} on {}", mode, path.display());
                changed = true;
            }
        }

        if let Some(content) = content {
            let current = fs::read(&path)?;
            if current != content {
                fs::write(&path, &content)?;
                info!("wrote {} ({} bytes)", path.display(), content.len());
                changed = true;
            } else {
                debug!("content of {} up to date", path.display());
            }
        }

        Ok(changed)
    }

    fn kind(&self) -> &str {
        "file"
    }
}

/// Apply permission bits. Returns whether they differed.
#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<bool> {
    use std::os::unix::fs::PermissionsExt;

    let current = fs::metadata(path)?.permissions().mode() & 0o7777;
    if current == mode & 0o7777 {
        return Ok(false);
    }
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(true)
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<bool> {
    Err(convergent_core::Error::Unsupported("file permission modes".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use convergent_core::Error;

    #[test]
    fn creates_missing_file_with_parents() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a/b/c.txt");
        let file = File::new(&path).content("hello");

        assert!(file.converge().unwrap());
        assert_eq!(fs::read(&path).unwrap(), b"hello");
        assert!(!file.converge().unwrap());
    }

    #[test]
    fn absent_missing_file_is_unchanged() {
        let tmp = tempfile::tempdir().unwrap();
        let file = File::new(tmp.path().join("nope")).absent(true);
        assert!(!file.converge().unwrap());
    }

    #[test]
    fn absent_removes_existing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("old");
        fs::write(&path, "x").unwrap();
        assert!(File::new(&path).absent(true).converge().unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn rewrites_drifted_content() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("conf");
        fs::write(&path, "old").unwrap();
        assert!(File::new(&path).content("new").converge().unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
    }

    #[test]
    fn existing_file_without_content_is_left_alone() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("keep");
        fs::write(&path, "data").unwrap();
        assert!(!File::new(&path).converge().unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "data");
    }

    #[cfg(unix)]
    #[test]
    fn enforces_mode() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("script");
        fs::write(&path, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        let file = File::new(&path).mode(0o755);
        assert!(file.converge().unwrap());
        assert_eq!(fs::metadata(&path).unwrap().permissions().mode() & 0o7777, 0o755);
        assert!(!file.converge().unwrap());
    }

    #[test]
    fn evaluator_error_aborts_before_touching_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("never");
        let file = File::new(&path).content_with(|| Err("template failed".into()));
        let err = file.converge().unwrap_err();
        assert!(matches!(err, Error::Evaluation { field: "content", .. }));
        assert!(!path.exists());
    }

    #[test]
    fn deferred_path_is_resolved_at_convergence() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().to_path_buf();
        let file = File::new("unused").path_with(move || Ok(dir.join("late.txt")));
        assert!(file.converge().unwrap());
        assert!(tmp.path().join("late.txt").exists());
    }
}
