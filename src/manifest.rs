//! TOML manifest: declares resources by name and builds a graph from them.
//!
//! ```toml
//! [engine]
//! cascade = "refresh"
//!
//! [resources.app-conf]
//! kind = "file"
//! path = "/etc/app/app.conf"
//! source = "files/app.conf"
//! mode = 0o644
//! refreshes = ["app"]
//!
//! [resources.app]
//! kind = "service"
//! path = "/usr/local/bin/app"
//! args = ["--config", "/etc/app/app.conf"]
//! requires = ["app-conf"]
//! ```
//!
//! A relative `source` is read from the manifest's directory.

use anyhow::{bail, Context, Result};
use convergent_core::{
    CascadeMode, EngineOptions, Graph, NotifyMode, Relation, Resource, ValidationMode,
};
use convergent_resources::{Exec, File, Service, ServiceManager, WaitPolicy};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Manifest {
    /// Per-manifest engine modes; unset fields keep the settings' values.
    pub engine: EngineOverride,
    pub resources: BTreeMap<String, ResourceSpec>,
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineOverride {
    pub validation: Option<ValidationMode>,
    pub cascade: Option<CascadeMode>,
    pub notify: Option<NotifyMode>,
}

impl EngineOverride {
    pub fn apply(&self, base: EngineOptions) -> EngineOptions {
        EngineOptions {
            validation: self.validation.unwrap_or(base.validation),
            cascade: self.cascade.unwrap_or(base.cascade),
            notify: self.notify.unwrap_or(base.notify),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ResourceSpec {
    File(FileSpec),
    Exec(ExecSpec),
    Service(ServiceSpec),
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileSpec {
    pub path: PathBuf,
    #[serde(default)]
    pub absent: bool,
    /// Literal content.
    pub content: Option<String>,
    /// Read the content from this file each time the resource converges.
    pub source: Option<PathBuf>,
    pub mode: Option<u32>,
    #[serde(flatten)]
    pub relation: Relation,
    /// Anything not claimed above; rejected when the graph is built.
    #[serde(flatten)]
    pub unknown: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecSpec {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    #[serde(flatten)]
    pub relation: Relation,
    /// Anything not claimed above; rejected when the graph is built.
    #[serde(flatten)]
    pub unknown: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceSpec {
    /// Service name; defaults to the resource name.
    pub name: Option<String>,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_started")]
    pub started: bool,
    #[serde(default)]
    pub absent: bool,
    #[serde(flatten)]
    pub relation: Relation,
    /// Anything not claimed above; rejected when the graph is built.
    #[serde(flatten)]
    pub unknown: BTreeMap<String, toml::Value>,
}

fn default_started() -> bool {
    true
}

impl ResourceSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::File(_) => "file",
            Self::Exec(_) => "exec",
            Self::Service(_) => "service",
        }
    }

    fn unknown_keys(&self) -> &BTreeMap<String, toml::Value> {
        match self {
            Self::File(s) => &s.unknown,
            Self::Exec(s) => &s.unknown,
            Self::Service(s) => &s.unknown,
        }
    }

    pub fn relation(&self) -> &Relation {
        match self {
            Self::File(s) => &s.relation,
            Self::Exec(s) => &s.relation,
            Self::Service(s) => &s.relation,
        }
    }
}

impl Manifest {
    pub fn parse(text: &str) -> Result<Self> {
        let manifest: Self = toml::from_str(text).context("invalid manifest")?;
        Ok(manifest)
    }

    /// Read and parse a manifest file. Relative `source` paths resolve
    /// against its directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest {}", path.display()))?;
        let mut manifest =
            Self::parse(&text).with_context(|| format!("in {}", path.display()))?;
        manifest.base_dir = path.parent().map(Path::to_path_buf);
        Ok(manifest)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Build the graph. Services are managed by `manager` and wait per `wait`.
    pub fn into_graph(self, manager: Arc<dyn ServiceManager>, wait: WaitPolicy) -> Result<Graph> {
        let mut graph = Graph::new();
        for (name, spec) in self.resources {
            let resource = build(&name, spec, self.base_dir.as_deref(), &manager, wait)
                .with_context(|| format!("resource '{}'", name))?;
            graph.insert_boxed(name, resource)?;
        }
        Ok(graph)
    }
}

fn build(
    name: &str,
    spec: ResourceSpec,
    base_dir: Option<&Path>,
    manager: &Arc<dyn ServiceManager>,
    wait: WaitPolicy,
) -> Result<Box<dyn Resource>> {
    let unknown = spec.unknown_keys();
    if !unknown.is_empty() {
        let keys: Vec<&str> = unknown.keys().map(String::as_str).collect();
        bail!("unknown {} field(s): {}", spec.kind(), keys.join(", "));
    }

    let resource: Box<dyn Resource> = match spec {
        ResourceSpec::File(s) => {
            let mut file = File::new(s.path).absent(s.absent).with_relation(s.relation);
            match (s.content, s.source) {
                (Some(_), Some(_)) => bail!("file sets both `content` and `source`"),
                (Some(content), None) => file = file.content(content),
                (None, Some(source)) => {
                    let source = match base_dir {
                        Some(dir) if source.is_relative() => dir.join(source),
                        _ => source,
                    };
                    file = file.content_with(move || Ok(std::fs::read(&source)?));
                }
                (None, None) => {}
            }
            if let Some(mode) = s.mode {
                file = file.mode(mode);
            }
            Box::new(file)
        }
        ResourceSpec::Exec(s) => {
            if s.command.trim().is_empty() {
                bail!("exec `command` is empty");
            }
            let mut exec = Exec::new(s.command).args(s.args).with_relation(s.relation);
            if let Some(cwd) = s.cwd {
                exec = exec.current_dir(cwd);
            }
            Box::new(exec)
        }
        ResourceSpec::Service(s) => {
            let service_name = s.name.unwrap_or_else(|| name.to_string());
            if !s.absent && s.path.is_empty() {
                bail!("service `path` is required unless `absent = true`");
            }
            Box::new(
                Service::new(service_name, Arc::clone(manager))
                    .path(s.path)
                    .args(s.args)
                    .description(s.description)
                    .started(s.started)
                    .absent(s.absent)
                    .wait(wait)
                    .with_relation(s.relation),
            )
        }
    };
    Ok(resource)
}

#[cfg(test)]
mod tests {
    use super::*;
    use convergent_resources::MemoryServiceManager;

    fn manager() -> Arc<dyn ServiceManager> {
        Arc::new(MemoryServiceManager::new())
    }

    #[test]
    fn parses_every_kind_with_edges() {
        let manifest = Manifest::parse(
            r#"
            [resources.conf]
            kind = "file"
            path = "/tmp/x.conf"
            content = "a=1"
            mode = 0o640
            refreshes = ["web"]

            [resources.migrate]
            kind = "exec"
            command = "true"
            requires = ["conf"]

            [resources.web]
            kind = "service"
            path = "/usr/bin/web"
            started = false
            requires = ["conf", "migrate"]
            notifies = ["migrate"]
            "#,
        )
        .unwrap();

        assert_eq!(manifest.len(), 3);
        let kinds: Vec<_> = manifest.resources.values().map(ResourceSpec::kind).collect();
        assert_eq!(kinds, vec!["file", "exec", "service"]);

        let web = &manifest.resources["web"];
        assert_eq!(web.relation().requires, vec!["conf", "migrate"]);
        assert_eq!(web.relation().notifies, vec!["migrate"]);
        match web {
            ResourceSpec::Service(s) => {
                assert!(!s.started);
                assert!(s.name.is_none());
            }
            other => panic!("unexpected spec: {other:?}"),
        }
        match &manifest.resources["conf"] {
            ResourceSpec::File(s) => assert_eq!(s.mode, Some(0o640)),
            other => panic!("unexpected spec: {other:?}"),
        }
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let err = Manifest::parse("[resources.x]\nkind = \"package\"\n").unwrap_err();
        assert!(format!("{err:#}").contains("package"));
    }

    #[test]
    fn engine_override_is_field_wise() {
        let manifest = Manifest::parse("[engine]\nnotify = \"apply\"\n").unwrap();
        let base = EngineOptions::default().cascade(CascadeMode::Refresh);
        let effective = manifest.engine.apply(base);
        assert_eq!(effective.notify, NotifyMode::Apply);
        assert_eq!(effective.cascade, CascadeMode::Refresh);
        assert_eq!(effective.validation, ValidationMode::Eager);
    }

    #[test]
    fn content_and_source_together_are_rejected() {
        let manifest = Manifest::parse(
            "[resources.f]\nkind = \"file\"\npath = \"/tmp/f\"\ncontent = \"a\"\nsource = \"b\"\n",
        )
        .unwrap();
        let err = manifest.into_graph(manager(), WaitPolicy::default()).unwrap_err();
        let text = format!("{err:#}");
        assert!(text.contains("resource 'f'"));
        assert!(text.contains("both"));
    }

    #[test]
    fn misspelled_edge_key_is_rejected() {
        let manifest = Manifest::parse(
            "[resources.app]\nkind = \"exec\"\ncommand = \"true\"\nrequire = [\"db\"]\n",
        )
        .unwrap();
        let err = manifest.into_graph(manager(), WaitPolicy::default()).unwrap_err();
        let text = format!("{err:#}");
        assert!(text.contains("resource 'app'"), "{text}");
        assert!(text.contains("unknown exec field(s): require"), "{text}");
    }

    #[test]
    fn known_keys_leave_nothing_unclaimed() {
        let manifest = Manifest::parse(
            "[resources.f]\nkind = \"file\"\npath = \"/tmp/f\"\nrequires = [\"g\"]\n",
        )
        .unwrap();
        match &manifest.resources["f"] {
            ResourceSpec::File(s) => {
                assert!(s.unknown.is_empty());
                assert_eq!(s.relation.requires, vec!["g"]);
            }
            other => panic!("unexpected spec: {other:?}"),
        }
    }

    #[test]
    fn service_is_started_unless_told_otherwise() {
        let manifest =
            Manifest::parse("[resources.s]\nkind = \"service\"\npath = \"/bin/s\"\n").unwrap();
        match &manifest.resources["s"] {
            ResourceSpec::Service(s) => assert!(s.started),
            other => panic!("unexpected spec: {other:?}"),
        }
    }

    #[test]
    fn service_without_path_is_rejected() {
        let manifest = Manifest::parse("[resources.s]\nkind = \"service\"\n").unwrap();
        assert!(manifest.into_graph(manager(), WaitPolicy::default()).is_err());

        let manifest =
            Manifest::parse("[resources.s]\nkind = \"service\"\nabsent = true\n").unwrap();
        let graph = manifest.into_graph(manager(), WaitPolicy::default()).unwrap();
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn relative_source_resolves_against_manifest_dir() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("payload.txt"), "from source").unwrap();
        let target = tmp.path().join("out/target.txt");
        let manifest_path = tmp.path().join("site.toml");
        std::fs::write(
            &manifest_path,
            format!(
                "[resources.target]\nkind = \"file\"\npath = {:?}\nsource = \"payload.txt\"\n",
                target.display().to_string()
            ),
        )
        .unwrap();

        let graph = Manifest::load(&manifest_path)
            .unwrap()
            .into_graph(manager(), WaitPolicy::default())
            .unwrap();
        let report = convergent_core::Module::new(graph).run().unwrap();
        assert!(report.was_changed("target"));
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "from source");
    }

    #[test]
    fn missing_manifest_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = Manifest::load(&tmp.path().join("absent.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read manifest"));
    }
}
