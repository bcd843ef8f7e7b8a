//! Module: applies every resource of a graph exactly once per run.
//!
//! Traversal is depth-first from each name in turn. `requires` edges are
//! applied before the resource itself, convergence is memoized in a per-run
//! done set, and a reported change cascades along `refreshes`.
//!
//! A frame stack tracks which names are still applying their requirements.
//! Re-entering such a name through an unbroken chain of `requires` edges is a
//! cycle. Re-entry through a cascade or notify edge is allowed: it either hits
//! the done set or makes progress, so it terminates.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::graph::Graph;
use crate::options::{CascadeMode, EngineOptions, NotifyMode, ValidationMode};
use crate::report::RunReport;
use crate::resource::{EdgeKind, Resource};

/// One convergence run over a fixed graph.
pub struct Module {
    graph: Graph,
    options: EngineOptions,
}

impl Module {
    pub fn new(graph: Graph) -> Self {
        Self::with_options(graph, EngineOptions::default())
    }

    pub fn with_options(graph: Graph, options: EngineOptions) -> Self {
        Self { graph, options }
    }

    /// Build from a plain map.
    pub fn from_map(resources: HashMap<String, Box<dyn Resource>>) -> Self {
        Self::new(Graph::from(resources))
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn options(&self) -> EngineOptions {
        self.options
    }

    /// Check every edge and reject `requires` cycles without converging
    /// anything.
    pub fn validate(&self) -> Result<()> {
        self.graph.validate()
    }

    /// Converge every resource. The first error aborts the run; resources not
    /// reached by then are left alone.
    pub fn run(self) -> Result<RunReport> {
        if self.options.validation == ValidationMode::Eager {
            self.graph.validate()?;
        }

        info!(resources = self.graph.len(), "starting run");
        let mut run = RunContext::new(&self.graph, self.options);
        for name in self.graph.names() {
            run.apply(name, Via::Root)?;
        }

        let report = run.report;
        info!(
            converged = report.converged().len(),
            changed = report.changed().len(),
            refreshed = report.refreshed().len(),
            "run complete"
        );
        Ok(report)
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("graph", &self.graph)
            .field("options", &self.options)
            .finish()
    }
}

/// How a frame was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Via {
    Root,
    Edge(EdgeKind),
}

#[derive(Debug)]
struct Frame {
    name: String,
    via: Via,
    requiring: bool,
}

/// Per-run state. Discarded when the run ends.
struct RunContext<'g> {
    graph: &'g Graph,
    options: EngineOptions,
    done: HashSet<String>,
    stack: Vec<Frame>,
    report: RunReport,
}

impl<'g> RunContext<'g> {
    fn new(graph: &'g Graph, options: EngineOptions) -> Self {
        Self {
            graph,
            options,
            done: HashSet::new(),
            stack: Vec::new(),
            report: RunReport::default(),
        }
    }

    fn lookup(&self, name: &str, via: Via) -> Result<&'g dyn Resource> {
        self.graph.get(name).ok_or_else(|| {
            let parent = self.stack.last().map(|f| f.name.as_str()).unwrap_or("<run>");
            let edge = match via {
                Via::Edge(kind) => kind,
                Via::Root => EdgeKind::Required,
            };
            Error::missing(name, parent, edge)
        })
    }

    /// Fail if entering `name` through a `requires` edge closes a loop of
    /// `requires` edges.
    fn check_cycle(&self, name: &str) -> Result<()> {
        for (i, frame) in self.stack.iter().enumerate().rev() {
            if frame.requiring && frame.name == name {
                let mut path: Vec<String> =
                    self.stack[i..].iter().map(|f| f.name.clone()).collect();
                path.push(name.to_string());
                return Err(Error::Cycle { path });
            }
            if frame.via != Via::Edge(EdgeKind::Required) {
                break;
            }
        }
        Ok(())
    }

    fn apply(&mut self, name: &str, via: Via) -> Result<bool> {
        if via == Via::Edge(EdgeKind::Required) {
            self.check_cycle(name)?;
        }

        let resource = self.lookup(name, via)?;
        if self.options.validation == ValidationMode::Lazy {
            self.graph.validate_edges(name, resource)?;
        }

        self.stack.push(Frame {
            name: name.to_string(),
            via,
            requiring: true,
        });
        let result = self.apply_frame(name, resource);
        self.stack.pop();
        result
    }

    fn apply_frame(&mut self, name: &str, resource: &'g dyn Resource) -> Result<bool> {
        for required in resource.requires() {
            self.apply(required, Via::Edge(EdgeKind::Required))?;
        }

        if let Some(frame) = self.stack.last_mut() {
            frame.requiring = false;
        }

        if self.done.contains(name) {
            debug!(resource = name, "already converged");
            return Ok(false);
        }

        info!(resource = name, kind = resource.kind(), "applying resource");
        let changed = resource.converge().map_err(|e| e.in_resource(name))?;
        self.done.insert(name.to_string());
        self.report.converged_one(name, resource.kind(), changed);

        if changed {
            info!(resource = name, "resource changed");
            self.cascade(name, resource.refreshes())?;
        } else {
            debug!(resource = name, "resource unchanged");
        }

        if self.options.notify == NotifyMode::Apply {
            for notified in resource.notifies() {
                debug!(resource = name, notified = notified.as_str(), "notifying");
                self.apply(notified, Via::Edge(EdgeKind::Notified))?;
            }
        }

        Ok(changed)
    }

    fn cascade(&mut self, source: &str, targets: &[String]) -> Result<()> {
        match self.options.cascade {
            CascadeMode::Converge => {
                for target in targets {
                    self.apply(target, Via::Edge(EdgeKind::Refreshed))?;
                }
            }
            CascadeMode::Refresh => {
                let mut seen = HashSet::from([source.to_string()]);
                for target in targets {
                    self.refresh_chain(target, &mut seen)?;
                }
            }
        }
        Ok(())
    }

    /// Refresh `name`, then follow its own `refreshes`. A name not yet
    /// converged is applied first; if that convergence reported a change the
    /// refresh is skipped. Each name is refreshed at most once per chain.
    fn refresh_chain(&mut self, name: &str, seen: &mut HashSet<String>) -> Result<()> {
        if !seen.insert(name.to_string()) {
            return Ok(());
        }

        if !self.done.contains(name) && self.apply(name, Via::Edge(EdgeKind::Refreshed))? {
            return Ok(());
        }

        let resource = self.lookup(name, Via::Edge(EdgeKind::Refreshed))?;
        info!(resource = name, "refreshing resource");
        resource.refresh().map_err(|e| e.in_resource(name))?;
        self.report.refreshed_one(name);

        for next in resource.refreshes() {
            self.refresh_chain(next, seen)?;
        }
        Ok(())
    }
}
