//! Graph: the name → resource mapping a module runs over.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::{Error, Result};
use crate::resource::{EdgeKind, Resource};

/// Named resources for one run. Names are unique; iteration is ordered by
/// name.
#[derive(Default)]
pub struct Graph {
    resources: BTreeMap<String, Box<dyn Resource>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource. Fails if the name is already taken.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        resource: impl Resource + 'static,
    ) -> Result<()> {
        self.insert_boxed(name, Box::new(resource))
    }

    pub fn insert_boxed(
        &mut self,
        name: impl Into<String>,
        resource: Box<dyn Resource>,
    ) -> Result<()> {
        let name = name.into();
        if self.resources.contains_key(&name) {
            return Err(Error::DuplicateResource(name));
        }
        self.resources.insert(name, resource);
        Ok(())
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(
        mut self,
        name: impl Into<String>,
        resource: impl Resource + 'static,
    ) -> Result<Self> {
        self.insert(name, resource)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&dyn Resource> {
        self.resources.get(name).map(|r| r.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resources.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &dyn Resource)> {
        self.resources.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Check that every edge of `name` points at a resource in the graph.
    /// Reports the first dangling edge, checking requires, then notifies, then
    /// refreshes.
    pub fn validate_edges(&self, name: &str, resource: &dyn Resource) -> Result<()> {
        for kind in [EdgeKind::Required, EdgeKind::Notified, EdgeKind::Refreshed] {
            if let Some(missing) = resource.edges(kind).iter().find(|n| !self.contains(n)) {
                return Err(Error::missing(missing.as_str(), name, kind));
            }
        }
        Ok(())
    }

    /// Validate every resource's edges and reject cycles in `requires`.
    pub fn validate(&self) -> Result<()> {
        for (name, resource) in self.iter() {
            self.validate_edges(name, resource)?;
        }
        if let Some(path) = self.find_requires_cycle() {
            return Err(Error::Cycle { path });
        }
        Ok(())
    }

    /// Depth-first search over `requires` edges. Returns the cycle as a path
    /// that starts and ends with the same name.
    pub fn find_requires_cycle(&self) -> Option<Vec<String>> {
        let mut visited = HashSet::new();
        let mut on_stack = HashSet::new();
        let mut path = Vec::new();

        for name in self.names() {
            if !visited.contains(name)
                && self.cycle_from(name, &mut visited, &mut on_stack, &mut path)
            {
                return Some(path.into_iter().map(str::to_string).collect());
            }
        }
        None
    }

    fn cycle_from<'a>(
        &'a self,
        name: &'a str,
        visited: &mut HashSet<&'a str>,
        on_stack: &mut HashSet<&'a str>,
        path: &mut Vec<&'a str>,
    ) -> bool {
        visited.insert(name);
        on_stack.insert(name);
        path.push(name);

        if let Some(resource) = self.get(name) {
            for next in resource.requires() {
                let next = next.as_str();
                if on_stack.contains(next) {
                    if let Some(start) = path.iter().position(|n| *n == next) {
                        path.drain(..start);
                    }
                    path.push(next);
                    return true;
                }
                if !visited.contains(next) && self.cycle_from(next, visited, on_stack, path) {
                    return true;
                }
            }
        }

        on_stack.remove(name);
        path.pop();
        false
    }
}

/// Map keys are unique, so conversion cannot hit a duplicate.
impl From<HashMap<String, Box<dyn Resource>>> for Graph {
    fn from(resources: HashMap<String, Box<dyn Resource>>) -> Self {
        Self {
            resources: resources.into_iter().collect(),
        }
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.resources.iter().map(|(k, v)| (k, v.kind())))
            .finish()
    }
}
