//! Dependency graph over resource ids.
//!
//! The graph records forward edges (id to its dependencies) and the
//! symmetric reverse edges as resources are added. Ordering is Kahn's
//! algorithm over the added subgraph only, with ties broken by insertion
//! order so plans are deterministic.

use indexmap::{IndexMap, IndexSet};

use crate::error::{Error, MissingDependency, Result};
use crate::resource::ResourceRef;

/// Forward and reverse adjacency over resource ids.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// id -> dependency ids, keyed by added ids in insertion order
    forward: IndexMap<String, IndexSet<String>>,
    /// id -> dependent ids
    reverse: IndexMap<String, IndexSet<String>>,
}

impl DependencyGraph {
    /// Empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a node and its dependency edges.
    pub fn add<I, S>(&mut self, id: &str, dependencies: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = self.forward.entry(id.to_string()).or_default();
        let mut deps: Vec<String> = Vec::new();
        for dep in dependencies {
            let dep = dep.into();
            entry.insert(dep.clone());
            deps.push(dep);
        }
        for dep in deps {
            self.reverse.entry(dep).or_default().insert(id.to_string());
        }
    }

    /// Record a resource and its dependency edges.
    pub fn add_resource(&mut self, resource: &ResourceRef) {
        self.add(resource.id(), resource.dependency_ids());
    }

    /// Whether an id has been added as a node.
    pub fn contains(&self, id: &str) -> bool {
        self.forward.contains_key(id)
    }

    /// Added ids in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.forward.keys().map(String::as_str)
    }

    /// Check that every dependency named by an added id was itself added.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        for (id, deps) in &self.forward {
            let absent: Vec<String> = deps
                .iter()
                .filter(|dep| !self.forward.contains_key(*dep))
                .cloned()
                .collect();
            if !absent.is_empty() {
                missing.push(MissingDependency {
                    resource_id: id.clone(),
                    missing: absent,
                });
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::MissingDependencies(missing))
        }
    }

    /// Ids ordered dependencies-first.
    ///
    /// Edges to ids that were never added are excluded; once [`validate`]
    /// (DependencyGraph::validate) has passed that set is empty.
    pub fn topological_order(&self) -> Result<Vec<String>> {
        let mut indegree: IndexMap<&str, usize> = self
            .forward
            .iter()
            .map(|(id, deps)| {
                let known = deps.iter().filter(|d| self.forward.contains_key(*d)).count();
                (id.as_str(), known)
            })
            .collect();

        let mut order = Vec::with_capacity(indegree.len());
        while order.len() < indegree.len() {
            // First ready node in insertion order keeps ties deterministic.
            let next = indegree
                .iter()
                .find(|(id, degree)| **degree == 0 && !order.contains(&id.to_string()))
                .map(|(id, _)| id.to_string());

            let Some(id) = next else {
                let remaining: Vec<String> = indegree
                    .iter()
                    .filter(|(id, _)| !order.contains(&id.to_string()))
                    .map(|(id, _)| id.to_string())
                    .collect();
                return Err(Error::DependencyCycle(remaining));
            };

            if let Some(dependents) = self.reverse.get(&id) {
                for dependent in dependents {
                    if let Some(degree) = indegree.get_mut(dependent.as_str()) {
                        *degree -= 1;
                    }
                }
            }
            // Park the emitted node so it is never picked again.
            if let Some(degree) = indegree.get_mut(id.as_str()) {
                *degree = usize::MAX;
            }
            order.push(id);
        }
        Ok(order)
    }

    /// Ids ordered dependents-first; used for deletions.
    pub fn reverse_topological_order(&self) -> Result<Vec<String>> {
        let mut order = self.topological_order()?;
        order.reverse();
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        graph.add("db", Vec::<String>::new());
        graph.add("web1", ["db"]);
        graph.add("web2", ["db"]);
        graph.add("lb", ["web1", "web2"]);
        graph
    }

    #[test]
    fn test_validate_ok() {
        assert!(diamond().validate().is_ok());
    }

    #[test]
    fn test_validate_reports_missing() {
        let mut graph = DependencyGraph::new();
        graph.add("r", ["missing"]);
        let err = graph.validate().unwrap_err();
        match err {
            Error::MissingDependencies(list) => {
                assert_eq!(list.len(), 1);
                assert_eq!(list[0].resource_id, "r");
                assert_eq!(list[0].missing, vec!["missing".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_topological_order_dependencies_first() {
        let order = diamond().topological_order().unwrap();
        let pos = |id: &str| order.iter().position(|x| x == id).unwrap();
        assert!(pos("db") < pos("web1"));
        assert!(pos("db") < pos("web2"));
        assert!(pos("web1") < pos("lb"));
        assert!(pos("web2") < pos("lb"));
    }

    #[test]
    fn test_topological_order_insertion_tie_break() {
        let order = diamond().topological_order().unwrap();
        assert_eq!(order, vec!["db", "web1", "web2", "lb"]);
    }

    #[test]
    fn test_reverse_topological_order() {
        let order = diamond().reverse_topological_order().unwrap();
        assert_eq!(order, vec!["lb", "web2", "web1", "db"]);
    }

    #[test]
    fn test_cycle_detected() {
        let mut graph = DependencyGraph::new();
        graph.add("a", ["b"]);
        graph.add("b", ["a"]);
        let err = graph.topological_order().unwrap_err();
        assert!(matches!(err, Error::DependencyCycle(_)));
    }

    #[test]
    fn test_unknown_edges_excluded() {
        // Edges to ids never added do not block ordering.
        let mut graph = DependencyGraph::new();
        graph.add("a", ["ghost"]);
        graph.add("b", ["a"]);
        let order = graph.topological_order().unwrap();
        assert_eq!(order, vec!["a", "b"]);
    }
}
