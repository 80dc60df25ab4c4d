//! Plan construction: diff desired against actual state and order the
//! resulting operations.
//!
//! Creates and updates run dependencies-first in topological order;
//! deletes run dependents-first in reverse topological order of the actual
//! state's own graph. The three batches are emitted as creates, then
//! updates, then deletes so a replacement sequence (create new, repoint,
//! delete old) never dangles.

use indexmap::IndexMap;
use serde_json::Value;

use crate::codec::{JsonMap, TypeRegistry};
use crate::diff::{FieldDiff, field_diffs};
use crate::error::{Error, Result};
use crate::graph::DependencyGraph;
use crate::resource::ResourceRef;
use crate::state::{DependencyStates, StackState};

/// Kind of a planned operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    /// Realize a resource that has no recorded state
    Create,
    /// Converge a resource whose attributes differ from its state
    Update,
    /// Remove a resource present in state but no longer desired
    Delete,
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpKind::Create => write!(f, "create"),
            OpKind::Update => write!(f, "update"),
            OpKind::Delete => write!(f, "delete"),
        }
    }
}

/// A single planned operation.
#[derive(Debug, Clone)]
pub enum Operation {
    /// Realize the resource through its provider
    Create {
        /// Resource to create; may still be a late-bound wrapper
        resource: ResourceRef,
    },
    /// Converge the external object to the desired resource
    Update {
        /// Desired form of the resource
        resource: ResourceRef,
        /// Attribute-level differences that triggered the update
        diffs: Vec<FieldDiff>,
    },
    /// Remove the external object
    Delete {
        /// The resource as recorded in the actual state
        resource: ResourceRef,
    },
}

impl Operation {
    /// Kind tag of this operation.
    pub fn kind(&self) -> OpKind {
        match self {
            Operation::Create { .. } => OpKind::Create,
            Operation::Update { .. } => OpKind::Update,
            Operation::Delete { .. } => OpKind::Delete,
        }
    }

    /// The resource the operation acts on.
    pub fn resource(&self) -> &ResourceRef {
        match self {
            Operation::Create { resource }
            | Operation::Update { resource, .. }
            | Operation::Delete { resource } => resource,
        }
    }

    /// Id of the resource the operation acts on.
    pub fn resource_id(&self) -> &str {
        self.resource().id()
    }
}

/// Extra information recorded in verbose mode.
#[derive(Debug, Clone, Default)]
pub struct PlanDiagnostics {
    /// Ids of desired resources requiring no operation
    pub unchanged: Vec<String>,
}

/// An ordered list of operations produced by diffing desired against
/// actual state.
#[derive(Debug, Default)]
pub struct Plan {
    /// Operations in execution order
    pub operations: Vec<Operation>,
    /// Verbose-only diagnostics
    pub diagnostics: Option<PlanDiagnostics>,
}

impl Plan {
    /// Whether the plan contains no operations.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Number of operations in the plan.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Render the plan as JSON for machine consumption.
    pub fn to_json(&self, registry: &TypeRegistry) -> Result<Value> {
        let mut operations = Vec::with_capacity(self.operations.len());
        for op in &self.operations {
            let mut entry = JsonMap::new();
            entry.insert("op".into(), Value::String(op.kind().to_string()));
            entry.insert("resource".into(), registry.encode_resource(op.resource())?);
            if let Operation::Update { diffs, .. } = op
                && !diffs.is_empty()
            {
                entry.insert(
                    "diff".into(),
                    serde_json::to_value(diffs).map_err(|e| {
                        Error::Internal(format!("failed to encode field diffs: {e}"))
                    })?,
                );
            }
            operations.push(Value::Object(entry));
        }

        let mut root = JsonMap::new();
        root.insert("operations".into(), Value::Array(operations));
        Ok(Value::Object(root))
    }
}

/// Diff the desired resources against the actual state.
///
/// Missing dependencies abort with a validation error before any operation
/// is emitted. Late-bound resources whose dependencies are all present in
/// the actual state are materialized here; the rest stay wrapped for the
/// executor to build.
pub fn plan(
    desired: &[ResourceRef],
    actual: &StackState,
    registry: &TypeRegistry,
    verbose: bool,
) -> Result<Plan> {
    let mut graph = DependencyGraph::new();
    for resource in desired {
        graph.add_resource(resource);
    }
    graph.validate()?;

    let order = graph.topological_order()?;
    let position: IndexMap<&str, usize> = order
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();

    let mut creates: Vec<(usize, Operation)> = Vec::new();
    let mut updates: Vec<(usize, Operation)> = Vec::new();
    let mut diagnostics = PlanDiagnostics::default();

    for resource in desired {
        let pos = position.get(resource.id()).copied().unwrap_or(usize::MAX);

        match actual.get(resource.id()) {
            None => {
                if resource.read_only() {
                    // Observed during execution's read-only prepass.
                    continue;
                }
                let resource = materialize_if_ready(resource, actual);
                creates.push((pos, Operation::Create { resource }));
            }
            Some(current) => {
                if resource.read_only() {
                    if verbose {
                        diagnostics.unchanged.push(resource.id().to_string());
                    }
                    continue;
                }

                let desired_resource = match resource {
                    ResourceRef::Dependent(_) => {
                        let ready = resource
                            .dependencies()
                            .iter()
                            .all(|dep| actual.contains(dep.id()));
                        if !ready {
                            // Rechecked once the dependencies exist.
                            continue;
                        }
                        match try_build(resource, actual) {
                            Some(built) => built,
                            None => continue,
                        }
                    }
                    ResourceRef::Concrete(_) => resource.clone(),
                };

                let desired_json = encoded_fields(registry, &desired_resource)?;
                let current_json = encoded_fields(registry, current.resource())?;
                let diffs = field_diffs(&current_json, &desired_json);
                if diffs.is_empty() {
                    if verbose {
                        diagnostics.unchanged.push(resource.id().to_string());
                    }
                } else {
                    updates.push((
                        pos,
                        Operation::Update {
                            resource: desired_resource,
                            diffs,
                        },
                    ));
                }
            }
        }
    }

    creates.sort_by_key(|(pos, _)| *pos);
    updates.sort_by_key(|(pos, _)| *pos);

    // Deletes order by the actual state's own graph: dependents first.
    let mut actual_graph = DependencyGraph::new();
    for state in actual.resources.values() {
        actual_graph.add_resource(state.resource());
    }
    let delete_order = actual_graph.reverse_topological_order()?;

    let mut deletes: Vec<Operation> = Vec::new();
    for id in &delete_order {
        if desired.iter().any(|r| r.id() == id) {
            continue;
        }
        if let Some(state) = actual.get(id) {
            if state.resource().read_only() {
                continue;
            }
            deletes.push(Operation::Delete {
                resource: state.resource().clone(),
            });
        }
    }

    let mut operations: Vec<Operation> = Vec::with_capacity(creates.len() + updates.len() + deletes.len());
    operations.extend(creates.into_iter().map(|(_, op)| op));
    operations.extend(updates.into_iter().map(|(_, op)| op));
    operations.extend(deletes);

    Ok(Plan {
        operations,
        diagnostics: verbose.then_some(diagnostics),
    })
}

/// Materialize a late-bound resource when every dependency already has a
/// recorded state; otherwise keep the wrapper for the executor.
fn materialize_if_ready(resource: &ResourceRef, actual: &StackState) -> ResourceRef {
    let ResourceRef::Dependent(_) = resource else {
        return resource.clone();
    };
    let ready = resource
        .dependencies()
        .iter()
        .all(|dep| actual.contains(dep.id()));
    if !ready {
        return resource.clone();
    }
    try_build(resource, actual).unwrap_or_else(|| resource.clone())
}

/// Run a wrapper's builder against the actual state. Builder failure is
/// not fatal at plan time; binding is deferred to execution.
fn try_build(resource: &ResourceRef, actual: &StackState) -> Option<ResourceRef> {
    let dependent = resource.as_dependent()?;
    let states = DependencyStates::new(&actual.resources);
    match dependent.build(&states) {
        Ok(built) => Some(ResourceRef::from_arc(built)),
        Err(e) => {
            log::debug!(
                "builder for '{}' failed at plan time, deferring to execution: {e}",
                dependent.id()
            );
            None
        }
    }
}

fn encoded_fields(registry: &TypeRegistry, resource: &ResourceRef) -> Result<JsonMap> {
    match registry.encode_resource(resource)? {
        Value::Object(map) => Ok(map),
        _ => Err(Error::Internal(format!(
            "encoded resource '{}' is not an object",
            resource.id()
        ))),
    }
}
