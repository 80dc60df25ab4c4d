//! Plan execution against providers.
//!
//! A plan is walked strictly sequentially: each operation completes,
//! including provider I/O, before the next begins, so later operations can
//! read the committed outputs of earlier ones. Individual operation
//! failures are recorded and execution continues to produce a complete
//! report, but a missing provider or a state-store failure terminates the
//! run immediately. State is persisted only when every operation
//! succeeded.

use std::collections::HashSet;

use chrono::Utc;
use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::planner::{OpKind, Operation, Plan};
use crate::provider::Provider;
use crate::resource::ResourceRef;
use crate::stack::Stack;
use crate::state::{DependencyStates, StackState, StateMetadata, StateRef};

/// Outcome of a single operation.
#[derive(Debug)]
pub struct OperationResult {
    /// The operation that was attempted
    pub operation: Operation,
    /// Whether the provider call succeeded
    pub success: bool,
    /// State returned by the provider on success (absent for deletes)
    pub new_state: Option<StateRef>,
    /// Error message on failure
    pub error: Option<String>,
}

/// Complete record of an execution run.
#[derive(Debug, Default)]
pub struct ExecutionReport {
    /// Per-operation outcomes, in plan order
    pub results: Vec<OperationResult>,
    /// Ids observed by the read-only prepass
    pub read_only: Vec<String>,
    /// Whether the resulting state was persisted
    pub committed: bool,
}

impl ExecutionReport {
    /// Whether every operation succeeded.
    pub fn success(&self) -> bool {
        self.results.iter().all(|r| r.success)
    }

    /// Number of successful operations.
    pub fn successful(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    /// Number of failed operations.
    pub fn failed(&self) -> usize {
        self.results.len() - self.successful()
    }

    /// Total number of operations attempted.
    pub fn total(&self) -> usize {
        self.results.len()
    }
}

/// Execute a plan against the stack's providers.
///
/// Holds the state lock for the duration of the run. On full success the
/// working state (including read-only prepass results and excluding
/// deleted ids) is persisted; on any failure nothing is written and the
/// in-memory state is discarded.
pub fn execute(stack: &Stack, plan: &Plan) -> Result<ExecutionReport> {
    let _lock = stack.store().lock()?;

    let actual = stack.store().load(stack.registry())?;
    let mut working: IndexMap<String, StateRef> = actual.resources;
    let mut initialized: HashSet<usize> = HashSet::new();
    let mut report = ExecutionReport::default();

    // Read-only prepass: observe external objects the engine never
    // mutates, so their outputs are available to dependents.
    for resource in stack.resources() {
        if !resource.read_only() || working.contains_key(resource.id()) {
            continue;
        }
        let provider = claim(stack, resource, &mut initialized)?;
        match provider.read(resource) {
            Ok(state) => {
                report.read_only.push(resource.id().to_string());
                working.insert(resource.id().to_string(), state);
            }
            Err(Error::ResourceNotFound { .. }) => {
                return Err(Error::ReadOnlyMissing {
                    id: resource.id().to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }

    for operation in &plan.operations {
        let resource = match materialize(operation.resource(), &working) {
            Ok(resource) => resource,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                report.results.push(failure(operation, e));
                continue;
            }
        };

        // A missing provider terminates the run; it is never recorded as
        // a per-operation failure.
        let provider = claim(stack, &resource, &mut initialized)?;

        let outcome = dispatch(provider, operation.kind(), &resource, &working);
        match outcome {
            Ok(new_state) => {
                match operation.kind() {
                    OpKind::Create | OpKind::Update => {
                        if let Some(state) = &new_state {
                            working.insert(resource.id().to_string(), state.clone());
                        }
                    }
                    OpKind::Delete => {
                        working.shift_remove(resource.id());
                    }
                }
                report.results.push(OperationResult {
                    operation: operation.clone(),
                    success: true,
                    new_state,
                    error: None,
                });
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => report.results.push(failure(operation, e)),
        }
    }

    if report.success() {
        let state = StackState {
            version: crate::state::STATE_FORMAT_VERSION.to_string(),
            stack: stack.name().to_string(),
            resources: working,
            metadata: StateMetadata {
                updated_at: Some(Utc::now()),
            },
        };
        stack.store().save(&state, stack.registry())?;
        report.committed = true;
        log::debug!(
            "persisted {} resource states for stack '{}'",
            state.resources.len(),
            stack.name()
        );
    } else {
        log::debug!(
            "{} of {} operations failed, state not persisted",
            report.failed(),
            report.total()
        );
    }

    Ok(report)
}

/// Re-read every desired resource from its provider and persist the
/// observed states, without mutating any external system.
///
/// Providers initialize once up front and dispose on completion even when
/// reads fail. A resource the provider cannot find is dropped from the
/// refreshed state.
pub fn refresh(stack: &Stack) -> Result<Vec<String>> {
    let result = refresh_inner(stack);
    for provider in stack.providers() {
        if let Err(e) = provider.dispose() {
            log::warn!("provider '{}' failed to dispose: {e}", provider.name());
        }
    }
    result
}

fn refresh_inner(stack: &Stack) -> Result<Vec<String>> {
    for provider in stack.providers() {
        provider.initialize()?;
    }

    let _lock = stack.store().lock()?;

    let mut graph = crate::graph::DependencyGraph::new();
    for resource in stack.resources() {
        graph.add_resource(resource);
    }
    graph.validate()?;

    let by_id: IndexMap<&str, &ResourceRef> = stack
        .resources()
        .iter()
        .map(|r| (r.id(), r))
        .collect();

    let mut fresh: IndexMap<String, StateRef> = IndexMap::new();
    let mut refreshed = Vec::new();

    for id in graph.topological_order()? {
        let Some(resource) = by_id.get(id.as_str()) else {
            continue;
        };

        let resource = match resource {
            ResourceRef::Dependent(dependent) => {
                let states = DependencyStates::new(&fresh);
                match dependent.build(&states) {
                    Ok(built) => ResourceRef::from_arc(built),
                    Err(e) => {
                        log::warn!("builder for '{}' failed during refresh, skipping: {e}", id);
                        continue;
                    }
                }
            }
            ResourceRef::Concrete(_) => (*resource).clone(),
        };

        let provider = find_claiming(stack, &resource)?;
        match provider.read(&resource) {
            Ok(state) => {
                refreshed.push(id.clone());
                fresh.insert(id, state);
            }
            Err(Error::ResourceNotFound { .. }) => {
                log::info!("resource '{id}' no longer exists externally, dropped from state");
            }
            Err(e) => return Err(e),
        }
    }

    let state = StackState {
        version: crate::state::STATE_FORMAT_VERSION.to_string(),
        stack: stack.name().to_string(),
        resources: fresh,
        metadata: StateMetadata {
            updated_at: Some(Utc::now()),
        },
    };
    stack.store().save(&state, stack.registry())?;

    Ok(refreshed)
}

/// Substitute a late-bound wrapper with the resource its builder produces
/// from the working map.
fn materialize(
    resource: &ResourceRef,
    working: &IndexMap<String, StateRef>,
) -> Result<ResourceRef> {
    let ResourceRef::Dependent(dependent) = resource else {
        return Ok(resource.clone());
    };

    for dep in dependent.dependencies() {
        if !working.contains_key(dep.id()) {
            return Err(Error::Internal(format!(
                "state of dependency '{}' missing while building '{}'",
                dep.id(),
                dependent.id()
            )));
        }
    }

    let states = DependencyStates::new(working);
    Ok(ResourceRef::from_arc(dependent.build(&states)?))
}

fn dispatch(
    provider: &dyn Provider,
    kind: OpKind,
    resource: &ResourceRef,
    working: &IndexMap<String, StateRef>,
) -> Result<Option<StateRef>> {
    match kind {
        OpKind::Create => Ok(Some(provider.create(resource)?)),
        OpKind::Update => {
            let current = working.get(resource.id()).ok_or_else(|| {
                Error::Internal(format!(
                    "no current state for '{}' while updating",
                    resource.id()
                ))
            })?;
            Ok(Some(provider.update(current, resource)?))
        }
        OpKind::Delete => {
            let current = working.get(resource.id()).ok_or_else(|| {
                Error::Internal(format!(
                    "no current state for '{}' while deleting",
                    resource.id()
                ))
            })?;
            provider.delete(current)?;
            Ok(None)
        }
    }
}

/// Locate the handling provider and lazily initialize it on first use.
fn claim<'a>(
    stack: &'a Stack,
    resource: &ResourceRef,
    initialized: &mut HashSet<usize>,
) -> Result<&'a dyn Provider> {
    let index = stack
        .providers()
        .iter()
        .position(|p| p.can_handle(resource))
        .ok_or_else(|| Error::ProviderNotFound {
            id: resource.id().to_string(),
            type_tag: resource.type_tag().to_string(),
        })?;
    let provider = stack.providers()[index].as_ref();
    if initialized.insert(index) {
        provider.initialize()?;
    }
    Ok(provider)
}

fn find_claiming<'a>(stack: &'a Stack, resource: &ResourceRef) -> Result<&'a dyn Provider> {
    crate::provider::find_provider(stack.providers(), resource).ok_or_else(|| {
        Error::ProviderNotFound {
            id: resource.id().to_string(),
            type_tag: resource.type_tag().to_string(),
        }
    })
}

fn failure(operation: &Operation, error: Error) -> OperationResult {
    OperationResult {
        operation: operation.clone(),
        success: false,
        new_state: None,
        error: Some(error.to_string()),
    }
}
