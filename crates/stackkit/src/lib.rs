//! # stackkit
//!
//! Core engine for declarative, provider-backed resource management.
//!
//! Given a desired set of resources (nodes in a dependency graph, each
//! backed by a provider capable of CRUD against some external system) and
//! a persisted actual state, the engine computes a minimal,
//! dependency-ordered plan of create/update/delete operations, executes it
//! through the providers, and atomically persists the new state. The
//! engine is domain-agnostic: it manages "resources" in the abstract,
//! whether cloud infrastructure, application configuration or external
//! registrations.
//!
//! ## Core Concepts
//!
//! - **Resource**: an immutable record describing a piece of external
//!   state, identified by a string id
//! - **ResourceState**: a provider's view of a realized resource, with
//!   read-only outputs such as server-assigned ids
//! - **DependentResource**: a late-bound resource materialized from its
//!   dependencies' states
//! - **Plan**: an ordered list of create/update/delete operations
//! - **Stack**: providers + desired resources + a state store binding
//!
//! ## Example
//!
//! ```ignore
//! use stackkit::{ResourceRef, Stack, StateStore};
//!
//! let mut stack = Stack::new("prod", StateStore::new(".drft/state.json"));
//! stack.registry_mut().register_resource::<Bucket>();
//! stack.registry_mut().register_state::<BucketState>();
//! stack.add_provider(ObjectStoreProvider::new());
//! stack.add_resource(ResourceRef::new(Bucket::new("assets")));
//!
//! let plan = stack.plan(false)?;
//! let report = stack.apply(&plan)?;
//! assert!(report.success());
//! ```

pub mod codec;
pub mod diff;
pub mod error;
pub mod executor;
pub mod graph;
pub mod planner;
pub mod provider;
pub mod resource;
pub mod stack;
pub mod state;
pub mod store;

// Re-export main types at crate root
pub use codec::{
    CodecError, DecodeContext, JsonMap, NoOutputs, ResourceRecord, StateRecord, TypeRegistry,
};
pub use diff::{FieldDiff, field_diffs};
pub use error::{Error, ErrorKind, MissingDependency, Result};
pub use executor::{ExecutionReport, OperationResult};
pub use graph::DependencyGraph;
pub use planner::{OpKind, Operation, Plan, PlanDiagnostics};
pub use provider::{Provider, find_provider};
pub use resource::{DependentResource, Resource, ResourceRef};
pub use stack::Stack;
pub use state::{
    BaseResourceState, DependencyStates, ResourceState, StackState, StateMetadata, StateRef,
};
pub use store::{LockGuard, StateError, StateStore};
