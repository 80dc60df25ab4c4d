//! Resource states and the persisted stack state.
//!
//! A [`ResourceState`] is a provider's view of a realized resource: the
//! resource as it actually exists plus any provider-assigned read-only
//! outputs. The persisted [`StackState`] maps resource ids to their states
//! and is the sole input for diffing against the desired configuration.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::{
    CodecError, DecodeContext, JsonMap, NoOutputs, StateRecord, TypeRegistry, DEPENDENCIES_KEY,
    RESOURCE_KEY,
};
use crate::error::{Error, Result};
use crate::graph::DependencyGraph;
use crate::resource::ResourceRef;

/// Serialization format version written to every state file.
///
/// The version is recorded but not checked on load; introducing an
/// incompatible format requires an explicit upgrade path.
pub const STATE_FORMAT_VERSION: &str = "1.0";

/// Type tag of the fallback base state.
pub const BASE_STATE_TAG: &str = "stackkit.ResourceState";

/// The record produced by a provider for a realized resource.
///
/// Implementations carry the realized resource plus any read-only outputs
/// (server-assigned ids and the like). Outputs are the only surface that
/// downstream late-bound resources may read.
pub trait ResourceState: fmt::Debug + Send + Sync {
    /// Type tag under which this state is registered with the codec
    /// registry.
    fn type_tag(&self) -> &'static str;

    /// The resource as actually realized. May differ from the desired
    /// resource, reflecting drift or server-assigned defaults.
    fn resource(&self) -> &ResourceRef;

    /// Downcasting hook for builders reading provider outputs.
    fn as_any(&self) -> &dyn Any;
}

/// Shared handle to a resource state.
pub type StateRef = Arc<dyn ResourceState>;

/// Fallback state carrying only the realized resource.
///
/// Decoding falls back to this type when a state's recorded type tag is no
/// longer registered, so removing a provider-specific state type does not
/// invalidate an existing state file.
#[derive(Debug)]
pub struct BaseResourceState {
    resource: ResourceRef,
}

impl BaseResourceState {
    /// Wrap a realized resource without provider outputs.
    pub fn new(resource: ResourceRef) -> Self {
        Self { resource }
    }
}

impl ResourceState for BaseResourceState {
    fn type_tag(&self) -> &'static str {
        BASE_STATE_TAG
    }

    fn resource(&self) -> &ResourceRef {
        &self.resource
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl StateRecord for BaseResourceState {
    const TYPE_TAG: &'static str = BASE_STATE_TAG;
    type Outputs = NoOutputs;

    fn outputs(&self) -> Self::Outputs {
        NoOutputs {}
    }

    fn from_parts(resource: ResourceRef, _outputs: Self::Outputs) -> Self {
        Self::new(resource)
    }
}

/// View over the states a late-bound resource's builder may read.
pub struct DependencyStates<'a> {
    states: &'a IndexMap<String, StateRef>,
}

impl<'a> DependencyStates<'a> {
    /// Wrap a working map of realized states.
    pub fn new(states: &'a IndexMap<String, StateRef>) -> Self {
        Self { states }
    }

    /// Look up a dependency state by resource id.
    pub fn get(&self, id: &str) -> Option<&StateRef> {
        self.states.get(id)
    }

    /// Look up a dependency state, failing if it is absent.
    ///
    /// By the DAG invariant every dependency has been realized before a
    /// dependent builder runs, so absence is an engine bug.
    pub fn require(&self, id: &str) -> Result<&StateRef> {
        self.states
            .get(id)
            .ok_or_else(|| Error::Internal(format!("state of dependency '{id}' is not available")))
    }

    /// Look up a dependency state and downcast it to a concrete type.
    pub fn downcast<S: ResourceState + 'static>(&self, id: &str) -> Result<&S> {
        let state = self.require(id)?;
        state.as_any().downcast_ref::<S>().ok_or_else(|| {
            Error::Validation(format!(
                "state of dependency '{}' is not of the expected type (found {})",
                id,
                state.type_tag()
            ))
        })
    }
}

/// Informational metadata written alongside the resource map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateMetadata {
    /// When the state was last persisted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// The persisted state of a stack.
#[derive(Debug)]
pub struct StackState {
    /// Serialization format version, written as [`STATE_FORMAT_VERSION`]
    pub version: String,
    /// Name of the stack this state belongs to
    pub stack: String,
    /// Realized states keyed by resource id
    pub resources: IndexMap<String, StateRef>,
    /// Informational metadata
    pub metadata: StateMetadata,
}

impl StackState {
    /// Empty state for a stack that has never been applied.
    pub fn empty() -> Self {
        Self::named("default")
    }

    /// Empty state bound to a stack name.
    pub fn named(stack: impl Into<String>) -> Self {
        Self {
            version: STATE_FORMAT_VERSION.to_string(),
            stack: stack.into(),
            resources: IndexMap::new(),
            metadata: StateMetadata::default(),
        }
    }

    /// Whether a resource id has a realized state.
    pub fn contains(&self, id: &str) -> bool {
        self.resources.contains_key(id)
    }

    /// Realized state for a resource id, if any.
    pub fn get(&self, id: &str) -> Option<&StateRef> {
        self.resources.get(id)
    }

    /// Encode the state to its on-disk JSON form.
    pub fn to_json(&self, registry: &TypeRegistry) -> Result<Value> {
        let mut resources = JsonMap::new();
        for (id, state) in &self.resources {
            resources.insert(id.clone(), registry.encode_state(state)?);
        }

        let mut root = JsonMap::new();
        root.insert("version".into(), Value::String(self.version.clone()));
        root.insert("stack".into(), Value::String(self.stack.clone()));
        root.insert("resources".into(), Value::Object(resources));
        root.insert(
            "metadata".into(),
            serde_json::to_value(&self.metadata).map_err(|e| CodecError::Encode {
                type_tag: "metadata".into(),
                source: e,
            })?,
        );
        Ok(Value::Object(root))
    }

    /// Decode a state from its on-disk JSON form.
    ///
    /// Dependency references inside realized resources are persisted as id
    /// strings; decoding walks the id graph in topological order so every
    /// dependency is rewired to a live reference as it is reconstructed.
    pub fn from_json(value: &Value, registry: &TypeRegistry) -> Result<Self> {
        let root = value.as_object().ok_or(CodecError::NotAnObject {
            context: "state file root".into(),
        })?;

        let version = match root.get("version") {
            Some(v) => v
                .as_str()
                .ok_or(CodecError::NotAnObject {
                    context: "state file 'version'".into(),
                })?
                .to_string(),
            None => STATE_FORMAT_VERSION.to_string(),
        };
        let stack = root
            .get("stack")
            .and_then(Value::as_str)
            .unwrap_or("default")
            .to_string();
        let metadata = match root.get("metadata") {
            Some(v) => serde_json::from_value(v.clone()).map_err(|e| CodecError::Decode {
                type_tag: "metadata".into(),
                source: e,
            })?,
            None => StateMetadata::default(),
        };

        let raw = match root.get("resources") {
            Some(v) => v.as_object().ok_or(CodecError::NotAnObject {
                context: "state file 'resources'".into(),
            })?,
            None => {
                return Ok(Self {
                    version,
                    stack,
                    resources: IndexMap::new(),
                    metadata,
                });
            }
        };

        // Pre-scan the persisted dependency ids so states can be decoded
        // dependencies-first.
        let mut graph = DependencyGraph::new();
        for (id, state_value) in raw {
            graph.add(id, scan_dependency_ids(state_value));
        }
        graph.validate()?;

        let mut decoded: IndexMap<String, StateRef> = IndexMap::new();
        for id in graph.topological_order()? {
            let state_value = raw
                .get(&id)
                .ok_or_else(|| Error::Internal(format!("state of '{id}' vanished during decode")))?;
            let state = {
                let resolve = |dep: &str| decoded.get(dep).map(|s| s.resource().clone());
                let ctx = DecodeContext::resolving(&resolve);
                registry.decode_state(state_value, &ctx)?
            };
            decoded.insert(id, state);
        }

        // Preserve the file's own ordering for deterministic iteration.
        let mut resources = IndexMap::with_capacity(decoded.len());
        for id in raw.keys() {
            if let Some(state) = decoded.shift_remove(id) {
                resources.insert(id.clone(), state);
            }
        }

        Ok(Self {
            version,
            stack,
            resources,
            metadata,
        })
    }
}

fn scan_dependency_ids(state_value: &Value) -> Vec<String> {
    state_value
        .get(RESOURCE_KEY)
        .and_then(|r| r.get(DEPENDENCIES_KEY))
        .and_then(Value::as_array)
        .map(|deps| {
            deps.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
