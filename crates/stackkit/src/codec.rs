//! Tagged-JSON codec registry for user-defined record types.
//!
//! Resource and state records serialize to JSON objects tagged with a
//! `.type` key. The registry maps type tags to codec pairs so new record
//! types added by user code or provider packages become serializable by
//! registering once, without code generation. Serde powers the common
//! case ([`register_resource`](TypeRegistry::register_resource) and
//! [`register_state`](TypeRegistry::register_state)); records whose shape
//! serde cannot express register an explicit codec pair instead.
//!
//! Dependencies are persisted as id strings. During decoding a
//! [`DecodeContext`] supplies the hook that turns those ids back into live
//! [`ResourceRef`]s, plus optional per-field mappers that may transform a
//! raw value before the record decoder sees it.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::resource::{DEPENDENT_TYPE_TAG, Resource, ResourceRef};
use crate::state::{BaseResourceState, ResourceState, StateRef};

/// JSON object type used throughout the codec layer.
pub type JsonMap = serde_json::Map<String, Value>;

/// Key carrying the record's type tag.
pub const TYPE_KEY: &str = ".type";

/// Key carrying a resource's id.
pub const ID_KEY: &str = "id";

/// Key carrying a resource's dependency ids.
pub const DEPENDENCIES_KEY: &str = "dependencies";

/// Key carrying the realized resource inside a state record.
pub const RESOURCE_KEY: &str = "resource";

/// Errors produced while encoding or decoding records.
#[derive(Error, Debug)]
pub enum CodecError {
    /// The record carries no `.type` tag
    #[error("record is missing its '{TYPE_KEY}' tag")]
    MissingTypeTag,

    /// The recorded type tag is not registered
    #[error("unknown type tag '{0}'")]
    UnknownTypeTag(String),

    /// A value that must be a JSON object is not one
    #[error("{context} is not a JSON object")]
    NotAnObject {
        /// What was being decoded
        context: String,
    },

    /// A required field is absent from the JSON
    #[error("record '{type_tag}' is missing required field '{field}'")]
    MissingField {
        /// Type tag of the record
        type_tag: String,
        /// Name of the absent field
        field: String,
    },

    /// The value handed to an encoder is not of the registered type
    #[error("value is not an instance of registered type '{type_tag}'")]
    TypeMismatch {
        /// Type tag the encoder was registered under
        type_tag: &'static str,
    },

    /// Serde failed to encode the record's fields
    #[error("failed to encode '{type_tag}': {source}")]
    Encode {
        /// Type tag of the record
        type_tag: String,
        /// Underlying serde error
        #[source]
        source: serde_json::Error,
    },

    /// Serde failed to decode the record's fields
    #[error("failed to decode '{type_tag}': {source}")]
    Decode {
        /// Type tag of the record
        type_tag: String,
        /// Underlying serde error, naming the offending field
        #[source]
        source: serde_json::Error,
    },

    /// A late-bound resource wrapper cannot be decoded
    #[error("late-bound resource '{id}' cannot be decoded")]
    LateBound {
        /// Id of the wrapper
        id: String,
    },

    /// A persisted dependency id could not be resolved to a live resource
    #[error("dependency '{id}' cannot be resolved to a managed resource")]
    UnresolvedDependency {
        /// The unresolvable dependency id
        id: String,
    },
}

/// Marker for states with no provider-assigned outputs.
#[derive(Debug, Clone, Copy, Default, Serialize, serde::Deserialize)]
pub struct NoOutputs {}

/// A resource record with a serde-derived codec.
///
/// The serde representation must include the `id` field and exclude
/// dependencies (mark them `#[serde(skip)]`); the registry injects the
/// `.type` tag and the dependency id list around the serde form. Records
/// that carry dependencies implement [`attach_dependencies`]
/// (ResourceRecord::attach_dependencies) to rewire the live references
/// after decoding.
pub trait ResourceRecord: Resource + Serialize + DeserializeOwned + 'static {
    /// Tag this record registers under.
    const TYPE_TAG: &'static str;

    /// Reattach live dependency references after decoding.
    fn attach_dependencies(&mut self, dependencies: Vec<ResourceRef>) {
        let _ = dependencies;
    }
}

/// A state record split into its realized resource and serde-serializable
/// provider outputs.
pub trait StateRecord: ResourceState + Sized + 'static {
    /// Tag this record registers under.
    const TYPE_TAG: &'static str;

    /// Provider-assigned read-only fields. Use [`NoOutputs`] when the
    /// provider assigns none.
    type Outputs: Serialize + DeserializeOwned;

    /// The outputs as a serializable record.
    fn outputs(&self) -> Self::Outputs;

    /// Reassemble the state from a decoded resource and outputs.
    fn from_parts(resource: ResourceRef, outputs: Self::Outputs) -> Self;
}

/// Encoder half of a resource codec: record to attribute fields.
pub type EncodeResourceFn =
    Box<dyn Fn(&dyn Resource) -> Result<JsonMap, CodecError> + Send + Sync>;

/// Decoder half of a resource codec: tagged fields to record.
pub type DecodeResourceFn = Box<
    dyn Fn(&JsonMap, &DecodeContext<'_>) -> Result<Arc<dyn Resource>, CodecError> + Send + Sync,
>;

/// Encoder half of a state codec: state to output fields.
pub type EncodeStateFn =
    Box<dyn Fn(&dyn ResourceState) -> Result<JsonMap, CodecError> + Send + Sync>;

/// Decoder half of a state codec: resource plus output fields to state.
pub type DecodeStateFn =
    Box<dyn Fn(ResourceRef, &JsonMap) -> Result<StateRef, CodecError> + Send + Sync>;

/// Per-field mapper applied before a record decoder runs.
pub type FieldMapper<'a> = Box<dyn Fn(&str, Value) -> Result<Value, CodecError> + 'a>;

/// How persisted dependency ids are handled during decoding.
pub enum DependencyHandling<'a> {
    /// Drop dependency references; the record keeps an empty list.
    Elide,
    /// Resolve each id to a live resource through the callback.
    Resolve(&'a dyn Fn(&str) -> Option<ResourceRef>),
}

/// Decoding context carrying the dependency resolver and field mappers.
pub struct DecodeContext<'a> {
    dependencies: DependencyHandling<'a>,
    mappers: Vec<FieldMapper<'a>>,
}

impl<'a> DecodeContext<'a> {
    /// Context that elides dependency references.
    pub fn new() -> Self {
        Self {
            dependencies: DependencyHandling::Elide,
            mappers: Vec::new(),
        }
    }

    /// Context that resolves dependency ids through the given callback.
    pub fn resolving(resolver: &'a dyn Fn(&str) -> Option<ResourceRef>) -> Self {
        Self {
            dependencies: DependencyHandling::Resolve(resolver),
            mappers: Vec::new(),
        }
    }

    /// Add a mapper invoked as `(field, value) -> value` on every field
    /// before the record decoder sees it.
    pub fn with_mapper(
        mut self,
        mapper: impl Fn(&str, Value) -> Result<Value, CodecError> + 'a,
    ) -> Self {
        self.mappers.push(Box::new(mapper));
        self
    }

    fn map_field(&self, field: &str, value: Value) -> Result<Value, CodecError> {
        let mut value = value;
        for mapper in &self.mappers {
            value = mapper(field, value)?;
        }
        Ok(value)
    }

    fn resolve(&self, id: &str) -> Result<Option<ResourceRef>, CodecError> {
        match &self.dependencies {
            DependencyHandling::Elide => Ok(None),
            DependencyHandling::Resolve(resolver) => resolver(id)
                .map(Some)
                .ok_or_else(|| CodecError::UnresolvedDependency { id: id.to_string() }),
        }
    }
}

impl Default for DecodeContext<'_> {
    fn default() -> Self {
        Self::new()
    }
}

struct ResourceCodec {
    encode: EncodeResourceFn,
    decode: DecodeResourceFn,
}

struct StateCodec {
    encode: EncodeStateFn,
    decode: DecodeStateFn,
}

/// Registry mapping type tags to codecs.
///
/// A fresh registry already knows the fallback base state type, so a state
/// file written with since-removed provider state types still loads.
pub struct TypeRegistry {
    resources: HashMap<&'static str, ResourceCodec>,
    states: HashMap<&'static str, StateCodec>,
}

impl TypeRegistry {
    /// Registry with only the built-in base state registered.
    pub fn new() -> Self {
        let mut registry = Self {
            resources: HashMap::new(),
            states: HashMap::new(),
        };
        registry.register_state::<BaseResourceState>();
        registry
    }

    /// Register a serde-backed resource record under its type tag.
    pub fn register_resource<R: ResourceRecord>(&mut self) {
        let encode: EncodeResourceFn = Box::new(|resource: &dyn Resource| {
            let record = resource
                .as_any()
                .downcast_ref::<R>()
                .ok_or(CodecError::TypeMismatch {
                    type_tag: R::TYPE_TAG,
                })?;
            match serde_json::to_value(record).map_err(|e| CodecError::Encode {
                type_tag: R::TYPE_TAG.to_string(),
                source: e,
            })? {
                Value::Object(fields) => Ok(fields),
                _ => Err(CodecError::NotAnObject {
                    context: format!("encoded form of '{}'", R::TYPE_TAG),
                }),
            }
        });

        let decode: DecodeResourceFn = Box::new(|fields, ctx| {
            let mut attrs = JsonMap::new();
            let mut dependency_ids: Vec<String> = Vec::new();
            for (name, value) in fields {
                if name == TYPE_KEY {
                    continue;
                }
                let value = ctx.map_field(name, value.clone())?;
                if name == DEPENDENCIES_KEY {
                    dependency_ids = decode_dependency_ids(R::TYPE_TAG, &value)?;
                    continue;
                }
                attrs.insert(name.clone(), value);
            }

            let mut record: R =
                serde_json::from_value(Value::Object(attrs)).map_err(|e| CodecError::Decode {
                    type_tag: R::TYPE_TAG.to_string(),
                    source: e,
                })?;

            if !dependency_ids.is_empty() {
                let mut dependencies = Vec::with_capacity(dependency_ids.len());
                for id in &dependency_ids {
                    if let Some(resource) = ctx.resolve(id)? {
                        dependencies.push(resource);
                    }
                }
                if !dependencies.is_empty() {
                    record.attach_dependencies(dependencies);
                }
            }

            Ok(Arc::new(record) as Arc<dyn Resource>)
        });

        self.register_resource_with(R::TYPE_TAG, encode, decode);
    }

    /// Register an explicit resource codec pair.
    ///
    /// This is the escape hatch for records serde cannot derive; the
    /// encoder returns the attribute fields only (the registry injects
    /// `.type`, `id` and `dependencies`).
    pub fn register_resource_with(
        &mut self,
        type_tag: &'static str,
        encode: EncodeResourceFn,
        decode: DecodeResourceFn,
    ) {
        self.resources
            .insert(type_tag, ResourceCodec { encode, decode });
    }

    /// Register a serde-backed state record under its type tag.
    pub fn register_state<S: StateRecord>(&mut self) {
        let encode: EncodeStateFn = Box::new(|state: &dyn ResourceState| {
            let record = state
                .as_any()
                .downcast_ref::<S>()
                .ok_or(CodecError::TypeMismatch {
                    type_tag: S::TYPE_TAG,
                })?;
            match serde_json::to_value(record.outputs()).map_err(|e| CodecError::Encode {
                type_tag: S::TYPE_TAG.to_string(),
                source: e,
            })? {
                Value::Object(fields) => Ok(fields),
                Value::Null => Ok(JsonMap::new()),
                _ => Err(CodecError::NotAnObject {
                    context: format!("outputs of '{}'", S::TYPE_TAG),
                }),
            }
        });

        let decode: DecodeStateFn = Box::new(|resource, fields| {
            let outputs: S::Outputs = serde_json::from_value(Value::Object(fields.clone()))
                .map_err(|e| CodecError::Decode {
                    type_tag: S::TYPE_TAG.to_string(),
                    source: e,
                })?;
            Ok(Arc::new(S::from_parts(resource, outputs)) as StateRef)
        });

        self.register_state_with(S::TYPE_TAG, encode, decode);
    }

    /// Register an explicit state codec pair.
    pub fn register_state_with(
        &mut self,
        type_tag: &'static str,
        encode: EncodeStateFn,
        decode: DecodeStateFn,
    ) {
        self.states.insert(type_tag, StateCodec { encode, decode });
    }

    /// Whether a resource type tag is registered.
    pub fn knows_resource(&self, type_tag: &str) -> bool {
        self.resources.contains_key(type_tag)
    }

    /// Whether a state type tag is registered.
    pub fn knows_state(&self, type_tag: &str) -> bool {
        self.states.contains_key(type_tag)
    }

    /// Encode a resource to its tagged JSON form.
    ///
    /// Late-bound wrappers encode to a display-only stub tagged
    /// [`DEPENDENT_TYPE_TAG`]; they are never persisted, so the stub is
    /// never decoded back.
    pub fn encode_resource(&self, resource: &ResourceRef) -> Result<Value, CodecError> {
        let mut out = JsonMap::new();
        out.insert(TYPE_KEY.into(), Value::String(resource.type_tag().into()));
        out.insert(ID_KEY.into(), Value::String(resource.id().into()));
        out.insert(
            DEPENDENCIES_KEY.into(),
            Value::Array(
                resource
                    .dependency_ids()
                    .into_iter()
                    .map(Value::String)
                    .collect(),
            ),
        );

        if let ResourceRef::Concrete(concrete) = resource {
            let codec = self
                .resources
                .get(concrete.type_tag())
                .ok_or_else(|| CodecError::UnknownTypeTag(concrete.type_tag().to_string()))?;
            for (name, value) in (codec.encode)(concrete.as_ref())? {
                if name != TYPE_KEY && name != ID_KEY && name != DEPENDENCIES_KEY {
                    out.insert(name, value);
                }
            }
        }

        Ok(Value::Object(out))
    }

    /// Decode a resource from its tagged JSON form.
    pub fn decode_resource(
        &self,
        value: &Value,
        ctx: &DecodeContext<'_>,
    ) -> Result<ResourceRef, CodecError> {
        let fields = value.as_object().ok_or(CodecError::NotAnObject {
            context: "resource record".into(),
        })?;
        let type_tag = fields
            .get(TYPE_KEY)
            .and_then(Value::as_str)
            .ok_or(CodecError::MissingTypeTag)?;

        if type_tag == DEPENDENT_TYPE_TAG {
            let id = fields
                .get(ID_KEY)
                .and_then(Value::as_str)
                .unwrap_or("<unknown>");
            return Err(CodecError::LateBound { id: id.to_string() });
        }

        let codec = self
            .resources
            .get(type_tag)
            .ok_or_else(|| CodecError::UnknownTypeTag(type_tag.to_string()))?;
        Ok(ResourceRef::Concrete((codec.decode)(fields, ctx)?))
    }

    /// Encode a resource state to its tagged JSON form.
    pub fn encode_state(&self, state: &StateRef) -> Result<Value, CodecError> {
        let codec = self
            .states
            .get(state.type_tag())
            .ok_or_else(|| CodecError::UnknownTypeTag(state.type_tag().to_string()))?;

        let mut out = JsonMap::new();
        out.insert(TYPE_KEY.into(), Value::String(state.type_tag().into()));
        out.insert(RESOURCE_KEY.into(), self.encode_resource(state.resource())?);
        for (name, value) in (codec.encode)(state.as_ref())? {
            if name != TYPE_KEY && name != RESOURCE_KEY {
                out.insert(name, value);
            }
        }
        Ok(Value::Object(out))
    }

    /// Decode a resource state from its tagged JSON form.
    ///
    /// An unregistered state tag falls back to [`BaseResourceState`] as
    /// long as the nested resource is decodable, preserving forward
    /// compatibility when a provider-specific state type was removed.
    pub fn decode_state(
        &self,
        value: &Value,
        ctx: &DecodeContext<'_>,
    ) -> Result<StateRef, CodecError> {
        let fields = value.as_object().ok_or(CodecError::NotAnObject {
            context: "resource state record".into(),
        })?;
        let type_tag = fields
            .get(TYPE_KEY)
            .and_then(Value::as_str)
            .ok_or(CodecError::MissingTypeTag)?;
        let resource_value = fields.get(RESOURCE_KEY).ok_or_else(|| {
            CodecError::MissingField {
                type_tag: type_tag.to_string(),
                field: RESOURCE_KEY.to_string(),
            }
        })?;
        let resource = self.decode_resource(resource_value, ctx)?;

        match self.states.get(type_tag) {
            Some(codec) => {
                let mut outputs = JsonMap::new();
                for (name, value) in fields {
                    if name != TYPE_KEY && name != RESOURCE_KEY {
                        outputs.insert(name.clone(), value.clone());
                    }
                }
                (codec.decode)(resource, &outputs)
            }
            None => {
                log::debug!("state type '{type_tag}' is not registered, falling back to base state");
                Ok(Arc::new(BaseResourceState::new(resource)))
            }
        }
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_dependency_ids(type_tag: &str, value: &Value) -> Result<Vec<String>, CodecError> {
    let items = value.as_array().ok_or_else(|| CodecError::NotAnObject {
        context: format!("'{DEPENDENCIES_KEY}' of '{type_tag}'"),
    })?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| CodecError::NotAnObject {
                    context: format!("'{DEPENDENCIES_KEY}' entry of '{type_tag}'"),
                })
        })
        .collect()
}
