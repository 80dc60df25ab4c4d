//! Resource model: concrete resources, read-only markers and late-bound
//! resources.
//!
//! A resource is an immutable, user-authored record describing a piece of
//! external state. Dependencies between resources are live references, so
//! cycles cannot be constructed; the persisted form replaces references
//! with id strings.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::state::DependencyStates;

/// Type tag used when rendering a late-bound resource that has not been
/// materialized yet. Wrappers are never persisted, so this tag is never
/// decoded.
pub const DEPENDENT_TYPE_TAG: &str = "stackkit.DependentResource";

/// Core trait for managed resources.
///
/// Identity (`id`) and `dependencies` are metadata: two resources are equal
/// for planning purposes when they have the same concrete type and equal
/// attribute fields, regardless of metadata.
pub trait Resource: fmt::Debug + Send + Sync {
    /// Stable identifier, unique within a stack.
    fn id(&self) -> &str;

    /// Type tag under which this resource is registered with the codec
    /// registry, e.g. `"mock.Bundle"`.
    fn type_tag(&self) -> &'static str;

    /// Direct dependencies of this resource.
    fn dependencies(&self) -> Vec<ResourceRef> {
        Vec::new()
    }

    /// Read-only resources are observed to verify existence and expose
    /// outputs; the engine never creates, updates or deletes them.
    fn read_only(&self) -> bool {
        false
    }

    /// Human-readable description used in plan output.
    fn description(&self) -> String {
        format!("{} '{}'", self.type_tag(), self.id())
    }

    /// Downcasting hook for providers and the codec registry.
    fn as_any(&self) -> &dyn Any;
}

/// Builder invoked to materialize a [`DependentResource`] once the states
/// of its dependencies are known.
pub type BuildFn =
    Box<dyn Fn(&DependencyStates<'_>) -> Result<Arc<dyn Resource>> + Send + Sync>;

/// A resource whose final form is unknown until its dependencies have been
/// realized.
///
/// The builder is a pure function over dependency states; it is called by
/// the planner when every dependency is already present in the actual
/// state, and by the executor otherwise. A dependent resource is never
/// handed to a provider directly.
pub struct DependentResource {
    id: String,
    dependencies: Vec<ResourceRef>,
    builder: BuildFn,
}

impl DependentResource {
    /// Create a late-bound resource from its id, dependency list and
    /// builder function.
    pub fn new(
        id: impl Into<String>,
        dependencies: Vec<ResourceRef>,
        builder: impl Fn(&DependencyStates<'_>) -> Result<Arc<dyn Resource>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            dependencies,
            builder: Box::new(builder),
        }
    }

    /// Stable identifier of the resource this wrapper will produce.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Direct dependencies of this resource.
    pub fn dependencies(&self) -> &[ResourceRef] {
        &self.dependencies
    }

    /// Run the builder against the given dependency states.
    pub fn build(&self, states: &DependencyStates<'_>) -> Result<Arc<dyn Resource>> {
        (self.builder)(states)
    }
}

impl fmt::Debug for DependentResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependentResource")
            .field("id", &self.id)
            .field(
                "dependencies",
                &self.dependencies.iter().map(|d| d.id().to_string()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

/// Shared handle to a desired resource: either a concrete record or a
/// late-bound resource awaiting its dependencies' states.
#[derive(Debug, Clone)]
pub enum ResourceRef {
    /// A fully specified resource
    Concrete(Arc<dyn Resource>),
    /// A late-bound resource materialized from dependency states
    Dependent(Arc<DependentResource>),
}

impl ResourceRef {
    /// Wrap a concrete resource.
    pub fn new<R: Resource + 'static>(resource: R) -> Self {
        Self::Concrete(Arc::new(resource))
    }

    /// Wrap an already-shared concrete resource.
    pub fn from_arc(resource: Arc<dyn Resource>) -> Self {
        Self::Concrete(resource)
    }

    /// Wrap a late-bound resource.
    pub fn dependent(resource: DependentResource) -> Self {
        Self::Dependent(Arc::new(resource))
    }

    /// Stable identifier of the resource.
    pub fn id(&self) -> &str {
        match self {
            Self::Concrete(r) => r.id(),
            Self::Dependent(d) => d.id(),
        }
    }

    /// Type tag of the resource; late-bound wrappers report
    /// [`DEPENDENT_TYPE_TAG`].
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::Concrete(r) => r.type_tag(),
            Self::Dependent(_) => DEPENDENT_TYPE_TAG,
        }
    }

    /// Direct dependencies of the resource.
    pub fn dependencies(&self) -> Vec<ResourceRef> {
        match self {
            Self::Concrete(r) => r.dependencies(),
            Self::Dependent(d) => d.dependencies().to_vec(),
        }
    }

    /// Ids of the direct dependencies.
    pub fn dependency_ids(&self) -> Vec<String> {
        self.dependencies().iter().map(|d| d.id().to_string()).collect()
    }

    /// Whether the engine only observes this resource.
    pub fn read_only(&self) -> bool {
        match self {
            Self::Concrete(r) => r.read_only(),
            Self::Dependent(_) => false,
        }
    }

    /// Whether this handle is a late-bound wrapper.
    pub fn is_dependent(&self) -> bool {
        matches!(self, Self::Dependent(_))
    }

    /// The concrete resource, if this handle is not late-bound.
    pub fn as_concrete(&self) -> Option<&Arc<dyn Resource>> {
        match self {
            Self::Concrete(r) => Some(r),
            Self::Dependent(_) => None,
        }
    }

    /// The late-bound wrapper, if any.
    pub fn as_dependent(&self) -> Option<&Arc<DependentResource>> {
        match self {
            Self::Concrete(_) => None,
            Self::Dependent(d) => Some(d),
        }
    }

    /// Downcast the concrete resource to a known type.
    pub fn downcast_ref<R: Resource + 'static>(&self) -> Option<&R> {
        self.as_concrete().and_then(|r| r.as_any().downcast_ref::<R>())
    }

    /// Human-readable description used in plan output.
    pub fn description(&self) -> String {
        match self {
            Self::Concrete(r) => r.description(),
            Self::Dependent(d) => format!("late-bound resource '{}'", d.id()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Fixed {
        id: String,
        read_only: bool,
    }

    impl Resource for Fixed {
        fn id(&self) -> &str {
            &self.id
        }

        fn type_tag(&self) -> &'static str {
            "test.Fixed"
        }

        fn read_only(&self) -> bool {
            self.read_only
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_concrete_ref() {
        let r = ResourceRef::new(Fixed {
            id: "a".into(),
            read_only: false,
        });
        assert_eq!(r.id(), "a");
        assert_eq!(r.type_tag(), "test.Fixed");
        assert!(!r.is_dependent());
        assert!(!r.read_only());
        assert!(r.dependency_ids().is_empty());
        assert!(r.downcast_ref::<Fixed>().is_some());
    }

    #[test]
    fn test_dependent_ref() {
        let base = ResourceRef::new(Fixed {
            id: "base".into(),
            read_only: false,
        });
        let dep = ResourceRef::dependent(DependentResource::new(
            "late",
            vec![base],
            |_states| {
                Ok(Arc::new(Fixed {
                    id: "late".into(),
                    read_only: false,
                }) as Arc<dyn Resource>)
            },
        ));
        assert_eq!(dep.id(), "late");
        assert_eq!(dep.type_tag(), DEPENDENT_TYPE_TAG);
        assert!(dep.is_dependent());
        assert_eq!(dep.dependency_ids(), vec!["base".to_string()]);
        assert!(dep.as_concrete().is_none());
    }

    #[test]
    fn test_read_only_marker() {
        let r = ResourceRef::new(Fixed {
            id: "ext".into(),
            read_only: true,
        });
        assert!(r.read_only());
    }
}
