//! Stack facade: the top-level unit tying providers, desired resources,
//! the codec registry and a state store together.

use crate::codec::TypeRegistry;
use crate::error::Result;
use crate::executor::{self, ExecutionReport};
use crate::planner::{self, Plan};
use crate::provider::Provider;
use crate::resource::ResourceRef;
use crate::store::StateStore;

/// A named collection of providers and desired resources bound to a state
/// store.
///
/// The stack owns the codec registry; register every resource and state
/// type the providers produce before planning, so persisted states decode
/// back to their concrete types.
pub struct Stack {
    name: String,
    providers: Vec<Box<dyn Provider>>,
    resources: Vec<ResourceRef>,
    store: StateStore,
    registry: TypeRegistry,
}

impl Stack {
    /// New stack bound to a state store.
    pub fn new(name: impl Into<String>, store: StateStore) -> Self {
        Self {
            name: name.into(),
            providers: Vec::new(),
            resources: Vec::new(),
            store,
            registry: TypeRegistry::new(),
        }
    }

    /// Name of the stack, recorded in the persisted state.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a provider; earlier providers win when several claim the
    /// same resource.
    pub fn add_provider(&mut self, provider: impl Provider + 'static) {
        self.providers.push(Box::new(provider));
    }

    /// Append a desired resource.
    pub fn add_resource(&mut self, resource: ResourceRef) {
        self.resources.push(resource);
    }

    /// Providers in stack order.
    pub fn providers(&self) -> &[Box<dyn Provider>] {
        &self.providers
    }

    /// Desired resources in declaration order.
    pub fn resources(&self) -> &[ResourceRef] {
        &self.resources
    }

    /// The bound state store.
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// The codec registry.
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Mutable access for registering record types.
    pub fn registry_mut(&mut self) -> &mut TypeRegistry {
        &mut self.registry
    }

    /// Diff the desired resources against the persisted state.
    pub fn plan(&self, verbose: bool) -> Result<Plan> {
        let actual = self.store.load(&self.registry)?;
        planner::plan(&self.resources, &actual, &self.registry, verbose)
    }

    /// Plan the removal of every managed resource.
    pub fn destroy_plan(&self, verbose: bool) -> Result<Plan> {
        let actual = self.store.load(&self.registry)?;
        planner::plan(&[], &actual, &self.registry, verbose)
    }

    /// Execute a plan and persist the resulting state on full success.
    pub fn apply(&self, plan: &Plan) -> Result<ExecutionReport> {
        executor::execute(self, plan)
    }

    /// Re-read every desired resource from its provider and persist the
    /// observed states. Returns the refreshed resource ids.
    pub fn refresh(&self) -> Result<Vec<String>> {
        executor::refresh(self)
    }
}
