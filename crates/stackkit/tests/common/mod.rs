//! Shared fixtures: tagged test record types and an in-memory provider
//! simulating an external system.

use std::any::Any;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use stackkit::codec::{ResourceRecord, StateRecord, TypeRegistry};
use stackkit::error::{Error, Result};
use stackkit::{
    BaseResourceState, Provider, Resource, ResourceRef, ResourceState, Stack, StateRef, StateStore,
};
use tempfile::TempDir;

// ============================================================================
// Resource types
// ============================================================================

/// Generic infrastructure service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub name: String,
    #[serde(skip)]
    pub depends: Vec<ResourceRef>,
}

impl Service {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            depends: Vec::new(),
        }
    }

    pub fn with_deps(id: &str, name: &str, depends: Vec<ResourceRef>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            depends,
        }
    }
}

impl Resource for Service {
    fn id(&self) -> &str {
        &self.id
    }

    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn dependencies(&self) -> Vec<ResourceRef> {
        self.depends.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl ResourceRecord for Service {
    const TYPE_TAG: &'static str = "mock.Service";

    fn attach_dependencies(&mut self, dependencies: Vec<ResourceRef>) {
        self.depends = dependencies;
    }
}

/// State of a [`Service`], carrying a provider-assigned address.
#[derive(Debug)]
pub struct ServiceState {
    pub resource: ResourceRef,
    pub address: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceOutputs {
    pub address: String,
}

impl ResourceState for ServiceState {
    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn resource(&self) -> &ResourceRef {
        &self.resource
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl StateRecord for ServiceState {
    const TYPE_TAG: &'static str = "mock.ServiceState";
    type Outputs = ServiceOutputs;

    fn outputs(&self) -> Self::Outputs {
        ServiceOutputs {
            address: self.address.clone(),
        }
    }

    fn from_parts(resource: ResourceRef, outputs: Self::Outputs) -> Self {
        Self {
            resource,
            address: outputs.address,
        }
    }
}

/// Application bundle whose provider assigns a bundle id on creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppBundle {
    pub id: String,
    pub prefix: String,
}

impl Resource for AppBundle {
    fn id(&self) -> &str {
        &self.id
    }

    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl ResourceRecord for AppBundle {
    const TYPE_TAG: &'static str = "mock.AppBundle";
}

/// State of an [`AppBundle`] with its server-issued bundle id.
#[derive(Debug)]
pub struct AppBundleState {
    pub resource: ResourceRef,
    pub bundle_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AppBundleOutputs {
    pub bundle_id: String,
}

impl ResourceState for AppBundleState {
    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn resource(&self) -> &ResourceRef {
        &self.resource
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl StateRecord for AppBundleState {
    const TYPE_TAG: &'static str = "mock.AppBundleState";
    type Outputs = AppBundleOutputs;

    fn outputs(&self) -> Self::Outputs {
        AppBundleOutputs {
            bundle_id: self.bundle_id.clone(),
        }
    }

    fn from_parts(resource: ResourceRef, outputs: Self::Outputs) -> Self {
        Self {
            resource,
            bundle_id: outputs.bundle_id,
        }
    }
}

/// Provisioning profile bound to a bundle id read from its dependency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub bundle_id: String,
    #[serde(skip)]
    pub depends: Vec<ResourceRef>,
}

impl Resource for Profile {
    fn id(&self) -> &str {
        &self.id
    }

    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn dependencies(&self) -> Vec<ResourceRef> {
        self.depends.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl ResourceRecord for Profile {
    const TYPE_TAG: &'static str = "mock.Profile";

    fn attach_dependencies(&mut self, dependencies: Vec<ResourceRef>) {
        self.depends = dependencies;
    }
}

/// Pointer to an externally managed object the engine only observes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct External {
    pub id: String,
}

impl Resource for External {
    fn id(&self) -> &str {
        &self.id
    }

    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn read_only(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl ResourceRecord for External {
    const TYPE_TAG: &'static str = "mock.External";
}

/// A resource type no provider claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Orphan {
    pub id: String,
}

impl Resource for Orphan {
    fn id(&self) -> &str {
        &self.id
    }

    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl ResourceRecord for Orphan {
    const TYPE_TAG: &'static str = "mock.Orphan";
}

// ============================================================================
// In-memory provider
// ============================================================================

/// Provider simulating an external system in memory.
///
/// Handles create/read/update/delete for the test resource families,
/// records every call, and can be told which ids exist externally and
/// which operations should fail.
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    pub existing: Arc<Mutex<HashSet<String>>>,
    pub fail_on: Arc<Mutex<HashSet<String>>>,
    pub calls: Arc<Mutex<Vec<String>>>,
    pub initialized: Arc<Mutex<usize>>,
    pub disposed: Arc<Mutex<usize>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_existing(&self, id: &str) {
        self.existing.lock().unwrap().insert(id.to_string());
    }

    pub fn fail_on(&self, id: &str) {
        self.fail_on.lock().unwrap().insert(id.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_failure(&self, id: &str) -> Result<()> {
        if self.fail_on.lock().unwrap().contains(id) {
            Err(Error::Provider(format!("injected failure for '{id}'")))
        } else {
            Ok(())
        }
    }

    fn realize(&self, resource: &ResourceRef) -> StateRef {
        if let Some(bundle) = resource.downcast_ref::<AppBundle>() {
            Arc::new(AppBundleState {
                resource: resource.clone(),
                bundle_id: format!("com.example.{}", bundle.prefix),
            })
        } else if resource.downcast_ref::<Service>().is_some() {
            Arc::new(ServiceState {
                resource: resource.clone(),
                address: format!("10.0.0.{}", resource.id().len()),
            })
        } else {
            Arc::new(BaseResourceState::new(resource.clone()))
        }
    }
}

impl Provider for MemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    fn version(&self) -> &str {
        "0.1.0"
    }

    fn handles(&self) -> &[&str] {
        &[
            Service::TYPE_TAG,
            AppBundle::TYPE_TAG,
            Profile::TYPE_TAG,
            External::TYPE_TAG,
        ]
    }

    fn initialize(&self) -> Result<()> {
        *self.initialized.lock().unwrap() += 1;
        Ok(())
    }

    fn dispose(&self) -> Result<()> {
        *self.disposed.lock().unwrap() += 1;
        Ok(())
    }

    fn create(&self, resource: &ResourceRef) -> Result<StateRef> {
        self.record(format!("create:{}", resource.id()));
        self.check_failure(resource.id())?;
        self.mark_existing(resource.id());
        Ok(self.realize(resource))
    }

    fn read(&self, resource: &ResourceRef) -> Result<StateRef> {
        self.record(format!("read:{}", resource.id()));
        if !self.existing.lock().unwrap().contains(resource.id()) {
            return Err(Error::ResourceNotFound {
                id: resource.id().to_string(),
            });
        }
        Ok(self.realize(resource))
    }

    fn update(&self, _current: &StateRef, desired: &ResourceRef) -> Result<StateRef> {
        self.record(format!("update:{}", desired.id()));
        self.check_failure(desired.id())?;
        Ok(self.realize(desired))
    }

    fn delete(&self, state: &StateRef) -> Result<()> {
        let id = state.resource().id().to_string();
        self.record(format!("delete:{id}"));
        self.check_failure(&id)?;
        self.existing.lock().unwrap().remove(&id);
        Ok(())
    }
}

// ============================================================================
// Stack construction helpers
// ============================================================================

/// Register every test record type with a stack's registry.
pub fn register_all(registry: &mut TypeRegistry) {
    registry.register_resource::<Service>();
    registry.register_resource::<AppBundle>();
    registry.register_resource::<Profile>();
    registry.register_resource::<External>();
    registry.register_resource::<Orphan>();
    registry.register_state::<ServiceState>();
    registry.register_state::<AppBundleState>();
}

/// Stack bound to a state file inside the given temp dir, with the test
/// registry and an attached [`MemoryProvider`].
pub fn stack_in(dir: &TempDir, name: &str) -> (Stack, MemoryProvider) {
    let provider = MemoryProvider::new();
    let store = StateStore::at(dir.path().join("state.json"));
    let mut stack = Stack::new(name, store);
    register_all(stack.registry_mut());
    stack.add_provider(provider.clone());
    (stack, provider)
}
