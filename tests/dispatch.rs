//! End-to-end dispatch tests: drive the CLI surface against an in-memory
//! provider and check the exit codes scripts rely on.

use std::any::Any;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use stackkit::codec::ResourceRecord;
use stackkit::error::{Error, Result};
use stackkit::{
    BaseResourceState, Provider, Resource, ResourceRef, Stack, StateRef, StateStore,
};
use tempfile::TempDir;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Doc {
    id: String,
    body: String,
}

impl Resource for Doc {
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

impl ResourceRecord for Doc {
    const TYPE_TAG: &'static str = "docs.Doc";
}

#[derive(Debug, Default)]
struct DocProvider {
    fail_create: bool,
}

impl Provider for DocProvider {
    fn name(&self) -> &str {
        "docs"
    }

    fn version(&self) -> &str {
        "0.1.0"
    }

    fn handles(&self) -> &[&str] {
        &[Doc::TYPE_TAG]
    }

    fn create(&self, resource: &ResourceRef) -> Result<StateRef> {
        if self.fail_create {
            return Err(Error::Provider("create rejected".into()));
        }
        Ok(Arc::new(BaseResourceState::new(resource.clone())))
    }

    fn read(&self, resource: &ResourceRef) -> Result<StateRef> {
        Ok(Arc::new(BaseResourceState::new(resource.clone())))
    }

    fn update(&self, _current: &StateRef, desired: &ResourceRef) -> Result<StateRef> {
        Ok(Arc::new(BaseResourceState::new(desired.clone())))
    }

    fn delete(&self, _state: &StateRef) -> Result<()> {
        Ok(())
    }
}

fn stack_in(dir: &TempDir, fail_create: bool) -> Stack {
    let mut stack = Stack::new("docs", StateStore::at(dir.path().join("state.json")));
    stack.registry_mut().register_resource::<Doc>();
    stack.add_provider(DocProvider { fail_create });
    stack.add_resource(ResourceRef::new(Doc {
        id: "readme".into(),
        body: "hello".into(),
    }));
    stack
}

#[test]
fn plan_exits_zero() {
    let dir = TempDir::new().unwrap();
    let stack = stack_in(&dir, false);
    assert_eq!(drft::run_with_args(&stack, ["drft", "plan"]), 0);
    assert_eq!(drft::run_with_args(&stack, ["drft", "plan", "--json"]), 0);
}

#[test]
fn apply_then_replan_is_clean() {
    let dir = TempDir::new().unwrap();
    let stack = stack_in(&dir, false);

    assert_eq!(
        drft::run_with_args(&stack, ["drft", "apply", "--auto-approve"]),
        0
    );
    assert!(dir.path().join("state.json").exists());

    let plan = stack.plan(false).unwrap();
    assert!(plan.is_empty());
}

#[test]
fn failed_apply_exits_one() {
    let dir = TempDir::new().unwrap();
    let stack = stack_in(&dir, true);

    assert_eq!(
        drft::run_with_args(&stack, ["drft", "apply", "--auto-approve"]),
        1
    );
    assert!(!dir.path().join("state.json").exists());
}

#[test]
fn destroy_removes_managed_resources() {
    let dir = TempDir::new().unwrap();
    let stack = stack_in(&dir, false);

    assert_eq!(
        drft::run_with_args(&stack, ["drft", "apply", "--auto-approve"]),
        0
    );
    assert_eq!(
        drft::run_with_args(&stack, ["drft", "destroy", "--auto-approve"]),
        0
    );

    let persisted = stack.store().load(stack.registry()).unwrap();
    assert!(persisted.resources.is_empty());
}

#[test]
fn refresh_exits_zero_and_rewrites_state() {
    let dir = TempDir::new().unwrap();
    let stack = stack_in(&dir, false);

    assert_eq!(drft::run_with_args(&stack, ["drft", "refresh"]), 0);

    let persisted = stack.store().load(stack.registry()).unwrap();
    assert!(persisted.contains("readme"));
}

#[test]
fn bad_arguments_exit_nonzero() {
    let dir = TempDir::new().unwrap();
    let stack = stack_in(&dir, false);
    assert_ne!(drft::run_with_args(&stack, ["drft", "no-such-command"]), 0);
}
