//! Plan-and-apply walkthrough with a provider that manages plain files.
//!
//! Run with `cargo run --example filestack`.

use std::any::Any;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use stackkit::codec::ResourceRecord;
use stackkit::error::{Error, Result};
use stackkit::{
    BaseResourceState, Provider, Resource, ResourceRef, Stack, StateRef, StateStore,
};

/// A note rendered to a file named after its id.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Note {
    id: String,
    text: String,
    #[serde(skip)]
    depends: Vec<ResourceRef>,
}

impl Resource for Note {
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

impl ResourceRecord for Note {
    const TYPE_TAG: &'static str = "files.Note";

    fn attach_dependencies(&mut self, dependencies: Vec<ResourceRef>) {
        self.depends = dependencies;
    }
}

/// Provider realizing notes as files under a sandbox directory.
#[derive(Debug)]
struct FileProvider {
    root: PathBuf,
}

impl FileProvider {
    fn path_of(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.txt"))
    }
}

impl Provider for FileProvider {
    fn name(&self) -> &str {
        "files"
    }

    fn version(&self) -> &str {
        "0.1.0"
    }

    fn handles(&self) -> &[&str] {
        &[Note::TYPE_TAG]
    }

    fn create(&self, resource: &ResourceRef) -> Result<StateRef> {
        let note = resource
            .downcast_ref::<Note>()
            .ok_or_else(|| Error::Provider(format!("unexpected type for '{}'", resource.id())))?;
        fs::write(self.path_of(&note.id), &note.text)
            .map_err(|e| Error::Provider(e.to_string()))?;
        Ok(Arc::new(BaseResourceState::new(resource.clone())))
    }

    fn read(&self, resource: &ResourceRef) -> Result<StateRef> {
        if !self.path_of(resource.id()).is_file() {
            return Err(Error::ResourceNotFound {
                id: resource.id().to_string(),
            });
        }
        Ok(Arc::new(BaseResourceState::new(resource.clone())))
    }

    fn update(&self, _current: &StateRef, desired: &ResourceRef) -> Result<StateRef> {
        self.create(desired)
    }

    fn delete(&self, state: &StateRef) -> Result<()> {
        fs::remove_file(self.path_of(state.resource().id()))
            .map_err(|e| Error::Provider(e.to_string()))
    }
}

fn main() -> Result<()> {
    let sandbox = std::env::temp_dir().join("stackkit-filestack");
    fs::create_dir_all(&sandbox).map_err(|e| Error::Provider(e.to_string()))?;

    let mut stack = Stack::new(
        "notes",
        StateStore::at(sandbox.join("state.json")),
    );
    stack.registry_mut().register_resource::<Note>();
    stack.add_provider(FileProvider {
        root: sandbox.clone(),
    });

    let intro = ResourceRef::new(Note {
        id: "intro".into(),
        text: "hello".into(),
        depends: Vec::new(),
    });
    stack.add_resource(intro.clone());
    stack.add_resource(ResourceRef::new(Note {
        id: "outro".into(),
        text: "goodbye".into(),
        depends: vec![intro],
    }));

    let plan = stack.plan(true)?;
    println!("planned {} operations:", plan.len());
    for op in &plan.operations {
        println!("  {} {}", op.kind(), op.resource().description());
    }

    let report = stack.apply(&plan)?;
    println!(
        "Successful: {} / Failed: {} / Total: {}",
        report.successful(),
        report.failed(),
        report.total()
    );

    // A second plan against the freshly persisted state is empty.
    let replan = stack.plan(false)?;
    println!("operations after convergence: {}", replan.len());

    Ok(())
}
