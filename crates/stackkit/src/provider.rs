//! Provider contract.
//!
//! A provider adapts the engine to some external system, implementing CRUD
//! for one or more resource families. Providers encode their own per-type
//! routing internally; a provider handling several families switches on
//! the concrete resource type inside each method.

use crate::codec::JsonMap;
use crate::error::Result;
use crate::resource::ResourceRef;
use crate::state::StateRef;

/// Adapter implementing CRUD for a family of resource types.
///
/// `initialize` must be idempotent: the engine initializes providers
/// lazily on first use during an apply, and once up front during a
/// refresh. Implementations needing mutable setup manage interior state.
pub trait Provider: Send + Sync {
    /// Provider name, e.g. `"mock"`.
    fn name(&self) -> &str;

    /// Provider version string.
    fn version(&self) -> &str;

    /// Type tags this provider manages; the default [`can_handle`]
    /// (Provider::can_handle) matches against this list.
    fn handles(&self) -> &[&str] {
        &[]
    }

    /// Whether this provider claims the resource.
    fn can_handle(&self, resource: &ResourceRef) -> bool {
        self.handles().contains(&resource.type_tag())
    }

    /// Apply provider-specific configuration.
    fn configure(&self, config: &JsonMap) -> Result<()> {
        let _ = config;
        Ok(())
    }

    /// Prepare the provider for use. Idempotent.
    fn initialize(&self) -> Result<()> {
        Ok(())
    }

    /// Release provider resources.
    fn dispose(&self) -> Result<()> {
        Ok(())
    }

    /// Create the external object described by the resource.
    fn create(&self, resource: &ResourceRef) -> Result<StateRef>;

    /// Observe the external object, failing with a not-found error when it
    /// does not exist.
    fn read(&self, resource: &ResourceRef) -> Result<StateRef>;

    /// Converge the external object from its current state to the desired
    /// resource.
    fn update(&self, current: &StateRef, desired: &ResourceRef) -> Result<StateRef>;

    /// Remove the external object.
    fn delete(&self, state: &StateRef) -> Result<()>;
}

/// First provider in stack order claiming the resource, if any.
pub fn find_provider<'a>(
    providers: &'a [Box<dyn Provider>],
    resource: &ResourceRef,
) -> Option<&'a dyn Provider> {
    providers
        .iter()
        .find(|p| p.can_handle(resource))
        .map(|p| p.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::resource::Resource;
    use std::any::Any;

    #[derive(Debug)]
    struct Plain {
        id: String,
    }

    impl Resource for Plain {
        fn id(&self) -> &str {
            &self.id
        }

        fn type_tag(&self) -> &'static str {
            "test.Plain"
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct PlainProvider;

    impl Provider for PlainProvider {
        fn name(&self) -> &str {
            "plain"
        }

        fn version(&self) -> &str {
            "0.0.1"
        }

        fn handles(&self) -> &[&str] {
            &["test.Plain"]
        }

        fn create(&self, _resource: &ResourceRef) -> Result<StateRef> {
            Err(Error::Provider("unimplemented".into()))
        }

        fn read(&self, resource: &ResourceRef) -> Result<StateRef> {
            Err(Error::ResourceNotFound {
                id: resource.id().to_string(),
            })
        }

        fn update(&self, _current: &StateRef, _desired: &ResourceRef) -> Result<StateRef> {
            Err(Error::Provider("unimplemented".into()))
        }

        fn delete(&self, _state: &StateRef) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_default_can_handle_matches_type_tag() {
        let provider = PlainProvider;
        let handled = ResourceRef::new(Plain { id: "a".into() });
        assert!(provider.can_handle(&handled));
    }

    #[test]
    fn test_find_provider_in_stack_order() {
        let providers: Vec<Box<dyn Provider>> = vec![Box::new(PlainProvider)];
        let handled = ResourceRef::new(Plain { id: "a".into() });
        assert!(find_provider(&providers, &handled).is_some());
    }
}
