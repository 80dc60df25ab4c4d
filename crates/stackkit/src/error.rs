//! Error types for the stackkit engine.
//!
//! Errors are grouped into stable categories so callers (and the executor's
//! continue-past-failure policy) can tell fatal conditions apart from
//! per-operation failures without matching on every variant.

use thiserror::Error;

use crate::codec::CodecError;
use crate::store::StateError;

/// Stable error categories.
///
/// The category determines how the engine reacts: validation and state
/// errors abort a run before or during execution, provider errors are
/// recorded per operation, and a missing provider always terminates the
/// whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Planner or serializer rejected the input
    Validation,
    /// A provider could not find the external object
    ResourceNotFound,
    /// No provider in the stack can handle a resource
    ProviderNotFound,
    /// State store load/save/lock failure
    State,
    /// Any other failure inside a provider operation
    Provider,
}

impl ErrorKind {
    /// Whether an error of this category terminates the whole run.
    ///
    /// Non-fatal errors are recorded as per-operation failures; the run
    /// continues but refuses to persist state.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ProviderNotFound | Self::State)
    }
}

/// A resource whose dependency list names ids missing from the plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingDependency {
    /// Id of the resource naming the dependencies
    pub resource_id: String,
    /// Dependency ids not managed by the plan
    pub missing: Vec<String>,
}

impl std::fmt::Display for MissingDependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> [{}]", self.resource_id, self.missing.join(", "))
    }
}

/// Errors produced by the engine.
#[derive(Error, Debug)]
pub enum Error {
    /// Generic validation failure with a human-readable reason
    #[error("validation failed: {0}")]
    Validation(String),

    /// One or more resources depend on ids not managed by the plan
    #[error("missing dependencies: {}", format_missing(.0))]
    MissingDependencies(Vec<MissingDependency>),

    /// The dependency relationships do not form a DAG
    #[error("dependency cycle among resources: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),

    /// A read-only resource does not exist externally
    #[error("read-only resource '{id}' does not exist externally")]
    ReadOnlyMissing {
        /// Id of the read-only resource
        id: String,
    },

    /// A provider `read` could not find the external object
    #[error("resource not found: {id}")]
    ResourceNotFound {
        /// Id of the resource that was not found
        id: String,
    },

    /// No provider in the stack claims the resource
    #[error("no provider can handle resource '{id}' ({type_tag})")]
    ProviderNotFound {
        /// Id of the unhandled resource
        id: String,
        /// Type tag of the unhandled resource
        type_tag: String,
    },

    /// State store failure
    #[error(transparent)]
    State(#[from] StateError),

    /// Encoding or decoding failure in the type registry
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Failure inside a provider create/read/update/delete
    #[error("provider error: {0}")]
    Provider(String),

    /// An engine invariant was violated
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// The stable category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_)
            | Error::MissingDependencies(_)
            | Error::DependencyCycle(_)
            | Error::ReadOnlyMissing { .. }
            | Error::Codec(_)
            | Error::Internal(_) => ErrorKind::Validation,
            Error::ResourceNotFound { .. } => ErrorKind::ResourceNotFound,
            Error::ProviderNotFound { .. } => ErrorKind::ProviderNotFound,
            Error::State(_) => ErrorKind::State,
            Error::Provider(_) => ErrorKind::Provider,
        }
    }

    /// Whether this error terminates the whole run instead of being
    /// recorded as a per-operation failure.
    pub fn is_fatal(&self) -> bool {
        self.kind().is_fatal()
    }
}

fn format_missing(missing: &[MissingDependency]) -> String {
    missing
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_kinds() {
        assert!(ErrorKind::ProviderNotFound.is_fatal());
        assert!(ErrorKind::State.is_fatal());
        assert!(!ErrorKind::Validation.is_fatal());
        assert!(!ErrorKind::Provider.is_fatal());
        assert!(!ErrorKind::ResourceNotFound.is_fatal());
    }

    #[test]
    fn test_kind_mapping() {
        let err = Error::ProviderNotFound {
            id: "db".into(),
            type_tag: "test.Database".into(),
        };
        assert_eq!(err.kind(), ErrorKind::ProviderNotFound);
        assert!(err.is_fatal());

        let err = Error::Provider("boom".into());
        assert_eq!(err.kind(), ErrorKind::Provider);
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_missing_dependencies_message() {
        let err = Error::MissingDependencies(vec![MissingDependency {
            resource_id: "web".into(),
            missing: vec!["db".into(), "cache".into()],
        }]);
        let msg = err.to_string();
        assert!(msg.contains("web"));
        assert!(msg.contains("db"));
        assert!(msg.contains("cache"));
    }
}
