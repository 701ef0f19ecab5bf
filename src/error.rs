//! Runtime error taxonomy.
//!
//! Structural errors raised during `setup`/`mount` are not caught
//! internally: they propagate to the host wrapper, which owns user-visible
//! behavior. Async subtree failures never surface here at all; they route
//! into the failing node's bound `error`/`status` reactors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The render function produced no content for a component that is
    /// expected to render. Fatal, surfaced to the caller of `mount`.
    #[error("component `{0}` rendered an empty tree")]
    EmptyRender(String),

    /// A component reference was used before its module was registered.
    /// Callers that can wait should use the registry readiness gate
    /// instead of failing.
    #[error("component `{0}` is not registered yet")]
    NotReady(String),

    /// A component name was registered twice.
    #[error("component `{0}` is already registered")]
    AlreadyDefined(String),

    /// A captured expression closed a scope it never opened. Fatal at
    /// setup time; the subtree must not mount.
    #[error("unbalanced scope in captured expression: {0}")]
    UnsupportedStructure(String),

    /// A derived reactor's dependency set would close a cycle in the
    /// relation graph. Rejected at construction; cycles are unsupported.
    #[error("reactive relation would form a dependency cycle")]
    CyclicRelation,
}
