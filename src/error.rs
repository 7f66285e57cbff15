//! Error types for the interception engine.

use crate::events::EventKind;
use crate::heap::{ObjectId, ProxyId};
use thiserror::Error;

/// Errors raised by registration, graph operations, and configuration.
///
/// Failures raised by native function bodies travel through unchanged as
/// whatever variant the body returned (usually [`EngineError::Thrown`]).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// The event kind is not one of the five observable kinds.
    #[error("There is no {0} event")]
    InvalidEvent(String),

    /// No callback was supplied for the event kind.
    #[error("callback for {0} is undefined")]
    InvalidCallback(EventKind),

    #[error("{0} is not an object")]
    NotAnObject(String),

    #[error("{0} is not a function")]
    NotCallable(String),

    #[error("{0} is not a constructor")]
    NotConstructor(String),

    #[error("{0} not found")]
    ObjectNotFound(ObjectId),

    #[error("{0} not found")]
    ProxyNotFound(ProxyId),

    #[error("prototype chain cycle detected")]
    PrototypeCycle,

    #[error("prototype chain depth {depth} exceeds max {max}")]
    PrototypeChainTooDeep { depth: u32, max: u32 },

    /// The graph cannot be rendered as JSON because it refers back to itself.
    #[error("cyclic value at {0}")]
    Cyclic(String),

    /// An array is too long to render, usually because of a sparse write.
    #[error("array at {at} has length {length}, over the export limit of {max}")]
    ArrayTooLong { at: String, length: usize, max: usize },

    /// A native function body failed.
    #[error("{0}")]
    Thrown(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl EngineError {
    /// Shorthand for native bodies that want to fail with a message.
    pub fn thrown(message: impl Into<String>) -> Self {
        EngineError::Thrown(message.into())
    }
}
