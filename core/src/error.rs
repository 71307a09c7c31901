//! Error types for the world core.
//!
//! `CoreError` covers structural/programmer errors surfaced immediately;
//! `LoadError` covers per-object persistence failures, which are caught at
//! the granularity of one entity's one timer/plugin so the rest of the
//! world still loads.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// Dequeue or peek on an empty queue. A caller bug; never swallow this.
    #[error("dequeue/peek on empty queue")]
    EmptyQueue,

    /// A function timer was submitted without a registered function.
    #[error("function timer submitted without a function")]
    MissingFunction,

    /// Operation addressed an entity that does not exist (or was removed).
    #[error("no such entity #{0}")]
    NoSuchEntity(u64),
}

/// Per-object failure while loading a world save. Fatal to that one
/// object; the loader logs it and continues with the siblings.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("UnknownFunction: {0}")]
    UnknownFunction(String),

    #[error("UnknownDef: {0}")]
    UnknownDef(String),

    /// A field whose value could not be interpreted.
    #[error("line {line}: bad value '{value}' for field '{field}'")]
    BadValue {
        line: usize,
        field: String,
        value: String,
    },

    /// A required field was absent from the object's section.
    #[error("missing field '{0}'")]
    MissingField(&'static str),

    /// A section referenced an entity that was not declared in the save.
    #[error("unknown entity #{0}")]
    UnknownEntity(u64),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
