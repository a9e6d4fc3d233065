//! Error types
//!
//! Two failure classes are kept apart. [`CodehashError::Unhashable`] is a
//! recoverable, diagnosable failure to assign a token to one dependency.
//! [`CodehashError::Consistency`] means a precondition of the algorithm was
//! violated (unbound name, malformed source) and signals a programming error.

use thiserror::Error;

/// Why a single value could not be given a token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HashingError {
    #[error("unknown object: {0}")]
    UnknownObject(String),

    #[error("dictionary keys are not mutually comparable: {0}")]
    IncomparableKeys(String),

    #[error("module {0} is neither part of the standard library nor versioned")]
    UnversionedModule(String),

    #[error("class {0} is defined in a module with no discoverable version")]
    UnversionedClass(String),
}

/// A violated precondition of the identity algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsistencyError {
    #[error("{function} reads names that are bound nowhere: {}", names.join(", "))]
    Unbound { function: String, names: Vec<String> },

    #[error("source of {function} is not a single function definition")]
    NotAFunction { function: String },

    #[error("source of {function} is unavailable")]
    SourceUnavailable { function: String },

    #[error("parser failure: {0}")]
    Parser(String),
}

/// Error returned by identity computation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodehashError {
    #[error("in {function} cannot hash global {name} = {value}")]
    Unhashable {
        function: String,
        name: String,
        value: String,
        #[source]
        reason: HashingError,
    },

    #[error("internal consistency violation: {0}")]
    Consistency(#[from] ConsistencyError),
}

impl CodehashError {
    pub fn is_consistency_violation(&self) -> bool {
        matches!(self, CodehashError::Consistency(_))
    }

    pub fn is_unhashable(&self) -> bool {
        matches!(self, CodehashError::Unhashable { .. })
    }
}
