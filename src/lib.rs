//! Codehash: stable, content-derived identities for Python functions
//!
//! An identity changes whenever a function's code or anything it reads
//! from outside its parameters changes, and stays put under docstring,
//! comment, decorator and renaming edits.

pub mod cache;
pub mod classify;
pub mod engine;
pub mod manifest;
pub mod resolve;


pub use cache::IdentityCache;
pub use classify::{Dependency, Provenance};
pub use engine::{Engine, Explanation};
pub use manifest::Manifest;
pub use resolve::{ClosureVars, Partition};

pub use codehash_core::{
    Cell, Class, CodehashError, ConsistencyError, Function, FunctionId, HashHook, HashId, HashIdentity, HashingError,
    Module, Namespace, Opaque, Runtime, Settings, Value,
};
