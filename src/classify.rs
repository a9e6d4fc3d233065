//! Dependency classification
//!
//! Every captured value falls into exactly one kind. Modules, classes and
//! functions that ship with the interpreter or with a versioned package are
//! pinned by name and version. Functions from unversioned code are hashed
//! recursively by the engine. Everything else is serialized canonically and
//! digested.

use std::sync::Arc;

use codehash_core::{canonical_repr, hash_text, Class, Function, HashHook, HashingError, Module, Runtime, Value};

/// The kind a captured value is classified as.
#[derive(Debug, Clone)]
pub enum Dependency<'v> {
    Module(&'v Module),
    Class(&'v Class),
    Function(&'v Arc<Function>),
    Composite(&'v Value),
}

impl<'v> Dependency<'v> {
    pub fn of(value: &'v Value) -> Self {
        match value {
            Value::Module(module) => Dependency::Module(module),
            Value::Class(class) => Dependency::Class(class),
            Value::Function(function) => Dependency::Function(function),
            other => Dependency::Composite(other),
        }
    }
}

/// Where a module's code comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provenance {
    Stdlib,
    Versioned(String),
    Unversioned,
}

impl Provenance {
    /// Provenance of the module registered as `module_name`. A name with no
    /// registered module is never stdlib but may still inherit a version
    /// from a registered parent package.
    pub fn of(runtime: &Runtime, module_name: &str) -> Self {
        if runtime.module(module_name).is_some_and(|module| runtime.is_stdlib(&module)) {
            return Provenance::Stdlib;
        }
        match runtime.version_of(module_name) {
            Some(version) => Provenance::Versioned(version),
            None => Provenance::Unversioned,
        }
    }

    /// `name(stdlib)` or `name(version)`; `None` when unversioned.
    pub fn pin(&self, name: &str) -> Option<String> {
        match self {
            Provenance::Stdlib => Some(format!("{name}(stdlib)")),
            Provenance::Versioned(version) => Some(format!("{name}({version})")),
            Provenance::Unversioned => None,
        }
    }
}

pub fn module_token(runtime: &Runtime, module: &Module) -> Result<String, HashingError> {
    let provenance = if runtime.is_stdlib(module) {
        Provenance::Stdlib
    } else if let Some(version) = module.version() {
        Provenance::Versioned(version.to_string())
    } else {
        Provenance::of(runtime, module.name())
    };
    provenance
        .pin(module.name())
        .ok_or_else(|| HashingError::UnversionedModule(module.name().to_string()))
}

/// Classes cannot be hashed structurally, so an unversioned class is a
/// failure.
pub fn class_token(runtime: &Runtime, class: &Class) -> Result<String, HashingError> {
    Provenance::of(runtime, class.module())
        .pin(&class.fullname())
        .ok_or_else(|| HashingError::UnversionedClass(class.fullname()))
}

/// Pinned token of a function from stdlib or a versioned package. `None`
/// means the function has to be hashed from its code.
pub fn function_token(runtime: &Runtime, function: &Function) -> Option<String> {
    Provenance::of(runtime, function.module()).pin(&function.fullname())
}

/// `composite:` followed by the digest of the value's canonical text.
pub fn composite_token(value: &Value, hook: Option<&HashHook>) -> Result<String, HashingError> {
    let text = canonical_repr(value, hook)?;
    Ok(format!("composite:{}", hash_text(&text)))
}
