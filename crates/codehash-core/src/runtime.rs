//! Module registry and environment queries
//!
//! The [`Runtime`] stands in for the interpreter state the identity algorithm
//! consults: which module is loaded under a dotted name, whether that module
//! ships with the interpreter, and which version a package declares.

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;

use crate::model::{Class, Function, Module, Namespace, Value};
use crate::settings::Settings;

/// Name of the module holding the builtin namespace.
pub const BUILTINS_MODULE: &str = "builtins";

/// Directory names that hold third-party packages.
const THIRD_PARTY_DIRS: &[&str] = &["site-packages", "dist-packages"];

/// Builtin classes installed by [`Runtime::with_python_builtins`].
pub const PYTHON_BUILTIN_TYPES: &[&str] = &[
    "bool", "bytearray", "bytes", "complex", "dict", "enumerate", "filter", "float",
    "frozenset", "int", "list", "map", "memoryview", "object", "property", "range",
    "reversed", "set", "slice", "staticmethod", "classmethod", "str", "super", "tuple",
    "type", "zip", "BaseException", "Exception", "ArithmeticError", "AssertionError",
    "AttributeError", "ImportError", "IndexError", "KeyError", "LookupError",
    "NotImplementedError", "OSError", "RuntimeError", "StopIteration", "TypeError",
    "ValueError", "ZeroDivisionError",
];

/// Builtin functions and constants installed by [`Runtime::with_python_builtins`].
pub const PYTHON_BUILTIN_FUNCTIONS: &[&str] = &[
    "abs", "all", "any", "ascii", "bin", "callable", "chr", "delattr", "dir", "divmod",
    "format", "getattr", "globals", "hasattr", "hash", "hex", "id", "input", "isinstance",
    "issubclass", "iter", "len", "locals", "max", "min", "next", "oct", "open", "ord", "pow",
    "print", "repr", "round", "setattr", "sorted", "sum", "vars", "__import__",
];

/// Process-wide environment: loaded modules plus the builtin namespace.
pub struct Runtime {
    modules: DashMap<String, Arc<Module>>,
    builtins: Arc<Module>,
    stdlib_probes: Vec<String>,
    compiled_modules: Vec<String>,
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_settings(&Settings::default())
    }

    pub fn with_settings(settings: &Settings) -> Self {
        let builtins = Arc::new(Module::new(BUILTINS_MODULE));
        let modules = DashMap::new();
        modules.insert(BUILTINS_MODULE.to_string(), Arc::clone(&builtins));
        Runtime {
            modules,
            builtins,
            stdlib_probes: settings.stdlib_probes.clone(),
            compiled_modules: settings.compiled_modules.clone(),
        }
    }

    /// Populate the builtin namespace with the common Python builtins.
    pub fn with_python_builtins(self) -> Self {
        let namespace = self.builtins.globals();
        for name in PYTHON_BUILTIN_TYPES {
            namespace.set(*name, Arc::new(Class::new(BUILTINS_MODULE, *name)));
        }
        for name in PYTHON_BUILTIN_FUNCTIONS {
            namespace.set(*name, Arc::new(Function::builtin(BUILTINS_MODULE, *name)));
        }
        namespace.set("None", Value::None);
        namespace.set("True", Value::Bool(true));
        namespace.set("False", Value::Bool(false));
        namespace.set("__name__", Value::str(BUILTINS_MODULE));
        self
    }

    /// Register a module under its dotted name, replacing any previous one.
    pub fn register(&self, module: Module) -> Arc<Module> {
        let module = Arc::new(module);
        self.register_shared(Arc::clone(&module));
        module
    }

    pub fn register_shared(&self, module: Arc<Module>) {
        tracing::trace!("Registering module {}", module.name());
        self.modules.insert(module.name().to_string(), module);
    }

    pub fn module(&self, name: &str) -> Option<Arc<Module>> {
        self.modules.get(name).map(|r| Arc::clone(r.value()))
    }

    pub fn builtins(&self) -> &Namespace {
        self.builtins.globals()
    }

    /// The module whose namespace serves as `func`'s globals.
    pub fn globals_of(&self, func: &Function) -> Option<Arc<Module>> {
        self.module(func.module())
    }

    /// Install directories of the probe modules known to ship with the runtime.
    pub fn stdlib_roots(&self) -> Vec<PathBuf> {
        self.stdlib_probes
            .iter()
            .filter_map(|name| self.module(name))
            .filter_map(|module| module.file().and_then(|f| f.parent()).map(|p| p.to_path_buf()))
            .collect()
    }

    /// A module without a file is stdlib only if it is one of the
    /// configured compiled-in modules. Third-party install directories
    /// nested under a stdlib root never are.
    pub fn is_stdlib(&self, module: &Module) -> bool {
        let Some(file) = module.file() else {
            return self.compiled_modules.iter().any(|name| name == module.name());
        };
        let third_party = file
            .components()
            .any(|c| THIRD_PARTY_DIRS.iter().any(|dir| c.as_os_str() == *dir));
        !third_party && self.stdlib_roots().iter().any(|root| file.starts_with(root))
    }

    /// First non-empty version found walking from `pkg.sub.mod` up to `pkg`.
    pub fn version_of(&self, module_name: &str) -> Option<String> {
        let parts: Vec<&str> = module_name.split('.').collect();
        (1..=parts.len()).rev().find_map(|n| {
            let ancestor = self.module(&parts[..n].join("."))?;
            ancestor.version().map(str::to_string)
        })
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("module_count", &self.modules.len())
            .field("builtin_count", &self.builtins.globals().len())
            .field("stdlib_probes", &self.stdlib_probes)
            .finish()
    }
}
