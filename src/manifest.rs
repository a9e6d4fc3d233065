//! TOML manifest describing a host environment
//!
//! ```toml
//! [settings]
//! stdlib_probes = ["os", "ast"]
//!
//! [[modules]]
//! name = "os"
//! file = "/usr/lib/python3.12/os.py"
//!
//! [[modules]]
//! name = "app.jobs"
//! source = "app/jobs.py"
//! [modules.globals]
//! THRESHOLD = 3
//! ```
//!
//! Every module is registered before any namespace is populated, and
//! imports are bound after every module's own definitions, repeatedly until
//! no more resolve, so modules may be listed in any order.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use codehash_core::{Class, Function, Module, Runtime, Settings, Value};
use codehash_syntax::{module_items, ModuleItem, ParserPool};
use serde::Deserialize;

use crate::engine::Engine;

#[derive(Debug, Deserialize)]
struct ManifestFile {
    #[serde(default)]
    settings: Settings,
    #[serde(default)]
    modules: Vec<ModuleEntry>,
}

#[derive(Debug, Deserialize)]
struct ModuleEntry {
    name: String,
    file: Option<PathBuf>,
    version: Option<String>,
    /// Python source, relative to the manifest.
    source: Option<PathBuf>,
    #[serde(default)]
    globals: toml::Table,
}

/// A loaded manifest: its settings and the runtime it describes.
#[derive(Debug)]
pub struct Manifest {
    pub settings: Settings,
    pub runtime: Arc<Runtime>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_toml_str(&text, base_dir).with_context(|| format!("Invalid manifest {}", path.display()))
    }

    /// Parse a manifest; `source` paths are resolved against `base_dir`.
    pub fn from_toml_str(text: &str, base_dir: &Path) -> Result<Self> {
        let file: ManifestFile = toml::from_str(text)?;
        let runtime = Arc::new(Runtime::with_settings(&file.settings).with_python_builtins());
        let parsers = ParserPool::new();

        let mut loaded = Vec::with_capacity(file.modules.len());
        for entry in &file.modules {
            let source_path = entry.source.as_ref().map(|source| base_dir.join(source));
            let mut module = Module::new(&entry.name);
            // the source path stands in for an installed file
            if let Some(path) = entry.file.clone().or_else(|| source_path.clone()) {
                module = module.with_file(path);
            }
            if let Some(version) = &entry.version {
                module = module.with_version(version);
            }
            loaded.push((runtime.register(module), source_path));
        }

        let mut imports = Vec::new();
        for ((module, source_path), entry) in loaded.iter().zip(&file.modules) {
            for (name, value) in &entry.globals {
                module.globals().set(name, toml_value(value));
            }
            let Some(path) = source_path else {
                continue;
            };
            let source = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read source of {} from {}", module.name(), path.display()))?;
            let items = module_items(&parsers, &source)
                .with_context(|| format!("Failed to parse source of {}", module.name()))?;
            tracing::debug!("Loaded {} items from {}", items.len(), path.display());

            for item in items {
                match item {
                    ModuleItem::Function { name, source } => {
                        let function = Function::new(module.name(), &name, source);
                        module.globals().set(name, Arc::new(function));
                    }
                    ModuleItem::Class { name } => {
                        let class = Class::new(module.name(), &name);
                        module.globals().set(name, Arc::new(class));
                    }
                    import => imports.push((Arc::clone(module), import)),
                }
            }
        }

        // re-exported names only resolve once the re-exporting import is bound
        let mut pending = imports;
        loop {
            let before = pending.len();
            pending.retain(|(module, import)| match resolve_import(&runtime, import) {
                Some(value) => {
                    module.globals().set(import.binding(), value);
                    false
                }
                None => true,
            });
            if pending.is_empty() || pending.len() == before {
                break;
            }
        }
        for (module, import) in &pending {
            tracing::warn!("Skipping unresolvable import {:?} in {}", import, module.name());
        }

        Ok(Manifest {
            settings: file.settings,
            runtime,
        })
    }

    /// An engine over this manifest's runtime and settings.
    pub fn engine(&self) -> Engine {
        Engine::with_settings(Arc::clone(&self.runtime), self.settings.clone())
    }

    /// Look up a function by `module:name`.
    pub fn function(&self, target: &str) -> Result<Arc<Function>> {
        let Some((module_name, name)) = target.split_once(':') else {
            bail!("Expected module:function, got {target:?}");
        };
        let module = self
            .runtime
            .module(module_name)
            .with_context(|| format!("Module {module_name} is not in the manifest"))?;
        match module.globals().get(name) {
            Some(Value::Function(function)) => Ok(function),
            Some(other) => bail!("{target} is a {}, not a function", other.kind_name()),
            None => bail!("Module {module_name} has no global named {name}"),
        }
    }
}

fn resolve_import(runtime: &Runtime, import: &ModuleItem) -> Option<Value> {
    match import {
        ModuleItem::Import { module, .. } => runtime.module(module).map(Value::Module),
        ModuleItem::ImportFrom { module, name, .. } => runtime
            .module(&format!("{module}.{name}"))
            .map(Value::Module)
            .or_else(|| runtime.module(module)?.globals().get(name)),
        ModuleItem::Function { .. } | ModuleItem::Class { .. } => None,
    }
}

fn toml_value(value: &toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::str(s),
        toml::Value::Integer(i) => Value::Int(*i),
        toml::Value::Float(x) => Value::Float(*x),
        toml::Value::Boolean(b) => Value::Bool(*b),
        toml::Value::Datetime(datetime) => Value::str(datetime.to_string()),
        toml::Value::Array(items) => Value::list(items.iter().map(toml_value)),
        toml::Value::Table(table) => Value::dict(table.iter().map(|(key, item)| (Value::str(key), toml_value(item)))),
    }
}
