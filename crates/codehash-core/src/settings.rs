//! Engine settings, loadable from TOML

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for settings loading.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Default for [`Settings::compiled_modules`]: the builtin modules of a
/// CPython build that ship without a source file.
pub const COMPILED_MODULES: &[&str] = &[
    "builtins", "sys", "_abc", "_codecs", "_collections", "_functools", "_imp", "_io", "_locale",
    "_operator", "_signal", "_sre", "_stat", "_string", "_symtable", "_thread", "_tokenize",
    "_tracemalloc", "_typing", "_warnings", "_weakref", "atexit", "errno", "faulthandler", "gc",
    "itertools", "marshal", "posix", "pwd", "time",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Modules whose install directories mark the standard library.
    pub stdlib_probes: Vec<String>,
    /// Modules compiled into the interpreter. Only these count as standard
    /// library when they have no file.
    pub compiled_modules: Vec<String>,
    /// Whether computed identities are memoized per function object.
    pub cache_identities: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            stdlib_probes: vec!["os".to_string(), "ast".to_string()],
            compiled_modules: COMPILED_MODULES.iter().map(|name| name.to_string()).collect(),
            cache_identities: true,
        }
    }
}

impl Settings {
    pub fn from_toml_str(text: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}
