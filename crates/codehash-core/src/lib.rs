//! Codehash core: value model, module registry, canonical serializer

pub mod model;
pub mod runtime;
pub mod serialize;
pub mod digest;
pub mod error;
pub mod settings;



pub use model::{Cell, Class, Function, FunctionId, HashHook, HashId, HashIdentity, Module, Namespace, Opaque, Value};
pub use runtime::{Runtime, BUILTINS_MODULE};
pub use serialize::{canonical_record, canonical_repr};
pub use digest::hash_text;
pub use error::{CodehashError, ConsistencyError, HashingError};
pub use settings::{Settings, SettingsError, COMPILED_MODULES};
