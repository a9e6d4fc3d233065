//! Host value model: modules, classes, functions and the values they capture

use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// An identity token. Digests are lowercase hex; tokens returned by hooks and
/// self-describing objects are used verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HashId(String);

impl HashId {
    pub fn new(token: impl Into<String>) -> Self {
        HashId(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HashId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HashId {
    fn from(token: &str) -> Self {
        HashId(token.to_string())
    }
}

impl From<String> for HashId {
    fn from(token: String) -> Self {
        HashId(token)
    }
}

/// Object identity of a [`Function`]. Allocated once per function value and
/// never reused within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(u64);

impl FunctionId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        FunctionId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// Capability of objects that know how to identify themselves.
pub trait HashIdentity {
    /// Token used verbatim as the object's identity contribution.
    fn identity(&self) -> HashId;
}

/// A host object the serializer does not decompose.
pub trait Opaque: Any + fmt::Debug + Send + Sync {
    /// Type name used in diagnostics, e.g. `Model`.
    fn type_name(&self) -> &str;

    /// Returns the self-describing capability when the object has one.
    fn hash_identity(&self) -> Option<&dyn HashIdentity> {
        None
    }

    /// Lets hooks downcast to the concrete type.
    fn as_any(&self) -> &dyn Any;
}

/// Caller-supplied fallback for opaque values. Returns `None` to decline.
pub type HashHook = dyn Fn(&Value) -> Option<HashId> + Send + Sync;

/// Any value a function can read from outside its own parameters.
#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    /// Key/value pairs in insertion order.
    Dict(Vec<(Value, Value)>),
    Module(Arc<Module>),
    Class(Arc<Class>),
    Function(Arc<Function>),
    Object(Arc<dyn Opaque>),
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(items.into_iter().collect())
    }

    pub fn tuple(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Tuple(items.into_iter().collect())
    }

    pub fn dict<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<Value>,
        V: Into<Value>,
    {
        Value::Dict(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    pub fn object(obj: impl Opaque) -> Self {
        Value::Object(Arc::new(obj))
    }

    /// Short description of the value's kind, e.g. `list` or `function`.
    pub fn kind_name(&self) -> &str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Module(_) => "module",
            Value::Class(_) => "type",
            Value::Function(_) => "function",
            Value::Object(obj) => obj.type_name(),
        }
    }

    /// Human-readable rendering for error messages. Not used for hashing.
    pub fn repr(&self) -> String {
        match self {
            Value::None => "None".to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(x) => format!("{x:?}"),
            Value::Str(s) => format!("{s:?}"),
            Value::Bytes(b) => format!("b\"{}\"", b.escape_ascii()),
            Value::List(items) => format!("[{}]", join_reprs(items)),
            Value::Tuple(items) if items.len() == 1 => format!("({},)", items[0].repr()),
            Value::Tuple(items) => format!("({})", join_reprs(items)),
            Value::Dict(pairs) => {
                let inner: Vec<String> = pairs
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.repr(), v.repr()))
                    .collect();
                format!("{{{}}}", inner.join(", "))
            }
            Value::Module(m) => format!("<module '{}'>", m.name()),
            Value::Class(c) => format!("<class '{}.{}'>", c.module(), c.qualname()),
            Value::Function(f) => format!("<function {}.{}>", f.module(), f.qualname()),
            Value::Object(obj) => format!("<{} object>", obj.type_name()),
        }
    }
}

fn join_reprs(items: &[Value]) -> String {
    items.iter().map(Value::repr).collect::<Vec<_>>().join(", ")
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Arc<Module>> for Value {
    fn from(m: Arc<Module>) -> Self {
        Value::Module(m)
    }
}

impl From<Arc<Class>> for Value {
    fn from(c: Arc<Class>) -> Self {
        Value::Class(c)
    }
}

impl From<Arc<Function>> for Value {
    fn from(f: Arc<Function>) -> Self {
        Value::Function(f)
    }
}

/// A captured binding shared between a closure and the scope that created it.
#[derive(Debug, Default)]
pub struct Cell {
    contents: RwLock<Option<Value>>,
}

impl Cell {
    pub fn new(value: impl Into<Value>) -> Self {
        Cell {
            contents: RwLock::new(Some(value.into())),
        }
    }

    /// A cell whose variable has not been assigned yet.
    pub fn empty() -> Self {
        Cell::default()
    }

    pub fn shared(value: impl Into<Value>) -> Arc<Self> {
        Arc::new(Cell::new(value))
    }

    pub fn get(&self) -> Option<Value> {
        self.contents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set(&self, value: impl Into<Value>) {
        *self.contents.write().unwrap_or_else(PoisonError::into_inner) = Some(value.into());
    }
}

/// A Python function object: source text plus the cells it closes over.
#[derive(Debug)]
pub struct Function {
    id: FunctionId,
    qualname: String,
    module: String,
    source: Option<String>,
    closure: Vec<(String, Arc<Cell>)>,
}

impl Function {
    pub fn new(module: impl Into<String>, qualname: impl Into<String>, source: impl Into<String>) -> Self {
        Function {
            id: FunctionId::next(),
            qualname: qualname.into(),
            module: module.into(),
            source: Some(source.into()),
            closure: Vec::new(),
        }
    }

    /// A function implemented by the runtime itself; it has no source.
    pub fn builtin(module: impl Into<String>, qualname: impl Into<String>) -> Self {
        Function {
            id: FunctionId::next(),
            qualname: qualname.into(),
            module: module.into(),
            source: None,
            closure: Vec::new(),
        }
    }

    /// Adds a free variable and the cell that backs it.
    pub fn with_closure(mut self, name: impl Into<String>, cell: Arc<Cell>) -> Self {
        self.closure.push((name.into(), cell));
        self
    }

    pub fn id(&self) -> FunctionId {
        self.id
    }

    /// Last component of the qualified name.
    pub fn name(&self) -> &str {
        self.qualname.rsplit('.').next().unwrap_or(&self.qualname)
    }

    pub fn qualname(&self) -> &str {
        &self.qualname
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// `module:qualname`
    pub fn fullname(&self) -> String {
        format!("{}:{}", self.module, self.qualname)
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn cell(&self, name: &str) -> Option<&Arc<Cell>> {
        self.closure
            .iter()
            .find(|(free, _)| free == name)
            .map(|(_, cell)| cell)
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<function {}.{}>", self.module, self.qualname)
    }
}

/// A class object. Only its defining module and name matter for hashing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Class {
    qualname: String,
    module: String,
}

impl Class {
    pub fn new(module: impl Into<String>, qualname: impl Into<String>) -> Self {
        Class {
            qualname: qualname.into(),
            module: module.into(),
        }
    }

    pub fn name(&self) -> &str {
        self.qualname.rsplit('.').next().unwrap_or(&self.qualname)
    }

    pub fn qualname(&self) -> &str {
        &self.qualname
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn fullname(&self) -> String {
        format!("{}:{}", self.module, self.qualname)
    }
}

/// A loaded module: dotted name, install location, version and globals.
#[derive(Debug)]
pub struct Module {
    name: String,
    file: Option<PathBuf>,
    version: Option<String>,
    globals: Namespace,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Module {
            name: name.into(),
            file: None,
            version: None,
            globals: Namespace::new(),
        }
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    /// The module's `__version__`, if it declares a non-empty one.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref().filter(|v| !v.is_empty())
    }

    pub fn globals(&self) -> &Namespace {
        &self.globals
    }
}

/// A mutable name -> value mapping. Thread-safe for concurrent access.
#[derive(Debug, Default)]
pub struct Namespace {
    bindings: DashMap<String, Value>,
}

impl Namespace {
    pub fn new() -> Self {
        Namespace {
            bindings: DashMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.bindings.get(name).map(|r| r.value().clone())
    }

    pub fn set(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.bindings.insert(name.into(), value.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
