//! Integration tests for codehash
//!
//! These tests drive the whole pipeline: normalization, resolution,
//! classification, the cache, the manifest loader and the binary.

use std::any::Any;
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use codehash::{
    Cell, Class, CodehashError, ConsistencyError, Engine, Function, HashId, HashIdentity, HashingError, Manifest,
    Module, Opaque, Runtime, Settings, Value,
};
use rayon::prelude::*;
use tempfile::TempDir;

const STDLIB_DIR: &str = "/usr/lib/python3.12";
const SITE_PACKAGES: &str = "/srv/venv/lib/python3.12/site-packages";

/// Builtins, `os`/`ast` as the standard library, a versioned `codehash`
/// package and an unversioned `scratch` module to define functions in.
fn runtime() -> Arc<Runtime> {
    let runtime = Runtime::new().with_python_builtins();
    runtime.register(Module::new("os").with_file(format!("{STDLIB_DIR}/os.py")));
    runtime.register(Module::new("ast").with_file(format!("{STDLIB_DIR}/ast.py")));
    let codehash = runtime.register(
        Module::new("codehash")
            .with_file(format!("{SITE_PACKAGES}/codehash/__init__.py"))
            .with_version("0.1.0"),
    );
    codehash.globals().set(
        "hash_text",
        Arc::new(Function::new("codehash", "hash_text", "def hash_text(text):\n    return text\n")),
    );
    runtime.register(Module::new("scratch").with_file("/home/user/scratch.py"));
    Arc::new(runtime)
}

fn scratch(runtime: &Runtime) -> Arc<Module> {
    runtime.module("scratch").expect("scratch module is registered")
}

/// A function in `scratch`, bound as a global under its own name.
fn define(runtime: &Runtime, name: &str, source: &str) -> Arc<Function> {
    let function = Arc::new(Function::new("scratch", name, source));
    scratch(runtime).globals().set(name, Arc::clone(&function));
    function
}

fn uncached(runtime: Arc<Runtime>) -> Engine {
    Engine::with_settings(
        runtime,
        Settings {
            cache_identities: false,
            ..Settings::default()
        },
    )
}

#[derive(Debug)]
struct Plain;

impl Opaque for Plain {
    fn type_name(&self) -> &str {
        "Plain"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
struct SelfDescribing;

impl HashIdentity for SelfDescribing {
    fn identity(&self) -> HashId {
        HashId::from("")
    }
}

impl Opaque for SelfDescribing {
    fn type_name(&self) -> &str {
        "SelfDescribing"
    }

    fn hash_identity(&self) -> Option<&dyn HashIdentity> {
        Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[test]
fn test_docstring() {
    let engine = Engine::new(runtime());
    let f = Function::new("scratch", "f", "def f():\n    return 1\n");
    let g = Function::new("scratch", "g", "def g():\n    \"\"\"Docstring.\"\"\"\n    return 1\n");
    assert_eq!(engine.hash_function(&f, None).unwrap(), engine.hash_function(&g, None).unwrap());
}

#[test]
fn test_whitespace() {
    let engine = Engine::new(runtime());
    let f = Function::new("scratch", "f", "    def f():\n\n        return 1\n");
    let g = Function::new("scratch", "g", "    def g():\n        return 1  # comment\n");
    assert_eq!(engine.hash_function(&f, None).unwrap(), engine.hash_function(&g, None).unwrap());
}

#[test]
fn test_decorators() {
    let engine = Engine::new(runtime());
    let f = Function::new("scratch", "f", "def f(x):\n    return x\n");
    let g = Function::new("scratch", "g", "@cache\n@route(\n    \"/g\",\n)\ndef g(x):\n    return x\n");
    assert_eq!(engine.hash_function(&f, None).unwrap(), engine.hash_function(&g, None).unwrap());
}

#[test]
fn test_different() {
    let engine = Engine::new(runtime());
    let f = Function::new("scratch", "f", "def f():\n    return 1\n");
    let g = Function::new("scratch", "g", "def g():\n    return 2\n");
    assert_ne!(engine.hash_function(&f, None).unwrap(), engine.hash_function(&g, None).unwrap());
}

#[test]
fn test_identity_is_hex_digest() {
    let engine = Engine::new(runtime());
    let f = Function::new("scratch", "f", "def f():\n    return 1\n");
    let hash = engine.hash_function(&f, None).unwrap();
    assert_eq!(hash.as_str().len(), 64);
    assert!(hash.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
}

#[test]
fn test_constant() {
    let runtime = runtime();
    let engine = Engine::new(Arc::clone(&runtime));
    scratch(&runtime).globals().set("dct", Value::dict([("a", 1i64)]));
    let source = "def f():\n    1\n    return dct\n";

    let h1 = engine.hash_function(&define(&runtime, "f", source), None).unwrap();
    scratch(&runtime).globals().set("dct", Value::dict([("a", 2i64)]));
    let h2 = engine.hash_function(&define(&runtime, "f", source), None).unwrap();
    assert_ne!(h1, h2);
}

#[test]
fn test_cell_mutation() {
    let runtime = runtime();
    let cell = Cell::shared(Value::list([Value::Int(1)]));
    let f = Function::new("scratch", "f", "def f():\n    return items\n").with_closure("items", Arc::clone(&cell));

    // the cache is keyed by function object, so observe the change uncached
    let engine = uncached(runtime);
    let before = engine.hash_function(&f, None).unwrap();
    cell.set(Value::list([Value::Int(2)]));
    let after = engine.hash_function(&f, None).unwrap();
    assert_ne!(before, after);
    assert!(engine.cache().is_empty());
}

#[test]
fn test_unhashable() {
    let runtime = runtime();
    scratch(&runtime).globals().set("obj", Value::object(Plain));
    let f = define(&runtime, "f", "def f():\n    return obj\n");

    let err = Engine::new(runtime).hash_function(&f, None).unwrap_err();
    assert!(err.is_unhashable());
    assert_eq!(err.to_string(), "in <function scratch.f> cannot hash global obj = <Plain object>");
    assert!(matches!(
        err,
        CodehashError::Unhashable {
            reason: HashingError::UnknownObject(_),
            ..
        }
    ));
}

#[test]
fn test_module() {
    let runtime = runtime();
    let globals = scratch(&runtime);
    globals.globals().set("os", runtime.module("os").unwrap());
    globals.globals().set("ast", runtime.module("ast").unwrap());
    globals.globals().set("codehash", runtime.module("codehash").unwrap());
    globals
        .globals()
        .set("hash_text", runtime.module("codehash").unwrap().globals().get("hash_text").unwrap());
    let f = define(&runtime, "f", "def f():\n    os\n    ast\n    codehash\n    hash_text('1')\n");

    let engine = Engine::new(runtime);
    let dependencies = engine.dependency_map(&f, None).unwrap();
    let expected: BTreeMap<String, String> = [
        ("ast", "ast(stdlib)"),
        ("codehash", "codehash(0.1.0)"),
        ("hash_text", "codehash:hash_text(0.1.0)"),
        ("os", "os(stdlib)"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    assert_eq!(dependencies, expected);
    engine.hash_function(&f, None).unwrap();
}

#[test]
fn test_unversioned_module() {
    let runtime = runtime();
    scratch(&runtime).globals().set("scratch", scratch(&runtime));
    let f = define(&runtime, "f", "def f():\n    return scratch\n");

    let err = Engine::new(runtime).hash_function(&f, None).unwrap_err();
    assert!(matches!(
        err,
        CodehashError::Unhashable {
            reason: HashingError::UnversionedModule(_),
            ..
        }
    ));
}

#[test]
fn test_fileless_user_module_is_not_stdlib() {
    let runtime = runtime();
    runtime.register(Module::new("app"));
    let g = define(&runtime, "g", "def g(x):\n    return helper(x)\n");
    let engine = uncached(Arc::clone(&runtime));

    let helper = |source: &str| Arc::new(Function::new("app", "helper", source));
    scratch(&runtime).globals().set("helper", helper("def helper(x):\n    return x\n"));
    let before = engine.hash_function(&g, None).unwrap();
    assert!(engine.dependency_map(&g, None).unwrap()["helper"].starts_with("function:"));

    scratch(&runtime).globals().set("helper", helper("def helper(x):\n    return -x\n"));
    let after = engine.hash_function(&g, None).unwrap();
    assert_ne!(before, after);
}

#[test]
fn test_formatting_does_not_change_identity() {
    let engine = Engine::new(runtime());
    let hash = |source: &str| engine.hash_function(&Function::new("scratch", "f", source), None).unwrap();
    assert_eq!(
        hash("def f(a):\n    return [a, 2]\n"),
        hash("def f(\n    a,\n):\n    return (\n        [\n            a,\n            2,\n        ]\n    )\n")
    );
    assert_ne!(hash("def f(a):\n    return (a,)\n"), hash("def f(a):\n    return (a)\n"));
}

#[test]
fn test_unhashable_class() {
    let class = Class::new("scratch", "test_unhashable_class.<locals>.C");
    let f = Function::new("scratch", "f", "def f():\n    C\n").with_closure("C", Cell::shared(Arc::new(class)));

    let err = Engine::new(runtime()).hash_function(&f, None).unwrap_err();
    assert!(err.is_unhashable());
    assert!(matches!(
        err,
        CodehashError::Unhashable {
            reason: HashingError::UnversionedClass(_),
            ..
        }
    ));
}

#[test]
fn test_composite_func() {
    let runtime = runtime();
    let engine = Engine::new(Arc::clone(&runtime));

    define(&runtime, "f", "def f():\n    return 1\n");
    let h1 = engine.hash_function(&define(&runtime, "g", "def g():\n    return f()\n"), None).unwrap();

    define(&runtime, "f", "def f():\n    return 2\n");
    let h2 = engine.hash_function(&define(&runtime, "g", "def g():\n    return f()\n"), None).unwrap();
    assert_ne!(h1, h2);
}

#[test]
fn test_composite() {
    let runtime = runtime();
    let source = "def f():\n    return o\n";
    let engine = Engine::new(Arc::clone(&runtime));

    let o = Value::list([Value::Int(1), Value::Int(2), Value::tuple([Value::Int(1), Value::Int(2)])]);
    let f = Function::new("scratch", "f", source).with_closure("o", Cell::shared(o));
    let h1 = engine.hash_function(&f, None).unwrap();

    let o = Value::list([Value::Int(1), Value::Int(2), Value::tuple([Value::Int(1), Value::Int(3)])]);
    let f = Function::new("scratch", "f", source).with_closure("o", Cell::shared(o));
    let h2 = engine.hash_function(&f, None).unwrap();
    assert_ne!(h1, h2);
}

#[test]
fn test_hook() {
    let runtime = runtime();
    let c = Function::new("scratch", "f", "def f():\n    return c\n").with_closure("c", Cell::shared(Value::object(Plain)));
    let engine = Engine::new(runtime);

    let hook = |_: &Value| Some(HashId::from(""));
    engine.hash_function(&c, Some(&hook)).unwrap();
    // hooks are not comparable, so nothing is cached
    assert!(engine.cache().is_empty());

    let declining = |_: &Value| -> Option<HashId> { None };
    assert!(engine.hash_function(&c, Some(&declining)).unwrap_err().is_unhashable());
}

#[test]
fn test_magic_hook() {
    let f = Function::new("scratch", "f", "def f():\n    return c\n")
        .with_closure("c", Cell::shared(Value::object(SelfDescribing)));
    Engine::new(runtime()).hash_function(&f, None).unwrap();
}

#[test]
fn test_nested() {
    let f = Function::new("scratch", "f", "def f():\n    def g():\n        pass\n");
    Engine::new(runtime()).hash_function(&f, None).unwrap();
}

#[test]
fn test_builtin() {
    let engine = Engine::new(runtime());
    let f = Function::new("scratch", "f", "def f():\n    int\n");
    engine.hash_function(&f, None).unwrap();
    assert!(engine.dependency_map(&f, None).unwrap().is_empty());
    assert_eq!(engine.closure_vars(&f).unwrap().partition().builtins, vec!["int"]);
}

#[test]
fn test_unbound() {
    let f = Function::new("scratch", "f", "def f():\n    x\n");
    let err = Engine::new(runtime()).hash_function(&f, None).unwrap_err();
    assert!(err.is_consistency_violation());
    assert_eq!(
        err,
        CodehashError::Consistency(ConsistencyError::Unbound {
            function: "<function scratch.f>".to_string(),
            names: vec!["x".to_string()],
        })
    );
}

#[test]
fn test_missing_source() {
    let builtin = Function::builtin("scratch", "f");
    let err = Engine::new(runtime()).hash_function(&builtin, None).unwrap_err();
    assert!(matches!(
        err,
        CodehashError::Consistency(ConsistencyError::SourceUnavailable { .. })
    ));

    let lambda = Function::new("scratch", "<lambda>", "handler = lambda x: x\n");
    let err = Engine::new(runtime()).hash_function(&lambda, None).unwrap_err();
    assert!(matches!(
        err,
        CodehashError::Consistency(ConsistencyError::NotAFunction { .. })
    ));
}

#[test]
fn test_comprehension_variables() {
    let f = Function::new(
        "scratch",
        "f",
        "def f(rows):\n    return {k: v for k, v in rows if (best := v)}, [x * 2 for x in range(3)]\n",
    );
    let engine = Engine::new(runtime());
    assert!(engine.dependency_map(&f, None).unwrap().is_empty());
}

#[test]
fn test_unversioned_dependency_changes() {
    let runtime = runtime();
    let engine = uncached(Arc::clone(&runtime));
    let g = define(&runtime, "g", "def g(x):\n    return helper(x) + 1\n");

    define(&runtime, "helper", "def helper(x):\n    return x\n");
    let before = engine.hash_function(&g, None).unwrap();
    define(&runtime, "helper", "def helper(x):\n    return -x\n");
    let after = engine.hash_function(&g, None).unwrap();
    assert_ne!(before, after);

    let dependencies = engine.dependency_map(&g, None).unwrap();
    let token = &dependencies["helper"];
    let helper = scratch(&runtime).globals().get("helper").unwrap();
    let Value::Function(helper) = helper else {
        panic!("helper is not a function");
    };
    assert_eq!(token, &format!("function:{}", engine.hash_function(&helper, None).unwrap()));
}

#[test]
fn test_self_reference() {
    let runtime = runtime();
    let f = define(&runtime, "fib", "def fib(n):\n    return n if n < 2 else fib(n - 1) + fib(n - 2)\n");
    let engine = Engine::new(runtime);
    let h1 = engine.hash_function(&f, None).unwrap();
    let h2 = engine.hash_function(&f, None).unwrap();
    assert_eq!(h1, h2);
    assert_eq!(engine.dependency_map(&f, None).unwrap()["fib"], "function:self");
}

#[test]
fn test_mutual_recursion_is_deterministic() {
    let runtime = runtime();
    let ping = define(&runtime, "ping", "def ping(n):\n    return n and pong(n - 1)\n");
    let pong = define(&runtime, "pong", "def pong(n):\n    return n and ping(n - 1)\n");

    let cached = Engine::new(Arc::clone(&runtime));
    let plain = uncached(Arc::clone(&runtime));
    for function in [&ping, &pong, &ping, &pong] {
        assert_eq!(
            cached.hash_function(function, None).unwrap(),
            plain.hash_function(function, None).unwrap()
        );
    }
    assert_ne!(
        plain.hash_function(&ping, None).unwrap(),
        plain.hash_function(&pong, None).unwrap()
    );
}

#[test]
fn test_cache_does_not_change_results() {
    let runtime = runtime();
    define(&runtime, "leaf", "def leaf():\n    return 1\n");
    define(&runtime, "mid", "def mid():\n    return leaf() + 1\n");
    let top = define(&runtime, "top", "def top():\n    return mid() + leaf()\n");

    let cached = Engine::new(Arc::clone(&runtime));
    let first = cached.hash_function(&top, None).unwrap();
    assert_eq!(cached.cache().len(), 3);
    assert_eq!(cached.hash_function(&top, None).unwrap(), first);
    assert_eq!(uncached(runtime).hash_function(&top, None).unwrap(), first);
}

#[test]
fn test_explain_matches_hash() {
    let runtime = runtime();
    scratch(&runtime).globals().set("os", runtime.module("os").unwrap());
    let f = define(&runtime, "f", "def f():\n    \"\"\"Doc.\"\"\"\n    return os.sep\n");
    let engine = Engine::new(runtime);

    let explanation = engine.explain(&f, None).unwrap();
    assert_eq!(explanation.function, "scratch:f");
    assert_eq!(explanation.identity, engine.hash_function(&f, None).unwrap());
    assert_eq!(explanation.code_shape, engine.code_shape(&f).unwrap());
    assert_eq!(explanation.dependencies["os"], "os(stdlib)");
    assert!(!explanation.is_coroutine);

    let coroutine = Function::new("scratch", "g", "async def g():\n    return os.sep\n");
    let explanation = engine.explain(&coroutine, None).unwrap();
    assert!(explanation.is_coroutine);
    assert_ne!(explanation.identity, engine.hash_function(&f, None).unwrap());
}

#[test]
fn test_concurrent_hashing() {
    let runtime = runtime();
    define(&runtime, "helper", "def helper(x):\n    return x * 2\n");
    let f = define(&runtime, "f", "def f(xs):\n    return [helper(x) for x in xs]\n");
    let engine = Engine::new(runtime);

    let hashes: Vec<HashId> = (0..16)
        .into_par_iter()
        .map(|_| engine.hash_function(&f, None).unwrap())
        .collect();
    assert!(hashes.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(engine.cache().len(), 2);
}

const JOBS: &str = r#"
"""Batch jobs."""
import os
import numpy as np
from json import dumps
from app.util import scale
from missing import nothing


@register(
    name="run",
)
def run(values):
    """Run the job."""
    return [scale(v) for v in values if v > THRESHOLD] + [dumps(LABELS), os.sep, np.pi]


class Job:
    pass


def make_job():
    return Job()
"#;

const UTIL: &str = "def scale(v):\n    return v * FACTOR\n";

const JSON: &str = "def dumps(obj):\n    return repr(obj)\n";

fn manifest_text(factor: i64) -> String {
    format!(
        r#"
[settings]
stdlib_probes = ["os", "ast"]

[[modules]]
name = "os"
file = "{STDLIB_DIR}/os.py"

[[modules]]
name = "ast"
file = "{STDLIB_DIR}/ast.py"

[[modules]]
name = "json"
file = "{STDLIB_DIR}/json/__init__.py"
source = "stdlib/json.py"

[[modules]]
name = "numpy"
file = "{SITE_PACKAGES}/numpy/__init__.py"
version = "1.26.4"

[[modules]]
name = "app.jobs"
source = "app/jobs.py"
[modules.globals]
THRESHOLD = 3
LABELS = ["a", "b"]

[[modules]]
name = "app.util"
source = "app/util.py"
[modules.globals]
FACTOR = {factor}
"#
    )
}

fn write_project(dir: &Path, factor: i64) -> std::path::PathBuf {
    std::fs::create_dir_all(dir.join("app")).unwrap();
    std::fs::create_dir_all(dir.join("stdlib")).unwrap();
    std::fs::write(dir.join("app/jobs.py"), JOBS).unwrap();
    std::fs::write(dir.join("app/util.py"), UTIL).unwrap();
    std::fs::write(dir.join("stdlib/json.py"), JSON).unwrap();
    let path = dir.join("codehash.toml");
    std::fs::write(&path, manifest_text(factor)).unwrap();
    path
}

#[test]
fn test_manifest_loading() {
    let dir = TempDir::new().unwrap();
    let manifest = Manifest::load(&write_project(dir.path(), 2)).unwrap();
    assert_eq!(manifest.settings, Settings::default());

    let jobs = manifest.runtime.module("app.jobs").unwrap();
    assert!(!manifest.runtime.is_stdlib(&jobs));
    assert!(matches!(jobs.globals().get("np"), Some(Value::Module(m)) if m.name() == "numpy"));
    assert!(matches!(jobs.globals().get("LABELS"), Some(Value::List(items)) if items.len() == 2));
    assert!(matches!(jobs.globals().get("Job"), Some(Value::Class(_))));
    assert!(!jobs.globals().contains("nothing"));

    let run = manifest.function("app.jobs:run").unwrap();
    let dependencies = manifest.engine().dependency_map(&run, None).unwrap();
    assert_eq!(
        dependencies.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["LABELS", "THRESHOLD", "dumps", "np", "os", "scale"]
    );
    assert_eq!(dependencies["dumps"], "json:dumps(stdlib)");
    assert_eq!(dependencies["np"], "numpy(1.26.4)");
    assert_eq!(dependencies["os"], "os(stdlib)");
    assert!(dependencies["LABELS"].starts_with("composite:"));
    assert!(dependencies["scale"].starts_with("function:"));
}

#[test]
fn test_manifest_dependency_values_matter() {
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    let hash = |dir: &Path, factor| {
        let manifest = Manifest::load(&write_project(dir, factor)).unwrap();
        let run = manifest.function("app.jobs:run").unwrap();
        manifest.engine().hash_function(&run, None).unwrap()
    };
    assert_ne!(hash(first.path(), 2), hash(second.path(), 3));
    assert_eq!(hash(first.path(), 2), hash(second.path(), 2));
}

#[test]
fn test_manifest_lookup_errors() {
    let dir = TempDir::new().unwrap();
    let manifest = Manifest::load(&write_project(dir.path(), 2)).unwrap();
    assert!(manifest.function("app.jobs").is_err());
    assert!(manifest.function("app.missing:run").is_err());
    assert!(manifest.function("app.jobs:nothing").is_err());
    let err = manifest.function("app.jobs:Job").unwrap_err();
    assert!(err.to_string().contains("not a function"));

    let run = manifest.function("app.jobs:make_job").unwrap();
    let err = manifest.engine().hash_function(&run, None).unwrap_err();
    assert!(matches!(
        err,
        CodehashError::Unhashable {
            reason: HashingError::UnversionedClass(_),
            ..
        }
    ));
}

#[test]
fn test_manifest_reexported_imports_in_any_order() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("app")).unwrap();
    std::fs::write(dir.path().join("app/jobs.py"), "from app.api import scale\n\ndef run(v):\n    return scale(v)\n").unwrap();
    std::fs::write(dir.path().join("app/api.py"), "from app.util import scale\n").unwrap();
    std::fs::write(dir.path().join("app/util.py"), UTIL).unwrap();
    let text = r#"
[[modules]]
name = "app.jobs"
source = "app/jobs.py"

[[modules]]
name = "app.api"
source = "app/api.py"

[[modules]]
name = "app.util"
source = "app/util.py"
[modules.globals]
FACTOR = 2
"#;
    let manifest = Manifest::from_toml_str(text, dir.path()).unwrap();
    let jobs = manifest.runtime.module("app.jobs").unwrap();
    assert!(matches!(jobs.globals().get("scale"), Some(Value::Function(f)) if f.module() == "app.util"));

    let run = manifest.function("app.jobs:run").unwrap();
    let dependencies = manifest.engine().dependency_map(&run, None).unwrap();
    assert!(dependencies["scale"].starts_with("function:"));
}

#[test]
fn test_manifest_errors() {
    let dir = TempDir::new().unwrap();
    assert!(Manifest::load(&dir.path().join("missing.toml")).is_err());
    assert!(Manifest::from_toml_str("modules = 3", dir.path()).is_err());
    let missing_source = "[[modules]]\nname = \"app\"\nsource = \"app.py\"\n";
    assert!(Manifest::from_toml_str(missing_source, dir.path()).is_err());

    let empty = Manifest::from_toml_str("", dir.path()).unwrap();
    assert!(empty.runtime.builtins().contains("len"));
}

fn codehash(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_codehash"))
        .args(args)
        .output()
        .expect("Failed to execute codehash")
}

#[test]
fn test_cli_hash_and_shape() {
    let dir = TempDir::new().unwrap();
    let path = write_project(dir.path(), 2);
    let path = path.to_str().unwrap();

    let manifest = Manifest::load(Path::new(path)).unwrap();
    let run = manifest.function("app.jobs:run").unwrap();
    let engine = manifest.engine();

    let output = codehash(&["--manifest", path, "hash", "app.jobs:run"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), engine.hash_function(&run, None).unwrap().as_str());

    let output = codehash(&["--manifest", path, "shape", "app.jobs:run"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), engine.code_shape(&run).unwrap());
}

#[test]
fn test_cli_explain() {
    let dir = TempDir::new().unwrap();
    let path = write_project(dir.path(), 2);

    let output = codehash(&["--manifest", path.to_str().unwrap(), "explain", "app.jobs:run"]);
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["function"], "app.jobs:run");
    assert_eq!(report["dependencies"]["os"], "os(stdlib)");
    assert_eq!(report["identity"].as_str().map(str::len), Some(64));
    assert_eq!(report["is_coroutine"], false);
}

#[test]
fn test_cli_failures() {
    let dir = TempDir::new().unwrap();
    let path = write_project(dir.path(), 2);

    let output = codehash(&["--manifest", path.to_str().unwrap(), "hash", "app.jobs:make_job"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("cannot hash global Job"));

    let output = codehash(&["--manifest", "/nonexistent/codehash.toml", "hash", "m:f"]);
    assert!(!output.status.success());
}

#[test]
fn test_cli_version() {
    let output = codehash(&["version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}
