//! Closure and global resolution
//!
//! Partitions every name a function reads from outside its own scopes into
//! closure captures, module globals, builtins and names bound nowhere. The
//! function's code units are walked with a work list; each entry carries the
//! names bound by the units enclosing it inside the function, so reads that
//! refer to an enclosing local never reach the outer environment.

use std::collections::{BTreeMap, BTreeSet};

use codehash_core::{Function, Module, Runtime, Value};
use codehash_syntax::{CodeUnit, UnitKind};
use serde::Serialize;

/// Values a function captures, partitioned by where they were found.
#[derive(Debug, Clone, Default)]
pub struct ClosureVars {
    pub nonlocals: BTreeMap<String, Value>,
    pub globals: BTreeMap<String, Value>,
    pub builtins: BTreeMap<String, Value>,
    pub unbound: BTreeSet<String>,
}

/// Names of each partition, for reports and snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Partition {
    pub nonlocals: Vec<String>,
    pub globals: Vec<String>,
    pub builtins: Vec<String>,
    pub unbound: Vec<String>,
}

impl ClosureVars {
    /// Values that contribute to the identity: nonlocals, then globals.
    /// A global entry replaces a nonlocal one with the same name.
    pub fn dependencies(&self) -> BTreeMap<&str, &Value> {
        self.nonlocals
            .iter()
            .chain(self.globals.iter())
            .map(|(name, value)| (name.as_str(), value))
            .collect()
    }

    pub fn partition(&self) -> Partition {
        Partition {
            nonlocals: self.nonlocals.keys().cloned().collect(),
            globals: self.globals.keys().cloned().collect(),
            builtins: self.builtins.keys().cloned().collect(),
            unbound: self.unbound.iter().cloned().collect(),
        }
    }
}

/// How a name escaping the function must be looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lookup {
    /// closure, then globals, then builtins
    Free,
    /// declared `global`: the closure is never consulted
    Global,
    /// declared `nonlocal`: only the closure is consulted
    Nonlocal,
}

/// Resolve every external name read by `function`, whose syntax produced
/// `unit`.
pub fn closure_vars(runtime: &Runtime, function: &Function, unit: &CodeUnit) -> ClosureVars {
    let globals = runtime.globals_of(function);
    if globals.is_none() {
        tracing::trace!("Module {} of {} is not registered", function.module(), function);
    }

    let mut vars = ClosureVars::default();
    let mut work: Vec<(&CodeUnit, BTreeSet<String>)> = vec![(unit, BTreeSet::new())];

    while let Some((unit, enclosing)) = work.pop() {
        for (name, lookup) in external_names(unit, &enclosing) {
            let found = match lookup {
                Lookup::Nonlocal => lookup_cell(function, name).map(|value| (Scope::Nonlocal, value)),
                Lookup::Global => lookup_global(runtime, globals.as_deref(), name),
                Lookup::Free => match function.cell(name) {
                    Some(_) => lookup_cell(function, name).map(|value| (Scope::Nonlocal, value)),
                    None => lookup_global(runtime, globals.as_deref(), name),
                },
            };
            match found {
                Some((Scope::Nonlocal, value)) => {
                    tracing::trace!("{}: {} resolves to a closure cell", function, name);
                    vars.nonlocals.insert(name.to_string(), value);
                }
                Some((Scope::Global, value)) => {
                    tracing::trace!("{}: {} resolves to a module global", function, name);
                    vars.globals.insert(name.to_string(), value);
                }
                Some((Scope::Builtin, value)) => {
                    vars.builtins.insert(name.to_string(), value);
                }
                None => {
                    tracing::trace!("{}: {} is bound nowhere", function, name);
                    vars.unbound.insert(name.to_string());
                }
            }
        }

        // class bodies do not form an enclosing scope for their methods
        let visible = if unit.kind == UnitKind::Class {
            enclosing
        } else {
            let mut visible = enclosing;
            visible.extend(unit.locals().cloned());
            visible
        };
        for child in &unit.children {
            work.push((child, visible.clone()));
        }
    }

    vars
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Nonlocal,
    Global,
    Builtin,
}

/// Names a unit references that are bound neither by the unit nor by an
/// enclosing unit. Names written through a `global`/`nonlocal` declaration
/// count as references.
fn external_names<'u>(unit: &'u CodeUnit, enclosing: &BTreeSet<String>) -> Vec<(&'u str, Lookup)> {
    let written = unit
        .bound
        .iter()
        .filter(|name| unit.declared_global.contains(*name) || unit.declared_nonlocal.contains(*name));
    let referenced: BTreeSet<&String> = unit.reads.iter().chain(written).collect();

    referenced
        .into_iter()
        .filter(|name| !unit.is_local(name))
        .filter_map(|name| {
            if unit.declared_global.contains(name) {
                Some((name.as_str(), Lookup::Global))
            } else if enclosing.contains(name) {
                None
            } else if unit.declared_nonlocal.contains(name) {
                Some((name.as_str(), Lookup::Nonlocal))
            } else {
                Some((name.as_str(), Lookup::Free))
            }
        })
        .collect()
}

/// An empty cell is an unassigned free variable.
fn lookup_cell(function: &Function, name: &str) -> Option<Value> {
    function.cell(name).and_then(|cell| cell.get())
}

fn lookup_global(runtime: &Runtime, globals: Option<&Module>, name: &str) -> Option<(Scope, Value)> {
    if let Some(value) = globals.and_then(|module| module.globals().get(name)) {
        return Some((Scope::Global, value));
    }
    runtime.builtins().get(name).map(|value| (Scope::Builtin, value))
}
