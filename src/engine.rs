//! Identity pipeline
//!
//! `hash_function` normalizes the function's code, resolves the values it
//! reads, classifies each of them and digests the canonical record
//! `{"ast_code": shape, "globals": {name: token}}`. Functions from
//! unversioned code are hashed recursively; a stack of the functions being
//! hashed turns recursion into back-reference tokens.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use codehash_core::{
    canonical_record, hash_text, CodehashError, ConsistencyError, Function, FunctionId, HashHook, HashId,
    HashingError, Runtime, Settings, Value,
};
use codehash_syntax::{analyze_function, FunctionSyntax, ParserPool};
use serde::Serialize;

use crate::cache::{CachedIdentity, IdentityCache};
use crate::classify::{self, Dependency};
use crate::resolve::{self, ClosureVars};

/// Everything that went into one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Explanation {
    pub function: String,
    pub identity: HashId,
    pub code_shape: String,
    /// `async def`
    pub is_coroutine: bool,
    pub dependencies: BTreeMap<String, String>,
}

/// Computes function identities against one [`Runtime`].
pub struct Engine {
    runtime: Arc<Runtime>,
    settings: Settings,
    parsers: ParserPool,
    cache: IdentityCache,
}

impl Engine {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self::with_settings(runtime, Settings::default())
    }

    pub fn with_settings(runtime: Arc<Runtime>, settings: Settings) -> Self {
        Engine {
            runtime,
            settings,
            parsers: ParserPool::new(),
            cache: IdentityCache::new(),
        }
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn cache(&self) -> &IdentityCache {
        &self.cache
    }

    /// Identity of `function`. With a hook the cache is neither read nor
    /// written.
    pub fn hash_function(&self, function: &Function, hook: Option<&HashHook>) -> Result<HashId, CodehashError> {
        let mut stack = HashStack::default();
        self.hash_in(&mut stack, function, hook)
    }

    /// Canonical code shape of `function`.
    pub fn code_shape(&self, function: &Function) -> Result<String, CodehashError> {
        Ok(self.syntax_of(function)?.code_shape)
    }

    /// Values `function` reads from outside itself, unbound names included.
    pub fn closure_vars(&self, function: &Function) -> Result<ClosureVars, CodehashError> {
        let syntax = self.syntax_of(function)?;
        Ok(resolve::closure_vars(&self.runtime, function, &syntax.code_unit))
    }

    /// Classification token of every dependency of `function`.
    pub fn dependency_map(
        &self,
        function: &Function,
        hook: Option<&HashHook>,
    ) -> Result<BTreeMap<String, String>, CodehashError> {
        Ok(self.explain(function, hook)?.dependencies)
    }

    /// Identity of `function` together with the record it was digested from.
    pub fn explain(&self, function: &Function, hook: Option<&HashHook>) -> Result<Explanation, CodehashError> {
        let mut stack = HashStack::default();
        stack.push(function.id());
        self.record(&mut stack, function, hook)
    }

    fn hash_in(
        &self,
        stack: &mut HashStack,
        function: &Function,
        hook: Option<&HashHook>,
    ) -> Result<HashId, CodehashError> {
        let cacheable = hook.is_none() && self.settings.cache_identities;
        if cacheable {
            if let Some(cached) = self.cache.get(function.id()) {
                if !stack.contains_any(&cached.reach) {
                    tracing::debug!("Cache hit for {}", function);
                    stack.reached(function.id(), &cached.reach);
                    return Ok(cached.hash);
                }
                tracing::debug!("Cached identity of {} reaches a function being hashed", function);
            }
        }

        stack.push(function.id());
        let result = self.record(stack, function, hook);
        let frame = stack.pop();
        let hash = result?.identity;

        let Some(frame) = frame else {
            return Ok(hash);
        };
        stack.reached(function.id(), &frame.reach);
        if let Some(depth) = frame.back_reference {
            // depends on a function further up the stack
            stack.refer_to(depth);
            tracing::debug!("Computed context-dependent identity {} for {}", hash, function);
            return Ok(hash);
        }

        tracing::debug!("Computed identity {} for {}", hash, function);
        if !cacheable {
            return Ok(hash);
        }
        let cached = self.cache.insert_if_absent(
            function.id(),
            CachedIdentity {
                hash,
                reach: Arc::new(frame.reach),
            },
        );
        Ok(cached.hash)
    }

    fn record(
        &self,
        stack: &mut HashStack,
        function: &Function,
        hook: Option<&HashHook>,
    ) -> Result<Explanation, CodehashError> {
        let syntax = self.syntax_of(function)?;
        let vars = resolve::closure_vars(&self.runtime, function, &syntax.code_unit);
        if !vars.unbound.is_empty() {
            return Err(ConsistencyError::Unbound {
                function: function.to_string(),
                names: vars.unbound.iter().cloned().collect(),
            }
            .into());
        }

        let mut dependencies = BTreeMap::new();
        for (name, value) in vars.dependencies() {
            let token = self.token_for(stack, function, name, value, hook)?;
            tracing::trace!("{}: {} -> {}", function, name, token);
            dependencies.insert(name.to_string(), token);
        }

        let identity = hash_text(&canonical_record(&syntax.code_shape, &dependencies));
        Ok(Explanation {
            function: function.fullname(),
            identity,
            code_shape: syntax.code_shape,
            is_coroutine: syntax.is_coroutine,
            dependencies,
        })
    }

    fn token_for(
        &self,
        stack: &mut HashStack,
        function: &Function,
        name: &str,
        value: &Value,
        hook: Option<&HashHook>,
    ) -> Result<String, CodehashError> {
        let unhashable = |reason: HashingError| CodehashError::Unhashable {
            function: function.to_string(),
            name: name.to_string(),
            value: value.repr(),
            reason,
        };

        match Dependency::of(value) {
            Dependency::Module(module) => classify::module_token(&self.runtime, module).map_err(unhashable),
            Dependency::Class(class) => classify::class_token(&self.runtime, class).map_err(unhashable),
            Dependency::Composite(value) => classify::composite_token(value, hook).map_err(unhashable),
            Dependency::Function(callee) => {
                if let Some(token) = classify::function_token(&self.runtime, callee) {
                    return Ok(token);
                }
                if let Some(depth) = stack.depth_of(callee.id()) {
                    let distance = stack.distance_to(depth);
                    if distance == 0 {
                        return Ok("function:self".to_string());
                    }
                    stack.reached(callee.id(), &BTreeSet::new());
                    stack.refer_to(depth);
                    return Ok(format!("function:cycle:{distance}"));
                }
                let hash = self.hash_in(stack, callee, hook)?;
                Ok(format!("function:{hash}"))
            }
        }
    }

    fn syntax_of(&self, function: &Function) -> Result<FunctionSyntax, CodehashError> {
        let source = function.source().ok_or_else(|| ConsistencyError::SourceUnavailable {
            function: function.to_string(),
        })?;
        Ok(analyze_function(&self.parsers, &function.to_string(), source)?)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("runtime", &self.runtime)
            .field("settings", &self.settings)
            .field("cached", &self.cache.len())
            .finish()
    }
}

/// Functions currently being hashed, outermost first.
#[derive(Debug, Default)]
struct HashStack {
    frames: Vec<Frame>,
}

#[derive(Debug)]
struct Frame {
    id: FunctionId,
    /// Shallowest ancestor frame this computation referred back to.
    back_reference: Option<usize>,
    /// Functions met while computing this frame.
    reach: BTreeSet<FunctionId>,
}

impl HashStack {
    fn push(&mut self, id: FunctionId) {
        self.frames.push(Frame {
            id,
            back_reference: None,
            reach: BTreeSet::new(),
        });
    }

    fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    fn depth_of(&self, id: FunctionId) -> Option<usize> {
        self.frames.iter().rposition(|frame| frame.id == id)
    }

    fn contains_any(&self, ids: &BTreeSet<FunctionId>) -> bool {
        self.frames.iter().any(|frame| ids.contains(&frame.id))
    }

    /// Record on the top frame that `id`, and everything its computation
    /// reached, took part in this one.
    fn reached(&mut self, id: FunctionId, reach: &BTreeSet<FunctionId>) {
        if let Some(frame) = self.frames.last_mut() {
            frame.reach.insert(id);
            frame.reach.extend(reach.iter().copied());
        }
    }

    /// Number of frames between the top of the stack and `depth`.
    fn distance_to(&self, depth: usize) -> usize {
        self.frames.len().saturating_sub(depth + 1)
    }

    /// Mark the top frame as depending on the frame at `depth`. References
    /// to the top frame itself are not context-dependent.
    fn refer_to(&mut self, depth: usize) {
        let Some(top) = self.frames.len().checked_sub(1) else {
            return;
        };
        if depth >= top {
            return;
        }
        let frame = &mut self.frames[top];
        frame.back_reference = Some(frame.back_reference.map_or(depth, |current| current.min(depth)));
    }
}
