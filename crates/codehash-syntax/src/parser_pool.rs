//! Thread-safe pool of tree-sitter parsers for Python source
//!
//! Tree-sitter parsers are `Send` but not `Sync`. Each parse checks a parser
//! out of a shared free list and hands it back afterwards, so concurrent
//! callers never share one and parsing stays on the caller's thread.

use std::sync::{Arc, Mutex, PoisonError};

use codehash_core::ConsistencyError;
use tree_sitter::{Language, Parser, Tree};

/// Result of a parsing operation
#[derive(Debug)]
pub struct ParseResult {
    pub tree: Tree,
    pub content: String,
}

/// Thread-safe parser pool
#[derive(Clone, Default)]
pub struct ParserPool {
    idle: Arc<Mutex<Vec<Parser>>>,
}

impl ParserPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// The tree-sitter language every parser in the pool is configured with
    pub fn language() -> Language {
        tree_sitter_python::LANGUAGE.into()
    }

    fn checkout(&self) -> Result<Parser, ConsistencyError> {
        if let Some(parser) = self.idle.lock().unwrap_or_else(PoisonError::into_inner).pop() {
            return Ok(parser);
        }

        let mut parser = Parser::new();
        parser
            .set_language(&Self::language())
            .map_err(|e| ConsistencyError::Parser(format!("Failed to set language: {}", e)))?;
        tracing::debug!("Created python parser");
        Ok(parser)
    }

    fn checkin(&self, mut parser: Parser) {
        parser.reset();
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).push(parser);
    }

    /// Parse Python source synchronously on the calling thread
    pub fn parse(&self, content: String) -> Result<ParseResult, ConsistencyError> {
        let mut parser = self.checkout()?;
        let tree = parser.parse(&content, None);
        self.checkin(parser);

        match tree {
            Some(tree) => Ok(ParseResult { tree, content }),
            None => Err(ConsistencyError::Parser("Failed to parse content".to_string())),
        }
    }

    /// Number of parsers waiting for reuse
    pub fn idle_count(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl std::fmt::Debug for ParserPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserPool")
            .field("idle", &self.idle_count())
            .finish()
    }
}
