//! Structural code normalizer
//!
//! Turns a function's source text into its canonical code shape: a dump of
//! the syntax tree that records node kinds, leaf text and child order, but
//! no field names, positions, comments or whitespace. Decorators, the
//! function's own name and docstrings (at every nesting level) are removed
//! so they never influence the identity.

use std::fmt::Write;

use codehash_core::ConsistencyError;
use tree_sitter::Node;

use crate::parser_pool::ParserPool;
use crate::symbols::{build_code_unit, CodeUnit};

/// Everything the identity pipeline needs from a function's syntax.
#[derive(Debug, Clone)]
pub struct FunctionSyntax {
    pub code_shape: String,
    pub code_unit: CodeUnit,
    pub is_coroutine: bool,
}

/// Parse `source` as a single (possibly decorated) function definition.
///
/// `function` names the function in errors.
pub fn analyze_function(pool: &ParserPool, function: &str, source: &str) -> Result<FunctionSyntax, ConsistencyError> {
    let parsed = pool.parse(dedent(source))?;
    let source = parsed.content.as_bytes();
    let definition = single_definition(parsed.tree.root_node()).ok_or_else(|| ConsistencyError::NotAFunction {
        function: function.to_string(),
    })?;

    let erased = definition.child_by_field_name("name").map(|n| n.id());
    let mut code_shape = String::new();
    write_node(&mut code_shape, definition, source, erased);

    let is_coroutine = all_children(definition).iter().any(|c| c.kind() == "async");
    tracing::trace!("Normalized {} into {} bytes of code shape", function, code_shape.len());

    Ok(FunctionSyntax {
        code_shape,
        code_unit: build_code_unit(definition, source),
        is_coroutine,
    })
}

/// Remove the whitespace prefix shared by every non-blank line.
pub fn dedent(source: &str) -> String {
    let mut margin: Option<&str> = None;
    for line in source.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let indent = &line[..line.len() - line.trim_start().len()];
        margin = Some(match margin {
            None => indent,
            Some(current) => common_prefix(current, indent),
        });
    }
    let margin = margin.unwrap_or("");

    source
        .lines()
        .map(|line| {
            if line.trim().is_empty() {
                ""
            } else {
                line.strip_prefix(margin).unwrap_or(line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn common_prefix<'a>(a: &'a str, b: &str) -> &'a str {
    let len = a
        .char_indices()
        .zip(b.chars())
        .find(|((_, x), y)| x != y)
        .map(|((i, _), _)| i)
        .unwrap_or_else(|| a.len().min(b.len()));
    &a[..len]
}

/// The only top-level statement, unwrapped from its decorators, if it is a
/// function definition and the source parsed cleanly.
fn single_definition(root: Node) -> Option<Node> {
    if root.has_error() {
        return None;
    }
    let statements = named_children(root);
    let [statement] = statements.as_slice() else {
        return None;
    };
    let definition = if statement.kind() == "decorated_definition" {
        statement.child_by_field_name("definition")?
    } else {
        *statement
    };
    (definition.kind() == "function_definition").then_some(definition)
}

fn named_children(node: Node) -> Vec<Node> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|child| !child.is_extra())
        .collect()
}

fn all_children(node: Node) -> Vec<Node> {
    let mut cursor = node.walk();
    node.children(&mut cursor)
        .filter(|child| !child.is_extra())
        .collect()
}

fn text<'s>(node: Node, source: &'s [u8]) -> &'s str {
    node.utf8_text(source).unwrap_or_default()
}

/// A leading expression statement holding a plain string literal.
fn is_docstring(statement: Node, source: &[u8]) -> bool {
    if statement.kind() != "expression_statement" {
        return false;
    }
    let expressions = named_children(statement);
    let [expression] = expressions.as_slice() else {
        return false;
    };
    match expression.kind() {
        "string" => is_plain_string(*expression, source),
        "concatenated_string" => named_children(*expression)
            .into_iter()
            .all(|part| part.kind() == "string" && is_plain_string(part, source)),
        _ => false,
    }
}

/// No bytes/f-string prefix and no interpolation.
fn is_plain_string(string: Node, source: &[u8]) -> bool {
    named_children(string).into_iter().all(|part| match part.kind() {
        "string_start" => !text(part, source)
            .chars()
            .any(|c| matches!(c.to_ascii_lowercase(), 'b' | 'f' | 't')),
        "interpolation" => false,
        _ => true,
    })
}

fn has_docstring_slot(block: Node) -> bool {
    block.kind() == "block"
        && block
            .parent()
            .is_some_and(|p| matches!(p.kind(), "function_definition" | "class_definition" | "module"))
}

/// Anonymous tokens that only delimit or group. `:` inside a slice says
/// which bound is present and is kept.
fn is_delimiter(token: Node, parent: Node) -> bool {
    match token.kind() {
        "," | "(" | ")" | "[" | "]" | "{" | "}" | ";" => true,
        ":" => parent.kind() != "slice",
        _ => false,
    }
}

/// The expression inside redundant grouping parentheses.
fn ungrouped(node: Node) -> Node {
    let mut node = node;
    while node.kind() == "parenthesized_expression" {
        let inner = named_children(node);
        let [expression] = inner.as_slice() else {
            break;
        };
        node = *expression;
    }
    node
}

fn write_node(out: &mut String, node: Node, source: &[u8], erased: Option<usize>) {
    let node = ungrouped(node);
    if erased == Some(node.id()) {
        out.push_str("identifier(\"\")");
        return;
    }

    match node.kind() {
        // quote style is not part of the value
        "string_start" => {
            let prefix: String = text(node, source)
                .chars()
                .filter(|c| c.is_ascii_alphabetic())
                .map(|c| c.to_ascii_lowercase())
                .collect();
            let _ = write!(out, "string_start({:?})", prefix);
            return;
        }
        "string_content" | "format_specifier" => {
            let _ = write!(out, "{}({:?})", node.kind(), text(node, source));
            return;
        }
        "subscript" => {
            write_subscript(out, node, source, erased);
            return;
        }
        _ => {}
    }

    let children: Vec<Node> = all_children(node)
        .into_iter()
        .filter(|child| child.kind() != "string_end")
        .collect();

    if children.is_empty() {
        if node.is_named() {
            let _ = write!(out, "{}({:?})", node.kind(), text(node, source));
        } else {
            let _ = write!(out, "{:?}", node.kind());
        }
        return;
    }

    let mut children: Vec<Node> = children
        .into_iter()
        .filter(|child| child.is_named() || !is_delimiter(*child, node))
        .collect();

    if has_docstring_slot(node) {
        if let Some(first) = children.iter().position(|c| c.is_named()) {
            if is_docstring(children[first], source) {
                children.remove(first);
            }
        }
    }

    write_children(out, node.kind(), &children, source, erased);
}

/// `a[i, j]` and `a[i,]` index with a tuple, the same as `a[(i, j)]`.
fn write_subscript(out: &mut String, node: Node, source: &[u8], erased: Option<usize>) {
    let children = all_children(node);
    let named: Vec<Node> = children.iter().copied().filter(|child| child.is_named()).collect();
    let Some((value, indices)) = named.split_first() else {
        return write_children(out, node.kind(), &children, source, erased);
    };

    out.push_str("subscript(");
    write_node(out, *value, source, erased);
    out.push_str(", ");
    if children.iter().any(|child| child.kind() == ",") {
        write_children(out, "tuple", indices, source, erased);
    } else {
        for (i, index) in indices.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            write_node(out, *index, source, erased);
        }
    }
    out.push(')');
}

fn write_children(out: &mut String, kind: &str, children: &[Node], source: &[u8], erased: Option<usize>) {
    let _ = write!(out, "{}(", kind);
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_node(out, *child, source, erased);
    }
    out.push(')');
}
