//! Code units: per-scope symbol tables built from the syntax tree
//!
//! A function's body is split into nested code units the way the Python
//! compiler splits it: the function itself, every inner function and lambda,
//! every class body and every comprehension. Each unit records the names it
//! binds and the names it reads. The resolver walks these units to find
//! every name the function reads from outside itself.

use std::collections::BTreeSet;

use serde::Serialize;
use tree_sitter::Node;

/// What kind of scope a code unit is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Function,
    Lambda,
    Class,
    Comprehension,
}

/// Symbol table of one scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeUnit {
    pub kind: UnitKind,
    pub name: String,
    /// Names assigned in this scope (parameters, targets, imports, defs).
    pub bound: BTreeSet<String>,
    /// Names loaded in this scope.
    pub reads: BTreeSet<String>,
    pub declared_global: BTreeSet<String>,
    pub declared_nonlocal: BTreeSet<String>,
    pub children: Vec<CodeUnit>,
}

impl CodeUnit {
    fn new(kind: UnitKind, name: impl Into<String>) -> Self {
        CodeUnit {
            kind,
            name: name.into(),
            bound: BTreeSet::new(),
            reads: BTreeSet::new(),
            declared_global: BTreeSet::new(),
            declared_nonlocal: BTreeSet::new(),
            children: Vec::new(),
        }
    }

    /// A name is local when bound here and not redirected by a
    /// `global`/`nonlocal` declaration.
    pub fn is_local(&self, name: &str) -> bool {
        self.bound.contains(name)
            && !self.declared_global.contains(name)
            && !self.declared_nonlocal.contains(name)
    }

    /// Names local to this unit.
    pub fn locals(&self) -> impl Iterator<Item = &String> + '_ {
        self.bound.iter().filter(|name| self.is_local(name))
    }

    /// Reads that this unit does not bind itself.
    pub fn free_reads(&self) -> impl Iterator<Item = &String> + '_ {
        self.reads.iter().filter(|name| !self.is_local(name))
    }

    /// Number of units in this tree, including this one.
    pub fn unit_count(&self) -> usize {
        1 + self.children.iter().map(CodeUnit::unit_count).sum::<usize>()
    }
}

/// Build the code unit tree of a `function_definition` node.
///
/// The function's own decorators, parameter defaults and annotations are
/// evaluated by whoever defines it, so they are not part of its unit.
pub fn build_code_unit(definition: Node, source: &[u8]) -> CodeUnit {
    let name = definition
        .child_by_field_name("name")
        .and_then(|n| n.utf8_text(source).ok())
        .unwrap_or_default();

    let mut builder = UnitBuilder::new(source, UnitKind::Function, name);
    if let Some(parameters) = definition.child_by_field_name("parameters") {
        builder.bind_parameters(parameters);
    }
    if let Some(body) = definition.child_by_field_name("body") {
        builder.visit(body);
    }
    builder.finish().0
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

fn field_children<'t>(node: Node<'t>, field: &str) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children_by_field_name(field, &mut cursor).collect()
}

struct UnitBuilder<'s> {
    source: &'s [u8],
    unit: CodeUnit,
    /// Walrus targets that escape a comprehension into the enclosing scope.
    hoisted: BTreeSet<String>,
}

impl<'s> UnitBuilder<'s> {
    fn new(source: &'s [u8], kind: UnitKind, name: impl Into<String>) -> Self {
        UnitBuilder {
            source,
            unit: CodeUnit::new(kind, name),
            hoisted: BTreeSet::new(),
        }
    }

    fn child(&self, kind: UnitKind, name: impl Into<String>) -> Self {
        UnitBuilder::new(self.source, kind, name)
    }

    fn finish(self) -> (CodeUnit, BTreeSet<String>) {
        (self.unit, self.hoisted)
    }

    fn adopt(&mut self, child: UnitBuilder<'s>) {
        let (unit, hoisted) = child.finish();
        if self.unit.kind == UnitKind::Comprehension {
            self.hoisted.extend(hoisted);
        } else {
            self.unit.bound.extend(hoisted);
        }
        self.unit.children.push(unit);
    }

    fn text(&self, node: Node) -> String {
        node.utf8_text(self.source).unwrap_or_default().to_string()
    }

    fn read(&mut self, identifier: Node) {
        let name = self.text(identifier);
        self.unit.reads.insert(name);
    }

    fn bind(&mut self, identifier: Node) {
        let name = self.text(identifier);
        self.unit.bound.insert(name);
    }

    fn visit_children(&mut self, node: Node) {
        for child in named_children(node) {
            self.visit(child);
        }
    }

    /// Walk an expression or statement in load context.
    fn visit(&mut self, node: Node) {
        if node.is_extra() {
            return;
        }
        match node.kind() {
            "identifier" => self.read(node),
            "attribute" => {
                if let Some(object) = node.child_by_field_name("object") {
                    self.visit(object);
                }
            }
            "keyword_argument" => {
                if let Some(value) = node.child_by_field_name("value") {
                    self.visit(value);
                }
            }
            "decorated_definition" => {
                for child in named_children(node) {
                    if child.kind() == "decorator" {
                        self.visit_children(child);
                    }
                }
                if let Some(definition) = node.child_by_field_name("definition") {
                    self.visit(definition);
                }
            }
            "function_definition" => self.visit_function(node),
            "class_definition" => self.visit_class(node),
            "lambda" => self.visit_lambda(node),
            "list_comprehension" | "set_comprehension" | "dictionary_comprehension" | "generator_expression" => {
                self.visit_comprehension(node)
            }
            "assignment" => {
                if let Some(left) = node.child_by_field_name("left") {
                    self.bind_target(left);
                }
                if let Some(right) = node.child_by_field_name("right") {
                    self.visit(right);
                }
            }
            "augmented_assignment" => {
                if let Some(left) = node.child_by_field_name("left") {
                    if left.kind() == "identifier" {
                        self.read(left);
                        self.bind(left);
                    } else {
                        self.visit(left);
                    }
                }
                if let Some(right) = node.child_by_field_name("right") {
                    self.visit(right);
                }
            }
            "named_expression" => {
                if let Some(name) = node.child_by_field_name("name") {
                    self.bind_walrus(name);
                }
                if let Some(value) = node.child_by_field_name("value") {
                    self.visit(value);
                }
            }
            "for_statement" => {
                for left in field_children(node, "left") {
                    self.bind_target(left);
                }
                for field in ["right", "body", "alternative"] {
                    for child in field_children(node, field) {
                        self.visit(child);
                    }
                }
            }
            "import_statement" | "import_from_statement" => self.visit_import(node),
            "future_import_statement" => {}
            "global_statement" => {
                for name in named_children(node) {
                    let name = self.text(name);
                    self.unit.declared_global.insert(name);
                }
            }
            "nonlocal_statement" => {
                for name in named_children(node) {
                    let name = self.text(name);
                    self.unit.declared_nonlocal.insert(name);
                }
            }
            "delete_statement" => {
                for target in named_children(node) {
                    self.bind_target(target);
                }
            }
            "except_clause" | "except_group_clause" | "as_pattern" => self.visit_with_alias(node),
            "case_clause" => self.visit_case_clause(node),
            "type_alias_statement" => {
                if let Some(alias) = named_children(node).first() {
                    self.bind_first_identifier(*alias);
                }
            }
            // annotations are evaluated lazily and are not reads
            "type" => {}
            _ => self.visit_children(node),
        }
    }

    /// Walk an assignment target: names are bound, anything else is read.
    fn bind_target(&mut self, node: Node) {
        match node.kind() {
            "identifier" => self.bind(node),
            "pattern_list" | "tuple_pattern" | "list_pattern" | "tuple" | "list" | "expression_list"
            | "parenthesized_expression" | "as_pattern_target" | "list_splat_pattern" | "list_splat" => {
                for child in named_children(node) {
                    self.bind_target(child);
                }
            }
            _ => self.visit(node),
        }
    }

    fn bind_walrus(&mut self, name: Node) {
        if self.unit.kind == UnitKind::Comprehension {
            let name = self.text(name);
            self.hoisted.insert(name);
        } else {
            self.bind(name);
        }
    }

    fn bind_first_identifier(&mut self, node: Node) {
        if node.kind() == "identifier" {
            self.bind(node);
            return;
        }
        if let Some(child) = named_children(node).into_iter().next() {
            self.bind_first_identifier(child);
        }
    }

    /// `x as y` forms: the node after `as` is a binding target.
    fn visit_with_alias(&mut self, node: Node) {
        let mut after_as = false;
        for child in all_children(node) {
            if !child.is_named() {
                after_as = child.kind() == "as";
                continue;
            }
            if after_as {
                self.bind_target(child);
                after_as = false;
            } else {
                self.visit(child);
            }
        }
    }

    fn visit_import(&mut self, node: Node) {
        for name in field_children(node, "name") {
            match name.kind() {
                "dotted_name" => self.bind_first_identifier(name),
                "aliased_import" => {
                    if let Some(alias) = name.child_by_field_name("alias") {
                        self.bind(alias);
                    }
                }
                _ => {}
            }
        }
    }

    fn bind_parameters(&mut self, parameters: Node) {
        for parameter in named_children(parameters) {
            match parameter.kind() {
                "identifier" => self.bind(parameter),
                "default_parameter" | "typed_default_parameter" => {
                    if let Some(name) = parameter.child_by_field_name("name") {
                        self.bind_target(name);
                    }
                }
                "typed_parameter" | "list_splat_pattern" | "dictionary_splat_pattern" => {
                    self.bind_first_identifier(parameter)
                }
                "tuple_pattern" => self.bind_target(parameter),
                _ => {}
            }
        }
    }

    /// Defaults of a nested definition are evaluated by the defining scope.
    fn visit_parameter_defaults(&mut self, parameters: Node) {
        for parameter in named_children(parameters) {
            if matches!(parameter.kind(), "default_parameter" | "typed_default_parameter") {
                if let Some(value) = parameter.child_by_field_name("value") {
                    self.visit(value);
                }
            }
        }
    }

    fn visit_function(&mut self, node: Node) {
        let name = node
            .child_by_field_name("name")
            .map(|n| self.text(n))
            .unwrap_or_default();
        self.unit.bound.insert(name.clone());

        let mut child = self.child(UnitKind::Function, name);
        if let Some(parameters) = node.child_by_field_name("parameters") {
            self.visit_parameter_defaults(parameters);
            child.bind_parameters(parameters);
        }
        if let Some(body) = node.child_by_field_name("body") {
            child.visit(body);
        }
        self.adopt(child);
    }

    fn visit_lambda(&mut self, node: Node) {
        let mut child = self.child(UnitKind::Lambda, "<lambda>");
        if let Some(parameters) = node.child_by_field_name("parameters") {
            self.visit_parameter_defaults(parameters);
            child.bind_parameters(parameters);
        }
        if let Some(body) = node.child_by_field_name("body") {
            child.visit(body);
        }
        self.adopt(child);
    }

    fn visit_class(&mut self, node: Node) {
        let name = node
            .child_by_field_name("name")
            .map(|n| self.text(n))
            .unwrap_or_default();
        self.unit.bound.insert(name.clone());

        if let Some(bases) = node.child_by_field_name("superclasses") {
            self.visit(bases);
        }
        let mut child = self.child(UnitKind::Class, name);
        if let Some(body) = node.child_by_field_name("body") {
            child.visit(body);
        }
        self.adopt(child);
    }

    /// The first iterable is evaluated in the enclosing scope; everything
    /// else runs in the comprehension's own scope.
    fn visit_comprehension(&mut self, node: Node) {
        let mut child = self.child(UnitKind::Comprehension, format!("<{}>", node.kind()));
        let mut first_iterable = true;
        for part in named_children(node) {
            match part.kind() {
                "for_in_clause" => {
                    for left in field_children(part, "left") {
                        child.bind_target(left);
                    }
                    for right in field_children(part, "right") {
                        if first_iterable {
                            self.visit(right);
                        } else {
                            child.visit(right);
                        }
                    }
                    first_iterable = false;
                }
                _ => child.visit(part),
            }
        }
        self.adopt(child);
    }

    fn visit_case_clause(&mut self, node: Node) {
        for child in named_children(node) {
            match child.kind() {
                "case_pattern" => self.visit_pattern(child),
                _ => self.visit(child),
            }
        }
    }

    /// Capture patterns bind; value patterns (`Color.RED`) and class
    /// patterns read their leading name.
    fn visit_pattern(&mut self, node: Node) {
        match node.kind() {
            "dotted_name" => {
                let parts = named_children(node);
                match parts.as_slice() {
                    [single] => {
                        if self.text(*single) != "_" {
                            self.bind(*single);
                        }
                    }
                    [first, ..] => self.read(*first),
                    [] => {}
                }
            }
            "identifier" => {
                if self.text(node) != "_" {
                    self.bind(node);
                }
            }
            "class_pattern" => {
                for child in named_children(node) {
                    if child.kind() == "dotted_name" {
                        if let Some(first) = named_children(child).first() {
                            self.read(*first);
                        }
                    } else {
                        self.visit_pattern(child);
                    }
                }
            }
            "keyword_pattern" => {
                for child in named_children(node).into_iter().skip(1) {
                    self.visit_pattern(child);
                }
            }
            "as_pattern" => {
                let mut after_as = false;
                for child in all_children(node) {
                    if !child.is_named() {
                        after_as = child.kind() == "as";
                    } else if after_as {
                        self.bind_first_identifier(child);
                    } else {
                        self.visit_pattern(child);
                    }
                }
            }
            "string" | "concatenated_string" | "integer" | "float" | "true" | "false" | "none" => {}
            _ => {
                for child in named_children(node) {
                    self.visit_pattern(child);
                }
            }
        }
    }
}
