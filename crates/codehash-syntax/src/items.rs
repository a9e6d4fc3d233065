//! Top-level item extraction for Python modules

use codehash_core::ConsistencyError;
use tree_sitter::Node;

use crate::parser_pool::ParserPool;

/// A module-level statement that introduces a global binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleItem {
    /// `def` or `async def`; `source` includes decorators.
    Function { name: String, source: String },
    Class { name: String },
    /// `import a.b` binds `a` to module `a`; `import a.b as c` binds `c` to `a.b`.
    Import { binding: String, module: String },
    /// `from module import name as binding`
    ImportFrom { binding: String, module: String, name: String },
}

impl ModuleItem {
    /// The global name this item binds.
    pub fn binding(&self) -> &str {
        match self {
            ModuleItem::Function { name, .. } | ModuleItem::Class { name } => name,
            ModuleItem::Import { binding, .. } | ModuleItem::ImportFrom { binding, .. } => binding,
        }
    }
}

/// Extract the top-level functions, classes and imports of a module.
pub fn module_items(pool: &ParserPool, source: &str) -> Result<Vec<ModuleItem>, ConsistencyError> {
    let parsed = pool.parse(source.to_string())?;
    let root = parsed.tree.root_node();
    if root.has_error() {
        return Err(ConsistencyError::Parser("syntax error in module source".to_string()));
    }

    let source = parsed.content.as_bytes();
    let mut items = Vec::new();
    let mut cursor = root.walk();
    for statement in root.named_children(&mut cursor) {
        match statement.kind() {
            "function_definition" | "class_definition" => {
                items.extend(extract_definition(statement, statement, source));
            }
            "decorated_definition" => {
                if let Some(definition) = statement.child_by_field_name("definition") {
                    items.extend(extract_definition(statement, definition, source));
                }
            }
            "import_statement" => items.extend(extract_imports(statement, source)),
            "import_from_statement" => items.extend(extract_from_imports(statement, source)),
            _ => {}
        }
    }
    Ok(items)
}

fn text(node: Node, source: &[u8]) -> String {
    node.utf8_text(source).unwrap_or_default().to_string()
}

fn extract_definition(statement: Node, definition: Node, source: &[u8]) -> Option<ModuleItem> {
    let name = text(definition.child_by_field_name("name")?, source);
    match definition.kind() {
        "function_definition" => Some(ModuleItem::Function {
            name,
            source: text(statement, source),
        }),
        "class_definition" => Some(ModuleItem::Class { name }),
        _ => None,
    }
}

fn extract_imports(node: Node, source: &[u8]) -> Vec<ModuleItem> {
    let mut imports = Vec::new();
    let mut cursor = node.walk();
    for name in node.children_by_field_name("name", &mut cursor) {
        match name.kind() {
            "dotted_name" => {
                let module = text(name, source);
                let binding = module.split('.').next().unwrap_or_default().to_string();
                imports.push(ModuleItem::Import {
                    binding: binding.clone(),
                    module: binding,
                });
            }
            "aliased_import" => {
                if let (Some(module), Some(alias)) = (name.child_by_field_name("name"), name.child_by_field_name("alias")) {
                    imports.push(ModuleItem::Import {
                        binding: text(alias, source),
                        module: text(module, source),
                    });
                }
            }
            _ => {}
        }
    }
    imports
}

fn extract_from_imports(node: Node, source: &[u8]) -> Vec<ModuleItem> {
    let Some(module) = node.child_by_field_name("module_name") else {
        return Vec::new();
    };
    let module = text(module, source);

    let mut imports = Vec::new();
    let mut cursor = node.walk();
    for name in node.children_by_field_name("name", &mut cursor) {
        let (imported, binding) = match name.kind() {
            "dotted_name" => {
                let imported = text(name, source);
                (imported.clone(), imported)
            }
            "aliased_import" => match (name.child_by_field_name("name"), name.child_by_field_name("alias")) {
                (Some(imported), Some(alias)) => (text(imported, source), text(alias, source)),
                _ => continue,
            },
            _ => continue,
        };
        imports.push(ModuleItem::ImportFrom {
            binding,
            module: module.clone(),
            name: imported,
        });
    }
    imports
}
