//! Python source analysis: parsing, structural normalization and scopes

pub mod parser_pool;
pub mod normalize;
pub mod symbols;
pub mod items;


pub use parser_pool::{ParserPool, ParseResult};
pub use normalize::{analyze_function, dedent, FunctionSyntax};
pub use symbols::{build_code_unit, CodeUnit, UnitKind};
pub use items::{module_items, ModuleItem};
