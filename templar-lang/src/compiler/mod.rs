//! Bytecode compiler
//!
//! Compilation runs in two passes: [`symtable`] classifies every name, then
//! code generation walks the tree once per scope and emits [`Instr`]s.

pub mod code;
mod codegen;
pub mod symtable;

pub use code::{Code, CodeFlags, Const, Instr, ParamLayout};
pub use symtable::{analyze_module, ScopeKind, Symbol, SymbolTable};

use crate::ast::Module;
use crate::error::Result;
use crate::source::Source;
use codegen::{CodeGen, Unit};
use std::sync::Arc;

/// Compile a parsed module.
///
/// `source` is the text line numbers in the tree refer to. When it is absent,
/// function code objects retain their definition tree instead.
pub fn compile_module(module: &Module, source: Option<Arc<Source>>, filename: &str) -> Result<Arc<Code>> {
    let table = analyze_module(module)?;
    let unit = Unit {
        filename: filename.to_string(),
        source,
    };
    let mut gen = CodeGen::new(&unit, &table, String::new(), 1);
    gen.compile_body(&module.body)?;
    gen.load_const_none_and_return();
    let flags = CodeFlags {
        module: true,
        ..CodeFlags::default()
    };
    let mut code = gen.finish("<module>", "<module>".to_string(), flags, ParamLayout::default());
    code.last_line = module.body.last().map(|stmt| stmt.loc.line).unwrap_or(1);
    Ok(Arc::new(code))
}

/// Parse and compile source text in one step
pub fn compile_source(source: Arc<Source>) -> Result<Arc<Code>> {
    let module = crate::parser::parse_source(source.text())?;
    let filename = source.name().to_string();
    compile_module(&module, Some(source), &filename)
}
