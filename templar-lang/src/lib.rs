//! # Templar scripting language
//!
//! A small, dynamically typed, indentation-structured language that hosts
//! templar templates. It provides:
//! - A logos-based lexer with an indentation layout pass
//! - A recursive-descent parser producing an editable syntax tree
//! - An unparser that renders trees back to source text
//! - A two-pass bytecode compiler (symbol table, then code generation)
//! - An interpreter with closures, classes, exceptions, generators and
//!   coroutines, and host hooks for frame introspection
//!
//! ## Example
//!
//! ```ignore
//! let mut interp = Interpreter::new();
//! let module = interp.run_module("demo", "def add(a, b=2):\n    return a + b\n")?;
//! let add = module.get("add").unwrap();
//! let sum = interp.call(&add, Args::new(vec![Value::Int(1)]))?;
//! ```

pub mod ast;
pub mod compiler;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod runtime;
pub mod source;
pub mod unparse;

#[cfg(test)]
mod tests;

// Re-export key types
pub use ast::{Expr, ExprKind, FunctionDef, Module, Stmt, StmtKind};
pub use compiler::{compile_module, compile_source, Code};
pub use error::{ErrorContext, LangError, Result};
pub use lexer::{is_identifier, tokenize, Lexer, SpannedToken, Token};
pub use parser::{parse_source, Parser};
pub use runtime::{
    Args, BoundMethod, Cell, Exception, ExceptionClass, Function, HostObject, Interpreter, InterpreterConfig,
    MethodKind, ModuleNamespace, Namespace, RunResult, ScopeSnapshot, TraceFrame, Value,
};
pub use source::{dedent, Source};
pub use unparse::{unparse_expr, unparse_function, unparse_module};

pub use templar_types::{FunctionKind, Loc};
