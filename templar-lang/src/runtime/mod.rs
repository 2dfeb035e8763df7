//! Bytecode interpreter
//!
//! Values are reference counted and shareable across threads. Frames keep
//! their locals and cells behind shared handles so native code can observe
//! the variables of the scripts that called it (see
//! [`Interpreter::snapshot_scopes`]).

mod builtins;
pub mod config;
pub mod exception;
mod frame;
pub mod function;
pub mod generator;
pub mod host;
pub mod interpreter;
pub mod namespace;
pub mod ops;
pub mod value;
mod vm;

pub use config::InterpreterConfig;
pub use exception::{standard_classes, Exception, ExceptionClass, TraceFrame};
pub use function::{new_cell, Cell, Function};
pub use generator::{Generator, Resumed};
pub use host::HostObject;
pub use interpreter::Interpreter;
pub use namespace::{module_name_of, ModuleNamespace, Namespace, ScopeSnapshot};
pub use value::{Args, BoundMethod, Class, Dict, Instance, IterState, MethodKind, NativeFunction, RunResult, Value};
