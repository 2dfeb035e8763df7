//! Shared types for templar
//!
//! This crate provides the small vocabulary shared by the scripting runtime
//! and the template engine: source locations and function kinds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A position in source text (1-based line and column)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Loc {
    pub line: u32,
    pub column: u32,
}

impl Loc {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    /// The same column, `delta` lines further down
    pub fn shifted(self, delta: u32) -> Self {
        Self {
            line: self.line + delta,
            column: self.column,
        }
    }
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Execution model of a compiled function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FunctionKind {
    /// Runs to completion when called
    Plain,
    /// Produces a lazy sequence when called
    Generator,
    /// Produces a suspendable coroutine when called
    Coroutine,
}

impl FunctionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FunctionKind::Plain => "plain",
            FunctionKind::Generator => "generator",
            FunctionKind::Coroutine => "coroutine",
        }
    }
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
