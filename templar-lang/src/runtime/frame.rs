//! Execution frames

use super::function::{new_cell, Cell, Function};
use super::namespace::{Namespace, ScopeSnapshot};
use super::value::Value;
use crate::compiler::Code;
use parking_lot::Mutex;
use std::sync::Arc;

/// An active `with` or `try` region
#[derive(Debug, Clone)]
pub(crate) enum Block {
    With { exit: Value, end: usize, depth: usize },
    Except { handler: usize, depth: usize },
}

/// How a frame stopped running
#[derive(Debug)]
pub(crate) enum FrameExit {
    Return(Value),
    Yield(Value),
}

/// The state of one running code object
#[derive(Debug)]
pub struct Frame {
    pub(crate) code: Arc<Code>,
    pub(crate) globals: Arc<dyn Namespace>,
    /// Name storage for module and class bodies
    pub(crate) names: Option<Arc<dyn Namespace>>,
    pub(crate) locals: Arc<Mutex<Vec<Option<Value>>>>,
    /// Cell variables followed by free variables
    pub(crate) cells: Vec<Cell>,
    pub(crate) stack: Vec<Value>,
    pub(crate) blocks: Vec<Block>,
    pub(crate) ip: usize,
    pub(crate) line: u32,
    /// The exception being handled and the line it was raised at
    pub(crate) handling: Option<(Value, u32)>,
}

impl Frame {
    fn new(code: Arc<Code>, globals: Arc<dyn Namespace>, locals: Vec<Option<Value>>, cells: Vec<Cell>) -> Self {
        let line = code.first_line;
        Self {
            code,
            globals,
            names: None,
            locals: Arc::new(Mutex::new(locals)),
            cells,
            stack: Vec::new(),
            blocks: Vec::new(),
            ip: 0,
            line,
            handling: None,
        }
    }

    /// A frame for calling `function` with already bound arguments
    pub(crate) fn for_function(function: &Function, locals: Vec<Option<Value>>) -> Self {
        let code = function.code.clone();
        let mut cells: Vec<Cell> = code
            .cellvars
            .iter()
            .map(|name| {
                let initial = code
                    .varnames
                    .iter()
                    .take(code.params.slot_count())
                    .position(|v| v == name)
                    .and_then(|index| locals.get(index).cloned().flatten());
                new_cell(initial)
            })
            .collect();
        cells.extend(function.closure.iter().cloned());
        Self::new(code, function.globals.clone(), locals, cells)
    }

    pub(crate) fn for_module(code: Arc<Code>, globals: Arc<dyn Namespace>) -> Self {
        let mut frame = Self::new(code, globals.clone(), Vec::new(), Vec::new());
        frame.names = Some(globals);
        frame
    }

    pub(crate) fn for_class_body(
        code: Arc<Code>,
        globals: Arc<dyn Namespace>,
        names: Arc<dyn Namespace>,
        closure: Vec<Cell>,
    ) -> Self {
        let mut cells: Vec<Cell> = code.cellvars.iter().map(|_| new_cell(None)).collect();
        cells.extend(closure);
        let mut frame = Self::new(code, globals, Vec::new(), cells);
        frame.names = Some(names);
        frame
    }

    pub(crate) fn snapshot(&self) -> ScopeSnapshot {
        ScopeSnapshot {
            code: self.code.clone(),
            locals: self.locals.clone(),
            cells: self.cells.clone(),
            names: self.names.clone(),
        }
    }

    pub(crate) fn is_module(&self) -> bool {
        self.code.flags.module
    }
}
