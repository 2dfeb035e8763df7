//! Compiled code objects and the bytecode they contain

use crate::ast::{BinOp, CmpOp, FunctionDef, UnaryOp};
use crate::source::Source;
use std::fmt;
use std::sync::Arc;

/// Properties of a code object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CodeFlags {
    pub generator: bool,
    pub coroutine: bool,
    pub lambda: bool,
    pub class_body: bool,
    pub module: bool,
}

/// How arguments map onto the first local slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParamLayout {
    /// Positional-or-keyword parameters
    pub argcount: usize,
    pub kwonlyargcount: usize,
    pub varargs: bool,
    pub varkeywords: bool,
}

impl ParamLayout {
    /// Number of local slots taken by parameters
    pub fn slot_count(&self) -> usize {
        self.argcount + self.kwonlyargcount + self.varargs as usize + self.varkeywords as usize
    }
}

/// Compile-time constants
#[derive(Debug, Clone)]
pub enum Const {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Code(Arc<Code>),
}

impl PartialEq for Const {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Const::None, Const::None) => true,
            (Const::Bool(a), Const::Bool(b)) => a == b,
            (Const::Int(a), Const::Int(b)) => a == b,
            (Const::Float(a), Const::Float(b)) => a.to_bits() == b.to_bits(),
            (Const::Str(a), Const::Str(b)) => a == b,
            (Const::Code(a), Const::Code(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Stack machine instructions
#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    LoadConst(u32),
    LoadFast(u32),
    StoreFast(u32),
    /// Index into cell variables followed by free variables
    LoadDeref(u32),
    StoreDeref(u32),
    /// Index into `names`
    LoadGlobal(u32),
    StoreGlobal(u32),
    LoadName(u32),
    StoreName(u32),
    LoadAttr(u32),
    /// Pops the object, then the value
    StoreAttr(u32),
    LoadSubscript,
    /// Pops the index, the object, then the value
    StoreSubscript,
    Pop,
    Dup,
    DupTwo,
    Rot2,
    Rot3,
    Binary(BinOp),
    Unary(UnaryOp),
    Compare(CmpOp),
    Jump(u32),
    JumpIfFalse(u32),
    JumpIfTrue(u32),
    JumpIfFalseOrPop(u32),
    JumpIfTrueOrPop(u32),
    BuildList(u32),
    BuildDict(u32),
    /// Stack: callee, positional args, then (name, value) pairs
    Call { positional: u32, keywords: u32 },
    /// Stack: defaults, then (name, value) keyword-only defaults
    MakeFunction {
        code: u32,
        defaults: u32,
        kwdefaults: u32,
        closure: Vec<u32>,
    },
    BuildClass {
        code: u32,
        bases: u32,
        closure: Vec<u32>,
    },
    Return,
    Yield,
    /// Delegates to the iterator below the sent value until it finishes
    YieldFrom,
    GetIter,
    GetYieldFromIter,
    GetAwaitable,
    ForIter(u32),
    SetupWith(u32),
    ExitWith,
    SetupExcept(u32),
    PopBlock,
    Raise(bool),
    ExcMatch,
    Reraise,
    Nop,
}

/// A compiled unit: module body, class body, function or lambda
#[derive(Clone)]
pub struct Code {
    pub name: String,
    pub qualname: String,
    pub flags: CodeFlags,
    pub params: ParamLayout,
    pub varnames: Vec<String>,
    pub cellvars: Vec<String>,
    pub freevars: Vec<String>,
    pub names: Vec<String>,
    pub consts: Vec<Const>,
    pub instructions: Vec<Instr>,
    /// Source line of each instruction
    pub lines: Vec<u32>,
    pub filename: String,
    pub docstring: Option<String>,
    pub first_line: u32,
    pub last_line: u32,
    pub source: Option<Arc<Source>>,
    /// The definition this code was compiled from, kept when there is no source text
    pub definition: Option<Arc<FunctionDef>>,
}

impl Code {
    pub fn is_generator(&self) -> bool {
        self.flags.generator
    }

    pub fn is_coroutine(&self) -> bool {
        self.flags.coroutine
    }

    /// Number of cell slots (cell variables plus free variables)
    pub fn cell_count(&self) -> usize {
        self.cellvars.len() + self.freevars.len()
    }

    /// Name of a deref slot
    pub fn deref_name(&self, index: usize) -> Option<&str> {
        if index < self.cellvars.len() {
            self.cellvars.get(index).map(String::as_str)
        } else {
            self.freevars.get(index - self.cellvars.len()).map(String::as_str)
        }
    }

    /// Source text of one line, trimmed
    pub fn source_line(&self, line: u32) -> Option<String> {
        self.source
            .as_ref()
            .and_then(|source| source.line(line))
            .map(|text| text.trim().to_string())
    }

    /// Rebuild this code object over a subset of its free variables.
    ///
    /// Deref slots are renumbered to the new layout. Returns `None` if the
    /// code still refers to a free variable that is not kept.
    pub fn with_freevars(&self, keep: &[String]) -> Option<Code> {
        let ncells = self.cellvars.len();
        let mut mapping = Vec::with_capacity(self.cell_count());
        for i in 0..ncells {
            mapping.push(Some(i as u32));
        }
        for name in &self.freevars {
            mapping.push(keep.iter().position(|k| k == name).map(|p| (ncells + p) as u32));
        }
        let remap = |index: u32| mapping.get(index as usize).copied().flatten();

        let mut instructions = Vec::with_capacity(self.instructions.len());
        for instr in &self.instructions {
            let rewritten = match instr {
                Instr::LoadDeref(i) => Instr::LoadDeref(remap(*i)?),
                Instr::StoreDeref(i) => Instr::StoreDeref(remap(*i)?),
                Instr::MakeFunction {
                    code,
                    defaults,
                    kwdefaults,
                    closure,
                } => Instr::MakeFunction {
                    code: *code,
                    defaults: *defaults,
                    kwdefaults: *kwdefaults,
                    closure: closure.iter().map(|i| remap(*i)).collect::<Option<Vec<_>>>()?,
                },
                Instr::BuildClass { code, bases, closure } => Instr::BuildClass {
                    code: *code,
                    bases: *bases,
                    closure: closure.iter().map(|i| remap(*i)).collect::<Option<Vec<_>>>()?,
                },
                other => other.clone(),
            };
            instructions.push(rewritten);
        }

        Some(Code {
            freevars: keep.to_vec(),
            instructions,
            ..self.clone()
        })
    }

    /// Human-readable listing of the bytecode
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        for (i, instr) in self.instructions.iter().enumerate() {
            let line = self.lines.get(i).copied().unwrap_or_default();
            out.push_str(&format!("{:>4} {:>4} {:?}\n", line, i, instr));
        }
        out
    }
}

impl fmt::Debug for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Code")
            .field("qualname", &self.qualname)
            .field("flags", &self.flags)
            .field("varnames", &self.varnames)
            .field("cellvars", &self.cellvars)
            .field("freevars", &self.freevars)
            .field("first_line", &self.first_line)
            .finish_non_exhaustive()
    }
}
