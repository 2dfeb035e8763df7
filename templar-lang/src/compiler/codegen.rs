use super::code::{Code, CodeFlags, Const, Instr, ParamLayout};
use super::symtable::{ScopeKind, Symbol, SymbolTable};
use crate::ast::*;
use crate::error::{LangError, Loc, Result};
use crate::source::Source;
use std::sync::Arc;

/// Compile-time view of the runtime block stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    With,
    Except,
}

#[derive(Debug)]
struct LoopContext {
    start: usize,
    breaks: Vec<usize>,
    is_for: bool,
    block_depth: usize,
}

/// Shared settings for one compilation
#[derive(Clone)]
pub(crate) struct Unit {
    pub filename: String,
    pub source: Option<Arc<Source>>,
}

/// Emits the bytecode of one scope
pub(crate) struct CodeGen<'a> {
    unit: &'a Unit,
    table: &'a SymbolTable,
    qualname: String,
    instructions: Vec<Instr>,
    lines: Vec<u32>,
    consts: Vec<Const>,
    names: Vec<String>,
    line: u32,
    loops: Vec<LoopContext>,
    blocks: Vec<BlockKind>,
}

impl<'a> CodeGen<'a> {
    pub fn new(unit: &'a Unit, table: &'a SymbolTable, qualname: String, line: u32) -> Self {
        Self {
            unit,
            table,
            qualname,
            instructions: Vec::new(),
            lines: Vec::new(),
            consts: Vec::new(),
            names: Vec::new(),
            line,
            loops: Vec::new(),
            blocks: Vec::new(),
        }
    }

    fn emit(&mut self, instr: Instr) -> usize {
        self.instructions.push(instr);
        self.lines.push(self.line);
        self.instructions.len() - 1
    }

    fn here(&self) -> u32 {
        self.instructions.len() as u32
    }

    /// Point the jump at `at` to the next instruction
    fn patch(&mut self, at: usize) {
        let target = self.here();
        match &mut self.instructions[at] {
            Instr::Jump(t)
            | Instr::JumpIfFalse(t)
            | Instr::JumpIfTrue(t)
            | Instr::JumpIfFalseOrPop(t)
            | Instr::JumpIfTrueOrPop(t)
            | Instr::ForIter(t)
            | Instr::SetupWith(t)
            | Instr::SetupExcept(t) => *t = target,
            _ => {}
        }
    }

    fn add_const(&mut self, value: Const) -> u32 {
        if !matches!(value, Const::Code(_)) {
            if let Some(i) = self.consts.iter().position(|c| *c == value) {
                return i as u32;
            }
        }
        self.consts.push(value);
        (self.consts.len() - 1) as u32
    }

    fn add_name(&mut self, name: &str) -> u32 {
        if let Some(i) = self.names.iter().position(|n| n == name) {
            return i as u32;
        }
        self.names.push(name.to_string());
        (self.names.len() - 1) as u32
    }

    fn load_const(&mut self, value: Const) {
        let index = self.add_const(value);
        self.emit(Instr::LoadConst(index));
    }

    fn symbol(&self, name: &str) -> Symbol {
        self.table.symbol(name).unwrap_or(match self.table.kind {
            ScopeKind::Module | ScopeKind::Class => Symbol::Name,
            ScopeKind::Function | ScopeKind::Lambda => Symbol::GlobalImplicit,
        })
    }

    fn deref_index(&self, name: &str) -> Option<u32> {
        self.table
            .cellvars
            .iter()
            .chain(self.table.freevars.iter())
            .position(|n| n == name)
            .map(|i| i as u32)
    }

    fn local_index(&self, name: &str) -> Option<u32> {
        self.table.varnames.iter().position(|n| n == name).map(|i| i as u32)
    }

    fn internal_error(&self, loc: Loc, name: &str) -> LangError {
        LangError::syntax(loc, format!("cannot resolve name '{}'", name))
    }

    fn load_name(&mut self, name: &str, loc: Loc) -> Result<()> {
        match self.symbol(name) {
            Symbol::Local => {
                let index = self.local_index(name).ok_or_else(|| self.internal_error(loc, name))?;
                self.emit(Instr::LoadFast(index));
            }
            Symbol::Cell | Symbol::Free => {
                let index = self.deref_index(name).ok_or_else(|| self.internal_error(loc, name))?;
                self.emit(Instr::LoadDeref(index));
            }
            Symbol::GlobalExplicit | Symbol::GlobalImplicit => {
                let index = self.add_name(name);
                self.emit(Instr::LoadGlobal(index));
            }
            Symbol::Name => {
                let index = self.add_name(name);
                self.emit(Instr::LoadName(index));
            }
        }
        Ok(())
    }

    fn store_name(&mut self, name: &str, loc: Loc) -> Result<()> {
        let symbol = match (self.table.kind, self.symbol(name)) {
            (ScopeKind::Class, Symbol::Free) => Symbol::Name,
            (_, symbol) => symbol,
        };
        match symbol {
            Symbol::Local => {
                let index = self.local_index(name).ok_or_else(|| self.internal_error(loc, name))?;
                self.emit(Instr::StoreFast(index));
            }
            Symbol::Cell | Symbol::Free => {
                let index = self.deref_index(name).ok_or_else(|| self.internal_error(loc, name))?;
                self.emit(Instr::StoreDeref(index));
            }
            Symbol::GlobalExplicit | Symbol::GlobalImplicit => {
                let index = self.add_name(name);
                self.emit(Instr::StoreGlobal(index));
            }
            Symbol::Name => {
                let index = self.add_name(name);
                self.emit(Instr::StoreName(index));
            }
        }
        Ok(())
    }

    fn closure_for(&self, child: &SymbolTable, loc: Loc) -> Result<Vec<u32>> {
        child
            .freevars
            .iter()
            .map(|name| self.deref_index(name).ok_or_else(|| self.internal_error(loc, name)))
            .collect()
    }

    fn child_qualname(&self, name: &str) -> String {
        match self.table.kind {
            ScopeKind::Module => name.to_string(),
            ScopeKind::Class => format!("{}.{}", self.qualname, name),
            ScopeKind::Function | ScopeKind::Lambda => format!("{}.<locals>.{}", self.qualname, name),
        }
    }

    pub fn compile_body(&mut self, body: &[Stmt]) -> Result<()> {
        for stmt in body {
            self.compile_stmt(stmt)?;
        }
        Ok(())
    }

    fn compile_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        self.line = stmt.loc.line;
        match &stmt.kind {
            StmtKind::FunctionDef(def) => self.compile_function_def(def, stmt.loc)?,
            StmtKind::ClassDef(class) => self.compile_class_def(class, stmt.loc)?,
            StmtKind::Return(value) => {
                match value {
                    Some(value) => self.compile_expr(value)?,
                    None => self.load_const(Const::None),
                }
                self.line = stmt.loc.line;
                self.emit(Instr::Return);
            }
            StmtKind::Assign { targets, value } => {
                self.compile_expr(value)?;
                for (i, target) in targets.iter().enumerate() {
                    if i + 1 < targets.len() {
                        self.emit(Instr::Dup);
                    }
                    self.compile_store(target)?;
                }
            }
            StmtKind::AugAssign { target, op, value } => self.compile_aug_assign(target, *op, value)?,
            StmtKind::Expr(expr) => {
                self.compile_expr(expr)?;
                self.emit(Instr::Pop);
            }
            StmtKind::If { test, body, orelse } => {
                self.compile_expr(test)?;
                let to_else = self.emit(Instr::JumpIfFalse(0));
                self.compile_body(body)?;
                if orelse.is_empty() {
                    self.patch(to_else);
                } else {
                    let to_end = self.emit(Instr::Jump(0));
                    self.patch(to_else);
                    self.compile_body(orelse)?;
                    self.patch(to_end);
                }
            }
            StmtKind::While { test, body } => {
                let start = self.instructions.len();
                self.compile_expr(test)?;
                let to_end = self.emit(Instr::JumpIfFalse(0));
                self.compile_loop_body(body, start, false)?;
                self.line = stmt.loc.line;
                self.emit(Instr::Jump(start as u32));
                self.patch(to_end);
                self.finish_loop();
            }
            StmtKind::For { target, iter, body } => {
                self.compile_expr(iter)?;
                self.line = stmt.loc.line;
                self.emit(Instr::GetIter);
                let start = self.instructions.len();
                let to_end = self.emit(Instr::ForIter(0));
                self.compile_store(target)?;
                self.compile_loop_body(body, start, true)?;
                self.line = stmt.loc.line;
                self.emit(Instr::Jump(start as u32));
                self.patch(to_end);
                self.finish_loop();
            }
            StmtKind::With { items, body } => self.compile_with(items, body, stmt.loc)?,
            StmtKind::Try { body, handlers } => self.compile_try(body, handlers, stmt.loc)?,
            StmtKind::Raise(value) => {
                if let Some(value) = value {
                    self.compile_expr(value)?;
                }
                self.line = stmt.loc.line;
                self.emit(Instr::Raise(value.is_some()));
            }
            StmtKind::Assert { test, msg } => {
                self.compile_expr(test)?;
                let to_end = self.emit(Instr::JumpIfTrue(0));
                self.load_name("AssertionError", stmt.loc)?;
                let positional = match msg {
                    Some(msg) => {
                        self.compile_expr(msg)?;
                        1
                    }
                    None => 0,
                };
                self.line = stmt.loc.line;
                self.emit(Instr::Call {
                    positional,
                    keywords: 0,
                });
                self.emit(Instr::Raise(true));
                self.patch(to_end);
            }
            StmtKind::Pass | StmtKind::Global(_) | StmtKind::Nonlocal(_) => {}
            StmtKind::Break => {
                let Some(context) = self.loops.last() else {
                    return Err(LangError::syntax(stmt.loc, "'break' outside loop"));
                };
                let (depth, is_for) = (context.block_depth, context.is_for);
                self.unwind_blocks(depth);
                if is_for {
                    self.emit(Instr::Pop);
                }
                let jump = self.emit(Instr::Jump(0));
                if let Some(context) = self.loops.last_mut() {
                    context.breaks.push(jump);
                }
            }
            StmtKind::Continue => {
                let Some(context) = self.loops.last() else {
                    return Err(LangError::syntax(stmt.loc, "'continue' not properly in loop"));
                };
                let (depth, start) = (context.block_depth, context.start);
                self.unwind_blocks(depth);
                self.emit(Instr::Jump(start as u32));
            }
        }
        Ok(())
    }

    /// Leave every block opened since `depth` without popping it at compile time
    fn unwind_blocks(&mut self, depth: usize) {
        let kinds: Vec<BlockKind> = self.blocks[depth..].iter().rev().copied().collect();
        for kind in kinds {
            match kind {
                BlockKind::With => self.emit(Instr::ExitWith),
                BlockKind::Except => self.emit(Instr::PopBlock),
            };
        }
    }

    fn compile_loop_body(&mut self, body: &[Stmt], start: usize, is_for: bool) -> Result<()> {
        self.loops.push(LoopContext {
            start,
            breaks: Vec::new(),
            is_for,
            block_depth: self.blocks.len(),
        });
        self.compile_body(body)
    }

    fn finish_loop(&mut self) {
        if let Some(context) = self.loops.pop() {
            for at in context.breaks {
                self.patch(at);
            }
        }
    }

    fn compile_with(&mut self, items: &[WithItem], body: &[Stmt], loc: Loc) -> Result<()> {
        let Some((item, rest)) = items.split_first() else {
            return self.compile_body(body);
        };
        self.compile_expr(&item.context)?;
        self.line = loc.line;
        let setup = self.emit(Instr::SetupWith(0));
        match &item.target {
            Some(target) => self.compile_store(target)?,
            None => {
                self.emit(Instr::Pop);
            }
        }
        self.blocks.push(BlockKind::With);
        self.compile_with(rest, body, loc)?;
        self.blocks.pop();
        self.line = loc.line;
        self.emit(Instr::ExitWith);
        self.patch(setup);
        Ok(())
    }

    fn compile_try(&mut self, body: &[Stmt], handlers: &[ExceptHandler], loc: Loc) -> Result<()> {
        let setup = self.emit(Instr::SetupExcept(0));
        self.blocks.push(BlockKind::Except);
        self.compile_body(body)?;
        self.blocks.pop();
        self.line = loc.line;
        self.emit(Instr::PopBlock);
        let mut to_end = vec![self.emit(Instr::Jump(0))];

        self.patch(setup);
        for handler in handlers {
            let mut to_next = None;
            if let Some(typ) = &handler.typ {
                self.emit(Instr::Dup);
                self.compile_expr(typ)?;
                self.emit(Instr::ExcMatch);
                to_next = Some(self.emit(Instr::JumpIfFalse(0)));
            }
            match &handler.name {
                Some(name) => self.store_name(name, loc)?,
                None => {
                    self.emit(Instr::Pop);
                }
            }
            self.compile_body(&handler.body)?;
            to_end.push(self.emit(Instr::Jump(0)));
            if let Some(at) = to_next {
                self.patch(at);
            }
        }
        self.emit(Instr::Reraise);
        for at in to_end {
            self.patch(at);
        }
        Ok(())
    }

    fn compile_store(&mut self, target: &Expr) -> Result<()> {
        self.line = target.loc.line;
        match &target.kind {
            ExprKind::Name(name) => self.store_name(name, target.loc),
            ExprKind::Attribute { value, attr } => {
                self.compile_expr(value)?;
                let index = self.add_name(attr);
                self.emit(Instr::StoreAttr(index));
                Ok(())
            }
            ExprKind::Subscript { value, index } => {
                self.compile_expr(value)?;
                self.compile_expr(index)?;
                self.emit(Instr::StoreSubscript);
                Ok(())
            }
            _ => Err(LangError::syntax(target.loc, "cannot assign to expression")),
        }
    }

    fn compile_aug_assign(&mut self, target: &Expr, op: BinOp, value: &Expr) -> Result<()> {
        match &target.kind {
            ExprKind::Name(name) => {
                self.load_name(name, target.loc)?;
                self.compile_expr(value)?;
                self.emit(Instr::Binary(op));
                self.store_name(name, target.loc)
            }
            ExprKind::Attribute { value: object, attr } => {
                self.compile_expr(object)?;
                self.emit(Instr::Dup);
                let index = self.add_name(attr);
                self.emit(Instr::LoadAttr(index));
                self.compile_expr(value)?;
                self.emit(Instr::Binary(op));
                self.emit(Instr::Rot2);
                self.emit(Instr::StoreAttr(index));
                Ok(())
            }
            ExprKind::Subscript { value: object, index } => {
                self.compile_expr(object)?;
                self.compile_expr(index)?;
                self.emit(Instr::DupTwo);
                self.emit(Instr::LoadSubscript);
                self.compile_expr(value)?;
                self.emit(Instr::Binary(op));
                self.emit(Instr::Rot3);
                self.emit(Instr::StoreSubscript);
                Ok(())
            }
            _ => Err(LangError::syntax(target.loc, "cannot assign to expression")),
        }
    }

    /// Push positional defaults, then keyword-only defaults as (name, value) pairs
    fn compile_defaults(&mut self, params: &Parameters) -> Result<(u32, u32)> {
        let mut defaults = 0;
        for param in &params.positional {
            if let Some(default) = &param.default {
                self.compile_expr(default)?;
                defaults += 1;
            }
        }
        let mut kwdefaults = 0;
        for param in &params.kwonly {
            if let Some(default) = &param.default {
                self.load_const(Const::Str(param.name.as_str().into()));
                self.compile_expr(default)?;
                kwdefaults += 1;
            }
        }
        Ok((defaults, kwdefaults))
    }

    fn compile_function_def(&mut self, def: &FunctionDef, loc: Loc) -> Result<()> {
        for decorator in &def.decorators {
            self.compile_expr(decorator)?;
        }
        let (defaults, kwdefaults) = self.compile_defaults(&def.params)?;

        let table = self.table;
        let child = table
            .function_child(def)
            .ok_or_else(|| self.internal_error(loc, &def.name))?;
        let code = compile_function(self.unit, child, def, self.child_qualname(&def.name))?;
        let closure = self.closure_for(child, loc)?;
        let code = self.add_const(Const::Code(code));

        self.line = loc.line;
        self.emit(Instr::MakeFunction {
            code,
            defaults,
            kwdefaults,
            closure,
        });
        self.apply_decorators(&def.decorators);
        self.line = loc.line;
        self.store_name(&def.name, loc)
    }

    /// Decorators apply innermost first; each call is attributed to its decorator's line
    fn apply_decorators(&mut self, decorators: &[Expr]) {
        for decorator in decorators.iter().rev() {
            self.line = decorator.loc.line;
            self.emit(Instr::Call {
                positional: 1,
                keywords: 0,
            });
        }
    }

    fn compile_class_def(&mut self, class: &ClassDef, loc: Loc) -> Result<()> {
        for decorator in &class.decorators {
            self.compile_expr(decorator)?;
        }
        for base in &class.bases {
            self.compile_expr(base)?;
        }
        let table = self.table;
        let child = table
            .class_child(class)
            .ok_or_else(|| self.internal_error(loc, &class.name))?;
        let qualname = self.child_qualname(&class.name);

        let mut gen = CodeGen::new(self.unit, child, qualname.clone(), loc.line);
        gen.compile_body(&class.body)?;
        gen.line = class.last_line;
        gen.load_const(Const::None);
        gen.emit(Instr::Return);
        let flags = CodeFlags {
            class_body: true,
            ..CodeFlags::default()
        };
        let mut code = gen.finish(&class.name, qualname, flags, ParamLayout::default());
        code.docstring = docstring_of(&class.body).map(String::from);
        code.first_line = class.first_line;
        code.last_line = class.last_line;

        let closure = self.closure_for(child, loc)?;
        let code = self.add_const(Const::Code(Arc::new(code)));
        self.line = loc.line;
        self.emit(Instr::BuildClass {
            code,
            bases: class.bases.len() as u32,
            closure,
        });
        self.apply_decorators(&class.decorators);
        self.line = loc.line;
        self.store_name(&class.name, loc)
    }

    fn compile_expr(&mut self, expr: &Expr) -> Result<()> {
        let saved = self.line;
        self.line = expr.loc.line;
        self.compile_expr_inner(expr)?;
        self.line = saved;
        Ok(())
    }

    fn compile_expr_inner(&mut self, expr: &Expr) -> Result<()> {
        match &expr.kind {
            ExprKind::Name(name) => self.load_name(name, expr.loc)?,
            ExprKind::Constant(constant) => {
                let value = match constant {
                    Constant::None => Const::None,
                    Constant::Bool(b) => Const::Bool(*b),
                    Constant::Int(i) => Const::Int(*i),
                    Constant::Float(f) => Const::Float(*f),
                    Constant::Str(s) => Const::Str(s.as_str().into()),
                };
                self.load_const(value);
            }
            ExprKind::List(items) => {
                for item in items {
                    self.compile_expr(item)?;
                }
                self.emit(Instr::BuildList(items.len() as u32));
            }
            ExprKind::Dict(pairs) => {
                for (key, value) in pairs {
                    self.compile_expr(key)?;
                    self.compile_expr(value)?;
                }
                self.emit(Instr::BuildDict(pairs.len() as u32));
            }
            ExprKind::Attribute { value, attr } => {
                self.compile_expr(value)?;
                let index = self.add_name(attr);
                self.emit(Instr::LoadAttr(index));
            }
            ExprKind::Subscript { value, index } => {
                self.compile_expr(value)?;
                self.compile_expr(index)?;
                self.emit(Instr::LoadSubscript);
            }
            ExprKind::Call { func, args, keywords } => {
                self.compile_expr(func)?;
                for arg in args {
                    self.compile_expr(arg)?;
                }
                for keyword in keywords {
                    self.load_const(Const::Str(keyword.name.as_str().into()));
                    self.compile_expr(&keyword.value)?;
                }
                self.emit(Instr::Call {
                    positional: args.len() as u32,
                    keywords: keywords.len() as u32,
                });
            }
            ExprKind::BinOp { left, op, right } => {
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                self.emit(Instr::Binary(*op));
            }
            ExprKind::UnaryOp { op, operand } => {
                self.compile_expr(operand)?;
                self.emit(Instr::Unary(*op));
            }
            ExprKind::BoolOp { op, left, right } => {
                self.compile_expr(left)?;
                let jump = match op {
                    BoolOp::And => self.emit(Instr::JumpIfFalseOrPop(0)),
                    BoolOp::Or => self.emit(Instr::JumpIfTrueOrPop(0)),
                };
                self.compile_expr(right)?;
                self.patch(jump);
            }
            ExprKind::Compare { left, op, right } => {
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                self.emit(Instr::Compare(*op));
            }
            ExprKind::Lambda { params, body } => {
                let (defaults, kwdefaults) = self.compile_defaults(params)?;
                let table = self.table;
                let child = table
                    .lambda_child(params)
                    .ok_or_else(|| self.internal_error(expr.loc, "<lambda>"))?;
                let code = compile_lambda(self.unit, child, params, body, self.child_qualname("<lambda>"))?;
                let closure = self.closure_for(child, expr.loc)?;
                let code = self.add_const(Const::Code(code));
                self.emit(Instr::MakeFunction {
                    code,
                    defaults,
                    kwdefaults,
                    closure,
                });
            }
            ExprKind::Await(value) => {
                self.compile_expr(value)?;
                self.emit(Instr::GetAwaitable);
                self.load_const(Const::None);
                self.emit(Instr::YieldFrom);
            }
            ExprKind::Yield(value) => {
                match value {
                    Some(value) => self.compile_expr(value)?,
                    None => self.load_const(Const::None),
                }
                self.emit(Instr::Yield);
            }
            ExprKind::YieldFrom(value) => {
                self.compile_expr(value)?;
                self.emit(Instr::GetYieldFromIter);
                self.load_const(Const::None);
                self.emit(Instr::YieldFrom);
            }
        }
        Ok(())
    }

    pub fn load_const_none_and_return(&mut self) {
        self.load_const(Const::None);
        self.emit(Instr::Return);
    }

    pub fn finish(self, name: &str, qualname: String, flags: CodeFlags, params: ParamLayout) -> Code {
        Code {
            name: name.to_string(),
            qualname,
            flags,
            params,
            varnames: self.table.varnames.clone(),
            cellvars: self.table.cellvars.clone(),
            freevars: self.table.freevars.clone(),
            names: self.names,
            consts: self.consts,
            instructions: self.instructions,
            lines: self.lines,
            filename: self.unit.filename.clone(),
            docstring: None,
            first_line: 1,
            last_line: 1,
            source: self.unit.source.clone(),
            definition: None,
        }
    }
}

fn layout_of(params: &Parameters) -> ParamLayout {
    ParamLayout {
        argcount: params.positional.len(),
        kwonlyargcount: params.kwonly.len(),
        varargs: params.vararg.is_some(),
        varkeywords: params.kwarg.is_some(),
    }
}

fn compile_function(unit: &Unit, table: &SymbolTable, def: &FunctionDef, qualname: String) -> Result<Arc<Code>> {
    let def_line = def.first_line;
    let mut gen = CodeGen::new(unit, table, qualname.clone(), def_line);
    gen.compile_body(&def.body)?;
    gen.line = def.last_line;
    gen.load_const(Const::None);
    gen.emit(Instr::Return);
    let flags = CodeFlags {
        generator: table.is_generator,
        coroutine: table.is_coroutine,
        ..CodeFlags::default()
    };
    let mut code = gen.finish(&def.name, qualname, flags, layout_of(&def.params));
    code.docstring = def.docstring().map(String::from);
    code.first_line = def.first_line;
    code.last_line = def.last_line;
    if unit.source.is_none() {
        code.definition = Some(Arc::new(def.clone()));
    }
    Ok(Arc::new(code))
}

fn compile_lambda(
    unit: &Unit,
    table: &SymbolTable,
    params: &Parameters,
    body: &Expr,
    qualname: String,
) -> Result<Arc<Code>> {
    let mut gen = CodeGen::new(unit, table, qualname.clone(), body.loc.line);
    gen.compile_expr(body)?;
    gen.emit(Instr::Return);
    let flags = CodeFlags {
        generator: table.is_generator,
        lambda: true,
        ..CodeFlags::default()
    };
    let mut code = gen.finish("<lambda>", qualname, flags, layout_of(params));
    code.first_line = body.loc.line;
    code.last_line = body.loc.line;
    Ok(Arc::new(code))
}
