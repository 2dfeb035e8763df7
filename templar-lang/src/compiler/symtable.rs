//! Scope analysis
//!
//! Classifies every name of every scope before code generation, following
//! ordinary nested lexical scoping: function locals captured by inner
//! functions become cells, references to enclosing function locals become
//! free variables, and class bodies are skipped when resolving names of the
//! functions nested in them.

use crate::ast::*;
use crate::error::{LangError, Loc, Result};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Module,
    Class,
    Function,
    Lambda,
}

/// How a name is accessed inside one scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    Local,
    /// Local captured by an inner scope
    Cell,
    /// Captured from an enclosing function
    Free,
    GlobalExplicit,
    GlobalImplicit,
    /// Dynamic lookup in module and class bodies
    Name,
}

/// Results of analysing one scope
#[derive(Debug, Clone)]
pub struct SymbolTable {
    pub kind: ScopeKind,
    pub name: String,
    pub symbols: HashMap<String, Symbol>,
    pub varnames: Vec<String>,
    pub cellvars: Vec<String>,
    pub freevars: Vec<String>,
    pub is_generator: bool,
    pub is_coroutine: bool,
    children: HashMap<usize, SymbolTable>,
}

impl SymbolTable {
    pub fn symbol(&self, name: &str) -> Option<Symbol> {
        self.symbols.get(name).copied()
    }

    pub fn function_child(&self, def: &FunctionDef) -> Option<&SymbolTable> {
        self.children.get(&node_key(def))
    }

    pub fn class_child(&self, class: &ClassDef) -> Option<&SymbolTable> {
        self.children.get(&node_key(class))
    }

    pub fn lambda_child(&self, params: &Parameters) -> Option<&SymbolTable> {
        self.children.get(&node_key(params))
    }
}

/// Nested scopes are keyed by the address of their (boxed) syntax node.
fn node_key<T>(node: &T) -> usize {
    node as *const T as usize
}

/// Analyse a module and all scopes nested in it
pub fn analyze_module(module: &Module) -> Result<SymbolTable> {
    let mut raw = RawScope::new(ScopeKind::Module, "<module>", false, Vec::new());
    visit_body(&mut raw, &module.body)?;
    let (table, _) = analyze(raw, &HashSet::new())?;
    Ok(table)
}

struct RawScope {
    kind: ScopeKind,
    name: String,
    is_async: bool,
    params: Vec<String>,
    assigned: Vec<String>,
    referenced: Vec<String>,
    globals: Vec<String>,
    nonlocals: Vec<(String, Loc)>,
    has_yield: bool,
    children: Vec<(usize, RawScope)>,
}

impl RawScope {
    fn new(kind: ScopeKind, name: &str, is_async: bool, params: Vec<String>) -> Self {
        Self {
            kind,
            name: name.to_string(),
            is_async,
            params,
            assigned: Vec::new(),
            referenced: Vec::new(),
            globals: Vec::new(),
            nonlocals: Vec::new(),
            has_yield: false,
            children: Vec::new(),
        }
    }

    fn is_function(&self) -> bool {
        matches!(self.kind, ScopeKind::Function | ScopeKind::Lambda)
    }

    fn assign(&mut self, name: &str) {
        if !self.assigned.iter().any(|n| n == name) {
            self.assigned.push(name.to_string());
        }
    }

    fn reference(&mut self, name: &str) {
        if !self.referenced.iter().any(|n| n == name) {
            self.referenced.push(name.to_string());
        }
    }
}

fn visit_body(scope: &mut RawScope, body: &[Stmt]) -> Result<()> {
    for stmt in body {
        visit_stmt(scope, stmt)?;
    }
    Ok(())
}

fn visit_defaults(scope: &mut RawScope, params: &Parameters) -> Result<()> {
    for param in params.positional.iter().chain(params.kwonly.iter()) {
        if let Some(default) = &param.default {
            visit_expr(scope, default)?;
        }
    }
    Ok(())
}

fn visit_stmt(scope: &mut RawScope, stmt: &Stmt) -> Result<()> {
    match &stmt.kind {
        StmtKind::FunctionDef(def) => {
            for decorator in &def.decorators {
                visit_expr(scope, decorator)?;
            }
            visit_defaults(scope, &def.params)?;
            scope.assign(&def.name);
            let params = def.params.names().into_iter().map(String::from).collect();
            let mut child = RawScope::new(ScopeKind::Function, &def.name, def.is_async, params);
            visit_body(&mut child, &def.body)?;
            scope.children.push((node_key(&**def), child));
        }
        StmtKind::ClassDef(class) => {
            for decorator in &class.decorators {
                visit_expr(scope, decorator)?;
            }
            for base in &class.bases {
                visit_expr(scope, base)?;
            }
            scope.assign(&class.name);
            let mut child = RawScope::new(ScopeKind::Class, &class.name, false, Vec::new());
            visit_body(&mut child, &class.body)?;
            scope.children.push((node_key(&**class), child));
        }
        StmtKind::Return(value) => {
            if !scope.is_function() {
                return Err(LangError::syntax(stmt.loc, "'return' outside function"));
            }
            if let Some(value) = value {
                visit_expr(scope, value)?;
            }
        }
        StmtKind::Assign { targets, value } => {
            visit_expr(scope, value)?;
            for target in targets {
                visit_target(scope, target)?;
            }
        }
        StmtKind::AugAssign { target, value, .. } => {
            if let ExprKind::Name(name) = &target.kind {
                scope.reference(name);
                scope.assign(name);
            } else {
                visit_expr(scope, target)?;
            }
            visit_expr(scope, value)?;
        }
        StmtKind::Expr(expr) => visit_expr(scope, expr)?,
        StmtKind::If { test, body, orelse } => {
            visit_expr(scope, test)?;
            visit_body(scope, body)?;
            visit_body(scope, orelse)?;
        }
        StmtKind::While { test, body } => {
            visit_expr(scope, test)?;
            visit_body(scope, body)?;
        }
        StmtKind::For { target, iter, body } => {
            visit_expr(scope, iter)?;
            visit_target(scope, target)?;
            visit_body(scope, body)?;
        }
        StmtKind::With { items, body } => {
            for item in items {
                visit_expr(scope, &item.context)?;
                if let Some(target) = &item.target {
                    visit_target(scope, target)?;
                }
            }
            visit_body(scope, body)?;
        }
        StmtKind::Try { body, handlers } => {
            visit_body(scope, body)?;
            for handler in handlers {
                if let Some(typ) = &handler.typ {
                    visit_expr(scope, typ)?;
                }
                if let Some(name) = &handler.name {
                    scope.assign(name);
                }
                visit_body(scope, &handler.body)?;
            }
        }
        StmtKind::Raise(value) => {
            if let Some(value) = value {
                visit_expr(scope, value)?;
            }
        }
        StmtKind::Assert { test, msg } => {
            visit_expr(scope, test)?;
            if let Some(msg) = msg {
                visit_expr(scope, msg)?;
            }
        }
        StmtKind::Global(names) => {
            for name in names {
                if scope.params.iter().any(|p| p == name) {
                    return Err(LangError::syntax(
                        stmt.loc,
                        format!("name '{}' is parameter and global", name),
                    ));
                }
                if !scope.globals.contains(name) {
                    scope.globals.push(name.clone());
                }
            }
        }
        StmtKind::Nonlocal(names) => {
            if !scope.is_function() {
                return Err(LangError::syntax(
                    stmt.loc,
                    "nonlocal declaration not allowed at module level",
                ));
            }
            for name in names {
                if scope.params.iter().any(|p| p == name) {
                    return Err(LangError::syntax(
                        stmt.loc,
                        format!("name '{}' is parameter and nonlocal", name),
                    ));
                }
                scope.nonlocals.push((name.clone(), stmt.loc));
            }
        }
        StmtKind::Pass | StmtKind::Break | StmtKind::Continue => {}
    }
    Ok(())
}

fn visit_target(scope: &mut RawScope, target: &Expr) -> Result<()> {
    match &target.kind {
        ExprKind::Name(name) => {
            scope.assign(name);
            Ok(())
        }
        ExprKind::Attribute { value, .. } => visit_expr(scope, value),
        ExprKind::Subscript { value, index } => {
            visit_expr(scope, value)?;
            visit_expr(scope, index)
        }
        _ => Err(LangError::syntax(target.loc, "cannot assign to expression")),
    }
}

fn visit_expr(scope: &mut RawScope, expr: &Expr) -> Result<()> {
    match &expr.kind {
        ExprKind::Name(name) => {
            scope.reference(name);
            return Ok(());
        }
        ExprKind::Yield(_) | ExprKind::YieldFrom(_) => {
            if !scope.is_function() {
                return Err(LangError::syntax(expr.loc, "'yield' outside function"));
            }
            if scope.is_async {
                return Err(LangError::syntax(expr.loc, "'yield' inside async function"));
            }
            scope.has_yield = true;
        }
        ExprKind::Await(_) => {
            if !scope.is_function() {
                return Err(LangError::syntax(expr.loc, "'await' outside function"));
            }
            if !scope.is_async {
                return Err(LangError::syntax(expr.loc, "'await' outside async function"));
            }
        }
        ExprKind::Lambda { params, body } => {
            visit_defaults(scope, params)?;
            let names = params.names().into_iter().map(String::from).collect();
            let mut child = RawScope::new(ScopeKind::Lambda, "<lambda>", false, names);
            visit_expr(&mut child, body)?;
            scope.children.push((node_key(&**params), child));
            return Ok(());
        }
        _ => {}
    }
    for child in expr.children() {
        visit_expr(scope, child)?;
    }
    Ok(())
}

/// Resolve the names of `raw` given the names bound by enclosing functions.
///
/// Returns the table and the set of names this scope needs from outside.
fn analyze(raw: RawScope, enclosing: &HashSet<String>) -> Result<(SymbolTable, HashSet<String>)> {
    match raw.kind {
        ScopeKind::Module => analyze_module_scope(raw),
        ScopeKind::Class => analyze_class(raw, enclosing),
        ScopeKind::Function | ScopeKind::Lambda => analyze_function(raw, enclosing),
    }
}

fn analyze_children(
    children: Vec<(usize, RawScope)>,
    enclosing: &HashSet<String>,
) -> Result<(HashMap<usize, SymbolTable>, HashSet<String>)> {
    let mut tables = HashMap::new();
    let mut free = HashSet::new();
    for (key, child) in children {
        let (table, child_free) = analyze(child, enclosing)?;
        free.extend(child_free);
        tables.insert(key, table);
    }
    Ok((tables, free))
}

fn analyze_module_scope(raw: RawScope) -> Result<(SymbolTable, HashSet<String>)> {
    let (children, _) = analyze_children(raw.children, &HashSet::new())?;
    let symbols = raw
        .assigned
        .iter()
        .chain(raw.referenced.iter())
        .map(|name| (name.clone(), Symbol::Name))
        .collect();
    let table = SymbolTable {
        kind: ScopeKind::Module,
        name: raw.name,
        symbols,
        varnames: Vec::new(),
        cellvars: Vec::new(),
        freevars: Vec::new(),
        is_generator: false,
        is_coroutine: false,
        children,
    };
    Ok((table, HashSet::new()))
}

fn analyze_class(raw: RawScope, enclosing: &HashSet<String>) -> Result<(SymbolTable, HashSet<String>)> {
    let (children, child_free) = analyze_children(raw.children, enclosing)?;

    let mut symbols = HashMap::new();
    let mut free: HashSet<String> = child_free;
    for name in &raw.assigned {
        symbols.insert(name.clone(), Symbol::Name);
    }
    for name in &raw.globals {
        symbols.insert(name.clone(), Symbol::GlobalExplicit);
    }
    for name in &raw.referenced {
        if symbols.contains_key(name) {
            continue;
        }
        if enclosing.contains(name) {
            symbols.insert(name.clone(), Symbol::Free);
            free.insert(name.clone());
        } else {
            symbols.insert(name.clone(), Symbol::Name);
        }
    }

    let mut freevars: Vec<String> = free.iter().cloned().collect();
    freevars.sort();
    let table = SymbolTable {
        kind: ScopeKind::Class,
        name: raw.name,
        symbols,
        varnames: Vec::new(),
        cellvars: Vec::new(),
        freevars,
        is_generator: false,
        is_coroutine: false,
        children,
    };
    Ok((table, free))
}

fn analyze_function(raw: RawScope, enclosing: &HashSet<String>) -> Result<(SymbolTable, HashSet<String>)> {
    let nonlocal_names: HashSet<&str> = raw.nonlocals.iter().map(|(n, _)| n.as_str()).collect();
    for (name, loc) in &raw.nonlocals {
        if !enclosing.contains(name) {
            return Err(LangError::syntax(
                *loc,
                format!("no binding for nonlocal '{}' found", name),
            ));
        }
    }

    let mut locals: Vec<String> = raw.params.clone();
    for name in &raw.assigned {
        if raw.globals.contains(name) || nonlocal_names.contains(name.as_str()) {
            continue;
        }
        if !locals.contains(name) {
            locals.push(name.clone());
        }
    }

    let mut child_enclosing: HashSet<String> = enclosing
        .iter()
        .filter(|name| !raw.globals.contains(name))
        .cloned()
        .collect();
    child_enclosing.extend(locals.iter().cloned());
    let (children, child_free) = analyze_children(raw.children, &child_enclosing)?;

    let mut symbols = HashMap::new();
    for name in &locals {
        symbols.insert(name.clone(), Symbol::Local);
    }
    for name in &raw.globals {
        symbols.insert(name.clone(), Symbol::GlobalExplicit);
    }
    let mut free = HashSet::new();
    for name in nonlocal_names {
        symbols.insert(name.to_string(), Symbol::Free);
        free.insert(name.to_string());
    }
    for name in &raw.referenced {
        if symbols.contains_key(name) {
            continue;
        }
        if enclosing.contains(name) {
            symbols.insert(name.clone(), Symbol::Free);
            free.insert(name.clone());
        } else {
            symbols.insert(name.clone(), Symbol::GlobalImplicit);
        }
    }
    for name in child_free {
        match symbols.get(&name) {
            Some(Symbol::Local) | Some(Symbol::Cell) => {
                symbols.insert(name, Symbol::Cell);
            }
            Some(Symbol::Free) => {}
            _ => {
                symbols.insert(name.clone(), Symbol::Free);
                free.insert(name);
            }
        }
    }

    let mut cellvars: Vec<String> = symbols
        .iter()
        .filter(|(_, symbol)| **symbol == Symbol::Cell)
        .map(|(name, _)| name.clone())
        .collect();
    cellvars.sort();
    let mut freevars: Vec<String> = free.iter().cloned().collect();
    freevars.sort();

    let params = raw.params.len();
    let varnames = locals
        .into_iter()
        .enumerate()
        .filter(|(i, name)| *i < params || symbols.get(name) == Some(&Symbol::Local))
        .map(|(_, name)| name)
        .collect();

    let table = SymbolTable {
        kind: raw.kind,
        name: raw.name,
        symbols,
        varnames,
        cellvars,
        freevars,
        is_generator: raw.has_yield,
        is_coroutine: raw.is_async,
        children,
    };
    Ok((table, free))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;

    fn first_function(module: &Module) -> &FunctionDef {
        match &module.body[0].kind {
            StmtKind::FunctionDef(def) => def,
            other => panic!("expected a function, got {:?}", other),
        }
    }

    fn inner_function(def: &FunctionDef) -> &FunctionDef {
        def.body
            .iter()
            .find_map(|stmt| match &stmt.kind {
                StmtKind::FunctionDef(inner) => Some(&**inner),
                _ => None,
            })
            .expect("inner function")
    }

    #[test]
    fn test_captured_local_becomes_cell() {
        let module = parse_source("def outer():\n    x = 1\n    def inner():\n        return x\n    return inner\n").unwrap();
        let table = analyze_module(&module).unwrap();
        let outer_def = first_function(&module);
        let outer = table.function_child(outer_def).unwrap();
        assert_eq!(outer.symbol("x"), Some(Symbol::Cell));
        assert_eq!(outer.cellvars, vec!["x".to_string()]);

        let inner = outer.function_child(inner_function(outer_def)).unwrap();
        assert_eq!(inner.symbol("x"), Some(Symbol::Free));
        assert_eq!(inner.freevars, vec!["x".to_string()]);
    }

    #[test]
    fn test_unbound_reference_is_implicit_global() {
        let module = parse_source("def f():\n    return len(items)\n").unwrap();
        let table = analyze_module(&module).unwrap();
        let f = table.function_child(first_function(&module)).unwrap();
        assert_eq!(f.symbol("items"), Some(Symbol::GlobalImplicit));
        assert_eq!(f.symbol("len"), Some(Symbol::GlobalImplicit));
    }

    #[test]
    fn test_nonlocal_without_binding_is_rejected() {
        let module = parse_source("def f():\n    nonlocal x\n    x = 1\n").unwrap();
        let err = analyze_module(&module).unwrap_err();
        assert!(err.to_string().contains("no binding for nonlocal 'x' found"));
    }

    #[test]
    fn test_class_scope_is_skipped_for_methods() {
        let source = "def f():\n    value = 1\n    class C:\n        value = 2\n        def method(self):\n            return value\n    return C\n";
        let module = parse_source(source).unwrap();
        let table = analyze_module(&module).unwrap();
        let f = table.function_child(first_function(&module)).unwrap();
        assert_eq!(f.symbol("value"), Some(Symbol::Cell));
    }

    #[test]
    fn test_await_outside_async_function() {
        let module = parse_source("def f():\n    await g()\n").unwrap();
        let err = analyze_module(&module).unwrap_err();
        assert!(err.to_string().contains("'await' outside async function"));
    }

    #[test]
    fn test_generator_flag() {
        let module = parse_source("def f():\n    yield 1\n").unwrap();
        let table = analyze_module(&module).unwrap();
        let f = table.function_child(first_function(&module)).unwrap();
        assert!(f.is_generator);
        assert!(!f.is_coroutine);
    }
}
