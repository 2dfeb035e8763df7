//! Syntax tree for templar scripts
//!
//! The tree is owned and mutable so that passes can rewrite it in place.
//! Every statement and expression carries the location it was parsed from.

use crate::error::Loc;

/// A parsed source file
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub loc: Loc,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    FunctionDef(Box<FunctionDef>),
    ClassDef(Box<ClassDef>),
    Return(Option<Expr>),
    Assign {
        targets: Vec<Expr>,
        value: Expr,
    },
    AugAssign {
        target: Expr,
        op: BinOp,
        value: Expr,
    },
    Expr(Expr),
    If {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    While {
        test: Expr,
        body: Vec<Stmt>,
    },
    For {
        target: Expr,
        iter: Expr,
        body: Vec<Stmt>,
    },
    With {
        items: Vec<WithItem>,
        body: Vec<Stmt>,
    },
    Try {
        body: Vec<Stmt>,
        handlers: Vec<ExceptHandler>,
    },
    Raise(Option<Expr>),
    Assert {
        test: Expr,
        msg: Option<Expr>,
    },
    Pass,
    Break,
    Continue,
    Global(Vec<String>),
    Nonlocal(Vec<String>),
}

/// `def` or `async def`
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub is_async: bool,
    pub decorators: Vec<Expr>,
    pub params: Parameters,
    pub returns: Option<Expr>,
    pub body: Vec<Stmt>,
    /// Line of the first decorator, or of `def` when undecorated
    pub first_line: u32,
    /// Last line of the body
    pub last_line: u32,
}

impl FunctionDef {
    /// The docstring, if the body starts with a string literal
    pub fn docstring(&self) -> Option<&str> {
        docstring_of(&self.body)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef {
    pub name: String,
    pub bases: Vec<Expr>,
    pub decorators: Vec<Expr>,
    pub body: Vec<Stmt>,
    pub first_line: u32,
    pub last_line: u32,
}

pub(crate) fn docstring_of(body: &[Stmt]) -> Option<&str> {
    match body.first().map(|s| &s.kind) {
        Some(StmtKind::Expr(Expr {
            kind: ExprKind::Constant(Constant::Str(doc)),
            ..
        })) => Some(doc),
        _ => None,
    }
}

/// Formal parameters of a function or lambda
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Parameters {
    pub positional: Vec<Param>,
    pub vararg: Option<Param>,
    pub kwonly: Vec<Param>,
    pub kwarg: Option<Param>,
}

impl Parameters {
    /// Parameter names in frame-slot order
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.positional.iter().map(|p| p.name.as_str()).collect();
        names.extend(self.kwonly.iter().map(|p| p.name.as_str()));
        if let Some(vararg) = &self.vararg {
            names.push(&vararg.name);
        }
        if let Some(kwarg) = &self.kwarg {
            names.push(&kwarg.name);
        }
        names
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty()
            && self.vararg.is_none()
            && self.kwonly.is_empty()
            && self.kwarg.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub annotation: Option<Expr>,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WithItem {
    pub context: Expr,
    pub target: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExceptHandler {
    pub typ: Option<Expr>,
    pub name: Option<String>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub loc: Loc,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Name(String),
    Constant(Constant),
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Attribute {
        value: Box<Expr>,
        attr: String,
    },
    Subscript {
        value: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        keywords: Vec<Keyword>,
    },
    BinOp {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    BoolOp {
        op: BoolOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Compare {
        left: Box<Expr>,
        op: CmpOp,
        right: Box<Expr>,
    },
    Lambda {
        params: Box<Parameters>,
        body: Box<Expr>,
    },
    Await(Box<Expr>),
    Yield(Option<Box<Expr>>),
    YieldFrom(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Keyword {
    pub name: String,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

impl BinOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Is,
    IsNot,
}

impl CmpOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::NotEq => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::In => "in",
            CmpOp::NotIn => "not in",
            CmpOp::Is => "is",
            CmpOp::IsNot => "is not",
        }
    }
}

impl Stmt {
    pub fn new(kind: StmtKind, loc: Loc) -> Self {
        Self { kind, loc }
    }

    /// Nested statement lists owned by this statement
    pub fn bodies_mut(&mut self) -> Vec<&mut Vec<Stmt>> {
        match &mut self.kind {
            StmtKind::FunctionDef(def) => vec![&mut def.body],
            StmtKind::ClassDef(class) => vec![&mut class.body],
            StmtKind::If { body, orelse, .. } => vec![body, orelse],
            StmtKind::While { body, .. } | StmtKind::For { body, .. } | StmtKind::With { body, .. } => {
                vec![body]
            }
            StmtKind::Try { body, handlers } => {
                let mut bodies = vec![body];
                bodies.extend(handlers.iter_mut().map(|h| &mut h.body));
                bodies
            }
            _ => Vec::new(),
        }
    }

    /// Nested statement lists owned by this statement
    pub fn bodies(&self) -> Vec<&Vec<Stmt>> {
        match &self.kind {
            StmtKind::FunctionDef(def) => vec![&def.body],
            StmtKind::ClassDef(class) => vec![&class.body],
            StmtKind::If { body, orelse, .. } => vec![body, orelse],
            StmtKind::While { body, .. } | StmtKind::For { body, .. } | StmtKind::With { body, .. } => {
                vec![body]
            }
            StmtKind::Try { body, handlers } => {
                let mut bodies = vec![body];
                bodies.extend(handlers.iter().map(|h| &h.body));
                bodies
            }
            _ => Vec::new(),
        }
    }

    /// Expressions directly owned by this statement (not those of nested statements)
    pub fn exprs_mut(&mut self) -> Vec<&mut Expr> {
        match &mut self.kind {
            StmtKind::FunctionDef(def) => {
                let mut exprs: Vec<&mut Expr> = def.decorators.iter_mut().collect();
                exprs.extend(params_exprs_mut(&mut def.params));
                exprs.extend(def.returns.as_mut());
                exprs
            }
            StmtKind::ClassDef(class) => class.decorators.iter_mut().chain(class.bases.iter_mut()).collect(),
            StmtKind::Return(value) | StmtKind::Raise(value) => value.iter_mut().collect(),
            StmtKind::Assign { targets, value } => {
                let mut exprs: Vec<&mut Expr> = targets.iter_mut().collect();
                exprs.push(value);
                exprs
            }
            StmtKind::AugAssign { target, value, .. } => vec![target, value],
            StmtKind::Expr(expr) => vec![expr],
            StmtKind::If { test, .. } | StmtKind::While { test, .. } => vec![test],
            StmtKind::For { target, iter, .. } => vec![target, iter],
            StmtKind::With { items, .. } => items
                .iter_mut()
                .flat_map(|item| std::iter::once(&mut item.context).chain(item.target.as_mut()))
                .collect(),
            StmtKind::Try { handlers, .. } => handlers.iter_mut().filter_map(|h| h.typ.as_mut()).collect(),
            StmtKind::Assert { test, msg } => std::iter::once(test).chain(msg.as_mut()).collect(),
            StmtKind::Pass | StmtKind::Break | StmtKind::Continue | StmtKind::Global(_) | StmtKind::Nonlocal(_) => {
                Vec::new()
            }
        }
    }

    /// Expressions directly owned by this statement (not those of nested statements)
    pub fn exprs(&self) -> Vec<&Expr> {
        match &self.kind {
            StmtKind::FunctionDef(def) => {
                let mut exprs: Vec<&Expr> = def.decorators.iter().collect();
                exprs.extend(params_exprs(&def.params));
                exprs.extend(def.returns.as_ref());
                exprs
            }
            StmtKind::ClassDef(class) => class.decorators.iter().chain(class.bases.iter()).collect(),
            StmtKind::Return(value) | StmtKind::Raise(value) => value.iter().collect(),
            StmtKind::Assign { targets, value } => {
                let mut exprs: Vec<&Expr> = targets.iter().collect();
                exprs.push(value);
                exprs
            }
            StmtKind::AugAssign { target, value, .. } => vec![target, value],
            StmtKind::Expr(expr) => vec![expr],
            StmtKind::If { test, .. } | StmtKind::While { test, .. } => vec![test],
            StmtKind::For { target, iter, .. } => vec![target, iter],
            StmtKind::With { items, .. } => items
                .iter()
                .flat_map(|item| std::iter::once(&item.context).chain(item.target.as_ref()))
                .collect(),
            StmtKind::Try { handlers, .. } => handlers.iter().filter_map(|h| h.typ.as_ref()).collect(),
            StmtKind::Assert { test, msg } => std::iter::once(test).chain(msg.as_ref()).collect(),
            StmtKind::Pass | StmtKind::Break | StmtKind::Continue | StmtKind::Global(_) | StmtKind::Nonlocal(_) => {
                Vec::new()
            }
        }
    }
}

fn params_exprs_mut(params: &mut Parameters) -> Vec<&mut Expr> {
    let mut exprs = Vec::new();
    for param in params
        .positional
        .iter_mut()
        .chain(params.vararg.iter_mut())
        .chain(params.kwonly.iter_mut())
        .chain(params.kwarg.iter_mut())
    {
        exprs.extend(param.annotation.as_mut());
        exprs.extend(param.default.as_mut());
    }
    exprs
}

fn params_exprs(params: &Parameters) -> Vec<&Expr> {
    let mut exprs = Vec::new();
    for param in params
        .positional
        .iter()
        .chain(params.vararg.iter())
        .chain(params.kwonly.iter())
        .chain(params.kwarg.iter())
    {
        exprs.extend(param.annotation.as_ref());
        exprs.extend(param.default.as_ref());
    }
    exprs
}

impl Expr {
    pub fn new(kind: ExprKind, loc: Loc) -> Self {
        Self { kind, loc }
    }

    pub fn name(name: impl Into<String>, loc: Loc) -> Self {
        Self::new(ExprKind::Name(name.into()), loc)
    }

    pub fn constant(value: Constant, loc: Loc) -> Self {
        Self::new(ExprKind::Constant(value), loc)
    }

    /// The identifier if this is a bare name
    pub fn as_name(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Name(name) => Some(name),
            _ => None,
        }
    }

    /// Immediate subexpressions
    pub fn children_mut(&mut self) -> Vec<&mut Expr> {
        match &mut self.kind {
            ExprKind::Name(_) | ExprKind::Constant(_) => Vec::new(),
            ExprKind::List(items) => items.iter_mut().collect(),
            ExprKind::Dict(pairs) => pairs.iter_mut().flat_map(|(k, v)| [k, v]).collect(),
            ExprKind::Attribute { value, .. } => vec![&mut **value],
            ExprKind::Subscript { value, index } => vec![&mut **value, &mut **index],
            ExprKind::Call { func, args, keywords } => std::iter::once(&mut **func)
                .chain(args.iter_mut())
                .chain(keywords.iter_mut().map(|k| &mut k.value))
                .collect(),
            ExprKind::BinOp { left, right, .. }
            | ExprKind::BoolOp { left, right, .. }
            | ExprKind::Compare { left, right, .. } => vec![&mut **left, &mut **right],
            ExprKind::UnaryOp { operand, .. } => vec![&mut **operand],
            ExprKind::Lambda { params, body } => {
                let mut exprs = params_exprs_mut(params);
                exprs.push(&mut **body);
                exprs
            }
            ExprKind::Await(value) | ExprKind::YieldFrom(value) => vec![&mut **value],
            ExprKind::Yield(value) => value.iter_mut().map(|v| &mut **v).collect(),
        }
    }

    /// Immediate subexpressions
    pub fn children(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::Name(_) | ExprKind::Constant(_) => Vec::new(),
            ExprKind::List(items) => items.iter().collect(),
            ExprKind::Dict(pairs) => pairs.iter().flat_map(|(k, v)| [k, v]).collect(),
            ExprKind::Attribute { value, .. } => vec![&**value],
            ExprKind::Subscript { value, index } => vec![&**value, &**index],
            ExprKind::Call { func, args, keywords } => std::iter::once(&**func)
                .chain(args.iter())
                .chain(keywords.iter().map(|k| &k.value))
                .collect(),
            ExprKind::BinOp { left, right, .. }
            | ExprKind::BoolOp { left, right, .. }
            | ExprKind::Compare { left, right, .. } => vec![&**left, &**right],
            ExprKind::UnaryOp { operand, .. } => vec![&**operand],
            ExprKind::Lambda { params, body } => {
                let mut exprs = params_exprs(params);
                exprs.push(&**body);
                exprs
            }
            ExprKind::Await(value) | ExprKind::YieldFrom(value) => vec![&**value],
            ExprKind::Yield(value) => value.iter().map(|v| &**v).collect(),
        }
    }

    /// Visit this expression and all subexpressions, children first.
    pub fn walk_mut<E>(&mut self, f: &mut impl FnMut(&mut Expr) -> Result<(), E>) -> Result<(), E> {
        for child in self.children_mut() {
            child.walk_mut(f)?;
        }
        f(self)
    }

    /// Visit this expression and all subexpressions, parents first.
    pub fn walk(&self, f: &mut impl FnMut(&Expr)) {
        f(self);
        for child in self.children() {
            child.walk(f);
        }
    }
}

/// Visit every expression in a statement list, including nested statements.
pub fn walk_exprs_mut<E>(
    stmts: &mut [Stmt],
    f: &mut impl FnMut(&mut Expr) -> Result<(), E>,
) -> Result<(), E> {
    for stmt in stmts.iter_mut() {
        for expr in stmt.exprs_mut() {
            expr.walk_mut(f)?;
        }
        for body in stmt.bodies_mut() {
            walk_exprs_mut(body, f)?;
        }
    }
    Ok(())
}

/// Visit every expression in a statement list, including nested statements.
pub fn walk_exprs(stmts: &[Stmt], f: &mut impl FnMut(&Expr)) {
    for stmt in stmts {
        for expr in stmt.exprs() {
            expr.walk(f);
        }
        for body in stmt.bodies() {
            walk_exprs(body, f);
        }
    }
}

/// Visit every statement list, innermost lists first, ending with `stmts` itself.
pub fn for_each_body_mut(stmts: &mut Vec<Stmt>, f: &mut impl FnMut(&mut Vec<Stmt>)) {
    for stmt in stmts.iter_mut() {
        for body in stmt.bodies_mut() {
            for_each_body_mut(body, f);
        }
    }
    f(stmts);
}

/// Visit every statement, parents first.
pub fn walk_stmts(stmts: &[Stmt], f: &mut impl FnMut(&Stmt)) {
    for stmt in stmts {
        f(stmt);
        for body in stmt.bodies() {
            walk_stmts(body, f);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> Loc {
        Loc::new(1, 1)
    }

    #[test]
    fn test_walk_mut_replaces_nested_calls() {
        let call = Expr::new(
            ExprKind::Call {
                func: Box::new(Expr::name("marker", loc())),
                args: vec![Expr::name("x", loc())],
                keywords: Vec::new(),
            },
            loc(),
        );
        let mut stmts = vec![Stmt::new(StmtKind::Return(Some(call)), loc())];

        walk_exprs_mut(&mut stmts, &mut |expr: &mut Expr| -> Result<(), ()> {
            if let ExprKind::Call { func, args, .. } = &mut expr.kind {
                if func.as_name() == Some("marker") {
                    let arg = args.remove(0);
                    *expr = Expr::new(ExprKind::Await(Box::new(arg)), expr.loc);
                }
            }
            Ok(())
        })
        .unwrap();

        match &stmts[0].kind {
            StmtKind::Return(Some(Expr {
                kind: ExprKind::Await(inner),
                ..
            })) => assert_eq!(inner.as_name(), Some("x")),
            other => panic!("unexpected statement: {:?}", other),
        }
    }

    #[test]
    fn test_for_each_body_visits_inner_first() {
        let inner = Stmt::new(
            StmtKind::While {
                test: Expr::constant(Constant::Bool(true), loc()),
                body: vec![Stmt::new(StmtKind::Break, loc())],
            },
            loc(),
        );
        let mut stmts = vec![inner, Stmt::new(StmtKind::Pass, loc())];
        let mut sizes = Vec::new();
        for_each_body_mut(&mut stmts, &mut |body| sizes.push(body.len()));
        assert_eq!(sizes, vec![1, 2]);
    }

    #[test]
    fn test_parameter_slot_order() {
        let param = |name: &str| Param {
            name: name.to_string(),
            annotation: None,
            default: None,
        };
        let params = Parameters {
            positional: vec![param("a"), param("b")],
            vararg: Some(param("args")),
            kwonly: vec![param("c")],
            kwarg: Some(param("kwargs")),
        };
        assert_eq!(params.names(), vec!["a", "b", "c", "args", "kwargs"]);
    }
}
