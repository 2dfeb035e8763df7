//! Render syntax trees back to source text
//!
//! Output is canonical: four-space indentation, one statement per line and
//! parentheses only where precedence requires them.

use crate::ast::*;
use std::fmt::Write;

const INDENT: &str = "    ";

/// Render a module
pub fn unparse_module(module: &Module) -> String {
    let mut out = String::new();
    write_body(&mut out, &module.body, 0);
    out
}

/// Render a single function definition, decorators included
pub fn unparse_function(def: &FunctionDef) -> String {
    let mut out = String::new();
    write_function(&mut out, def, 0);
    out
}

/// Render one expression
pub fn unparse_expr(expr: &Expr) -> String {
    let mut out = String::new();
    write_expr(&mut out, expr, 0);
    out
}

fn write_body(out: &mut String, body: &[Stmt], depth: usize) {
    if body.is_empty() {
        line(out, depth, "pass");
    }
    for stmt in body {
        write_stmt(out, stmt, depth);
    }
}

fn line(out: &mut String, depth: usize, text: &str) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
    out.push_str(text);
    out.push('\n');
}

fn write_stmt(out: &mut String, stmt: &Stmt, depth: usize) {
    match &stmt.kind {
        StmtKind::FunctionDef(def) => write_function(out, def, depth),
        StmtKind::ClassDef(class) => {
            for decorator in &class.decorators {
                line(out, depth, &format!("@{}", unparse_expr(decorator)));
            }
            let header = if class.bases.is_empty() {
                format!("class {}:", class.name)
            } else {
                let bases: Vec<String> = class.bases.iter().map(unparse_expr).collect();
                format!("class {}({}):", class.name, bases.join(", "))
            };
            line(out, depth, &header);
            write_body(out, &class.body, depth + 1);
        }
        StmtKind::Return(None) => line(out, depth, "return"),
        StmtKind::Return(Some(value)) => line(out, depth, &format!("return {}", unparse_expr(value))),
        StmtKind::Assign { targets, value } => {
            let mut text = String::new();
            for target in targets {
                text.push_str(&unparse_expr(target));
                text.push_str(" = ");
            }
            text.push_str(&unparse_expr(value));
            line(out, depth, &text);
        }
        StmtKind::AugAssign { target, op, value } => line(
            out,
            depth,
            &format!("{} {}= {}", unparse_expr(target), op.symbol(), unparse_expr(value)),
        ),
        StmtKind::Expr(expr) => line(out, depth, &unparse_expr(expr)),
        StmtKind::If { test, body, orelse } => write_if(out, "if", test, body, orelse, depth),
        StmtKind::While { test, body } => {
            line(out, depth, &format!("while {}:", unparse_expr(test)));
            write_body(out, body, depth + 1);
        }
        StmtKind::For { target, iter, body } => {
            line(
                out,
                depth,
                &format!("for {} in {}:", unparse_expr(target), unparse_expr(iter)),
            );
            write_body(out, body, depth + 1);
        }
        StmtKind::With { items, body } => {
            let items: Vec<String> = items
                .iter()
                .map(|item| match &item.target {
                    Some(target) => format!("{} as {}", unparse_expr(&item.context), unparse_expr(target)),
                    None => unparse_expr(&item.context),
                })
                .collect();
            line(out, depth, &format!("with {}:", items.join(", ")));
            write_body(out, body, depth + 1);
        }
        StmtKind::Try { body, handlers } => {
            line(out, depth, "try:");
            write_body(out, body, depth + 1);
            for handler in handlers {
                let mut header = String::from("except");
                if let Some(typ) = &handler.typ {
                    header.push(' ');
                    header.push_str(&unparse_expr(typ));
                }
                if let Some(name) = &handler.name {
                    header.push_str(" as ");
                    header.push_str(name);
                }
                header.push(':');
                line(out, depth, &header);
                write_body(out, &handler.body, depth + 1);
            }
        }
        StmtKind::Raise(None) => line(out, depth, "raise"),
        StmtKind::Raise(Some(exc)) => line(out, depth, &format!("raise {}", unparse_expr(exc))),
        StmtKind::Assert { test, msg } => {
            let text = match msg {
                Some(msg) => format!("assert {}, {}", unparse_expr(test), unparse_expr(msg)),
                None => format!("assert {}", unparse_expr(test)),
            };
            line(out, depth, &text);
        }
        StmtKind::Pass => line(out, depth, "pass"),
        StmtKind::Break => line(out, depth, "break"),
        StmtKind::Continue => line(out, depth, "continue"),
        StmtKind::Global(names) => line(out, depth, &format!("global {}", names.join(", "))),
        StmtKind::Nonlocal(names) => line(out, depth, &format!("nonlocal {}", names.join(", "))),
    }
}

fn write_if(out: &mut String, keyword: &str, test: &Expr, body: &[Stmt], orelse: &[Stmt], depth: usize) {
    line(out, depth, &format!("{} {}:", keyword, unparse_expr(test)));
    write_body(out, body, depth + 1);
    match orelse {
        [] => {}
        [Stmt {
            kind:
                StmtKind::If {
                    test,
                    body,
                    orelse,
                },
            ..
        }] => write_if(out, "elif", test, body, orelse, depth),
        _ => {
            line(out, depth, "else:");
            write_body(out, orelse, depth + 1);
        }
    }
}

fn write_function(out: &mut String, def: &FunctionDef, depth: usize) {
    for decorator in &def.decorators {
        line(out, depth, &format!("@{}", unparse_expr(decorator)));
    }
    let mut header = String::new();
    if def.is_async {
        header.push_str("async ");
    }
    let _ = write!(header, "def {}({})", def.name, parameters(&def.params, true));
    if let Some(returns) = &def.returns {
        let _ = write!(header, " -> {}", unparse_expr(returns));
    }
    header.push(':');
    line(out, depth, &header);
    write_body(out, &def.body, depth + 1);
}

fn parameters(params: &Parameters, annotations: bool) -> String {
    let render = |param: &Param, prefix: &str| {
        let mut text = format!("{}{}", prefix, param.name);
        if annotations {
            if let Some(annotation) = &param.annotation {
                let _ = write!(text, ": {}", unparse_expr(annotation));
            }
        }
        if let Some(default) = &param.default {
            if annotations && param.annotation.is_some() {
                let _ = write!(text, " = {}", unparse_expr(default));
            } else {
                let _ = write!(text, "={}", unparse_expr(default));
            }
        }
        text
    };

    let mut parts: Vec<String> = params.positional.iter().map(|p| render(p, "")).collect();
    match &params.vararg {
        Some(vararg) => parts.push(render(vararg, "*")),
        None if !params.kwonly.is_empty() => parts.push("*".to_string()),
        None => {}
    }
    parts.extend(params.kwonly.iter().map(|p| render(p, "")));
    if let Some(kwarg) = &params.kwarg {
        parts.push(render(kwarg, "**"));
    }
    parts.join(", ")
}

/// Binding strength; higher binds tighter
fn precedence(expr: &Expr) -> u8 {
    match &expr.kind {
        ExprKind::Lambda { .. } | ExprKind::Yield(_) | ExprKind::YieldFrom(_) => 0,
        ExprKind::BoolOp { op: BoolOp::Or, .. } => 1,
        ExprKind::BoolOp { op: BoolOp::And, .. } => 2,
        ExprKind::UnaryOp { op: UnaryOp::Not, .. } => 3,
        ExprKind::Compare { .. } => 4,
        ExprKind::BinOp {
            op: BinOp::Add | BinOp::Sub,
            ..
        } => 5,
        ExprKind::BinOp {
            op: BinOp::Mul | BinOp::Div | BinOp::FloorDiv | BinOp::Mod,
            ..
        } => 6,
        ExprKind::UnaryOp { .. } => 7,
        ExprKind::BinOp { op: BinOp::Pow, .. } => 8,
        ExprKind::Await(_) => 9,
        _ => 10,
    }
}

fn write_expr(out: &mut String, expr: &Expr, min_precedence: u8) {
    let parens = precedence(expr) < min_precedence;
    if parens {
        out.push('(');
    }
    match &expr.kind {
        ExprKind::Name(name) => out.push_str(name),
        ExprKind::Constant(constant) => write_constant(out, constant),
        ExprKind::List(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(out, item, 1);
            }
            out.push(']');
        }
        ExprKind::Dict(pairs) => {
            out.push('{');
            for (i, (key, value)) in pairs.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(out, key, 1);
                out.push_str(": ");
                write_expr(out, value, 1);
            }
            out.push('}');
        }
        ExprKind::Attribute { value, attr } => {
            write_expr(out, value, 10);
            out.push('.');
            out.push_str(attr);
        }
        ExprKind::Subscript { value, index } => {
            write_expr(out, value, 10);
            out.push('[');
            write_expr(out, index, 0);
            out.push(']');
        }
        ExprKind::Call { func, args, keywords } => {
            write_expr(out, func, 10);
            out.push('(');
            let mut first = true;
            for arg in args {
                if !first {
                    out.push_str(", ");
                }
                first = false;
                write_expr(out, arg, 1);
            }
            for keyword in keywords {
                if !first {
                    out.push_str(", ");
                }
                first = false;
                out.push_str(&keyword.name);
                out.push('=');
                write_expr(out, &keyword.value, 1);
            }
            out.push(')');
        }
        ExprKind::BinOp { left, op, right } => {
            let own = precedence(expr);
            if *op == BinOp::Pow {
                write_expr(out, left, own + 1);
                out.push_str(" ** ");
                write_expr(out, right, own);
            } else {
                write_expr(out, left, own);
                let _ = write!(out, " {} ", op.symbol());
                write_expr(out, right, own + 1);
            }
        }
        ExprKind::UnaryOp { op, operand } => {
            let own = precedence(expr);
            match op {
                UnaryOp::Not => out.push_str("not "),
                UnaryOp::Neg => out.push('-'),
                UnaryOp::Pos => out.push('+'),
            }
            write_expr(out, operand, own);
        }
        ExprKind::BoolOp { op, left, right } => {
            let own = precedence(expr);
            write_expr(out, left, own);
            out.push_str(match op {
                BoolOp::And => " and ",
                BoolOp::Or => " or ",
            });
            write_expr(out, right, own + 1);
        }
        ExprKind::Compare { left, op, right } => {
            write_expr(out, left, 5);
            let _ = write!(out, " {} ", op.symbol());
            write_expr(out, right, 5);
        }
        ExprKind::Lambda { params, body } => {
            if params.is_empty() {
                out.push_str("lambda: ");
            } else {
                let _ = write!(out, "lambda {}: ", parameters(params, false));
            }
            write_expr(out, body, 0);
        }
        ExprKind::Await(value) => {
            out.push_str("await ");
            write_expr(out, value, 10);
        }
        ExprKind::Yield(None) => out.push_str("yield"),
        ExprKind::Yield(Some(value)) => {
            out.push_str("yield ");
            write_expr(out, value, 1);
        }
        ExprKind::YieldFrom(value) => {
            out.push_str("yield from ");
            write_expr(out, value, 1);
        }
    }
    if parens {
        out.push(')');
    }
}

fn write_constant(out: &mut String, constant: &Constant) {
    match constant {
        Constant::None => out.push_str("None"),
        Constant::Bool(true) => out.push_str("True"),
        Constant::Bool(false) => out.push_str("False"),
        Constant::Int(value) => {
            let _ = write!(out, "{}", value);
        }
        Constant::Float(value) => out.push_str(&format_float(*value)),
        Constant::Str(value) => out.push_str(&quote(value)),
    }
}

/// Format a float so it reads back as a float
pub fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

/// Quote a string with single quotes, escaping as needed
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}
