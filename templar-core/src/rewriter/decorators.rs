use crate::error::{Result, TransfunctionError};
use templar_lang::ast::{Expr, ExprKind, FunctionDef};

/// Check that the template carries the entry decorator exactly once, as its
/// only decorator, on `call_line`, then remove it.
///
/// `call_line` is the line (in the tree's numbering) the decorator was
/// applied from.
pub fn strip_entry_decorator(def: &mut FunctionDef, decorator_name: &str, call_line: u32) -> Result<()> {
    let Some(at_call_site) = def.decorators.iter().find(|d| d.loc.line == call_line) else {
        return Err(TransfunctionError::WrongDecoratorSyntax(format!(
            "The @{} decorator can only be used with the '@' symbol. Don't use it as a regular function. Also, don't rename it.",
            decorator_name
        )));
    };

    if !is_entry_decorator(at_call_site, decorator_name) {
        return Err(TransfunctionError::AliasedDecoratorSyntax(format!(
            "The @{} decorator cannot be used under another name. Don't rename it.",
            decorator_name
        )));
    }

    let uses = def
        .decorators
        .iter()
        .filter(|d| is_entry_decorator(d, decorator_name))
        .count();
    if uses > 1 {
        return Err(TransfunctionError::DualUseOfDecorator(format!(
            "You cannot use the '{}' decorator twice for the same function.",
            decorator_name
        )));
    }

    if def.decorators.len() > 1 {
        return Err(TransfunctionError::WrongDecoratorSyntax(format!(
            "The @{} decorator cannot be used in conjunction with other decorators.",
            decorator_name
        )));
    }

    def.decorators.clear();
    Ok(())
}

fn is_entry_decorator(expr: &Expr, name: &str) -> bool {
    match &expr.kind {
        ExprKind::Name(id) => id == name,
        ExprKind::Call { func, .. } => func.as_name() == Some(name),
        _ => false,
    }
}
