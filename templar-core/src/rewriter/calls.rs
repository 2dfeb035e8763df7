//! Call marker translation

use crate::error::{Result, TransfunctionError};
use crate::markers::CallMarker;
use templar_lang::ast::{walk_exprs_mut, Expr, ExprKind, Stmt};
use templar_types::FunctionKind;

/// Replace `await_it(x)` with `await x` in coroutines and
/// `yield_from_it(x)` with `yield from x` in generators. A marker call that
/// cannot be translated for `kind` is an error.
pub(crate) fn translate(body: &mut [Stmt], kind: FunctionKind) -> Result<()> {
    walk_exprs_mut(body, &mut |expr: &mut Expr| -> Result<()> {
        let Some(marker) = CallMarker::of_call(expr) else {
            return Ok(());
        };
        let ExprKind::Call { args, keywords, .. } = &mut expr.kind else {
            return Ok(());
        };
        if args.len() != 1 || !keywords.is_empty() {
            return Err(TransfunctionError::wrong_marker(marker.arity_message()));
        }
        if kind != marker.target_kind() {
            return Err(TransfunctionError::wrong_marker(marker.misplaced_message()));
        }
        let operand = Box::new(args.remove(0));
        expr.kind = match marker {
            CallMarker::AwaitIt => ExprKind::Await(operand),
            CallMarker::YieldFromIt => ExprKind::YieldFrom(operand),
        };
        Ok(())
    })
}
