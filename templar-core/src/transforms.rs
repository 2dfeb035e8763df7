//! Extra passes run on a variant's tree after marker selection

use crate::error::{Result, TransfunctionError};
use crate::markers::BlockMarker;
use crate::transformer::VariantRequest;
use std::fmt;
use templar_lang::ast::{FunctionDef, Stmt, StmtKind};
use templar_types::FunctionKind;

/// What a transform may look at besides the tree it rewrites
pub struct TransformContext<'a> {
    pub request: &'a VariantRequest,
    /// The template definition before marker selection
    pub template: &'a FunctionDef,
    /// Add to tree lines to get source lines
    pub line_offset: u32,
}

/// A rewrite applied to every variant a transformer produces
pub trait TreeTransform: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn apply(&self, def: &mut FunctionDef, context: &TransformContext<'_>) -> Result<()>;
}

/// Rejects `return <value>` in the code a coroutine variant shares with the
/// other variants.
///
/// Returns inside marker blocks and inside nested definitions are allowed.
#[derive(Debug, Default, Clone, Copy)]
pub struct ForbidCommonReturns;

impl TreeTransform for ForbidCommonReturns {
    fn name(&self) -> &str {
        "forbid_common_returns"
    }

    fn apply(&self, _def: &mut FunctionDef, context: &TransformContext<'_>) -> Result<()> {
        if context.request.kind != FunctionKind::Coroutine {
            return Ok(());
        }
        match find_common_return(&context.template.body)? {
            Some(line) => Err(TransfunctionError::WrongTransfunctionSyntax(format!(
                "A return statement with a value outside of marker blocks is not allowed in a template used for coroutine functions (line {}).",
                line + context.line_offset
            ))),
            None => Ok(()),
        }
    }
}

fn find_common_return(body: &[Stmt]) -> Result<Option<u32>> {
    for stmt in body {
        match &stmt.kind {
            StmtKind::Return(Some(_)) => return Ok(Some(stmt.loc.line)),
            StmtKind::FunctionDef(_) | StmtKind::ClassDef(_) => continue,
            StmtKind::With { items, .. } if BlockMarker::parse(items)?.is_some() => continue,
            _ => {}
        }
        for nested in stmt.bodies() {
            if let Some(line) = find_common_return(nested)? {
                return Ok(Some(line));
            }
        }
    }
    Ok(None)
}
