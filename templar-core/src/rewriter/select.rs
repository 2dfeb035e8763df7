//! Marker block selection

use crate::error::{Result, TransfunctionError};
use crate::markers::{kind_marker, BlockMarker};
use crate::transformer::VariantRequest;
use templar_lang::ast::{Stmt, StmtKind};
use templar_types::FunctionKind;

fn block_marker(stmt: &Stmt) -> Result<Option<BlockMarker>> {
    match &stmt.kind {
        StmtKind::With { items, .. } => BlockMarker::parse(items),
        _ => Ok(None),
    }
}

/// Reject kind blocks nested in kind blocks they can never be selected with
pub(crate) fn check_nesting(body: &[Stmt], enclosing: Option<&[FunctionKind]>) -> Result<()> {
    for stmt in body {
        let marker = block_marker(stmt)?;
        let mut inner = enclosing;
        if let Some(BlockMarker::Kinds(kinds)) = &marker {
            if let Some(outer) = enclosing {
                if !kinds.iter().any(|kind| outer.contains(kind)) {
                    return Err(TransfunctionError::wrong_marker(format!(
                        "The \"{}\" marker cannot be used inside a \"{}\" block.",
                        kind_marker(kinds[0]),
                        kind_marker(outer[0])
                    )));
                }
            }
            inner = Some(kinds.as_slice());
        }
        for nested in stmt.bodies() {
            check_nesting(nested, inner)?;
        }
    }
    Ok(())
}

/// Unwrap the marker blocks the request selects and delete the others.
///
/// Nested blocks are resolved before the block containing them. Statements
/// using only ordinary context managers are kept as they are.
pub(crate) fn select_blocks(body: &mut Vec<Stmt>, request: &VariantRequest) -> Result<()> {
    for mut stmt in std::mem::take(body) {
        for nested in stmt.bodies_mut() {
            select_blocks(nested, request)?;
        }
        match block_marker(&stmt)? {
            None => body.push(stmt),
            Some(marker) if marker.selects(request) => {
                if let StmtKind::With { body: inner, .. } = stmt.kind {
                    body.extend(inner);
                }
            }
            Some(_) => {}
        }
    }
    Ok(())
}
