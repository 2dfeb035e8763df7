//! Source-tree rewriting
//!
//! Turns the parsed definition of a template into the definition of one
//! variant. Every pass is a pure function of the tree and the request, so
//! the same inputs always produce the same tree:
//!
//! 1. [`strip_entry_decorator`] checks how the template was decorated
//! 2. [`Rewriter::rewrite`] selects marker blocks, translates call markers,
//!    converts the function kind and runs extra [`TreeTransform`]s
//! 3. [`closure_wrapper`] nests the result in a definition that recreates
//!    the template's free variables
//! 4. [`shift_lines`] moves the tree back to the template's source lines

mod calls;
mod decorators;
mod lines;
mod select;
mod wrap;

pub use decorators::strip_entry_decorator;
pub use lines::shift_lines;
pub use wrap::{closure_wrapper, VARIANT_NAME, WRAPPER_NAME};

use crate::error::Result;
use crate::transformer::VariantRequest;
use crate::transforms::{TransformContext, TreeTransform};
use std::sync::Arc;
use templar_lang::ast::{FunctionDef, Stmt, StmtKind};
use templar_types::FunctionKind;

pub struct Rewriter<'a> {
    request: &'a VariantRequest,
    transforms: &'a [Arc<dyn TreeTransform>],
    line_offset: u32,
}

impl<'a> Rewriter<'a> {
    pub fn new(request: &'a VariantRequest) -> Self {
        Self {
            request,
            transforms: &[],
            line_offset: 0,
        }
    }

    pub fn with_transforms(mut self, transforms: &'a [Arc<dyn TreeTransform>]) -> Self {
        self.transforms = transforms;
        self
    }

    /// Distance between the tree's line numbers and the template's source lines
    pub fn with_line_offset(mut self, offset: u32) -> Self {
        self.line_offset = offset;
        self
    }

    /// Rewrite a template definition (decorators already stripped) in place
    pub fn rewrite(&self, def: &mut FunctionDef) -> Result<()> {
        let template = def.clone();

        select::check_nesting(&def.body, None)?;
        select::select_blocks(&mut def.body, self.request)?;
        calls::translate(&mut def.body, self.request.kind)?;

        if self.request.kind == FunctionKind::Coroutine {
            def.is_async = true;
        }

        if def.body.is_empty() {
            let loc = templar_lang::Loc::new(def.first_line, 1);
            def.body.push(Stmt::new(StmtKind::Pass, loc));
        }

        let context = TransformContext {
            request: self.request,
            template: &template,
            line_offset: self.line_offset,
        };
        for transform in self.transforms {
            tracing::trace!(transform = transform.name(), "applying tree transform");
            transform.apply(def, &context)?;
        }
        Ok(())
    }
}
