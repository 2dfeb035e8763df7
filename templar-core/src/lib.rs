//! # Templar template engine
//!
//! Write one function, get several. A template marks regions with
//! `with sync_context:`, `with async_context:`, `with generator_context:`,
//! `with variant_context("name"):` and `with patch_context("name"):`, and
//! marks suspension points with `await_it(...)` and delegation with
//! `yield_from_it(...)`. The engine re-reads the template's source, keeps
//! the regions that belong to the requested variant, translates the call
//! markers, compiles the result and rebinds it to the template's closure
//! and globals.
//!
//! ## Example
//!
//! ```ignore
//! let mut interp = Interpreter::new();
//! templar_core::install(&mut interp, EngineConfig::default())?;
//! interp.run_module("demo", r#"
//! @transfunction
//! def template():
//!     with sync_context:
//!         return 1
//!     with async_context:
//!         return 2
//!
//! print(template.get_usual_function()())
//! print(run(template.get_async_function()()))
//! "#)?;
//! ```

pub mod config;
pub mod decorator;
pub mod error;
pub mod markers;
pub mod namespace;
pub mod rebuild;
pub mod rewriter;
pub mod transformer;
pub mod transforms;

#[cfg(test)]
mod tests;

// Re-export key types
pub use config::{ConfigError, EngineConfig};
pub use decorator::{transformer_of, TransformerObject};
pub use error::{Result, TransfunctionError, AMBIGUOUS_FRAME_MESSAGE, CALL_DIRECTLY_MESSAGE};
pub use markers::{BlockMarker, CallMarker};
pub use namespace::LexicalNamespace;
pub use transformer::{CallSite, Transformer, VariantRequest};
pub use transforms::{ForbidCommonReturns, TransformContext, TreeTransform};

use std::sync::Arc;
use templar_lang::Interpreter;

/// Install the entry decorator, the marker objects and the engine's
/// exception classes into an interpreter
pub fn install(interp: &mut Interpreter, config: EngineConfig) -> Result<Arc<EngineConfig>> {
    config.validate()?;
    interp.set_recursion_limit(config.recursion_limit);
    let config = Arc::new(config);
    error::register_classes(interp);
    markers::install(interp);
    decorator::install(interp, config.clone());
    tracing::debug!(decorator = %config.decorator_name, "installed template engine");
    Ok(config)
}
