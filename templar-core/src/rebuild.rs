//! Closure and identity rebuilding
//!
//! A freshly compiled variant closes over placeholder cells and sees the
//! synthetic namespace as its globals. [`rebuild`] swaps both for the
//! template's own, so the variant shares state with the template exactly
//! like a hand-written function defined in the same place would.

use crate::error::{Result, TransfunctionError};
use std::sync::Arc;
use templar_lang::{Cell, Function};

/// Build the final variant from the raw compiled function and its template.
///
/// Runs no script code.
pub fn rebuild(raw: &Function, template: &Function) -> Result<Arc<Function>> {
    let keep: Vec<String> = raw
        .code
        .freevars
        .iter()
        .filter(|name| template.code.freevars.contains(name))
        .cloned()
        .collect();

    let mut code = raw.code.with_freevars(&keep).ok_or_else(|| {
        TransfunctionError::WrongTransfunctionSyntax(format!(
            "The generated code for '{}' refers to variables that are not available in its closure.",
            template.qualname
        ))
    })?;
    code.name = template.code.name.clone();
    code.qualname = template.qualname.clone();

    let closure = keep
        .iter()
        .map(|name| captured_cell(template, name))
        .collect::<Result<Vec<Cell>>>()?;

    let mut function = Function::new(
        Arc::new(code),
        template.globals.clone(),
        template.defaults.clone(),
        template.kwdefaults.clone(),
        closure,
    );
    function.name = template.name.clone();
    function.qualname = template.qualname.clone();
    function.doc = raw.doc.clone().or_else(|| template.doc.clone());
    function.module = template.module.clone();
    *function.dict.get_mut() = template.dict.lock().clone();

    Ok(Arc::new(function))
}

fn captured_cell(template: &Function, name: &str) -> Result<Cell> {
    template
        .code
        .freevars
        .iter()
        .position(|free| free == name)
        .and_then(|index| template.closure.get(index))
        .cloned()
        .ok_or_else(|| {
            TransfunctionError::WrongTransfunctionSyntax(format!(
                "The template '{}' has no closure cell for '{}'.",
                template.qualname, name
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use templar_lang::{Args, Interpreter, Namespace, Value};

    fn function(module: &templar_lang::ModuleNamespace, name: &str) -> Arc<Function> {
        match module.get(name) {
            Some(Value::Function(f)) => f,
            other => panic!("Expected function {}, got {:?}", name, other),
        }
    }

    #[test]
    fn test_rebinds_to_template_cells() {
        let source = "\
def outer():
    a = 1
    b = 2
    def template(x=[]):
        'Doc.'
        return [a, b, x]
    def raw(x=None):
        return b
    return [template, raw]
pair = outer()
template = pair[0]
raw = pair[1]
";
        let mut interp = Interpreter::new();
        let module = interp.run_module("rebuild", source).unwrap();
        let template = function(&module, "template");
        let raw = function(&module, "raw");

        let b = template.code.freevars.iter().position(|n| n == "b").unwrap();
        let rebuilt = rebuild(&raw, &template).unwrap();
        assert_eq!(rebuilt.code.freevars, vec!["b".to_string()]);
        assert!(Arc::ptr_eq(&rebuilt.closure[0], &template.closure[b]));
        assert_eq!(rebuilt.name, "template");
        assert_eq!(rebuilt.qualname, "outer.<locals>.template");
        assert_eq!(rebuilt.doc.as_deref(), Some("Doc."));
        assert!(rebuilt.defaults[0].is_identical(&template.defaults[0]));

        *template.closure[b].lock() = Some(Value::Int(20));
        let result = interp.call(&Value::Function(rebuilt), Args::default()).unwrap();
        assert_eq!(result.as_int(), Some(20));
    }
}
