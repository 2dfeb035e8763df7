use templar_lang::ast::{Constant, Expr, FunctionDef, Module, Parameters, Stmt, StmtKind};
use templar_lang::Loc;

/// Name of the synthetic outer definition
pub const WRAPPER_NAME: &str = "__templar_wrapper__";

/// Name the rewritten definition is compiled under
pub const VARIANT_NAME: &str = "__templar_variant__";

/// Nest `def` in a zero-argument definition that binds every name in
/// `freevars` and returns the nested function.
///
/// Compiled this way the nested function closes over exactly the
/// template's free variables that it still uses. It is renamed so that
/// a template calling itself by name keeps resolving that name through
/// its own globals or closure.
pub fn closure_wrapper(mut def: FunctionDef, loc: Loc, freevars: &[String]) -> Module {
    def.name = VARIANT_NAME.to_string();
    let (first_line, last_line) = (def.first_line, def.last_line);

    let mut body: Vec<Stmt> = freevars
        .iter()
        .map(|name| {
            Stmt::new(
                StmtKind::Assign {
                    targets: vec![Expr::name(name.as_str(), loc)],
                    value: Expr::constant(Constant::None, loc),
                },
                loc,
            )
        })
        .collect();
    body.push(Stmt::new(StmtKind::FunctionDef(Box::new(def)), loc));
    body.push(Stmt::new(StmtKind::Return(Some(Expr::name(VARIANT_NAME, loc))), loc));

    let wrapper = FunctionDef {
        name: WRAPPER_NAME.to_string(),
        is_async: false,
        decorators: Vec::new(),
        params: Parameters::default(),
        returns: None,
        body,
        first_line,
        last_line,
    };
    Module {
        body: vec![Stmt::new(StmtKind::FunctionDef(Box::new(wrapper)), loc)],
    }
}
