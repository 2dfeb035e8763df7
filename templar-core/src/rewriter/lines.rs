use templar_lang::ast::{for_each_body_mut, Expr, Stmt, StmtKind};

/// Move every location in `body` `offset` lines down
pub fn shift_lines(body: &mut Vec<Stmt>, offset: u32) {
    if offset == 0 {
        return;
    }
    for_each_body_mut(body, &mut |stmts: &mut Vec<Stmt>| {
        for stmt in stmts.iter_mut() {
            stmt.loc = stmt.loc.shifted(offset);
            match &mut stmt.kind {
                StmtKind::FunctionDef(def) => {
                    def.first_line += offset;
                    def.last_line += offset;
                }
                StmtKind::ClassDef(class) => {
                    class.first_line += offset;
                    class.last_line += offset;
                }
                _ => {}
            }
            for expr in stmt.exprs_mut() {
                let _ = expr.walk_mut(&mut |e: &mut Expr| -> Result<(), ()> {
                    e.loc = e.loc.shifted(offset);
                    Ok(())
                });
            }
        }
    });
}
