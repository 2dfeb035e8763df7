use crate::ast::{BinOp, BoolOp, CmpOp, Constant, ExprKind, FunctionDef, StmtKind};
use crate::parser::parse_source;

fn only_function(source: &str) -> FunctionDef {
    let module = parse_source(source).unwrap();
    match module.body.into_iter().next().map(|s| s.kind) {
        Some(StmtKind::FunctionDef(def)) => *def,
        other => panic!("Expected function definition, got {:?}", other),
    }
}

#[test]
fn test_parse_decorated_function() {
    let def = only_function("@first\n@second(1)\ndef f(a, b=2):\n    return a + b\n");
    assert_eq!(def.name, "f");
    assert!(!def.is_async);
    assert_eq!(def.decorators.len(), 2);
    assert_eq!(def.decorators[0].as_name(), Some("first"));
    assert!(matches!(def.decorators[1].kind, ExprKind::Call { .. }));
    assert_eq!(def.first_line, 1);
    assert_eq!(def.last_line, 4);
    assert_eq!(def.params.names(), vec!["a", "b"]);
    assert!(def.params.positional[1].default.is_some());
}

#[test]
fn test_parse_async_function() {
    let def = only_function("async def f():\n    await g()\n");
    assert!(def.is_async);
    match &def.body[0].kind {
        StmtKind::Expr(expr) => assert!(matches!(expr.kind, ExprKind::Await(_))),
        other => panic!("Expected await expression, got {:?}", other),
    }
}

#[test]
fn test_parse_parameter_kinds() {
    let def = only_function("def f(a, *args, key=1, **rest):\n    pass\n");
    assert_eq!(def.params.positional.len(), 1);
    assert_eq!(def.params.vararg.as_ref().map(|p| p.name.as_str()), Some("args"));
    assert_eq!(def.params.kwonly.len(), 1);
    assert_eq!(def.params.kwarg.as_ref().map(|p| p.name.as_str()), Some("rest"));
    assert_eq!(def.params.names(), vec!["a", "key", "args", "rest"]);
}

#[test]
fn test_parse_annotations() {
    let def = only_function("def f(a: int = 1) -> str:\n    pass\n");
    assert!(def.params.positional[0].annotation.is_some());
    assert!(def.returns.is_some());
}

#[test]
fn test_non_default_after_default_is_rejected() {
    assert!(parse_source("def f(a=1, b):\n    pass\n").is_err());
}

#[test]
fn test_parse_with_items() {
    let module = parse_source("with a, b as c:\n    pass\n").unwrap();
    match &module.body[0].kind {
        StmtKind::With { items, body } => {
            assert_eq!(items.len(), 2);
            assert!(items[0].target.is_none());
            assert_eq!(items[1].target.as_ref().and_then(|t| t.as_name()), Some("c"));
            assert_eq!(body.len(), 1);
        }
        other => panic!("Expected with statement, got {:?}", other),
    }
}

#[test]
fn test_parse_elif_chain() {
    let module = parse_source("if a:\n    x = 1\nelif b:\n    x = 2\nelse:\n    x = 3\n").unwrap();
    match &module.body[0].kind {
        StmtKind::If { orelse, .. } => match &orelse[0].kind {
            StmtKind::If { orelse, .. } => assert_eq!(orelse.len(), 1),
            other => panic!("Expected nested if, got {:?}", other),
        },
        other => panic!("Expected if statement, got {:?}", other),
    }
}

#[test]
fn test_parse_try_except() {
    let module = parse_source("try:\n    f()\nexcept ValueError as e:\n    pass\nexcept:\n    raise\n").unwrap();
    match &module.body[0].kind {
        StmtKind::Try { handlers, .. } => {
            assert_eq!(handlers.len(), 2);
            assert_eq!(handlers[0].name.as_deref(), Some("e"));
            assert!(handlers[1].typ.is_none());
        }
        other => panic!("Expected try statement, got {:?}", other),
    }
}

#[test]
fn test_try_requires_handler() {
    assert!(parse_source("try:\n    pass\nx = 1\n").is_err());
}

#[test]
fn test_operator_precedence() {
    let module = parse_source("x = 1 + 2 * 3\n").unwrap();
    match &module.body[0].kind {
        StmtKind::Assign { value, .. } => match &value.kind {
            ExprKind::BinOp { op, right, .. } => {
                assert_eq!(*op, BinOp::Add);
                assert!(matches!(right.kind, ExprKind::BinOp { op: BinOp::Mul, .. }));
            }
            other => panic!("Expected binary operation, got {:?}", other),
        },
        other => panic!("Expected assignment, got {:?}", other),
    }
}

#[test]
fn test_boolean_and_comparison() {
    let module = parse_source("ok = a is not None and b not in c\n").unwrap();
    match &module.body[0].kind {
        StmtKind::Assign { value, .. } => match &value.kind {
            ExprKind::BoolOp { op, left, right } => {
                assert_eq!(*op, BoolOp::And);
                assert!(matches!(left.kind, ExprKind::Compare { op: CmpOp::IsNot, .. }));
                assert!(matches!(right.kind, ExprKind::Compare { op: CmpOp::NotIn, .. }));
            }
            other => panic!("Expected boolean operation, got {:?}", other),
        },
        other => panic!("Expected assignment, got {:?}", other),
    }
}

#[test]
fn test_call_with_keywords() {
    let module = parse_source("f(1, name='x')\n").unwrap();
    match &module.body[0].kind {
        StmtKind::Expr(expr) => match &expr.kind {
            ExprKind::Call { args, keywords, .. } => {
                assert_eq!(args.len(), 1);
                assert_eq!(keywords[0].name, "name");
                assert_eq!(keywords[0].value.kind, ExprKind::Constant(Constant::Str("x".to_string())));
            }
            other => panic!("Expected call, got {:?}", other),
        },
        other => panic!("Expected expression statement, got {:?}", other),
    }
}

#[test]
fn test_yield_forms() {
    let def = only_function("def g():\n    yield\n    yield 1\n    x = yield from other()\n");
    assert!(matches!(&def.body[0].kind, StmtKind::Expr(e) if matches!(e.kind, ExprKind::Yield(None))));
    assert!(matches!(&def.body[1].kind, StmtKind::Expr(e) if matches!(e.kind, ExprKind::Yield(Some(_)))));
    assert!(matches!(&def.body[2].kind, StmtKind::Assign { value, .. } if matches!(value.kind, ExprKind::YieldFrom(_))));
}

#[test]
fn test_docstring() {
    let def = only_function("def f():\n    'Says hello.'\n    return 1\n");
    assert_eq!(def.docstring(), Some("Says hello."));
}

#[test]
fn test_statement_locations() {
    let module = parse_source("x = 1\n\ndef f():\n    return x\n").unwrap();
    assert_eq!(module.body[0].loc.line, 1);
    assert_eq!(module.body[1].loc.line, 3);
}

#[test]
fn test_invalid_assignment_target() {
    assert!(parse_source("f() = 1\n").is_err());
}
