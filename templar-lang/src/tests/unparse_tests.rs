use crate::ast::StmtKind;
use crate::parser::parse_source;
use crate::unparse::{unparse_expr, unparse_module};

fn roundtrip(source: &str) -> String {
    unparse_module(&parse_source(source).unwrap())
}

fn expr(source: &str) -> String {
    let module = parse_source(source).unwrap();
    match &module.body[0].kind {
        StmtKind::Expr(expr) => unparse_expr(expr),
        other => panic!("Expected expression statement, got {:?}", other),
    }
}

#[test]
fn test_unparse_function_header() {
    insta::assert_snapshot!(roundtrip("@deco\ndef f(a: int=1, *args, key=2, **kw) -> str:\n  return a\n"), @r"
@deco
def f(a: int = 1, *args, key=2, **kw) -> str:
    return a
");
}

#[test]
fn test_unparse_keyword_only_marker() {
    insta::assert_snapshot!(roundtrip("async def f(a, *, b):\n    await g(a, b=b)\n"), @r"
async def f(a, *, b):
    await g(a, b=b)
");
}

#[test]
fn test_unparse_control_flow() {
    let source = "\
while x:
    if a:
        break
    elif b:
        continue
    else:
        x -= 1
for i in range(3):
    try:
        f(i)
    except ValueError as e:
        raise
with a as b, c:
    pass
";
    assert_eq!(roundtrip(source), source);
}

#[test]
fn test_unparse_class_and_nonlocal() {
    let source = "\
class C(Base):
    def m(self):
        nonlocal x
        global y
        return self
";
    assert_eq!(roundtrip(source), source);
}

#[test]
fn test_unparse_parenthesizes_by_precedence() {
    assert_eq!(expr("(a + b) * c\n"), "(a + b) * c");
    assert_eq!(expr("a + b * c\n"), "a + b * c");
    assert_eq!(expr("a - (b - c)\n"), "a - (b - c)");
    assert_eq!(expr("(a or b) and not c\n"), "(a or b) and not c");
    assert_eq!(expr("-(a ** b)\n"), "-a ** b");
    assert_eq!(expr("(a ** b) ** c\n"), "(a ** b) ** c");
}

#[test]
fn test_unparse_literals() {
    assert_eq!(expr("[1, 2.0, 'it\\'s', None, True]\n"), "[1, 2.0, 'it\\'s', None, True]");
    assert_eq!(expr("{'a': 1}\n"), "{'a': 1}");
    assert_eq!(expr("\"double\"\n"), "'double'");
}

#[test]
fn test_unparse_lambda_and_yield() {
    assert_eq!(expr("lambda: 1\n"), "lambda: 1");
    assert_eq!(expr("lambda a, b=2: a + b\n"), "lambda a, b=2: a + b");
    let source = "def g():\n    x = yield 1\n    yield from h()\n    yield\n";
    assert_eq!(roundtrip(source), source);
}

#[test]
fn test_unparse_empty_body_renders_pass() {
    let mut module = parse_source("def f():\n    return 1\n").unwrap();
    if let StmtKind::FunctionDef(def) = &mut module.body[0].kind {
        def.body.clear();
    }
    assert_eq!(unparse_module(&module), "def f():\n    pass\n");
}

#[test]
fn test_unparse_attribute_call_subscript() {
    assert_eq!(expr("a.b(c)[d].e\n"), "a.b(c)[d].e");
    assert_eq!(expr("(await x).y\n"), "(await x).y");
}
