use crate::error::TransfunctionError;
use crate::rewriter::{closure_wrapper, shift_lines, strip_entry_decorator, Rewriter};
use crate::transformer::VariantRequest;
use crate::transforms::{ForbidCommonReturns, TreeTransform};
use std::sync::Arc;
use templar_lang::ast::{FunctionDef, StmtKind};
use templar_lang::{parse_source, unparse_function, unparse_module, FunctionKind, Loc};

const TEMPLATE: &str = "\
@transfunction
def template(a, b=2):
    before = a + b
    with sync_context:
        print('sync')
    with async_context:
        print('async')
        await_it(sleep(before))
    with generator_context:
        print('generator')
        yield_from_it(range(before))
    with sync_context, generator_context:
        print('shared')
    return before
";

fn parse_def(source: &str) -> FunctionDef {
    let module = parse_source(source).unwrap();
    match module.body.into_iter().next().map(|stmt| stmt.kind) {
        Some(StmtKind::FunctionDef(def)) => *def,
        other => panic!("Expected a function definition, got {:?}", other),
    }
}

fn rewrite(source: &str, request: &VariantRequest) -> Result<String, TransfunctionError> {
    let mut def = parse_def(source);
    strip_entry_decorator(&mut def, "transfunction", 1)?;
    Rewriter::new(request).rewrite(&mut def)?;
    Ok(unparse_function(&def))
}

fn variant(source: &str, request: &VariantRequest) -> String {
    rewrite(source, request).unwrap()
}

fn failure(source: &str, request: &VariantRequest) -> TransfunctionError {
    match rewrite(source, request) {
        Err(err) => err,
        Ok(text) => panic!("Expected rewriting to fail, got:\n{}", text),
    }
}

#[test]
fn test_usual_variant() {
    insta::assert_snapshot!(variant(TEMPLATE, &VariantRequest::kind(FunctionKind::Plain)), @r"
def template(a, b=2):
    before = a + b
    print('sync')
    print('shared')
    return before
");
}

#[test]
fn test_async_variant() {
    insta::assert_snapshot!(variant(TEMPLATE, &VariantRequest::kind(FunctionKind::Coroutine)), @r"
async def template(a, b=2):
    before = a + b
    print('async')
    await sleep(before)
    return before
");
}

#[test]
fn test_generator_variant() {
    insta::assert_snapshot!(variant(TEMPLATE, &VariantRequest::kind(FunctionKind::Generator)), @r"
def template(a, b=2):
    before = a + b
    print('generator')
    yield from range(before)
    print('shared')
    return before
");
}

#[test]
fn test_nested_blocks_resolve_inside_out() {
    let source = "\
@transfunction
def template():
    for item in items:
        with sync_context:
            if item:
                with sync_context:
                    print(item)
        with async_context:
            await_it(item)
";
    insta::assert_snapshot!(variant(source, &VariantRequest::kind(FunctionKind::Plain)), @r"
def template():
    for item in items:
        if item:
            print(item)
");
}

#[test]
fn test_ordinary_context_managers_are_kept() {
    let source = "\
@transfunction
def template():
    with open(path) as handle:
        with sync_context:
            return handle.read()
";
    insta::assert_snapshot!(variant(source, &VariantRequest::kind(FunctionKind::Generator)), @r"
def template():
    with open(path) as handle:
        pass
");
}

#[test]
fn test_empty_body_becomes_pass() {
    let source = "\
@transfunction
def template():
    with async_context:
        return 1
";
    insta::assert_snapshot!(variant(source, &VariantRequest::kind(FunctionKind::Plain)), @r"
def template():
    pass
");
}

const NAMED: &str = "\
@transfunction
def template():
    with variant_context('first'):
        print('first')
    with variant_context('second'):
        print('second')
    with patch_context('log'):
        print('log')
    with patch_context('only_second', variants=['second']):
        print('restricted')
    with async_context:
        await_it(done())
";

#[test]
fn test_named_variant_keeps_its_blocks() {
    let request = VariantRequest::variant("first", FunctionKind::Plain);
    insta::assert_snapshot!(variant(NAMED, &request), @r"
def template():
    print('first')
");
}

#[test]
fn test_patches_are_opt_in() {
    let request = VariantRequest::variant("first", FunctionKind::Plain).with_patches(["log", "only_second"]);
    insta::assert_snapshot!(variant(NAMED, &request), @r"
def template():
    print('first')
    print('log')
");

    let request = VariantRequest::variant("second", FunctionKind::Plain).with_patches(["only_second"]);
    insta::assert_snapshot!(variant(NAMED, &request), @r"
def template():
    print('second')
    print('restricted')
");
}

#[test]
fn test_named_variant_with_coroutine_kind() {
    let request = VariantRequest::variant("second", FunctionKind::Coroutine);
    insta::assert_snapshot!(variant(NAMED, &request), @r"
async def template():
    print('second')
    await done()
");
}

#[test]
fn test_unnamed_request_drops_named_blocks() {
    let request = VariantRequest::kind(FunctionKind::Plain).with_patches(["log"]);
    insta::assert_snapshot!(variant(NAMED, &request), @r"
def template():
    print('log')
");
}

#[test]
fn test_call_marker_outside_its_kind() {
    let source = "\
@transfunction
def template():
    return await_it(1)
";
    let err = failure(source, &VariantRequest::kind(FunctionKind::Plain));
    assert!(matches!(err, TransfunctionError::WrongMarkerSyntax(_)));
    assert_eq!(
        err.to_string(),
        "The \"await_it\" marker can only be used in coroutine functions."
    );

    let source = "\
@transfunction
def template():
    yield_from_it([1])
";
    let err = failure(source, &VariantRequest::kind(FunctionKind::Coroutine));
    assert_eq!(
        err.to_string(),
        "The \"yield_from_it\" marker can only be used in generator functions."
    );
}

#[test]
fn test_call_marker_arity() {
    let source = "\
@transfunction
def template():
    with async_context:
        await_it(a, b)
";
    let err = failure(source, &VariantRequest::kind(FunctionKind::Coroutine));
    assert_eq!(
        err.to_string(),
        "The \"await_it\" marker can be used with only one positional argument."
    );

    // Dropped blocks are never translated
    assert!(rewrite(source, &VariantRequest::kind(FunctionKind::Plain)).is_ok());
}

#[test]
fn test_disjoint_nesting_is_rejected() {
    let source = "\
@transfunction
def template():
    with sync_context:
        with async_context:
            pass
";
    let err = failure(source, &VariantRequest::kind(FunctionKind::Plain));
    assert!(matches!(err, TransfunctionError::WrongMarkerSyntax(_)));
    assert_eq!(
        err.to_string(),
        "The \"async_context\" marker cannot be used inside a \"sync_context\" block."
    );
}

#[test]
fn test_marker_with_parentheses() {
    let source = "\
@transfunction
def template():
    with sync_context():
        pass
";
    let err = failure(source, &VariantRequest::kind(FunctionKind::Plain));
    assert_eq!(
        err.to_string(),
        "The \"sync_context\" marker must be used without parentheses."
    );
}

#[test]
fn test_decorator_checks() {
    // Decorators apply bottom-up, so the call line is that of the one applied
    let cases = [
        (
            "@transfunction\n@transfunction\ndef template():\n    pass\n",
            2,
            "You cannot use the 'transfunction' decorator twice for the same function.",
        ),
        (
            "def template():\n    pass\n",
            3,
            "The @transfunction decorator can only be used with the '@' symbol. Don't use it as a regular function. Also, don't rename it.",
        ),
        (
            "@renamed\ndef template():\n    pass\n",
            1,
            "The @transfunction decorator cannot be used under another name. Don't rename it.",
        ),
        (
            "@other\n@transfunction\ndef template():\n    pass\n",
            2,
            "The @transfunction decorator cannot be used in conjunction with other decorators.",
        ),
    ];
    for (source, call_line, expected) in cases {
        let mut def = parse_def(source);
        let err = strip_entry_decorator(&mut def, "transfunction", call_line).unwrap_err();
        assert_eq!(err.to_string(), expected, "{}", source);
    }

    let mut def = parse_def("@transfunction(variants=['a'])\ndef template():\n    pass\n");
    strip_entry_decorator(&mut def, "transfunction", 1).unwrap();
    assert!(def.decorators.is_empty());
}

#[test]
fn test_decorator_error_classes() {
    let mut def = parse_def("@transfunction\n@transfunction\ndef template():\n    pass\n");
    let err = strip_entry_decorator(&mut def, "transfunction", 2).unwrap_err();
    assert_eq!(err.class_name(), "DualUseOfDecoratorError");

    let mut def = parse_def("@renamed\ndef template():\n    pass\n");
    let err = strip_entry_decorator(&mut def, "transfunction", 1).unwrap_err();
    assert_eq!(err.class_name(), "AliasedDecoratorSyntaxError");
}

#[test]
fn test_forbid_common_returns() {
    let source = "\
@transfunction
def template():
    def helper():
        return 1
    with sync_context:
        return helper()
    return 2
";
    let transforms: Vec<Arc<dyn TreeTransform>> = vec![Arc::new(ForbidCommonReturns)];
    let mut def = parse_def(source);
    strip_entry_decorator(&mut def, "transfunction", 1).unwrap();

    let plain = VariantRequest::kind(FunctionKind::Plain);
    Rewriter::new(&plain)
        .with_transforms(&transforms)
        .rewrite(&mut def.clone())
        .unwrap();

    let coroutine = VariantRequest::kind(FunctionKind::Coroutine);
    let err = Rewriter::new(&coroutine)
        .with_transforms(&transforms)
        .with_line_offset(10)
        .rewrite(&mut def)
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "A return statement with a value outside of marker blocks is not allowed in a template used for coroutine functions (line 17)."
    );
}

#[test]
fn test_closure_wrapper() {
    let mut def = parse_def("def template(x):\n    return x + captured\n");
    let loc = Loc::new(1, 1);
    def.decorators.clear();
    let module = closure_wrapper(def, loc, &["captured".to_string(), "unused".to_string()]);
    insta::assert_snapshot!(unparse_module(&module), @r"
def __templar_wrapper__():
    captured = None
    unused = None
    def __templar_variant__(x):
        return x + captured
    return __templar_variant__
");
}

#[test]
fn test_shift_lines() {
    let module = parse_source("def template():\n    x = 1\n    return x\n").unwrap();
    let mut body = module.body;
    shift_lines(&mut body, 40);
    assert_eq!(body[0].loc.line, 41);
    let StmtKind::FunctionDef(def) = &body[0].kind else {
        panic!("Expected a function definition");
    };
    assert_eq!((def.first_line, def.last_line), (41, 43));
    assert_eq!(def.body[0].loc.line, 42);
    let StmtKind::Return(Some(value)) = &def.body[1].kind else {
        panic!("Expected a return");
    };
    assert_eq!(value.loc.line, 43);
}
