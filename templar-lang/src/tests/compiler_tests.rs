use crate::compiler::{compile_module, compile_source, Code, Const, Instr};
use crate::error::LangError;
use crate::parser::parse_source;
use crate::source::Source;
use std::sync::Arc;

fn compile(text: &str) -> Arc<Code> {
    compile_source(Source::new("test.tpl", text)).unwrap()
}

fn child(code: &Code, name: &str) -> Arc<Code> {
    code.consts
        .iter()
        .find_map(|c| match c {
            Const::Code(child) if child.name == name => Some(child.clone()),
            _ => None,
        })
        .unwrap_or_else(|| panic!("no code object named {}", name))
}

fn syntax_message(text: &str) -> String {
    match compile_source(Source::new("test.tpl", text)) {
        Err(LangError::SyntaxError { message, .. }) => message,
        other => panic!("Expected syntax error, got {:?}", other.map(|c| c.qualname.clone())),
    }
}

#[test]
fn test_closure_layout() {
    let module = compile("def outer():\n    x = 1\n    def inner():\n        return x\n    return inner\n");
    let outer = child(&module, "outer");
    let inner = child(&outer, "inner");
    assert_eq!(outer.cellvars, vec!["x".to_string()]);
    assert_eq!(inner.freevars, vec!["x".to_string()]);
    assert_eq!(inner.qualname, "outer.<locals>.inner");
    assert!(inner.instructions.contains(&Instr::LoadDeref(0)));
}

#[test]
fn test_function_flags() {
    let module = compile("def g():\n    yield 1\nasync def c():\n    pass\nf = lambda: 1\n");
    assert!(child(&module, "g").is_generator());
    assert!(child(&module, "c").is_coroutine());
    assert!(child(&module, "<lambda>").flags.lambda);
    assert!(module.flags.module);
}

#[test]
fn test_parameter_layout() {
    let module = compile("def f(a, b=1, *rest, key, **extra):\n    local = a\n");
    let f = child(&module, "f");
    assert_eq!(f.params.argcount, 2);
    assert_eq!(f.params.kwonlyargcount, 1);
    assert!(f.params.varargs);
    assert!(f.params.varkeywords);
    assert_eq!(&f.varnames[..5], &["a", "b", "key", "rest", "extra"]);
    assert!(f.varnames.contains(&"local".to_string()));
}

#[test]
fn test_line_table_and_source_lines() {
    let module = compile("def f():\n    x = 1\n    return x\n");
    let f = child(&module, "f");
    assert_eq!(f.first_line, 1);
    assert_eq!(f.last_line, 3);
    assert!(f.lines.contains(&2));
    assert!(f.lines.contains(&3));
    assert_eq!(f.source_line(2).as_deref(), Some("x = 1"));
    assert_eq!(f.filename, "test.tpl");
}

#[test]
fn test_docstring_recorded() {
    let module = compile("def f():\n    'Docs.'\n    return 1\n");
    assert_eq!(child(&module, "f").docstring.as_deref(), Some("Docs."));
}

#[test]
fn test_definition_kept_without_source() {
    let module = parse_source("def f(a):\n    return a\n").unwrap();
    let code = compile_module(&module, None, "<generated>").unwrap();
    let f = child(&code, "f");
    assert!(f.source.is_none());
    assert_eq!(f.definition.as_ref().map(|d| d.name.as_str()), Some("f"));

    let with_source = compile("def f(a):\n    return a\n");
    assert!(child(&with_source, "f").definition.is_none());
}

#[test]
fn test_with_freevars_renumbers() {
    let module = compile("def outer():\n    a = 1\n    b = 2\n    def inner():\n        return a + b\n    return inner\n");
    let inner = child(&child(&module, "outer"), "inner");
    assert_eq!(inner.freevars, vec!["a".to_string(), "b".to_string()]);

    let swapped = inner.with_freevars(&["b".to_string(), "a".to_string()]).unwrap();
    assert_eq!(swapped.freevars, vec!["b".to_string(), "a".to_string()]);
    let derefs: Vec<&Instr> = swapped
        .instructions
        .iter()
        .filter(|i| matches!(i, Instr::LoadDeref(_)))
        .collect();
    assert_eq!(derefs, vec![&Instr::LoadDeref(1), &Instr::LoadDeref(0)]);

    assert!(inner.with_freevars(&["a".to_string()]).is_none());
}

#[test]
fn test_scope_errors() {
    assert_eq!(syntax_message("return 1\n"), "'return' outside function");
    assert_eq!(syntax_message("yield 1\n"), "'yield' outside function");
    assert_eq!(syntax_message("def f():\n    await g()\n"), "'await' outside async function");
    assert_eq!(syntax_message("async def f():\n    yield 1\n"), "'yield' inside async function");
    assert_eq!(syntax_message("break\n"), "'break' outside loop");
}

#[test]
fn test_disassemble_lists_lines() {
    let module = compile("x = 1\n");
    let listing = module.disassemble();
    assert!(listing.contains("LoadConst"));
    assert!(listing.contains("StoreName"));
}
