use std::sync::Arc;
use std::thread;
use templar_core::{
    transformer_of, ConfigError, EngineConfig, TransfunctionError, AMBIGUOUS_FRAME_MESSAGE, CALL_DIRECTLY_MESSAGE,
};
use templar_lang::{
    compile_module, parse_source, Args, Exception, Interpreter, LangError, ModuleNamespace, Namespace, Value,
};

fn interpreter(config: EngineConfig) -> Interpreter {
    let mut interp = Interpreter::new();
    templar_core::install(&mut interp, config).unwrap();
    interp.capture_output();
    interp
}

fn run(source: &str) -> String {
    let mut interp = interpreter(EngineConfig::default());
    interp.run_module("test", source).unwrap();
    interp.take_output()
}

fn run_err(source: &str) -> Box<Exception> {
    run_err_with(EngineConfig::default(), source)
}

fn run_err_with(config: EngineConfig, source: &str) -> Box<Exception> {
    let mut interp = interpreter(config);
    match interp.run_module("test", source) {
        Err(LangError::Exception(exc)) => exc,
        Err(other) => panic!("Expected runtime exception, got {}", other),
        Ok(_) => panic!("Expected runtime exception"),
    }
}

#[test]
fn test_three_way_split() {
    let source = "\
@transfunction
def template():
    with sync_context:
        return 1
    with async_context:
        return 2
    with generator_context:
        yield 1
        yield 2
        yield 3

print(template.get_usual_function()())
print(run(template.get_async_function()()))
print(list(template.get_generator_function()()))
";
    assert_eq!(run(source), "1\n2\n[1, 2, 3]\n");
}

#[test]
fn test_call_markers_end_to_end() {
    let source = "\
async def fetch(x):
    return x * 2

def numbers():
    yield 1
    yield 2

@transfunction
def template(x):
    with sync_context:
        return x
    with async_context:
        return await_it(fetch(x))
    with generator_context:
        yield_from_it(numbers())

print(template.get_usual_function()(3), run(template.get_async_function()(3)), list(template.get_generator_function()(3)))
";
    assert_eq!(run(source), "3 6 [1, 2]\n");
}

#[test]
fn test_common_code_runs_in_every_variant() {
    let source = "\
@transfunction
def template():
    print('common')
    with sync_context:
        print('sync')
    with async_context:
        print('async')
    with generator_context:
        print('generator')
        yield None

template.get_usual_function()()
run(template.get_async_function()())
list(template.get_generator_function()())
";
    assert_eq!(
        run(source),
        "common\nsync\ncommon\nasync\ncommon\ngenerator\n"
    );
}

#[test]
fn test_arguments_pass_through() {
    let source = "\
@transfunction
def template(a, *args, key=3, **kw):
    return [a, len(args), key, kw]

usual = template.get_usual_function()
print(usual(1, 8, 9, key=5, z=4))
print(usual(1))
print(run(template.get_async_function()(2, key=7)))
";
    assert_eq!(run(source), "[1, 2, 5, {'z': 4}]\n[1, 0, 3, {}]\n[2, 0, 7, {}]\n");
}

#[test]
fn test_closure_sees_later_assignments() {
    let source = "\
def make():
    value = 1
    @transfunction
    def template():
        return value
    value = 2
    return template

print(make().get_usual_function()())
";
    assert_eq!(run(source), "2\n");
}

#[test]
fn test_nonlocal_state_is_shared() {
    let source = "\
def make():
    counter = 0
    @transfunction
    def template():
        nonlocal counter
        counter += 1
        with sync_context:
            return counter
        with async_context:
            return counter * 10
        with generator_context:
            yield counter
    def read():
        return counter
    return [template, read]

pair = make()
template = pair[0]
print(template.get_usual_function()(), run(template.get_async_function()()), list(template.get_generator_function()()))
print(pair[1]())
";
    assert_eq!(run(source), "1 20 [3]\n3\n");
}

#[test]
fn test_mutable_default_is_shared() {
    let source = "\
@transfunction
def template(acc=[]):
    acc.append(1)
    with sync_context:
        return len(acc)
    with async_context:
        return len(acc)

usual = template.get_usual_function()
print(usual(), run(template.get_async_function()()), usual.__defaults__[0] is template.function.__defaults__[0])
";
    assert_eq!(run(source), "1 2 True\n");
}

#[test]
fn test_globals_are_the_template_module() {
    let source = "\
factor = 2

@transfunction
def template(x):
    global calls
    calls = x * factor
    return calls

factor = 5
print(template.get_usual_function()(3), calls)
";
    assert_eq!(run(source), "15 15\n");
}

#[test]
fn test_traceback_points_at_template_lines() {
    let source = "\
@transfunction
def template(x):
    with sync_context:
        raise ValueError('sync ' + x)
    with async_context:
        raise ValueError('async ' + x)

template.get_usual_function()('a')
";
    let exc = run_err(source);
    assert_eq!(exc.message, "sync a");
    let frame = exc.innermost().unwrap();
    assert_eq!(frame.line, 4);
    assert_eq!(frame.function, "template");
    assert_eq!(frame.filename, "test");
    assert_eq!(frame.source_line.as_deref(), Some("raise ValueError('sync ' + x)"));

    let source = source.replace(
        "template.get_usual_function()('a')",
        "run(template.get_async_function()('b'))",
    );
    let exc = run_err(&source);
    assert_eq!(exc.message, "async b");
    let frame = exc.innermost().unwrap();
    assert_eq!(frame.line, 6);
    assert_eq!(frame.source_line.as_deref(), Some("raise ValueError('async ' + x)"));
}

#[test]
fn test_traceback_of_nested_template() {
    let source = "\
def outer():
    limit = 1

    @transfunction
    def checked(x):
        if x > limit:
            raise ValueError('too big')
        return x
    return checked

outer().get_usual_function()(5)
";
    let exc = run_err(source);
    let lines: Vec<(u32, &str)> = exc.traceback.iter().map(|f| (f.line, f.function.as_str())).collect();
    assert_eq!(lines, vec![(11, "<module>"), (7, "checked")]);
    assert_eq!(
        exc.innermost().and_then(|f| f.source_line.as_deref()),
        Some("raise ValueError('too big')")
    );
}

#[test]
fn test_traceback_of_generator_in_method() {
    let source = "\
def outer():
    class Box:
        @transfunction
        def g(self):
            with generator_context:
                yield 1
                raise KeyError('z')
    return Box()

list(outer().g.get_generator_function()())
";
    let exc = run_err(source);
    let frame = exc.innermost().unwrap();
    assert_eq!(frame.line, 7);
    assert_eq!(frame.function, "g");
    assert_eq!(frame.source_line.as_deref(), Some("raise KeyError('z')"));
    assert_eq!(exc.traceback.first().map(|f| f.line), Some(10));
}

#[test]
fn test_install_rejects_keyword_decorator_name() {
    let mut interp = Interpreter::new();
    let config = EngineConfig { decorator_name: "pass".into(), ..Default::default() };
    let err = templar_core::install(&mut interp, config).unwrap_err();
    assert!(matches!(
        err,
        TransfunctionError::Config(ConfigError::InvalidDecoratorName(ref name)) if name == "pass"
    ));
}

#[test]
fn test_variants_are_cached() {
    let source = "\
@transfunction
def template():
    return 1

print(template.get_usual_function() is template.get_usual_function())
print(template.get_usual_function() is template.get_generator_function())
";
    assert_eq!(run(source), "True\nFalse\n");
}

#[test]
fn test_named_variants_and_patches() {
    let source = "\
@transfunction(variants=['a', 'b'])
def template():
    log = []
    with variant_context('a'):
        log.append('a')
    with variant_context('b'):
        log.append('b')
    with patch_context('log'):
        log.append('log')
    with patch_context('audit', variants=['b']):
        log.append('audit')
    return log

print(template.variants)
print(template.get_usual_function()())
print(template.get_variant_function('a')())
print(template.get_variant_function('a', patches=['log', 'audit'])())
print(template.get_variant_function('b', patches=['audit'])())
print(template.get_variant_function('a') is template.get_variant_function('a', patches=[]))
";
    assert_eq!(
        run(source),
        "['a', 'b']\n[]\n['a']\n['a', 'log']\n['b', 'audit']\nTrue\n"
    );
}

#[test]
fn test_patch_runs_where_it_is_written() {
    let source = "\
@transfunction(variants=['a', 'b'])
def template():
    result = []
    with patch_context('logging'):
        result.append('log')
    with variant_context('a'):
        result.append('a')
    with variant_context('b'):
        result.append('b')
    return result

print(template.get_variant_function('a')())
print(template.get_variant_function('a', patches=['logging'])())
";
    assert_eq!(run(source), "['a']\n['log', 'a']\n");
}

#[test]
fn test_named_variant_kinds() {
    let source = "\
@transfunction(variants=['fast'])
def template(x):
    with variant_context('fast'):
        x = x * 2
    with async_context:
        return x + 1
    return x

print(template.get_variant_function('fast')(1))
print(run(template.get_variant_function('fast', kind='coroutine')(1)))
try:
    template.get_variant_function('fast', kind='thread')
except ValueError as e:
    print(e)
";
    assert_eq!(
        run(source),
        "2\n3\nkind must be 'plain', 'coroutine' or 'generator', not 'thread'\n"
    );
}

#[test]
fn test_unknown_variant() {
    let source = "\
@transfunction(variants=['a', 'b'])
def template():
    pass

try:
    template.get_variant_function('c')
except UnknownVariantError as e:
    print(e, isinstance(e, ValueError))
";
    assert_eq!(
        run(source),
        "Unknown variant \"c\". Declared variants: [\"a\", \"b\"]. True\n"
    );
}

#[test]
fn test_undeclared_variants() {
    let source = "\
@transfunction
def template():
    pass

print(template.variants)
template.get_variant_function('a')
";
    let exc = run_err(source);
    assert_eq!(exc.class_name(), "UnknownVariantError");
    assert_eq!(exc.message, "Unknown variant \"a\". Declared variants: [].");
}

#[test]
fn test_decorator_misuse() {
    let exc = run_err("@transfunction\n@transfunction\ndef template():\n    pass\n");
    assert_eq!(exc.class_name(), "DualUseOfDecoratorError");
    assert_eq!(
        exc.message,
        "You cannot use the 'transfunction' decorator twice for the same function."
    );

    let exc = run_err("def template():\n    pass\nt = transfunction(template)\nt.get_usual_function()\n");
    assert_eq!(exc.class_name(), "WrongDecoratorSyntaxError");
    assert_eq!(
        exc.message,
        "The @transfunction decorator can only be used with the '@' symbol. Don't use it as a regular function. Also, don't rename it."
    );

    let exc = run_err("alias = transfunction\n@alias\ndef template():\n    pass\ntemplate.get_usual_function()\n");
    assert_eq!(exc.class_name(), "AliasedDecoratorSyntaxError");

    let source = "\
def other(f):
    return f

@other
@transfunction
def template():
    pass

template.get_usual_function()
";
    let exc = run_err(source);
    assert_eq!(exc.class_name(), "WrongDecoratorSyntaxError");
    assert_eq!(
        exc.message,
        "The @transfunction decorator cannot be used in conjunction with other decorators."
    );
}

#[test]
fn test_invalid_templates() {
    let exc = run_err("transfunction(lambda: 1)\n");
    assert_eq!(exc.class_name(), "ValueError");
    assert_eq!(
        exc.message,
        "Only regular or generator functions can be used as a template for @transfunction. Don't use lambdas here."
    );

    let exc = run_err("async def template():\n    pass\ntransfunction(template)\n");
    assert_eq!(
        exc.message,
        "Only regular or generator functions can be used as a template for @transfunction. You can't use async functions."
    );

    let exc = run_err("transfunction(1)\n");
    assert_eq!(
        exc.message,
        "Only regular or generator functions can be used as a template for @transfunction."
    );
}

#[test]
fn test_marker_errors_reach_scripts() {
    let source = "\
@transfunction
def template():
    with async_context:
        await_it(a, b)

try:
    template.get_async_function()
except WrongMarkerSyntaxError as e:
    print(e, isinstance(e, WrongTransfunctionSyntaxError), isinstance(e, SyntaxError))
";
    assert_eq!(
        run(source),
        "The \"await_it\" marker can be used with only one positional argument. True True\n"
    );
}

#[test]
fn test_markers_outside_templates() {
    let source = "\
with sync_context:
    print('inside')
try:
    await_it(1)
except WrongMarkerSyntaxError as e:
    print(e)
";
    assert_eq!(
        run(source),
        "inside\nThe \"await_it\" marker can only be used in coroutine functions.\n"
    );
}

#[test]
fn test_calling_directly() {
    let source = "\
@transfunction
def template():
    pass

try:
    template()
except CallTransfunctionDirectlyError as e:
    print(isinstance(e, TypeError))
    raise
";
    let exc = run_err(source);
    assert_eq!(exc.class_name(), "CallTransfunctionDirectlyError");
    assert_eq!(exc.message, CALL_DIRECTLY_MESSAGE);
}

#[test]
fn test_methods_bind_to_instances() {
    let source = "\
class Counter:
    def __init__(self, start):
        self.start = start

    @transfunction
    def read(self, step):
        with sync_context:
            return self.start + step
        with async_context:
            return self.start - step

c = Counter(10)
print(c.read.get_usual_function()(1), run(c.read.get_async_function()(1)))
print(Counter.read.get_usual_function()(c, 2))
print(Counter.read.__qualname__)
";
    assert_eq!(run(source), "11 9\n12\nCounter.read\n");
}

#[test]
fn test_metadata() {
    let source = "\
@transfunction
def template():
    'Docs.'
    return 1

print(template.__name__, template.__qualname__, template.__doc__, template.__module__)
print(template.function.__name__, template.function())
usual = template.get_usual_function()
print(usual.__name__, usual.__qualname__, usual.__doc__, usual.__module__)
";
    assert_eq!(
        run(source),
        "template template Docs. test\ntemplate 1\ntemplate template Docs. test\n"
    );
}

#[test]
fn test_strict_async_returns() {
    let config = EngineConfig {
        strict_async_returns: true,
        ..EngineConfig::default()
    };
    let source = "\
@transfunction
def template():
    with async_context:
        return 2
    return 1

print(template.get_usual_function()())
template.get_async_function()
";
    let exc = run_err_with(config, source);
    assert_eq!(exc.class_name(), "WrongTransfunctionSyntaxError");
    assert_eq!(
        exc.message,
        "A return statement with a value outside of marker blocks is not allowed in a template used for coroutine functions (line 5)."
    );
}

#[test]
fn test_custom_decorator_name() {
    let config = EngineConfig::from_yaml_str("decorator_name: variants_of\n").unwrap();
    let mut interp = interpreter(config);
    let source = "\
@variants_of
def template():
    with sync_context:
        return 'sync'
    with async_context:
        return 'async'

print(template.get_usual_function()(), run(template.get_async_function()()))
";
    interp.run_module("test", source).unwrap();
    assert_eq!(interp.take_output(), "sync async\n");
    assert!(interp.builtins().get("transfunction").is_none());
}

#[test]
fn test_wrapping_from_host_code_is_ambiguous() {
    let mut interp = interpreter(EngineConfig::default());
    let module = interp.run_module("test", "def template():\n    pass\n").unwrap();
    let decorator = interp.builtins().get("transfunction").unwrap();
    let template = module.get("template").unwrap();

    let exc = interp.call(&decorator, Args::new(vec![template])).unwrap_err();
    assert_eq!(exc.class_name(), "AmbiguousFrameSyntaxError");
    assert_eq!(exc.message, AMBIGUOUS_FRAME_MESSAGE);
}

#[test]
fn test_template_without_source_text() {
    let text = "\
@transfunction
def template(x):
    with sync_context:
        return x + 1
    with generator_context:
        yield x
";
    let mut interp = interpreter(EngineConfig::default());
    let code = compile_module(&parse_source(text).unwrap(), None, "generated").unwrap();
    let globals = ModuleNamespace::new("generated");
    interp.exec_code(&code, globals.clone()).unwrap();

    let transformer = transformer_of(&globals.get("template").unwrap()).unwrap();
    let usual = transformer.get_usual_function(&mut interp).unwrap();
    let result = interp
        .call(&Value::Function(usual), Args::new(vec![Value::Int(1)]))
        .unwrap();
    assert_eq!(result.as_int(), Some(2));

    let generator = transformer.get_generator_function(&mut interp).unwrap();
    let produced = interp
        .call(&Value::Function(generator), Args::new(vec![Value::Int(7)]))
        .unwrap();
    let items = interp.collect(&produced).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].as_int(), Some(7));
}

#[test]
fn test_host_api() {
    let source = "\
@transfunction(variants=['a'])
def template():
    with variant_context('a'):
        return 'a'
    return 'plain'
";
    let mut interp = interpreter(EngineConfig::default());
    let module = interp.run_module("test", source).unwrap();
    let transformer = transformer_of(&module.get("template").unwrap()).unwrap();
    assert_eq!(transformer.variants(), Some(&["a".to_string()][..]));
    assert_eq!(transformer.cached(), 0);
    assert_eq!(transformer.call().unwrap_err().to_string(), CALL_DIRECTLY_MESSAGE);

    let first = transformer.get_usual_function(&mut interp).unwrap();
    let second = transformer.get_usual_function(&mut interp).unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let named = transformer
        .get_variant_function(&mut interp, "a", Vec::<String>::new(), templar_lang::FunctionKind::Plain)
        .unwrap();
    let result = interp.call(&Value::Function(named), Args::default()).unwrap();
    assert_eq!(result.as_str(), Some("a"));
    assert_eq!(transformer.cached(), 2);

    let err = transformer
        .get_variant_function(&mut interp, "b", ["log"], templar_lang::FunctionKind::Plain)
        .unwrap_err();
    assert_eq!(err.class_name(), "UnknownVariantError");
}

#[test]
fn test_concurrent_first_requests_compile_once() {
    let source = "\
total = 40

@transfunction
def template(x):
    with sync_context:
        return x + total
    with async_context:
        return x - total
";
    let mut interp = interpreter(EngineConfig::default());
    let module = interp.run_module("test", source).unwrap();
    let transformer = transformer_of(&module.get("template").unwrap()).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let transformer = transformer.clone();
            thread::spawn(move || {
                let mut interp = interpreter(EngineConfig::default());
                let function = transformer.get_usual_function(&mut interp).unwrap();
                let result = interp
                    .call(&Value::Function(function.clone()), Args::new(vec![Value::Int(2)]))
                    .unwrap();
                assert_eq!(result.as_int(), Some(42));
                function
            })
        })
        .collect();

    let functions: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for function in &functions[1..] {
        assert!(Arc::ptr_eq(&functions[0], function));
    }
    assert_eq!(transformer.cached(), 1);
}
