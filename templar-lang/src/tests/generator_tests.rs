use crate::error::LangError;
use crate::runtime::{Args, Exception, Interpreter, Namespace, Resumed, Value};

fn run(source: &str) -> String {
    let mut interp = Interpreter::new();
    interp.capture_output();
    interp.run_module("test", source).unwrap();
    interp.take_output()
}

fn run_err(source: &str) -> Box<Exception> {
    let mut interp = Interpreter::new();
    match interp.run_module("test", source) {
        Err(LangError::Exception(exc)) => exc,
        Err(other) => panic!("Expected runtime exception, got {}", other),
        Ok(_) => panic!("Expected runtime exception"),
    }
}

#[test]
fn test_generator_yields_in_order() {
    let source = "\
def gen():
    yield 1
    yield 2
print(list(gen()))
";
    assert_eq!(run(source), "[1, 2]\n");
}

#[test]
fn test_for_loop_over_generator() {
    let source = "\
def countdown(n):
    while n > 0:
        yield n
        n -= 1
for i in countdown(3):
    print(i)
";
    assert_eq!(run(source), "3\n2\n1\n");
}

#[test]
fn test_send_resumes_with_value() {
    let source = "\
def echo():
    received = yield 'ready'
    yield received * 2
g = echo()
print(next(g), g.send(21))
";
    assert_eq!(run(source), "ready 42\n");
}

#[test]
fn test_yield_from_returns_delegate_result() {
    let source = "\
def inner():
    yield 1
    return 'done'
def outer():
    result = yield from inner()
    yield result
print(list(outer()))
";
    assert_eq!(run(source), "[1, 'done']\n");
}

#[test]
fn test_next_default_on_exhaustion() {
    let source = "\
def empty():
    return
    yield
g = empty()
print(next(g, 'fallback'))
";
    assert_eq!(run(source), "fallback\n");
}

#[test]
fn test_send_non_none_to_fresh_generator() {
    let exc = run_err("def g():\n    yield 1\ng().send(5)\n");
    assert_eq!(exc.class_name(), "TypeError");
    assert_eq!(exc.message, "can't send non-None value to a just-started generator");
}

#[test]
fn test_generator_already_executing() {
    let source = "\
def g():
    yield me.send(None)
me = g()
next(me)
";
    let exc = run_err(source);
    assert_eq!(exc.class_name(), "ValueError");
    assert_eq!(exc.message, "generator already executing");
}

#[test]
fn test_coroutines_await_each_other() {
    let source = "\
async def double(x):
    await sleep(0)
    return x * 2
async def main():
    a = await double(2)
    b = await double(a)
    return b
print(run(main()))
";
    assert_eq!(run(source), "8\n");
}

#[test]
fn test_resume_coroutine_from_host() {
    let source = "\
async def step():
    await sleep(0)
    await sleep(0)
    return 'finished'
";
    let mut interp = Interpreter::new();
    let module = interp.run_module("test", source).unwrap();
    let coroutine = interp.call(&module.get("step").unwrap(), Args::default()).unwrap();
    let Value::Generator(gen) = coroutine else {
        panic!("Expected coroutine object");
    };
    assert!(gen.is_coroutine());
    assert!(matches!(interp.resume(&gen, Value::None).unwrap(), Resumed::Yielded(Value::None)));
    assert!(matches!(interp.resume(&gen, Value::None).unwrap(), Resumed::Yielded(Value::None)));
    match interp.resume(&gen, Value::None).unwrap() {
        Resumed::Returned(value) => assert_eq!(value.as_str(), Some("finished")),
        Resumed::Yielded(value) => panic!("Unexpected yield of {:?}", value),
    }
    let err = interp.resume(&gen, Value::None).unwrap_err();
    assert_eq!(err.message, "cannot reuse already awaited coroutine");
}

#[test]
fn test_run_rejects_non_coroutine() {
    let exc = run_err("def f():\n    return 1\nrun(f())\n");
    assert_eq!(exc.class_name(), "ValueError");
    assert_eq!(exc.message, "a coroutine was expected, got 1");
}

#[test]
fn test_await_non_awaitable() {
    let exc = run_err("async def f():\n    await 1\nrun(f())\n");
    assert_eq!(exc.class_name(), "TypeError");
    assert_eq!(exc.message, "object int can't be used in 'await' expression");
}

#[test]
fn test_exception_inside_coroutine_has_traceback() {
    let source = "\
async def fail():
    raise ValueError('inside')
run(fail())
";
    let exc = run_err(source);
    let functions: Vec<&str> = exc.traceback.iter().map(|f| f.function.as_str()).collect();
    assert_eq!(functions, vec!["<module>", "fail"]);
    assert_eq!(exc.innermost().map(|f| f.line), Some(2));
}

#[test]
fn test_contextmanager_decorator() {
    let source = "\
@contextmanager
def managed(name):
    print('open', name)
    yield name.upper()
    print('close', name)
with managed('db') as handle:
    print('using', handle)
";
    assert_eq!(run(source), "open db\nusing DB\nclose db\n");
}

#[test]
fn test_contextmanager_sees_exception() {
    let source = "\
@contextmanager
def managed():
    yield
    print('not reached')
try:
    with managed():
        raise KeyError('k')
except KeyError:
    print('propagated')
";
    assert_eq!(run(source), "propagated\n");
}

#[test]
fn test_function_kind_predicates() {
    let source = "\
def plain():
    pass
def gen():
    yield
async def coro():
    pass
print(isgeneratorfunction(gen), isgeneratorfunction(plain), iscoroutinefunction(coro), iscoroutinefunction(gen))
";
    assert_eq!(run(source), "True False True False\n");
}
