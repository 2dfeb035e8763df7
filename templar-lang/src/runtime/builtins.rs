//! Builtin functions and methods of builtin types

use super::exception::{standard_classes, Exception};
use super::generator::{Generator, Resumed};
use super::host::HostObject;
use super::interpreter::Interpreter;
use super::namespace::{ModuleNamespace, Namespace};
use super::ops;
use super::value::{Args, IterState, MethodKind, RunResult, Value};
use std::any::Any;
use std::sync::Arc;
use templar_types::FunctionKind;

/// Populate a builtins namespace
pub(crate) fn install(builtins: &ModuleNamespace) {
    let natives: &[(&str, fn(&mut Interpreter, Args) -> RunResult<Value>)] = &[
        ("print", print),
        ("len", len),
        ("range", range),
        ("list", list),
        ("dict", dict),
        ("str", str_),
        ("int", int),
        ("repr", repr),
        ("iter", iter),
        ("next", next),
        ("isinstance", isinstance),
        ("callable", callable),
        ("run", run),
        ("sleep", sleep),
        ("contextmanager", contextmanager),
        ("isfunction", isfunction),
        ("isgeneratorfunction", isgeneratorfunction),
        ("iscoroutinefunction", iscoroutinefunction),
    ];
    for (name, func) in natives {
        builtins.set(name, Value::native(*name, *func));
    }
    for class in standard_classes() {
        let name = class.name.clone();
        builtins.set(&name, Value::ExceptionType(class));
    }
}

fn print(interp: &mut Interpreter, mut args: Args) -> RunResult<Value> {
    let sep = args.take_keyword("sep").map(|v| v.to_str()).unwrap_or_else(|| " ".to_string());
    let end = args.take_keyword("end").map(|v| v.to_str()).unwrap_or_else(|| "\n".to_string());
    args.check("print", usize::MAX)?;
    let parts: Vec<String> = args.positional.iter().map(Value::to_str).collect();
    interp.write_output(&format!("{}{}", parts.join(&sep), end));
    Ok(Value::None)
}

fn single<'a>(name: &str, args: &'a Args) -> RunResult<&'a Value> {
    args.check(name, 1)?;
    args.get(0).ok_or_else(|| {
        Exception::type_error(format!("{}() takes exactly one argument (0 given)", name))
    })
}

fn len(_interp: &mut Interpreter, args: Args) -> RunResult<Value> {
    let value = single("len", &args)?;
    let length = match value {
        Value::Str(s) => s.chars().count(),
        Value::List(items) => items.lock().len(),
        Value::Dict(dict) => dict.lock().len(),
        other => {
            return Err(Exception::type_error(format!(
                "object of type '{}' has no len()",
                other.type_name()
            )))
        }
    };
    Ok(Value::Int(length as i64))
}

fn int_arg(name: &str, value: &Value) -> RunResult<i64> {
    value.as_int().ok_or_else(|| {
        Exception::type_error(format!(
            "{}() argument must be an integer, not '{}'",
            name,
            value.type_name()
        ))
    })
}

fn range(_interp: &mut Interpreter, args: Args) -> RunResult<Value> {
    args.check("range", 3)?;
    let ints = args
        .positional
        .iter()
        .map(|v| int_arg("range", v))
        .collect::<RunResult<Vec<i64>>>()?;
    let (start, stop, step) = match ints.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => return Err(Exception::type_error("range expected at least 1 argument, got 0")),
    };
    if step == 0 {
        return Err(Exception::value_error("range() arg 3 must not be zero"));
    }
    Ok(IterState::Range { next: start, stop, step }.into_value())
}

fn list(interp: &mut Interpreter, args: Args) -> RunResult<Value> {
    args.check("list", 1)?;
    match args.get(0) {
        Some(iterable) => Ok(Value::list(interp.collect(iterable)?)),
        None => Ok(Value::list(Vec::new())),
    }
}

fn dict(interp: &mut Interpreter, args: Args) -> RunResult<Value> {
    let mut entries = Vec::new();
    if let Some(source) = args.get(0) {
        match source {
            Value::Dict(dict) => entries.extend(dict.lock().entries().iter().cloned()),
            other => {
                for pair in interp.collect(other)? {
                    match pair.list_items().as_deref() {
                        Some([key, value]) => entries.push((key.clone(), value.clone())),
                        _ => {
                            return Err(Exception::type_error(
                                "dictionary update sequence element has wrong length",
                            ))
                        }
                    }
                }
            }
        }
    }
    for (key, value) in args.keywords {
        entries.push((Value::str(&key), value));
    }
    Ok(Value::dict(entries))
}

fn str_(_interp: &mut Interpreter, args: Args) -> RunResult<Value> {
    args.check("str", 1)?;
    Ok(Value::from(args.get(0).map(Value::to_str).unwrap_or_default()))
}

fn int(_interp: &mut Interpreter, args: Args) -> RunResult<Value> {
    args.check("int", 1)?;
    match args.get(0) {
        None => Ok(Value::Int(0)),
        Some(Value::Float(f)) => Ok(Value::Int(f.trunc() as i64)),
        Some(Value::Str(s)) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| {
            Exception::value_error(format!("invalid literal for int() with base 10: {}", Value::Str(s.clone()).repr()))
        }),
        Some(other) => Ok(Value::Int(int_arg("int", other)?)),
    }
}

fn repr(_interp: &mut Interpreter, args: Args) -> RunResult<Value> {
    Ok(Value::from(single("repr", &args)?.repr()))
}

fn iter(interp: &mut Interpreter, args: Args) -> RunResult<Value> {
    let value = single("iter", &args)?;
    interp.iterate(value)
}

fn next(interp: &mut Interpreter, args: Args) -> RunResult<Value> {
    args.check("next", 2)?;
    let iterator = args
        .get(0)
        .ok_or_else(|| Exception::type_error("next expected at least 1 argument, got 0"))?;
    match interp.next_item(iterator)? {
        Some(value) => Ok(value),
        None => args.get(1).cloned().ok_or_else(Exception::stop_iteration),
    }
}

fn isinstance(_interp: &mut Interpreter, args: Args) -> RunResult<Value> {
    args.check("isinstance", 2)?;
    match (args.get(0), args.get(1)) {
        (Some(value), Some(class)) => Ok(Value::Bool(ops::is_instance(value, class)?)),
        _ => Err(Exception::type_error("isinstance expected 2 arguments")),
    }
}

fn callable(_interp: &mut Interpreter, args: Args) -> RunResult<Value> {
    let value = single("callable", &args)?;
    Ok(Value::Bool(matches!(
        value,
        Value::Function(_)
            | Value::Native(_)
            | Value::Method(_)
            | Value::Class(_)
            | Value::ExceptionType(_)
            | Value::Host(_)
    )))
}

fn run(interp: &mut Interpreter, args: Args) -> RunResult<Value> {
    let coroutine = single("run", &args)?;
    interp.run_coroutine(coroutine)
}

/// An awaitable that suspends once
fn sleep(_interp: &mut Interpreter, args: Args) -> RunResult<Value> {
    args.check("sleep", 1)?;
    Ok(IterState::Suspend { done: false }.into_value())
}

fn function_kind(value: &Value) -> Option<FunctionKind> {
    match value {
        Value::Function(f) => Some(f.kind()),
        Value::Method(method) => match &method.kind {
            MethodKind::Function(f) => Some(f.kind()),
            _ => None,
        },
        _ => None,
    }
}

fn isfunction(_interp: &mut Interpreter, args: Args) -> RunResult<Value> {
    Ok(Value::Bool(matches!(single("isfunction", &args)?, Value::Function(_))))
}

fn isgeneratorfunction(_interp: &mut Interpreter, args: Args) -> RunResult<Value> {
    let kind = function_kind(single("isgeneratorfunction", &args)?);
    Ok(Value::Bool(kind == Some(FunctionKind::Generator)))
}

fn iscoroutinefunction(_interp: &mut Interpreter, args: Args) -> RunResult<Value> {
    let kind = function_kind(single("iscoroutinefunction", &args)?);
    Ok(Value::Bool(kind == Some(FunctionKind::Coroutine)))
}

/// Wrap a generator function so that calling it gives a context manager
fn contextmanager(_interp: &mut Interpreter, args: Args) -> RunResult<Value> {
    let factory = single("contextmanager", &args)?.clone();
    let name = ops::get_attr(&factory, "__name__")
        .map(|v| v.to_str())
        .unwrap_or_else(|_| "contextmanager".to_string());
    Ok(Value::native(name, move |interp, args| {
        match interp.call(&factory, args)? {
            Value::Generator(generator) if !generator.is_coroutine() => {
                Ok(Value::Host(Arc::new(GeneratorContextManager { generator })))
            }
            other => Err(Exception::type_error(format!(
                "contextmanager expected a generator, got '{}'",
                other.type_name()
            ))),
        }
    }))
}

/// Context manager driving a generator: setup before the first yield,
/// teardown after it
#[derive(Debug)]
struct GeneratorContextManager {
    generator: Arc<Generator>,
}

impl HostObject for GeneratorContextManager {
    fn type_name(&self) -> &str {
        "_GeneratorContextManager"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn has_method(&self, name: &str) -> bool {
        matches!(name, "__enter__" | "__exit__")
    }

    fn call_method(&self, interp: &mut Interpreter, name: &str, args: Args) -> RunResult<Value> {
        match name {
            "__enter__" => match interp.resume(&self.generator, Value::None)? {
                Resumed::Yielded(value) => Ok(value),
                Resumed::Returned(_) => Err(Exception::runtime_error("generator didn't yield")),
            },
            "__exit__" => {
                if args.get(0).is_some_and(|typ| !typ.is_none()) {
                    self.generator.close();
                    return Ok(Value::Bool(false));
                }
                match interp.resume(&self.generator, Value::None)? {
                    Resumed::Returned(_) => Ok(Value::Bool(false)),
                    Resumed::Yielded(_) => Err(Exception::runtime_error("generator didn't stop")),
                }
            }
            _ => Err(Exception::attribute_error(format!(
                "'{}' object has no attribute '{}'",
                self.type_name(),
                name
            ))),
        }
    }
}

fn expect_str<'a>(method: &str, value: &'a Value) -> RunResult<&'a str> {
    value.as_str().ok_or_else(|| {
        Exception::type_error(format!(
            "{}() argument must be str, not {}",
            method,
            value.type_name()
        ))
    })
}

/// Dispatch a method of a builtin type
pub(crate) fn call_method(interp: &mut Interpreter, receiver: &Value, name: &str, args: Args) -> RunResult<Value> {
    match receiver {
        Value::List(items) => match name {
            "append" => {
                let value = single("append", &args)?.clone();
                items.lock().push(value);
                Ok(Value::None)
            }
            "extend" => {
                let extra = interp.collect(single("extend", &args)?)?;
                items.lock().extend(extra);
                Ok(Value::None)
            }
            "insert" => {
                args.check("insert", 2)?;
                let (Some(index), Some(value)) = (args.get(0), args.get(1)) else {
                    return Err(Exception::type_error("insert expected 2 arguments"));
                };
                let mut items = items.lock();
                let len = items.len() as i64;
                let index = int_arg("insert", index)?;
                let index = if index < 0 { (index + len).max(0) } else { index.min(len) };
                items.insert(index as usize, value.clone());
                Ok(Value::None)
            }
            "pop" => {
                args.check("pop", 1)?;
                let mut items = items.lock();
                let len = items.len() as i64;
                let index = match args.get(0) {
                    Some(index) => int_arg("pop", index)?,
                    None => len - 1,
                };
                let index = if index < 0 { index + len } else { index };
                if items.is_empty() || !(0..len).contains(&index) {
                    return Err(Exception::index_error("pop index out of range"));
                }
                Ok(items.remove(index as usize))
            }
            "index" => {
                let value = single("index", &args)?;
                let position = items.lock().iter().position(|v| v.equals(value));
                position
                    .map(|p| Value::Int(p as i64))
                    .ok_or_else(|| Exception::value_error(format!("{} is not in list", value.repr())))
            }
            _ => Err(no_method(receiver, name)),
        },
        Value::Dict(dict) => match name {
            "get" => {
                args.check("get", 2)?;
                let key = args.get(0).ok_or_else(|| Exception::type_error("get expected at least 1 argument"))?;
                let found = dict.lock().get(key).cloned();
                Ok(found.or_else(|| args.get(1).cloned()).unwrap_or(Value::None))
            }
            "keys" => Ok(Value::list(dict.lock().keys())),
            "values" => Ok(Value::list(dict.lock().values())),
            "items" => {
                let pairs = dict
                    .lock()
                    .entries()
                    .iter()
                    .map(|(k, v)| Value::list(vec![k.clone(), v.clone()]))
                    .collect();
                Ok(Value::list(pairs))
            }
            "pop" => {
                args.check("pop", 2)?;
                let key = args.get(0).ok_or_else(|| Exception::type_error("pop expected at least 1 argument"))?;
                let removed = dict.lock().remove(key);
                removed
                    .or_else(|| args.get(1).cloned())
                    .ok_or_else(|| Exception::key_error(key.repr()))
            }
            "update" => {
                let other = dict_entries(single("update", &args)?)?;
                let mut dict = dict.lock();
                for (key, value) in other {
                    dict.insert(key, value);
                }
                Ok(Value::None)
            }
            _ => Err(no_method(receiver, name)),
        },
        Value::Str(s) => match name {
            "join" => {
                let parts = interp.collect(single("join", &args)?)?;
                let parts = parts
                    .iter()
                    .map(|part| expect_str("join", part).map(String::from))
                    .collect::<RunResult<Vec<String>>>()?;
                Ok(Value::from(parts.join(&**s)))
            }
            "upper" => Ok(Value::from(s.to_uppercase())),
            "lower" => Ok(Value::from(s.to_lowercase())),
            "strip" => Ok(Value::str(s.trim())),
            "split" => {
                args.check("split", 1)?;
                let parts: Vec<Value> = match args.get(0) {
                    Some(sep) => s.split(expect_str("split", sep)?).map(Value::str).collect(),
                    None => s.split_whitespace().map(Value::str).collect(),
                };
                Ok(Value::list(parts))
            }
            "startswith" => Ok(Value::Bool(s.starts_with(expect_str("startswith", single("startswith", &args)?)?))),
            "endswith" => Ok(Value::Bool(s.ends_with(expect_str("endswith", single("endswith", &args)?)?))),
            _ => Err(no_method(receiver, name)),
        },
        Value::Generator(generator) => match name {
            "send" => {
                let value = single("send", &args)?.clone();
                match interp.resume(generator, value)? {
                    Resumed::Yielded(value) => Ok(value),
                    Resumed::Returned(_) => Err(Exception::stop_iteration()),
                }
            }
            "close" => {
                generator.close();
                Ok(Value::None)
            }
            _ => Err(no_method(receiver, name)),
        },
        _ => Err(no_method(receiver, name)),
    }
}

fn dict_entries(value: &Value) -> RunResult<Vec<(Value, Value)>> {
    match value {
        Value::Dict(dict) => Ok(dict.lock().entries().to_vec()),
        other => Err(Exception::type_error(format!(
            "'{}' object is not a mapping",
            other.type_name()
        ))),
    }
}

fn no_method(receiver: &Value, name: &str) -> Box<Exception> {
    Exception::attribute_error(format!(
        "'{}' object has no attribute '{}'",
        receiver.type_name(),
        name
    ))
}
