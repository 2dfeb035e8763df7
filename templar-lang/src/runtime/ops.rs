//! Operators, attribute access and subscripts

use super::exception::Exception;
use super::namespace::Namespace;
use super::value::{BoundMethod, MethodKind, RunResult, Value};
use crate::ast::{BinOp, CmpOp, UnaryOp};
use std::cmp::Ordering;

pub(crate) const LIST_METHODS: &[&str] = &["append", "extend", "pop", "insert", "index"];
pub(crate) const DICT_METHODS: &[&str] = &["get", "keys", "values", "items", "pop", "update"];
pub(crate) const STR_METHODS: &[&str] = &["join", "upper", "lower", "strip", "split", "startswith", "endswith"];
pub(crate) const GENERATOR_METHODS: &[&str] = &["send", "close"];

fn builtin_method(receiver: &Value, methods: &[&'static str], name: &str) -> Option<Value> {
    methods
        .iter()
        .find(|m| **m == name)
        .map(|m| BoundMethod::new(receiver.clone(), MethodKind::Builtin(m)))
}

fn no_attribute(value: &Value, name: &str) -> Box<Exception> {
    Exception::attribute_error(format!("'{}' object has no attribute '{}'", value.type_name(), name))
}

/// Turn a class attribute read through an instance into what the instance sees
fn bind_to_instance(instance: &Value, attr: Value) -> Value {
    match &attr {
        Value::Function(f) => BoundMethod::new(instance.clone(), MethodKind::Function(f.clone())),
        Value::Host(host) => host.bind(instance).unwrap_or(attr),
        _ => attr,
    }
}

/// `value.name`
pub fn get_attr(value: &Value, name: &str) -> RunResult<Value> {
    let found = match value {
        Value::Function(f) => f.get_attr(name),
        Value::Method(method) => match name {
            "__self__" => Some(method.receiver.clone()),
            "__func__" => match &method.kind {
                MethodKind::Function(f) => Some(Value::Function(f.clone())),
                _ => None,
            },
            _ => match &method.kind {
                MethodKind::Function(f) => f.get_attr(name),
                _ => None,
            },
        },
        Value::Instance(instance) => {
            let own = instance.attrs.lock().get(name).cloned();
            match own {
                Some(attr) => Some(attr),
                None if name == "__class__" => Some(Value::Class(instance.class.clone())),
                None => instance.class.lookup(name).map(|attr| bind_to_instance(value, attr)),
            }
        }
        Value::Class(class) => match name {
            "__name__" => Some(Value::str(&class.name)),
            "__qualname__" => Some(Value::str(&class.qualname)),
            "__module__" => Some(Value::str(&class.module)),
            _ => class.lookup(name),
        },
        Value::Host(host) => host.get_attr(name).or_else(|| {
            host.has_method(name)
                .then(|| BoundMethod::new(value.clone(), MethodKind::Host(name.to_string())))
        }),
        Value::ExceptionType(class) => match name {
            "__name__" => Some(Value::str(&class.name)),
            _ => None,
        },
        Value::Exception(exc) => match name {
            "args" => Some(Value::list(vec![Value::str(&exc.message)])),
            _ => None,
        },
        Value::Generator(gen) => match name {
            "__name__" => Some(Value::str(&gen.name)),
            "__qualname__" => Some(Value::str(&gen.qualname)),
            _ => builtin_method(value, GENERATOR_METHODS, name),
        },
        Value::List(_) => builtin_method(value, LIST_METHODS, name),
        Value::Dict(_) => builtin_method(value, DICT_METHODS, name),
        Value::Str(_) => builtin_method(value, STR_METHODS, name),
        Value::Native(native) => match name {
            "__name__" => Some(Value::str(&native.name)),
            _ => None,
        },
        _ => None,
    };
    found.ok_or_else(|| no_attribute(value, name))
}

/// `value.name = attr`
pub fn set_attr(value: &Value, name: &str, attr: Value) -> RunResult<()> {
    match value {
        Value::Instance(instance) => {
            instance.attrs.lock().insert(name.to_string(), attr);
            Ok(())
        }
        Value::Function(f) => {
            f.set_attr(name, attr);
            Ok(())
        }
        Value::Class(class) => {
            class.namespace.set(name, attr);
            Ok(())
        }
        _ => Err(no_attribute(value, name)),
    }
}

fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let index = if index < 0 { index + len } else { index };
    (0..len).contains(&index).then_some(index as usize)
}

/// `value[index]`
pub fn get_item(value: &Value, index: &Value) -> RunResult<Value> {
    match (value, index) {
        (Value::List(items), _) => {
            let Some(i) = index.as_int() else {
                return Err(Exception::type_error(format!(
                    "list indices must be integers, not {}",
                    index.type_name()
                )));
            };
            let items = items.lock();
            normalize_index(i, items.len())
                .and_then(|i| items.get(i).cloned())
                .ok_or_else(|| Exception::index_error("list index out of range"))
        }
        (Value::Str(s), Value::Int(i)) => {
            let chars: Vec<char> = s.chars().collect();
            normalize_index(*i, chars.len())
                .map(|i| Value::Str(chars[i].to_string().into()))
                .ok_or_else(|| Exception::index_error("string index out of range"))
        }
        (Value::Dict(dict), _) => dict
            .lock()
            .get(index)
            .cloned()
            .ok_or_else(|| Exception::key_error(index.repr())),
        _ => Err(Exception::type_error(format!(
            "'{}' object is not subscriptable",
            value.type_name()
        ))),
    }
}

/// `value[index] = item`
pub fn set_item(value: &Value, index: &Value, item: Value) -> RunResult<()> {
    match value {
        Value::List(items) => {
            let Some(i) = index.as_int() else {
                return Err(Exception::type_error(format!(
                    "list indices must be integers, not {}",
                    index.type_name()
                )));
            };
            let mut items = items.lock();
            let i = normalize_index(i, items.len())
                .ok_or_else(|| Exception::index_error("list assignment index out of range"))?;
            items[i] = item;
            Ok(())
        }
        Value::Dict(dict) => {
            dict.lock().insert(index.clone(), item);
            Ok(())
        }
        _ => Err(Exception::type_error(format!(
            "'{}' object does not support item assignment",
            value.type_name()
        ))),
    }
}

fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Float(f) => Some(*f),
        _ => value.as_int().map(|i| i as f64),
    }
}

fn unsupported(op: &str, left: &Value, right: &Value) -> Box<Exception> {
    Exception::type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op,
        left.type_name(),
        right.type_name()
    ))
}

fn overflow() -> Box<Exception> {
    Exception::new(&super::exception::RUNTIME_ERROR, "integer overflow")
}

fn repeat<T: Clone>(items: &[T], count: i64) -> Vec<T> {
    let count = count.max(0) as usize;
    let mut out = Vec::with_capacity(items.len() * count);
    for _ in 0..count {
        out.extend_from_slice(items);
    }
    out
}

fn int_binary(op: BinOp, a: i64, b: i64) -> RunResult<Value> {
    let result = match op {
        BinOp::Add => a.checked_add(b),
        BinOp::Sub => a.checked_sub(b),
        BinOp::Mul => a.checked_mul(b),
        BinOp::Div => {
            if b == 0 {
                return Err(Exception::zero_division("division by zero"));
            }
            return Ok(Value::Float(a as f64 / b as f64));
        }
        BinOp::FloorDiv => {
            if b == 0 {
                return Err(Exception::zero_division("integer division or modulo by zero"));
            }
            floor_div(a, b)
        }
        BinOp::Mod => {
            if b == 0 {
                return Err(Exception::zero_division("integer division or modulo by zero"));
            }
            floor_div(a, b).and_then(|q| q.checked_mul(b)).and_then(|m| a.checked_sub(m))
        }
        BinOp::Pow => {
            if b < 0 {
                return Ok(Value::Float((a as f64).powf(b as f64)));
            }
            u32::try_from(b).ok().and_then(|b| a.checked_pow(b))
        }
    };
    result.map(Value::Int).ok_or_else(overflow)
}

/// Quotient rounded toward negative infinity
fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    if (a % b != 0) && ((a < 0) != (b < 0)) {
        q.checked_sub(1)
    } else {
        Some(q)
    }
}

fn float_binary(op: BinOp, a: f64, b: f64) -> RunResult<Value> {
    let value = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            if b == 0.0 {
                return Err(Exception::zero_division("float division by zero"));
            }
            a / b
        }
        BinOp::FloorDiv => {
            if b == 0.0 {
                return Err(Exception::zero_division("float floor division by zero"));
            }
            (a / b).floor()
        }
        BinOp::Mod => {
            if b == 0.0 {
                return Err(Exception::zero_division("float modulo"));
            }
            a - b * (a / b).floor()
        }
        BinOp::Pow => a.powf(b),
    };
    Ok(Value::Float(value))
}

/// `left op right`
pub fn binary_op(op: BinOp, left: &Value, right: &Value) -> RunResult<Value> {
    match (left, right) {
        (Value::Int(_) | Value::Bool(_), Value::Int(_) | Value::Bool(_)) => {
            let (Some(a), Some(b)) = (left.as_int(), right.as_int()) else {
                return Err(unsupported(op.symbol(), left, right));
            };
            int_binary(op, a, b)
        }
        (Value::Float(_), Value::Int(_) | Value::Bool(_) | Value::Float(_))
        | (Value::Int(_) | Value::Bool(_), Value::Float(_)) => {
            let (Some(a), Some(b)) = (as_float(left), as_float(right)) else {
                return Err(unsupported(op.symbol(), left, right));
            };
            float_binary(op, a, b)
        }
        (Value::Str(a), Value::Str(b)) if op == BinOp::Add => Ok(Value::Str(format!("{}{}", a, b).into())),
        (Value::Str(s), Value::Int(n)) | (Value::Int(n), Value::Str(s)) if op == BinOp::Mul => {
            Ok(Value::Str(s.repeat((*n).max(0) as usize).into()))
        }
        (Value::List(a), Value::List(b)) if op == BinOp::Add => {
            let mut items = a.lock().clone();
            let other = b.lock().clone();
            items.extend(other);
            Ok(Value::list(items))
        }
        (Value::List(items), Value::Int(n)) | (Value::Int(n), Value::List(items)) if op == BinOp::Mul => {
            let items = items.lock().clone();
            Ok(Value::list(repeat(&items, *n)))
        }
        _ => Err(unsupported(op.symbol(), left, right)),
    }
}

/// `op value`
pub fn unary_op(op: UnaryOp, value: &Value) -> RunResult<Value> {
    match (op, value) {
        (UnaryOp::Not, _) => Ok(Value::Bool(!value.is_truthy())),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Pos, Value::Float(f)) => Ok(Value::Float(*f)),
        (UnaryOp::Neg, Value::Int(_) | Value::Bool(_)) => value
            .as_int()
            .and_then(i64::checked_neg)
            .map(Value::Int)
            .ok_or_else(overflow),
        (UnaryOp::Pos, Value::Int(_) | Value::Bool(_)) => Ok(Value::Int(value.as_int().unwrap_or_default())),
        _ => Err(Exception::type_error(format!(
            "bad operand type for unary {}: '{}'",
            if op == UnaryOp::Neg { "-" } else { "+" },
            value.type_name()
        ))),
    }
}

fn order(op: CmpOp, left: &Value, right: &Value) -> RunResult<Ordering> {
    let ordering = match (left, right) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::List(a), Value::List(b)) => {
            let a = a.lock().clone();
            let b = b.lock().clone();
            for (x, y) in a.iter().zip(b.iter()) {
                if !x.equals(y) {
                    return order(op, x, y);
                }
            }
            Some(a.len().cmp(&b.len()))
        }
        _ => match (as_float(left), as_float(right)) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
    };
    ordering.ok_or_else(|| {
        Exception::type_error(format!(
            "'{}' not supported between instances of '{}' and '{}'",
            op.symbol(),
            left.type_name(),
            right.type_name()
        ))
    })
}

fn contains(container: &Value, item: &Value) -> RunResult<bool> {
    match container {
        Value::List(items) => Ok(items.lock().iter().any(|v| v.equals(item))),
        Value::Dict(dict) => Ok(dict.lock().get(item).is_some()),
        Value::Str(s) => match item {
            Value::Str(needle) => Ok(s.contains(&**needle)),
            _ => Err(Exception::type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                item.type_name()
            ))),
        },
        _ => Err(Exception::type_error(format!(
            "argument of type '{}' is not iterable",
            container.type_name()
        ))),
    }
}

/// `left op right`
pub fn compare(op: CmpOp, left: &Value, right: &Value) -> RunResult<bool> {
    Ok(match op {
        CmpOp::Eq => left.equals(right),
        CmpOp::NotEq => !left.equals(right),
        CmpOp::Is => left.is_identical(right),
        CmpOp::IsNot => !left.is_identical(right),
        CmpOp::In => contains(right, left)?,
        CmpOp::NotIn => !contains(right, left)?,
        CmpOp::Lt => order(op, left, right)? == Ordering::Less,
        CmpOp::Le => order(op, left, right)? != Ordering::Greater,
        CmpOp::Gt => order(op, left, right)? == Ordering::Greater,
        CmpOp::Ge => order(op, left, right)? != Ordering::Less,
    })
}

/// True if `value` is an instance of `class`, or of any class in a list
pub fn is_instance(value: &Value, class: &Value) -> RunResult<bool> {
    match class {
        Value::Class(class) => Ok(match value {
            Value::Instance(instance) => instance.class.is_subclass_of(class),
            _ => false,
        }),
        Value::ExceptionType(class) => Ok(match value {
            Value::Exception(exc) => exc.is_instance_of(class),
            _ => false,
        }),
        Value::Native(native) => Ok(value.type_name() == native.name),
        Value::List(classes) => {
            let classes = classes.lock().clone();
            for class in &classes {
                if is_instance(value, class)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        _ => Err(Exception::type_error(
            "isinstance() arg 2 must be a type or a list of types",
        )),
    }
}

/// Whether an exception matches an `except` clause type
pub fn exception_matches(exc: &Value, typ: &Value) -> RunResult<bool> {
    match typ {
        Value::ExceptionType(_) | Value::List(_) => is_instance(exc, typ),
        _ => Err(Exception::type_error(
            "catching classes that do not inherit from BaseException is not allowed",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floor_semantics() {
        assert!(binary_op(BinOp::FloorDiv, &Value::Int(-7), &Value::Int(2)).unwrap().equals(&Value::Int(-4)));
        assert!(binary_op(BinOp::Mod, &Value::Int(-7), &Value::Int(2)).unwrap().equals(&Value::Int(1)));
        assert!(binary_op(BinOp::Mod, &Value::Int(7), &Value::Int(-2)).unwrap().equals(&Value::Int(-1)));
    }

    #[test]
    fn test_division_by_zero() {
        let err = binary_op(BinOp::Div, &Value::Int(1), &Value::Int(0)).unwrap_err();
        assert_eq!(err.class_name(), "ZeroDivisionError");
    }

    #[test]
    fn test_sequence_operators() {
        let joined = binary_op(BinOp::Add, &Value::str("ab"), &Value::str("cd")).unwrap();
        assert_eq!(joined.as_str(), Some("abcd"));
        let repeated = binary_op(BinOp::Mul, &Value::list(vec![Value::Int(1)]), &Value::Int(3)).unwrap();
        assert_eq!(repeated.repr(), "[1, 1, 1]");
        assert!(compare(CmpOp::In, &Value::Int(1), &repeated).unwrap());
    }
}
