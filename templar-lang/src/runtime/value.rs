//! Runtime values

use super::exception::{Exception, ExceptionClass};
use super::function::Function;
use super::generator::Generator;
use super::host::HostObject;
use super::interpreter::Interpreter;
use super::namespace::{ModuleNamespace, Namespace};
use crate::unparse::{format_float, quote};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use templar_types::FunctionKind;

/// Result of anything that can raise inside a script
pub type RunResult<T> = std::result::Result<T, Box<Exception>>;

/// Signature of functions implemented in Rust
pub type NativeFn = dyn Fn(&mut Interpreter, Args) -> RunResult<Value> + Send + Sync;

/// A script value
#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    List(Arc<Mutex<Vec<Value>>>),
    Dict(Arc<Mutex<Dict>>),
    Function(Arc<Function>),
    Native(Arc<NativeFunction>),
    Method(Arc<BoundMethod>),
    Class(Arc<Class>),
    Instance(Arc<Instance>),
    Generator(Arc<Generator>),
    Iterator(Arc<Mutex<IterState>>),
    ExceptionType(Arc<ExceptionClass>),
    Exception(Arc<Exception>),
    Host(Arc<dyn HostObject>),
}

impl Value {
    pub fn str(value: &str) -> Value {
        Value::Str(value.into())
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Arc::new(Mutex::new(items)))
    }

    pub fn dict(entries: Vec<(Value, Value)>) -> Value {
        let mut dict = Dict::default();
        for (key, value) in entries {
            dict.insert(key, value);
        }
        Value::Dict(Arc::new(Mutex::new(dict)))
    }

    pub fn native(
        name: impl Into<String>,
        func: impl Fn(&mut Interpreter, Args) -> RunResult<Value> + Send + Sync + 'static,
    ) -> Value {
        Value::Native(NativeFunction::new(name, func))
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Arc<Function>> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Items of a list value, copied out
    pub fn list_items(&self) -> Option<Vec<Value>> {
        match self {
            Value::List(items) => Some(items.lock().clone()),
            _ => None,
        }
    }

    /// The script-level type name
    pub fn type_name(&self) -> String {
        match self {
            Value::None => "NoneType".to_string(),
            Value::Bool(_) => "bool".to_string(),
            Value::Int(_) => "int".to_string(),
            Value::Float(_) => "float".to_string(),
            Value::Str(_) => "str".to_string(),
            Value::List(_) => "list".to_string(),
            Value::Dict(_) => "dict".to_string(),
            Value::Function(_) => "function".to_string(),
            Value::Native(_) => "builtin_function_or_method".to_string(),
            Value::Method(_) => "method".to_string(),
            Value::Class(_) | Value::ExceptionType(_) => "type".to_string(),
            Value::Instance(instance) => instance.class.name.clone(),
            Value::Generator(gen) => match gen.kind {
                FunctionKind::Coroutine => "coroutine".to_string(),
                _ => "generator".to_string(),
            },
            Value::Iterator(_) => "iterator".to_string(),
            Value::Exception(exc) => exc.class.name.clone(),
            Value::Host(host) => host.type_name().to_string(),
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.lock().is_empty(),
            Value::Dict(dict) => !dict.lock().is_empty(),
            _ => true,
        }
    }

    /// Identity comparison (`is`)
    pub fn is_identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b),
            (Value::Dict(a), Value::Dict(b)) => Arc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Arc::ptr_eq(a, b),
            (Value::Method(a), Value::Method(b)) => Arc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Arc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Arc::ptr_eq(a, b),
            (Value::Generator(a), Value::Generator(b)) => Arc::ptr_eq(a, b),
            (Value::Iterator(a), Value::Iterator(b)) => Arc::ptr_eq(a, b),
            (Value::ExceptionType(a), Value::ExceptionType(b)) => Arc::ptr_eq(a, b),
            (Value::Exception(a), Value::Exception(b)) => Arc::ptr_eq(a, b),
            (Value::Host(a), Value::Host(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Structural equality (`==`)
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f64) == *b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Bool(_) | Value::Int(_), Value::Bool(_) | Value::Int(_)) => self.as_int() == other.as_int(),
            (Value::List(a), Value::List(b)) => {
                if Arc::ptr_eq(a, b) {
                    return true;
                }
                let a = a.lock().clone();
                let b = b.lock().clone();
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.equals(y))
            }
            (Value::Dict(a), Value::Dict(b)) => {
                if Arc::ptr_eq(a, b) {
                    return true;
                }
                let a = a.lock().clone();
                let b = b.lock().clone();
                a.len() == b.len()
                    && a.entries
                        .iter()
                        .all(|(key, value)| b.get(key).is_some_and(|other| other.equals(value)))
            }
            (Value::Method(a), Value::Method(b)) => {
                a.receiver.is_identical(&b.receiver)
                    && match (&a.kind, &b.kind) {
                        (MethodKind::Function(x), MethodKind::Function(y)) => Arc::ptr_eq(x, y),
                        (MethodKind::Builtin(x), MethodKind::Builtin(y)) => x == y,
                        (MethodKind::Host(x), MethodKind::Host(y)) => x == y,
                        _ => false,
                    }
            }
            _ => self.is_identical(other),
        }
    }

    /// `repr()` of the value
    pub fn repr(&self) -> String {
        match self {
            Value::None => "None".to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format_float(*f),
            Value::Str(s) => quote(s),
            Value::List(items) => {
                let items = items.lock().clone();
                let parts: Vec<String> = items.iter().map(Value::repr).collect();
                format!("[{}]", parts.join(", "))
            }
            Value::Dict(dict) => {
                let dict = dict.lock().clone();
                let parts: Vec<String> = dict
                    .entries
                    .iter()
                    .map(|(key, value)| format!("{}: {}", key.repr(), value.repr()))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
            Value::Function(f) => format!("<function {}>", f.qualname),
            Value::Native(f) => format!("<built-in function {}>", f.name),
            Value::Method(method) => match &method.kind {
                MethodKind::Function(f) => format!("<bound method {} of {}>", f.qualname, method.receiver.repr()),
                MethodKind::Builtin(name) => {
                    format!("<built-in method {} of {} object>", name, method.receiver.type_name())
                }
                MethodKind::Host(name) => {
                    format!("<built-in method {} of {} object>", name, method.receiver.type_name())
                }
            },
            Value::Class(class) => format!("<class '{}'>", class.qualname),
            Value::Instance(instance) => format!("<{} object>", instance.class.qualname),
            Value::Generator(gen) => format!("<{} object {}>", self.type_name(), gen.qualname),
            Value::Iterator(_) => "<iterator object>".to_string(),
            Value::ExceptionType(class) => format!("<class '{}'>", class.name),
            Value::Exception(exc) => format!("{}({})", exc.class.name, quote(&exc.message)),
            Value::Host(host) => host.repr(),
        }
    }

    /// `str()` of the value
    pub fn to_str(&self) -> String {
        match self {
            Value::Str(s) => s.to_string(),
            Value::Exception(exc) => exc.message.clone(),
            _ => self.repr(),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::str(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value.into())
    }
}

/// Insertion-ordered mapping with script equality on keys
#[derive(Debug, Clone, Default)]
pub struct Dict {
    entries: Vec<(Value, Value)>,
}

impl Dict {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k.equals(key)).map(|(_, v)| v)
    }

    pub fn insert(&mut self, key: Value, value: Value) {
        match self.entries.iter_mut().find(|(k, _)| k.equals(&key)) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &Value) -> Option<Value> {
        let index = self.entries.iter().position(|(k, _)| k.equals(key))?;
        Some(self.entries.remove(index).1)
    }

    pub fn keys(&self) -> Vec<Value> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.entries.iter().map(|(_, v)| v.clone()).collect()
    }

    pub fn entries(&self) -> &[(Value, Value)] {
        &self.entries
    }
}

/// Call arguments
#[derive(Debug, Clone, Default)]
pub struct Args {
    pub positional: Vec<Value>,
    pub keywords: Vec<(String, Value)>,
}

impl Args {
    pub fn new(positional: Vec<Value>) -> Self {
        Self {
            positional,
            keywords: Vec::new(),
        }
    }

    pub fn with_keyword(mut self, name: impl Into<String>, value: Value) -> Self {
        self.keywords.push((name.into(), value));
        self
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    pub fn keyword(&self, name: &str) -> Option<&Value> {
        self.keywords.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Remove and return a keyword argument
    pub fn take_keyword(&mut self, name: &str) -> Option<Value> {
        let index = self.keywords.iter().position(|(k, _)| k == name)?;
        Some(self.keywords.remove(index).1)
    }

    /// A positional argument that may also be passed by keyword
    pub fn take(&mut self, index: usize, name: &str) -> Option<Value> {
        self.take_keyword(name).or_else(|| self.positional.get(index).cloned())
    }

    /// Reject leftover keywords and excess positionals
    pub fn check(&self, function: &str, max_positional: usize) -> RunResult<()> {
        if let Some((name, _)) = self.keywords.first() {
            return Err(Exception::type_error(format!(
                "{}() got an unexpected keyword argument '{}'",
                function, name
            )));
        }
        if self.positional.len() > max_positional {
            return Err(Exception::type_error(format!(
                "{}() takes at most {} argument{} ({} given)",
                function,
                max_positional,
                if max_positional == 1 { "" } else { "s" },
                self.positional.len()
            )));
        }
        Ok(())
    }
}

/// A function implemented in Rust
pub struct NativeFunction {
    pub name: String,
    func: Box<NativeFn>,
}

impl NativeFunction {
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(&mut Interpreter, Args) -> RunResult<Value> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            func: Box::new(func),
        })
    }

    pub fn invoke(&self, interp: &mut Interpreter, args: Args) -> RunResult<Value> {
        (self.func)(interp, args)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<built-in function {}>", self.name)
    }
}

/// What a bound method dispatches to
#[derive(Debug, Clone)]
pub enum MethodKind {
    /// A script function receiving the receiver as first argument
    Function(Arc<Function>),
    /// A method of a builtin type
    Builtin(&'static str),
    /// A method of a host object
    Host(String),
}

/// A callable bound to its receiver
#[derive(Debug)]
pub struct BoundMethod {
    pub receiver: Value,
    pub kind: MethodKind,
}

impl BoundMethod {
    pub fn new(receiver: Value, kind: MethodKind) -> Value {
        Value::Method(Arc::new(Self { receiver, kind }))
    }
}

/// A script class
#[derive(Debug)]
pub struct Class {
    pub name: String,
    pub qualname: String,
    pub module: String,
    pub bases: Vec<Arc<Class>>,
    pub namespace: Arc<ModuleNamespace>,
}

impl Class {
    /// Look an attribute up along the base chain
    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.namespace.get(name) {
            return Some(value);
        }
        self.bases.iter().find_map(|base| base.lookup(name))
    }

    pub fn is_subclass_of(&self, other: &Class) -> bool {
        std::ptr::eq(self, other) || self.bases.iter().any(|base| base.is_subclass_of(other))
    }
}

/// An instance of a script class
#[derive(Debug)]
pub struct Instance {
    pub class: Arc<Class>,
    pub attrs: Mutex<HashMap<String, Value>>,
}

/// State of a builtin iterator
#[derive(Debug)]
pub enum IterState {
    Items { items: Vec<Value>, pos: usize },
    Range { next: i64, stop: i64, step: i64 },
    /// Suspends its awaiter exactly once, then finishes with `None`
    Suspend { done: bool },
}

impl IterState {
    pub fn next_value(&mut self) -> Option<Value> {
        match self {
            IterState::Items { items, pos } => {
                let value = items.get(*pos).cloned()?;
                *pos += 1;
                Some(value)
            }
            IterState::Range { next, stop, step } => {
                let exhausted = if *step > 0 { *next >= *stop } else { *next <= *stop };
                if exhausted {
                    return None;
                }
                let value = *next;
                *next += *step;
                Some(Value::Int(value))
            }
            IterState::Suspend { done } => {
                if *done {
                    None
                } else {
                    *done = true;
                    Some(Value::None)
                }
            }
        }
    }

    pub fn into_value(self) -> Value {
        Value::Iterator(Arc::new(Mutex::new(self)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_and_identity() {
        let a = Value::list(vec![Value::Int(1), Value::str("x")]);
        let b = Value::list(vec![Value::Int(1), Value::str("x")]);
        assert!(a.equals(&b));
        assert!(!a.is_identical(&b));
        assert!(a.is_identical(&a.clone()));
        assert!(Value::Int(1).equals(&Value::Float(1.0)));
        assert!(Value::Bool(true).equals(&Value::Int(1)));
    }

    #[test]
    fn test_repr() {
        let dict = Value::dict(vec![(Value::str("a"), Value::list(vec![Value::None, Value::Float(2.0)]))]);
        assert_eq!(dict.repr(), "{'a': [None, 2.0]}");
        assert_eq!(Value::str("it's").to_str(), "it's");
    }

    #[test]
    fn test_range_iterator() {
        let mut state = IterState::Range { next: 3, stop: 0, step: -1 };
        let mut seen = Vec::new();
        while let Some(value) = state.next_value() {
            seen.push(value.as_int().unwrap_or_default());
        }
        assert_eq!(seen, vec![3, 2, 1]);
    }

    #[test]
    fn test_args_take_keyword() {
        let mut args = Args::new(vec![Value::Int(1)]).with_keyword("sep", Value::str("-"));
        assert_eq!(args.take(1, "sep").and_then(|v| v.as_str().map(String::from)), Some("-".to_string()));
        assert!(args.check("f", 1).is_ok());
    }
}
