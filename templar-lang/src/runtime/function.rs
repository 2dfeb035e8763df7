//! Script functions and argument binding

use super::exception::Exception;
use super::namespace::{module_name_of, Namespace};
use super::value::{Args, RunResult, Value};
use crate::compiler::Code;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use templar_types::FunctionKind;

/// Shared storage for a variable captured by a closure
pub type Cell = Arc<Mutex<Option<Value>>>;

pub fn new_cell(value: Option<Value>) -> Cell {
    Arc::new(Mutex::new(value))
}

/// A script function: code plus everything it was created with
pub struct Function {
    pub code: Arc<Code>,
    pub globals: Arc<dyn Namespace>,
    /// Defaults of the trailing positional parameters
    pub defaults: Vec<Value>,
    pub kwdefaults: Vec<(String, Value)>,
    /// One cell per free variable of `code`
    pub closure: Vec<Cell>,
    pub name: String,
    pub qualname: String,
    pub doc: Option<String>,
    pub module: String,
    pub dict: Mutex<HashMap<String, Value>>,
}

impl Function {
    pub fn new(
        code: Arc<Code>,
        globals: Arc<dyn Namespace>,
        defaults: Vec<Value>,
        kwdefaults: Vec<(String, Value)>,
        closure: Vec<Cell>,
    ) -> Self {
        let module = module_name_of(&*globals);
        Self {
            name: code.name.clone(),
            qualname: code.qualname.clone(),
            doc: code.docstring.clone(),
            code,
            globals,
            defaults,
            kwdefaults,
            closure,
            module,
            dict: Mutex::new(HashMap::new()),
        }
    }

    pub fn kind(&self) -> FunctionKind {
        if self.code.is_coroutine() {
            FunctionKind::Coroutine
        } else if self.code.is_generator() {
            FunctionKind::Generator
        } else {
            FunctionKind::Plain
        }
    }

    pub fn is_lambda(&self) -> bool {
        self.code.flags.lambda
    }

    /// Function attributes, including the writable `__dict__` entries
    pub fn get_attr(&self, name: &str) -> Option<Value> {
        match name {
            "__name__" => Some(Value::str(&self.name)),
            "__qualname__" => Some(Value::str(&self.qualname)),
            "__module__" => Some(Value::str(&self.module)),
            "__doc__" => Some(self.doc.as_deref().map(Value::str).unwrap_or(Value::None)),
            "__defaults__" => Some(if self.defaults.is_empty() {
                Value::None
            } else {
                Value::list(self.defaults.clone())
            }),
            "__kwdefaults__" => Some(if self.kwdefaults.is_empty() {
                Value::None
            } else {
                Value::dict(
                    self.kwdefaults
                        .iter()
                        .map(|(k, v)| (Value::str(k), v.clone()))
                        .collect(),
                )
            }),
            _ => self.dict.lock().get(name).cloned(),
        }
    }

    pub fn set_attr(&self, name: &str, value: Value) {
        self.dict.lock().insert(name.to_string(), value);
    }

    /// Map call arguments onto local slots, applying defaults
    pub fn bind_arguments(&self, args: Args) -> RunResult<Vec<Option<Value>>> {
        let layout = self.code.params;
        let varnames = &self.code.varnames;
        let name = &self.name;
        let named_count = layout.argcount + layout.kwonlyargcount;
        let mut slots: Vec<Option<Value>> = vec![None; varnames.len().max(layout.slot_count())];

        let mut positional = args.positional;
        let mut extra = Vec::new();
        if positional.len() > layout.argcount {
            if !layout.varargs {
                return Err(Exception::type_error(format!(
                    "{}() takes {} positional argument{} but {} {} given",
                    name,
                    layout.argcount,
                    plural(layout.argcount),
                    positional.len(),
                    if positional.len() == 1 { "was" } else { "were" }
                )));
            }
            extra = positional.split_off(layout.argcount);
        }
        for (slot, value) in slots.iter_mut().zip(positional) {
            *slot = Some(value);
        }

        let mut extra_keywords = Vec::new();
        for (key, value) in args.keywords {
            match varnames[..named_count].iter().position(|v| *v == key) {
                Some(index) => {
                    if slots[index].is_some() {
                        return Err(Exception::type_error(format!(
                            "{}() got multiple values for argument '{}'",
                            name, key
                        )));
                    }
                    slots[index] = Some(value);
                }
                None if layout.varkeywords => extra_keywords.push((Value::str(&key), value)),
                None => {
                    return Err(Exception::type_error(format!(
                        "{}() got an unexpected keyword argument '{}'",
                        name, key
                    )))
                }
            }
        }

        let first_default = layout.argcount.saturating_sub(self.defaults.len());
        let skipped = self.defaults.len().saturating_sub(layout.argcount);
        let mut missing = Vec::new();
        for index in 0..layout.argcount {
            if slots[index].is_some() {
                continue;
            }
            if index >= first_default {
                slots[index] = self.defaults.get(skipped + index - first_default).cloned();
            } else {
                missing.push(varnames[index].as_str());
            }
        }
        if !missing.is_empty() {
            return Err(Exception::type_error(format!(
                "{}() missing {} required positional argument{}: {}",
                name,
                missing.len(),
                plural(missing.len()),
                list_names(&missing)
            )));
        }

        let mut missing = Vec::new();
        for index in layout.argcount..named_count {
            if slots[index].is_some() {
                continue;
            }
            let param = varnames[index].as_str();
            match self.kwdefaults.iter().find(|(k, _)| k == param) {
                Some((_, value)) => slots[index] = Some(value.clone()),
                None => missing.push(param),
            }
        }
        if !missing.is_empty() {
            return Err(Exception::type_error(format!(
                "{}() missing {} required keyword-only argument{}: {}",
                name,
                missing.len(),
                plural(missing.len()),
                list_names(&missing)
            )));
        }

        let mut next = named_count;
        if layout.varargs {
            slots[next] = Some(Value::list(extra));
            next += 1;
        }
        if layout.varkeywords {
            slots[next] = Some(Value::dict(extra_keywords));
        }
        Ok(slots)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<function {}>", self.qualname)
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

/// `'a'`, `'a' and 'b'`, `'a', 'b' and 'c'`
fn list_names(names: &[&str]) -> String {
    let quoted: Vec<String> = names.iter().map(|n| format!("'{}'", n)).collect();
    match quoted.split_last() {
        Some((last, rest)) if !rest.is_empty() => format!("{} and {}", rest.join(", "), last),
        Some((last, _)) => last.clone(),
        None => String::new(),
    }
}
