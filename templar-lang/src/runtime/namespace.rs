//! Variable namespaces and read-only views of active scopes

use super::function::Cell;
use super::value::Value;
use crate::compiler::Code;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A mapping from names to values that code can be executed against.
///
/// Module globals implement this, and so can hosts that want to control
/// name resolution for code they execute.
pub trait Namespace: Send + Sync + fmt::Debug {
    fn get(&self, name: &str) -> Option<Value>;

    fn set(&self, name: &str, value: Value);

    fn names(&self) -> Vec<String>;

    fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

/// A plain namespace: module globals, builtins or a class body
#[derive(Default)]
pub struct ModuleNamespace {
    values: RwLock<HashMap<String, Value>>,
}

impl ModuleNamespace {
    /// A module namespace with `__name__` set
    pub fn new(name: &str) -> Arc<Self> {
        let namespace = Self::default();
        namespace.set("__name__", Value::str(name));
        Arc::new(namespace)
    }

    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The `__name__` entry, if it is a string
    pub fn module_name(&self) -> Option<String> {
        self.get("__name__").and_then(|v| v.as_str().map(String::from))
    }

    pub fn remove(&self, name: &str) -> Option<Value> {
        self.values.write().remove(name)
    }
}

impl Namespace for ModuleNamespace {
    fn get(&self, name: &str) -> Option<Value> {
        self.values.read().get(name).cloned()
    }

    fn set(&self, name: &str, value: Value) {
        self.values.write().insert(name.to_string(), value);
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.values.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for ModuleNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleNamespace").field("names", &self.names()).finish()
    }
}

/// `__name__` of a namespace, falling back to `__main__`
pub fn module_name_of(namespace: &dyn Namespace) -> String {
    namespace
        .get("__name__")
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_else(|| "__main__".to_string())
}

/// A view of the variables of one executing function or class body.
///
/// The view shares storage with the frame, so it observes later
/// assignments as long as the frame is alive.
#[derive(Clone)]
pub struct ScopeSnapshot {
    pub(crate) code: Arc<Code>,
    pub(crate) locals: Arc<Mutex<Vec<Option<Value>>>>,
    pub(crate) cells: Vec<Cell>,
    pub(crate) names: Option<Arc<dyn Namespace>>,
}

impl ScopeSnapshot {
    /// Qualified name of the code running in this scope
    pub fn qualname(&self) -> &str {
        &self.code.qualname
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(names) = &self.names {
            if let Some(value) = names.get(name) {
                return Some(value);
            }
        }
        if let Some(index) = self.code.varnames.iter().position(|v| v == name) {
            if let Some(value) = self.locals.lock().get(index).cloned().flatten() {
                return Some(value);
            }
        }
        let deref = self
            .code
            .cellvars
            .iter()
            .chain(self.code.freevars.iter())
            .position(|v| v == name)?;
        self.cells.get(deref).and_then(|cell| cell.lock().clone())
    }

    /// Every name bound in this scope
    pub fn names(&self) -> Vec<String> {
        let mut names = Vec::new();
        if let Some(namespace) = &self.names {
            names.extend(namespace.names());
        }
        let locals = self.locals.lock();
        for (name, value) in self.code.varnames.iter().zip(locals.iter()) {
            if value.is_some() {
                names.push(name.clone());
            }
        }
        drop(locals);
        for (name, cell) in self.code.cellvars.iter().chain(self.code.freevars.iter()).zip(&self.cells) {
            if cell.lock().is_some() {
                names.push(name.clone());
            }
        }
        names
    }
}

impl fmt::Debug for ScopeSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeSnapshot")
            .field("qualname", &self.code.qualname)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_namespace() {
        let namespace = ModuleNamespace::new("pkg.mod");
        namespace.set("x", Value::Int(1));
        assert_eq!(namespace.module_name().as_deref(), Some("pkg.mod"));
        assert!(namespace.contains("x"));
        assert_eq!(namespace.names(), vec!["__name__".to_string(), "x".to_string()]);
        assert_eq!(module_name_of(&*ModuleNamespace::empty()), "__main__");
    }
}
