//! Name resolution around a template's definition site
//!
//! Generated definitions are executed against a [`LexicalNamespace`]
//! instead of the template's module. Reads fall through the same layers
//! ordinary nested scoping uses: the scopes that were active when the
//! template was decorated (innermost first), then the template's module
//! globals, then the builtins. Writes never reach those layers.

use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use templar_lang::{Exception, Namespace, RunResult, ScopeSnapshot, Value};

pub struct LexicalNamespace {
    overrides: RwLock<HashMap<String, Value>>,
    scopes: Vec<ScopeSnapshot>,
    globals: Arc<dyn Namespace>,
    builtins: Arc<dyn Namespace>,
}

impl LexicalNamespace {
    pub fn new(scopes: Vec<ScopeSnapshot>, globals: Arc<dyn Namespace>, builtins: Arc<dyn Namespace>) -> Self {
        Self {
            overrides: RwLock::new(HashMap::new()),
            scopes,
            globals,
            builtins,
        }
    }

    /// Look a name up, failing with `NameError` when no layer binds it
    pub fn resolve(&self, name: &str) -> RunResult<Value> {
        self.get(name)
            .ok_or_else(|| Exception::name_error(format!("name '{}' is not defined", name)))
    }

    /// Names written through this namespace
    pub fn overridden(&self) -> Vec<String> {
        let mut names: Vec<String> = self.overrides.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Namespace for LexicalNamespace {
    fn get(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.overrides.read().get(name) {
            return Some(value.clone());
        }
        self.scopes
            .iter()
            .find_map(|scope| scope.get(name))
            .or_else(|| self.globals.get(name))
            .or_else(|| self.builtins.get(name))
    }

    fn set(&self, name: &str, value: Value) {
        self.overrides.write().insert(name.to_string(), value);
    }

    fn names(&self) -> Vec<String> {
        let mut names: BTreeSet<String> = self.overrides.read().keys().cloned().collect();
        for scope in &self.scopes {
            names.extend(scope.names());
        }
        names.extend(self.globals.names());
        names.extend(self.builtins.names());
        names.into_iter().collect()
    }
}

impl fmt::Debug for LexicalNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scopes: Vec<&str> = self.scopes.iter().map(ScopeSnapshot::qualname).collect();
        f.debug_struct("LexicalNamespace")
            .field("overrides", &self.overridden())
            .field("scopes", &scopes)
            .finish_non_exhaustive()
    }
}
