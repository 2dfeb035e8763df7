//! Objects implemented by the embedding application

use super::exception::Exception;
use super::interpreter::Interpreter;
use super::value::{Args, RunResult, Value};
use std::any::Any;
use std::fmt;

/// A value whose behavior is provided by Rust code.
///
/// Attribute reads go through [`HostObject::get_attr`] first; names for
/// which [`HostObject::has_method`] is true become bound methods that
/// dispatch to [`HostObject::call_method`].
pub trait HostObject: Send + Sync + fmt::Debug {
    fn type_name(&self) -> &str;

    fn as_any(&self) -> &dyn Any;

    fn get_attr(&self, _name: &str) -> Option<Value> {
        None
    }

    fn has_method(&self, _name: &str) -> bool {
        false
    }

    fn call_method(&self, _interp: &mut Interpreter, name: &str, _args: Args) -> RunResult<Value> {
        Err(Exception::attribute_error(format!(
            "'{}' object has no attribute '{}'",
            self.type_name(),
            name
        )))
    }

    fn call(&self, _interp: &mut Interpreter, _args: Args) -> RunResult<Value> {
        Err(Exception::type_error(format!(
            "'{}' object is not callable",
            self.type_name()
        )))
    }

    /// Produce the value seen when this object is read as an attribute of
    /// `instance` through its class
    fn bind(&self, _instance: &Value) -> Option<Value> {
        None
    }

    fn repr(&self) -> String {
        format!("<{} object>", self.type_name())
    }
}
