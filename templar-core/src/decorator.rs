//! Script-facing entry points
//!
//! `@transfunction` (or the configured name) wraps the decorated function in
//! a [`TransformerObject`]: a host object exposing the accessors, refusing
//! direct calls and binding to instances when read through a class.

use crate::config::EngineConfig;
use crate::error::TransfunctionError;
use crate::transformer::{CallSite, Transformer, VariantRequest};
use std::any::Any;
use std::sync::Arc;
use templar_lang::{
    Args, BoundMethod, Exception, Function, FunctionKind, HostObject, Interpreter, MethodKind, RunResult, Value,
};

const ACCESSORS: [&str; 4] = [
    "get_usual_function",
    "get_async_function",
    "get_generator_function",
    "get_variant_function",
];

/// A wrapped template as scripts see it
#[derive(Debug)]
pub struct TransformerObject {
    transformer: Arc<Transformer>,
    instance: Option<Value>,
}

impl TransformerObject {
    pub fn new(transformer: Arc<Transformer>) -> Self {
        Self {
            transformer,
            instance: None,
        }
    }

    pub fn transformer(&self) -> &Arc<Transformer> {
        &self.transformer
    }

    /// Instance the produced variants are bound to
    pub fn instance(&self) -> Option<&Value> {
        self.instance.as_ref()
    }

    fn produce(&self, interp: &mut Interpreter, request: &VariantRequest) -> RunResult<Value> {
        let function = self
            .transformer
            .get(interp, request)
            .map_err(TransfunctionError::into_exception)?;
        Ok(self.present(function))
    }

    fn present(&self, function: Arc<Function>) -> Value {
        match &self.instance {
            Some(instance) => BoundMethod::new(instance.clone(), MethodKind::Function(function)),
            None => Value::Function(function),
        }
    }
}

impl HostObject for TransformerObject {
    fn type_name(&self) -> &str {
        "transfunction"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn get_attr(&self, name: &str) -> Option<Value> {
        let template = self.transformer.template();
        match name {
            "function" => Some(self.present(template.clone())),
            "variants" => Some(match self.transformer.variants() {
                Some(variants) => Value::list(variants.iter().map(|v| Value::str(v.as_str())).collect()),
                None => Value::None,
            }),
            "__name__" => Some(Value::str(template.name.as_str())),
            "__qualname__" => Some(Value::str(template.qualname.as_str())),
            "__module__" => Some(Value::str(template.module.as_str())),
            "__doc__" => Some(template.doc.as_deref().map(Value::str).unwrap_or(Value::None)),
            _ => None,
        }
    }

    fn has_method(&self, name: &str) -> bool {
        ACCESSORS.contains(&name)
    }

    fn call_method(&self, interp: &mut Interpreter, name: &str, mut args: Args) -> RunResult<Value> {
        let request = match name {
            "get_usual_function" | "get_async_function" | "get_generator_function" => {
                args.check(name, 0)?;
                let kind = match name {
                    "get_usual_function" => FunctionKind::Plain,
                    "get_async_function" => FunctionKind::Coroutine,
                    _ => FunctionKind::Generator,
                };
                VariantRequest::kind(kind)
            }
            "get_variant_function" => {
                let variant = args.take(0, "name");
                let patches = args.take_keyword("patches");
                let kind = args.take_keyword("kind");
                args.check(name, 1)?;
                let variant = match variant {
                    Some(Value::Str(s)) => s.to_string(),
                    Some(other) => {
                        return Err(Exception::type_error(format!(
                            "variant name must be a string, not '{}'",
                            other.type_name()
                        )))
                    }
                    None => return Err(Exception::type_error("get_variant_function() missing variant name")),
                };
                let kind = match kind {
                    None | Some(Value::None) => FunctionKind::Plain,
                    Some(value) => parse_kind(&value)?,
                };
                VariantRequest::variant(variant, kind).with_patches(string_list("patches", patches)?)
            }
            _ => {
                return Err(Exception::attribute_error(format!(
                    "'transfunction' object has no attribute '{}'",
                    name
                )))
            }
        };
        self.produce(interp, &request)
    }

    fn call(&self, _interp: &mut Interpreter, _args: Args) -> RunResult<Value> {
        Err(TransfunctionError::CallTransfunctionDirectly.into_exception())
    }

    fn bind(&self, instance: &Value) -> Option<Value> {
        Some(Value::Host(Arc::new(TransformerObject {
            transformer: self.transformer.clone(),
            instance: Some(instance.clone()),
        })))
    }

    fn repr(&self) -> String {
        format!("<transfunction {}>", self.transformer.template().qualname)
    }
}

fn parse_kind(value: &Value) -> RunResult<FunctionKind> {
    match value.as_str() {
        Some("plain") | Some("usual") => Ok(FunctionKind::Plain),
        Some("coroutine") | Some("async") => Ok(FunctionKind::Coroutine),
        Some("generator") => Ok(FunctionKind::Generator),
        _ => Err(Exception::value_error(format!(
            "kind must be 'plain', 'coroutine' or 'generator', not {}",
            value.repr()
        ))),
    }
}

/// A list of strings, or nothing for `None`
fn string_list(what: &str, value: Option<Value>) -> RunResult<Vec<String>> {
    let items = match value {
        None | Some(Value::None) => return Ok(Vec::new()),
        Some(value) => value.list_items().ok_or_else(|| {
            Exception::type_error(format!("{} must be a list of strings, not '{}'", what, value.type_name()))
        })?,
    };
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(String::from)
                .ok_or_else(|| Exception::type_error(format!("{} must be a list of strings", what)))
        })
        .collect()
}

pub(crate) fn is_transformer(host: &dyn HostObject) -> bool {
    host.as_any().is::<TransformerObject>()
}

/// The transformer behind a script value produced by the entry decorator
pub fn transformer_of(value: &Value) -> Option<Arc<Transformer>> {
    match value {
        Value::Host(host) => host
            .as_any()
            .downcast_ref::<TransformerObject>()
            .map(|object| object.transformer.clone()),
        _ => None,
    }
}

/// Wrap `template` as decorated from the innermost running script line
fn wrap_here(
    interp: &mut Interpreter,
    template: &Value,
    variants: Option<Vec<String>>,
    config: &EngineConfig,
) -> RunResult<Value> {
    let line = interp
        .caller_line()
        .ok_or_else(|| TransfunctionError::AmbiguousFrame.into_exception())?;
    let site = CallSite {
        line,
        decorator_name: config.decorator_name.clone(),
        scopes: interp.snapshot_scopes(),
    };
    let transformer = Transformer::wrap(template, site, variants, config).map_err(TransfunctionError::into_exception)?;
    Ok(Value::Host(Arc::new(TransformerObject::new(Arc::new(transformer)))))
}

/// Install the entry decorator.
///
/// `transfunction(f)` wraps `f`; `transfunction(variants=[...])` returns a
/// decorator that wraps with declared variants.
pub(crate) fn install(interp: &Interpreter, config: Arc<EngineConfig>) {
    let name = config.decorator_name.clone();
    interp.register_native(&name, move |interp, mut args| {
        let variants = args.take_keyword("variants");
        args.check(&config.decorator_name, 1)?;
        match (args.positional.pop(), variants) {
            (Some(template), None) => wrap_here(interp, &template, None, &config),
            (Some(_), Some(_)) => Err(Exception::type_error(format!(
                "{}() takes either a function or the 'variants' keyword",
                config.decorator_name
            ))),
            (None, variants) => {
                let variants = match variants {
                    None | Some(Value::None) => None,
                    some => Some(string_list("variants", some)?),
                };
                let config = config.clone();
                Ok(Value::native(config.decorator_name.clone(), move |interp, args| {
                    args.check(&config.decorator_name, 1)?;
                    let template = args.get(0).cloned().ok_or_else(|| {
                        Exception::type_error(format!("{}() missing the function to wrap", config.decorator_name))
                    })?;
                    wrap_here(interp, &template, variants.clone(), &config)
                }))
            }
        }
    });
}
