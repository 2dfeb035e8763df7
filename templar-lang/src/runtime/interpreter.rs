use super::builtins;
use super::config::InterpreterConfig;
use super::exception::{Exception, TraceFrame, RECURSION_ERROR};
use super::frame::{Frame, FrameExit};
use super::function::Function;
use super::generator::{Generator, Resumed};
use super::namespace::{ModuleNamespace, Namespace, ScopeSnapshot};
use super::ops;
use super::value::{Args, Instance, IterState, MethodKind, RunResult, Value};
use crate::compiler::{compile_source, Code};
use crate::error::Result;
use crate::source::Source;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use templar_types::FunctionKind;
use tracing::{debug, trace};

/// A frame that is currently executing, as seen from native code
struct ActiveScope {
    snapshot: ScopeSnapshot,
    is_module: bool,
    /// Line of the instruction that last left the frame (a call in progress)
    line: u32,
}

enum Output {
    Stdout,
    Capture(String),
}

/// Script interpreter
///
/// Owns the builtins namespace and the stack of running frames. Native
/// functions receive the interpreter so they can call back into scripts
/// and inspect the frames that called them.
pub struct Interpreter {
    config: InterpreterConfig,
    builtins: Arc<ModuleNamespace>,
    scopes: Vec<ActiveScope>,
    output: Output,
    depth: usize,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_config(InterpreterConfig::default())
    }

    pub fn with_config(config: InterpreterConfig) -> Self {
        let builtins = ModuleNamespace::new("builtins");
        builtins::install(&builtins);
        Self {
            config,
            builtins,
            scopes: Vec::new(),
            output: Output::Stdout,
            depth: 0,
        }
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    pub fn set_recursion_limit(&mut self, limit: usize) {
        self.config.recursion_limit = limit;
    }

    pub fn builtins(&self) -> &Arc<ModuleNamespace> {
        &self.builtins
    }

    /// Make a value visible to every module
    pub fn register(&self, name: &str, value: Value) {
        self.builtins.set(name, value);
    }

    pub fn register_native(
        &self,
        name: &str,
        func: impl Fn(&mut Interpreter, Args) -> RunResult<Value> + Send + Sync + 'static,
    ) {
        self.register(name, Value::native(name, func));
    }

    /// Compile and run `text` as a module named `name`
    pub fn run_module(&mut self, name: &str, text: &str) -> Result<Arc<ModuleNamespace>> {
        self.run_source(Source::new(name, text), name)
    }

    /// Run a source as a module with the given `__name__`
    pub fn run_source(&mut self, source: Arc<Source>, module_name: &str) -> Result<Arc<ModuleNamespace>> {
        let code = compile_source(source)?;
        debug!(module = module_name, "running module");
        let globals = ModuleNamespace::new(module_name);
        self.exec_code(&code, globals.clone())?;
        Ok(globals)
    }

    /// Run module-level code against `globals`
    pub fn exec_code(&mut self, code: &Arc<Code>, globals: Arc<dyn Namespace>) -> RunResult<()> {
        let mut frame = Frame::for_module(code.clone(), globals);
        self.run_frame(&mut frame)?;
        Ok(())
    }

    /// Call any callable value
    pub fn call(&mut self, callee: &Value, args: Args) -> RunResult<Value> {
        match callee {
            Value::Function(f) => self.call_function(f, args),
            Value::Native(native) => native.invoke(self, args),
            Value::Method(method) => match &method.kind {
                MethodKind::Function(f) => {
                    let mut args = args;
                    args.positional.insert(0, method.receiver.clone());
                    self.call_function(f, args)
                }
                MethodKind::Builtin(name) => builtins::call_method(self, &method.receiver, name, args),
                MethodKind::Host(name) => match &method.receiver {
                    Value::Host(host) => host.call_method(self, name, args),
                    other => Err(Exception::type_error(format!(
                        "'{}' object has no method '{}'",
                        other.type_name(),
                        name
                    ))),
                },
            },
            Value::Class(class) => {
                let instance = Value::Instance(Arc::new(Instance {
                    class: class.clone(),
                    attrs: Mutex::new(HashMap::new()),
                }));
                match class.lookup("__init__") {
                    Some(init) => {
                        let mut args = args;
                        args.positional.insert(0, instance.clone());
                        self.call(&init, args)?;
                    }
                    None if !args.positional.is_empty() || !args.keywords.is_empty() => {
                        return Err(Exception::type_error(format!("{}() takes no arguments", class.name)));
                    }
                    None => {}
                }
                Ok(instance)
            }
            Value::ExceptionType(class) => {
                let message = args.get(0).map(Value::to_str).unwrap_or_default();
                Ok(Value::Exception(Arc::new(Exception {
                    class: class.clone(),
                    message,
                    traceback: Vec::new(),
                })))
            }
            Value::Host(host) => host.call(self, args),
            other => Err(Exception::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    /// Call a script function. Generator and coroutine functions return
    /// their suspended frame without running it.
    pub fn call_function(&mut self, function: &Arc<Function>, args: Args) -> RunResult<Value> {
        let locals = function.bind_arguments(args)?;
        let mut frame = Frame::for_function(function, locals);
        match function.kind() {
            FunctionKind::Plain => match self.run_frame(&mut frame)? {
                FrameExit::Return(value) => Ok(value),
                FrameExit::Yield(_) => Err(Exception::runtime_error("yield outside of a generator frame")),
            },
            kind => Ok(Value::Generator(Generator::new(
                kind,
                &function.name,
                &function.qualname,
                frame,
            ))),
        }
    }

    /// Drive a coroutine to completion and return its result
    pub fn run_coroutine(&mut self, value: &Value) -> RunResult<Value> {
        match value {
            Value::Generator(gen) if gen.is_coroutine() => loop {
                if let Resumed::Returned(result) = self.resume(gen, Value::None)? {
                    return Ok(result);
                }
            },
            other => Err(Exception::value_error(format!(
                "a coroutine was expected, got {}",
                other.repr()
            ))),
        }
    }

    /// `iter(value)`
    pub fn iterate(&mut self, value: &Value) -> RunResult<Value> {
        match value {
            Value::Generator(gen) if !gen.is_coroutine() => Ok(value.clone()),
            Value::Iterator(_) => Ok(value.clone()),
            Value::List(items) => Ok(IterState::Items {
                items: items.lock().clone(),
                pos: 0,
            }
            .into_value()),
            Value::Dict(dict) => Ok(IterState::Items {
                items: dict.lock().keys(),
                pos: 0,
            }
            .into_value()),
            Value::Str(s) => Ok(IterState::Items {
                items: s.chars().map(|c| Value::Str(c.to_string().into())).collect(),
                pos: 0,
            }
            .into_value()),
            other => Err(Exception::type_error(format!(
                "'{}' object is not iterable",
                other.type_name()
            ))),
        }
    }

    /// Advance an iterator; `None` when it is exhausted
    pub fn next_item(&mut self, iterator: &Value) -> RunResult<Option<Value>> {
        match iterator {
            Value::Generator(gen) => match self.resume(gen, Value::None)? {
                Resumed::Yielded(value) => Ok(Some(value)),
                Resumed::Returned(_) => Ok(None),
            },
            Value::Iterator(state) => Ok(state.lock().next_value()),
            other => Err(Exception::type_error(format!(
                "'{}' object is not an iterator",
                other.type_name()
            ))),
        }
    }

    /// Exhaust an iterable into a vector
    pub fn collect(&mut self, value: &Value) -> RunResult<Vec<Value>> {
        let iterator = self.iterate(value)?;
        let mut items = Vec::new();
        while let Some(item) = self.next_item(&iterator)? {
            items.push(item);
        }
        Ok(items)
    }

    /// `value.name`
    pub fn get_attr(&self, value: &Value, name: &str) -> RunResult<Value> {
        ops::get_attr(value, name)
    }

    /// Line currently executing in the innermost script frame
    pub fn caller_line(&self) -> Option<u32> {
        self.scopes.last().map(|scope| scope.line)
    }

    /// Views of the running function and class frames, innermost first
    pub fn snapshot_scopes(&self) -> Vec<ScopeSnapshot> {
        self.scopes
            .iter()
            .rev()
            .filter(|scope| !scope.is_module)
            .map(|scope| scope.snapshot.clone())
            .collect()
    }

    /// Collect `print` output instead of writing to stdout
    pub fn capture_output(&mut self) {
        self.output = Output::Capture(String::new());
    }

    /// Captured output since the last call
    pub fn take_output(&mut self) -> String {
        match &mut self.output {
            Output::Capture(buffer) => std::mem::take(buffer),
            Output::Stdout => String::new(),
        }
    }

    pub fn write_output(&mut self, text: &str) {
        match &mut self.output {
            Output::Capture(buffer) => buffer.push_str(text),
            Output::Stdout => print!("{}", text),
        }
    }

    pub(crate) fn set_current_line(&mut self, line: u32) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.line = line;
        }
    }

    /// Execute a frame until it returns or yields, recording a traceback
    /// entry if an exception escapes
    pub(crate) fn run_frame(&mut self, frame: &mut Frame) -> RunResult<FrameExit> {
        if self.depth >= self.config.recursion_limit {
            return Err(Exception::new(&RECURSION_ERROR, "maximum recursion depth exceeded"));
        }
        self.depth += 1;
        trace!(code = %frame.code.qualname, depth = self.depth, "entering frame");
        self.scopes.push(ActiveScope {
            snapshot: frame.snapshot(),
            is_module: frame.is_module(),
            line: frame.line,
        });
        let result = self.execute(frame);
        self.scopes.pop();
        self.depth -= 1;

        result.map_err(|mut exc| {
            exc.traceback.insert(
                0,
                TraceFrame {
                    filename: frame.code.filename.clone(),
                    line: frame.line,
                    function: frame.code.name.clone(),
                    source_line: frame.code.source_line(frame.line),
                },
            );
            exc
        })
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}
