//! The bytecode dispatch loop

use super::exception::{Exception, ExceptionClass};
use super::frame::{Block, Frame, FrameExit};
use super::function::{Cell, Function};
use super::generator::Resumed;
use super::interpreter::Interpreter;
use super::namespace::{module_name_of, ModuleNamespace, Namespace};
use super::ops;
use super::value::{Args, Class, IterState, RunResult, Value};
use crate::compiler::{Code, Const, Instr};
use std::sync::Arc;

fn pop(frame: &mut Frame) -> RunResult<Value> {
    frame
        .stack
        .pop()
        .ok_or_else(|| Exception::runtime_error("evaluation stack underflow"))
}

fn pop_n(frame: &mut Frame, count: usize) -> RunResult<Vec<Value>> {
    let len = frame.stack.len();
    if count > len {
        return Err(Exception::runtime_error("evaluation stack underflow"));
    }
    Ok(frame.stack.split_off(len - count))
}

fn top(frame: &Frame) -> RunResult<&Value> {
    frame
        .stack
        .last()
        .ok_or_else(|| Exception::runtime_error("evaluation stack underflow"))
}

/// Pop `count` (name, value) pairs pushed as alternating entries
fn pop_pairs(frame: &mut Frame, count: usize) -> RunResult<Vec<(String, Value)>> {
    let flat = pop_n(frame, count * 2)?;
    let mut pairs = Vec::with_capacity(count);
    let mut iter = flat.into_iter();
    while let (Some(name), Some(value)) = (iter.next(), iter.next()) {
        pairs.push((name.to_str(), value));
    }
    Ok(pairs)
}

fn name_at(code: &Code, index: u32) -> &str {
    code.names.get(index as usize).map(String::as_str).unwrap_or("?")
}

fn code_const(code: &Code, index: u32) -> RunResult<Arc<Code>> {
    match code.consts.get(index as usize) {
        Some(Const::Code(child)) => Ok(child.clone()),
        _ => Err(Exception::runtime_error("expected a code constant")),
    }
}

fn load_const(code: &Code, index: u32) -> RunResult<Value> {
    Ok(match code.consts.get(index as usize) {
        Some(Const::None) => Value::None,
        Some(Const::Bool(b)) => Value::Bool(*b),
        Some(Const::Int(i)) => Value::Int(*i),
        Some(Const::Float(f)) => Value::Float(*f),
        Some(Const::Str(s)) => Value::Str(s.clone()),
        Some(Const::Code(_)) | None => return Err(Exception::runtime_error("bad constant reference")),
    })
}

/// Turn a raised value into an exception
fn to_exception(value: Value) -> RunResult<Box<Exception>> {
    match value {
        Value::Exception(exc) => Ok(Box::new(Exception {
            class: exc.class.clone(),
            message: exc.message.clone(),
            traceback: Vec::new(),
        })),
        Value::ExceptionType(class) => Ok(Exception::new(&class, "")),
        _ => Err(Exception::type_error("exceptions must derive from BaseException")),
    }
}

impl Interpreter {
    pub(crate) fn execute(&mut self, frame: &mut Frame) -> RunResult<FrameExit> {
        let code = frame.code.clone();
        loop {
            let Some(instr) = code.instructions.get(frame.ip) else {
                return Ok(FrameExit::Return(Value::None));
            };
            frame.line = code.lines.get(frame.ip).copied().unwrap_or(frame.line);
            frame.ip += 1;
            match self.step(frame, &code, instr) {
                Ok(None) => {}
                Ok(Some(exit)) => return Ok(exit),
                Err(exc) => self.unwind(frame, exc)?,
            }
        }
    }

    /// Route an exception to the innermost handler of this frame, or hand
    /// it back if there is none
    fn unwind(&mut self, frame: &mut Frame, mut exc: Box<Exception>) -> RunResult<()> {
        while let Some(block) = frame.blocks.pop() {
            match block {
                Block::Except { handler, depth } => {
                    frame.stack.truncate(depth);
                    let value = Value::Exception(Arc::new(*exc));
                    frame.handling = Some((value.clone(), frame.line));
                    frame.stack.push(value);
                    frame.ip = handler;
                    return Ok(());
                }
                Block::With { exit, end, depth } => {
                    frame.stack.truncate(depth);
                    let args = Args::new(vec![
                        Value::ExceptionType(exc.class.clone()),
                        Value::Exception(Arc::new((*exc).clone())),
                        Value::None,
                    ]);
                    self.set_current_line(frame.line);
                    match self.call(&exit, args) {
                        Ok(result) if result.is_truthy() => {
                            frame.ip = end;
                            return Ok(());
                        }
                        Ok(_) => {}
                        Err(raised) => exc = raised,
                    }
                }
            }
        }
        Err(exc)
    }

    fn step(&mut self, frame: &mut Frame, code: &Code, instr: &Instr) -> RunResult<Option<FrameExit>> {
        match instr {
            Instr::Nop => {}
            Instr::LoadConst(index) => {
                let value = load_const(code, *index)?;
                frame.stack.push(value);
            }
            Instr::LoadFast(index) => {
                let value = frame.locals.lock().get(*index as usize).cloned().flatten();
                match value {
                    Some(value) => frame.stack.push(value),
                    None => {
                        let name = code.varnames.get(*index as usize).map(String::as_str).unwrap_or("?");
                        return Err(Exception::name_error(format!(
                            "cannot access local variable '{}' where it is not associated with a value",
                            name
                        )));
                    }
                }
            }
            Instr::StoreFast(index) => {
                let value = pop(frame)?;
                let mut locals = frame.locals.lock();
                let index = *index as usize;
                if index >= locals.len() {
                    locals.resize(index + 1, None);
                }
                locals[index] = Some(value);
            }
            Instr::LoadDeref(index) => {
                let value = frame.cells.get(*index as usize).and_then(|cell| cell.lock().clone());
                match value {
                    Some(value) => frame.stack.push(value),
                    None => {
                        let name = code.deref_name(*index as usize).unwrap_or("?");
                        return Err(Exception::name_error(format!(
                            "cannot access free variable '{}' where it is not associated with a value in enclosing scope",
                            name
                        )));
                    }
                }
            }
            Instr::StoreDeref(index) => {
                let value = pop(frame)?;
                let cell = frame
                    .cells
                    .get(*index as usize)
                    .ok_or_else(|| Exception::runtime_error("bad cell reference"))?;
                *cell.lock() = Some(value);
            }
            Instr::LoadGlobal(index) => {
                let name = name_at(code, *index);
                let value = self.load_global(frame, name)?;
                frame.stack.push(value);
            }
            Instr::StoreGlobal(index) => {
                let value = pop(frame)?;
                frame.globals.set(name_at(code, *index), value);
            }
            Instr::LoadName(index) => {
                let name = name_at(code, *index);
                let local = frame.names.as_ref().and_then(|names| names.get(name));
                let value = match local {
                    Some(value) => value,
                    None => self.load_global(frame, name)?,
                };
                frame.stack.push(value);
            }
            Instr::StoreName(index) => {
                let value = pop(frame)?;
                let target = frame.names.as_ref().unwrap_or(&frame.globals);
                target.set(name_at(code, *index), value);
            }
            Instr::LoadAttr(index) => {
                let object = pop(frame)?;
                frame.stack.push(ops::get_attr(&object, name_at(code, *index))?);
            }
            Instr::StoreAttr(index) => {
                let object = pop(frame)?;
                let value = pop(frame)?;
                ops::set_attr(&object, name_at(code, *index), value)?;
            }
            Instr::LoadSubscript => {
                let index = pop(frame)?;
                let object = pop(frame)?;
                frame.stack.push(ops::get_item(&object, &index)?);
            }
            Instr::StoreSubscript => {
                let index = pop(frame)?;
                let object = pop(frame)?;
                let value = pop(frame)?;
                ops::set_item(&object, &index, value)?;
            }
            Instr::Pop => {
                pop(frame)?;
            }
            Instr::Dup => {
                let value = top(frame)?.clone();
                frame.stack.push(value);
            }
            Instr::DupTwo => {
                let pair = pop_n(frame, 2)?;
                frame.stack.extend(pair.iter().cloned());
                frame.stack.extend(pair);
            }
            Instr::Rot2 => {
                let len = frame.stack.len();
                if len < 2 {
                    return Err(Exception::runtime_error("evaluation stack underflow"));
                }
                frame.stack.swap(len - 1, len - 2);
            }
            Instr::Rot3 => {
                let value = pop(frame)?;
                let len = frame.stack.len();
                if len < 2 {
                    return Err(Exception::runtime_error("evaluation stack underflow"));
                }
                frame.stack.insert(len - 2, value);
            }
            Instr::Binary(op) => {
                let right = pop(frame)?;
                let left = pop(frame)?;
                frame.stack.push(ops::binary_op(*op, &left, &right)?);
            }
            Instr::Unary(op) => {
                let value = pop(frame)?;
                frame.stack.push(ops::unary_op(*op, &value)?);
            }
            Instr::Compare(op) => {
                let right = pop(frame)?;
                let left = pop(frame)?;
                frame.stack.push(Value::Bool(ops::compare(*op, &left, &right)?));
            }
            Instr::Jump(target) => frame.ip = *target as usize,
            Instr::JumpIfFalse(target) => {
                if !pop(frame)?.is_truthy() {
                    frame.ip = *target as usize;
                }
            }
            Instr::JumpIfTrue(target) => {
                if pop(frame)?.is_truthy() {
                    frame.ip = *target as usize;
                }
            }
            Instr::JumpIfFalseOrPop(target) => {
                if top(frame)?.is_truthy() {
                    pop(frame)?;
                } else {
                    frame.ip = *target as usize;
                }
            }
            Instr::JumpIfTrueOrPop(target) => {
                if top(frame)?.is_truthy() {
                    frame.ip = *target as usize;
                } else {
                    pop(frame)?;
                }
            }
            Instr::BuildList(count) => {
                let items = pop_n(frame, *count as usize)?;
                frame.stack.push(Value::list(items));
            }
            Instr::BuildDict(count) => {
                let flat = pop_n(frame, *count as usize * 2)?;
                let mut entries = Vec::with_capacity(*count as usize);
                let mut iter = flat.into_iter();
                while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
                    entries.push((key, value));
                }
                frame.stack.push(Value::dict(entries));
            }
            Instr::Call { positional, keywords } => {
                let keywords = pop_pairs(frame, *keywords as usize)?;
                let positional = pop_n(frame, *positional as usize)?;
                let callee = pop(frame)?;
                self.set_current_line(frame.line);
                let result = self.call(&callee, Args { positional, keywords })?;
                frame.stack.push(result);
            }
            Instr::MakeFunction {
                code: index,
                defaults,
                kwdefaults,
                closure,
            } => {
                let kwdefaults = pop_pairs(frame, *kwdefaults as usize)?;
                let defaults = pop_n(frame, *defaults as usize)?;
                let closure = self.closure_cells(frame, closure)?;
                let child = code_const(code, *index)?;
                let function = Function::new(child, frame.globals.clone(), defaults, kwdefaults, closure);
                frame.stack.push(Value::Function(Arc::new(function)));
            }
            Instr::BuildClass {
                code: index,
                bases,
                closure,
            } => {
                let bases = pop_n(frame, *bases as usize)?;
                let closure = self.closure_cells(frame, closure)?;
                let body = code_const(code, *index)?;
                let class = self.build_class(frame, body, bases, closure)?;
                frame.stack.push(class);
            }
            Instr::Return => {
                let value = pop(frame)?;
                while let Some(block) = frame.blocks.pop() {
                    if let Block::With { exit, .. } = block {
                        self.set_current_line(frame.line);
                        self.call(&exit, Args::new(vec![Value::None, Value::None, Value::None]))?;
                    }
                }
                return Ok(Some(FrameExit::Return(value)));
            }
            Instr::Yield => {
                let value = pop(frame)?;
                return Ok(Some(FrameExit::Yield(value)));
            }
            Instr::YieldFrom => {
                let sent = pop(frame)?;
                let delegate = top(frame)?.clone();
                self.set_current_line(frame.line);
                let step = match &delegate {
                    Value::Generator(gen) => self.resume(gen, sent)?,
                    Value::Iterator(state) => {
                        let next = state.lock().next_value();
                        match next {
                            Some(value) => Resumed::Yielded(value),
                            None => Resumed::Returned(Value::None),
                        }
                    }
                    other => {
                        return Err(Exception::type_error(format!(
                            "cannot delegate to '{}' object",
                            other.type_name()
                        )))
                    }
                };
                match step {
                    Resumed::Yielded(value) => {
                        frame.ip -= 1;
                        return Ok(Some(FrameExit::Yield(value)));
                    }
                    Resumed::Returned(value) => {
                        pop(frame)?;
                        frame.stack.push(value);
                    }
                }
            }
            Instr::GetIter => {
                let value = pop(frame)?;
                let iterator = self.iterate(&value)?;
                frame.stack.push(iterator);
            }
            Instr::GetYieldFromIter => {
                let value = pop(frame)?;
                let iterator = match &value {
                    Value::Generator(gen) if gen.is_coroutine() => {
                        return Err(Exception::type_error(
                            "cannot 'yield from' a coroutine object in a non-coroutine generator",
                        ))
                    }
                    _ => self.iterate(&value)?,
                };
                frame.stack.push(iterator);
            }
            Instr::GetAwaitable => {
                let value = pop(frame)?;
                let awaitable = match &value {
                    Value::Generator(gen) if gen.is_coroutine() => true,
                    Value::Iterator(state) => matches!(*state.lock(), IterState::Suspend { .. }),
                    _ => false,
                };
                if !awaitable {
                    return Err(Exception::type_error(format!(
                        "object {} can't be used in 'await' expression",
                        value.type_name()
                    )));
                }
                frame.stack.push(value);
            }
            Instr::ForIter(target) => {
                let iterator = top(frame)?.clone();
                self.set_current_line(frame.line);
                match self.next_item(&iterator)? {
                    Some(value) => frame.stack.push(value),
                    None => {
                        pop(frame)?;
                        frame.ip = *target as usize;
                    }
                }
            }
            Instr::SetupWith(end) => {
                let manager = pop(frame)?;
                let (enter, exit) = match (ops::get_attr(&manager, "__enter__"), ops::get_attr(&manager, "__exit__")) {
                    (Ok(enter), Ok(exit)) => (enter, exit),
                    _ => {
                        return Err(Exception::type_error(format!(
                            "'{}' object does not support the context manager protocol",
                            manager.type_name()
                        )))
                    }
                };
                self.set_current_line(frame.line);
                let entered = self.call(&enter, Args::default())?;
                frame.blocks.push(Block::With {
                    exit,
                    end: *end as usize,
                    depth: frame.stack.len(),
                });
                frame.stack.push(entered);
            }
            Instr::ExitWith => {
                if let Some(Block::With { exit, .. }) = frame.blocks.pop() {
                    self.set_current_line(frame.line);
                    self.call(&exit, Args::new(vec![Value::None, Value::None, Value::None]))?;
                }
            }
            Instr::SetupExcept(handler) => {
                frame.blocks.push(Block::Except {
                    handler: *handler as usize,
                    depth: frame.stack.len(),
                });
            }
            Instr::PopBlock => {
                frame.blocks.pop();
            }
            Instr::Raise(true) => {
                let value = pop(frame)?;
                return Err(to_exception(value)?);
            }
            Instr::Raise(false) => {
                let Some((value, line)) = frame.handling.clone() else {
                    return Err(Exception::runtime_error("No active exception to reraise"));
                };
                frame.line = line;
                return Err(reraised(value)?);
            }
            Instr::ExcMatch => {
                let typ = pop(frame)?;
                let exc = pop(frame)?;
                frame.stack.push(Value::Bool(ops::exception_matches(&exc, &typ)?));
            }
            Instr::Reraise => {
                let value = pop(frame)?;
                if let Some((_, line)) = &frame.handling {
                    frame.line = *line;
                }
                return Err(reraised(value)?);
            }
        }
        Ok(None)
    }

    fn load_global(&self, frame: &Frame, name: &str) -> RunResult<Value> {
        frame
            .globals
            .get(name)
            .or_else(|| self.builtins().get(name))
            .ok_or_else(|| Exception::name_error(format!("name '{}' is not defined", name)))
    }

    fn closure_cells(&self, frame: &Frame, indices: &[u32]) -> RunResult<Vec<Cell>> {
        indices
            .iter()
            .map(|index| {
                frame
                    .cells
                    .get(*index as usize)
                    .cloned()
                    .ok_or_else(|| Exception::runtime_error("bad closure reference"))
            })
            .collect()
    }

    fn build_class(
        &mut self,
        frame: &Frame,
        body: Arc<Code>,
        bases: Vec<Value>,
        closure: Vec<Cell>,
    ) -> RunResult<Value> {
        let namespace = ModuleNamespace::empty();
        namespace.set("__module__", Value::str(&module_name_of(&*frame.globals)));
        namespace.set("__qualname__", Value::str(&body.qualname));
        if let Some(doc) = &body.docstring {
            namespace.set("__doc__", Value::str(doc));
        }
        let mut body_frame = Frame::for_class_body(body.clone(), frame.globals.clone(), namespace.clone(), closure);
        self.run_frame(&mut body_frame)?;

        if let Some(Value::ExceptionType(parent)) = bases.first() {
            return Ok(Value::ExceptionType(ExceptionClass::new(body.name.clone(), Some(parent))));
        }
        let mut class_bases = Vec::with_capacity(bases.len());
        for base in bases {
            match base {
                Value::Class(class) => class_bases.push(class),
                other => {
                    return Err(Exception::type_error(format!(
                        "cannot inherit from '{}' object",
                        other.type_name()
                    )))
                }
            }
        }
        Ok(Value::Class(Arc::new(Class {
            name: body.name.clone(),
            qualname: body.qualname.clone(),
            module: module_name_of(&*frame.globals),
            bases: class_bases,
            namespace,
        })))
    }
}

/// The exception object being re-raised, with its traceback intact
fn reraised(value: Value) -> RunResult<Box<Exception>> {
    match value {
        Value::Exception(exc) => Ok(Box::new((*exc).clone())),
        other => to_exception(other),
    }
}
