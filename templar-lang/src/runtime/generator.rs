//! Suspendable frames: generators and coroutines

use super::exception::Exception;
use super::frame::{Frame, FrameExit};
use super::interpreter::Interpreter;
use super::value::{RunResult, Value};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use templar_types::FunctionKind;

pub(crate) enum GenState {
    Created(Box<Frame>),
    Suspended(Box<Frame>),
    Running,
    Finished,
}

/// A generator or coroutine object
pub struct Generator {
    pub kind: FunctionKind,
    pub name: String,
    pub qualname: String,
    state: Mutex<GenState>,
}

/// Outcome of resuming a generator
#[derive(Debug)]
pub enum Resumed {
    Yielded(Value),
    Returned(Value),
}

impl Generator {
    pub(crate) fn new(kind: FunctionKind, name: &str, qualname: &str, frame: Frame) -> Arc<Self> {
        Arc::new(Self {
            kind,
            name: name.to_string(),
            qualname: qualname.to_string(),
            state: Mutex::new(GenState::Created(Box::new(frame))),
        })
    }

    pub fn is_finished(&self) -> bool {
        matches!(*self.state.lock(), GenState::Finished)
    }

    pub fn is_coroutine(&self) -> bool {
        self.kind == FunctionKind::Coroutine
    }

    /// Drop the suspended frame without running it further
    pub fn close(&self) {
        let mut state = self.state.lock();
        if !matches!(*state, GenState::Running) {
            *state = GenState::Finished;
        }
    }
}

impl fmt::Debug for Generator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} object {}>", self.kind, self.qualname)
    }
}

impl Interpreter {
    /// Run a generator until its next yield or its return
    pub fn resume(&mut self, generator: &Arc<Generator>, sent: Value) -> RunResult<Resumed> {
        let mut frame = {
            let mut state = generator.state.lock();
            match std::mem::replace(&mut *state, GenState::Running) {
                GenState::Created(frame) => {
                    if !sent.is_none() {
                        *state = GenState::Created(frame);
                        return Err(Exception::type_error(format!(
                            "can't send non-None value to a just-started {}",
                            kind_noun(generator.kind)
                        )));
                    }
                    frame
                }
                GenState::Suspended(mut frame) => {
                    frame.stack.push(sent);
                    frame
                }
                GenState::Running => {
                    return Err(Exception::value_error(format!(
                        "{} already executing",
                        kind_noun(generator.kind)
                    )));
                }
                GenState::Finished => {
                    *state = GenState::Finished;
                    if generator.is_coroutine() {
                        return Err(Exception::runtime_error("cannot reuse already awaited coroutine"));
                    }
                    return Ok(Resumed::Returned(Value::None));
                }
            }
        };

        let result = self.run_frame(&mut frame);
        let mut state = generator.state.lock();
        match result {
            Ok(FrameExit::Yield(value)) => {
                *state = GenState::Suspended(frame);
                Ok(Resumed::Yielded(value))
            }
            Ok(FrameExit::Return(value)) => {
                *state = GenState::Finished;
                Ok(Resumed::Returned(value))
            }
            Err(exc) => {
                *state = GenState::Finished;
                Err(exc)
            }
        }
    }
}

fn kind_noun(kind: FunctionKind) -> &'static str {
    match kind {
        FunctionKind::Coroutine => "coroutine",
        _ => "generator",
    }
}
