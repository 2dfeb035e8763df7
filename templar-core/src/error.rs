use crate::config::ConfigError;
use once_cell::sync::Lazy;
use std::sync::Arc;
use templar_lang::runtime::exception::{RUNTIME_ERROR, SYNTAX_ERROR, TYPE_ERROR, VALUE_ERROR};
use templar_lang::{Exception, ExceptionClass, Interpreter, LangError, Value};

pub const CALL_DIRECTLY_MESSAGE: &str =
    "You can't call a transfunction object directly, create a function, a generator function or a coroutine function from it.";

pub const AMBIGUOUS_FRAME_MESSAGE: &str =
    "No stack frame found. This is likely due to calling this code from dynamically evaluated contexts.";

/// Errors raised while wrapping a template or producing one of its variants
#[derive(Debug, thiserror::Error)]
pub enum TransfunctionError {
    #[error("{0}")]
    WrongDecoratorSyntax(String),

    #[error("{0}")]
    DualUseOfDecorator(String),

    #[error("{0}")]
    AliasedDecoratorSyntax(String),

    #[error("{0}")]
    WrongMarkerSyntax(String),

    #[error("{0}")]
    WrongTransfunctionSyntax(String),

    #[error("{0}")]
    UnknownVariant(String),

    #[error("{}", CALL_DIRECTLY_MESSAGE)]
    CallTransfunctionDirectly,

    #[error("{}", AMBIGUOUS_FRAME_MESSAGE)]
    AmbiguousFrame,

    /// The value handed to the decorator cannot serve as a template
    #[error("{0}")]
    InvalidTemplate(String),

    #[error("{0}")]
    SourceUnavailable(String),

    #[error(transparent)]
    Lang(#[from] LangError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, TransfunctionError>;

macro_rules! engine_classes {
    ($($static_name:ident => $name:literal : $parent:expr),* $(,)?) => {
        $(
            pub static $static_name: Lazy<Arc<ExceptionClass>> =
                Lazy::new(|| ExceptionClass::new($name, Some(&*$parent)));
        )*

        /// Exception classes raised by the engine, parents before children
        pub fn engine_classes() -> Vec<Arc<ExceptionClass>> {
            vec![$($static_name.clone()),*]
        }
    };
}

engine_classes! {
    WRONG_TRANSFUNCTION_SYNTAX_ERROR => "WrongTransfunctionSyntaxError": SYNTAX_ERROR,
    WRONG_DECORATOR_SYNTAX_ERROR => "WrongDecoratorSyntaxError": WRONG_TRANSFUNCTION_SYNTAX_ERROR,
    DUAL_USE_OF_DECORATOR_ERROR => "DualUseOfDecoratorError": WRONG_DECORATOR_SYNTAX_ERROR,
    ALIASED_DECORATOR_SYNTAX_ERROR => "AliasedDecoratorSyntaxError": WRONG_DECORATOR_SYNTAX_ERROR,
    WRONG_MARKER_SYNTAX_ERROR => "WrongMarkerSyntaxError": WRONG_TRANSFUNCTION_SYNTAX_ERROR,
    AMBIGUOUS_FRAME_SYNTAX_ERROR => "AmbiguousFrameSyntaxError": WRONG_TRANSFUNCTION_SYNTAX_ERROR,
    UNKNOWN_VARIANT_ERROR => "UnknownVariantError": VALUE_ERROR,
    CALL_TRANSFUNCTION_DIRECTLY_ERROR => "CallTransfunctionDirectlyError": TYPE_ERROR,
}

impl TransfunctionError {
    pub fn wrong_marker(message: impl Into<String>) -> Self {
        TransfunctionError::WrongMarkerSyntax(message.into())
    }

    /// Name of the script exception class this error is raised as
    pub fn class_name(&self) -> String {
        match self {
            TransfunctionError::Lang(LangError::Exception(exc)) => exc.class_name().to_string(),
            _ => self.class().name.clone(),
        }
    }

    fn class(&self) -> Arc<ExceptionClass> {
        match self {
            TransfunctionError::WrongDecoratorSyntax(_) => WRONG_DECORATOR_SYNTAX_ERROR.clone(),
            TransfunctionError::DualUseOfDecorator(_) => DUAL_USE_OF_DECORATOR_ERROR.clone(),
            TransfunctionError::AliasedDecoratorSyntax(_) => ALIASED_DECORATOR_SYNTAX_ERROR.clone(),
            TransfunctionError::WrongMarkerSyntax(_) => WRONG_MARKER_SYNTAX_ERROR.clone(),
            TransfunctionError::WrongTransfunctionSyntax(_) => WRONG_TRANSFUNCTION_SYNTAX_ERROR.clone(),
            TransfunctionError::UnknownVariant(_) => UNKNOWN_VARIANT_ERROR.clone(),
            TransfunctionError::CallTransfunctionDirectly => CALL_TRANSFUNCTION_DIRECTLY_ERROR.clone(),
            TransfunctionError::AmbiguousFrame => AMBIGUOUS_FRAME_SYNTAX_ERROR.clone(),
            TransfunctionError::InvalidTemplate(_) | TransfunctionError::Config(_) => VALUE_ERROR.clone(),
            TransfunctionError::SourceUnavailable(_) => RUNTIME_ERROR.clone(),
            TransfunctionError::Lang(_) => SYNTAX_ERROR.clone(),
        }
    }

    /// Convert into a script exception so it can propagate through scripts
    pub fn into_exception(self) -> Box<Exception> {
        match self {
            TransfunctionError::Lang(err) => err.into_exception(),
            other => Exception::new(&other.class(), other.to_string()),
        }
    }
}

impl From<Box<Exception>> for TransfunctionError {
    fn from(exc: Box<Exception>) -> Self {
        TransfunctionError::Lang(LangError::Exception(exc))
    }
}

/// Make the engine's exception classes visible to scripts
pub(crate) fn register_classes(interp: &Interpreter) {
    for class in engine_classes() {
        let name = class.name.clone();
        interp.register(&name, Value::ExceptionType(class));
    }
}
