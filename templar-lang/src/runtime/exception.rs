//! Runtime exceptions and the standard exception classes

use once_cell::sync::Lazy;
use std::fmt;
use std::sync::Arc;

/// An exception type. Classes form a single-inheritance chain.
#[derive(Debug)]
pub struct ExceptionClass {
    pub name: String,
    pub parent: Option<Arc<ExceptionClass>>,
}

impl ExceptionClass {
    pub fn new(name: impl Into<String>, parent: Option<&Arc<ExceptionClass>>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            parent: parent.cloned(),
        })
    }

    /// True if `self` is `other` or derives from it
    pub fn is_subclass_of(&self, other: &ExceptionClass) -> bool {
        let mut current = Some(self);
        while let Some(class) = current {
            if class.name == other.name {
                return true;
            }
            current = class.parent.as_deref();
        }
        false
    }
}

macro_rules! exception_classes {
    ($($static_name:ident => $name:literal : $parent:ident),* $(,)?) => {
        $(
            pub static $static_name: Lazy<Arc<ExceptionClass>> =
                Lazy::new(|| ExceptionClass::new($name, Some(&*$parent)));
        )*

        /// Every standard class except the root
        fn derived_classes() -> Vec<Arc<ExceptionClass>> {
            vec![$($static_name.clone()),*]
        }
    };
}

/// Root of the exception hierarchy
pub static EXCEPTION: Lazy<Arc<ExceptionClass>> = Lazy::new(|| ExceptionClass::new("Exception", None));

exception_classes! {
    VALUE_ERROR => "ValueError": EXCEPTION,
    TYPE_ERROR => "TypeError": EXCEPTION,
    RUNTIME_ERROR => "RuntimeError": EXCEPTION,
    RECURSION_ERROR => "RecursionError": RUNTIME_ERROR,
    LOOKUP_ERROR => "LookupError": EXCEPTION,
    KEY_ERROR => "KeyError": LOOKUP_ERROR,
    INDEX_ERROR => "IndexError": LOOKUP_ERROR,
    NAME_ERROR => "NameError": EXCEPTION,
    ATTRIBUTE_ERROR => "AttributeError": EXCEPTION,
    ZERO_DIVISION_ERROR => "ZeroDivisionError": EXCEPTION,
    ASSERTION_ERROR => "AssertionError": EXCEPTION,
    STOP_ITERATION => "StopIteration": EXCEPTION,
    SYNTAX_ERROR => "SyntaxError": EXCEPTION,
}

/// All standard exception classes, root first
pub fn standard_classes() -> Vec<Arc<ExceptionClass>> {
    let mut classes = vec![EXCEPTION.clone()];
    classes.extend(derived_classes());
    classes
}

/// One entry of a traceback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFrame {
    pub filename: String,
    pub line: u32,
    pub function: String,
    /// The stripped text of `line`, when the source is known
    pub source_line: Option<String>,
}

/// A raised exception. The traceback is ordered outermost call first.
#[derive(Debug, Clone)]
pub struct Exception {
    pub class: Arc<ExceptionClass>,
    pub message: String,
    pub traceback: Vec<TraceFrame>,
}

impl Exception {
    pub fn new(class: &Arc<ExceptionClass>, message: impl Into<String>) -> Box<Self> {
        Box::new(Self {
            class: class.clone(),
            message: message.into(),
            traceback: Vec::new(),
        })
    }

    pub fn class_name(&self) -> &str {
        &self.class.name
    }

    pub fn is_instance_of(&self, class: &ExceptionClass) -> bool {
        self.class.is_subclass_of(class)
    }

    /// The frame where the exception was raised
    pub fn innermost(&self) -> Option<&TraceFrame> {
        self.traceback.last()
    }

    pub fn type_error(message: impl Into<String>) -> Box<Self> {
        Self::new(&TYPE_ERROR, message)
    }

    pub fn value_error(message: impl Into<String>) -> Box<Self> {
        Self::new(&VALUE_ERROR, message)
    }

    pub fn runtime_error(message: impl Into<String>) -> Box<Self> {
        Self::new(&RUNTIME_ERROR, message)
    }

    pub fn name_error(message: impl Into<String>) -> Box<Self> {
        Self::new(&NAME_ERROR, message)
    }

    pub fn attribute_error(message: impl Into<String>) -> Box<Self> {
        Self::new(&ATTRIBUTE_ERROR, message)
    }

    pub fn key_error(message: impl Into<String>) -> Box<Self> {
        Self::new(&KEY_ERROR, message)
    }

    pub fn index_error(message: impl Into<String>) -> Box<Self> {
        Self::new(&INDEX_ERROR, message)
    }

    pub fn zero_division(message: impl Into<String>) -> Box<Self> {
        Self::new(&ZERO_DIVISION_ERROR, message)
    }

    pub fn stop_iteration() -> Box<Self> {
        Self::new(&STOP_ITERATION, "")
    }

    pub fn syntax_error(message: impl Into<String>) -> Box<Self> {
        Self::new(&SYNTAX_ERROR, message)
    }

    /// Render like a script traceback
    pub fn format_traceback(&self) -> String {
        let mut out = String::from("Traceback (most recent call last):\n");
        for frame in &self.traceback {
            out.push_str(&format!(
                "  File \"{}\", line {}, in {}\n",
                frame.filename, frame.line, frame.function
            ));
            if let Some(source_line) = &frame.source_line {
                out.push_str(&format!("    {}\n", source_line));
            }
        }
        out.push_str(&self.to_string());
        out.push('\n');
        out
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.class.name)
        } else {
            write!(f, "{}: {}", self.class.name, self.message)
        }
    }
}

impl std::error::Error for Exception {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subclass_chain() {
        assert!(KEY_ERROR.is_subclass_of(&LOOKUP_ERROR));
        assert!(KEY_ERROR.is_subclass_of(&EXCEPTION));
        assert!(!KEY_ERROR.is_subclass_of(&VALUE_ERROR));
    }

    #[test]
    fn test_display_and_traceback() {
        let mut exc = Exception::value_error("message");
        exc.traceback.push(TraceFrame {
            filename: "test".to_string(),
            line: 3,
            function: "make".to_string(),
            source_line: Some("raise ValueError('message')".to_string()),
        });
        assert_eq!(exc.to_string(), "ValueError: message");
        let rendered = exc.format_traceback();
        assert!(rendered.contains("File \"test\", line 3, in make"));
        assert!(rendered.ends_with("ValueError: message\n"));
    }
}
