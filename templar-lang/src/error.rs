use crate::runtime::Exception;
use std::fmt;

pub use templar_types::Loc;

/// Errors that can occur while reading, compiling or running a script
#[derive(Debug, thiserror::Error)]
pub enum LangError {
    #[error("Lexer error at {loc}: {message}")]
    LexerError { loc: Loc, message: String },

    #[error("Syntax error at {loc}: {message}")]
    SyntaxError { loc: Loc, message: String },

    #[error("{0}")]
    Exception(Box<Exception>),
}

pub type Result<T> = std::result::Result<T, LangError>;

impl LangError {
    pub fn syntax(loc: Loc, message: impl Into<String>) -> Self {
        LangError::SyntaxError {
            loc,
            message: message.into(),
        }
    }

    /// Location of a lexer or syntax error
    pub fn loc(&self) -> Option<Loc> {
        match self {
            LangError::LexerError { loc, .. } | LangError::SyntaxError { loc, .. } => Some(*loc),
            LangError::Exception(_) => None,
        }
    }

    /// The runtime exception carried by this error, if any
    pub fn as_exception(&self) -> Option<&Exception> {
        match self {
            LangError::Exception(exc) => Some(exc),
            _ => None,
        }
    }

    /// Convert into a runtime exception so it can be raised inside a script.
    ///
    /// Lexer and syntax errors become `SyntaxError` exceptions.
    pub fn into_exception(self) -> Box<Exception> {
        match self {
            LangError::Exception(exc) => exc,
            LangError::LexerError { loc, message } | LangError::SyntaxError { loc, message } => {
                Exception::syntax_error(format!("{} (line {})", message, loc.line))
            }
        }
    }
}

impl From<Box<Exception>> for LangError {
    fn from(exc: Box<Exception>) -> Self {
        LangError::Exception(exc)
    }
}

/// Display context for better error messages
pub struct ErrorContext<'a> {
    pub source: &'a str,
    pub error: &'a LangError,
}

impl<'a> ErrorContext<'a> {
    pub fn new(source: &'a str, error: &'a LangError) -> Self {
        Self { source, error }
    }

    /// Get the source line containing the error
    pub fn source_line(&self) -> Option<&'a str> {
        let loc = self.error.loc()?;
        self.source.lines().nth(loc.line.checked_sub(1)? as usize)
    }
}

impl<'a> fmt::Display for ErrorContext<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(loc) = self.error.loc() else {
            return writeln!(f, "{}", self.error);
        };
        writeln!(f, "Error at line {}, column {}:", loc.line, loc.column)?;
        writeln!(f, "  {}", self.error)?;

        if let Some(source_line) = self.source_line() {
            writeln!(f)?;
            writeln!(f, "  {}", source_line)?;
            let col_start = (loc.column as usize).saturating_sub(1).min(source_line.len());
            writeln!(f, "  {}^", " ".repeat(col_start))?;
        }

        Ok(())
    }
}
