use crate::error::{LangError, Loc, Result};
use logos::Logos;

/// Tokens for templar scripts
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\f\r]+|#[^\n]*|\\\r?\n")]
pub enum Token {
    // Keywords
    #[token("def")]
    Def,
    #[token("async")]
    Async,
    #[token("await")]
    Await,
    #[token("class")]
    Class,
    #[token("return")]
    Return,
    #[token("yield")]
    Yield,
    #[token("from")]
    From,
    #[token("if")]
    If,
    #[token("elif")]
    Elif,
    #[token("else")]
    Else,
    #[token("while")]
    While,
    #[token("for")]
    For,
    #[token("in")]
    In,
    #[token("with")]
    With,
    #[token("as")]
    As,
    #[token("pass")]
    Pass,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("raise")]
    Raise,
    #[token("try")]
    Try,
    #[token("except")]
    Except,
    #[token("nonlocal")]
    Nonlocal,
    #[token("global")]
    Global,
    #[token("lambda")]
    Lambda,
    #[token("and")]
    And,
    #[token("or")]
    Or,
    #[token("not")]
    Not,
    #[token("is")]
    Is,
    #[token("assert")]
    Assert,
    #[token("None")]
    None,
    #[token("True")]
    True,
    #[token("False")]
    False,

    // Identifiers and literals
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Identifier(String),

    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    IntLiteral(i64),

    #[regex(r"[0-9]+\.[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    FloatLiteral(f64),

    #[regex(r#""([^"\\\n]|\\.)*""#, |lex| unescape(lex.slice()))]
    #[regex(r#"'([^'\\\n]|\\.)*'"#, |lex| unescape(lex.slice()))]
    StringLiteral(String),

    // Operators
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("**")]
    StarStar,
    #[token("/")]
    Slash,
    #[token("//")]
    SlashSlash,
    #[token("%")]
    Percent,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    Le,
    #[token(">")]
    Gt,
    #[token(">=")]
    Ge,
    #[token("=")]
    Eq,
    #[token("+=")]
    PlusEq,
    #[token("-=")]
    MinusEq,
    #[token("*=")]
    StarEq,
    #[token("/=")]
    SlashEq,
    #[token("->")]
    Arrow,
    #[token("@")]
    At,

    // Delimiters
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,

    // Punctuation
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,
    #[token("\n")]
    Newline,

    // Produced by the layout pass
    Indent,
    Dedent,

    // End of file
    Eof,
}

impl Token {
    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            Token::Def
                | Token::Async
                | Token::Await
                | Token::Class
                | Token::Return
                | Token::Yield
                | Token::From
                | Token::If
                | Token::Elif
                | Token::Else
                | Token::While
                | Token::For
                | Token::In
                | Token::With
                | Token::As
                | Token::Pass
                | Token::Break
                | Token::Continue
                | Token::Raise
                | Token::Try
                | Token::Except
                | Token::Nonlocal
                | Token::Global
                | Token::Lambda
                | Token::And
                | Token::Or
                | Token::Not
                | Token::Is
                | Token::Assert
                | Token::None
                | Token::True
                | Token::False
        )
    }

    fn opens_bracket(&self) -> bool {
        matches!(self, Token::LParen | Token::LBracket | Token::LBrace)
    }

    fn closes_bracket(&self) -> bool {
        matches!(self, Token::RParen | Token::RBracket | Token::RBrace)
    }
}

fn unescape(quoted: &str) -> Option<String> {
    let inner = &quoted[1..quoted.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    Some(out)
}

/// A token with its source location
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub loc: Loc,
}

impl SpannedToken {
    pub fn new(token: Token, loc: Loc) -> Self {
        Self { token, loc }
    }
}

/// Lexer for templar source code
pub struct Lexer<'a> {
    source: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self {
            source,
            line_starts,
        }
    }

    fn loc_of(&self, offset: usize) -> Loc {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(index) => index,
            Err(index) => index - 1,
        };
        let column = offset - self.line_starts[line];
        Loc::new(line as u32 + 1, column as u32 + 1)
    }

    /// Tokenize the entire source, including layout tokens
    pub fn tokenize(&mut self) -> Result<Vec<SpannedToken>> {
        let mut lex = Token::lexer(self.source);
        let mut raw = Vec::new();

        while let Some(token_result) = lex.next() {
            let loc = self.loc_of(lex.span().start);
            match token_result {
                Ok(token) => raw.push(SpannedToken::new(token, loc)),
                Err(_) => {
                    return Err(LangError::LexerError {
                        loc,
                        message: format!("Invalid token: {}", lex.slice()),
                    });
                }
            }
        }

        self.layout(raw)
    }

    /// Turn physical lines into logical lines with indentation tokens
    fn layout(&self, raw: Vec<SpannedToken>) -> Result<Vec<SpannedToken>> {
        let mut tokens = Vec::with_capacity(raw.len() + 16);
        let mut indents: Vec<u32> = vec![1];
        let mut depth = 0usize;
        let mut at_line_start = true;
        let mut last_loc = Loc::new(1, 1);

        for spanned in raw {
            last_loc = spanned.loc;
            if spanned.token == Token::Newline {
                if depth == 0 && !at_line_start {
                    tokens.push(spanned);
                    at_line_start = true;
                }
                continue;
            }

            if at_line_start {
                let column = spanned.loc.column;
                let current = *indents.last().unwrap_or(&1);
                if column > current {
                    indents.push(column);
                    tokens.push(SpannedToken::new(Token::Indent, spanned.loc));
                } else {
                    while column < *indents.last().unwrap_or(&1) {
                        indents.pop();
                        tokens.push(SpannedToken::new(Token::Dedent, spanned.loc));
                    }
                    if column != *indents.last().unwrap_or(&1) {
                        return Err(LangError::LexerError {
                            loc: spanned.loc,
                            message: "unindent does not match any outer indentation level".to_string(),
                        });
                    }
                }
                at_line_start = false;
            }

            if spanned.token.opens_bracket() {
                depth += 1;
            } else if spanned.token.closes_bracket() {
                depth = depth.saturating_sub(1);
            }
            tokens.push(spanned);
        }

        let end = Loc::new(last_loc.line + 1, 1);
        if !at_line_start {
            tokens.push(SpannedToken::new(Token::Newline, end));
        }
        while indents.len() > 1 {
            indents.pop();
            tokens.push(SpannedToken::new(Token::Dedent, end));
        }
        tokens.push(SpannedToken::new(Token::Eof, end));
        Ok(tokens)
    }
}

/// Helper to tokenize a string slice
pub fn tokenize(source: &str) -> Result<Vec<SpannedToken>> {
    let mut lexer = Lexer::new(source);
    lexer.tokenize()
}

/// Whether `name` lexes as a single identifier (keywords do not)
pub fn is_identifier(name: &str) -> bool {
    let mut tokens = Token::lexer(name);
    matches!(tokens.next(), Some(Ok(Token::Identifier(ref ident))) if ident == name) && tokens.next().is_none()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords() {
        let tokens = tokenize("def async await yield from").unwrap();
        assert_eq!(tokens[0].token, Token::Def);
        assert_eq!(tokens[1].token, Token::Async);
        assert_eq!(tokens[2].token, Token::Await);
        assert_eq!(tokens[3].token, Token::Yield);
        assert_eq!(tokens[4].token, Token::From);
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("transfunction"));
        assert!(is_identifier("_private2"));
        assert!(!is_identifier("pass"));
        assert!(!is_identifier("None"));
        assert!(!is_identifier("two words"));
        assert!(!is_identifier("9lives"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn test_string_escapes() {
        let tokens = tokenize(r#"'it\'s' "a\nb""#).unwrap();
        assert_eq!(tokens[0].token, Token::StringLiteral("it's".to_string()));
        assert_eq!(tokens[1].token, Token::StringLiteral("a\nb".to_string()));
    }

    #[test]
    fn test_locations() {
        let tokens = tokenize("x = 1\ny").unwrap();
        assert_eq!(tokens[0].loc, Loc::new(1, 1));
        assert_eq!(tokens[2].loc, Loc::new(1, 5));
        assert_eq!(tokens[4].loc, Loc::new(2, 1));
    }
}
